//! Goal planner.
//!
//! The planner turns a [`Goal`] into a [`TaskPlan`]: detected and template
//! tasks with priorities, duration estimates and phase-derived
//! dependencies, an execution strategy, a risk assessment and two
//! alternative variants. It never fails; malformed goals degrade to a
//! minimal plan. Every plan is kept in a per-goal-type history.

use crate::config::PlannerConfig;
use crate::core::dag::{dependency_depth, DependencyGraph};
use crate::error::{Error, Result};
use crate::planning::analyzer::{phase_rank, task_types, GoalAnalyzer, GoalTemplate, TaskTemplate};
use crate::planning::goal::{Goal, GoalType};
use crate::planning::plan::{
    AnalysisOptions, ComplexityAnalysis, ComplexityFactors, ComplexityLevel, ExecutionStrategy,
    GoalsAnalysis, OptimizationTarget, PlanAlternative, PlannedTask, PlannerStats, Risk,
    RiskAssessment, RiskCategory, RiskLevel, StrategyKind, TaskPlan,
};
use crate::planning::risk::{self, RiskInputs};
use crate::util::{human_duration, scale_duration, slugify};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Priority lost per position in detection order.
const PRIORITY_DECAY: usize = 5;

const FAST_TRACK_FACTOR: f64 = 0.7;
const CONSERVATIVE_FACTOR: f64 = 1.25;
const CONSERVATIVE_BUFFER: f64 = 1.2;

pub struct Planner {
    analyzer: GoalAnalyzer,
    config: PlannerConfig,
    history: RwLock<HashMap<GoalType, VecDeque<TaskPlan>>>,
}

impl Planner {
    pub fn new() -> Self {
        Self::with_config(PlannerConfig::default())
    }

    pub fn with_config(config: PlannerConfig) -> Self {
        Self {
            analyzer: GoalAnalyzer::new(),
            config,
            history: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Create a plan for `goal` and record it in the history.
    pub fn create_plan(&self, goal: &Goal) -> TaskPlan {
        let plan = match self.build_plan(goal, Utc::now()) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(goal_id = %goal.id, error = %e, "falling back to minimal plan");
                self.minimal_plan(goal)
            }
        };

        info!(
            goal_id = %goal.id,
            plan_id = %plan.id,
            tasks = plan.tasks.len(),
            estimated_ms = plan.estimated_duration.as_millis() as u64,
            risk = %plan.risk_assessment.overall_risk,
            "plan created"
        );

        self.record(plan.clone());
        plan
    }

    /// Plan every goal and summarise the combined complexity.
    pub fn analyze_goals(&self, goals: &[Goal], options: &AnalysisOptions) -> GoalsAnalysis {
        let mut plans: Vec<TaskPlan> = goals.iter().map(|g| self.create_plan(g)).collect();
        let complexity_analysis = complexity_analysis(goals, &plans);
        let recommendations = recommendations(goals, &plans, &complexity_analysis, options);

        if !options.include_alternatives {
            for plan in &mut plans {
                plan.alternatives.clear();
            }
        }

        debug!(
            goals = goals.len(),
            level = %complexity_analysis.level,
            score = complexity_analysis.score,
            "goals analyzed"
        );

        GoalsAnalysis {
            plans,
            recommendations,
            complexity_analysis,
        }
    }

    /// All retained plans created for goals of `goal_type`, oldest first.
    pub fn historical_plans(&self, goal_type: GoalType) -> Vec<TaskPlan> {
        self.history
            .read()
            .get(&goal_type)
            .map(|plans| plans.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn available_templates(&self) -> BTreeMap<GoalType, GoalTemplate> {
        self.analyzer.templates().clone()
    }

    pub fn statistics(&self) -> PlannerStats {
        let history = self.history.read();
        let plans_by_type: BTreeMap<GoalType, usize> = history
            .iter()
            .filter(|(_, plans)| !plans.is_empty())
            .map(|(goal_type, plans)| (*goal_type, plans.len()))
            .collect();
        let total_plans: usize = plans_by_type.values().sum();
        let total: Duration = history
            .values()
            .flatten()
            .map(|p| p.estimated_duration)
            .sum();
        let average_estimated_duration = if total_plans == 0 {
            Duration::ZERO
        } else {
            total / total_plans as u32
        };

        PlannerStats {
            total_plans,
            plans_by_type,
            average_estimated_duration,
        }
    }

    pub fn clear_history(&self) {
        self.history.write().clear();
    }

    fn record(&self, plan: TaskPlan) {
        let mut history = self.history.write();
        let plans = history.entry(plan.goal_type).or_default();
        plans.push_back(plan);
        while plans.len() > self.config.history_limit.max(1) {
            plans.pop_front();
        }
    }

    fn build_plan(&self, goal: &Goal, now: DateTime<Utc>) -> Result<TaskPlan> {
        let description = goal.description.trim();
        if description.is_empty() {
            return Err(Error::Validation(format!(
                "goal {} has an empty description",
                goal.id
            )));
        }

        let priority = goal.effective_priority();
        if i32::from(priority) != goal.priority {
            debug!(goal_id = %goal.id, priority = goal.priority, "priority clamped");
        }
        let multiplier = self.analyzer.complexity_multiplier(description);

        // Detected tasks first, then template tasks of types not yet covered.
        let mut templates: Vec<TaskTemplate> = self
            .analyzer
            .detect(description)
            .into_iter()
            .map(|d| d.template)
            .collect();
        let detected_types: HashSet<String> =
            templates.iter().map(|t| t.task_type.clone()).collect();
        for template in &self.analyzer.template_for(goal.goal_type).standard_tasks {
            if !detected_types.contains(&template.task_type)
                && !templates.iter().any(|t| t.name == template.name)
            {
                templates.push(template.clone());
            }
        }

        let mut capability_gaps = Vec::new();
        if let Some(allowed) = &goal.constraints.resources {
            let allowed: HashSet<String> = allowed.iter().map(|r| r.to_lowercase()).collect();
            templates.retain(|t| {
                let available = t
                    .capabilities
                    .iter()
                    .all(|c| allowed.contains(&c.to_lowercase()));
                if !available {
                    capability_gaps.push(t.name.clone());
                }
                available
            });
        }

        let external = goal.constraints.dependencies.len();
        if external > 0 {
            templates.insert(0, dependency_resolution_template(external));
        }
        if templates.is_empty() {
            templates.push(clarify_template());
        }

        let mut tasks = materialize(&templates, priority, multiplier);
        let mut parallelism = natural_parallelism(&tasks).clamp(1, self.config.max_parallelism.max(1));

        let mut adaptive = false;
        let mut deadline_compressed = false;
        let mut deadline_missed = false;
        if let Some(deadline) = goal.constraints.deadline {
            adaptive = true;
            let ceiling = self.config.max_parallelism.max(2);
            parallelism = parallelism.max(2).min(ceiling);

            match (deadline - now).to_std() {
                Ok(available) if !available.is_zero() => {
                    let budget = scale_duration(available, self.config.deadline_pressure_ratio);
                    if estimate_duration(&tasks, parallelism) > budget {
                        debug!(goal_id = %goal.id, budget_ms = budget.as_millis() as u64, "deadline is tight");
                        if tasks.iter().any(|t| !t.optional) {
                            tasks.retain(|t| !t.optional);
                            prune_dependencies(&mut tasks);
                        }
                        parallelism = (parallelism * 2).min(ceiling);

                        let estimate = estimate_duration(&tasks, parallelism);
                        if estimate > budget {
                            let factor = budget.as_secs_f64() / estimate.as_secs_f64();
                            for task in &mut tasks {
                                task.estimated_duration =
                                    scale_duration(task.estimated_duration, factor);
                            }
                            deadline_compressed = true;
                        }
                    }
                }
                _ => deadline_missed = true,
            }
        }

        let graph = DependencyGraph::build(&tasks);
        let waves = graph.waves();
        let estimated_duration = estimate_duration(&tasks, parallelism);

        let risk_assessment = risk::assess(&RiskInputs {
            estimated_duration,
            task_count: tasks.len(),
            dependency_count: graph.dependency_count(),
            dependency_depth: waves.len(),
            external_dependencies: external,
            deadline_compressed,
            deadline_missed,
            capability_gaps,
        });

        adaptive |= risk_assessment.overall_risk >= RiskLevel::High;
        let checkpoints = if adaptive {
            waves.iter().filter_map(|w| w.last().cloned()).collect()
        } else {
            Vec::new()
        };

        let execution_strategy = ExecutionStrategy {
            kind: strategy_kind(&waves, parallelism),
            parallelism_level: parallelism,
            checkpoints,
            adaptive_replanning: adaptive,
        };

        let alternatives = vec![
            fast_track(&tasks, parallelism, self.config.max_parallelism),
            conservative(&tasks),
        ];

        Ok(TaskPlan {
            id: Uuid::new_v4().to_string(),
            goal_id: goal.id.clone(),
            goal_type: goal.goal_type,
            required_resources: required_resources(&tasks),
            tasks,
            execution_strategy,
            estimated_duration,
            risk_assessment,
            alternatives,
            created_at: now,
        })
    }

    fn minimal_plan(&self, goal: &Goal) -> TaskPlan {
        let tasks = materialize(&[clarify_template()], goal.effective_priority(), 1.0);
        let estimated_duration = estimate_duration(&tasks, 1);
        let risk = Risk {
            id: "risk-invalid-goal".to_string(),
            category: RiskCategory::Scope,
            level: RiskLevel::Medium,
            description: "Goal could not be analyzed; plan covers clarification only".to_string(),
        };
        let mut mitigation_strategies = BTreeMap::new();
        mitigation_strategies.insert(
            risk.id.clone(),
            vec!["Restate the goal with a concrete description".to_string()],
        );

        TaskPlan {
            id: Uuid::new_v4().to_string(),
            goal_id: goal.id.clone(),
            goal_type: goal.goal_type,
            required_resources: required_resources(&tasks),
            tasks,
            execution_strategy: ExecutionStrategy {
                kind: StrategyKind::Sequential,
                parallelism_level: 1,
                checkpoints: Vec::new(),
                adaptive_replanning: false,
            },
            estimated_duration,
            risk_assessment: RiskAssessment {
                overall_risk: RiskLevel::Medium,
                risks: vec![risk],
                mitigation_strategies,
            },
            alternatives: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Planner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Planner")
            .field("config", &self.config)
            .field("history", &self.statistics().total_plans)
            .finish()
    }
}

fn clarify_template() -> TaskTemplate {
    TaskTemplate {
        name: "Clarify goal requirements".to_string(),
        task_type: task_types::ANALYSIS.to_string(),
        base_minutes: 30,
        capabilities: Vec::new(),
        parallelizable: false,
        optional: false,
    }
}

fn dependency_resolution_template(external: usize) -> TaskTemplate {
    TaskTemplate {
        name: "Resolve external dependencies".to_string(),
        task_type: task_types::DEPENDENCY_RESOLUTION.to_string(),
        base_minutes: 30 + 15 * external as u64,
        capabilities: Vec::new(),
        parallelizable: false,
        optional: false,
    }
}

/// Turn templates into planned tasks.
///
/// Priority decays with position; each task depends on every task of the
/// nearest earlier phase present.
fn materialize(templates: &[TaskTemplate], priority: u8, multiplier: f64) -> Vec<PlannedTask> {
    let mut used_ids: HashSet<String> = HashSet::new();
    let mut tasks: Vec<PlannedTask> = templates
        .iter()
        .enumerate()
        .map(|(i, template)| {
            let base = slugify(&template.name);
            let mut id = base.clone();
            let mut suffix = 2;
            while !used_ids.insert(id.clone()) {
                id = format!("{}-{}", base, suffix);
                suffix += 1;
            }

            PlannedTask {
                id,
                name: template.name.clone(),
                task_type: template.task_type.clone(),
                priority: usize::from(priority).saturating_sub(i * PRIORITY_DECAY) as u8,
                estimated_duration: scale_duration(
                    Duration::from_secs(template.base_minutes * 60),
                    multiplier,
                ),
                required_capabilities: template.capabilities.clone(),
                dependencies: Vec::new(),
                parallelizable: template.parallelizable,
                optional: template.optional,
            }
        })
        .collect();

    let ranks: Vec<(String, u8)> = tasks
        .iter()
        .map(|t| (t.id.clone(), phase_rank(&t.task_type)))
        .collect();
    for task in &mut tasks {
        let rank = phase_rank(&task.task_type);
        if let Some(previous) = ranks.iter().map(|(_, r)| *r).filter(|r| *r < rank).max() {
            task.dependencies = ranks
                .iter()
                .filter(|(_, r)| *r == previous)
                .map(|(id, _)| id.clone())
                .collect();
        }
    }
    tasks
}

/// Drop dependencies on tasks that are no longer part of the set.
fn prune_dependencies(tasks: &mut [PlannedTask]) {
    let ids: HashSet<String> = tasks.iter().map(|t| t.id.clone()).collect();
    for task in tasks.iter_mut() {
        task.dependencies.retain(|d| ids.contains(d));
    }
}

fn natural_parallelism(tasks: &[PlannedTask]) -> usize {
    let by_id: HashMap<&str, &PlannedTask> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();
    DependencyGraph::build(tasks)
        .waves()
        .iter()
        .map(|wave| {
            wave.iter()
                .filter(|id| by_id.get(id.as_str()).is_some_and(|t| t.parallelizable))
                .count()
        })
        .max()
        .unwrap_or(0)
        .max(1)
}

/// Estimate wall-clock duration at the given parallelism.
///
/// Waves run back to back. Within a wave, parallelizable tasks run in
/// batches of `parallelism` (each batch costs its longest task) and the
/// remaining tasks run one after another.
pub(crate) fn estimate_duration(tasks: &[PlannedTask], parallelism: usize) -> Duration {
    let by_id: HashMap<&str, &PlannedTask> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();
    let parallelism = parallelism.max(1);

    DependencyGraph::build(tasks)
        .waves()
        .iter()
        .map(|wave| {
            let (mut parallel, sequential): (Vec<&PlannedTask>, Vec<&PlannedTask>) = wave
                .iter()
                .filter_map(|id| by_id.get(id.as_str()).copied())
                .partition(|t| t.parallelizable);
            parallel.sort_by(|a, b| b.estimated_duration.cmp(&a.estimated_duration));

            let batched: Duration = parallel
                .chunks(parallelism)
                .map(|batch| batch[0].estimated_duration)
                .sum();
            let serial: Duration = sequential.iter().map(|t| t.estimated_duration).sum();
            batched + serial
        })
        .sum()
}

fn strategy_kind(waves: &[Vec<String>], parallelism: usize) -> StrategyKind {
    if parallelism <= 1 || waves.iter().all(|w| w.len() <= 1) {
        StrategyKind::Sequential
    } else if waves.len() == 1 {
        StrategyKind::Parallel
    } else {
        StrategyKind::Hybrid
    }
}

fn required_resources(tasks: &[PlannedTask]) -> Vec<String> {
    let mut resources: Vec<String> = tasks
        .iter()
        .flat_map(|t| t.required_capabilities.iter().cloned())
        .collect();
    resources.sort();
    resources.dedup();
    resources
}

fn fast_track(tasks: &[PlannedTask], parallelism: usize, max_parallelism: usize) -> PlanAlternative {
    let mut reduced: Vec<PlannedTask> = tasks.iter().filter(|t| !t.optional).cloned().collect();
    if reduced.is_empty() {
        reduced = tasks.to_vec();
    }
    for task in &mut reduced {
        task.estimated_duration = scale_duration(task.estimated_duration, FAST_TRACK_FACTOR);
    }
    prune_dependencies(&mut reduced);

    let dropped = tasks.len() - reduced.len();
    let parallelism = (parallelism + 1).min(max_parallelism.max(parallelism));
    let waves = DependencyGraph::build(&reduced).waves();

    PlanAlternative {
        name: "fast-track".to_string(),
        description: "Optional tasks removed and estimates tightened".to_string(),
        estimated_duration: estimate_duration(&reduced, parallelism),
        execution_strategy: ExecutionStrategy {
            kind: strategy_kind(&waves, parallelism),
            parallelism_level: parallelism,
            checkpoints: Vec::new(),
            adaptive_replanning: false,
        },
        tasks: reduced,
        trade_offs: vec![
            format!("{} optional task(s) dropped", dropped),
            "Less time for review and polish".to_string(),
        ],
    }
}

fn conservative(tasks: &[PlannedTask]) -> PlanAlternative {
    let mut buffered = tasks.to_vec();
    for task in &mut buffered {
        task.estimated_duration = scale_duration(task.estimated_duration, CONSERVATIVE_FACTOR);
    }
    let estimated_duration =
        scale_duration(estimate_duration(&buffered, 1), CONSERVATIVE_BUFFER);

    PlanAlternative {
        name: "conservative".to_string(),
        description: "Sequential execution with a checkpoint after every task".to_string(),
        estimated_duration,
        execution_strategy: ExecutionStrategy {
            kind: StrategyKind::Sequential,
            parallelism_level: 1,
            checkpoints: buffered.iter().map(|t| t.id.clone()).collect(),
            adaptive_replanning: true,
        },
        tasks: buffered,
        trade_offs: vec![
            "Longer delivery time".to_string(),
            "Every task can be reviewed before the next one starts".to_string(),
        ],
    }
}

fn complexity_analysis(goals: &[Goal], plans: &[TaskPlan]) -> ComplexityAnalysis {
    let total_tasks: usize = plans.iter().map(|p| p.tasks.len()).sum();
    let total_duration: Duration = plans.iter().map(|p| p.estimated_duration).sum();
    let max_dependency_depth = plans
        .iter()
        .map(|p| dependency_depth(&p.tasks))
        .max()
        .unwrap_or(0);
    let average_priority = if goals.is_empty() {
        0.0
    } else {
        goals
            .iter()
            .map(|g| f64::from(g.effective_priority()))
            .sum::<f64>()
            / goals.len() as f64
    };

    let hours = total_duration.as_secs() / 3600;
    let mut score = 0;
    score += match total_tasks {
        n if n >= 20 => 3,
        n if n >= 10 => 2,
        n if n >= 5 => 1,
        _ => 0,
    };
    score += match hours {
        h if h >= 40 => 3,
        h if h >= 16 => 2,
        h if h >= 4 => 1,
        _ => 0,
    };
    score += match max_dependency_depth {
        d if d >= 6 => 2,
        d if d >= 4 => 1,
        _ => 0,
    };
    score += if average_priority >= 90.0 {
        2
    } else if average_priority >= 70.0 {
        1
    } else {
        0
    };
    if goals.len() >= 3 {
        score += 1;
    }

    ComplexityAnalysis {
        level: ComplexityLevel::from_score(score),
        score,
        factors: ComplexityFactors {
            goal_count: goals.len(),
            total_tasks,
            total_duration,
            max_dependency_depth,
            average_priority,
        },
    }
}

fn recommendations(
    goals: &[Goal],
    plans: &[TaskPlan],
    complexity: &ComplexityAnalysis,
    options: &AnalysisOptions,
) -> Vec<String> {
    let mut out = Vec::new();
    if goals.is_empty() {
        out.push("No goals supplied; nothing to plan".to_string());
        return out;
    }

    if complexity.level >= ComplexityLevel::Complex {
        out.push(format!(
            "Break the work into milestones: {} tasks across {} goal(s) ({} estimated)",
            complexity.factors.total_tasks,
            goals.len(),
            human_duration(complexity.factors.total_duration)
        ));
    }

    let cross_dependent = goals
        .iter()
        .any(|g| g.constraints.dependencies.iter().any(|d| goals.iter().any(|o| &o.id == d)));
    if goals.len() > 1 && !cross_dependent {
        out.push("Goals are independent and can be executed in parallel".to_string());
    }

    for (goal, plan) in goals.iter().zip(plans) {
        if plan.risk_assessment.overall_risk >= RiskLevel::High {
            let ids: Vec<&str> = plan
                .risk_assessment
                .risks
                .iter()
                .filter(|r| r.level >= RiskLevel::High)
                .map(|r| r.id.as_str())
                .collect();
            out.push(format!(
                "Address {} risk for '{}': {}",
                plan.risk_assessment.overall_risk,
                goal.description.trim(),
                ids.join(", ")
            ));
        }

        let preferred = match options.optimize_for {
            OptimizationTarget::Speed => plan.alternative("fast-track"),
            OptimizationTarget::Reliability => plan.alternative("conservative"),
            OptimizationTarget::Balanced => None,
        };
        if let Some(alt) = preferred {
            out.push(format!(
                "Consider the {} variant for '{}' ({} instead of {})",
                alt.name,
                goal.description.trim(),
                human_duration(alt.estimated_duration),
                human_duration(plan.estimated_duration)
            ));
        }
    }

    if plans.iter().any(|p| p.execution_strategy.adaptive_replanning) {
        out.push("Revisit plans at their checkpoints to allow adaptive replanning".to_string());
    }

    out
}
