//! Plan data model produced by the planner.

use crate::core::dag::Dependent;
use crate::planning::goal::GoalType;
use crate::util::duration_ms;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// An estimated unit of work inside a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedTask {
    pub id: String,
    pub name: String,
    pub task_type: String,
    pub priority: u8,
    #[serde(with = "duration_ms")]
    pub estimated_duration: Duration,
    pub required_capabilities: Vec<String>,
    pub dependencies: Vec<String>,
    pub parallelizable: bool,
    pub optional: bool,
}

impl Dependent for PlannedTask {
    fn id(&self) -> &str {
        &self.id
    }

    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Sequential,
    Parallel,
    Hybrid,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::Sequential => write!(f, "sequential"),
            StrategyKind::Parallel => write!(f, "parallel"),
            StrategyKind::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// How a plan's tasks are meant to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStrategy {
    pub kind: StrategyKind,
    pub parallelism_level: usize,
    /// Task ids after which the plan may be revisited.
    pub checkpoints: Vec<String>,
    pub adaptive_replanning: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    Schedule,
    Dependency,
    External,
    Scope,
    Resource,
}

/// One identified risk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Risk {
    pub id: String,
    pub category: RiskCategory,
    pub level: RiskLevel,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub overall_risk: RiskLevel,
    pub risks: Vec<Risk>,
    /// Mitigations keyed by risk id.
    pub mitigation_strategies: BTreeMap<String, Vec<String>>,
}

impl RiskAssessment {
    pub fn low() -> Self {
        Self {
            overall_risk: RiskLevel::Low,
            risks: Vec::new(),
            mitigation_strategies: BTreeMap::new(),
        }
    }
}

/// A variant of a plan trading scope or safety for time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanAlternative {
    /// `fast-track` or `conservative`.
    pub name: String,
    pub description: String,
    pub tasks: Vec<PlannedTask>,
    pub execution_strategy: ExecutionStrategy,
    #[serde(with = "duration_ms")]
    pub estimated_duration: Duration,
    pub trade_offs: Vec<String>,
}

/// The planner's output for one goal. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPlan {
    pub id: String,
    pub goal_id: String,
    pub goal_type: GoalType,
    pub tasks: Vec<PlannedTask>,
    pub execution_strategy: ExecutionStrategy,
    #[serde(with = "duration_ms")]
    pub estimated_duration: Duration,
    pub required_resources: Vec<String>,
    pub risk_assessment: RiskAssessment,
    pub alternatives: Vec<PlanAlternative>,
    pub created_at: DateTime<Utc>,
}

impl TaskPlan {
    pub fn task(&self, id: &str) -> Option<&PlannedTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn alternative(&self, name: &str) -> Option<&PlanAlternative> {
        self.alternatives.iter().find(|a| a.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComplexityLevel {
    Simple,
    Moderate,
    Complex,
    HighlyComplex,
}

impl ComplexityLevel {
    pub fn from_score(score: u32) -> Self {
        match score {
            0..=3 => ComplexityLevel::Simple,
            4..=6 => ComplexityLevel::Moderate,
            7..=9 => ComplexityLevel::Complex,
            _ => ComplexityLevel::HighlyComplex,
        }
    }
}

impl std::fmt::Display for ComplexityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComplexityLevel::Simple => write!(f, "simple"),
            ComplexityLevel::Moderate => write!(f, "moderate"),
            ComplexityLevel::Complex => write!(f, "complex"),
            ComplexityLevel::HighlyComplex => write!(f, "highly-complex"),
        }
    }
}

/// Inputs that fed the complexity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityFactors {
    pub goal_count: usize,
    pub total_tasks: usize,
    #[serde(with = "duration_ms")]
    pub total_duration: Duration,
    pub max_dependency_depth: usize,
    pub average_priority: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityAnalysis {
    pub level: ComplexityLevel,
    pub score: u32,
    pub factors: ComplexityFactors,
}

/// What the caller wants recommendations to favour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationTarget {
    Speed,
    #[default]
    Balanced,
    Reliability,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisOptions {
    pub include_alternatives: bool,
    pub optimize_for: OptimizationTarget,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            include_alternatives: true,
            optimize_for: OptimizationTarget::Balanced,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalsAnalysis {
    pub plans: Vec<TaskPlan>,
    pub recommendations: Vec<String>,
    pub complexity_analysis: ComplexityAnalysis,
}

/// Aggregate view over the plan history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerStats {
    pub total_plans: usize,
    pub plans_by_type: BTreeMap<GoalType, usize>,
    #[serde(with = "duration_ms")]
    pub average_estimated_duration: Duration,
}
