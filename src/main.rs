use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;

use goalchain::config::Config;
use goalchain::orchestration::{ChainEvent, ChainExecutionEngine, ChainTask, EventKind, TaskContext};
use goalchain::planning::{
    task_types, AnalysisOptions, Goal, GoalType, OptimizationTarget, Planner, TaskPlan,
};
use goalchain::util::human_duration;
use goalchain::Result;

/// goalchain - plan goals into task graphs and execute them as chains
#[derive(Parser, Debug)]
#[command(name = "goalchain")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    GOALCHAIN_DEBUG=1     Enable debug logging (alternative to --debug)\n    RUST_LOG              Override the log filter")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.goalchain/goalchain.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Config file (defaults to ~/.goalchain/goalchain.toml)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Create a plan for a single goal
    Plan {
        /// Goal description
        description: String,

        #[command(flatten)]
        goal: GoalArgs,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Plan several goals and report their combined complexity
    Analyze {
        /// Goal descriptions
        #[arg(required = true)]
        descriptions: Vec<String>,

        /// Goal type applied to every goal
        #[arg(short = 't', long = "type", default_value = "general")]
        goal_type: String,

        /// What recommendations should favour
        #[arg(long, value_enum, default_value_t = Optimize::Balanced)]
        optimize_for: Optimize,

        /// Leave plan alternatives out of the result
        #[arg(long)]
        no_alternatives: bool,

        /// Print the analysis as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the standard task templates per goal type
    Templates {
        /// Only show this goal type
        #[arg(short = 't', long = "type")]
        goal_type: Option<String>,
    },

    /// Build a chain from goals and execute it with simulated executors
    Run {
        /// Goal descriptions
        #[arg(required = true)]
        goals: Vec<String>,

        /// Plan the first goal and run the plan instead of detected tasks
        #[arg(long)]
        from_plan: bool,

        /// Simulated work per task, in milliseconds
        #[arg(long, default_value_t = 100)]
        simulate_ms: u64,

        /// Print the finished chain as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args, Debug, Clone, PartialEq)]
pub struct GoalArgs {
    /// Goal type (development, analysis, trading, research, deployment, maintenance, general)
    #[arg(short = 't', long = "type", default_value = "general")]
    pub goal_type: String,

    /// Priority, 0-100
    #[arg(short = 'p', long, default_value_t = 50, allow_negative_numbers = true)]
    pub priority: i32,

    /// Deadline as hours from now
    #[arg(long)]
    pub deadline_hours: Option<f64>,

    /// Available capabilities, comma separated
    #[arg(long, value_delimiter = ',')]
    pub resources: Option<Vec<String>>,

    /// External dependency ids, comma separated
    #[arg(long, value_delimiter = ',')]
    pub depends_on: Vec<String>,
}

impl GoalArgs {
    fn to_goal(&self, description: &str) -> Goal {
        let mut goal = Goal::new(description, GoalType::parse(&self.goal_type))
            .with_priority(self.priority)
            .with_dependencies(self.depends_on.as_slice());
        if let Some(resources) = &self.resources {
            goal = goal.with_resources(resources.as_slice());
        }
        if let Some(hours) = self.deadline_hours {
            let seconds = (hours * 3600.0) as i64;
            goal = goal.with_deadline(chrono::Utc::now() + chrono::Duration::seconds(seconds));
        }
        goal
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Optimize {
    Speed,
    Balanced,
    Reliability,
}

impl From<Optimize> for OptimizationTarget {
    fn from(value: Optimize) -> Self {
        match value {
            Optimize::Speed => OptimizationTarget::Speed,
            Optimize::Balanced => OptimizationTarget::Balanced,
            Optimize::Reliability => OptimizationTarget::Reliability,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    goalchain::log::init_with_debug(cli.debug);
    tracing::info!(debug = goalchain::log::is_debug(), "goalchain starting");

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Command::Plan {
            description,
            goal,
            json,
        } => run_plan(&config, goal.to_goal(&description), json),
        Command::Analyze {
            descriptions,
            goal_type,
            optimize_for,
            no_alternatives,
            json,
        } => {
            let goal_type = GoalType::parse(&goal_type);
            let goals: Vec<Goal> = descriptions
                .iter()
                .map(|d| Goal::new(d, goal_type))
                .collect();
            let options = AnalysisOptions {
                include_alternatives: !no_alternatives,
                optimize_for: optimize_for.into(),
            };
            run_analyze(&config, &goals, &options, json)
        }
        Command::Templates { goal_type } => run_templates(goal_type.as_deref()),
        Command::Run {
            goals,
            from_plan,
            simulate_ms,
            json,
        } => run_chain(&config, goals, from_plan, simulate_ms, json),
    }
}

fn run_plan(config: &Config, goal: Goal, json: bool) -> Result<()> {
    let planner = Planner::with_config(config.planner.clone());
    let plan = planner.create_plan(&goal);
    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print_plan(&plan);
    }
    Ok(())
}

fn print_plan(plan: &TaskPlan) {
    println!("Plan {} ({})", plan.id, plan.goal_type);
    println!(
        "  Strategy:  {} x{}",
        plan.execution_strategy.kind, plan.execution_strategy.parallelism_level
    );
    println!("  Estimate:  {}", human_duration(plan.estimated_duration));
    println!("  Risk:      {}", plan.risk_assessment.overall_risk);
    println!();
    for task in &plan.tasks {
        let deps = if task.dependencies.is_empty() {
            String::new()
        } else {
            format!(" <- {}", task.dependencies.join(", "))
        };
        println!(
            "  [{:>3}] {:<32} {:>8}{}{}",
            task.priority,
            task.name,
            human_duration(task.estimated_duration),
            if task.optional { " (optional)" } else { "" },
            deps
        );
    }
    for risk in &plan.risk_assessment.risks {
        println!("  ! {} {}: {}", risk.level, risk.id, risk.description);
    }
    for alt in &plan.alternatives {
        println!(
            "  alternative {}: {} ({})",
            alt.name,
            human_duration(alt.estimated_duration),
            alt.trade_offs.join("; ")
        );
    }
}

fn run_analyze(config: &Config, goals: &[Goal], options: &AnalysisOptions, json: bool) -> Result<()> {
    let planner = Planner::with_config(config.planner.clone());
    let analysis = planner.analyze_goals(goals, options);
    if json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        return Ok(());
    }

    let complexity = &analysis.complexity_analysis;
    println!(
        "Complexity: {} (score {}, {} tasks, {})",
        complexity.level,
        complexity.score,
        complexity.factors.total_tasks,
        human_duration(complexity.factors.total_duration)
    );
    for plan in &analysis.plans {
        println!();
        print_plan(plan);
    }
    if !analysis.recommendations.is_empty() {
        println!();
        println!("Recommendations:");
        for recommendation in &analysis.recommendations {
            println!("  - {}", recommendation);
        }
    }
    Ok(())
}

fn run_templates(filter: Option<&str>) -> Result<()> {
    let planner = Planner::new();
    let wanted = filter.map(GoalType::parse);
    for (goal_type, template) in planner.available_templates() {
        if wanted.is_some_and(|w| w != goal_type) {
            continue;
        }
        println!("{} (requires: {})", goal_type, template.required_capabilities.join(", "));
        for task in &template.standard_tasks {
            println!(
                "  {:<28} {:<14} {:>4}m{}",
                task.name,
                task.task_type,
                task.base_minutes,
                if task.optional { " (optional)" } else { "" }
            );
        }
    }
    Ok(())
}

fn run_chain(config: &Config, goals: Vec<String>, from_plan: bool, simulate_ms: u64, json: bool) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let engine = ChainExecutionEngine::new(config.engine.clone());
        let delay = Duration::from_millis(simulate_ms);
        for task_type in SIMULATED_TYPES {
            engine.register_executor(task_type, move |task: ChainTask, ctx: TaskContext| async move {
                tokio::time::sleep(delay).await;
                Ok::<_, String>(json!({
                    "task": task.id(),
                    "simulated": true,
                    "environment": ctx.shared_state.get("environment"),
                }))
            });
        }

        if !json {
            engine.events().on(EventKind::TaskCompleted, |event| {
                if let Some(task_id) = event.task_id() {
                    println!("  done    {}", task_id);
                }
            });
            engine.events().on(EventKind::TaskRetried, |event| {
                if let ChainEvent::TaskRetried { task_id, attempt, delay, .. } = event {
                    println!("  retry   {} (attempt {} in {:?})", task_id, attempt, delay);
                }
            });
        }

        let context = TaskContext::new(&whoami(), &uuid::Uuid::new_v4().to_string());
        let chain = if from_plan {
            let planner = Planner::with_config(config.planner.clone());
            let first = goals.first().map(String::as_str).unwrap_or_default();
            let plan = planner.create_plan(&Goal::from(first));
            engine.create_chain_from_plan(&plan, context)?
        } else {
            engine.create_task_chain(goals, context)?
        };

        if !json {
            println!("Chain {} ({} tasks)", chain.id.short(), chain.tasks.len());
            for (i, wave) in chain.execution_order.iter().enumerate() {
                println!("  wave {}: {}", i + 1, wave.join(", "));
            }
        }

        let finished = engine.execute_chain(chain.id).await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&finished)?);
        } else {
            println!("Chain {} {}", finished.id.short(), finished.status);
        }
        Ok(())
    })
}

const SIMULATED_TYPES: [&str; 13] = [
    task_types::DEPENDENCY_RESOLUTION,
    task_types::RESEARCH,
    task_types::ANALYSIS,
    task_types::DESIGN,
    task_types::DEVELOPMENT,
    task_types::TRADING,
    task_types::GENERAL,
    task_types::OPTIMIZATION,
    task_types::TESTING,
    task_types::REVIEW,
    task_types::DOCUMENTATION,
    task_types::DEPLOYMENT,
    task_types::MONITORING,
];

fn whoami() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "local".to_string())
}
