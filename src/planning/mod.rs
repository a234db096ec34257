//! Goal planning.
//!
//! Goals go in, [`TaskPlan`]s come out. The [`GoalAnalyzer`] classifies
//! goal text, the [`Planner`] builds, optimizes and risk-assesses plans and
//! keeps a per-goal-type history.

pub mod analyzer;
pub mod goal;
pub mod plan;
pub mod planner;
pub mod risk;

pub use analyzer::{phase_rank, task_types, DetectedTask, GoalAnalyzer, GoalTemplate, TaskTemplate};
pub use goal::{Goal, GoalConstraints, GoalType};
pub use plan::{
    AnalysisOptions, ComplexityAnalysis, ComplexityFactors, ComplexityLevel, ExecutionStrategy,
    GoalsAnalysis, OptimizationTarget, PlanAlternative, PlannedTask, PlannerStats, Risk,
    RiskAssessment, RiskCategory, RiskLevel, StrategyKind, TaskPlan,
};
pub use planner::Planner;
pub use risk::{assess, RiskInputs};
