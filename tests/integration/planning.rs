//! Planner integration tests.
//!
//! These tests verify planning from the caller's side: complexity scoring
//! over goal sets, deadline handling for every goal type, and plans used as
//! the input of executable chains.

use std::time::Duration;

use chrono::Utc;

use goalchain::config::PlannerConfig;
use goalchain::orchestration::{ChainStatus, RetryConfig, TaskDefinition};
use goalchain::planning::{
    AnalysisOptions, ComplexityLevel, Goal, GoalType, OptimizationTarget, Planner, StrategyKind,
};

use crate::fixtures::{context, engine, register_flaky, register_succeeding};

/// Test: Small goal scores low
/// Given "Fix button color" at priority 20
/// When the goal is analyzed
/// Then complexity is simple or moderate
#[test]
fn test_small_goal_is_simple() {
    let analysis = Planner::new().analyze_goals(
        &[Goal::new("Fix button color", GoalType::Development).with_priority(20)],
        &AnalysisOptions::default(),
    );

    assert!(matches!(
        analysis.complexity_analysis.level,
        ComplexityLevel::Simple | ComplexityLevel::Moderate
    ));
    assert_eq!(analysis.complexity_analysis.factors.goal_count, 1);
}

/// Test: Enterprise goal set scores high
/// Given three enterprise-scale goals at priority 95-100
/// When they are analyzed together
/// Then complexity is complex or highly complex
#[test]
fn test_enterprise_goals_are_complex() {
    let goals = [
        Goal::new(
            "Design a distributed, scalable enterprise data platform with real-time ingestion",
            GoalType::Development,
        )
        .with_priority(95),
        Goal::new(
            "Migrate all microservices to a multi-tenant architecture with security compliance",
            GoalType::Development,
        )
        .with_priority(100),
        Goal::new(
            "Build enterprise integration and deploy it across regions, then monitor and document",
            GoalType::Deployment,
        )
        .with_priority(97),
    ];

    let analysis = Planner::new().analyze_goals(&goals, &AnalysisOptions::default());

    assert!(matches!(
        analysis.complexity_analysis.level,
        ComplexityLevel::Complex | ComplexityLevel::HighlyComplex
    ));
    assert_eq!(analysis.plans.len(), 3);
    assert!(analysis.complexity_analysis.factors.average_priority >= 95.0);
}

/// Test: One-hour deadline for every goal type
/// Given a goal of each type due in one hour
/// When plans are created
/// Then each estimate fits the hour with parallelism of at least 2
#[test]
fn test_one_hour_deadline_for_every_goal_type() {
    let planner = Planner::new();
    for goal_type in GoalType::ALL {
        let goal = Goal::new("Build, test, document and deploy the new service", goal_type)
            .with_priority(80)
            .with_deadline(Utc::now() + chrono::Duration::hours(1));

        let plan = planner.create_plan(&goal);

        assert!(
            plan.estimated_duration <= Duration::from_secs(3600),
            "{} plan estimated {:?}",
            goal_type,
            plan.estimated_duration
        );
        assert!(plan.execution_strategy.parallelism_level >= 2);
        assert!(plan.execution_strategy.adaptive_replanning);
        assert!(!plan.execution_strategy.checkpoints.is_empty());
    }
}

/// Test: Planner config bounds parallelism
/// Given a planner limited to parallelism 2
/// When a wide plan is created
/// Then its parallelism never exceeds the limit, alternatives included
#[test]
fn test_planner_config_caps_parallelism() {
    let planner = Planner::with_config(PlannerConfig {
        max_parallelism: 2,
        ..PlannerConfig::default()
    });
    let plan = planner.create_plan(&Goal::new(
        "Research, test, document and monitor the rollout",
        GoalType::Research,
    ));

    assert!(plan.execution_strategy.parallelism_level <= 2);
    for alternative in &plan.alternatives {
        assert!(alternative.execution_strategy.parallelism_level <= 2);
    }
}

/// Test: Alternatives and recommendations follow the optimization target
/// Given two independent goals
/// When analyzed for speed and for reliability
/// Then the fast-track and conservative alternatives bracket each plan
#[test]
fn test_alternatives_by_optimization_target() {
    let planner = Planner::new();
    let goals = [
        Goal::from("Implement CSV export"),
        Goal::from("Write the user guide"),
    ];

    let speed = planner.analyze_goals(
        &goals,
        &AnalysisOptions {
            include_alternatives: true,
            optimize_for: OptimizationTarget::Speed,
        },
    );
    for plan in &speed.plans {
        let fast = plan.alternative("fast-track").unwrap();
        let safe = plan.alternative("conservative").unwrap();
        assert!(fast.estimated_duration <= plan.estimated_duration);
        assert!(safe.estimated_duration >= plan.estimated_duration);
        assert_eq!(safe.execution_strategy.kind, StrategyKind::Sequential);
    }

    let reliability = planner.analyze_goals(
        &goals,
        &AnalysisOptions {
            include_alternatives: false,
            optimize_for: OptimizationTarget::Reliability,
        },
    );
    assert!(reliability.plans.iter().all(|p| p.alternatives.is_empty()));
    assert_ne!(speed.recommendations, reliability.recommendations);
}

/// Test: History and statistics across goal types
/// Given plans created for two goal types
/// When history and statistics are read, then cleared
/// Then counts match per type and clearing empties both
#[test]
fn test_history_and_statistics() {
    let planner = Planner::new();
    planner.create_plan(&Goal::new("Implement search", GoalType::Development));
    planner.create_plan(&Goal::new("Implement filters", GoalType::Development));
    planner.create_plan(&Goal::new("Deploy search", GoalType::Deployment));

    assert_eq!(planner.historical_plans(GoalType::Development).len(), 2);
    assert_eq!(planner.historical_plans(GoalType::Deployment).len(), 1);
    assert!(planner.historical_plans(GoalType::Trading).is_empty());

    let stats = planner.statistics();
    assert_eq!(stats.total_plans, 3);
    assert_eq!(stats.plans_by_type.get(&GoalType::Development), Some(&2));
    assert!(stats.average_estimated_duration > Duration::ZERO);

    planner.clear_history();
    assert_eq!(planner.statistics().total_plans, 0);
}

/// Test: Plan drives chain execution
/// Given a development plan and executors for every task type
/// When a chain is built from the plan and executed
/// Then every planned task runs once and the chain completes
#[tokio::test(start_paused = true)]
async fn test_plan_executes_as_chain() {
    let plan = Planner::new().create_plan(&Goal::new(
        "Implement login with tests",
        GoalType::Development,
    ));
    let engine = engine();
    register_succeeding(&engine, Duration::from_millis(10));

    let chain = engine.create_chain_from_plan(&plan, context()).unwrap();
    assert!(chain.parallelism <= plan.execution_strategy.parallelism_level);

    let finished = engine.execute_chain(chain.id).await.unwrap();
    assert_eq!(finished.status, ChainStatus::Completed);
    assert_eq!(finished.completed_tasks(), plan.tasks.len());
    for planned in &plan.tasks {
        let task = finished.task(&planned.id).unwrap();
        assert_eq!(task.attempts, 1);
        assert_eq!(task.definition.priority, planned.priority);
    }
}

/// Test: Registered policy applies to plan tasks
/// Given a registered definition sharing a planned task's id with a retry policy
/// When the plan's chain runs against a flaky executor
/// Then the registered retry policy is used
#[tokio::test(start_paused = true)]
async fn test_plan_chain_uses_registered_retry_policy() {
    let plan = Planner::new().create_plan(&Goal::new("Carry it out", GoalType::General));
    let target = plan.tasks[0].clone();

    let engine = engine();
    register_succeeding(&engine, Duration::from_millis(1));
    engine.register_task(
        TaskDefinition::new(&target.id, &target.task_type).with_retry(RetryConfig::new(3, 50, false)),
    );
    let calls = register_flaky(&engine, &target.task_type, 2, "not yet");

    let chain = engine.create_chain_from_plan(&plan, context()).unwrap();
    let finished = engine.execute_chain(chain.id).await.unwrap();

    assert_eq!(finished.status, ChainStatus::Completed);
    assert_eq!(finished.task(&target.id).unwrap().attempts, 3);
    assert!(calls.get() >= 3);
}
