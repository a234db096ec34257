//! Chain construction and execution integration tests.
//!
//! These tests drive the engine end to end with scripted executors and
//! verify ordering, retry and timeout behaviour as seen from the outside.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use goalchain::core::task::TaskStatus;
use goalchain::orchestration::{
    ChainEvent, ChainStatus, ChainTask, EventKind, RetryConfig, TaskChain, TaskContext,
    TaskDefinition,
};
use goalchain::planning::{task_types, Goal, GoalType, Planner};
use goalchain::{Error, TaskError};

use crate::fixtures::{
    context, engine, record_events, register_flaky, register_succeeding, CallCounter,
};

/// Every dependency of every task sits in a strictly earlier wave.
fn assert_topological(chain: &TaskChain) {
    let wave_of: HashMap<&str, usize> = chain
        .execution_order
        .iter()
        .enumerate()
        .flat_map(|(i, wave)| wave.iter().map(move |id| (id.as_str(), i)))
        .collect();

    for task in &chain.tasks {
        let own = wave_of[task.id()];
        for dep in &task.definition.dependencies {
            if let Some(&dep_wave) = wave_of.get(dep.as_str()) {
                assert!(
                    dep_wave < own,
                    "{} (wave {}) depends on {} (wave {})",
                    task.id(),
                    own,
                    dep,
                    dep_wave
                );
            }
        }
    }
    assert_eq!(wave_of.len(), chain.tasks.len(), "every task is scheduled once");
}

/// Test: Execution order is a topological layering
/// Given goal sets covering every detected phase
/// When chains are created from them
/// Then no task is scheduled before any of its dependencies
#[test]
fn test_execution_order_is_topological() {
    let engine = engine();
    engine.register_task(TaskDefinition::new("schema", task_types::DESIGN));
    engine.register_task(
        TaskDefinition::new("api", task_types::DEVELOPMENT).with_dependencies(&["schema"]),
    );
    engine.register_task(
        TaskDefinition::new("api-tests", task_types::TESTING).with_dependencies(&["api"]),
    );

    let goal_sets: Vec<Vec<&str>> = vec![
        vec!["Generate code for login feature", "Add unit tests"],
        vec!["Research options, analyze results, then deploy"],
        vec!["Document the API and monitor latency"],
        vec!["Optimize queries", "Fix the crash", "Release it"],
        vec!["Something with no verbs at all"],
    ];

    for goals in goal_sets {
        let chain = engine.create_task_chain(goals.clone(), context()).unwrap();
        assert!(!chain.tasks.is_empty(), "no tasks for {:?}", goals);
        assert_topological(&chain);
    }
}

/// Test: Plan-derived chains keep the plan's dependency order
/// Given a development plan
/// When a chain is created from it
/// Then its waves are a topological layering of the plan's tasks
#[test]
fn test_plan_chain_is_topological() {
    let planner = Planner::new();
    let plan = planner.create_plan(&Goal::new(
        "Build a scalable API with tests and docs",
        GoalType::Development,
    ));

    let chain = engine().create_chain_from_plan(&plan, context()).unwrap();

    assert_eq!(chain.plan_id.as_deref(), Some(plan.id.as_str()));
    assert_eq!(chain.tasks.len(), plan.tasks.len());
    assert_topological(&chain);
}

/// Test: Login feature example
/// Given the goals "Generate code for login feature" and "Add unit tests"
/// When a chain is created for user u1
/// Then it is planning, has tasks and a non-empty execution order
#[test]
fn test_login_feature_chain() {
    let chain = engine()
        .create_task_chain(
            ["Generate code for login feature", "Add unit tests"],
            TaskContext::new("u1", "s1"),
        )
        .unwrap();

    assert_eq!(chain.status, ChainStatus::Planning);
    assert!(!chain.tasks.is_empty());
    assert!(!chain.execution_order.is_empty());
    assert_eq!(chain.context.user_id, "u1");
    assert_eq!(chain.goals.len(), 2);
}

/// Test: Full run with simulated executors
/// Given executors for every task type
/// When a multi-goal chain is executed
/// Then every task completes with output and an execution record
#[tokio::test(start_paused = true)]
async fn test_full_chain_completes() {
    let engine = engine();
    register_succeeding(&engine, Duration::from_millis(50));

    let chain = engine
        .create_task_chain(
            ["Research the market", "Implement the feature", "Add tests and deploy"],
            context(),
        )
        .unwrap();
    let finished = engine.execute_chain(chain.id).await.unwrap();

    assert_eq!(finished.status, ChainStatus::Completed);
    assert_eq!(finished.completed_tasks(), finished.tasks.len());
    assert!(finished.started_at.is_some());
    assert!(finished.completed_at >= finished.started_at);
    for task in &finished.tasks {
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.attempts, 1);
        assert_eq!(task.output.as_ref().unwrap()["task"], task.id());
    }

    let queue = engine.execution_queue();
    assert_eq!(queue.len(), finished.tasks.len());
    assert!(queue.values().all(|e| e.chain_id == chain.id && e.is_finished()));
}

/// Test: Tasks start only after their dependencies complete
/// Given a registered three-step pipeline
/// When the chain runs
/// Then each task starts after all of its dependencies reported completion
#[tokio::test(start_paused = true)]
async fn test_dependencies_complete_before_dependents_start() {
    let engine = engine();
    engine.register_task(TaskDefinition::new("design", task_types::DESIGN));
    engine.register_task(
        TaskDefinition::new("build", task_types::DEVELOPMENT).with_dependencies(&["design"]),
    );
    engine.register_task(
        TaskDefinition::new("verify", task_types::TESTING).with_dependencies(&["build", "design"]),
    );
    register_succeeding(&engine, Duration::from_millis(20));
    let events = record_events(&engine, &[EventKind::TaskStarted, EventKind::TaskCompleted]);

    let chain = engine.create_task_chain(["Test the feature"], context()).unwrap();
    assert_eq!(chain.tasks.len(), 3);
    engine.execute_chain(chain.id).await.unwrap();

    let mut completed: Vec<String> = Vec::new();
    for event in events.lock().iter() {
        match event {
            ChainEvent::TaskStarted { task_id, .. } => {
                let task = chain.task(task_id).unwrap();
                for dep in &task.definition.dependencies {
                    assert!(completed.contains(dep), "{} started before {}", task_id, dep);
                }
            }
            ChainEvent::TaskCompleted { task_id, .. } => completed.push(task_id.clone()),
            _ => {}
        }
    }
    assert_eq!(completed, vec!["design", "build", "verify"]);
}

/// Test: Always-failing executor
/// Given max_attempts = n and an executor that always fails
/// When the chain runs
/// Then the executor is called exactly n times and the chain fails
#[tokio::test(start_paused = true)]
async fn test_always_failing_executor_runs_max_attempts() {
    for n in [1u32, 2, 4] {
        let engine = engine();
        engine.register_task(
            TaskDefinition::new("build", task_types::DEVELOPMENT)
                .with_retry(RetryConfig::new(n, 10, false)),
        );
        let calls = register_flaky(&engine, task_types::DEVELOPMENT, u32::MAX, "compile error");

        let chain = engine.create_task_chain(["Implement login"], context()).unwrap();
        let err = engine.execute_chain(chain.id).await.unwrap_err();

        assert_eq!(calls.get(), n, "max_attempts = {}", n);
        match err {
            Error::TaskFailed { task_id, attempts, source, .. } => {
                assert_eq!(task_id, "build");
                assert_eq!(attempts, n);
                assert_eq!(source, TaskError::Execution("compile error".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let failed = engine.chain_status(chain.id).unwrap();
        assert_eq!(failed.status, ChainStatus::Failed);
        assert!(failed.error.as_deref().unwrap().contains("compile error"));
        assert!(matches!(
            failed.task("build").unwrap().status,
            TaskStatus::Failed { .. }
        ));
    }
}

/// Test: Timeout fails the chain
/// Given a 100ms timeout and an executor that resolves after 200ms
/// When the chain runs
/// Then the task fails by timeout and the chain ends failed
#[tokio::test(start_paused = true)]
async fn test_slow_executor_times_out() {
    let engine = engine();
    engine.register_task(
        TaskDefinition::new("build", task_types::DEVELOPMENT)
            .with_timeout(Duration::from_millis(100)),
    );
    let calls = CallCounter::new();
    let counted = calls.clone();
    engine.register_executor(task_types::DEVELOPMENT, move |_task: ChainTask, _ctx: TaskContext| {
        counted.hit();
        async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, String>(Value::Null)
        }
    });

    let chain = engine.create_task_chain(["Implement login"], context()).unwrap();
    let err = engine.execute_chain(chain.id).await.unwrap_err();

    assert!(matches!(
        err,
        Error::TaskFailed { source: TaskError::Timeout(d), .. } if d == Duration::from_millis(100)
    ));
    assert_eq!(calls.get(), 1);

    let failed = engine.chain_status(chain.id).unwrap();
    assert_eq!(failed.status, ChainStatus::Failed);
    let task = failed.task("build").unwrap();
    assert!(task.error.as_deref().unwrap().contains("timed out"));
    assert!(task.output.is_none());
}

/// Test: Exponential backoff then success
/// Given max_attempts 3, backoff 100ms exponential, and an executor failing twice
/// When the chain runs
/// Then the executor is called 3 times, retries wait 100ms then 200ms, and the chain completes
#[tokio::test(start_paused = true)]
async fn test_retry_with_backoff_then_success() {
    let engine = engine();
    engine.register_task(
        TaskDefinition::new("build", task_types::DEVELOPMENT)
            .with_retry(RetryConfig::new(3, 100, true)),
    );
    let calls = register_flaky(&engine, task_types::DEVELOPMENT, 2, "flaky build");
    let events = record_events(&engine, &[EventKind::TaskRetried]);

    let chain = engine.create_task_chain(["Implement login"], context()).unwrap();
    let started = tokio::time::Instant::now();
    let finished = engine.execute_chain(chain.id).await.unwrap();

    assert_eq!(calls.get(), 3);
    assert_eq!(finished.status, ChainStatus::Completed);
    assert!(started.elapsed() >= Duration::from_millis(300));

    let task = finished.task("build").unwrap();
    assert_eq!(task.attempts, 3);
    assert_eq!(task.output.as_ref().unwrap()["call"], 3);

    let delays: Vec<(u32, Duration)> = events
        .lock()
        .iter()
        .filter_map(|e| match e {
            ChainEvent::TaskRetried { attempt, delay, .. } => Some((*attempt, *delay)),
            _ => None,
        })
        .collect();
    assert_eq!(
        delays,
        vec![
            (2, Duration::from_millis(100)),
            (3, Duration::from_millis(200)),
        ]
    );
}

/// Test: First failure stops the chain
/// Given two sequential tasks where the first always fails
/// When the chain runs
/// Then the second task is never dispatched
#[tokio::test(start_paused = true)]
async fn test_failed_wave_stops_later_waves() {
    let engine = engine();
    engine.register_task(TaskDefinition::new("build", task_types::DEVELOPMENT));
    engine.register_task(
        TaskDefinition::new("ship", task_types::DEPLOYMENT).with_dependencies(&["build"]),
    );
    register_flaky(&engine, task_types::DEVELOPMENT, u32::MAX, "broken");
    let deploys = register_flaky(&engine, task_types::DEPLOYMENT, 0, "");

    let chain = engine.create_task_chain(["Deploy it"], context()).unwrap();
    assert!(engine.execute_chain(chain.id).await.is_err());

    assert_eq!(deploys.get(), 0);
    let failed = engine.chain_status(chain.id).unwrap();
    assert_eq!(failed.task("ship").unwrap().status, TaskStatus::Pending);
    assert!(!engine
        .execution_queue()
        .contains_key(&goalchain::core::task::queue_key(&chain.id, "ship")));
    assert!(engine
        .execution_queue()
        .values()
        .all(|e| e.chain_id != chain.id || e.is_finished()));
}

/// Test: A failing task settles its running siblings
/// Given two parallel research tasks where one fails after 10ms and the other takes 10s
/// When the chain fails
/// Then the slow task is recorded as failed rather than left running
#[tokio::test(start_paused = true)]
async fn test_failed_task_settles_running_sibling() {
    let engine = engine();
    engine.register_task(
        TaskDefinition::new("quick", task_types::RESEARCH)
            .parallelizable(true)
            .with_retry(RetryConfig::new(1, 10, false)),
    );
    engine.register_task(TaskDefinition::new("slow", task_types::RESEARCH).parallelizable(true));
    engine.register_executor(task_types::RESEARCH, |task: ChainTask, _ctx: TaskContext| async move {
        if task.id() == "quick" {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err::<Value, _>("no sources".to_string())
        } else {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(Value::Null)
        }
    });

    let chain = engine.create_task_chain(["Research options"], context()).unwrap();
    assert_eq!(chain.execution_order.len(), 1);
    let err = engine.execute_chain(chain.id).await.unwrap_err();
    assert!(matches!(err, Error::TaskFailed { ref task_id, .. } if task_id == "quick"));

    let failed = engine.chain_status(chain.id).unwrap();
    assert_eq!(failed.status, ChainStatus::Failed);
    let slow = failed.task("slow").unwrap();
    assert_eq!(
        slow.status,
        TaskStatus::Failed {
            error: "chain failed".to_string()
        }
    );
    assert!(slow.completed_at.is_some());
    assert!(slow.output.is_none());

    let queue = engine.execution_queue();
    let record = &queue[&goalchain::core::task::queue_key(&chain.id, "slow")];
    assert!(record.is_finished());
    assert_eq!(record.attempts, 1);

    // The abandoned executor call cannot revive the record.
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert!(matches!(
        engine.chain_status(chain.id).unwrap().task("slow").unwrap().status,
        TaskStatus::Failed { .. }
    ));
}
