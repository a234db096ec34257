//! Chain lifecycle integration tests.
//!
//! These tests cover what happens around execution: cancellation,
//! cleanup of finished chains, the broadcast event stream, shared state
//! across a parallel wave, and engines configured from a TOML file.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tempfile::TempDir;

use goalchain::config::Config;
use goalchain::core::task::TaskStatus;
use goalchain::orchestration::{
    ChainExecutionEngine, ChainStatus, ChainTask, EventKind, TaskContext, TaskDefinition,
};
use goalchain::planning::task_types;
use goalchain::Error;

use crate::fixtures::{
    context, engine, record_events, register_flaky, register_succeeding, CallCounter,
};

/// Test: Cancel a planning chain
/// Given a chain that has not started
/// When it is cancelled and then executed
/// Then it is cancelled and execution fails with a cancellation error
#[tokio::test]
async fn test_cancel_planning_chain() {
    let engine = engine();
    register_succeeding(&engine, Duration::ZERO);
    let chain = engine.create_task_chain(["Implement login"], context()).unwrap();

    engine.cancel_chain(chain.id).unwrap();
    assert_eq!(engine.chain_status(chain.id).unwrap().status, ChainStatus::Cancelled);

    let err = engine.execute_chain(chain.id).await.unwrap_err();
    assert!(matches!(err, Error::ChainCancelled(id) if id == chain.id));
    assert!(engine.execution_queue().is_empty());
}

/// Test: Cancel an executing chain
/// Given a chain whose first task takes ten seconds
/// When it is cancelled one second in
/// Then execution returns a cancellation error, the running task is settled and later waves never run
#[tokio::test(start_paused = true)]
async fn test_cancel_executing_chain() {
    let engine = engine();
    engine.register_task(TaskDefinition::new("build", task_types::DEVELOPMENT));
    engine.register_task(
        TaskDefinition::new("ship", task_types::DEPLOYMENT).with_dependencies(&["build"]),
    );
    engine.register_executor(task_types::DEVELOPMENT, |_task: ChainTask, _ctx: TaskContext| async {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok::<_, String>(Value::Null)
    });
    let deploys = register_flaky(&engine, task_types::DEPLOYMENT, 0, "");
    let events = record_events(&engine, &[EventKind::ChainCancelled, EventKind::ChainFailed]);

    let chain = engine.create_task_chain(["Deploy it"], context()).unwrap();
    let runner = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.execute_chain(chain.id).await })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(engine.chain_status(chain.id).unwrap().status, ChainStatus::Executing);
    engine.cancel_chain(chain.id).unwrap();

    let result = runner.await.unwrap();
    assert!(matches!(result, Err(Error::ChainCancelled(_))));

    tokio::time::sleep(Duration::from_secs(20)).await;
    let cancelled = engine.chain_status(chain.id).unwrap();
    assert_eq!(cancelled.status, ChainStatus::Cancelled);
    assert!(cancelled.completed_at.is_some());
    assert_eq!(deploys.get(), 0);
    assert_eq!(
        cancelled.task("build").unwrap().status,
        TaskStatus::Failed {
            error: "chain cancelled".to_string()
        }
    );
    assert_eq!(cancelled.task("ship").unwrap().status, TaskStatus::Pending);
    let queue = engine.execution_queue();
    assert_eq!(queue.len(), 1);
    assert!(queue.values().all(|e| e.is_finished()));

    let kinds: Vec<EventKind> = events.lock().iter().map(|e| e.kind()).collect();
    assert_eq!(kinds, vec![EventKind::ChainCancelled]);
}

/// Test: Finished chains cannot be cancelled
/// Given a completed chain
/// When cancel is requested
/// Then the transition is rejected and the chain stays completed
#[tokio::test(start_paused = true)]
async fn test_cancel_completed_chain_is_rejected() {
    let engine = engine();
    register_succeeding(&engine, Duration::from_millis(5));
    let chain = engine.create_task_chain(["Document the API"], context()).unwrap();
    engine.execute_chain(chain.id).await.unwrap();

    let err = engine.cancel_chain(chain.id).unwrap_err();
    assert!(matches!(err, Error::InvalidChainTransition { .. }));
    assert_eq!(engine.chain_status(chain.id).unwrap().status, ChainStatus::Completed);
}

/// Test: Cleanup honours the age cutoff
/// Given a completed, a failed and a planning chain
/// When cleanup runs with a one hour and then a zero age
/// Then only the finished chains are removed, and only by the zero age
#[tokio::test(start_paused = true)]
async fn test_cleanup_completed_chains() {
    let engine = engine();
    register_succeeding(&engine, Duration::from_millis(5));
    engine.register_task(TaskDefinition::new("broken", task_types::TRADING));
    register_flaky(&engine, task_types::TRADING, u32::MAX, "market closed");

    let done = engine.create_task_chain(["Implement search"], context()).unwrap();
    engine.execute_chain(done.id).await.unwrap();
    let failed = engine.create_task_chain(["Trade the signal"], context()).unwrap();
    assert!(engine.execute_chain(failed.id).await.is_err());
    let pending = engine.create_task_chain(["Research options"], context()).unwrap();

    assert_eq!(engine.cleanup_completed_chains(Duration::from_secs(3600)), 0);
    assert_eq!(engine.active_chains().len(), 3);

    assert_eq!(engine.cleanup_completed_chains(Duration::ZERO), 2);
    let remaining: Vec<_> = engine.active_chains().into_iter().map(|c| c.id).collect();
    assert_eq!(remaining, vec![pending.id]);
    assert!(engine.chain_status(done.id).is_none());
    assert!(engine.chain_status(failed.id).is_none());
    assert!(engine.execution_queue().is_empty());
}

/// Test: Broadcast event stream
/// Given a subscriber attached before execution
/// When a one-task chain runs
/// Then it receives the lifecycle in order and events serialize with their tag
#[tokio::test(start_paused = true)]
async fn test_event_stream() {
    let engine = engine();
    register_succeeding(&engine, Duration::from_millis(5));
    let mut rx = engine.events().subscribe();

    let chain = engine.create_task_chain(["Document the API"], context()).unwrap();
    engine.execute_chain(chain.id).await.unwrap();

    let mut kinds = Vec::new();
    let mut tags = Vec::new();
    while let Ok(event) = rx.try_recv() {
        assert_eq!(event.chain_id(), chain.id);
        kinds.push(event.kind());
        tags.push(serde_json::to_value(&event).unwrap()["event"].clone());
    }

    assert_eq!(
        kinds,
        vec![
            EventKind::ChainCreated,
            EventKind::ChainStarted,
            EventKind::TaskStarted,
            EventKind::TaskCompleted,
            EventKind::ChainCompleted,
        ]
    );
    assert_eq!(tags[0], json!("chain_created"));
    assert_eq!(tags[4], json!("chain_completed"));
}

/// Test: Shared state across a parallel wave
/// Given three independent parallel tasks that each write their own key
/// When the chain runs
/// Then every write is visible afterwards alongside the engine's entries
#[tokio::test(start_paused = true)]
async fn test_shared_state_parallel_writes() {
    let engine = engine();
    for id in ["a", "b", "c"] {
        engine.register_task(TaskDefinition::new(id, task_types::RESEARCH).parallelizable(true));
    }
    engine.register_executor(task_types::RESEARCH, |task: ChainTask, ctx: TaskContext| async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        ctx.shared_state.insert(&format!("result:{}", task.id()), json!(task.id()));
        Ok::<_, String>(Value::Null)
    });

    let ctx = context();
    let chain = engine.create_task_chain(["Research options"], ctx.clone()).unwrap();
    assert_eq!(chain.execution_order.len(), 1);
    engine.execute_chain(chain.id).await.unwrap();

    for id in ["a", "b", "c"] {
        assert_eq!(ctx.shared_state.get(&format!("result:{id}")), Some(json!(id)));
    }
    assert_eq!(ctx.shared_state.get("environment"), Some(json!("development")));
    assert!(ctx.shared_state.contains_key("timestamp"));
}

/// Test: Engine configured from a file
/// Given a TOML file setting environment, parallelism and a default retry policy
/// When an engine built from it runs a flaky task
/// Then the configured values reach executors and the retry policy applies
#[tokio::test(start_paused = true)]
async fn test_engine_from_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("goalchain.toml");
    std::fs::write(
        &path,
        r#"
[engine]
environment = "staging"
max_parallelism = 2
error_recovery = false

[engine.default_retry]
max_attempts = 2
backoff_ms = 50
exponential = false
"#,
    )
    .unwrap();

    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.engine.max_parallelism, 2);
    assert_eq!(config.planner.history_limit, 100);

    let engine = ChainExecutionEngine::new(config.engine.clone());
    let seen = Arc::new(Mutex::new(None));
    let calls = {
        let seen = Arc::clone(&seen);
        let calls = CallCounter::new();
        let counted = calls.clone();
        engine.register_executor(task_types::DEVELOPMENT, move |_task: ChainTask, ctx: TaskContext| {
            let call = counted.hit();
            *seen.lock() = ctx.shared_state.get("environment");
            async move {
                if call == 1 {
                    Err::<Value, _>("first try fails".to_string())
                } else {
                    Ok(Value::Null)
                }
            }
        });
        calls
    };

    let chain = engine.create_task_chain(["Implement login"], context()).unwrap();
    assert_eq!(chain.parallelism, 2);
    let finished = engine.execute_chain(chain.id).await.unwrap();

    assert_eq!(finished.status, ChainStatus::Completed);
    assert_eq!(calls.get(), 2);
    assert_eq!(*seen.lock(), Some(json!("staging")));

    config.save_to(&path).unwrap();
    assert_eq!(Config::load_from(&path).unwrap(), config);
}
