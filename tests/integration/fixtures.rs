//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Engines with deterministic config
//! - Scripted executors that count their calls
//! - Collecting published events

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};

use goalchain::config::EngineConfig;
use goalchain::orchestration::{ChainEvent, ChainExecutionEngine, ChainTask, EventKind, TaskContext};
use goalchain::planning::task_types;

/// Every task type the analyzer can emit.
pub const ALL_TASK_TYPES: [&str; 13] = [
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

/// Engine config without transient recovery so attempt counts are exact.
pub fn strict_config() -> EngineConfig {
    EngineConfig {
        error_recovery: false,
        ..EngineConfig::default()
    }
}

pub fn engine() -> ChainExecutionEngine {
    ChainExecutionEngine::new(strict_config())
}

pub fn context() -> TaskContext {
    TaskContext::new("u1", "session-1")
}

/// Register an executor for every known task type that finishes after
/// `delay` and echoes the task id.
pub fn register_succeeding(engine: &ChainExecutionEngine, delay: Duration) {
    for task_type in ALL_TASK_TYPES {
        engine.register_executor(task_type, move |task: ChainTask, _ctx: TaskContext| async move {
            tokio::time::sleep(delay).await;
            Ok::<_, String>(json!({ "task": task.id() }))
        });
    }
}

/// Counts executor calls across clones.
#[derive(Clone, Default)]
pub struct CallCounter(Arc<AtomicU32>);

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments and returns the call number, starting at 1.
    pub fn hit(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Register an executor for `task_type` that fails its first `failures`
/// calls with `message` and succeeds afterwards.
pub fn register_flaky(
    engine: &ChainExecutionEngine,
    task_type: &str,
    failures: u32,
    message: &'static str,
) -> CallCounter {
    let counter = CallCounter::new();
    let calls = counter.clone();
    engine.register_executor(task_type, move |_task: ChainTask, _ctx: TaskContext| {
        let call = calls.hit();
        async move {
            if call <= failures {
                Err::<Value, _>(message.to_string())
            } else {
                Ok(json!({ "call": call }))
            }
        }
    });
    counter
}

/// Records every event of the given kinds in emission order.
pub fn record_events(engine: &ChainExecutionEngine, kinds: &[EventKind]) -> Arc<Mutex<Vec<ChainEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    for &kind in kinds {
        let seen = Arc::clone(&seen);
        engine.events().on(kind, move |event| seen.lock().push(event.clone()));
    }
    seen
}
