//! Executors: caller-supplied asynchronous work, keyed by task type.

use crate::orchestration::chain::ChainTask;
use crate::orchestration::context::TaskContext;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// What an executor resolves to: an output value or an error message.
pub type ExecutorResult = std::result::Result<serde_json::Value, String>;

/// Runs one attempt of a task.
///
/// Implemented for any `Fn(ChainTask, TaskContext) -> impl Future` so plain
/// async closures can be registered directly.
pub trait Executor: Send + Sync {
    fn execute(&self, task: ChainTask, context: TaskContext) -> BoxFuture<'static, ExecutorResult>;
}

impl<F, Fut> Executor for F
where
    F: Fn(ChainTask, TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = ExecutorResult> + Send + 'static,
{
    fn execute(&self, task: ChainTask, context: TaskContext) -> BoxFuture<'static, ExecutorResult> {
        Box::pin(self(task, context))
    }
}

/// Task type -> executor. Re-registering a type replaces its executor.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: Arc<RwLock<HashMap<String, Arc<dyn Executor>>>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when an existing executor was replaced.
    pub fn register<E>(&self, task_type: &str, executor: E) -> bool
    where
        E: Executor + 'static,
    {
        self.executors
            .write()
            .insert(task_type.to_string(), Arc::new(executor))
            .is_some()
    }

    pub fn get(&self, task_type: &str) -> Option<Arc<dyn Executor>> {
        self.executors.read().get(task_type).cloned()
    }

    pub fn contains(&self, task_type: &str) -> bool {
        self.executors.read().contains_key(task_type)
    }

    /// Registered task types, sorted.
    pub fn task_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.executors.read().keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.executors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.read().is_empty()
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("task_types", &self.task_types())
            .finish()
    }
}
