//! Chain execution engine.
//!
//! The engine turns goals (or a finished [`TaskPlan`]) into a [`TaskChain`],
//! then drives the chain wave by wave. Within a wave, tasks are dispatched
//! highest priority first: runs of parallelizable tasks execute concurrently
//! under the chain's semaphore, and a non-parallelizable task runs alone.
//!
//! Every attempt is raced against the task timeout and the chain's
//! cancellation token. Failed attempts are retried per the task's
//! [`RetryConfig`](crate::orchestration::RetryConfig); a transient failure
//! additionally earns one immediate retry that does not count against it.
//!
//! # Example
//!
//! ```ignore
//! use goalchain::config::EngineConfig;
//! use goalchain::orchestration::{ChainExecutionEngine, ChainTask, TaskContext};
//! use serde_json::json;
//!
//! let engine = ChainExecutionEngine::new(EngineConfig::default());
//! engine.register_executor("development", |task: ChainTask, _ctx: TaskContext| async move {
//!     Ok::<_, String>(json!({ "done": task.id() }))
//! });
//!
//! let chain = engine.create_task_chain(["Implement login"], TaskContext::new("u1", "s1"))?;
//! let finished = engine.execute_chain(chain.id).await?;
//! ```

use crate::config::EngineConfig;
use crate::core::dag::DependencyGraph;
use crate::core::task::{queue_key, TaskExecution, TaskStatus};
use crate::error::{Error, Result, TaskError};
use crate::orchestration::chain::{ChainId, ChainStatus, ChainTask, TaskChain};
use crate::orchestration::context::TaskContext;
use crate::orchestration::definition::TaskDefinition;
use crate::orchestration::events::{ChainEvent, EventBus};
use crate::orchestration::executor::{Executor, ExecutorRegistry};
use crate::planning::analyzer::{phase_rank, task_types, GoalAnalyzer};
use crate::planning::goal::Goal;
use crate::planning::plan::TaskPlan;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

struct ChainEntry {
    chain: TaskChain,
    token: CancellationToken,
}

struct Inner {
    config: EngineConfig,
    analyzer: GoalAnalyzer,
    /// Registered definitions in registration order.
    definitions: RwLock<Vec<TaskDefinition>>,
    executors: ExecutorRegistry,
    chains: RwLock<HashMap<ChainId, ChainEntry>>,
    /// Latest execution record per `chain:task` key.
    queue: RwLock<HashMap<String, TaskExecution>>,
    events: EventBus,
}

/// Builds and runs task chains. Clones share all state.
#[derive(Clone)]
pub struct ChainExecutionEngine {
    inner: Arc<Inner>,
}

impl ChainExecutionEngine {
    pub fn new(config: EngineConfig) -> Self {
        let events = EventBus::new(config.event_capacity);
        Self {
            inner: Arc::new(Inner {
                config,
                analyzer: GoalAnalyzer::new(),
                definitions: RwLock::new(Vec::new()),
                executors: ExecutorRegistry::new(),
                chains: RwLock::new(HashMap::new()),
                queue: RwLock::new(HashMap::new()),
                events,
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Lifecycle events of every chain run by this engine.
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn executors(&self) -> &ExecutorRegistry {
        &self.inner.executors
    }

    /// Register a task definition, replacing any with the same id.
    pub fn register_task(&self, definition: TaskDefinition) {
        let mut definitions = self.inner.definitions.write();
        match definitions.iter_mut().find(|d| d.id == definition.id) {
            Some(existing) => {
                debug!(task_id = %definition.id, "replacing task definition");
                *existing = definition;
            }
            None => {
                debug!(task_id = %definition.id, task_type = %definition.task_type, "registered task definition");
                definitions.push(definition);
            }
        }
    }

    pub fn registered_tasks(&self) -> Vec<TaskDefinition> {
        self.inner.definitions.read().clone()
    }

    /// Register the executor for a task type, replacing any existing one.
    pub fn register_executor<E>(&self, task_type: &str, executor: E)
    where
        E: Executor + 'static,
    {
        if self.inner.executors.register(task_type, executor) {
            debug!(task_type, "replaced executor");
        } else {
            debug!(task_type, "registered executor");
        }
    }

    /// Build a chain for `goals`.
    ///
    /// Every task type detected in a goal's description selects the
    /// registered definitions of that type (plus the registered definitions
    /// they depend on). Types with nothing registered get a synthesized
    /// definition that depends on the nearest earlier phase in the chain.
    /// Text with no recognised intent maps to a `general` task.
    pub fn create_task_chain<I, G>(&self, goals: I, context: TaskContext) -> Result<TaskChain>
    where
        I: IntoIterator<Item = G>,
        G: Into<Goal>,
    {
        let goals: Vec<Goal> = goals.into_iter().map(Into::into).collect();
        if goals.is_empty() {
            return Err(Error::Validation(
                "a chain needs at least one goal".to_string(),
            ));
        }

        let definitions = self.select_definitions(&goals);
        let name = chain_name(&goals);
        let parallelism = self.inner.config.max_parallelism;
        Ok(self.insert_chain(name, goals, None, definitions, parallelism, context))
    }

    /// Build a chain that runs the tasks of an existing plan.
    ///
    /// Registered definitions with a matching id contribute their timeout
    /// and retry policy. Parallelism follows the plan's strategy, capped by
    /// the engine's limit.
    pub fn create_chain_from_plan(&self, plan: &TaskPlan, context: TaskContext) -> Result<TaskChain> {
        if plan.tasks.is_empty() {
            return Err(Error::Validation(format!("plan {} has no tasks", plan.id)));
        }

        let registered = self.inner.definitions.read().clone();
        let mut definitions: Vec<TaskDefinition> = Vec::with_capacity(plan.tasks.len());
        for task in &plan.tasks {
            if definitions.iter().any(|d| d.id == task.id) {
                continue;
            }
            let mut definition = TaskDefinition::new(&task.id, &task.task_type)
                .with_name(&task.name)
                .with_priority(task.priority)
                .with_dependencies(&task.dependencies)
                .parallelizable(task.parallelizable);
            definition.metadata.insert(
                "estimated_duration_ms".to_string(),
                json!(task.estimated_duration.as_millis() as u64),
            );
            if let Some(known) = registered.iter().find(|d| d.id == task.id) {
                definition.timeout = known.timeout;
                definition.retry = known.retry;
            }
            definitions.push(definition);
        }

        let parallelism = plan
            .execution_strategy
            .parallelism_level
            .min(self.inner.config.max_parallelism);
        Ok(self.insert_chain(
            format!("plan {}", plan.id),
            Vec::new(),
            Some(plan.id.clone()),
            definitions,
            parallelism,
            context,
        ))
    }

    /// Run a chain in the planning state to completion.
    ///
    /// Returns the finished chain, `Error::TaskFailed` when a task exhausts
    /// its attempts, or `Error::ChainCancelled` when the chain is cancelled
    /// before or during execution.
    pub async fn execute_chain(&self, chain_id: ChainId) -> Result<TaskChain> {
        let (token, waves, parallelism, context) = {
            let mut chains = self.inner.chains.write();
            let entry = chains
                .get_mut(&chain_id)
                .ok_or(Error::ChainNotFound(chain_id))?;
            if entry.chain.status == ChainStatus::Cancelled {
                return Err(Error::ChainCancelled(chain_id));
            }
            entry.chain.transition(ChainStatus::Executing)?;
            (
                entry.token.clone(),
                entry.chain.execution_order.clone(),
                entry.chain.parallelism,
                entry.chain.context.clone(),
            )
        };

        context.shared_state.merge([
            ("timestamp".to_string(), json!(Utc::now().to_rfc3339())),
            (
                "environment".to_string(),
                json!(self.inner.config.environment),
            ),
        ]);
        info!(chain_id = %chain_id, waves = waves.len(), parallelism, "chain started");
        self.inner.events.emit(ChainEvent::ChainStarted { chain_id });

        match self
            .run_waves(chain_id, &waves, parallelism, &context, &token)
            .await
        {
            Ok(()) => self.complete_chain(chain_id),
            Err(Error::ChainCancelled(_)) => {
                info!(chain_id = %chain_id, "chain execution stopped by cancellation");
                Err(Error::ChainCancelled(chain_id))
            }
            Err(err) => {
                if self.fail_chain(chain_id, &err) {
                    Err(err)
                } else {
                    Err(Error::ChainCancelled(chain_id))
                }
            }
        }
    }

    /// Cancel a chain that is planning or executing.
    ///
    /// The status changes immediately and tasks in flight are marked failed.
    /// Executor calls already running keep going in the background but their
    /// results are discarded.
    pub fn cancel_chain(&self, chain_id: ChainId) -> Result<()> {
        let token = {
            let mut chains = self.inner.chains.write();
            let entry = chains
                .get_mut(&chain_id)
                .ok_or(Error::ChainNotFound(chain_id))?;
            entry.chain.transition(ChainStatus::Cancelled)?;
            let mut queue = self.inner.queue.write();
            settle_in_flight(&mut entry.chain, &mut queue, "chain cancelled");
            entry.token.clone()
        };
        token.cancel();
        info!(chain_id = %chain_id, "chain cancelled");
        self.inner.events.emit(ChainEvent::ChainCancelled { chain_id });
        Ok(())
    }

    pub fn chain_status(&self, chain_id: ChainId) -> Option<TaskChain> {
        self.inner
            .chains
            .read()
            .get(&chain_id)
            .map(|entry| entry.chain.clone())
    }

    /// Every retained chain, oldest first.
    pub fn active_chains(&self) -> Vec<TaskChain> {
        let mut chains: Vec<TaskChain> = self
            .inner
            .chains
            .read()
            .values()
            .map(|entry| entry.chain.clone())
            .collect();
        chains.sort_by_key(|c| c.created_at);
        chains
    }

    /// Latest execution record of every dispatched task, keyed `chain:task`.
    pub fn execution_queue(&self) -> HashMap<String, TaskExecution> {
        self.inner.queue.read().clone()
    }

    /// Drop terminal chains completed strictly before `now - max_age`, along
    /// with their execution records. Returns how many chains were removed.
    pub fn cleanup_completed_chains(&self, max_age: Duration) -> usize {
        let Ok(age) = chrono::Duration::from_std(max_age) else {
            return 0;
        };
        let Some(cutoff) = Utc::now().checked_sub_signed(age) else {
            return 0;
        };

        let mut chains = self.inner.chains.write();
        let expired: Vec<ChainId> = chains
            .values()
            .filter(|entry| expired(&entry.chain, cutoff))
            .map(|entry| entry.chain.id)
            .collect();
        if expired.is_empty() {
            return 0;
        }

        let mut queue = self.inner.queue.write();
        for chain_id in &expired {
            chains.remove(chain_id);
            queue.retain(|_, execution| execution.chain_id != *chain_id);
        }
        info!(removed = expired.len(), "cleaned up completed chains");
        expired.len()
    }

    fn select_definitions(&self, goals: &[Goal]) -> Vec<TaskDefinition> {
        let registered = self.inner.definitions.read().clone();
        let mut selected: Vec<TaskDefinition> = Vec::new();

        for goal in goals {
            let mut types = self.inner.analyzer.detect_task_types(&goal.description);
            if types.is_empty() {
                types.push(task_types::GENERAL);
            }
            let priority = goal.effective_priority();
            debug!(goal_id = %goal.id, ?types, "detected task types");

            for task_type in types {
                let matching: Vec<&TaskDefinition> = registered
                    .iter()
                    .filter(|d| d.task_type == task_type)
                    .collect();
                if matching.is_empty() {
                    match selected.iter_mut().find(|d| d.id == task_type) {
                        Some(existing) => existing.priority = existing.priority.max(priority),
                        None => selected
                            .push(TaskDefinition::synthesized(task_type).with_priority(priority)),
                    }
                } else {
                    for definition in matching {
                        include_with_dependencies(definition, &registered, &mut selected);
                    }
                }
            }
        }

        link_synthesized(&mut selected);
        selected
    }

    fn insert_chain(
        &self,
        name: String,
        goals: Vec<Goal>,
        plan_id: Option<String>,
        definitions: Vec<TaskDefinition>,
        parallelism: usize,
        context: TaskContext,
    ) -> TaskChain {
        let execution_order = DependencyGraph::build(&definitions).waves();
        let chain = TaskChain {
            id: ChainId::new(),
            name,
            goals,
            plan_id,
            context,
            tasks: definitions.into_iter().map(ChainTask::new).collect(),
            execution_order,
            status: ChainStatus::Planning,
            parallelism: parallelism.max(1),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
        };

        info!(
            chain_id = %chain.id,
            tasks = chain.tasks.len(),
            waves = chain.execution_order.len(),
            "chain created"
        );
        self.inner.chains.write().insert(
            chain.id,
            ChainEntry {
                chain: chain.clone(),
                token: CancellationToken::new(),
            },
        );
        self.inner.events.emit(ChainEvent::ChainCreated {
            chain_id: chain.id,
            name: chain.name.clone(),
            task_count: chain.tasks.len(),
        });
        chain
    }

    async fn run_waves(
        &self,
        chain_id: ChainId,
        waves: &[Vec<String>],
        parallelism: usize,
        context: &TaskContext,
        token: &CancellationToken,
    ) -> Result<()> {
        let semaphore = Arc::new(Semaphore::new(parallelism.max(1)));

        for (index, wave) in waves.iter().enumerate() {
            if token.is_cancelled() {
                return Err(Error::ChainCancelled(chain_id));
            }
            let tasks = self.wave_tasks(chain_id, wave)?;
            debug!(chain_id = %chain_id, wave = index, tasks = tasks.len(), "dispatching wave");

            for batch in batches(tasks) {
                self.run_batch(chain_id, batch, &semaphore, context, token)
                    .await?;
            }
        }
        Ok(())
    }

    /// Snapshot of a wave's tasks, highest priority first.
    fn wave_tasks(&self, chain_id: ChainId, wave: &[String]) -> Result<Vec<ChainTask>> {
        let chains = self.inner.chains.read();
        let entry = chains
            .get(&chain_id)
            .ok_or(Error::ChainNotFound(chain_id))?;
        let mut tasks: Vec<ChainTask> = wave
            .iter()
            .filter_map(|id| entry.chain.task(id).cloned())
            .collect();
        tasks.sort_by(|a, b| b.definition.priority.cmp(&a.definition.priority));
        Ok(tasks)
    }

    async fn run_batch(
        &self,
        chain_id: ChainId,
        batch: Vec<ChainTask>,
        semaphore: &Arc<Semaphore>,
        context: &TaskContext,
        token: &CancellationToken,
    ) -> Result<()> {
        let mut set = JoinSet::new();
        for task in batch {
            let engine = self.clone();
            let semaphore = Arc::clone(semaphore);
            let context = context.clone();
            let token = token.clone();
            set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| Error::TaskJoin(e.to_string()))?;
                engine.run_task(chain_id, task, context, token).await
            });
        }

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    set.detach_all();
                    return Err(Error::ChainCancelled(chain_id));
                }
                joined = set.join_next() => match joined {
                    None => return Ok(()),
                    Some(Ok(Ok(()))) => {}
                    Some(Ok(Err(err))) => {
                        set.abort_all();
                        return Err(err);
                    }
                    Some(Err(join_err)) => {
                        set.abort_all();
                        return Err(Error::TaskJoin(join_err.to_string()));
                    }
                },
            }
        }
    }

    async fn run_task(
        &self,
        chain_id: ChainId,
        task: ChainTask,
        context: TaskContext,
        token: CancellationToken,
    ) -> Result<()> {
        let config = &self.inner.config;
        let task_id = task.id().to_string();
        let retry = task.definition.retry.unwrap_or(config.default_retry);
        let max_attempts = retry.attempts();
        let timeout = task.definition.timeout.unwrap_or(config.default_timeout);

        let mut attempt = 0u32;
        let mut failures = 0u32;
        let mut recovered = false;

        loop {
            if token.is_cancelled() {
                return Err(Error::ChainCancelled(chain_id));
            }
            attempt += 1;
            if !self.record(chain_id, &task_id, |e| e.start_attempt()) {
                return Err(Error::ChainCancelled(chain_id));
            }
            context
                .shared_state
                .insert("timestamp", json!(Utc::now().to_rfc3339()));
            debug!(chain_id = %chain_id, task_id = %task_id, attempt, "task attempt started");
            self.inner.events.emit(ChainEvent::TaskStarted {
                chain_id,
                task_id: task_id.clone(),
                attempt,
            });

            let mut snapshot = task.clone();
            snapshot.attempts = attempt;
            snapshot.status = TaskStatus::Running;

            let failure = match self.invoke(snapshot, &context, timeout, &token).await {
                None => return Err(Error::ChainCancelled(chain_id)),
                Some(Ok(output)) => {
                    if !self.record(chain_id, &task_id, |e| e.complete(output.clone())) {
                        return Err(Error::ChainCancelled(chain_id));
                    }
                    info!(chain_id = %chain_id, task_id = %task_id, attempt, "task completed");
                    self.inner.events.emit(ChainEvent::TaskCompleted {
                        chain_id,
                        task_id,
                        output,
                    });
                    return Ok(());
                }
                Some(Err(failure)) => failure,
            };

            let message = failure.to_string();
            warn!(chain_id = %chain_id, task_id = %task_id, attempt, error = %message, "task attempt failed");
            self.inner.events.emit(ChainEvent::TaskFailed {
                chain_id,
                task_id: task_id.clone(),
                attempt,
                error: message.clone(),
            });

            if !failure.is_retryable() {
                return self.give_up(chain_id, &task_id, attempt, failure);
            }

            let transient =
                matches!(failure, TaskError::Timeout(_)) || config.is_transient(&message);
            let delay = if config.error_recovery && transient && !recovered {
                recovered = true;
                info!(chain_id = %chain_id, task_id = %task_id, "transient failure, retrying immediately");
                Duration::ZERO
            } else {
                failures += 1;
                if failures >= max_attempts {
                    return self.give_up(chain_id, &task_id, attempt, failure);
                }
                retry.delay_for(failures)
            };

            if !self.record(chain_id, &task_id, |e| e.schedule_retry(&message)) {
                return Err(Error::ChainCancelled(chain_id));
            }
            self.inner.events.emit(ChainEvent::TaskRetried {
                chain_id,
                task_id: task_id.clone(),
                attempt: attempt + 1,
                delay,
            });

            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(Error::ChainCancelled(chain_id)),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    /// Run one executor call. `None` means the chain was cancelled first.
    async fn invoke(
        &self,
        task: ChainTask,
        context: &TaskContext,
        timeout: Duration,
        token: &CancellationToken,
    ) -> Option<std::result::Result<Value, TaskError>> {
        let Some(executor) = self.inner.executors.get(task.task_type()) else {
            return Some(Err(TaskError::ExecutorNotFound(
                task.task_type().to_string(),
            )));
        };

        // Spawned so a cancelled chain can leave the call running detached.
        let mut handle = tokio::spawn(executor.execute(task, context.clone()));
        let joined = tokio::select! {
            biased;
            _ = token.cancelled() => return None,
            joined = tokio::time::timeout(timeout, &mut handle) => joined,
        };

        Some(match joined {
            Ok(Ok(Ok(output))) => Ok(output),
            Ok(Ok(Err(message))) => Err(TaskError::Execution(message)),
            Ok(Err(join_err)) => Err(TaskError::Execution(format!(
                "executor panicked: {}",
                join_err
            ))),
            Err(_) => {
                handle.abort();
                Err(TaskError::Timeout(timeout))
            }
        })
    }

    fn give_up(
        &self,
        chain_id: ChainId,
        task_id: &str,
        attempts: u32,
        source: TaskError,
    ) -> Result<()> {
        let message = source.to_string();
        self.record(chain_id, task_id, |e| e.fail(&message));
        error!(chain_id = %chain_id, task_id, attempts, error = %message, "task failed");
        Err(Error::TaskFailed {
            chain_id,
            task_id: task_id.to_string(),
            attempts,
            source,
        })
    }

    /// Apply `update` to the task's execution record and mirror it into the
    /// chain. Returns `false`, changing nothing, once the chain has left the
    /// executing state.
    fn record<F>(&self, chain_id: ChainId, task_id: &str, update: F) -> bool
    where
        F: FnOnce(&mut TaskExecution),
    {
        let mut chains = self.inner.chains.write();
        let Some(entry) = chains.get_mut(&chain_id) else {
            return false;
        };
        if entry.chain.status != ChainStatus::Executing {
            return false;
        }

        let mut queue = self.inner.queue.write();
        let execution = queue
            .entry(queue_key(&chain_id, task_id))
            .or_insert_with(|| TaskExecution::new(chain_id, task_id));
        update(execution);

        if let Some(task) = entry.chain.task_mut(task_id) {
            mirror(task, execution);
        }
        true
    }

    fn complete_chain(&self, chain_id: ChainId) -> Result<TaskChain> {
        let chain = {
            let mut chains = self.inner.chains.write();
            let entry = chains
                .get_mut(&chain_id)
                .ok_or(Error::ChainNotFound(chain_id))?;
            if entry.chain.status == ChainStatus::Cancelled {
                return Err(Error::ChainCancelled(chain_id));
            }
            entry.chain.transition(ChainStatus::Completed)?;
            entry.chain.clone()
        };
        info!(chain_id = %chain_id, tasks = chain.tasks.len(), "chain completed");
        self.inner
            .events
            .emit(ChainEvent::ChainCompleted { chain_id });
        Ok(chain)
    }

    /// Returns `false` when the chain was no longer executing.
    fn fail_chain(&self, chain_id: ChainId, err: &Error) -> bool {
        let failed = {
            let mut chains = self.inner.chains.write();
            match chains.get_mut(&chain_id) {
                Some(entry) if entry.chain.status == ChainStatus::Executing => {
                    entry.chain.error = Some(err.to_string());
                    let failed = entry.chain.transition(ChainStatus::Failed).is_ok();
                    if failed {
                        let mut queue = self.inner.queue.write();
                        settle_in_flight(&mut entry.chain, &mut queue, "chain failed");
                    }
                    failed
                }
                _ => false,
            }
        };
        if failed {
            error!(chain_id = %chain_id, error = %err, "chain failed");
            self.inner.events.emit(ChainEvent::ChainFailed {
                chain_id,
                error: err.to_string(),
            });
        }
        failed
    }
}

/// Terminal and completed strictly before `cutoff`.
fn expired(chain: &TaskChain, cutoff: DateTime<Utc>) -> bool {
    chain.status.is_terminal() && chain.completed_at.is_some_and(|at| at < cutoff)
}

fn mirror(task: &mut ChainTask, execution: &TaskExecution) {
    task.status = execution.status.clone();
    task.attempts = execution.attempts;
    task.output = execution.output.clone();
    task.error = execution.error.clone();
    task.started_at.get_or_insert(execution.started_at);
    task.completed_at = execution.completed_at;
}

/// Fail every unfinished execution record of a chain that has stopped.
/// Tasks never dispatched have no record and stay pending.
fn settle_in_flight(
    chain: &mut TaskChain,
    queue: &mut HashMap<String, TaskExecution>,
    reason: &str,
) {
    for execution in queue.values_mut() {
        if execution.chain_id != chain.id || execution.is_finished() {
            continue;
        }
        execution.fail(reason);
        if let Some(task) = chain.task_mut(&execution.task_id) {
            mirror(task, execution);
        }
        debug!(chain_id = %chain.id, task_id = %execution.task_id, reason, "in-flight task settled");
    }
}

impl Default for ChainExecutionEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl std::fmt::Debug for ChainExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainExecutionEngine")
            .field("chains", &self.inner.chains.read().len())
            .field("definitions", &self.inner.definitions.read().len())
            .field("executors", &self.inner.executors)
            .finish()
    }
}

fn chain_name(goals: &[Goal]) -> String {
    let first = goals
        .first()
        .map(|g| g.description.trim().to_string())
        .unwrap_or_default();
    match goals.len() {
        0 | 1 => first,
        n => format!("{} (+{} more)", first, n - 1),
    }
}

fn include_with_dependencies(
    definition: &TaskDefinition,
    registered: &[TaskDefinition],
    selected: &mut Vec<TaskDefinition>,
) {
    if selected.iter().any(|d| d.id == definition.id) {
        return;
    }
    selected.push(definition.clone());
    for dependency in &definition.dependencies {
        if let Some(found) = registered.iter().find(|d| &d.id == dependency) {
            include_with_dependencies(found, registered, selected);
        }
    }
}

/// Make each synthesized definition depend on every task of the nearest
/// earlier phase present.
fn link_synthesized(definitions: &mut [TaskDefinition]) {
    let ranks: Vec<(String, u8)> = definitions
        .iter()
        .map(|d| (d.id.clone(), phase_rank(&d.task_type)))
        .collect();
    for definition in definitions.iter_mut().filter(|d| d.is_synthesized()) {
        let rank = phase_rank(&definition.task_type);
        if let Some(previous) = ranks.iter().map(|(_, r)| *r).filter(|r| *r < rank).max() {
            definition.dependencies = ranks
                .iter()
                .filter(|(_, r)| *r == previous)
                .map(|(id, _)| id.clone())
                .collect();
        }
    }
}

/// Split a priority-ordered wave into dispatch batches: consecutive
/// parallelizable tasks share a batch, anything else runs alone.
fn batches(tasks: Vec<ChainTask>) -> Vec<Vec<ChainTask>> {
    let mut out: Vec<Vec<ChainTask>> = Vec::new();
    for task in tasks {
        let joins_previous = task.definition.parallelizable
            && out
                .last()
                .and_then(|batch| batch.last())
                .is_some_and(|last| last.definition.parallelizable);
        match out.last_mut() {
            Some(batch) if joins_previous => batch.push(task),
            _ => out.push(vec![task]),
        }
    }
    out
}
