//! Chain and task lifecycle events.
//!
//! Events reach listeners two ways: handlers registered per [`EventKind`]
//! with [`EventBus::on`] run synchronously inside `emit`, and every event is
//! also broadcast to receivers obtained from [`EventBus::subscribe`].

use crate::orchestration::chain::ChainId;
use crate::util::duration_ms;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ChainCreated,
    ChainStarted,
    ChainCompleted,
    ChainFailed,
    ChainCancelled,
    TaskStarted,
    TaskCompleted,
    TaskFailed,
    TaskRetried,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ChainCreated => "chain:created",
            EventKind::ChainStarted => "chain:started",
            EventKind::ChainCompleted => "chain:completed",
            EventKind::ChainFailed => "chain:failed",
            EventKind::ChainCancelled => "chain:cancelled",
            EventKind::TaskStarted => "task:started",
            EventKind::TaskCompleted => "task:completed",
            EventKind::TaskFailed => "task:failed",
            EventKind::TaskRetried => "task:retried",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChainEvent {
    ChainCreated {
        chain_id: ChainId,
        name: String,
        task_count: usize,
    },
    ChainStarted {
        chain_id: ChainId,
    },
    ChainCompleted {
        chain_id: ChainId,
    },
    ChainFailed {
        chain_id: ChainId,
        error: String,
    },
    ChainCancelled {
        chain_id: ChainId,
    },
    TaskStarted {
        chain_id: ChainId,
        task_id: String,
        attempt: u32,
    },
    TaskCompleted {
        chain_id: ChainId,
        task_id: String,
        output: serde_json::Value,
    },
    TaskFailed {
        chain_id: ChainId,
        task_id: String,
        attempt: u32,
        error: String,
    },
    /// `attempt` is the attempt about to run after `delay`.
    TaskRetried {
        chain_id: ChainId,
        task_id: String,
        attempt: u32,
        #[serde(with = "duration_ms")]
        delay: Duration,
    },
}

impl ChainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ChainEvent::ChainCreated { .. } => EventKind::ChainCreated,
            ChainEvent::ChainStarted { .. } => EventKind::ChainStarted,
            ChainEvent::ChainCompleted { .. } => EventKind::ChainCompleted,
            ChainEvent::ChainFailed { .. } => EventKind::ChainFailed,
            ChainEvent::ChainCancelled { .. } => EventKind::ChainCancelled,
            ChainEvent::TaskStarted { .. } => EventKind::TaskStarted,
            ChainEvent::TaskCompleted { .. } => EventKind::TaskCompleted,
            ChainEvent::TaskFailed { .. } => EventKind::TaskFailed,
            ChainEvent::TaskRetried { .. } => EventKind::TaskRetried,
        }
    }

    pub fn chain_id(&self) -> ChainId {
        match self {
            ChainEvent::ChainCreated { chain_id, .. }
            | ChainEvent::ChainStarted { chain_id }
            | ChainEvent::ChainCompleted { chain_id }
            | ChainEvent::ChainFailed { chain_id, .. }
            | ChainEvent::ChainCancelled { chain_id }
            | ChainEvent::TaskStarted { chain_id, .. }
            | ChainEvent::TaskCompleted { chain_id, .. }
            | ChainEvent::TaskFailed { chain_id, .. }
            | ChainEvent::TaskRetried { chain_id, .. } => *chain_id,
        }
    }

    pub fn task_id(&self) -> Option<&str> {
        match self {
            ChainEvent::TaskStarted { task_id, .. }
            | ChainEvent::TaskCompleted { task_id, .. }
            | ChainEvent::TaskFailed { task_id, .. }
            | ChainEvent::TaskRetried { task_id, .. } => Some(task_id),
            _ => None,
        }
    }
}

pub type EventHandler = Arc<dyn Fn(&ChainEvent) + Send + Sync>;

pub struct EventBus {
    handlers: RwLock<HashMap<EventKind, Vec<EventHandler>>>,
    sender: broadcast::Sender<ChainEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            handlers: RwLock::new(HashMap::new()),
            sender,
        }
    }

    /// Register a handler for one kind of event.
    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&ChainEvent) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .entry(kind)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.sender.subscribe()
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.read().get(&kind).map_or(0, Vec::len)
    }

    pub fn emit(&self, event: ChainEvent) {
        // Handlers may register further handlers; call them outside the lock.
        let handlers: Vec<EventHandler> = self
            .handlers
            .read()
            .get(&event.kind())
            .cloned()
            .unwrap_or_default();
        for handler in handlers {
            handler(&event);
        }
        // No receivers is not an error.
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers: usize = self.handlers.read().values().map(Vec::len).sum();
        f.debug_struct("EventBus")
            .field("handlers", &handlers)
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}
