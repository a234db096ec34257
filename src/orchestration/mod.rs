//! Chain orchestration.
//!
//! Task definitions and executors are registered with the
//! [`ChainExecutionEngine`], which builds [`TaskChain`]s from goals or plans
//! and runs them wave by wave, publishing lifecycle events on an
//! [`EventBus`].

pub mod chain;
pub mod context;
pub mod definition;
pub mod engine;
pub mod events;
pub mod executor;

pub use chain::{ChainId, ChainStatus, ChainTask, TaskChain};
pub use context::{SharedState, TaskContext};
pub use definition::{retry_delay, RetryConfig, TaskDefinition};
pub use engine::ChainExecutionEngine;
pub use events::{ChainEvent, EventBus, EventHandler, EventKind};
pub use executor::{Executor, ExecutorRegistry, ExecutorResult};
