pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod orchestration;
pub mod planning;
pub mod util;

pub use error::{Error, Result, TaskError};
pub use orchestration::{ChainExecutionEngine, ChainId, ChainStatus, TaskChain, TaskContext};
pub use planning::{Goal, GoalType, Planner, TaskPlan};
