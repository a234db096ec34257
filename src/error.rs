use std::time::Duration;

use thiserror::Error;

use crate::orchestration::ChainId;

/// Failure of a single task attempt.
///
/// Kept separate from [`Error`] so the engine can decide per variant whether
/// an attempt is retryable before the failure is surfaced at chain level.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("No executor registered for task type '{0}'")]
    ExecutorNotFound(String),

    #[error("Task timed out after {0:?}")]
    Timeout(Duration),

    #[error("Task execution failed: {0}")]
    Execution(String),
}

impl TaskError {
    /// Whether the retry policy applies to this failure.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TaskError::ExecutorNotFound(_))
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Dependency error: {0}")]
    Dependency(String),

    #[error("Chain not found: {0}")]
    ChainNotFound(ChainId),

    #[error("Invalid chain transition from {from} to {to}")]
    InvalidChainTransition { from: String, to: String },

    #[error("Chain {0} was cancelled")]
    ChainCancelled(ChainId),

    #[error("Task '{task_id}' in chain {chain_id} failed after {attempts} attempt(s): {source}")]
    TaskFailed {
        chain_id: ChainId,
        task_id: String,
        attempts: u32,
        #[source]
        source: TaskError,
    },

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

pub type Result<T> = std::result::Result<T, Error>;
