//! Runtime task state for chain execution.
//!
//! `TaskStatus` is the per-task state machine driven by the chain engine:
//!
//! ```text
//! pending -> running -> completed
//!               |
//!               +-> retry_pending -> running ...
//!               |
//!               +-> failed
//! ```
//!
//! A retried attempt never passes through `failed`; that state is terminal.
//! Tasks still running or awaiting a retry when their chain stops end `failed`.
//!
//! `TaskExecution` records the latest attempt of one task in one chain and
//! is what the engine exposes through its execution queue.

use crate::orchestration::ChainId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task status in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TaskStatus {
    /// Waiting for its wave.
    Pending,
    /// An attempt is in flight.
    Running,
    /// Last attempt failed; waiting out the backoff delay.
    RetryPending {
        /// Attempt number that will run next.
        next_attempt: u32,
    },
    /// Task completed successfully.
    Completed,
    /// Task failed and will not be retried.
    Failed {
        /// Error message describing the failure.
        error: String,
    },
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed { .. })
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::RetryPending { next_attempt } => {
                write!(f, "retry_pending (attempt {})", next_attempt)
            }
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed { error } => write!(f, "failed: {}", error),
        }
    }
}

/// Runtime record of a task's attempts within a chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecution {
    /// Chain the task belongs to.
    pub chain_id: ChainId,
    /// Task definition id.
    pub task_id: String,
    /// Number of attempts started so far.
    pub attempts: u32,
    /// Current status.
    pub status: TaskStatus,
    /// When the first attempt started.
    pub started_at: DateTime<Utc>,
    /// When the task reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// Executor output of the successful attempt.
    pub output: Option<serde_json::Value>,
    /// Error of the last failed attempt.
    pub error: Option<String>,
}

impl TaskExecution {
    /// Create a pending record for a task about to be dispatched.
    pub fn new(chain_id: ChainId, task_id: &str) -> Self {
        Self {
            chain_id,
            task_id: task_id.to_string(),
            attempts: 0,
            status: TaskStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            output: None,
            error: None,
        }
    }

    /// Key under which the engine's execution queue stores this record.
    pub fn key(&self) -> String {
        queue_key(&self.chain_id, &self.task_id)
    }

    /// Begin a new attempt.
    pub fn start_attempt(&mut self) {
        self.attempts += 1;
        self.status = TaskStatus::Running;
    }

    /// Record a failed attempt that will be retried.
    pub fn schedule_retry(&mut self, error: &str) {
        self.error = Some(error.to_string());
        self.status = TaskStatus::RetryPending {
            next_attempt: self.attempts + 1,
        };
    }

    pub fn complete(&mut self, output: serde_json::Value) {
        self.status = TaskStatus::Completed;
        self.output = Some(output);
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: &str) {
        self.status = TaskStatus::Failed {
            error: error.to_string(),
        };
        self.error = Some(error.to_string());
        self.completed_at = Some(Utc::now());
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Execution queue key for a task in a chain.
pub fn queue_key(chain_id: &ChainId, task_id: &str) -> String {
    format!("{}:{}", chain_id, task_id)
}
