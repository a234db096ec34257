//! Task chains: the runtime unit the engine executes.

use crate::core::dag::Dependent;
use crate::core::task::TaskStatus;
use crate::error::{Error, Result};
use crate::orchestration::context::TaskContext;
use crate::orchestration::definition::TaskDefinition;
use crate::planning::goal::Goal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub Uuid);

impl ChainId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for ChainId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ChainId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Chain lifecycle.
///
/// ```text
/// planning -> executing -> completed | failed
/// planning | executing -> cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStatus {
    #[default]
    Planning,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

impl ChainStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChainStatus::Completed | ChainStatus::Failed | ChainStatus::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: ChainStatus) -> bool {
        use ChainStatus::*;
        matches!(
            (self, next),
            (Planning, Executing)
                | (Executing, Completed)
                | (Executing, Failed)
                | (Planning, Cancelled)
                | (Executing, Cancelled)
        )
    }
}

impl std::fmt::Display for ChainStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainStatus::Planning => write!(f, "planning"),
            ChainStatus::Executing => write!(f, "executing"),
            ChainStatus::Completed => write!(f, "completed"),
            ChainStatus::Failed => write!(f, "failed"),
            ChainStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A task definition placed in a chain, with its runtime state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainTask {
    pub definition: TaskDefinition,
    pub status: TaskStatus,
    pub attempts: u32,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ChainTask {
    pub fn new(definition: TaskDefinition) -> Self {
        Self {
            definition,
            status: TaskStatus::Pending,
            attempts: 0,
            output: None,
            error: None,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn task_type(&self) -> &str {
        &self.definition.task_type
    }
}

impl Dependent for ChainTask {
    fn id(&self) -> &str {
        &self.definition.id
    }

    fn dependencies(&self) -> &[String] {
        &self.definition.dependencies
    }
}

/// An executable, ordered set of tasks built from goals or a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskChain {
    pub id: ChainId,
    pub name: String,
    pub goals: Vec<Goal>,
    /// Plan the chain was built from, if any.
    pub plan_id: Option<String>,
    pub context: TaskContext,
    pub tasks: Vec<ChainTask>,
    /// Waves of task ids; every dependency sits in an earlier wave.
    pub execution_order: Vec<Vec<String>>,
    pub status: ChainStatus,
    pub parallelism: usize,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl TaskChain {
    pub fn task(&self, id: &str) -> Option<&ChainTask> {
        self.tasks.iter().find(|t| t.id() == id)
    }

    pub fn task_mut(&mut self, id: &str) -> Option<&mut ChainTask> {
        self.tasks.iter_mut().find(|t| t.id() == id)
    }

    pub fn completed_tasks(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count()
    }

    /// Move to `next`, stamping `started_at` or `completed_at`.
    pub(crate) fn transition(&mut self, next: ChainStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidChainTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        if next == ChainStatus::Executing {
            self.started_at = Some(Utc::now());
        } else if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }
}
