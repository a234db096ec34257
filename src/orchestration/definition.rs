//! Registered task definitions and their retry policy.

use crate::core::dag::Dependent;
use crate::util::option_duration_ms;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Retry policy for a task.
///
/// `max_attempts` counts every invocation, the first one included, and is
/// never below 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub exponential: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_ms: 1000,
            exponential: false,
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, backoff_ms: u64, exponential: bool) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_ms,
            exponential,
        }
    }

    /// Attempts allowed, normalised for configs built by hand or
    /// deserialized with `max_attempts = 0`.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before the retry that follows failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        retry_delay(self.backoff_ms, self.exponential, attempt)
    }
}

/// `backoff_ms * 2^(attempt-1)` when exponential, `backoff_ms` otherwise.
pub fn retry_delay(backoff_ms: u64, exponential: bool, attempt: u32) -> Duration {
    if !exponential || attempt <= 1 {
        return Duration::from_millis(backoff_ms);
    }
    let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
    Duration::from_millis(backoff_ms.saturating_mul(factor))
}

/// A unit of work the engine can place into chains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: String,
    /// Selects the executor.
    #[serde(rename = "type")]
    pub task_type: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub parallelizable: bool,
    /// Falls back to the engine's default timeout.
    #[serde(default, rename = "timeout_ms", with = "option_duration_ms")]
    pub timeout: Option<Duration>,
    /// Falls back to the engine's default retry policy.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

fn default_priority() -> u8 {
    50
}

impl TaskDefinition {
    pub fn new(id: &str, task_type: &str) -> Self {
        Self {
            id: id.to_string(),
            task_type: task_type.to_string(),
            name: id.to_string(),
            description: String::new(),
            priority: default_priority(),
            dependencies: Vec::new(),
            parallelizable: false,
            timeout: None,
            retry: None,
            metadata: HashMap::new(),
        }
    }

    /// Default definition for a task type with nothing registered.
    pub fn synthesized(task_type: &str) -> Self {
        let mut definition = Self::new(task_type, task_type);
        definition.name = format!("{} task", task_type.replace('_', " "));
        definition.description = format!("Generated {} step", task_type);
        definition
            .metadata
            .insert("synthesized".to_string(), serde_json::Value::Bool(true));
        definition
    }

    pub fn is_synthesized(&self) -> bool {
        self.metadata
            .get("synthesized")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dependencies<S: AsRef<str>>(mut self, dependencies: &[S]) -> Self {
        self.dependencies = dependencies
            .iter()
            .map(|d| d.as_ref().to_string())
            .collect();
        self
    }

    pub fn parallelizable(mut self, parallelizable: bool) -> Self {
        self.parallelizable = parallelizable;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }
}

impl Dependent for TaskDefinition {
    fn id(&self) -> &str {
        &self.id
    }

    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }
}
