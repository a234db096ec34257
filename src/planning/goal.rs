//! Goals as supplied by callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Declared category of a goal.
///
/// Parsing is lenient: unknown names map to `General` rather than failing,
/// so a malformed goal still gets a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GoalType {
    Development,
    Analysis,
    Trading,
    Research,
    Deployment,
    Maintenance,
    #[default]
    General,
}

impl GoalType {
    pub const ALL: [GoalType; 7] = [
        GoalType::Development,
        GoalType::Analysis,
        GoalType::Trading,
        GoalType::Research,
        GoalType::Deployment,
        GoalType::Maintenance,
        GoalType::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GoalType::Development => "development",
            GoalType::Analysis => "analysis",
            GoalType::Trading => "trading",
            GoalType::Research => "research",
            GoalType::Deployment => "deployment",
            GoalType::Maintenance => "maintenance",
            GoalType::General => "general",
        }
    }

    /// Lenient parse; unknown names become `General`.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "coding" => GoalType::Development,
            "analysis" | "analytics" => GoalType::Analysis,
            "trading" => GoalType::Trading,
            "research" => GoalType::Research,
            "deployment" | "deploy" => GoalType::Deployment,
            "maintenance" => GoalType::Maintenance,
            _ => GoalType::General,
        }
    }
}

impl From<String> for GoalType {
    fn from(value: String) -> Self {
        GoalType::parse(&value)
    }
}

impl From<GoalType> for String {
    fn from(value: GoalType) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for GoalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GoalType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(GoalType::parse(s))
    }
}

/// Optional limits attached to a goal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoalConstraints {
    /// Wall-clock time the work must be finished by.
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    /// Budget in arbitrary units; carried for callers, not used in estimates.
    #[serde(default)]
    pub budget: Option<f64>,
    /// Capabilities available to the plan. `None` means unrestricted.
    #[serde(default)]
    pub resources: Option<Vec<String>>,
    /// Ids of external dependencies the goal waits on.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// A caller-supplied intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub description: String,
    #[serde(rename = "type", default)]
    pub goal_type: GoalType,
    /// Nominally 0-100. Out-of-range values are clamped by the planner.
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub constraints: GoalConstraints,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Goal {
    /// Create a goal with a generated id and priority 50.
    pub fn new(description: &str, goal_type: GoalType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            description: description.to_string(),
            goal_type,
            priority: 50,
            constraints: GoalConstraints::default(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.constraints.deadline = Some(deadline);
        self
    }

    pub fn with_resources<S: AsRef<str>>(mut self, resources: &[S]) -> Self {
        self.constraints.resources =
            Some(resources.iter().map(|r| r.as_ref().to_string()).collect());
        self
    }

    pub fn with_dependencies<S: AsRef<str>>(mut self, dependencies: &[S]) -> Self {
        self.constraints.dependencies = dependencies
            .iter()
            .map(|d| d.as_ref().to_string())
            .collect();
        self
    }

    /// Priority clamped into 0-100.
    pub fn effective_priority(&self) -> u8 {
        self.priority.clamp(0, 100) as u8
    }
}

/// A bare description becomes a general goal.
impl From<&str> for Goal {
    fn from(description: &str) -> Self {
        Goal::new(description, GoalType::General)
    }
}

impl From<String> for Goal {
    fn from(description: String) -> Self {
        Goal::new(&description, GoalType::General)
    }
}
