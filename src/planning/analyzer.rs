//! Pattern-based goal classification.
//!
//! The analyzer owns two static tables:
//!
//! - an ordered rule table mapping action verbs and keywords in a goal's
//!   description to task templates, and
//! - a per-goal-type template table listing the standard tasks and
//!   capabilities for each kind of goal.
//!
//! Both the planner and the chain engine classify goals through this module
//! so the two paths agree on which task types a description implies.
//!
//! ## Example
//!
//! ```
//! use goalchain::planning::GoalAnalyzer;
//!
//! let analyzer = GoalAnalyzer::new();
//! let types = analyzer.detect_task_types("Implement login and add unit tests");
//! assert_eq!(types, vec!["development", "testing"]);
//! ```

use crate::planning::goal::GoalType;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Task type names shared by rules, templates and executors.
pub mod task_types {
    pub const DEPENDENCY_RESOLUTION: &str = "dependency_resolution";
    pub const RESEARCH: &str = "research";
    pub const ANALYSIS: &str = "analysis";
    pub const DESIGN: &str = "design";
    pub const DEVELOPMENT: &str = "development";
    pub const TRADING: &str = "trading";
    pub const GENERAL: &str = "general";
    pub const OPTIMIZATION: &str = "optimization";
    pub const TESTING: &str = "testing";
    pub const REVIEW: &str = "review";
    pub const DOCUMENTATION: &str = "documentation";
    pub const DEPLOYMENT: &str = "deployment";
    pub const MONITORING: &str = "monitoring";
}

use task_types::*;

/// Execution phase of a task type; lower phases run first.
///
/// Used to derive dependencies for generated tasks, which carry no
/// declared dependencies of their own.
pub fn phase_rank(task_type: &str) -> u8 {
    match task_type {
        DEPENDENCY_RESOLUTION => 0,
        RESEARCH | ANALYSIS => 1,
        DESIGN => 2,
        DEVELOPMENT | TRADING | GENERAL => 3,
        OPTIMIZATION => 4,
        TESTING => 5,
        REVIEW | DOCUMENTATION => 6,
        DEPLOYMENT => 7,
        MONITORING => 8,
        _ => 3,
    }
}

/// A reusable description of a unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub name: String,
    pub task_type: String,
    /// Nominal effort in minutes before complexity scaling.
    pub base_minutes: u64,
    pub capabilities: Vec<String>,
    pub parallelizable: bool,
    pub optional: bool,
}

impl TaskTemplate {
    fn from_spec(spec: &TemplateSpec) -> Self {
        Self {
            name: spec.0.to_string(),
            task_type: spec.1.to_string(),
            base_minutes: spec.2,
            capabilities: spec.3.iter().map(|c| c.to_string()).collect(),
            parallelizable: spec.4,
            optional: spec.5,
        }
    }
}

/// Standard tasks and capabilities for one goal type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalTemplate {
    pub standard_tasks: Vec<TaskTemplate>,
    pub required_capabilities: Vec<String>,
}

/// A template matched in a goal description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedTask {
    pub template: TaskTemplate,
    /// Byte offset of the first match; earlier mentions rank higher.
    pub position: usize,
}

// (name, task type, minutes, capabilities, parallelizable, optional)
type TemplateSpec = (
    &'static str,
    &'static str,
    u64,
    &'static [&'static str],
    bool,
    bool,
);

const RULES: &[(&str, TemplateSpec)] = &[
    (
        r"\b(create|build|implement|develop|generate|add|write|code|make)\b",
        ("Implement solution", DEVELOPMENT, 120, &["coding"], false, false),
    ),
    (
        r"\b(fix|bug|bugs|debug|repair|patch)\b",
        ("Fix defect", DEVELOPMENT, 60, &["coding", "debugging"], false, false),
    ),
    (
        r"\b(test|tests|testing|verify|validate|qa)\b",
        ("Write and run tests", TESTING, 60, &["testing"], true, false),
    ),
    (
        r"\b(deploy|deployment|release|ship|publish|launch|rollout)\b",
        ("Deploy to environment", DEPLOYMENT, 45, &["deployment", "devops"], false, false),
    ),
    (
        r"\b(analy[sz]e|analysis|review|investigate|assess|audit|evaluate)\b",
        ("Analyze requirements", ANALYSIS, 60, &["analysis"], true, false),
    ),
    (
        r"\b(optimi[sz]e|optimi[sz]ation|improve|refactor|performance|tune)\b",
        ("Optimize implementation", OPTIMIZATION, 90, &["performance"], false, false),
    ),
    (
        r"\b(document|documentation|docs|readme)\b",
        ("Write documentation", DOCUMENTATION, 30, &["writing"], true, true),
    ),
    (
        r"\b(research|explore|study|prototype)\b",
        ("Research approaches", RESEARCH, 60, &["research"], true, false),
    ),
    (
        r"\b(trade|trading|buy|sell|portfolio|backtest)\b",
        ("Execute trading strategy", TRADING, 60, &["trading", "market-data"], false, false),
    ),
    (
        r"\b(monitor|monitoring|alert|alerts|observe)\b",
        ("Set up monitoring", MONITORING, 30, &["monitoring"], true, true),
    ),
];

struct DetectionRule {
    pattern: Regex,
    template: TaskTemplate,
}

static DETECTION_RULES: LazyLock<Vec<DetectionRule>> = LazyLock::new(|| {
    RULES
        .iter()
        .filter_map(|(pattern, spec)| {
            Regex::new(&format!("(?i){}", pattern))
                .ok()
                .map(|pattern| DetectionRule {
                    pattern,
                    template: TaskTemplate::from_spec(spec),
                })
        })
        .collect()
});

fn goal_template_specs(goal_type: GoalType) -> &'static [TemplateSpec] {
    match goal_type {
        GoalType::Development => &[
            ("Analyze requirements", ANALYSIS, 60, &["analysis"], true, false),
            ("Design architecture", DESIGN, 90, &["architecture"], false, false),
            ("Implement features", DEVELOPMENT, 180, &["coding"], false, false),
            ("Write tests", TESTING, 90, &["testing"], true, false),
            ("Code review", REVIEW, 45, &["code-review"], true, true),
            ("Write documentation", DOCUMENTATION, 45, &["writing"], true, true),
        ],
        GoalType::Analysis => &[
            ("Gather data", RESEARCH, 60, &["data-collection"], true, false),
            ("Analyze data", ANALYSIS, 120, &["analysis"], false, false),
            ("Generate report", DOCUMENTATION, 60, &["writing"], false, false),
            ("Review findings", REVIEW, 30, &["analysis"], true, true),
        ],
        GoalType::Trading => &[
            ("Market research", RESEARCH, 60, &["market-data"], true, false),
            ("Risk analysis", ANALYSIS, 60, &["risk-management"], true, false),
            ("Strategy design", DESIGN, 90, &["trading"], false, false),
            ("Backtest strategy", TESTING, 120, &["backtesting"], false, false),
            ("Execute trades", TRADING, 30, &["trading"], false, false),
            ("Monitor positions", MONITORING, 60, &["monitoring"], true, true),
        ],
        GoalType::Research => &[
            ("Define research questions", ANALYSIS, 30, &["analysis"], false, false),
            ("Literature review", RESEARCH, 120, &["research"], true, false),
            ("Run experiments", RESEARCH, 180, &["research", "experimentation"], true, false),
            ("Summarize findings", DOCUMENTATION, 60, &["writing"], false, false),
        ],
        GoalType::Deployment => &[
            ("Prepare environment", DESIGN, 45, &["devops"], false, false),
            ("Run release tests", TESTING, 60, &["testing"], true, false),
            ("Deploy release", DEPLOYMENT, 45, &["deployment", "devops"], false, false),
            ("Verify deployment", MONITORING, 30, &["monitoring"], true, false),
        ],
        GoalType::Maintenance => &[
            ("Assess system health", ANALYSIS, 45, &["analysis"], true, false),
            ("Apply updates", DEVELOPMENT, 90, &["coding"], false, false),
            ("Run regression tests", TESTING, 60, &["testing"], true, false),
            ("Update documentation", DOCUMENTATION, 30, &["writing"], true, true),
        ],
        GoalType::General => &[
            ("Clarify goal requirements", ANALYSIS, 30, &["analysis"], false, false),
            ("Carry out goal", GENERAL, 60, &[], false, false),
            ("Review outcome", REVIEW, 30, &[], true, true),
        ],
    }
}

static GOAL_TEMPLATES: LazyLock<BTreeMap<GoalType, GoalTemplate>> = LazyLock::new(|| {
    GoalType::ALL
        .iter()
        .map(|&goal_type| {
            let standard_tasks: Vec<TaskTemplate> = goal_template_specs(goal_type)
                .iter()
                .map(TaskTemplate::from_spec)
                .collect();
            let mut required_capabilities: Vec<String> = standard_tasks
                .iter()
                .filter(|t| !t.optional)
                .flat_map(|t| t.capabilities.iter().cloned())
                .collect();
            required_capabilities.sort();
            required_capabilities.dedup();
            (
                goal_type,
                GoalTemplate {
                    standard_tasks,
                    required_capabilities,
                },
            )
        })
        .collect()
});

const HIGH_COMPLEXITY_KEYWORDS: &[&str] = &[
    "complex",
    "enterprise",
    "distributed",
    "scalable",
    "scale",
    "migration",
    "migrate",
    "microservice",
    "microservices",
    "architecture",
    "multi-tenant",
    "real-time",
    "integration",
    "security",
    "compliance",
];

const LOW_COMPLEXITY_KEYWORDS: &[&str] = &[
    "simple", "quick", "small", "minor", "fix", "tweak", "typo", "color", "rename",
];

/// Classifies goal text into task templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoalAnalyzer;

impl GoalAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Templates whose rule matches `description`, ordered by first mention.
    pub fn detect(&self, description: &str) -> Vec<DetectedTask> {
        let mut detected: Vec<DetectedTask> = DETECTION_RULES
            .iter()
            .filter_map(|rule| {
                rule.pattern.find(description).map(|m| DetectedTask {
                    template: rule.template.clone(),
                    position: m.start(),
                })
            })
            .collect();
        // Stable sort keeps rule order for matches at the same offset.
        detected.sort_by_key(|d| d.position);
        detected
    }

    /// Distinct task types implied by `description`, ordered by first mention.
    pub fn detect_task_types(&self, description: &str) -> Vec<&'static str> {
        let mut types: Vec<&'static str> = Vec::new();
        for task in self.detect(description) {
            if let Some(t) = RULES
                .iter()
                .map(|(_, spec)| spec.1)
                .find(|t| *t == task.template.task_type)
            {
                if !types.contains(&t) {
                    types.push(t);
                }
            }
        }
        types
    }

    /// Standard template for a goal type.
    pub fn template_for(&self, goal_type: GoalType) -> &'static GoalTemplate {
        &GOAL_TEMPLATES[&goal_type]
    }

    /// The full template table.
    pub fn templates(&self) -> &'static BTreeMap<GoalType, GoalTemplate> {
        &GOAL_TEMPLATES
    }

    /// Effort multiplier derived from description length and keywords.
    ///
    /// Long descriptions and large-scale vocabulary scale effort up; small
    /// fixes scale it down. The result stays within 0.3..=3.0.
    pub fn complexity_multiplier(&self, description: &str) -> f64 {
        let lower = description.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !(c.is_alphanumeric() || c == '-'))
            .filter(|w| !w.is_empty())
            .collect();

        let mut multiplier = 1.0;
        if description.len() > 200 {
            multiplier += 0.5;
        } else if description.len() > 100 {
            multiplier += 0.25;
        }

        let high_hits = words
            .iter()
            .filter(|w| {
                HIGH_COMPLEXITY_KEYWORDS
                    .iter()
                    .any(|k| w.starts_with(k))
            })
            .count();
        multiplier += (high_hits as f64 * 0.3).min(1.5);

        if words.iter().any(|w| LOW_COMPLEXITY_KEYWORDS.contains(w)) {
            multiplier *= 0.6;
        }

        multiplier.clamp(0.3, 3.0)
    }
}
