//! Risk assessment for plans.
//!
//! Risks escalate with estimated duration, dependency count and depth, task
//! count, external dependencies and the outcome of the deadline and
//! resource passes. The overall level is the highest individual level, or
//! critical when three or more risks are high.

use crate::planning::plan::{Risk, RiskAssessment, RiskCategory, RiskLevel};
use std::collections::BTreeMap;
use std::time::Duration;

const HOUR: u64 = 3600;

/// Everything the assessment looks at.
#[derive(Debug, Clone, Default)]
pub struct RiskInputs {
    pub estimated_duration: Duration,
    pub task_count: usize,
    pub dependency_count: usize,
    pub dependency_depth: usize,
    pub external_dependencies: usize,
    /// Estimates were compressed to fit a deadline.
    pub deadline_compressed: bool,
    /// The deadline was already in the past at planning time.
    pub deadline_missed: bool,
    /// Task names dropped because their capabilities were unavailable.
    pub capability_gaps: Vec<String>,
}

pub fn assess(inputs: &RiskInputs) -> RiskAssessment {
    let mut risks = Vec::new();
    let mut mitigations = BTreeMap::new();

    let hours = inputs.estimated_duration.as_secs() / HOUR;
    let duration_level = match hours {
        h if h > 40 => Some(RiskLevel::High),
        h if h > 16 => Some(RiskLevel::Medium),
        h if h > 8 => Some(RiskLevel::Low),
        _ => None,
    };
    if let Some(level) = duration_level {
        push(
            &mut risks,
            &mut mitigations,
            Risk {
                id: "risk-duration".to_string(),
                category: RiskCategory::Schedule,
                level,
                description: format!("Estimated effort of about {} hours", hours),
            },
            &[
                "Break the work into incremental milestones",
                "Review progress at each checkpoint",
            ],
        );
    }

    let dependency_level =
        if inputs.dependency_count > 15 || inputs.dependency_depth > 6 {
            Some(RiskLevel::High)
        } else if inputs.dependency_count > 8 || inputs.dependency_depth > 4 {
            Some(RiskLevel::Medium)
        } else {
            None
        };
    if let Some(level) = dependency_level {
        push(
            &mut risks,
            &mut mitigations,
            Risk {
                id: "risk-dependencies".to_string(),
                category: RiskCategory::Dependency,
                level,
                description: format!(
                    "{} dependencies across {} sequential stages",
                    inputs.dependency_count, inputs.dependency_depth
                ),
            },
            &[
                "Run independent branches in parallel",
                "Validate interfaces between dependent tasks early",
            ],
        );
    }

    if inputs.external_dependencies > 0 {
        let level = if inputs.external_dependencies > 2 {
            RiskLevel::High
        } else {
            RiskLevel::Medium
        };
        push(
            &mut risks,
            &mut mitigations,
            Risk {
                id: "risk-external".to_string(),
                category: RiskCategory::External,
                level,
                description: format!(
                    "Relies on {} external dependencies",
                    inputs.external_dependencies
                ),
            },
            &[
                "Confirm external dependencies are available before starting",
                "Prepare fallbacks for external services",
            ],
        );
    }

    if inputs.task_count > 10 {
        let level = if inputs.task_count > 20 {
            RiskLevel::High
        } else {
            RiskLevel::Medium
        };
        push(
            &mut risks,
            &mut mitigations,
            Risk {
                id: "risk-scope".to_string(),
                category: RiskCategory::Scope,
                level,
                description: format!("{} tasks in scope", inputs.task_count),
            },
            &["Split the goal into smaller goals"],
        );
    }

    if inputs.deadline_missed {
        push(
            &mut risks,
            &mut mitigations,
            Risk {
                id: "risk-deadline".to_string(),
                category: RiskCategory::Schedule,
                level: RiskLevel::Critical,
                description: "Deadline has already passed".to_string(),
            },
            &["Negotiate a new deadline"],
        );
    } else if inputs.deadline_compressed {
        push(
            &mut risks,
            &mut mitigations,
            Risk {
                id: "risk-deadline".to_string(),
                category: RiskCategory::Schedule,
                level: RiskLevel::High,
                description: "Estimates were compressed to meet the deadline".to_string(),
            },
            &[
                "Negotiate scope or deadline",
                "Add reviewers at checkpoints to catch rushed work",
            ],
        );
    }

    if !inputs.capability_gaps.is_empty() {
        push(
            &mut risks,
            &mut mitigations,
            Risk {
                id: "risk-capabilities".to_string(),
                category: RiskCategory::Resource,
                level: RiskLevel::Medium,
                description: format!(
                    "Dropped tasks without available capabilities: {}",
                    inputs.capability_gaps.join(", ")
                ),
            },
            &["Acquire the missing capabilities or hand the dropped tasks to another team"],
        );
    }

    let high_count = risks.iter().filter(|r| r.level >= RiskLevel::High).count();
    let overall_risk = if high_count >= 3 {
        RiskLevel::Critical
    } else {
        risks.iter().map(|r| r.level).max().unwrap_or(RiskLevel::Low)
    };

    RiskAssessment {
        overall_risk,
        risks,
        mitigation_strategies: mitigations,
    }
}

fn push(
    risks: &mut Vec<Risk>,
    mitigations: &mut BTreeMap<String, Vec<String>>,
    risk: Risk,
    strategies: &[&str],
) {
    mitigations.insert(
        risk.id.clone(),
        strategies.iter().map(|s| s.to_string()).collect(),
    );
    risks.push(risk);
}
