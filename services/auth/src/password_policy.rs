//! Password policy validator
//!
//! A fixed set of independent requirements evaluated against a candidate
//! password. Pure function of its input: the per-requirement report feeds
//! real-time UI feedback, and the aggregate gate runs server-side before a
//! credential is accepted.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// A single password requirement
pub struct PasswordRequirement {
    /// Human-readable label shown next to the check
    pub label: &'static str,
    regex: Regex,
}

impl PasswordRequirement {
    fn new(label: &'static str, pattern: &str) -> Self {
        Self {
            label,
            regex: Regex::new(pattern).expect("Failed to compile password requirement regex"),
        }
    }
}

/// Pass/fail status of one requirement for a given candidate
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RequirementStatus {
    pub label: &'static str,
    pub meets: bool,
}

/// The full requirement set a password is checked against
pub struct PasswordPolicy {
    requirements: Vec<PasswordRequirement>,
}

impl PasswordPolicy {
    /// The standard five-requirement policy
    pub fn new() -> Self {
        Self {
            requirements: vec![
                PasswordRequirement::new("At least 6 characters", r".{6,}"),
                PasswordRequirement::new("1 or more upper case letters", r"[A-Z]"),
                PasswordRequirement::new("1 or more lower case letters", r"[a-z]"),
                PasswordRequirement::new("1 or more numbers", r"[0-9]"),
                PasswordRequirement::new("1 or more special characters", r"[^A-Za-z0-9]"),
            ],
        }
    }

    /// Evaluate every requirement against the candidate
    pub fn check(&self, password: &str) -> Vec<RequirementStatus> {
        self.requirements
            .iter()
            .map(|requirement| RequirementStatus {
                label: requirement.label,
                meets: requirement.regex.is_match(password),
            })
            .collect()
    }

    /// Aggregate strength score: percentage of requirements met
    pub fn strength(&self, password: &str) -> u8 {
        let met = self
            .check(password)
            .iter()
            .filter(|status| status.meets)
            .count();

        (met * 100 / self.requirements.len()) as u8
    }

    /// Whether the candidate meets every requirement
    pub fn is_valid(&self, password: &str) -> bool {
        self.check(password).iter().all(|status| status.meets)
    }
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared policy instance; the requirement set is fixed
pub fn default_policy() -> &'static PasswordPolicy {
    static POLICY: OnceLock<PasswordPolicy> = OnceLock::new();
    POLICY.get_or_init(PasswordPolicy::new)
}
