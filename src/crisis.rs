//! Crisis detection policy.
//!
//! The dashboard flags a subsidiary as a possible crisis once its volume of
//! negative comments passes a threshold. The rule is a policy of whoever
//! operates the dashboard, so the crate only defines the interface plus a
//! threshold implementation configured from `[crisis]`.

use anyhow::{bail, Result};
use serde::Serialize;
use std::collections::HashMap;

use crate::config::{Config, CrisisConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrisisStatus {
    Stable,
    PossibleCrisis,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrisisAssessment {
    pub subsidiary: String,
    pub negative_comments: usize,
    pub threshold: usize,
    pub status: CrisisStatus,
}

pub trait CrisisPolicy: Send + Sync {
    fn assess(&self, subsidiary: &str, negative_comments: usize) -> CrisisAssessment;
}

/// Possible crisis when the negative count is strictly above the threshold
/// that applies to the subsidiary.
#[derive(Debug, Clone)]
pub struct ThresholdPolicy {
    default_threshold: usize,
    overrides: HashMap<String, usize>,
}

impl ThresholdPolicy {
    pub fn new(default_threshold: usize) -> Self {
        Self {
            default_threshold,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, subsidiary: &str, threshold: usize) -> Self {
        self.overrides.insert(subsidiary.to_string(), threshold);
        self
    }

    pub fn from_config(config: &CrisisConfig) -> Self {
        Self {
            default_threshold: config.negative_threshold,
            overrides: config.subsidiaries.clone(),
        }
    }

    pub fn threshold_for(&self, subsidiary: &str) -> usize {
        self.overrides
            .get(subsidiary)
            .copied()
            .unwrap_or(self.default_threshold)
    }
}

impl CrisisPolicy for ThresholdPolicy {
    fn assess(&self, subsidiary: &str, negative_comments: usize) -> CrisisAssessment {
        let threshold = self.threshold_for(subsidiary);
        let status = if negative_comments > threshold {
            CrisisStatus::PossibleCrisis
        } else {
            CrisisStatus::Stable
        };
        CrisisAssessment {
            subsidiary: subsidiary.to_string(),
            negative_comments,
            threshold,
            status,
        }
    }
}

/// The configured policy, or an error if `[crisis]` is absent.
pub fn policy_from_config(config: &Config) -> Result<ThresholdPolicy> {
    match config.crisis {
        Some(ref crisis) => Ok(ThresholdPolicy::from_config(crisis)),
        None => bail!("No crisis policy configured: add a [crisis] section with negative_threshold"),
    }
}

/// CLI entry point for `ecris crisis`.
pub fn run_crisis(config: &Config, subsidiary: &str, negative_comments: usize) -> Result<()> {
    let policy = policy_from_config(config)?;
    let assessment = policy.assess(subsidiary, negative_comments);
    let label = match assessment.status {
        CrisisStatus::Stable => "stable",
        CrisisStatus::PossibleCrisis => "POSSIBLE CRISIS",
    };
    println!(
        "{}: {} ({} negative comments, threshold {})",
        assessment.subsidiary, label, assessment.negative_comments, assessment.threshold
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strictly_greater_than_threshold() {
        let policy = ThresholdPolicy::new(40);
        assert_eq!(policy.assess("Brand A", 40).status, CrisisStatus::Stable);
        assert_eq!(
            policy.assess("Brand A", 41).status,
            CrisisStatus::PossibleCrisis
        );
    }

    #[test]
    fn test_subsidiary_override() {
        let policy = ThresholdPolicy::new(40).with_override("Brand B", 50);
        let a = policy.assess("Brand B", 45);
        assert_eq!(a.threshold, 50);
        assert_eq!(a.status, CrisisStatus::Stable);
        assert_eq!(policy.threshold_for("Other"), 40);
    }

    #[test]
    fn test_missing_section_is_an_error() {
        let config = Config::with_index("/tmp/unused.sqlite");
        assert!(policy_from_config(&config).is_err());
    }
}
