//! Shared severity and risk-level scales.
//!
//! Every scoring component in Warden (pattern evaluation, suspicion
//! analysis, content moderation) reports on the same 0–100 scale and buckets
//! into the same five risk levels, so verdicts compose without conversion.

use serde::{Deserialize, Serialize};

/// Severity of a detection, shared by patterns, moderation flags, and PII
/// sensitivity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Low-impact finding.
    Low,
    /// Moderate finding.
    #[default]
    Medium,
    /// Serious finding.
    High,
    /// Finding that must never pass unreviewed.
    Critical,
}

impl Severity {
    /// Returns a human-readable name for this severity.
    pub fn name(&self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
        }
    }

    /// Penalty subtracted from a content safety score per flag of this
    /// severity.
    pub fn score_penalty(&self) -> f32 {
        match self {
            Severity::Low => 5.0,
            Severity::Medium => 15.0,
            Severity::High => 30.0,
            Severity::Critical => 50.0,
        }
    }
}

/// Risk level derived from a 0–100 risk score.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// No meaningful risk signals.
    #[default]
    Safe,
    /// Minor signals, safe to pass.
    Low,
    /// Noticeable signals, worth logging.
    Medium,
    /// Strong signals, candidate for warning or blocking.
    High,
    /// Overwhelming signals, block.
    Critical,
}

impl RiskLevel {
    /// Buckets a 0–100 risk score: Safe < 10 <= Low < 30 <= Medium < 50 <=
    /// High < 70 <= Critical.
    pub fn from_score(score: u32) -> Self {
        match score {
            0..=9 => RiskLevel::Safe,
            10..=29 => RiskLevel::Low,
            30..=49 => RiskLevel::Medium,
            50..=69 => RiskLevel::High,
            _ => RiskLevel::Critical,
        }
    }

    /// Returns a human-readable name for this risk level.
    pub fn name(&self) -> &'static str {
        match self {
            RiskLevel::Safe => "Safe",
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
            RiskLevel::Critical => "Critical",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_is_total() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn severity_penalties() {
        assert_eq!(Severity::Low.score_penalty(), 5.0);
        assert_eq!(Severity::Medium.score_penalty(), 15.0);
        assert_eq!(Severity::High.score_penalty(), 30.0);
        assert_eq!(Severity::Critical.score_penalty(), 50.0);
    }

    #[test]
    fn risk_level_buckets() {
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Safe);
        assert_eq!(RiskLevel::from_score(9), RiskLevel::Safe);
        assert_eq!(RiskLevel::from_score(10), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(29), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(30), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(49), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(50), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(69), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(70), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(100), RiskLevel::Critical);
    }

    #[test]
    fn risk_level_serialization() {
        assert_eq!(
            serde_json::to_string(&RiskLevel::Critical).unwrap(),
            "\"critical\""
        );
        assert_eq!(serde_json::to_string(&Severity::Low).unwrap(), "\"low\"");
    }
}
