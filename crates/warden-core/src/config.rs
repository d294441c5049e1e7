//! Tunable thresholds for the detection pipeline.
//!
//! Every cutoff in the source system (suspicion threshold, high-risk block
//! threshold, safety floor, toxicity ceiling, flag limit) is a tuned default
//! rather than a derived constant, so all of them live here as plain
//! configurable values. The core operates on [`GuardConfig::default`] when
//! the external configuration source is unavailable.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Thresholds and limits for the orchestrated pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Suspicion score at or above which input is considered suspicious.
    pub suspicious_threshold: u32,
    /// Suspicion score at or above which input is blocked outright.
    pub high_risk_threshold: u32,
    /// Content safety score below which moderated content blocks.
    pub min_safe_score: f32,
    /// Toxicity score at or above which content is not clean.
    pub toxicity_threshold: u32,
    /// Whether a critical pattern match always blocks, regardless of score.
    pub block_on_critical: bool,
    /// Blocked attempts after which a user is flagged.
    pub flag_attempt_limit: usize,
    /// Capacity of each result cache.
    pub cache_capacity: usize,
    /// Time-to-live for cached verdicts, in seconds.
    pub cache_ttl_secs: u64,
    /// Whether strict mode (shell-metacharacter stripping, toxicity
    /// multiplier) applies when the caller does not say.
    pub strict_mode: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            suspicious_threshold: 30,
            high_risk_threshold: 70,
            min_safe_score: 70.0,
            toxicity_threshold: 50,
            block_on_critical: true,
            flag_attempt_limit: 5,
            cache_capacity: 1024,
            cache_ttl_secs: 300,
            strict_mode: false,
        }
    }
}

impl GuardConfig {
    /// Permissive preset: warns where the default blocks, tolerates more
    /// suspicion, and never auto-blocks on score alone below critical.
    pub fn permissive() -> Self {
        Self {
            suspicious_threshold: 50,
            high_risk_threshold: 85,
            min_safe_score: 50.0,
            toxicity_threshold: 70,
            block_on_critical: true,
            ..Self::default()
        }
    }

    /// Overrides the suspicion threshold.
    pub fn with_suspicious_threshold(mut self, threshold: u32) -> Self {
        self.suspicious_threshold = threshold.min(100);
        self
    }

    /// Overrides the high-risk block threshold.
    pub fn with_high_risk_threshold(mut self, threshold: u32) -> Self {
        self.high_risk_threshold = threshold.min(100);
        self
    }

    /// Overrides the flag attempt limit.
    pub fn with_flag_attempt_limit(mut self, limit: usize) -> Self {
        self.flag_attempt_limit = limit.max(1);
        self
    }

    /// Overrides cache capacity and TTL.
    pub fn with_cache(mut self, capacity: usize, ttl_secs: u64) -> Self {
        self.cache_capacity = capacity.max(1);
        self.cache_ttl_secs = ttl_secs;
        self
    }

    /// Enables or disables strict mode by default.
    pub fn with_strict_mode(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    /// Cache TTL as a [`Duration`].
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds() {
        let config = GuardConfig::default();
        assert_eq!(config.suspicious_threshold, 30);
        assert_eq!(config.high_risk_threshold, 70);
        assert_eq!(config.min_safe_score, 70.0);
        assert_eq!(config.toxicity_threshold, 50);
        assert_eq!(config.flag_attempt_limit, 5);
        assert!(config.block_on_critical);
        assert!(!config.strict_mode);
    }

    #[test]
    fn permissive_preset_raises_thresholds() {
        let config = GuardConfig::permissive();
        assert!(config.suspicious_threshold > GuardConfig::default().suspicious_threshold);
        assert!(config.high_risk_threshold > GuardConfig::default().high_risk_threshold);
        // Critical matches still block even in the permissive preset.
        assert!(config.block_on_critical);
    }

    #[test]
    fn builders_clamp_values() {
        let config = GuardConfig::default()
            .with_suspicious_threshold(250)
            .with_flag_attempt_limit(0)
            .with_cache(0, 10);
        assert_eq!(config.suspicious_threshold, 100);
        assert_eq!(config.flag_attempt_limit, 1);
        assert_eq!(config.cache_capacity, 1);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = GuardConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: GuardConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
