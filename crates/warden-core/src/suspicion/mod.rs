//! Suspicion analysis: sanitization plus five-layer heuristic scoring.
//!
//! The analyzer runs the five layers over the original text, sums their
//! scores into a 0–100 aggregate, and caches results per (text, user) with a
//! short TTL. A cache hit returns scores byte-identical to a fresh
//! evaluation.

mod layers;
mod lexicon;
mod sanitize;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{BoundedTtlCache, CacheStats};

pub use layers::{LayerResult, SuspicionConfig};
pub use sanitize::{
    CustomRule, Modification, ModificationKind, SanitizationResult, SanitizeOptions, Sanitizer,
};

use layers::LayerEngine;

/// Number of heuristic layers; the confidence denominator.
const LAYER_COUNT: u32 = 5;

/// Per-layer breakdown of one analysis.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SuspicionLayers {
    /// Hard-coded high-signal markers.
    pub lexical: LayerResult,
    /// Keyword-family intent signals.
    pub semantic: LayerResult,
    /// Density and size signals.
    pub behavioral: LayerResult,
    /// Resets, contradictions, topic switches.
    pub contextual: LayerResult,
    /// Surface-statistics anomalies.
    pub linguistic: LayerResult,
}

impl SuspicionLayers {
    fn triggered(&self) -> u32 {
        [
            &self.lexical,
            &self.semantic,
            &self.behavioral,
            &self.contextual,
            &self.linguistic,
        ]
        .iter()
        .filter(|l| l.detected)
        .count() as u32
    }
}

/// Aggregate result of a suspicion analysis.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SuspicionAnalysis {
    /// Per-layer findings.
    pub layers: SuspicionLayers,
    /// Sum of layer scores, capped at 100.
    pub risk_score: u32,
    /// Fraction of layers triggered, as a percentage.
    pub confidence_level: u32,
    /// Whether the aggregate crossed the suspicion threshold.
    pub suspicious: bool,
}

/// Five-layer suspicion analyzer with a short-TTL result cache.
pub struct SuspicionAnalyzer {
    config: SuspicionConfig,
    engine: LayerEngine,
    sanitizer: Sanitizer,
    cache: BoundedTtlCache<String, SuspicionAnalysis>,
}

impl SuspicionAnalyzer {
    /// Creates an analyzer with the given configuration.
    pub fn new(config: SuspicionConfig) -> Self {
        let cache = BoundedTtlCache::new(
            config.cache_capacity,
            Duration::from_secs(config.cache_ttl_secs),
        );
        Self {
            config,
            engine: LayerEngine::new(),
            sanitizer: Sanitizer::new(),
            cache,
        }
    }

    /// Creates an analyzer with default thresholds.
    pub fn with_defaults() -> Self {
        Self::new(SuspicionConfig::default())
    }

    /// The analyzer's sanitizer, for registering host-level custom rules.
    pub fn sanitizer_mut(&mut self) -> &mut Sanitizer {
        &mut self.sanitizer
    }

    /// Runs the sanitization pipeline.
    pub fn sanitize(&self, text: &str, options: &SanitizeOptions) -> SanitizationResult {
        self.sanitizer.sanitize(text, options)
    }

    /// Scores the original text across the five layers. Results are cached
    /// per (text, user).
    pub fn analyze_suspicion(&self, text: &str, user_id: Option<&str>) -> SuspicionAnalysis {
        if text.trim().is_empty() {
            return SuspicionAnalysis {
                confidence_level: 100,
                ..SuspicionAnalysis::default()
            };
        }

        let key = cache_key(text, user_id);
        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }

        let analysis = self.evaluate(text);
        self.cache.insert(key, analysis.clone());
        analysis
    }

    /// Evaluates the layers without consulting the cache.
    pub fn analyze_uncached(&self, text: &str) -> SuspicionAnalysis {
        self.evaluate(text)
    }

    /// Cache effectiveness counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn evaluate(&self, text: &str) -> SuspicionAnalysis {
        let layers = SuspicionLayers {
            lexical: self.engine.lexical(text, &self.config),
            semantic: self.engine.semantic(text, &self.config),
            behavioral: self.engine.behavioral(text, &self.config),
            contextual: self.engine.contextual(text, &self.config),
            linguistic: self.engine.linguistic(text, &self.config),
        };

        let total: u32 = [
            layers.lexical.score,
            layers.semantic.score,
            layers.behavioral.score,
            layers.contextual.score,
            layers.linguistic.score,
        ]
        .iter()
        .sum();
        let risk_score = total.min(100);
        let confidence_level =
            ((layers.triggered() as f64 / f64::from(LAYER_COUNT)) * 100.0).round() as u32;

        SuspicionAnalysis {
            suspicious: risk_score >= self.config.suspicious_threshold,
            layers,
            risk_score,
            confidence_level,
        }
    }
}

fn cache_key(text: &str, user_id: Option<&str>) -> String {
    format!("{}\u{1F}{}", user_id.unwrap_or("-"), text)
}
