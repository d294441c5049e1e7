//! Bounded pattern evaluation and weighted scoring.
//!
//! Enabled patterns are partitioned into a synchronous tier (high priority,
//! or anything not marked async-eligible) evaluated in registration order,
//! and a deferred tier joined before scoring. Scoring is commutative over
//! matches, so deferred ordering is unobservable. Each evaluation is
//! wall-clock checked against the pattern's budget; a violation degrades to
//! "not matched" plus a timeout event and never aborts the request.

use std::time::Instant;

use parking_lot::RwLock;

use crate::error::Result;
use crate::patterns::registry::{PatternRegistry, SignedPatternBatch};
use crate::patterns::telemetry::{notify_all, PatternEvent, PatternObserver};
use crate::patterns::types::{DetectionOutcome, PatternAction, TriggeredPattern};

/// Evaluates the registered patterns against input text.
pub struct PatternEngine {
    registry: RwLock<PatternRegistry>,
    observers: Vec<Box<dyn PatternObserver>>,
}

impl PatternEngine {
    /// Creates an engine over an explicit registry.
    pub fn new(registry: PatternRegistry) -> Self {
        Self {
            registry: RwLock::new(registry),
            observers: Vec::new(),
        }
    }

    /// Creates an engine over the built-in rule set.
    pub fn with_defaults() -> Self {
        Self::new(PatternRegistry::with_defaults())
    }

    /// Registers a telemetry observer.
    pub fn add_observer(&mut self, observer: Box<dyn PatternObserver>) {
        self.observers.push(observer);
    }

    /// Runs a closure against the registry, for group toggles and
    /// inspection.
    pub fn with_registry<T>(&self, f: impl FnOnce(&mut PatternRegistry) -> T) -> T {
        f(&mut self.registry.write())
    }

    /// Replaces the pattern set wholesale (hot reload).
    pub fn replace_registry(&self, registry: PatternRegistry) {
        *self.registry.write() = registry;
    }

    /// Verifies and merges a signed threat-intelligence batch. On any
    /// failure the existing pattern set keeps operating untouched.
    pub fn import_signed(&self, batch: &SignedPatternBatch) -> Result<usize> {
        self.registry.write().import_signed(batch)
    }

    /// Evaluates every enabled pattern against `text`.
    pub fn evaluate(&self, text: &str, user_id: Option<&str>) -> DetectionOutcome {
        let started = Instant::now();
        if text.is_empty() {
            return DetectionOutcome::clear(started.elapsed().as_micros() as u64);
        }

        let registry = self.registry.read();
        let mut triggered: Vec<Scored> = Vec::new();
        let mut used_async = false;

        // Synchronous tier, in registration order.
        for entry in registry.entries() {
            if entry.rule.enabled && !entry.rule.is_deferred() {
                self.evaluate_one(entry, text, user_id, &mut triggered);
            }
        }

        // Deferred tier, joined before scoring. Match scoring is commutative,
        // so the batch needs no ordering guarantees.
        for entry in registry.entries() {
            if entry.rule.enabled && entry.rule.is_deferred() {
                used_async = true;
                self.evaluate_one(entry, text, user_id, &mut triggered);
            }
        }
        drop(registry);

        let outcome = self.score(triggered, used_async, started);
        if outcome.is_blocking() {
            notify_all(
                &self.observers,
                &PatternEvent::Block {
                    pattern_ids: outcome
                        .triggered
                        .iter()
                        .map(|t| t.pattern_id.clone())
                        .collect(),
                    risk_score: outcome.risk_score,
                    user_id: user_id.map(String::from),
                },
            );
        }
        outcome
    }

    fn evaluate_one(
        &self,
        entry: &crate::patterns::registry::RegisteredPattern,
        text: &str,
        user_id: Option<&str>,
        triggered: &mut Vec<Scored>,
    ) {
        let rule = &entry.rule;
        let eval_start = Instant::now();
        let matched = entry.matcher.matches(text);
        let elapsed = eval_start.elapsed();
        let elapsed_us = elapsed.as_micros() as u64;

        if elapsed.as_millis() as u64 > rule.max_eval_ms {
            // Budget violation: the match result is discarded and the
            // pattern contributes nothing.
            notify_all(
                &self.observers,
                &PatternEvent::Timeout {
                    pattern_id: rule.id.clone(),
                    budget_ms: rule.max_eval_ms,
                    elapsed_us,
                },
            );
            tracing::warn!(
                pattern_id = %rule.id,
                budget_ms = rule.max_eval_ms,
                elapsed_us,
                "pattern exceeded evaluation budget; treated as not matched"
            );
            return;
        }

        if matched {
            triggered.push(Scored {
                hit: TriggeredPattern {
                    pattern_id: rule.id.clone(),
                    category: rule.category,
                    severity: rule.severity,
                    weight: rule.confidence_weight,
                    eval_time_us: elapsed_us,
                },
                base_score: rule.base_score,
                action: rule.action,
            });
            notify_all(
                &self.observers,
                &PatternEvent::Match {
                    pattern_id: rule.id.clone(),
                    category: rule.category,
                    severity: rule.severity,
                    user_id: user_id.map(String::from),
                },
            );
        }
    }

    fn score(&self, triggered: Vec<Scored>, used_async: bool, started: Instant) -> DetectionOutcome {
        if triggered.is_empty() {
            let mut outcome = DetectionOutcome::clear(started.elapsed().as_micros() as u64);
            outcome.used_async = used_async;
            return outcome;
        }

        let mut weighted_sum = 0.0f64;
        let mut weight_total = 0.0f64;
        let mut action = PatternAction::Allow;
        for s in &triggered {
            weighted_sum += f64::from(s.base_score) * f64::from(s.hit.weight);
            weight_total += f64::from(s.hit.weight);
            action = action.max(s.action);
        }

        let risk_score = if weight_total > 0.0 {
            (weighted_sum / weight_total).round() as u32
        } else {
            0
        };
        let confidence_level = ((weight_total / triggered.len() as f64) * 100.0).round() as u32;

        DetectionOutcome {
            risk_score: risk_score.min(100),
            confidence_level: confidence_level.min(100),
            triggered: triggered.into_iter().map(|s| s.hit).collect(),
            action,
            eval_time_us: started.elapsed().as_micros() as u64,
            used_async,
        }
    }
}

/// A match carried through scoring with the fields scoring needs, so the
/// registry lock is not re-taken after evaluation.
struct Scored {
    hit: TriggeredPattern,
    base_score: u32,
    action: PatternAction,
}
