//! Structured telemetry for pattern evaluation.
//!
//! Every match, block, timeout, and error is fanned out to registered
//! observers. Observer panics are contained per call, so a failing observer
//! cannot change an evaluation result or starve the remaining observers.

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::{Deserialize, Serialize};

use crate::types::Severity;
use crate::patterns::types::ThreatCategory;

/// One telemetry event from the evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum PatternEvent {
    /// A pattern matched the input.
    Match {
        /// Matching pattern id.
        pattern_id: String,
        /// Its category.
        category: ThreatCategory,
        /// Its severity.
        severity: Severity,
        /// User the input was attributed to, if any.
        user_id: Option<String>,
    },
    /// Evaluation resolved to a block action.
    Block {
        /// Ids of the patterns that forced the block.
        pattern_ids: Vec<String>,
        /// Aggregate risk score.
        risk_score: u32,
        /// User the input was attributed to, if any.
        user_id: Option<String>,
    },
    /// A pattern exceeded its evaluation budget and was treated as
    /// not matched.
    Timeout {
        /// Offending pattern id.
        pattern_id: String,
        /// Its budget in milliseconds.
        budget_ms: u64,
        /// Observed evaluation time in microseconds.
        elapsed_us: u64,
    },
    /// A pattern failed to evaluate and was skipped.
    Error {
        /// Offending pattern id.
        pattern_id: String,
        /// Failure description.
        reason: String,
    },
}

/// Receives evaluator telemetry.
pub trait PatternObserver: Send + Sync {
    /// Called once per event, on the evaluating thread.
    fn on_event(&self, event: &PatternEvent);
}

/// Default observer that forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl PatternObserver for TracingObserver {
    fn on_event(&self, event: &PatternEvent) {
        match event {
            PatternEvent::Match {
                pattern_id,
                category,
                ..
            } => {
                tracing::debug!(%pattern_id, category = category.name(), "pattern matched");
            }
            PatternEvent::Block {
                pattern_ids,
                risk_score,
                ..
            } => {
                tracing::warn!(?pattern_ids, risk_score, "input blocked by pattern evaluation");
            }
            PatternEvent::Timeout {
                pattern_id,
                budget_ms,
                elapsed_us,
            } => {
                tracing::warn!(%pattern_id, budget_ms, elapsed_us, "pattern evaluation timed out");
            }
            PatternEvent::Error { pattern_id, reason } => {
                tracing::warn!(%pattern_id, %reason, "pattern evaluation error");
            }
        }
    }
}

/// Fans one event out to every observer, containing panics per observer.
pub(crate) fn notify_all(observers: &[Box<dyn PatternObserver>], event: &PatternEvent) {
    for observer in observers {
        let result = catch_unwind(AssertUnwindSafe(|| observer.on_event(event)));
        if result.is_err() {
            tracing::warn!("pattern observer panicked; event dropped for that observer");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingObserver(Arc<AtomicUsize>);

    impl PatternObserver for CountingObserver {
        fn on_event(&self, _event: &PatternEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct PanickingObserver;

    impl PatternObserver for PanickingObserver {
        fn on_event(&self, _event: &PatternEvent) {
            panic!("observer down");
        }
    }

    fn timeout_event() -> PatternEvent {
        PatternEvent::Timeout {
            pattern_id: "p1".into(),
            budget_ms: 10,
            elapsed_us: 25_000,
        }
    }

    #[test]
    fn all_observers_receive_the_event() {
        let count = Arc::new(AtomicUsize::new(0));
        let observers: Vec<Box<dyn PatternObserver>> = vec![
            Box::new(CountingObserver(Arc::clone(&count))),
            Box::new(CountingObserver(Arc::clone(&count))),
        ];
        notify_all(&observers, &timeout_event());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_observer_does_not_starve_the_rest() {
        let count = Arc::new(AtomicUsize::new(0));
        let observers: Vec<Box<dyn PatternObserver>> = vec![
            Box::new(PanickingObserver),
            Box::new(CountingObserver(Arc::clone(&count))),
        ];
        notify_all(&observers, &timeout_event());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_string(&timeout_event()).unwrap();
        assert!(json.contains("\"type\":\"timeout\""));
        assert!(json.contains("\"pattern_id\":\"p1\""));
    }
}
