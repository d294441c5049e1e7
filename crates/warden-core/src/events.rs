//! Collaborator seams: trust source and audit sink.
//!
//! The core never talks to identity or storage directly. It queries a
//! [`TrustSource`] once per request when a user id is present, and emits
//! fire-and-forget events to an [`AuditSink`]. Sink failures are contained
//! here so they are structurally incapable of affecting a verdict.

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::{Deserialize, Serialize};

/// Identity collaborator: answers whether a user bypasses detection.
pub trait TrustSource: Send + Sync {
    /// Returns true if this user is on the explicit allow-list.
    fn is_trusted(&self, user_id: &str) -> bool;
}

/// Default trust source that trusts no one.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTrust;

impl TrustSource for NoTrust {
    fn is_trusted(&self, _user_id: &str) -> bool {
        false
    }
}

/// Trust source backed by a static allow-list, for hosts without an identity
/// service.
#[derive(Debug, Clone, Default)]
pub struct StaticTrustList {
    users: Vec<String>,
}

impl StaticTrustList {
    /// Creates a trust list from user ids.
    pub fn new(users: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            users: users.into_iter().map(Into::into).collect(),
        }
    }
}

impl TrustSource for StaticTrustList {
    fn is_trusted(&self, user_id: &str) -> bool {
        self.users.iter().any(|u| u == user_id)
    }
}

/// Kinds of audit events the core emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// A request was blocked.
    SecurityBlock,
    /// Input scored above the suspicion threshold.
    SuspiciousInput,
    /// Content moderation flagged or rewrote model output.
    ModerationEvent,
    /// A trusted user bypassed detection.
    TrustedBypass,
    /// A pattern evaluation exceeded its time budget.
    PatternTimeout,
    /// A signed pattern batch was rejected.
    IntegrityRefusal,
}

/// Audit collaborator. Delivery is best-effort: the core does not retry and
/// accepts partial or duplicate delivery.
pub trait AuditSink: Send + Sync {
    /// Records one event. Implementations must not block request handling.
    fn record_event(&self, kind: AuditKind, payload: serde_json::Value);
}

/// Default audit sink that forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record_event(&self, kind: AuditKind, payload: serde_json::Value) {
        match kind {
            AuditKind::SecurityBlock | AuditKind::IntegrityRefusal => {
                tracing::warn!(kind = ?kind, %payload, "audit event");
            }
            _ => {
                tracing::debug!(kind = ?kind, %payload, "audit event");
            }
        }
    }
}

/// Audit sink that drops everything. Useful in tests and for hosts that
/// disable auditing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record_event(&self, _kind: AuditKind, _payload: serde_json::Value) {}
}

/// Dispatches one event to the sink, containing panics so a broken sink
/// cannot fail the verdict.
pub(crate) fn emit(sink: &dyn AuditSink, kind: AuditKind, payload: serde_json::Value) {
    let result = catch_unwind(AssertUnwindSafe(|| sink.record_event(kind, payload)));
    if result.is_err() {
        tracing::warn!(kind = ?kind, "audit sink panicked; event dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSink(Arc<AtomicUsize>);

    impl AuditSink for CountingSink {
        fn record_event(&self, _kind: AuditKind, _payload: serde_json::Value) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct PanickingSink;

    impl AuditSink for PanickingSink {
        fn record_event(&self, _kind: AuditKind, _payload: serde_json::Value) {
            panic!("sink down");
        }
    }

    #[test]
    fn no_trust_trusts_no_one() {
        assert!(!NoTrust.is_trusted("alice"));
    }

    #[test]
    fn static_trust_list_matches_exact_ids() {
        let trust = StaticTrustList::new(["alice", "bob"]);
        assert!(trust.is_trusted("alice"));
        assert!(trust.is_trusted("bob"));
        assert!(!trust.is_trusted("mallory"));
    }

    #[test]
    fn emit_delivers_to_sink() {
        let count = Arc::new(AtomicUsize::new(0));
        let sink = CountingSink(Arc::clone(&count));
        emit(&sink, AuditKind::SecurityBlock, serde_json::json!({"x": 1}));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn emit_contains_sink_panics() {
        emit(
            &PanickingSink,
            AuditKind::ModerationEvent,
            serde_json::json!({}),
        );
        // Reaching here means the panic did not propagate.
    }

    #[test]
    fn audit_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&AuditKind::SecurityBlock).unwrap(),
            "\"security_block\""
        );
    }
}
