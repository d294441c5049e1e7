//! Warden Core — threat detection and risk scoring for an AI-chat guardrail
//! layer.
//!
//! The crate decides, for every inbound user message and outbound model
//! response, whether it is safe, suspicious, or must be blocked:
//!
//! - [`patterns`] — weighted detection rules with tamper-evident integrity
//!   hashes, evaluated under per-pattern time budgets by a linear-time
//!   matcher.
//! - [`suspicion`] — an idempotent sanitization pipeline and five heuristic
//!   layers producing a 0–100 suspicion score.
//! - [`moderation`] — PII, disallowed-entity, malicious-code, and toxicity
//!   checks over model output.
//! - [`Warden`] — the orchestrator fusing the three into a single
//!   allow/warn/block verdict, with verdict caching and per-user escalation
//!   tracking.
//!
//! Construction is explicit: the host builds a [`Warden`] (usually one per
//! process), injects its [`TrustSource`] and [`AuditSink`] collaborators,
//! and calls [`Warden::analyze`] / [`Warden::sanitize_output`]. Analysis
//! entry points never fail — on internal fault they return the same neutral
//! safe result as empty input.

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod moderation;
pub mod orchestrator;
pub mod patterns;
pub mod suspicion;
pub mod types;

pub use cache::{BoundedTtlCache, CacheStats};
pub use config::GuardConfig;
pub use error::{Result, WardenError};
pub use events::{AuditKind, AuditSink, NoTrust, StaticTrustList, TracingAuditSink, TrustSource};
pub use moderation::{
    ContentModerator, DisallowedEntity, EntityAction, EntityRedactor, HarmCategory,
    ModerationContext, ModerationFlag, ModerationResult, PiiDetection, PiiDetector, PiiType,
};
pub use orchestrator::{
    AnalyzeOptions, OutputSanitization, StageResults, UnifiedVerdict, UserState, Verdict, Warden,
};
pub use patterns::{
    DetectionOutcome, PatternAction, PatternEngine, PatternEvent, PatternExpr, PatternObserver,
    PatternPriority, PatternRegistry, SecurityPattern, SignedPatternBatch, ThreatCategory,
    TracingObserver, TriggeredPattern,
};
pub use suspicion::{
    CustomRule, LayerResult, Modification, ModificationKind, SanitizationResult, SanitizeOptions,
    Sanitizer, SuspicionAnalysis, SuspicionAnalyzer, SuspicionConfig, SuspicionLayers,
};
pub use types::{RiskLevel, Severity};
