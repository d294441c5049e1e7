//! The orchestrator: composes pattern evaluation, suspicion analysis, and
//! content moderation into one allow/warn/block verdict.
//!
//! A `Warden` is an explicitly constructed instance owning its engine,
//! analyzer, moderator, caches, and per-user state; collaborators (trust
//! source, audit sink) are injected. Keeping one per process is the host's
//! choice, not a hidden global.
//!
//! Decision order for inbound text: pattern evaluation first (a BLOCK here
//! short-circuits), then suspicion (a score at or above the high-risk
//! threshold blocks), then moderation of the sanitized text (a low content
//! score blocks). Infrastructure faults degrade to the neutral safe result;
//! true pattern blocks always win over cached or partial results.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::cache::{BoundedTtlCache, CacheStats};
use crate::config::GuardConfig;
use crate::error::Result;
use crate::events::{emit, AuditKind, AuditSink, NoTrust, TracingAuditSink, TrustSource};
use crate::moderation::{ContentModerator, ModerationContext, ModerationResult};
use crate::patterns::{DetectionOutcome, PatternEngine, SignedPatternBatch};
use crate::suspicion::{
    SanitizationResult, SanitizeOptions, SuspicionAnalysis, SuspicionAnalyzer,
};

/// Final decision for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Let the request through.
    #[default]
    Allow,
    /// Let it through with a warning.
    Warn,
    /// Refuse it.
    Block,
}

impl Verdict {
    /// Returns a human-readable name for this verdict.
    pub fn name(&self) -> &'static str {
        match self {
            Verdict::Allow => "Allow",
            Verdict::Warn => "Warn",
            Verdict::Block => "Block",
        }
    }
}

/// Options for one analysis call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeOptions {
    /// User the text is attributed to.
    pub user_id: Option<String>,
    /// Bypass the verdict cache for this call.
    pub skip_cache: bool,
    /// Apply strict-mode sanitization and toxicity scoring.
    pub strict_mode: bool,
    /// Free-form caller context, forwarded to audit events.
    pub context: Option<String>,
}

impl AnalyzeOptions {
    /// Options attributing the text to a user.
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }
}

/// Per-stage results backing a verdict.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageResults {
    /// Pattern-registry evaluation, when it ran.
    pub detection: Option<DetectionOutcome>,
    /// Suspicion analysis, when it ran.
    pub suspicion: Option<SuspicionAnalysis>,
    /// Content moderation, when it ran.
    pub moderation: Option<ModerationResult>,
}

/// The combined decision for one input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedVerdict {
    /// The decision.
    pub verdict: Verdict,
    /// True when the decision is Block.
    pub blocked: bool,
    /// Enumerated block reasons — category names, never pattern internals.
    pub block_reasons: Vec<String>,
    /// Highest risk score across the stages that ran.
    pub risk_score: u32,
    /// Confidence in the decision (0.0–1.0). The neutral safe result is 1.0.
    pub confidence: f32,
    /// True when a trusted user bypassed detection.
    pub trusted_bypass: bool,
    /// True when served from the verdict cache.
    pub from_cache: bool,
    /// What each stage found.
    pub stages: StageResults,
}

impl UnifiedVerdict {
    /// The neutral safe result returned for empty input and on internal
    /// failure.
    fn safe() -> Self {
        Self {
            verdict: Verdict::Allow,
            blocked: false,
            block_reasons: Vec::new(),
            risk_score: 0,
            confidence: 1.0,
            trusted_bypass: false,
            from_cache: false,
            stages: StageResults::default(),
        }
    }
}

/// Result of scrubbing model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSanitization {
    /// The scrubbed text.
    pub sanitized: String,
    /// True when anything was rewritten.
    pub modified: bool,
    /// Notes on what was rewritten or flagged.
    pub warnings: Vec<String>,
}

/// Snapshot of a user's advisory escalation state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserState {
    /// Block/suspicious events recorded for the user.
    pub suspicion_count: u32,
    /// Timestamps of blocked requests.
    pub block_history: Vec<DateTime<Utc>>,
    /// Whether the user crossed the flag limit.
    pub flagged: bool,
}

#[derive(Debug, Default, Clone)]
struct UserRecord {
    suspicion_count: u32,
    block_history: Vec<DateTime<Utc>>,
}

/// Message substituted for output that moderation refuses to release.
const BLOCKED_OUTPUT_MESSAGE: &str = "This response was blocked for safety.";

/// The guardrail orchestrator.
pub struct Warden {
    config: GuardConfig,
    engine: PatternEngine,
    analyzer: SuspicionAnalyzer,
    moderator: ContentModerator,
    trust: Box<dyn TrustSource>,
    audit: Box<dyn AuditSink>,
    verdict_cache: BoundedTtlCache<String, UnifiedVerdict>,
    users: Mutex<HashMap<String, UserRecord>>,
}

impl Warden {
    /// Creates a warden with built-in patterns, no trusted users, and
    /// tracing-backed audit.
    pub fn new(config: GuardConfig) -> Self {
        let verdict_cache =
            BoundedTtlCache::new(config.cache_capacity, config.cache_ttl());
        Self {
            engine: PatternEngine::with_defaults(),
            analyzer: SuspicionAnalyzer::with_defaults(),
            moderator: ContentModerator::new(),
            trust: Box::new(NoTrust),
            audit: Box::new(TracingAuditSink),
            verdict_cache,
            users: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Creates a warden with default thresholds.
    pub fn with_defaults() -> Self {
        Self::new(GuardConfig::default())
    }

    /// Injects a trust source.
    pub fn with_trust_source(mut self, trust: Box<dyn TrustSource>) -> Self {
        self.trust = trust;
        self
    }

    /// Injects an audit sink.
    pub fn with_audit_sink(mut self, audit: Box<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Replaces the pattern engine (e.g. one with extra observers).
    pub fn with_pattern_engine(mut self, engine: PatternEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Replaces the moderator (e.g. one with a host-supplied entity list).
    pub fn with_moderator(mut self, moderator: ContentModerator) -> Self {
        self.moderator = moderator;
        self
    }

    /// The pattern engine, for registry management.
    pub fn pattern_engine(&self) -> &PatternEngine {
        &self.engine
    }

    /// Verifies and merges a signed threat-intelligence batch, refusing it
    /// atomically on signature or integrity mismatch.
    pub fn import_threat_feed(&self, batch: &SignedPatternBatch) -> Result<usize> {
        let outcome = self.engine.import_signed(batch);
        if outcome.is_err() {
            emit(
                self.audit.as_ref(),
                AuditKind::IntegrityRefusal,
                serde_json::json!({ "patterns": batch.patterns.len() }),
            );
        }
        outcome
    }

    /// Cached combined analysis. Hits are served without re-running
    /// detection and are identical to a fresh evaluation apart from the
    /// cache flag.
    pub fn analyze(&self, text: &str, options: &AnalyzeOptions) -> UnifiedVerdict {
        if !options.skip_cache {
            let key = cache_key(text, options.user_id.as_deref());
            if let Some(mut hit) = self.verdict_cache.get(&key) {
                hit.from_cache = true;
                return hit;
            }
            let verdict = self.check_input(text, options);
            self.verdict_cache.insert(key, verdict.clone());
            return verdict;
        }
        self.check_input(text, options)
    }

    /// Runs the full inbound decision pipeline, uncached.
    pub fn check_input(&self, text: &str, options: &AnalyzeOptions) -> UnifiedVerdict {
        if text.trim().is_empty() {
            return UnifiedVerdict::safe();
        }
        let user_id = options.user_id.as_deref();

        // Trusted users bypass detection; the bypass stays observable.
        if let Some(user) = user_id {
            let trusted =
                catch_unwind(AssertUnwindSafe(|| self.trust.is_trusted(user))).unwrap_or(false);
            if trusted {
                emit(
                    self.audit.as_ref(),
                    AuditKind::TrustedBypass,
                    serde_json::json!({ "user_id": user, "context": options.context }),
                );
                return UnifiedVerdict {
                    trusted_bypass: true,
                    ..UnifiedVerdict::safe()
                };
            }
        }

        let mut stages = StageResults::default();

        // Fast path: pattern evaluation. A block here short-circuits.
        let detection = self.guarded_detection(text, user_id);
        let pattern_blocked = detection.is_blocking();
        let pattern_warn = detection.action == crate::patterns::PatternAction::Warn;
        let detection_risk = detection.risk_score;
        let detection_confidence = detection.confidence_level;
        let block_reasons: Vec<String> = detection
            .triggered_categories()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        stages.detection = Some(detection);

        if pattern_blocked {
            self.record_block(user_id);
            emit(
                self.audit.as_ref(),
                AuditKind::SecurityBlock,
                serde_json::json!({
                    "user_id": user_id,
                    "stage": "patterns",
                    "categories": block_reasons,
                    "risk_score": detection_risk,
                }),
            );
            return UnifiedVerdict {
                verdict: Verdict::Block,
                blocked: true,
                block_reasons,
                risk_score: detection_risk,
                confidence: detection_confidence as f32 / 100.0,
                trusted_bypass: false,
                from_cache: false,
                stages,
            };
        }

        // Second stage: suspicion analysis over the original text.
        let suspicion = self.guarded_suspicion(text, user_id);
        let suspicion_risk = suspicion.risk_score;
        let suspicious = suspicion.suspicious;
        let high_risk = suspicion_risk >= self.config.high_risk_threshold;
        stages.suspicion = Some(suspicion);

        if suspicious {
            self.record_suspicion(user_id);
            emit(
                self.audit.as_ref(),
                AuditKind::SuspiciousInput,
                serde_json::json!({
                    "user_id": user_id,
                    "risk_score": suspicion_risk,
                    "context": options.context,
                }),
            );
        }

        if high_risk {
            self.record_block(user_id);
            emit(
                self.audit.as_ref(),
                AuditKind::SecurityBlock,
                serde_json::json!({
                    "user_id": user_id,
                    "stage": "suspicion",
                    "risk_score": suspicion_risk,
                }),
            );
            return UnifiedVerdict {
                verdict: Verdict::Block,
                blocked: true,
                block_reasons: vec!["Suspicious Input".to_string()],
                risk_score: suspicion_risk,
                confidence: stage_confidence(&stages),
                trusted_bypass: false,
                from_cache: false,
                stages,
            };
        }

        // Third stage: moderation of the sanitized text.
        let strict = options.strict_mode || self.config.strict_mode;
        let sanitize_options = SanitizeOptions {
            strict,
            ..SanitizeOptions::default()
        };
        let sanitized = self.analyzer.sanitize(text, &sanitize_options);
        let moderation_context = ModerationContext {
            strict_mode: strict,
            min_safe_score: self.config.min_safe_score,
            toxicity_threshold: self.config.toxicity_threshold,
            ..ModerationContext::user_input()
        };
        let moderation = self.guarded_moderation(&sanitized.sanitized, &moderation_context);
        let content_score = moderation.content_score;
        let moderation_clean = moderation.is_clean;
        stages.moderation = Some(moderation);

        if content_score < self.config.min_safe_score {
            self.record_block(user_id);
            emit(
                self.audit.as_ref(),
                AuditKind::SecurityBlock,
                serde_json::json!({
                    "user_id": user_id,
                    "stage": "moderation",
                    "content_score": content_score,
                }),
            );
            return UnifiedVerdict {
                verdict: Verdict::Block,
                blocked: true,
                block_reasons: vec!["Content Safety".to_string()],
                risk_score: suspicion_risk.max(detection_risk),
                confidence: stage_confidence(&stages),
                trusted_bypass: false,
                from_cache: false,
                stages,
            };
        }

        let verdict = if pattern_warn || suspicious || !moderation_clean {
            Verdict::Warn
        } else {
            Verdict::Allow
        };

        UnifiedVerdict {
            verdict,
            blocked: false,
            block_reasons: Vec::new(),
            risk_score: detection_risk.max(suspicion_risk),
            confidence: stage_confidence(&stages),
            trusted_bypass: false,
            from_cache: false,
            stages,
        }
    }

    /// Runs the sanitization pipeline on inbound text.
    pub fn sanitize(&self, text: &str, options: &SanitizeOptions) -> SanitizationResult {
        self.analyzer.sanitize(text, options)
    }

    /// Runs suspicion analysis alone.
    pub fn analyze_suspicion(&self, text: &str, user_id: Option<&str>) -> SuspicionAnalysis {
        self.analyzer.analyze_suspicion(text, user_id)
    }

    /// Runs content moderation alone.
    pub fn moderate(&self, text: &str, context: &ModerationContext) -> ModerationResult {
        self.guarded_moderation(text, context)
    }

    /// Scrubs model output: entity redaction, PII redaction, code removal,
    /// profanity filtering. Critical-risk output is replaced wholesale with
    /// a generic safety message; callers never see the triggering detail.
    pub fn sanitize_output(&self, text: &str, user_id: Option<&str>) -> OutputSanitization {
        let context = ModerationContext {
            strict_mode: self.config.strict_mode,
            min_safe_score: self.config.min_safe_score,
            toxicity_threshold: self.config.toxicity_threshold,
            ..ModerationContext::default()
        };
        let result = self.guarded_moderation(text, &context);

        let mut warnings: Vec<String> = result.flags.iter().map(|f| f.reason.clone()).collect();
        if !result.blocked_entities.is_empty() {
            warnings.push(format!(
                "model names redacted: {}",
                result.blocked_entities.join(", ")
            ));
        }
        let modified = result.modifications > 0 || result.sanitized_content != text;

        if modified || !result.flags.is_empty() {
            emit(
                self.audit.as_ref(),
                AuditKind::ModerationEvent,
                serde_json::json!({
                    "user_id": user_id,
                    "modifications": result.modifications,
                    "flags": result.flags.len(),
                    "entities": result.blocked_entities,
                }),
            );
        }

        if result.risk_level == crate::types::RiskLevel::Critical {
            return OutputSanitization {
                sanitized: BLOCKED_OUTPUT_MESSAGE.to_string(),
                modified: true,
                warnings: vec!["blocked for safety".to_string()],
            };
        }

        OutputSanitization {
            sanitized: result.sanitized_content,
            modified,
            warnings,
        }
    }

    /// Whether the user has crossed the flag limit.
    pub fn is_flagged(&self, user_id: &str) -> bool {
        self.users
            .lock()
            .get(user_id)
            .map(|r| r.block_history.len() >= self.config.flag_attempt_limit)
            .unwrap_or(false)
    }

    /// Snapshot of a user's advisory state.
    pub fn user_state(&self, user_id: &str) -> UserState {
        let users = self.users.lock();
        let record = users.get(user_id).cloned().unwrap_or_default();
        UserState {
            flagged: record.block_history.len() >= self.config.flag_attempt_limit,
            suspicion_count: record.suspicion_count,
            block_history: record.block_history,
        }
    }

    /// Clears a user's counters and history.
    pub fn reset_user(&self, user_id: &str) {
        self.users.lock().remove(user_id);
    }

    /// Verdict-cache counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.verdict_cache.stats()
    }

    /// Removes expired entries from the verdict cache. For an optional host
    /// sweep task; request handling never depends on it.
    pub fn sweep_caches(&self) -> usize {
        self.verdict_cache.sweep()
    }

    fn guarded_detection(&self, text: &str, user_id: Option<&str>) -> DetectionOutcome {
        catch_unwind(AssertUnwindSafe(|| self.engine.evaluate(text, user_id))).unwrap_or_else(
            |_| {
                tracing::warn!("pattern evaluation panicked; returning clear outcome");
                DetectionOutcome::clear(0)
            },
        )
    }

    fn guarded_suspicion(&self, text: &str, user_id: Option<&str>) -> SuspicionAnalysis {
        catch_unwind(AssertUnwindSafe(|| {
            self.analyzer.analyze_suspicion(text, user_id)
        }))
        .unwrap_or_else(|_| {
            tracing::warn!("suspicion analysis panicked; returning neutral analysis");
            SuspicionAnalysis::default()
        })
    }

    fn guarded_moderation(
        &self,
        text: &str,
        context: &ModerationContext,
    ) -> ModerationResult {
        catch_unwind(AssertUnwindSafe(|| self.moderator.moderate(text, context))).unwrap_or_else(
            |_| {
                tracing::warn!("moderation panicked; returning neutral result");
                self.moderator.moderate("", context)
            },
        )
    }

    fn record_block(&self, user_id: Option<&str>) {
        if let Some(user) = user_id {
            let mut users = self.users.lock();
            let record = users.entry(user.to_string()).or_default();
            record.suspicion_count += 1;
            record.block_history.push(Utc::now());
        }
    }

    fn record_suspicion(&self, user_id: Option<&str>) {
        if let Some(user) = user_id {
            let mut users = self.users.lock();
            users.entry(user.to_string()).or_default().suspicion_count += 1;
        }
    }
}

fn cache_key(text: &str, user_id: Option<&str>) -> String {
    format!("{}\u{1F}{}", user_id.unwrap_or("-"), text)
}

/// Confidence in the decision: the neutral result is fully confident, and a
/// decision backed by stages inherits the strongest stage confidence.
fn stage_confidence(stages: &StageResults) -> f32 {
    let mut confidence: f32 = 0.0;
    let mut any = false;
    if let Some(d) = &stages.detection {
        if !d.triggered.is_empty() {
            confidence = confidence.max(d.confidence_level as f32 / 100.0);
            any = true;
        }
    }
    if let Some(s) = &stages.suspicion {
        if s.layers != Default::default() && s.confidence_level > 0 {
            confidence = confidence.max(s.confidence_level as f32 / 100.0);
            any = true;
        }
    }
    if any {
        confidence
    } else {
        1.0
    }
}
