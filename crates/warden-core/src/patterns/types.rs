//! Detection rule model.
//!
//! A [`SecurityPattern`] is a weighted detection rule with a tamper-evident
//! integrity hash over its defining fields. Patterns are immutable once
//! sealed; updating one means re-registering a re-sealed copy under the same
//! id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, WardenError};
use crate::types::Severity;

/// Threat categories a pattern can detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatCategory {
    /// Attempts to bypass AI safety measures.
    Jailbreak,
    /// Attempts to extract the system prompt.
    PromptExposure,
    /// Attempts to make the model reveal its identity or internals.
    ModelReveal,
    /// Harmful content (violence, hate, abuse).
    Harmful,
    /// Content promoting illegal activities.
    Illegal,
    /// Content related to self-harm or suicide.
    SelfHarm,
    /// Code or markup injection.
    Injection,
    /// Social-engineering and manipulation framing.
    Manipulation,
}

impl ThreatCategory {
    /// Returns all categories.
    pub fn all() -> &'static [ThreatCategory] {
        &[
            ThreatCategory::Jailbreak,
            ThreatCategory::PromptExposure,
            ThreatCategory::ModelReveal,
            ThreatCategory::Harmful,
            ThreatCategory::Illegal,
            ThreatCategory::SelfHarm,
            ThreatCategory::Injection,
            ThreatCategory::Manipulation,
        ]
    }

    /// Returns a human-readable name for this category.
    pub fn name(&self) -> &'static str {
        match self {
            ThreatCategory::Jailbreak => "Jailbreak",
            ThreatCategory::PromptExposure => "Prompt Exposure",
            ThreatCategory::ModelReveal => "Model Reveal",
            ThreatCategory::Harmful => "Harmful",
            ThreatCategory::Illegal => "Illegal",
            ThreatCategory::SelfHarm => "Self-Harm",
            ThreatCategory::Injection => "Injection",
            ThreatCategory::Manipulation => "Manipulation",
        }
    }

    fn canonical(&self) -> &'static str {
        match self {
            ThreatCategory::Jailbreak => "jailbreak",
            ThreatCategory::PromptExposure => "prompt_exposure",
            ThreatCategory::ModelReveal => "model_reveal",
            ThreatCategory::Harmful => "harmful",
            ThreatCategory::Illegal => "illegal",
            ThreatCategory::SelfHarm => "self_harm",
            ThreatCategory::Injection => "injection",
            ThreatCategory::Manipulation => "manipulation",
        }
    }
}

/// Action taken when a pattern matches, in ascending priority order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PatternAction {
    /// Record nothing beyond the match itself.
    #[default]
    Allow,
    /// Record the match for audit.
    Log,
    /// Surface a warning but let the request pass.
    Warn,
    /// Block the request.
    Block,
}

impl PatternAction {
    /// Returns a human-readable name for this action.
    pub fn name(&self) -> &'static str {
        match self {
            PatternAction::Allow => "Allow",
            PatternAction::Log => "Log",
            PatternAction::Warn => "Warn",
            PatternAction::Block => "Block",
        }
    }

    fn canonical(&self) -> &'static str {
        match self {
            PatternAction::Allow => "allow",
            PatternAction::Log => "log",
            PatternAction::Warn => "warn",
            PatternAction::Block => "block",
        }
    }
}

/// Scheduling priority. High-priority patterns (and any pattern not marked
/// async-eligible) run synchronously in registration order; low-priority
/// async-eligible patterns run in the deferred batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternPriority {
    /// Always on the synchronous hot path.
    High,
    /// Synchronous by default.
    #[default]
    Medium,
    /// Deferred when marked async-eligible.
    Low,
}

/// Expression a pattern matches with: a regular expression or a literal
/// substring.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum PatternExpr {
    /// Case-insensitive regular expression.
    Regex(String),
    /// Case-insensitive literal substring.
    Literal(String),
}

impl PatternExpr {
    fn canonical(&self) -> String {
        match self {
            PatternExpr::Regex(p) => format!("regex:{p}"),
            PatternExpr::Literal(p) => format!("literal:{p}"),
        }
    }
}

/// A weighted detection rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityPattern {
    /// Stable identifier.
    pub id: String,
    /// Match expression.
    pub expr: PatternExpr,
    /// Threat category this rule detects.
    pub category: ThreatCategory,
    /// Severity of a match.
    pub severity: Severity,
    /// Action taken on match.
    pub action: PatternAction,
    /// Whether the rule participates in evaluation.
    pub enabled: bool,
    /// Wall-clock evaluation budget in milliseconds.
    pub max_eval_ms: u64,
    /// Whether the rule may run off the synchronous hot path.
    pub is_async: bool,
    /// Scheduling priority.
    pub priority: PatternPriority,
    /// Reliability factor weighting this rule's score contribution (0.0–1.0).
    pub confidence_weight: f32,
    /// Score contribution when matched (0–100).
    pub base_score: u32,
    /// Optional group for coordinated enable/disable.
    pub group: Option<String>,
    /// Ids of rules this rule depends on.
    pub dependencies: Vec<String>,
    /// Locale tags this rule applies to. Empty means all.
    pub languages: Vec<String>,
    /// SHA-256 digest over expression, category, severity, and action.
    pub integrity_hash: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl SecurityPattern {
    /// Creates a sealed pattern with defaults: enabled, medium priority,
    /// 50 ms budget, weight 0.8, base score derived from severity.
    pub fn new(
        id: impl Into<String>,
        expr: PatternExpr,
        category: ThreatCategory,
        severity: Severity,
        action: PatternAction,
    ) -> Self {
        let base_score = match severity {
            Severity::Low => 25,
            Severity::Medium => 50,
            Severity::High => 80,
            Severity::Critical => 95,
        };
        let now = Utc::now();
        let mut pattern = Self {
            id: id.into(),
            expr,
            category,
            severity,
            action,
            enabled: true,
            max_eval_ms: 50,
            is_async: false,
            priority: PatternPriority::Medium,
            confidence_weight: 0.8,
            base_score,
            group: None,
            dependencies: Vec::new(),
            languages: Vec::new(),
            integrity_hash: String::new(),
            created_at: now,
            updated_at: now,
        };
        pattern.integrity_hash = pattern.compute_integrity_hash();
        pattern
    }

    /// Sets the confidence weight, clamped to 0.0–1.0.
    pub fn with_weight(mut self, weight: f32) -> Self {
        self.confidence_weight = weight.clamp(0.0, 1.0);
        self
    }

    /// Sets the base score, clamped to 0–100.
    pub fn with_base_score(mut self, score: u32) -> Self {
        self.base_score = score.min(100);
        self
    }

    /// Sets the evaluation budget.
    pub fn with_max_eval_ms(mut self, ms: u64) -> Self {
        self.max_eval_ms = ms.max(1);
        self
    }

    /// Marks the rule deferred: low priority and async-eligible.
    pub fn deferred(mut self) -> Self {
        self.priority = PatternPriority::Low;
        self.is_async = true;
        self
    }

    /// Sets the scheduling priority.
    pub fn with_priority(mut self, priority: PatternPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Assigns the rule to a group.
    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Enables or disables the rule.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Computes the digest over the defining fields.
    pub fn compute_integrity_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.expr.canonical().as_bytes());
        hasher.update(b"|");
        hasher.update(self.category.canonical().as_bytes());
        hasher.update(b"|");
        hasher.update(self.severity.name().to_ascii_lowercase().as_bytes());
        hasher.update(b"|");
        hasher.update(self.action.canonical().as_bytes());
        hex_digest(hasher)
    }

    /// Recomputes and stores the integrity hash, stamping `updated_at`.
    /// The one sanctioned way to change a sealed pattern.
    pub fn reseal(&mut self) {
        self.integrity_hash = self.compute_integrity_hash();
        self.updated_at = Utc::now();
    }

    /// Verifies the stored hash against the defining fields. A mismatch is a
    /// hard integrity error, never ignored.
    pub fn verify_integrity(&self) -> Result<()> {
        if self.integrity_hash == self.compute_integrity_hash() {
            Ok(())
        } else {
            Err(WardenError::IntegrityMismatch {
                id: self.id.clone(),
            })
        }
    }

    /// Whether this pattern belongs on the deferred evaluation path.
    pub fn is_deferred(&self) -> bool {
        self.is_async && self.priority == PatternPriority::Low
    }
}

/// One pattern that matched during evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggeredPattern {
    /// Id of the matching pattern.
    pub pattern_id: String,
    /// Its category.
    pub category: ThreatCategory,
    /// Its severity.
    pub severity: Severity,
    /// Its confidence weight at match time.
    pub weight: f32,
    /// Time spent evaluating it, in microseconds.
    pub eval_time_us: u64,
}

/// Result of evaluating all enabled patterns against one input.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DetectionOutcome {
    /// Weighted average of base scores over matched patterns (0–100).
    pub risk_score: u32,
    /// Proportion of weight represented by the matches (0–100).
    pub confidence_level: u32,
    /// Matched patterns in evaluation order.
    pub triggered: Vec<TriggeredPattern>,
    /// Highest-priority action among the matches.
    pub action: PatternAction,
    /// Total evaluation time in microseconds.
    pub eval_time_us: u64,
    /// Whether the deferred batch ran.
    pub used_async: bool,
}

impl DetectionOutcome {
    /// Outcome for input that triggered nothing.
    pub fn clear(eval_time_us: u64) -> Self {
        Self {
            eval_time_us,
            ..Self::default()
        }
    }

    /// Returns true if the outcome blocks the request.
    pub fn is_blocking(&self) -> bool {
        self.action == PatternAction::Block
    }

    /// Categories among the triggered patterns, deduplicated, in evaluation
    /// order. This is the enumerated block reason surfaced to users — never
    /// raw pattern internals.
    pub fn triggered_categories(&self) -> Vec<ThreatCategory> {
        let mut seen = Vec::new();
        for t in &self.triggered {
            if !seen.contains(&t.category) {
                seen.push(t.category);
            }
        }
        seen
    }
}

fn hex_digest(hasher: Sha256) -> String {
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// SHA-256 hex digest of arbitrary bytes. Shared with batch signature
/// verification.
pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_digest(hasher)
}
