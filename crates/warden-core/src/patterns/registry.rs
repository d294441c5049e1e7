//! Ordered pattern registry with integrity checking and signed imports.
//!
//! Registration order is evaluation order for the synchronous tier, so the
//! registry preserves insertion order. Re-registering an existing id
//! replaces the rule in place: the slot, position, and creation timestamp
//! survive the update.

use serde::{Deserialize, Serialize};

use crate::error::{Result, WardenError};
use crate::patterns::matcher::CompiledMatcher;
use crate::patterns::types::{
    sha256_hex, PatternAction, PatternExpr, SecurityPattern, ThreatCategory,
};
use crate::types::Severity;

/// A pattern together with its compiled matcher.
#[derive(Debug, Clone)]
pub(crate) struct RegisteredPattern {
    pub(crate) rule: SecurityPattern,
    pub(crate) matcher: CompiledMatcher,
}

/// The set of detection rules, in registration order.
#[derive(Debug, Default)]
pub struct PatternRegistry {
    entries: Vec<RegisteredPattern>,
}

/// A signed batch of patterns, as supplied by the threat-intelligence feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedPatternBatch {
    /// The patterns to merge.
    pub patterns: Vec<SecurityPattern>,
    /// Hex digest over the serialized pattern list.
    pub signature: String,
}

impl SignedPatternBatch {
    /// Signs a batch of patterns. Feed producers and tests use this; the
    /// registry side only ever verifies.
    pub fn sign(patterns: Vec<SecurityPattern>) -> Result<Self> {
        let signature = batch_digest(&patterns)?;
        Ok(Self {
            patterns,
            signature,
        })
    }
}

fn batch_digest(patterns: &[SecurityPattern]) -> Result<String> {
    let bytes = serde_json::to_vec(patterns)?;
    Ok(sha256_hex(&bytes))
}

impl PatternRegistry {
    /// Creates an empty registry.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a registry loaded with the built-in rule set.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        for pattern in default_patterns() {
            // Built-ins are sealed at construction; registration cannot fail.
            registry
                .register(pattern)
                .expect("built-in pattern must be valid");
        }
        registry
    }

    /// Registers a pattern. Its integrity hash is verified and its
    /// expression compiled before anything is stored; an existing id is
    /// replaced in place, keeping its position and creation timestamp.
    pub fn register(&mut self, pattern: SecurityPattern) -> Result<()> {
        pattern.verify_integrity()?;
        let matcher = CompiledMatcher::compile(&pattern.id, &pattern.expr)?;

        if let Some(existing) = self.entries.iter_mut().find(|e| e.rule.id == pattern.id) {
            let created_at = existing.rule.created_at;
            existing.rule = pattern;
            existing.rule.created_at = created_at;
            existing.matcher = matcher;
        } else {
            self.entries.push(RegisteredPattern {
                rule: pattern,
                matcher,
            });
        }
        Ok(())
    }

    /// Removes a pattern, returning it if present.
    pub fn remove(&mut self, id: &str) -> Option<SecurityPattern> {
        let pos = self.entries.iter().position(|e| e.rule.id == id)?;
        Some(self.entries.remove(pos).rule)
    }

    /// Looks up a pattern by id.
    pub fn get(&self, id: &str) -> Option<&SecurityPattern> {
        self.entries.iter().map(|e| &e.rule).find(|p| p.id == id)
    }

    /// Enables or disables a single pattern.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> Result<()> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.rule.id == id)
            .ok_or_else(|| WardenError::UnknownPattern(id.to_string()))?;
        entry.rule.enabled = enabled;
        Ok(())
    }

    /// Enables or disables every member of a group, atomically retiring a
    /// whole attack family. Returns the number of affected patterns.
    pub fn set_group_enabled(&mut self, group: &str, enabled: bool) -> Result<usize> {
        let mut affected = 0;
        for entry in &mut self.entries {
            if entry.rule.group.as_deref() == Some(group) {
                entry.rule.enabled = enabled;
                affected += 1;
            }
        }
        if affected == 0 {
            return Err(WardenError::UnknownGroup(group.to_string()));
        }
        Ok(affected)
    }

    /// Verifies the signature on a batch and merges it. The whole batch is
    /// rejected — nothing merged — if the signature does not match or any
    /// member fails integrity verification or compilation. Returns the
    /// number of merged patterns.
    pub fn import_signed(&mut self, batch: &SignedPatternBatch) -> Result<usize> {
        let expected = batch_digest(&batch.patterns)?;
        if expected != batch.signature {
            return Err(WardenError::SignatureMismatch {
                expected,
                supplied: batch.signature.clone(),
            });
        }

        // Validate every member before merging any.
        for pattern in &batch.patterns {
            pattern.verify_integrity()?;
            CompiledMatcher::compile(&pattern.id, &pattern.expr)?;
        }

        for pattern in &batch.patterns {
            self.register(pattern.clone())?;
        }
        Ok(batch.patterns.len())
    }

    /// All patterns, in registration order.
    pub fn patterns(&self) -> impl Iterator<Item = &SecurityPattern> {
        self.entries.iter().map(|e| &e.rule)
    }

    /// Number of registered patterns.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no patterns are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn entries(&self) -> &[RegisteredPattern] {
        &self.entries
    }

    #[cfg(test)]
    pub(crate) fn insert_raw(&mut self, rule: SecurityPattern, matcher: CompiledMatcher) {
        self.entries.push(RegisteredPattern { rule, matcher });
    }
}

/// Built-in detection rules covering all eight threat categories.
fn default_patterns() -> Vec<SecurityPattern> {
    vec![
        // Jailbreak family.
        SecurityPattern::new(
            "jb-001",
            PatternExpr::Regex(
                r"ignore\s+(all\s+)?(previous|prior|your)\s+(instructions|rules|guidelines)".into(),
            ),
            ThreatCategory::Jailbreak,
            Severity::Critical,
            PatternAction::Block,
        )
        .with_weight(0.9)
        .in_group("jailbreak"),
        SecurityPattern::new(
            "jb-002",
            PatternExpr::Regex(r"\b(dan|developer)\s+mode\b".into()),
            ThreatCategory::Jailbreak,
            Severity::High,
            PatternAction::Block,
        )
        .with_weight(0.85)
        .in_group("jailbreak"),
        SecurityPattern::new(
            "jb-003",
            PatternExpr::Regex(
                r"pretend\s+(you\s+are|to\s+be|you're)\s+(evil|unrestricted|unfiltered)".into(),
            ),
            ThreatCategory::Jailbreak,
            Severity::High,
            PatternAction::Block,
        )
        .with_weight(0.85)
        .in_group("jailbreak"),
        SecurityPattern::new(
            "jb-004",
            PatternExpr::Regex(
                r"bypass\s+(safety|content|ethical)\s*(filters?|restrictions?|guidelines?)?".into(),
            ),
            ThreatCategory::Jailbreak,
            Severity::High,
            PatternAction::Block,
        )
        .with_weight(0.85)
        .in_group("jailbreak"),
        SecurityPattern::new(
            "jb-005",
            PatternExpr::Regex(r"you\s+are\s+now\s+(free|unrestricted|unfiltered)".into()),
            ThreatCategory::Jailbreak,
            Severity::High,
            PatternAction::Block,
        )
        .with_weight(0.8)
        .in_group("jailbreak"),
        // Prompt exposure.
        SecurityPattern::new(
            "pe-001",
            PatternExpr::Regex(
                r"(tell|show|give|reveal)\s+(me\s+)?your\s+(system\s+)?prompt".into(),
            ),
            ThreatCategory::PromptExposure,
            Severity::High,
            PatternAction::Block,
        )
        .with_weight(0.85)
        .in_group("prompt-exposure"),
        SecurityPattern::new(
            "pe-002",
            PatternExpr::Regex(
                r"(repeat|print|output)\s+(your|the)\s+(system\s+)?(prompt|instructions)".into(),
            ),
            ThreatCategory::PromptExposure,
            Severity::High,
            PatternAction::Block,
        )
        .with_weight(0.8)
        .in_group("prompt-exposure"),
        SecurityPattern::new(
            "pe-003",
            PatternExpr::Regex(r"your\s+(initial|original|hidden)\s+(instructions|prompt)".into()),
            ThreatCategory::PromptExposure,
            Severity::Medium,
            PatternAction::Warn,
        )
        .with_weight(0.75)
        .in_group("prompt-exposure"),
        // Model reveal.
        SecurityPattern::new(
            "mr-001",
            PatternExpr::Regex(r"(what|which)\s+(model|llm|ai)\s+are\s+you".into()),
            ThreatCategory::ModelReveal,
            Severity::Low,
            PatternAction::Log,
        )
        .with_weight(0.6),
        SecurityPattern::new(
            "mr-002",
            PatternExpr::Regex(r"your\s+(training\s+data|model\s+weights|parameters)".into()),
            ThreatCategory::ModelReveal,
            Severity::Medium,
            PatternAction::Log,
        )
        .with_weight(0.7),
        // Harmful.
        SecurityPattern::new(
            "hm-001",
            PatternExpr::Regex(r"how\s+to\s+(kill|murder|assassinate)\b".into()),
            ThreatCategory::Harmful,
            Severity::Critical,
            PatternAction::Block,
        )
        .with_weight(0.9),
        SecurityPattern::new(
            "hm-002",
            PatternExpr::Regex(r"\b(bomb|explosive)\s+(making|instructions|build)".into()),
            ThreatCategory::Harmful,
            Severity::Critical,
            PatternAction::Block,
        )
        .with_weight(0.9),
        // Illegal.
        SecurityPattern::new(
            "il-001",
            PatternExpr::Regex(
                r"how\s+to\s+(make|cook|synthesize)\s+(meth|cocaine|heroin|fentanyl)".into(),
            ),
            ThreatCategory::Illegal,
            Severity::Critical,
            PatternAction::Block,
        )
        .with_weight(0.9),
        SecurityPattern::new(
            "il-002",
            PatternExpr::Regex(r"hack\s+into\s+(a\s+|someone'?s\s+)?(bank|account|computer|system)".into()),
            ThreatCategory::Illegal,
            Severity::High,
            PatternAction::Block,
        )
        .with_weight(0.85),
        // Self-harm.
        SecurityPattern::new(
            "sh-001",
            PatternExpr::Regex(r"how\s+to\s+(kill|hurt)\s+(myself|yourself)".into()),
            ThreatCategory::SelfHarm,
            Severity::Critical,
            PatternAction::Block,
        )
        .with_weight(0.95),
        SecurityPattern::new(
            "sh-002",
            PatternExpr::Regex(r"\b(suicide|suicidal)\s+(methods|ways|how)".into()),
            ThreatCategory::SelfHarm,
            Severity::Critical,
            PatternAction::Block,
        )
        .with_weight(0.95),
        // Injection.
        SecurityPattern::new(
            "in-001",
            PatternExpr::Regex(r"<script\b".into()),
            ThreatCategory::Injection,
            Severity::High,
            PatternAction::Block,
        )
        .with_weight(0.85),
        SecurityPattern::new(
            "in-002",
            PatternExpr::Regex(r"\bunion\s+select\b|\bdrop\s+table\b".into()),
            ThreatCategory::Injection,
            Severity::High,
            PatternAction::Warn,
        )
        .with_weight(0.8),
        SecurityPattern::new(
            "in-003",
            PatternExpr::Literal("javascript:".into()),
            ThreatCategory::Injection,
            Severity::Medium,
            PatternAction::Warn,
        )
        .with_weight(0.75)
        .deferred(),
        // Manipulation — lower-signal rules, deferred off the hot path.
        SecurityPattern::new(
            "mp-001",
            PatternExpr::Regex(r"\brole\s*play\s+as\b".into()),
            ThreatCategory::Manipulation,
            Severity::Medium,
            PatternAction::Warn,
        )
        .with_weight(0.7)
        .deferred(),
        SecurityPattern::new(
            "mp-002",
            PatternExpr::Regex(r"hypothetically\s+speaking".into()),
            ThreatCategory::Manipulation,
            Severity::Low,
            PatternAction::Log,
        )
        .with_weight(0.6)
        .deferred(),
        SecurityPattern::new(
            "mp-003",
            PatternExpr::Regex(r"for\s+(educational|research)\s+purposes\s+only".into()),
            ThreatCategory::Manipulation,
            Severity::Medium,
            PatternAction::Log,
        )
        .with_weight(0.7)
        .deferred(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str) -> SecurityPattern {
        SecurityPattern::new(
            id,
            PatternExpr::Literal("sample".into()),
            ThreatCategory::Harmful,
            Severity::Medium,
            PatternAction::Warn,
        )
    }

    #[test]
    fn defaults_cover_every_category() {
        let registry = PatternRegistry::with_defaults();
        for category in ThreatCategory::all() {
            assert!(
                registry.patterns().any(|p| p.category == *category),
                "no default pattern for {category:?}"
            );
        }
    }

    #[test]
    fn defaults_all_pass_integrity() {
        let registry = PatternRegistry::with_defaults();
        for pattern in registry.patterns() {
            assert!(pattern.verify_integrity().is_ok(), "{} tampered", pattern.id);
        }
    }

    #[test]
    fn registration_preserves_order() {
        let mut registry = PatternRegistry::empty();
        registry.register(sample("a")).unwrap();
        registry.register(sample("b")).unwrap();
        registry.register(sample("c")).unwrap();
        let ids: Vec<_> = registry.patterns().map(|p| p.id.clone()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn reregistering_keeps_position_and_created_at() {
        let mut registry = PatternRegistry::empty();
        registry.register(sample("a")).unwrap();
        registry.register(sample("b")).unwrap();
        let original_created = registry.get("a").unwrap().created_at;

        let mut update = sample("a").with_base_score(99);
        update.reseal();
        registry.register(update).unwrap();

        let ids: Vec<_> = registry.patterns().map(|p| p.id.clone()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        let a = registry.get("a").unwrap();
        assert_eq!(a.base_score, 99);
        assert_eq!(a.created_at, original_created);
    }

    #[test]
    fn tampered_pattern_is_refused() {
        let mut registry = PatternRegistry::empty();
        let mut tampered = sample("t");
        tampered.action = PatternAction::Allow; // not resealed
        assert!(matches!(
            registry.register(tampered),
            Err(WardenError::IntegrityMismatch { .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn group_disable_retires_whole_family() {
        let mut registry = PatternRegistry::with_defaults();
        let affected = registry.set_group_enabled("jailbreak", false).unwrap();
        assert_eq!(affected, 5);
        assert!(registry
            .patterns()
            .filter(|p| p.group.as_deref() == Some("jailbreak"))
            .all(|p| !p.enabled));
        // Other groups untouched.
        assert!(registry.get("pe-001").unwrap().enabled);
    }

    #[test]
    fn unknown_group_errors() {
        let mut registry = PatternRegistry::with_defaults();
        assert!(matches!(
            registry.set_group_enabled("no-such-group", false),
            Err(WardenError::UnknownGroup(_))
        ));
    }

    #[test]
    fn signed_import_merges_on_valid_signature() {
        let mut registry = PatternRegistry::empty();
        let batch = SignedPatternBatch::sign(vec![sample("feed-1"), sample("feed-2")]).unwrap();
        let merged = registry.import_signed(&batch).unwrap();
        assert_eq!(merged, 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn signed_import_rejects_bad_signature_entirely() {
        let mut registry = PatternRegistry::empty();
        let mut batch = SignedPatternBatch::sign(vec![sample("feed-1")]).unwrap();
        batch.signature = "deadbeef".to_string();
        assert!(matches!(
            registry.import_signed(&batch),
            Err(WardenError::SignatureMismatch { .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn signed_import_rejects_batch_with_one_tampered_member() {
        let mut registry = PatternRegistry::empty();
        let good = sample("good");
        let mut bad = sample("bad");
        bad.base_score = 1;
        bad.severity = Severity::Low; // defining field changed, not resealed
        let batch = SignedPatternBatch::sign(vec![good, bad]).unwrap();
        assert!(registry.import_signed(&batch).is_err());
        // Atomic refusal: the good member was not merged either.
        assert!(registry.is_empty());
    }

    #[test]
    fn tampering_after_signing_breaks_the_signature() {
        let mut registry = PatternRegistry::empty();
        let mut batch = SignedPatternBatch::sign(vec![sample("feed-1")]).unwrap();
        let mut swapped = sample("feed-1").with_base_score(100);
        swapped.reseal();
        batch.patterns[0] = swapped;
        assert!(matches!(
            registry.import_signed(&batch),
            Err(WardenError::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn remove_returns_the_pattern() {
        let mut registry = PatternRegistry::empty();
        registry.register(sample("a")).unwrap();
        let removed = registry.remove("a").unwrap();
        assert_eq!(removed.id, "a");
        assert!(registry.remove("a").is_none());
    }
}
