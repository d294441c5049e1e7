//! Content moderation for model output.
//!
//! An ordered pipeline of individually toggleable checks: harmful-content
//! flagging, disallowed-entity redaction, PII detection and redaction,
//! malicious-code removal, profanity filtering, toxicity scoring, and a
//! composite content-safety score. Every sub-check is isolated — one failing
//! detector never prevents the rest from running.

mod entities;
mod pii;
mod toxicity;

use std::panic::{catch_unwind, AssertUnwindSafe};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::{RiskLevel, Severity};

pub use entities::{DisallowedEntity, EntityAction, EntityRedactor};
pub use pii::{PiiDetection, PiiDetector, PiiType};
pub use toxicity::ToxicityScorer;

/// Placeholder substituted for removed malicious code.
const CODE_PLACEHOLDER: &str = "[CODE-REMOVED]";

/// Harmful-content categories flagged (never rewritten) by the moderator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarmCategory {
    /// Hate speech or discrimination.
    HateSpeech,
    /// Violence or incitement.
    Violence,
    /// Self-harm or suicide content.
    SelfHarm,
    /// Spam and scam framing.
    Spam,
    /// Instructions for illegal activity.
    IllegalActivity,
}

impl HarmCategory {
    /// Returns a human-readable name for this category.
    pub fn name(&self) -> &'static str {
        match self {
            HarmCategory::HateSpeech => "Hate Speech",
            HarmCategory::Violence => "Violence",
            HarmCategory::SelfHarm => "Self-Harm",
            HarmCategory::Spam => "Spam",
            HarmCategory::IllegalActivity => "Illegal Activity",
        }
    }
}

/// One harmful-content finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationFlag {
    /// The flagged category.
    pub category: HarmCategory,
    /// How serious the finding is.
    pub severity: Severity,
    /// Short description of what matched.
    pub reason: String,
    /// Byte span of the match, when available.
    pub span: Option<(usize, usize)>,
}

/// Which checks run and their thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationContext {
    /// True when moderating user input rather than model output. Entity
    /// redaction applies only to model output.
    pub is_user_input: bool,
    /// Strict mode multiplies toxicity and tightens sanitization.
    pub strict_mode: bool,
    /// Run the harmful-content check.
    pub check_harmful: bool,
    /// Run disallowed-entity redaction.
    pub check_entities: bool,
    /// Run PII detection.
    pub check_pii: bool,
    /// Redact PII detections at or above the confidence threshold.
    pub redact_pii: bool,
    /// Run malicious-code removal.
    pub check_code: bool,
    /// Run profanity filtering.
    pub check_profanity: bool,
    /// Confidence below which PII is reported but not redacted.
    pub pii_confidence_threshold: f32,
    /// Content score below which output is not clean.
    pub min_safe_score: f32,
    /// Toxicity at or above which output is not clean.
    pub toxicity_threshold: u32,
}

impl Default for ModerationContext {
    fn default() -> Self {
        Self {
            is_user_input: false,
            strict_mode: false,
            check_harmful: true,
            check_entities: true,
            check_pii: true,
            redact_pii: true,
            check_code: true,
            check_profanity: true,
            pii_confidence_threshold: 0.5,
            min_safe_score: 70.0,
            toxicity_threshold: 50,
        }
    }
}

impl ModerationContext {
    /// Context for moderating user input: entity redaction off.
    pub fn user_input() -> Self {
        Self {
            is_user_input: true,
            ..Self::default()
        }
    }
}

/// Result of moderating one text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationResult {
    /// True when nothing was flagged and scores are within bounds.
    pub is_clean: bool,
    /// 100 minus weighted penalties.
    pub content_score: f32,
    /// 0–100 toxicity score.
    pub toxicity_score: u32,
    /// Risk bucket for the content.
    pub risk_level: RiskLevel,
    /// Harmful-content findings.
    pub flags: Vec<ModerationFlag>,
    /// PII findings (redacted or not).
    pub pii: Vec<PiiDetection>,
    /// Names of disallowed entities that matched.
    pub blocked_entities: Vec<String>,
    /// The rewritten text.
    pub sanitized_content: String,
    /// Number of rewrites applied across all checks.
    pub modifications: u32,
}

impl ModerationResult {
    /// Neutral result for empty input or total check failure.
    fn clean(text: &str) -> Self {
        Self {
            is_clean: true,
            content_score: 100.0,
            toxicity_score: 0,
            risk_level: RiskLevel::Safe,
            flags: Vec::new(),
            pii: Vec::new(),
            blocked_entities: Vec::new(),
            sanitized_content: text.to_string(),
            modifications: 0,
        }
    }

    /// Returns true if any PII was found.
    pub fn has_pii(&self) -> bool {
        !self.pii.is_empty()
    }
}

struct HarmfulPattern {
    category: HarmCategory,
    severity: Severity,
    regex: Regex,
    reason: &'static str,
}

/// The moderation pipeline.
pub struct ContentModerator {
    harmful: Vec<HarmfulPattern>,
    entities: EntityRedactor,
    pii: PiiDetector,
    toxicity: ToxicityScorer,
    re_script_block: Regex,
    re_script_tag: Regex,
    re_scheme: Regex,
    re_event_handler: Regex,
    re_sql_tautology: Regex,
    re_dangerous_call: Regex,
}

impl ContentModerator {
    /// Creates a moderator with the built-in entity list.
    pub fn new() -> Self {
        Self::with_entities(EntityRedactor::with_defaults())
    }

    /// Creates a moderator over an externally configured entity list.
    pub fn with_entities(entities: EntityRedactor) -> Self {
        Self {
            harmful: harmful_patterns(),
            entities,
            pii: PiiDetector::new(),
            toxicity: ToxicityScorer::new(),
            re_script_block: regex::RegexBuilder::new(r"<script\b[^>]*>.*?</script\s*>")
                .case_insensitive(true)
                .dot_matches_new_line(true)
                .build()
                .expect("invalid code pattern"),
            re_script_tag: regex::RegexBuilder::new(r"</?script\b[^>]*>")
                .case_insensitive(true)
                .build()
                .expect("invalid code pattern"),
            re_scheme: regex::RegexBuilder::new(r"\bjavascript\s*:")
                .case_insensitive(true)
                .build()
                .expect("invalid code pattern"),
            re_event_handler: regex::RegexBuilder::new(
                r#"\bon(click|load|error|mouseover|focus|blur|submit|keydown|keyup|change)\s*=\s*("[^"]*"|'[^']*'|[^\s>]+)"#,
            )
            .case_insensitive(true)
            .build()
            .expect("invalid code pattern"),
            re_sql_tautology: regex::RegexBuilder::new(r"('\s*or\s*'?1'?\s*=\s*'?1|\bor\s+1\s*=\s*1\b)")
                .case_insensitive(true)
                .build()
                .expect("invalid code pattern"),
            re_dangerous_call: regex::RegexBuilder::new(
                r"\b(eval|exec|system|popen|os\.system|subprocess\.(call|run|Popen))\s*\(",
            )
            .case_insensitive(true)
            .build()
            .expect("invalid code pattern"),
        }
    }

    /// The entity redactor, for counter inspection.
    pub fn entities(&self) -> &EntityRedactor {
        &self.entities
    }

    /// Runs the moderation pipeline over `text`.
    pub fn moderate(&self, text: &str, context: &ModerationContext) -> ModerationResult {
        if text.is_empty() {
            return ModerationResult::clean(text);
        }

        let mut sanitized = text.to_string();
        let mut flags: Vec<ModerationFlag> = Vec::new();
        let mut pii: Vec<PiiDetection> = Vec::new();
        let mut blocked_entities: Vec<String> = Vec::new();
        let mut modifications = 0u32;

        // 1. Harmful content — flags only, never rewrites.
        if context.check_harmful {
            flags = guarded("harmful", Vec::new(), || self.check_harmful(text));
        }

        // 2. Disallowed entities — model output only.
        if context.check_entities && !context.is_user_input {
            let (rewritten, matched, count) = guarded(
                "entities",
                (sanitized.clone(), Vec::new(), 0),
                || {
                    let (rewritten, matched) = self.entities.redact(&sanitized);
                    let count = matched.len() as u32;
                    (rewritten, matched, count)
                },
            );
            sanitized = rewritten;
            blocked_entities = matched;
            modifications += count;
        }

        // 3. PII detection and redaction, highest offsets first.
        if context.check_pii {
            let threshold = context.pii_confidence_threshold;
            let (rewritten, detections, count) = guarded(
                "pii",
                (sanitized.clone(), Vec::new(), 0),
                || {
                    let detections = self.pii.detect(&sanitized);
                    if context.redact_pii && !detections.is_empty() {
                        let rewritten = self.pii.redact(&sanitized, &detections, threshold);
                        let count = detections
                            .iter()
                            .filter(|d| d.confidence >= threshold)
                            .count() as u32;
                        (rewritten, detections, count)
                    } else {
                        (sanitized.clone(), detections, 0)
                    }
                },
            );
            sanitized = rewritten;
            pii = detections;
            modifications += count;
        }

        // 4. Malicious code removal.
        if context.check_code {
            let (rewritten, count) = guarded("code", (sanitized.clone(), 0), || {
                self.remove_malicious_code(&sanitized)
            });
            sanitized = rewritten;
            modifications += count;
        }

        // 5. Profanity filtering.
        if context.check_profanity {
            let (rewritten, count) = guarded("profanity", (sanitized.clone(), 0), || {
                self.toxicity.filter_profanity(&sanitized)
            });
            sanitized = rewritten;
            modifications += count;
        }

        // 6. Toxicity, scored on the original text.
        let toxicity_score = guarded("toxicity", 0, || {
            self.toxicity.score(text, context.strict_mode)
        });

        // 7. Content safety score.
        let mut content_score = 100.0f32;
        for flag in &flags {
            content_score -= flag.severity.score_penalty();
        }
        content_score -= toxicity_score as f32 * 0.3;
        content_score -= 5.0 * pii.len() as f32;
        content_score -= (modifications as f32 * 2.0).min(20.0);
        let content_score = content_score.clamp(0.0, 100.0);

        // 8. Risk level.
        let risk_level = if flags.iter().any(|f| f.severity == Severity::Critical) {
            RiskLevel::Critical
        } else if flags.iter().any(|f| f.severity == Severity::High) || toxicity_score > 80 {
            RiskLevel::High
        } else {
            RiskLevel::from_score((100.0 - content_score).round() as u32)
        };

        let is_clean = flags.is_empty()
            && content_score >= context.min_safe_score
            && toxicity_score < context.toxicity_threshold;

        ModerationResult {
            is_clean,
            content_score,
            toxicity_score,
            risk_level,
            flags,
            pii,
            blocked_entities,
            sanitized_content: sanitized,
            modifications,
        }
    }

    fn check_harmful(&self, text: &str) -> Vec<ModerationFlag> {
        let mut flags = Vec::new();
        for pattern in &self.harmful {
            if let Some(m) = pattern.regex.find(text) {
                flags.push(ModerationFlag {
                    category: pattern.category,
                    severity: pattern.severity,
                    reason: pattern.reason.to_string(),
                    span: Some((m.start(), m.end())),
                });
            }
        }
        flags
    }

    fn remove_malicious_code(&self, text: &str) -> (String, u32) {
        let mut out = text.to_string();
        let mut count = 0u32;

        for regex in [
            &self.re_script_block,
            &self.re_script_tag,
            &self.re_scheme,
            &self.re_event_handler,
            &self.re_sql_tautology,
            &self.re_dangerous_call,
        ] {
            let matches = regex.find_iter(&out).count() as u32;
            if matches > 0 {
                count += matches;
                out = regex.replace_all(&out, CODE_PLACEHOLDER).into_owned();
            }
        }

        (out, count)
    }
}

impl Default for ContentModerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a sub-check, containing panics so one failing detector cannot stop
/// the pipeline.
fn guarded<T>(name: &str, fallback: T, f: impl FnOnce() -> T) -> T {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(check = name, "moderation sub-check panicked; using fallback");
            fallback
        }
    }
}

fn harmful_patterns() -> Vec<HarmfulPattern> {
    fn compile(source: &str) -> Regex {
        regex::RegexBuilder::new(source)
            .case_insensitive(true)
            .build()
            .expect("invalid harmful pattern")
    }

    vec![
        HarmfulPattern {
            category: HarmCategory::HateSpeech,
            severity: Severity::Critical,
            regex: compile(r"\b(racial|ethnic)\s+(cleansing|genocide)\b|\bmaster\s+race\b"),
            reason: "hate speech",
        },
        HarmfulPattern {
            category: HarmCategory::Violence,
            severity: Severity::High,
            regex: compile(r"\bhow\s+to\s+(kill|murder|maim)\b|\b(mass|school)\s+shooting\b"),
            reason: "violent content",
        },
        HarmfulPattern {
            category: HarmCategory::SelfHarm,
            severity: Severity::Critical,
            regex: compile(r"\b(suicide|self[- ]harm)\s+(methods|ways|tips|instructions)\b"),
            reason: "self-harm content",
        },
        HarmfulPattern {
            category: HarmCategory::Spam,
            severity: Severity::Low,
            regex: compile(r"\b(buy\s+now|click\s+here|limited\s+time\s+offer|act\s+now)\b"),
            reason: "spam framing",
        },
        HarmfulPattern {
            category: HarmCategory::IllegalActivity,
            severity: Severity::High,
            regex: compile(r"\bhow\s+to\s+(make|cook|synthesize)\s+(meth|cocaine|heroin)\b|\blaunder\s+money\b"),
            reason: "illegal activity",
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moderator() -> ContentModerator {
        ContentModerator::new()
    }

    fn context() -> ModerationContext {
        ModerationContext::default()
    }

    #[test]
    fn clean_output_is_clean() {
        let result = moderator().moderate("The capital of France is Paris.", &context());
        assert!(result.is_clean);
        assert_eq!(result.content_score, 100.0);
        assert_eq!(result.risk_level, RiskLevel::Safe);
        assert_eq!(result.sanitized_content, "The capital of France is Paris.");
    }

    #[test]
    fn empty_input_is_neutral() {
        let result = moderator().moderate("", &context());
        assert!(result.is_clean);
        assert_eq!(result.content_score, 100.0);
    }

    #[test]
    fn model_names_are_redacted_from_output() {
        let result = moderator().moderate("I am Claude 3.5, built by Anthropic", &context());
        assert!(!result.sanitized_content.contains("Claude"));
        assert!(!result.sanitized_content.contains("Anthropic"));
        assert!(!result.blocked_entities.is_empty());
    }

    #[test]
    fn entity_redaction_skips_user_input() {
        let result = moderator().moderate(
            "tell me about Claude",
            &ModerationContext::user_input(),
        );
        assert!(result.sanitized_content.contains("Claude"));
        assert!(result.blocked_entities.is_empty());
    }

    #[test]
    fn email_is_detected_and_redacted() {
        let result = moderator().moderate("reach me at test@example.com please", &context());
        assert!(result.has_pii());
        assert!(!result.sanitized_content.contains("test@example.com"));
        let email = result
            .pii
            .iter()
            .find(|d| d.pii_type == PiiType::Email)
            .unwrap();
        assert!(email.confidence >= 0.9);
    }

    #[test]
    fn pii_detection_without_redaction_reports_only() {
        let ctx = ModerationContext {
            redact_pii: false,
            ..context()
        };
        let result = moderator().moderate("reach me at test@example.com", &ctx);
        assert!(result.has_pii());
        assert!(result.sanitized_content.contains("test@example.com"));
    }

    #[test]
    fn script_block_is_removed() {
        let result = moderator().moderate("look <script>alert(1)</script> here", &context());
        assert!(!result.sanitized_content.contains("<script"));
        assert!(result.sanitized_content.contains(CODE_PLACEHOLDER));
        assert!(result.modifications >= 1);
    }

    #[test]
    fn sql_tautology_is_removed() {
        let result = moderator().moderate("try ' OR '1'='1 to log in", &context());
        assert!(result.sanitized_content.contains(CODE_PLACEHOLDER));
    }

    #[test]
    fn dangerous_calls_are_removed() {
        let result = moderator().moderate("just run eval(payload) in the console", &context());
        assert!(!result.sanitized_content.contains("eval("));
    }

    #[test]
    fn harmful_content_flags_without_rewriting() {
        let result = moderator().moderate("a guide on how to kill someone", &context());
        assert!(!result.is_clean);
        assert!(result
            .flags
            .iter()
            .any(|f| f.category == HarmCategory::Violence));
        // The text itself is not rewritten by the harmful check.
        assert!(result.sanitized_content.contains("how to kill"));
    }

    #[test]
    fn critical_flag_forces_critical_risk() {
        let result = moderator().moderate("they deserve ethnic cleansing", &context());
        assert_eq!(result.risk_level, RiskLevel::Critical);
        assert!(!result.is_clean);
    }

    #[test]
    fn toxicity_lowers_content_score() {
        let clean = moderator().moderate("have a great day", &context());
        let toxic = moderator().moderate("you damn stupid worthless fool", &context());
        assert!(toxic.toxicity_score > 0);
        assert!(toxic.content_score < clean.content_score);
    }

    #[test]
    fn profanity_is_censored() {
        let result = moderator().moderate("that damn printer again", &context());
        assert!(!result.sanitized_content.contains("damn"));
        assert!(result.sanitized_content.contains("[CENSORED]"));
    }

    #[test]
    fn toggles_disable_individual_checks() {
        let ctx = ModerationContext {
            check_pii: false,
            check_code: false,
            check_profanity: false,
            check_entities: false,
            check_harmful: false,
            ..context()
        };
        let hostile = "damn <script>x</script> test@example.com Claude how to kill someone";
        let result = moderator().moderate(hostile, &ctx);
        assert_eq!(result.sanitized_content, hostile);
        assert!(result.flags.is_empty());
        assert!(result.pii.is_empty());
    }

    #[test]
    fn content_score_formula_applies_penalties() {
        // One low-severity spam flag: 100 - 5 = 95, minus nothing else.
        let result = moderator().moderate("buy now while stocks last", &context());
        assert!(result.flags.iter().any(|f| f.category == HarmCategory::Spam));
        assert_eq!(result.content_score, 95.0);
        assert!(!result.is_clean); // flags present
    }

    #[test]
    fn spam_risk_is_score_banded() {
        let result = moderator().moderate("buy now while stocks last", &context());
        // 100 - 95 = 5 risk points: Safe band despite the flag.
        assert_eq!(result.risk_level, RiskLevel::Safe);
    }
}
