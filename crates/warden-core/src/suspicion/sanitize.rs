//! Input sanitization pipeline.
//!
//! An ordered sequence of stages, each conditionally enabled and each
//! idempotent: sanitizing already-sanitized output of the same configuration
//! records no further modifications. Suspicious constructs are replaced with
//! typed placeholder tokens, never silently dropped.

use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::{is_nfc, UnicodeNormalization};

use crate::types::RiskLevel;

/// Placeholder substituted for a stripped script block.
const SCRIPT_PLACEHOLDER: &str = "[SCRIPT-REMOVED]";
/// Placeholder substituted for a neutralized SQL fragment.
const SQL_PLACEHOLDER: &str = "[SQL]";
/// Placeholder substituted for a redacted URL.
const URL_PLACEHOLDER: &str = "[URL]";

/// Entities that the pipeline's own HTML escaping produces. Runs made up
/// solely of these are not encoding-bypass attempts and must not re-trigger
/// the encoding stage on a second pass.
const BENIGN_ENTITIES: &[&str] = &[
    "&lt;", "&gt;", "&amp;", "&quot;", "&#39;", "&#x27;", "&nbsp;",
];

/// A caller- or host-registered rewrite rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomRule {
    /// Rule name, surfaced in warnings.
    pub name: String,
    /// Regular expression to match.
    pub pattern: String,
    /// Replacement text.
    pub replacement: String,
    /// Rules apply highest priority first.
    pub priority: i32,
}

/// Which stages run, plus stage parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanitizeOptions {
    /// Trim surrounding whitespace.
    pub trim: bool,
    /// Strip zero-width, bidi-control, and variation-selector code points.
    pub strip_invisible: bool,
    /// Replace encoding-bypass runs with typed placeholders.
    pub neutralize_encoding: bool,
    /// Apply caller-supplied and registered custom rules.
    pub apply_custom_rules: bool,
    /// Neutralize injection markers (script blocks, schemes, handlers, SQL).
    pub neutralize_injection: bool,
    /// Collapse whitespace runs and cap blank lines.
    pub normalize_whitespace: bool,
    /// Apply Unicode canonical composition (NFC).
    pub normalize_unicode: bool,
    /// Replace bare URLs with a placeholder.
    pub redact_urls: bool,
    /// Hard cap on output length in characters.
    pub max_length: Option<usize>,
    /// Strict mode also strips shell metacharacters.
    pub strict: bool,
    /// Caller-supplied rules, applied before registered rules.
    pub custom_rules: Vec<CustomRule>,
}

impl Default for SanitizeOptions {
    fn default() -> Self {
        Self {
            trim: true,
            strip_invisible: true,
            neutralize_encoding: true,
            apply_custom_rules: true,
            neutralize_injection: true,
            normalize_whitespace: true,
            normalize_unicode: true,
            redact_urls: false,
            max_length: Some(8192),
            strict: false,
            custom_rules: Vec::new(),
        }
    }
}

impl SanitizeOptions {
    /// Strict preset: everything on, URLs redacted, shell metacharacters
    /// stripped.
    pub fn strict() -> Self {
        Self {
            redact_urls: true,
            strict: true,
            ..Self::default()
        }
    }
}

/// What a pipeline stage did to the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModificationKind {
    /// Surrounding whitespace removed.
    Trimmed,
    /// Invisible code points removed.
    InvisibleStripped,
    /// Encoding-bypass run replaced with a placeholder.
    EncodingNeutralized,
    /// A custom rule rewrote the text.
    CustomRule,
    /// Injection markers neutralized.
    InjectionNeutralized,
    /// Whitespace runs collapsed.
    WhitespaceNormalized,
    /// Text recomposed to NFC.
    UnicodeNormalized,
    /// URLs replaced with a placeholder.
    UrlRedacted,
    /// Text truncated to the maximum length.
    Truncated,
}

/// Record of one stage's change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modification {
    /// Which stage changed the text.
    pub kind: ModificationKind,
    /// Character count before the stage.
    pub before_len: usize,
    /// Character count after the stage.
    pub after_len: usize,
    /// Stage confidence that the change was warranted (0.0–1.0).
    pub confidence: f32,
}

/// Output of the sanitization pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanitizationResult {
    /// The cleaned text.
    pub sanitized: String,
    /// One record per stage that changed the text.
    pub modifications: Vec<Modification>,
    /// Human-readable notes about what was neutralized.
    pub warnings: Vec<String>,
    /// 0–100 confidence that the output is faithful to the input's intent.
    pub confidence_score: f32,
    /// Risk bucket derived from what the pipeline found.
    pub risk_level: RiskLevel,
    /// Byte length of the sanitized text.
    pub byte_len: usize,
    /// Character count of the sanitized text.
    pub char_count: usize,
    /// Whether the encoding stage neutralized anything.
    pub encoding_detected: bool,
    /// Whether the injection stage neutralized anything.
    pub injection_detected: bool,
    /// Exact number of characters removed by truncation.
    pub truncated_chars: usize,
}

impl SanitizationResult {
    /// Returns true if no stage changed the text.
    pub fn is_unchanged(&self) -> bool {
        self.modifications.is_empty()
    }
}

struct CompiledRule {
    rule: CustomRule,
    regex: Regex,
}

/// The sanitization pipeline with precompiled stage patterns.
pub struct Sanitizer {
    registered_rules: Vec<CompiledRule>,
    re_base64: Regex,
    re_hex_run: Regex,
    re_unicode_run: Regex,
    re_urlenc_run: Regex,
    re_entity_run: Regex,
    re_entity: Regex,
    re_entity_prefix: Regex,
    re_octal_run: Regex,
    re_script_block: Regex,
    re_script_open: Regex,
    re_scheme: Regex,
    re_event_handler: Regex,
    re_sql: Regex,
    re_url: Regex,
    re_space_run: Regex,
    re_blank_lines: Regex,
}

impl Sanitizer {
    /// Creates a sanitizer with no registered rules.
    pub fn new() -> Self {
        Self {
            registered_rules: Vec::new(),
            re_base64: Regex::new(r"[A-Za-z0-9+/]{24,}={0,2}").expect("invalid stage pattern"),
            re_hex_run: Regex::new(r"(?:\\x[0-9A-Fa-f]{2}){3,}").expect("invalid stage pattern"),
            re_unicode_run: Regex::new(r"(?:\\u\{?[0-9A-Fa-f]{4}\}?){3,}")
                .expect("invalid stage pattern"),
            re_urlenc_run: Regex::new(r"(?:%[0-9A-Fa-f]{2}){3,}").expect("invalid stage pattern"),
            re_entity_run: Regex::new(r"(?:&#?[A-Za-z0-9]{1,8};){3,}")
                .expect("invalid stage pattern"),
            re_entity: Regex::new(r"&#?[A-Za-z0-9]{1,8};").expect("invalid stage pattern"),
            re_entity_prefix: Regex::new(r"^&(#[0-9]{1,7}|#x[0-9A-Fa-f]{1,6}|[A-Za-z]{2,8});")
                .expect("invalid stage pattern"),
            re_octal_run: Regex::new(r"(?:\\[0-7]{3}){3,}").expect("invalid stage pattern"),
            re_script_block: regex::RegexBuilder::new(r"<script\b[^>]*>.*?</script\s*>")
                .case_insensitive(true)
                .dot_matches_new_line(true)
                .build()
                .expect("invalid stage pattern"),
            re_script_open: regex::RegexBuilder::new(r"</?script\b[^>]*>")
                .case_insensitive(true)
                .build()
                .expect("invalid stage pattern"),
            re_scheme: regex::RegexBuilder::new(r"\b(javascript|vbscript|data)\s*:")
                .case_insensitive(true)
                .build()
                .expect("invalid stage pattern"),
            re_event_handler: regex::RegexBuilder::new(
                r#"\bon(click|load|error|mouseover|mouseout|focus|blur|submit|keydown|keyup|keypress|change|input|dblclick)\s*=\s*("[^"]*"|'[^']*'|[^\s>]+)"#,
            )
            .case_insensitive(true)
            .build()
            .expect("invalid stage pattern"),
            re_sql: regex::RegexBuilder::new(
                r"\b(union\s+(all\s+)?select|insert\s+into|delete\s+from|drop\s+(table|database)|truncate\s+table)\b",
            )
            .case_insensitive(true)
            .build()
            .expect("invalid stage pattern"),
            re_url: regex::RegexBuilder::new(r#"\bhttps?://[^\s<>"']+"#)
                .case_insensitive(true)
                .build()
                .expect("invalid stage pattern"),
            re_space_run: Regex::new(r"[ \t]{2,}").expect("invalid stage pattern"),
            re_blank_lines: Regex::new(r"\n{3,}").expect("invalid stage pattern"),
        }
    }

    /// Registers a host-level rule applied after caller-supplied rules.
    /// Invalid patterns are refused here so sanitize itself cannot fail.
    pub fn register_rule(&mut self, rule: CustomRule) -> Result<(), regex::Error> {
        let regex = Regex::new(&rule.pattern)?;
        self.registered_rules.push(CompiledRule { rule, regex });
        self.registered_rules
            .sort_by(|a, b| b.rule.priority.cmp(&a.rule.priority));
        Ok(())
    }

    /// Runs the pipeline over `text`.
    pub fn sanitize(&self, text: &str, options: &SanitizeOptions) -> SanitizationResult {
        let mut current = text.to_string();
        let mut modifications = Vec::new();
        let mut warnings: Vec<String> = Vec::new();
        let mut encoding_detected = false;
        let mut injection_detected = false;
        let mut truncated_chars = 0usize;

        // Stage 1: trim.
        if options.trim {
            let trimmed = current.trim();
            if trimmed.len() != current.len() {
                record(&mut modifications, ModificationKind::Trimmed, &current, trimmed, 1.0);
                current = trimmed.to_string();
            }
        }

        // Stage 2: invisible code points.
        if options.strip_invisible {
            let stripped: String = current.chars().filter(|c| !is_invisible(*c)).collect();
            if stripped != current {
                record(
                    &mut modifications,
                    ModificationKind::InvisibleStripped,
                    &current,
                    &stripped,
                    0.7,
                );
                warnings.push("hidden characters removed".to_string());
                current = stripped;
            }
        }

        // Stage 3: encoding-bypass runs.
        if options.neutralize_encoding {
            let (neutralized, kinds) = self.neutralize_encoding(&current);
            if neutralized != current {
                record(
                    &mut modifications,
                    ModificationKind::EncodingNeutralized,
                    &current,
                    &neutralized,
                    0.6,
                );
                for kind in kinds {
                    warnings.push(format!("encoded payload neutralized: {kind}"));
                }
                encoding_detected = true;
                current = neutralized;
            }
        }

        // Stage 4: custom rules, caller-supplied first, highest priority
        // first within each set.
        if options.apply_custom_rules {
            let rewritten = self.apply_custom_rules(&current, &options.custom_rules, &mut warnings);
            if rewritten != current {
                record(
                    &mut modifications,
                    ModificationKind::CustomRule,
                    &current,
                    &rewritten,
                    0.8,
                );
                current = rewritten;
            }
        }

        // Stage 5: injection markers.
        if options.neutralize_injection {
            let neutralized = self.neutralize_injection(&current, options.strict);
            if neutralized != current {
                record(
                    &mut modifications,
                    ModificationKind::InjectionNeutralized,
                    &current,
                    &neutralized,
                    0.5,
                );
                injection_detected = true;
                current = neutralized;
            }
        }

        // Stage 6: whitespace.
        if options.normalize_whitespace {
            let normalized = self.normalize_whitespace(&current);
            if normalized != current {
                record(
                    &mut modifications,
                    ModificationKind::WhitespaceNormalized,
                    &current,
                    &normalized,
                    0.95,
                );
                current = normalized;
            }
        }

        // Stage 7: canonical composition.
        if options.normalize_unicode && !is_nfc(&current) {
            let composed: String = current.nfc().collect();
            if composed != current {
                record(
                    &mut modifications,
                    ModificationKind::UnicodeNormalized,
                    &current,
                    &composed,
                    0.9,
                );
                current = composed;
            }
        }

        // Stage 8: URLs.
        if options.redact_urls {
            let redacted = self.re_url.replace_all(&current, URL_PLACEHOLDER);
            if redacted != current {
                let redacted = redacted.into_owned();
                record(
                    &mut modifications,
                    ModificationKind::UrlRedacted,
                    &current,
                    &redacted,
                    0.85,
                );
                current = redacted;
            }
        }

        // Stage 9: length cap.
        if let Some(max) = options.max_length {
            let total = current.chars().count();
            if total > max {
                let kept: String = current.chars().take(max).collect();
                let kept = kept.trim_end().to_string();
                truncated_chars = total - kept.chars().count();
                record(
                    &mut modifications,
                    ModificationKind::Truncated,
                    &current,
                    &kept,
                    0.9,
                );
                warnings.push(format!("input truncated by {truncated_chars} characters"));
                current = kept;
            }
        }

        // Stage 10: metadata.
        let mut confidence: f32 = 100.0;
        for m in &modifications {
            confidence -= (1.0 - m.confidence) * 10.0;
        }
        confidence -= 5.0 * warnings.len() as f32;
        let confidence_score = confidence.max(0.0);

        let mut risk_points = 0u32;
        if encoding_detected {
            risk_points += 25;
        }
        if injection_detected {
            risk_points += 35;
        }
        risk_points += (modifications.len() as u32 * 5).min(20);

        SanitizationResult {
            byte_len: current.len(),
            char_count: current.chars().count(),
            sanitized: current,
            modifications,
            warnings,
            confidence_score,
            risk_level: RiskLevel::from_score(risk_points),
            encoding_detected,
            injection_detected,
            truncated_chars,
        }
    }

    fn neutralize_encoding(&self, text: &str) -> (String, Vec<&'static str>) {
        let mut kinds = Vec::new();
        let mut out = text.to_string();

        let replaced = self.re_base64.replace_all(&out, "[ENCODED:BASE64]");
        if replaced != out {
            kinds.push("base64");
            out = replaced.into_owned();
        }
        let replaced = self.re_hex_run.replace_all(&out, "[ENCODED:HEX]");
        if replaced != out {
            kinds.push("hex");
            out = replaced.into_owned();
        }
        let replaced = self.re_unicode_run.replace_all(&out, "[ENCODED:UNICODE]");
        if replaced != out {
            kinds.push("unicode-escape");
            out = replaced.into_owned();
        }
        let replaced = self.re_urlenc_run.replace_all(&out, "[ENCODED:URL]");
        if replaced != out {
            kinds.push("url-encoding");
            out = replaced.into_owned();
        }
        let replaced = self.re_octal_run.replace_all(&out, "[ENCODED:OCTAL]");
        if replaced != out {
            kinds.push("octal");
            out = replaced.into_owned();
        }

        // Entity runs: runs made up solely of the escapes this pipeline
        // itself produces are left alone, otherwise a second pass would
        // re-flag its own output.
        let mut entity_hit = false;
        let rewritten = self
            .re_entity_run
            .replace_all(&out, |caps: &regex::Captures<'_>| {
                let run = &caps[0];
                let all_benign = self
                    .re_entity
                    .find_iter(run)
                    .all(|m| BENIGN_ENTITIES.contains(&m.as_str()));
                if all_benign {
                    run.to_string()
                } else {
                    entity_hit = true;
                    "[ENCODED:ENTITY]".to_string()
                }
            });
        if entity_hit {
            kinds.push("html-entity");
            out = rewritten.into_owned();
        }

        (out, kinds)
    }

    fn apply_custom_rules(
        &self,
        text: &str,
        caller_rules: &[CustomRule],
        warnings: &mut Vec<String>,
    ) -> String {
        let mut out = text.to_string();

        let mut supplied: Vec<&CustomRule> = caller_rules.iter().collect();
        supplied.sort_by(|a, b| b.priority.cmp(&a.priority));
        for rule in supplied {
            match Regex::new(&rule.pattern) {
                Ok(regex) => {
                    let replaced = regex.replace_all(&out, rule.replacement.as_str());
                    if replaced != out {
                        out = replaced.into_owned();
                    }
                }
                Err(e) => {
                    warnings.push(format!("custom rule '{}' skipped: {e}", rule.name));
                }
            }
        }

        for compiled in &self.registered_rules {
            let replaced = compiled
                .regex
                .replace_all(&out, compiled.rule.replacement.as_str());
            if replaced != out {
                out = replaced.into_owned();
            }
        }

        out
    }

    fn neutralize_injection(&self, text: &str, strict: bool) -> String {
        let mut out = self
            .re_script_block
            .replace_all(text, SCRIPT_PLACEHOLDER)
            .into_owned();
        out = self
            .re_script_open
            .replace_all(&out, SCRIPT_PLACEHOLDER)
            .into_owned();
        out = self
            .re_scheme
            .replace_all(&out, "${1}[BLOCKED]")
            .into_owned();
        out = self.re_event_handler.replace_all(&out, "").into_owned();
        out = self.re_sql.replace_all(&out, SQL_PLACEHOLDER).into_owned();

        if strict {
            out = strip_shell_metachars(&out);
        }

        escape_html_idempotent(&out, &self.re_entity_prefix)
    }

    fn normalize_whitespace(&self, text: &str) -> String {
        let collapsed = self.re_space_run.replace_all(text, " ");
        self.re_blank_lines.replace_all(&collapsed, "\n\n").into_owned()
    }
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new()
    }
}

fn record(
    modifications: &mut Vec<Modification>,
    kind: ModificationKind,
    before: &str,
    after: &str,
    confidence: f32,
) {
    modifications.push(Modification {
        kind,
        before_len: before.chars().count(),
        after_len: after.chars().count(),
        confidence,
    });
}

/// Zero-width, bidi-control, and variation-selector code points that can
/// hide or reorder content.
fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{00AD}'
            | '\u{061C}'
            | '\u{200B}'..='\u{200F}'
            | '\u{202A}'..='\u{202E}'
            | '\u{2060}'..='\u{2064}'
            | '\u{2066}'..='\u{2069}'
            | '\u{FE00}'..='\u{FE0F}'
            | '\u{FEFF}'
    ) || ('\u{E0100}'..='\u{E01EF}').contains(&c)
}

/// Removes shell command-chaining and substitution characters. A `;` that
/// terminates an HTML entity is kept — the escaping stage below produces
/// those, and stripping them on a later pass would undo the escape.
fn strip_shell_metachars(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut result = String::with_capacity(text.len());
    for (i, &c) in chars.iter().enumerate() {
        match c {
            '`' | '$' | '|' | '\\' => {}
            ';' => {
                if closes_entity(&chars, i) {
                    result.push(c);
                }
            }
            _ => result.push(c),
        }
    }
    result
}

fn closes_entity(chars: &[char], i: usize) -> bool {
    let start = i.saturating_sub(9);
    for j in (start..i).rev() {
        match chars[j] {
            '&' => return i - j >= 2,
            c if c.is_ascii_alphanumeric() || c == '#' => {}
            _ => return false,
        }
    }
    false
}

/// Escapes `<`, `>`, and bare `&` while leaving existing entities intact,
/// so a second pass finds nothing left to escape.
fn escape_html_idempotent(text: &str, entity_prefix: &Regex) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, c) in text.char_indices() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => {
                if entity_prefix.is_match(&text[i..]) {
                    out.push('&');
                } else {
                    out.push_str("&amp;");
                }
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sanitizer() -> Sanitizer {
        Sanitizer::new()
    }

    fn defaults() -> SanitizeOptions {
        SanitizeOptions::default()
    }

    #[test]
    fn clean_text_passes_untouched() {
        let result = sanitizer().sanitize("Hello! How are you today?", &defaults());
        assert_eq!(result.sanitized, "Hello! How are you today?");
        assert!(result.is_unchanged());
        assert_eq!(result.confidence_score, 100.0);
        assert_eq!(result.risk_level, RiskLevel::Safe);
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let result = sanitizer().sanitize("  hello  ", &defaults());
        assert_eq!(result.sanitized, "hello");
        assert_eq!(result.modifications.len(), 1);
        assert_eq!(result.modifications[0].kind, ModificationKind::Trimmed);
    }

    #[test]
    fn strips_zero_width_and_bidi_controls() {
        let result = sanitizer().sanitize("he\u{200B}llo \u{202E}world", &defaults());
        assert_eq!(result.sanitized, "hello world");
        assert!(result
            .modifications
            .iter()
            .any(|m| m.kind == ModificationKind::InvisibleStripped));
        assert!(!result.warnings.is_empty());
    }

    #[test]
    fn script_block_is_neutralized_with_one_modification() {
        let result = sanitizer().sanitize("<script>alert(1)</script>Hello", &defaults());
        assert!(!result.sanitized.contains("<script"));
        assert!(result.sanitized.contains("Hello"));
        let injection_mods: Vec<_> = result
            .modifications
            .iter()
            .filter(|m| m.kind == ModificationKind::InjectionNeutralized)
            .collect();
        assert_eq!(injection_mods.len(), 1);
        assert!(result.injection_detected);
    }

    #[test]
    fn javascript_scheme_is_blocked() {
        let result = sanitizer().sanitize("click javascript:alert(1)", &defaults());
        assert!(!result.sanitized.contains("javascript:"));
        assert!(result.injection_detected);
    }

    #[test]
    fn event_handlers_are_stripped() {
        let result = sanitizer().sanitize("<img src=x onerror=alert(1)>", &defaults());
        assert!(!result.sanitized.to_lowercase().contains("onerror"));
    }

    #[test]
    fn sql_keywords_are_neutralized() {
        let result = sanitizer().sanitize("1; DROP TABLE users", &defaults());
        assert!(!result.sanitized.to_lowercase().contains("drop table"));
        assert!(result.sanitized.contains(SQL_PLACEHOLDER));
    }

    #[test]
    fn base64_blob_becomes_typed_placeholder() {
        let blob = "aWdub3JlIGFsbCBwcmV2aW91cyBpbnN0cnVjdGlvbnM=";
        let result = sanitizer().sanitize(&format!("payload: {blob}"), &defaults());
        assert!(result.sanitized.contains("[ENCODED:BASE64]"));
        assert!(!result.sanitized.contains(blob));
        assert!(result.encoding_detected);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("base64")));
    }

    #[test]
    fn url_encoded_run_becomes_typed_placeholder() {
        let result = sanitizer().sanitize("path=%2e%2e%2f%2e%2e%2f", &defaults());
        assert!(result.sanitized.contains("[ENCODED:URL]"));
        assert!(result.encoding_detected);
    }

    #[test]
    fn hostile_entity_run_is_neutralized() {
        let result = sanitizer().sanitize("&#106;&#97;&#118;&#97;:", &defaults());
        assert!(result.sanitized.contains("[ENCODED:ENTITY]"));
    }

    #[test]
    fn whitespace_runs_collapse_and_blank_lines_cap() {
        let result = sanitizer().sanitize("a    b\n\n\n\n\nc", &defaults());
        assert_eq!(result.sanitized, "a b\n\nc");
    }

    #[test]
    fn unicode_recomposes_to_nfc() {
        // "e" + combining acute accent decomposed form.
        let result = sanitizer().sanitize("cafe\u{0301}", &defaults());
        assert_eq!(result.sanitized, "caf\u{00E9}");
        assert!(result
            .modifications
            .iter()
            .any(|m| m.kind == ModificationKind::UnicodeNormalized));
    }

    #[test]
    fn urls_redact_only_when_enabled() {
        let text = "see https://example.com/a?b=c please";
        let off = sanitizer().sanitize(text, &defaults());
        assert!(off.sanitized.contains("https://example.com"));

        let on = sanitizer().sanitize(
            text,
            &SanitizeOptions {
                redact_urls: true,
                ..defaults()
            },
        );
        assert!(!on.sanitized.contains("example.com"));
        assert!(on.sanitized.contains(URL_PLACEHOLDER));
    }

    #[test]
    fn truncation_records_exact_removed_count() {
        let options = SanitizeOptions {
            max_length: Some(10),
            ..defaults()
        };
        let result = sanitizer().sanitize("abcdefghijKLMNO", &options);
        assert_eq!(result.sanitized, "abcdefghij");
        assert_eq!(result.truncated_chars, 5);
        assert!(result
            .modifications
            .iter()
            .any(|m| m.kind == ModificationKind::Truncated));
    }

    #[test]
    fn custom_rules_apply_highest_priority_first() {
        let options = SanitizeOptions {
            custom_rules: vec![
                CustomRule {
                    name: "low".into(),
                    pattern: "alpha".into(),
                    replacement: "beta".into(),
                    priority: 1,
                },
                CustomRule {
                    name: "high".into(),
                    pattern: "alpha".into(),
                    replacement: "gamma".into(),
                    priority: 10,
                },
            ],
            ..defaults()
        };
        let result = sanitizer().sanitize("alpha", &options);
        assert_eq!(result.sanitized, "gamma");
    }

    #[test]
    fn invalid_custom_rule_is_skipped_with_warning() {
        let options = SanitizeOptions {
            custom_rules: vec![CustomRule {
                name: "broken".into(),
                pattern: "(unclosed".into(),
                replacement: "x".into(),
                priority: 0,
            }],
            ..defaults()
        };
        let result = sanitizer().sanitize("hello", &options);
        assert_eq!(result.sanitized, "hello");
        assert!(result.warnings.iter().any(|w| w.contains("broken")));
    }

    #[test]
    fn registered_rules_run_after_caller_rules() {
        let mut s = Sanitizer::new();
        s.register_rule(CustomRule {
            name: "host".into(),
            pattern: "beta".into(),
            replacement: "gamma".into(),
            priority: 0,
        })
        .unwrap();
        let options = SanitizeOptions {
            custom_rules: vec![CustomRule {
                name: "caller".into(),
                pattern: "alpha".into(),
                replacement: "beta".into(),
                priority: 0,
            }],
            ..defaults()
        };
        let result = s.sanitize("alpha", &options);
        assert_eq!(result.sanitized, "gamma");
    }

    #[test]
    fn strict_mode_strips_shell_metacharacters() {
        let result = sanitizer().sanitize("run `rm -rf` $HOME; echo done", &SanitizeOptions::strict());
        assert!(!result.sanitized.contains('`'));
        assert!(!result.sanitized.contains('$'));
        assert!(!result.sanitized.contains(';'));
    }

    #[test]
    fn remaining_angle_brackets_are_escaped() {
        let result = sanitizer().sanitize("<b>bold</b>", &defaults());
        assert!(!result.sanitized.contains('<'));
        assert!(result.sanitized.contains("&lt;b&gt;"));
    }

    #[test]
    fn confidence_drops_with_modifications_and_warnings() {
        let result = sanitizer().sanitize("<script>x</script>  hi  ", &defaults());
        assert!(result.confidence_score < 100.0);
        assert!(result.confidence_score >= 0.0);
    }

    #[test]
    fn risk_level_reflects_injection_and_encoding() {
        let clean = sanitizer().sanitize("hello", &defaults());
        assert_eq!(clean.risk_level, RiskLevel::Safe);

        let hostile = sanitizer().sanitize(
            "<script>x</script> aWdub3JlIGFsbCBwcmV2aW91cyBpbnN0cnVjdGlvbnM=",
            &defaults(),
        );
        assert!(hostile.risk_level >= RiskLevel::Medium);
    }

    // Sanitize must be idempotent per configuration: a second pass over its
    // own output records zero modifications.

    #[test]
    fn second_pass_is_clean_for_default_options() {
        let cases = [
            "  hello  ",
            "<script>alert(1)</script>Hello",
            "he\u{200B}llo",
            "a    b\n\n\n\nc",
            "click javascript:alert(1) and &#106;&#97;&#118;&#97;&#115; now",
            "payload aWdub3JlIGFsbCBwcmV2aW91cyBpbnN0cnVjdGlvbnM= end",
            "<b>bold</b> & <<< done",
            "cafe\u{0301}",
        ];
        let s = sanitizer();
        let options = defaults();
        for case in cases {
            let first = s.sanitize(case, &options);
            let second = s.sanitize(&first.sanitized, &options);
            assert!(
                second.modifications.is_empty(),
                "second pass modified {case:?}: {:?} -> {:?}",
                first.sanitized,
                second.sanitized
            );
        }
    }

    #[test]
    fn second_pass_is_clean_for_strict_options() {
        let s = sanitizer();
        let options = SanitizeOptions::strict();
        let cases = [
            "run `rm` $x; see https://example.com <script>a</script>",
            "a && b || c",
        ];
        for case in cases {
            let first = s.sanitize(case, &options);
            let second = s.sanitize(&first.sanitized, &options);
            assert!(
                second.modifications.is_empty(),
                "second pass modified {case:?}: {:?} -> {:?}",
                first.sanitized,
                second.sanitized
            );
        }
    }
}
