//! The five suspicion heuristics.
//!
//! Each layer scores the *original* text independently; the analyzer sums
//! the layer scores. Thresholds here are tuned defaults carried over from
//! the source system, not derived constants.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::suspicion::lexicon::{
    self, BYPASS_KEYWORDS, COMMAND_VERBS, CONTRADICTION_PAIRS, EXTRACTION_KEYWORDS,
    MANIPULATION_KEYWORDS, QUESTION_WORDS, RESET_PHRASES, TOPIC_VOCABULARY, URGENCY_MARKERS,
};

/// Tunable knobs for the suspicion layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspicionConfig {
    /// Aggregate score at or above which input is suspicious.
    pub suspicious_threshold: u32,
    /// Occurrences before a semantic keyword family counts at all.
    pub family_threshold: usize,
    /// Base score once a family crosses its threshold.
    pub family_base: u32,
    /// Additional score per occurrence in a counted family.
    pub family_increment: u32,
    /// Special-character ratio above which the lexical layer flags.
    pub special_char_ratio: f32,
    /// Character length above which the behavioral layer flags raw size.
    pub long_input_chars: usize,
    /// Character length below which contextual short-input checks apply.
    pub short_input_chars: usize,
    /// Capacity of the suspicion result cache.
    pub cache_capacity: usize,
    /// TTL of the suspicion result cache, in seconds.
    pub cache_ttl_secs: u64,
}

impl Default for SuspicionConfig {
    fn default() -> Self {
        Self {
            suspicious_threshold: 30,
            family_threshold: 2,
            family_base: 15,
            family_increment: 5,
            special_char_ratio: 0.3,
            long_input_chars: 2000,
            short_input_chars: 200,
            cache_capacity: 512,
            cache_ttl_secs: 60,
        }
    }
}

/// One layer's verdict.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LayerResult {
    /// Whether the layer found anything.
    pub detected: bool,
    /// The layer's score contribution.
    pub score: u32,
    /// What it found, in evaluation order.
    pub reasons: Vec<String>,
    /// Layer confidence in its own finding (0.0–1.0).
    pub confidence: f32,
}

impl LayerResult {
    fn from_findings(score: u32, reasons: Vec<String>) -> Self {
        let detected = score > 0;
        let confidence = if detected {
            (0.5 + 0.1 * reasons.len() as f32).min(0.95)
        } else {
            1.0
        };
        Self {
            detected,
            score,
            reasons,
            confidence,
        }
    }
}

/// Precompiled patterns shared by the layers.
pub(crate) struct LayerEngine {
    re_script: Regex,
    re_sql: Regex,
    re_xss: Regex,
    re_base64: Regex,
    re_escape: Regex,
    re_multi_step: Regex,
    re_numbered: Regex,
    re_word: Regex,
}

impl LayerEngine {
    pub(crate) fn new() -> Self {
        Self {
            re_script: compile(r"<script\b"),
            re_sql: compile(r"\b(union\s+select|or\s+1\s*=\s*1|drop\s+table)\b"),
            re_xss: compile(r"(javascript\s*:|\bon(error|load|click)\s*=)"),
            re_base64: Regex::new(r"[A-Za-z0-9+/]{24,}={0,2}").expect("invalid layer pattern"),
            re_escape: compile(r"(%[0-9a-f]{2}|\\x[0-9a-f]{2}|&#x?[0-9a-f]{1,6};|\\u[0-9a-f]{4})"),
            re_multi_step: compile(r"\bstep\s+\d+\b"),
            re_numbered: Regex::new(r"(?m)^\s*\d+[.)]").expect("invalid layer pattern"),
            re_word: Regex::new(r"[A-Za-z']+").expect("invalid layer pattern"),
        }
    }

    /// Lexical pattern layer: hard-coded high-signal markers.
    pub(crate) fn lexical(&self, text: &str, config: &SuspicionConfig) -> LayerResult {
        let mut score = 0;
        let mut reasons = Vec::new();
        let lower = text.to_lowercase();

        if self.re_script.is_match(&lower) {
            score += 25;
            reasons.push("script tag".to_string());
        }
        if self.re_sql.is_match(&lower) {
            score += 20;
            reasons.push("sql fragment".to_string());
        }
        if self.re_xss.is_match(&lower) {
            score += 20;
            reasons.push("xss fragment".to_string());
        }
        if self.re_base64.is_match(text) {
            score += 15;
            reasons.push("base64 blob".to_string());
        }
        if text.chars().any(is_hidden) {
            score += 20;
            reasons.push("hidden characters".to_string());
        }

        let char_count = text.chars().count();
        if char_count >= 20 {
            let escapes: usize = self.re_escape.find_iter(&lower).map(|m| m.len()).sum();
            if escapes as f32 / char_count as f32 > 0.1 {
                score += 15;
                reasons.push("excessive encoding density".to_string());
            }

            let special = text
                .chars()
                .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
                .count();
            if special as f32 / char_count as f32 > config.special_char_ratio {
                score += 10;
                reasons.push("special character ratio".to_string());
            }
        }

        LayerResult::from_findings(score, reasons)
    }

    /// Semantic-intent layer: keyword families on leet-normalized text.
    pub(crate) fn semantic(&self, text: &str, config: &SuspicionConfig) -> LayerResult {
        let normalized = lexicon::normalize_leet(text);
        let mut score = 0;
        let mut reasons = Vec::new();

        for (family, keywords) in [
            ("manipulation", MANIPULATION_KEYWORDS),
            ("extraction", EXTRACTION_KEYWORDS),
            ("bypass", BYPASS_KEYWORDS),
        ] {
            let count: usize = keywords
                .iter()
                .map(|k| normalized.matches(k).count())
                .sum();
            if count >= config.family_threshold {
                score += config.family_base + count as u32 * config.family_increment;
                reasons.push(format!("{family} keywords ({count})"));
            }
        }

        if self.re_multi_step.is_match(&normalized)
            && (normalized.contains("continue") || normalized.contains("previous"))
        {
            score += 10;
            reasons.push("multi-step pattern".to_string());
        }

        LayerResult::from_findings(score, reasons)
    }

    /// Behavioral layer: density and size signals.
    pub(crate) fn behavioral(&self, text: &str, config: &SuspicionConfig) -> LayerResult {
        let mut score = 0;
        let mut reasons = Vec::new();
        let lower = text.to_lowercase();
        let words: Vec<&str> = self.re_word.find_iter(&lower).map(|m| m.as_str()).collect();

        if words.len() >= 6 {
            let questions = words
                .iter()
                .filter(|w| QUESTION_WORDS.contains(&w.as_ref()))
                .count();
            if questions as f32 / words.len() as f32 >= 0.25 {
                score += 10;
                reasons.push("question-word density".to_string());
            }

            let commands = words
                .iter()
                .filter(|w| COMMAND_VERBS.contains(&w.as_ref()))
                .count();
            if commands as f32 / words.len() as f32 >= 0.25 {
                score += 10;
                reasons.push("command-verb density".to_string());
            }
        }

        let urgency = URGENCY_MARKERS
            .iter()
            .map(|m| lower.matches(m).count())
            .sum::<usize>();
        if urgency >= 2 {
            score += 10;
            reasons.push("urgency markers".to_string());
        }

        if text.chars().count() > config.long_input_chars {
            score += 10;
            reasons.push("unusual length".to_string());
        }

        if let Some((word, count)) = max_repetition(&words) {
            if count >= 5 {
                score += 15;
                reasons.push(format!("word repetition ('{word}' x{count})"));
            }
        }

        LayerResult::from_findings(score, reasons)
    }

    /// Contextual layer: resets, contradictions, topic switches, nesting.
    pub(crate) fn contextual(&self, text: &str, config: &SuspicionConfig) -> LayerResult {
        let mut score = 0;
        let mut reasons = Vec::new();
        let lower = text.to_lowercase();
        let is_short = text.chars().count() < config.short_input_chars;

        if RESET_PHRASES.iter().any(|p| lower.contains(p)) {
            score += 20;
            reasons.push("conversation reset".to_string());
        }

        if is_short {
            for sentence in lower.split(['.', '!', '?']) {
                if CONTRADICTION_PAIRS
                    .iter()
                    .any(|(a, b)| sentence.contains(a) && sentence.contains(b))
                {
                    score += 15;
                    reasons.push("contradiction".to_string());
                    break;
                }
            }

            let topics = TOPIC_VOCABULARY
                .iter()
                .filter(|t| lower.contains(*t))
                .count();
            if topics >= 3 {
                score += 15;
                reasons.push(format!("topic switching ({topics} topics)"));
            }
        }

        let conditionals = lower.matches("if ").count();
        if conditionals >= 2 && lower.contains("then") {
            score += 10;
            reasons.push("nested conditionals".to_string());
        }

        LayerResult::from_findings(score, reasons)
    }

    /// Linguistic layer: surface-statistics anomalies.
    pub(crate) fn linguistic(&self, text: &str, _config: &SuspicionConfig) -> LayerResult {
        let mut score = 0;
        let mut reasons = Vec::new();
        let char_count = text.chars().count();

        if char_count >= 10 {
            let punct = text.chars().filter(|c| c.is_ascii_punctuation()).count();
            if punct as f32 / char_count as f32 > 0.25 {
                score += 10;
                reasons.push("punctuation density".to_string());
            }
        }

        let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
        if letters.len() >= 10 {
            let upper = letters.iter().filter(|c| c.is_uppercase()).count();
            if upper as f32 / letters.len() as f32 > 0.5 {
                score += 15;
                reasons.push("case-ratio anomaly".to_string());
            }
        }

        let lower = text.to_lowercase();
        let words: Vec<&str> = self.re_word.find_iter(&lower).map(|m| m.as_str()).collect();
        if let Some((word, count)) = max_repetition(&words) {
            if count >= 4 {
                score += 10;
                reasons.push(format!("repeated word ('{word}')"));
            }
        }

        if self.re_numbered.find_iter(text).count() >= 4 {
            score += 5;
            reasons.push("numbered-list density".to_string());
        }

        if bracket_depth(text) > 3 {
            score += 10;
            reasons.push("bracket nesting".to_string());
        }

        let caps_words = text
            .split_whitespace()
            .filter(|w| w.len() >= 3 && w.chars().all(|c| !c.is_alphabetic() || c.is_uppercase()))
            .filter(|w| w.chars().any(|c| c.is_alphabetic()))
            .count();
        if caps_words >= 3 {
            score += 10;
            reasons.push("all-caps words".to_string());
        }

        LayerResult::from_findings(score, reasons)
    }
}

fn compile(source: &str) -> Regex {
    regex::RegexBuilder::new(source)
        .case_insensitive(true)
        .build()
        .expect("invalid layer pattern")
}

fn is_hidden(c: char) -> bool {
    matches!(
        c,
        '\u{200B}'..='\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2066}'..='\u{2069}' | '\u{FEFF}'
    )
}

fn max_repetition<'a>(words: &[&'a str]) -> Option<(&'a str, usize)> {
    let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for w in words {
        if w.len() >= 3 {
            *counts.entry(w).or_insert(0) += 1;
        }
    }
    // Ties break lexicographically so repeated evaluation of the same text
    // names the same word.
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
}

fn bracket_depth(text: &str) -> usize {
    let mut depth = 0usize;
    let mut max_depth = 0usize;
    for c in text.chars() {
        match c {
            '(' | '[' | '{' => {
                depth += 1;
                max_depth = max_depth.max(depth);
            }
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    max_depth
}
