//! Word-list toxicity scoring and profanity filtering.
//!
//! Toxicity is a weighted sum over profanity, insult, and hate-word
//! occurrences plus aggressive-tone signals (sustained caps, punctuation
//! runs, elongated characters), multiplied in strict mode and capped at 100.

use regex::Regex;

/// Replacement for filtered profanity.
const CENSOR_PLACEHOLDER: &str = "[CENSORED]";

const PROFANITY: &[&str] = &[
    "damn", "hell", "crap", "ass", "bastard", "bitch", "shit", "fuck", "dick", "piss",
];

const INSULTS: &[&str] = &[
    "idiot", "stupid", "moron", "dumb", "loser", "pathetic", "worthless", "imbecile", "fool",
];

const HATE_WORDS: &[&str] = &["despise", "vermin", "subhuman", "scum", "filth"];

/// Scores and filters toxic language.
pub struct ToxicityScorer {
    re_profanity: Regex,
    re_insults: Regex,
    re_hate: Regex,
    re_punct_runs: Regex,
    re_elongated: Regex,
}

impl ToxicityScorer {
    /// Creates a scorer with the built-in word lists.
    pub fn new() -> Self {
        Self {
            re_profanity: word_list_regex(PROFANITY),
            re_insults: word_list_regex(INSULTS),
            re_hate: word_list_regex(HATE_WORDS),
            re_punct_runs: Regex::new(r"[!?]{3,}").expect("invalid toxicity pattern"),
            re_elongated: Regex::new(&elongated_pattern()).expect("invalid toxicity pattern"),
        }
    }

    /// Computes a 0–100 toxicity score.
    pub fn score(&self, text: &str, strict: bool) -> u32 {
        let profanity = self.re_profanity.find_iter(text).count() as u32;
        let insults = self.re_insults.find_iter(text).count() as u32;
        let hate = self.re_hate.find_iter(text).count() as u32;

        let mut score = profanity * 15 + insults * 10 + hate * 20;

        // Aggressive-tone signals.
        let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
        if letters.len() >= 10 {
            let upper = letters.iter().filter(|c| c.is_uppercase()).count();
            if upper as f32 / letters.len() as f32 > 0.6 {
                score += 10;
            }
        }
        if self.re_punct_runs.is_match(text) {
            score += 5;
        }
        if self.re_elongated.is_match(text) {
            score += 5;
        }

        if strict {
            score = (f64::from(score) * 1.25).round() as u32;
        }
        score.min(100)
    }

    /// Replaces profanity with a placeholder. Returns the filtered text and
    /// the number of replacements.
    pub fn filter_profanity(&self, text: &str) -> (String, u32) {
        let count = self.re_profanity.find_iter(text).count() as u32;
        if count == 0 {
            return (text.to_string(), 0);
        }
        let filtered = self
            .re_profanity
            .replace_all(text, CENSOR_PLACEHOLDER)
            .into_owned();
        (filtered, count)
    }
}

impl Default for ToxicityScorer {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a pattern matching any ASCII letter repeated four or more times.
///
/// The `regex` crate does not support backreferences, so the equivalent
/// `([a-zA-Z])\1{3,}` is expressed as an alternation over each letter — a
/// case-sensitive match of a single letter run, identical in behavior.
fn elongated_pattern() -> String {
    let alts: Vec<String> = ('a'..='z')
        .chain('A'..='Z')
        .map(|c| format!("{c}{{4,}}"))
        .collect();
    format!("(?:{})", alts.join("|"))
}

fn word_list_regex(words: &[&str]) -> Regex {
    let source = format!(r"\b(?:{})\b", words.join("|"));
    regex::RegexBuilder::new(&source)
        .case_insensitive(true)
        .build()
        .expect("word lists compile to valid patterns")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> ToxicityScorer {
        ToxicityScorer::new()
    }

    #[test]
    fn clean_text_scores_zero() {
        assert_eq!(scorer().score("What a lovely morning", false), 0);
    }

    #[test]
    fn profanity_and_insults_accumulate() {
        let score = scorer().score("you damn stupid fool", false);
        // 1 profanity * 15 + 2 insults * 10
        assert_eq!(score, 35);
    }

    #[test]
    fn hate_words_weigh_heaviest() {
        let score = scorer().score("they are vermin and scum", false);
        assert_eq!(score, 40);
    }

    #[test]
    fn aggressive_tone_adds_signals() {
        let score = scorer().score("STOP DOING THAT RIGHT NOW!!!! pleaseeeee", false);
        // caps 10 + punctuation run 5 + elongation 5
        assert_eq!(score, 20);
    }

    #[test]
    fn strict_mode_multiplies() {
        let relaxed = scorer().score("you damn stupid fool", false);
        let strict = scorer().score("you damn stupid fool", true);
        assert_eq!(strict, (f64::from(relaxed) * 1.25).round() as u32);
    }

    #[test]
    fn score_caps_at_one_hundred() {
        let tirade = "damn stupid vermin ".repeat(10);
        assert_eq!(scorer().score(&tirade, true), 100);
    }

    #[test]
    fn whole_word_matching_spares_innocents() {
        // "class" contains "ass"; "hello" contains "hell".
        assert_eq!(scorer().score("hello class, assess the passage", false), 0);
    }

    #[test]
    fn filter_replaces_profanity() {
        let (filtered, count) = scorer().filter_profanity("that damn thing broke");
        assert_eq!(filtered, "that [CENSORED] thing broke");
        assert_eq!(count, 1);
    }

    #[test]
    fn filter_leaves_clean_text_alone() {
        let (filtered, count) = scorer().filter_profanity("all good here");
        assert_eq!(filtered, "all good here");
        assert_eq!(count, 0);
    }
}
