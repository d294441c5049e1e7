//! Keyword families used by the suspicion layers.
//!
//! All matching over these lists is case-insensitive and runs on
//! leet-normalized text, so "1gn0re" counts as "ignore".

/// Manipulation framing: roleplay and persona-shifting vocabulary.
pub(crate) const MANIPULATION_KEYWORDS: &[&str] = &[
    "pretend",
    "roleplay",
    "role play",
    "imagine you",
    "hypothetically",
    "act as",
    "simulate",
    "let's play",
    "you are now",
    "in character",
];

/// Extraction vocabulary: attempts to surface hidden instructions.
pub(crate) const EXTRACTION_KEYWORDS: &[&str] = &[
    "reveal",
    "your instructions",
    "system prompt",
    "initial prompt",
    "how do you work",
    "your rules",
    "your guidelines",
    "training data",
    "show me your",
    "repeat everything",
];

/// Bypass vocabulary: attempts to disable or sidestep safety behavior.
pub(crate) const BYPASS_KEYWORDS: &[&str] = &[
    "ignore",
    "override",
    "bypass",
    "disregard",
    "unrestricted",
    "unfiltered",
    "without restrictions",
    "no limits",
    "jailbreak",
    "developer mode",
];

/// Urgency markers weighed by the behavioral layer.
pub(crate) const URGENCY_MARKERS: &[&str] = &[
    "now",
    "immediately",
    "urgent",
    "urgently",
    "quickly",
    "right away",
    "hurry",
    "asap",
];

/// Imperative verbs weighed by the behavioral layer.
pub(crate) const COMMAND_VERBS: &[&str] = &[
    "tell", "show", "give", "write", "explain", "list", "provide", "create", "make", "print",
];

/// Interrogatives weighed by the behavioral layer.
pub(crate) const QUESTION_WORDS: &[&str] =
    &["what", "why", "how", "when", "where", "who", "which"];

/// Conversation-reset phrases weighed by the contextual layer.
pub(crate) const RESET_PHRASES: &[&str] = &[
    "new conversation",
    "start over",
    "start fresh",
    "forget everything",
    "forget all",
    "clean slate",
    "from scratch",
    "reset yourself",
];

/// Contradiction pairs that flag same-sentence tension on short inputs.
pub(crate) const CONTRADICTION_PAIRS: &[(&str, &str)] = &[
    ("always", "never"),
    ("must", "must not"),
    ("do ", "don't"),
    ("can ", "cannot"),
    ("allowed", "forbidden"),
];

/// Fixed topic vocabulary for rapid-topic-switch detection.
pub(crate) const TOPIC_VOCABULARY: &[&str] = &[
    "weather",
    "recipe",
    "poem",
    "code",
    "story",
    "math",
    "history",
    "music",
    "instructions",
    "password",
    "secret",
    "prompt",
];

/// Maps common leetspeak substitutions back to letters before keyword
/// scanning.
pub(crate) fn normalize_leet(text: &str) -> String {
    text.to_lowercase()
        .replace('0', "o")
        .replace('1', "i")
        .replace('3', "e")
        .replace('4', "a")
        .replace('5', "s")
        .replace('7', "t")
        .replace('@', "a")
        .replace('$', "s")
}
