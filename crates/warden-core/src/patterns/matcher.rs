//! Compiled matcher behind a capability seam.
//!
//! Rules compile to one of two variants: a linear-time regex (the `regex`
//! crate's engine never backtracks, so crafted input cannot force
//! super-linear evaluation) or a case-folded literal scan. The per-pattern
//! wall-clock budget enforced by the evaluator is the safety net of record
//! on top of this; a bounded backtracking engine would slot in here as a
//! third variant if one were ever needed.

use regex::RegexBuilder;

use crate::error::{Result, WardenError};
use crate::patterns::types::PatternExpr;

/// Upper bound on compiled regex size, so a hostile rule source cannot
/// exhaust memory at compile time.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// A compiled, ReDoS-resistant matcher.
#[derive(Debug, Clone)]
pub enum CompiledMatcher {
    /// Linear-time regex engine.
    Linear(regex::Regex),
    /// Case-insensitive substring scan (needle stored lowercased).
    Literal(String),
    /// Test-only matcher that burns wall-clock time before matching, for
    /// exercising the evaluator's budget enforcement.
    #[cfg(test)]
    Sleep(std::time::Duration),
}

impl CompiledMatcher {
    /// Compiles a pattern expression. Regexes are case-insensitive and
    /// size-limited; invalid expressions are refused at registration time so
    /// evaluation can never hit a compile fault.
    pub fn compile(id: &str, expr: &PatternExpr) -> Result<Self> {
        match expr {
            PatternExpr::Regex(source) => {
                let regex = RegexBuilder::new(source)
                    .case_insensitive(true)
                    .size_limit(REGEX_SIZE_LIMIT)
                    .build()
                    .map_err(|e| WardenError::InvalidPattern {
                        id: id.to_string(),
                        reason: e.to_string(),
                    })?;
                Ok(CompiledMatcher::Linear(regex))
            }
            PatternExpr::Literal(needle) => {
                if needle.is_empty() {
                    return Err(WardenError::InvalidPattern {
                        id: id.to_string(),
                        reason: "empty literal".to_string(),
                    });
                }
                Ok(CompiledMatcher::Literal(needle.to_lowercase()))
            }
        }
    }

    /// Returns true if the matcher finds a match anywhere in `text`.
    pub fn matches(&self, text: &str) -> bool {
        match self {
            CompiledMatcher::Linear(regex) => regex.is_match(text),
            CompiledMatcher::Literal(needle) => text.to_lowercase().contains(needle.as_str()),
            #[cfg(test)]
            CompiledMatcher::Sleep(duration) => {
                std::thread::sleep(*duration);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn regex_matcher_is_case_insensitive() {
        let m = CompiledMatcher::compile(
            "t",
            &PatternExpr::Regex(r"ignore\s+previous\s+instructions".into()),
        )
        .unwrap();
        assert!(m.matches("IGNORE PREVIOUS INSTRUCTIONS"));
        assert!(m.matches("please ignore previous instructions now"));
        assert!(!m.matches("follow the previous instructions"));
    }

    #[test]
    fn literal_matcher_is_case_insensitive() {
        let m = CompiledMatcher::compile("t", &PatternExpr::Literal("DAN mode".into())).unwrap();
        assert!(m.matches("enable dan MODE now"));
        assert!(!m.matches("dawn mode"));
    }

    #[test]
    fn invalid_regex_is_refused_at_compile() {
        let err = CompiledMatcher::compile("bad", &PatternExpr::Regex("(unclosed".into()));
        assert!(matches!(
            err,
            Err(WardenError::InvalidPattern { ref id, .. }) if id == "bad"
        ));
    }

    #[test]
    fn empty_literal_is_refused() {
        assert!(CompiledMatcher::compile("e", &PatternExpr::Literal(String::new())).is_err());
    }

    #[test]
    fn pathological_input_stays_linear() {
        // `(a+)+$` causes catastrophic backtracking in naive engines; the
        // linear engine must dispatch it in well under the default budget.
        let m = CompiledMatcher::compile("redos", &PatternExpr::Regex(r"(a+)+$".into())).unwrap();
        let input = format!("{}b", "a".repeat(10_000));

        let start = Instant::now();
        let matched = m.matches(&input);
        let elapsed = start.elapsed();

        assert!(!matched);
        assert!(
            elapsed < Duration::from_millis(50),
            "evaluation took {elapsed:?}"
        );
    }

    #[test]
    fn oversized_regex_is_refused() {
        // A counted repetition that explodes the compiled program size.
        let source = "a{1000}{1000}{1000}".to_string();
        assert!(CompiledMatcher::compile("big", &PatternExpr::Regex(source)).is_err());
    }
}
