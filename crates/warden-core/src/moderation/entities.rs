//! Disallowed-entity redaction for model output.
//!
//! Entities (model names, providers) are matched whole-word and
//! case-insensitively across the main name and every alias. Redaction
//! applies only to model output, never to user input; per-entity detection
//! counters feed the host's reporting.

use std::collections::HashMap;

use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// What to do with a matched entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityAction {
    /// Delete the match.
    Remove,
    /// Substitute the entry's replacement text.
    Replace,
    /// Substitute a redaction marker.
    #[default]
    Redact,
}

/// A disallowed name with its aliases and redaction policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisallowedEntity {
    /// Primary name.
    pub name: String,
    /// Alternate spellings and versioned names.
    pub aliases: Vec<String>,
    /// Provider this entity belongs to, for reporting.
    pub provider: Option<String>,
    /// What to do on match.
    pub action: EntityAction,
    /// Replacement text for [`EntityAction::Replace`].
    pub replacement: Option<String>,
}

impl DisallowedEntity {
    /// Creates a redacted entity with aliases.
    pub fn redact(
        name: impl Into<String>,
        aliases: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            aliases: aliases.into_iter().map(Into::into).collect(),
            provider: None,
            action: EntityAction::Redact,
            replacement: None,
        }
    }

    /// Sets the provider tag.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Switches the entry to replacement with the given text.
    pub fn replaced_with(mut self, replacement: impl Into<String>) -> Self {
        self.action = EntityAction::Replace;
        self.replacement = Some(replacement.into());
        self
    }

    /// Switches the entry to removal.
    pub fn removed(mut self) -> Self {
        self.action = EntityAction::Remove;
        self
    }
}

struct CompiledEntity {
    entity: DisallowedEntity,
    regex: Regex,
}

/// The entity list with per-entity match counters.
pub struct EntityRedactor {
    entries: Vec<CompiledEntity>,
    counters: Mutex<HashMap<String, u64>>,
}

impl EntityRedactor {
    /// Creates a redactor over an explicit entity list.
    pub fn new(entities: Vec<DisallowedEntity>) -> Self {
        let entries = entities
            .into_iter()
            .map(|entity| {
                let regex = compile_entity(&entity);
                CompiledEntity { entity, regex }
            })
            .collect();
        Self {
            entries,
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a redactor loaded with the built-in model-name list.
    pub fn with_defaults() -> Self {
        Self::new(default_entities())
    }

    /// Redacts every entity occurrence in `text`. Returns the rewritten text
    /// and the names of entities that matched, in list order.
    pub fn redact(&self, text: &str) -> (String, Vec<String>) {
        let mut out = text.to_string();
        let mut matched = Vec::new();

        for compiled in &self.entries {
            if !compiled.regex.is_match(&out) {
                continue;
            }
            matched.push(compiled.entity.name.clone());
            *self
                .counters
                .lock()
                .entry(compiled.entity.name.clone())
                .or_insert(0) += 1;

            let replacement = match compiled.entity.action {
                EntityAction::Remove => String::new(),
                EntityAction::Replace => compiled
                    .entity
                    .replacement
                    .clone()
                    .unwrap_or_else(|| "[REDACTED]".to_string()),
                EntityAction::Redact => "[REDACTED]".to_string(),
            };
            out = compiled
                .regex
                .replace_all(&out, replacement.as_str())
                .into_owned();
        }

        (out, matched)
    }

    /// Snapshot of the per-entity detection counters.
    pub fn counters(&self) -> HashMap<String, u64> {
        self.counters.lock().clone()
    }

    /// Number of configured entities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no entities are configured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn compile_entity(entity: &DisallowedEntity) -> Regex {
    let mut alternatives: Vec<String> = Vec::with_capacity(1 + entity.aliases.len());
    alternatives.push(regex::escape(&entity.name));
    for alias in &entity.aliases {
        alternatives.push(regex::escape(alias));
    }
    // Longest alternative first so "Claude 3.5" wins over "Claude".
    alternatives.sort_by_key(|a| std::cmp::Reverse(a.len()));
    let source = format!(r"\b(?:{})\b", alternatives.join("|"));
    regex::RegexBuilder::new(&source)
        .case_insensitive(true)
        .build()
        .expect("entity names escape to valid patterns")
}

/// Built-in disallowed model and provider names.
fn default_entities() -> Vec<DisallowedEntity> {
    vec![
        DisallowedEntity::redact(
            "Claude",
            ["Claude 3", "Claude 3.5", "Sonnet", "Opus", "Haiku"],
        )
        .with_provider("Anthropic"),
        DisallowedEntity::redact("Anthropic", Vec::<String>::new()).with_provider("Anthropic"),
        DisallowedEntity::redact("GPT", ["GPT-4", "GPT-4o", "GPT-3.5", "ChatGPT"])
            .with_provider("OpenAI"),
        DisallowedEntity::redact("OpenAI", Vec::<String>::new()).with_provider("OpenAI"),
        DisallowedEntity::redact("Gemini", ["Bard"]).with_provider("Google"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redactor() -> EntityRedactor {
        EntityRedactor::with_defaults()
    }

    #[test]
    fn redacts_model_name_and_provider() {
        let (out, matched) = redactor().redact("I am Claude 3.5, built by Anthropic");
        assert!(!out.contains("Claude"));
        assert!(!out.contains("Anthropic"));
        assert!(matched.contains(&"Claude".to_string()));
        assert!(matched.contains(&"Anthropic".to_string()));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let (out, matched) = redactor().redact("ask CLAUDE or chatgpt");
        assert!(!out.to_lowercase().contains("claude"));
        assert!(!out.to_lowercase().contains("chatgpt"));
        assert_eq!(matched.len(), 2);
    }

    #[test]
    fn whole_word_matching_avoids_substrings() {
        // "Claudette" must not be redacted.
        let (out, matched) = redactor().redact("Claudette went home");
        assert_eq!(out, "Claudette went home");
        assert!(matched.is_empty());
    }

    #[test]
    fn aliases_match_like_the_main_name() {
        let (out, matched) = redactor().redact("Opus is my favorite");
        assert!(!out.contains("Opus"));
        assert_eq!(matched, vec!["Claude".to_string()]);
    }

    #[test]
    fn replace_action_uses_replacement_text() {
        let redactor = EntityRedactor::new(vec![DisallowedEntity::redact(
            "Atlas",
            Vec::<String>::new(),
        )
        .replaced_with("the assistant")]);
        let (out, _) = redactor.redact("Atlas answered quickly");
        assert_eq!(out, "the assistant answered quickly");
    }

    #[test]
    fn remove_action_deletes_the_match() {
        let redactor =
            EntityRedactor::new(vec![
                DisallowedEntity::redact("Atlas", Vec::<String>::new()).removed()
            ]);
        let (out, _) = redactor.redact("Atlas answered");
        assert_eq!(out, " answered");
    }

    #[test]
    fn counters_track_per_entity_detections() {
        let r = redactor();
        let _ = r.redact("Claude and Claude again");
        let _ = r.redact("Claude once more");
        let counters = r.counters();
        // Counted per redaction call, not per occurrence.
        assert_eq!(counters.get("Claude"), Some(&2));
        assert_eq!(counters.get("Gemini"), None);
    }

    #[test]
    fn clean_text_is_untouched() {
        let (out, matched) = redactor().redact("the weather is nice");
        assert_eq!(out, "the weather is nice");
        assert!(matched.is_empty());
    }
}
