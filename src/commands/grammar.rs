//! Fixed command grammar
//!
//! The grammar is the complete, finite list of phrases the command recognizer
//! may produce. Every phrase starts with the wake word, e.g. `jarvis play` or
//! `jarvis skip twenty one`.

use std::collections::HashSet;

use super::numbers::{MAX_NUMBER, NumberWords};

/// Verbs that are valid on their own
pub const BASE_VERBS: [&str; 7] = ["play", "pause", "stop", "next", "previous", "skip", "rewind"];

/// Verbs that also accept a numeric argument
pub const NUMERIC_VERBS: [&str; 2] = ["skip", "rewind"];

/// Default wake word
pub const DEFAULT_WAKE_WORD: &str = "jarvis";

/// Immutable set of wake-prefixed command phrases
#[derive(Debug, Clone)]
pub struct Grammar {
    wake_word: String,
    phrases: Vec<String>,
    members: HashSet<String>,
    numbers: NumberWords,
}

impl Grammar {
    /// Build the standard grammar for a wake word
    #[must_use]
    pub fn build(wake_word: &str) -> Self {
        Self::with_verbs(wake_word, &BASE_VERBS, MAX_NUMBER)
    }

    /// Build a grammar from explicit base verbs and a number bound
    ///
    /// The bound is capped at [`MAX_NUMBER`]. Phrases are ordered as: base
    /// verbs in the given order, then `skip 1..=bound`, then `rewind 1..=bound`.
    /// Duplicate phrases keep their first position.
    #[must_use]
    pub fn with_verbs(wake_word: &str, base_verbs: &[&str], bound: u32) -> Self {
        let numbers = NumberWords::new();
        let wake_word = canonical(wake_word, &numbers);
        let bound = bound.min(MAX_NUMBER);

        let base = base_verbs.iter().map(|verb| verb.trim().to_lowercase());
        let numeric = NUMERIC_VERBS.iter().flat_map(|verb| {
            numbers
                .iter()
                .take_while(move |(n, _)| *n <= bound)
                .map(move |(_, word)| format!("{verb} {word}"))
        });

        let mut phrases = Vec::new();
        let mut members = HashSet::new();
        for body in base.chain(numeric) {
            let phrase = format!("{wake_word} {body}");
            if members.insert(phrase.clone()) {
                phrases.push(phrase);
            }
        }

        tracing::debug!(wake_word, phrases = phrases.len(), "command grammar built");

        Self {
            wake_word,
            phrases,
            members,
            numbers,
        }
    }

    /// The wake word every phrase starts with
    #[must_use]
    pub fn wake_word(&self) -> &str {
        &self.wake_word
    }

    /// All phrases in build order
    #[must_use]
    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// Number of phrases
    #[must_use]
    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    /// Whether the grammar is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    /// Exact membership test (no normalization)
    #[must_use]
    pub fn contains(&self, phrase: &str) -> bool {
        self.members.contains(phrase)
    }

    /// The number-word table used for numeric phrases
    #[must_use]
    pub const fn numbers(&self) -> &NumberWords {
        &self.numbers
    }

    /// Phrases with the wake word removed, as spoken after the wake word
    pub fn bodies(&self) -> impl Iterator<Item = &str> {
        self.phrases
            .iter()
            .filter_map(|p| self.strip_wake_word(p))
    }

    /// Remove the leading wake word, if present
    #[must_use]
    pub fn strip_wake_word<'a>(&self, phrase: &'a str) -> Option<&'a str> {
        phrase
            .strip_prefix(self.wake_word.as_str())
            .filter(|rest| rest.starts_with(' '))
            .map(str::trim_start)
            .filter(|rest| !rest.is_empty())
    }

    /// Canonical form of a phrase
    ///
    /// Lowercases, drops surrounding punctuation, collapses whitespace and
    /// rewrites digit arguments inside the number table to their word form.
    #[must_use]
    pub fn normalize(&self, phrase: &str) -> String {
        canonical(phrase, &self.numbers)
    }

    /// Canonical form of a wake word, as it appears at the start of phrases
    ///
    /// Empty when the input has no words left after normalization.
    #[must_use]
    pub fn canonical_wake_word(wake_word: &str) -> String {
        canonical(wake_word, &NumberWords::new())
    }

    /// Normalize a recognizer result and make sure it carries the wake word
    #[must_use]
    pub fn qualify(&self, text: &str) -> String {
        let normalized = self.normalize(text);
        if normalized.is_empty() || self.strip_wake_word(&normalized).is_some() {
            normalized
        } else {
            format!("{} {normalized}", self.wake_word)
        }
    }

    /// Phrase list as a JSON array, the grammar format recognizers accept
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(&self.phrases)?)
    }
}

fn canonical(phrase: &str, numbers: &NumberWords) -> String {
    phrase
        .split_whitespace()
        .map(|token| {
            token
                .trim_matches(|c: char| c.is_ascii_punctuation())
                .to_lowercase()
        })
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<u32>()
                .ok()
                .and_then(|n| numbers.word(n))
                .map_or(token, ToString::to_string)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

impl Default for Grammar {
    fn default() -> Self {
        Self::build(DEFAULT_WAKE_WORD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grammar_size_matches_verbs_and_bound() {
        let grammar = Grammar::build("jarvis");
        assert_eq!(grammar.len(), BASE_VERBS.len() + 2 * MAX_NUMBER as usize);

        let unique: HashSet<_> = grammar.phrases().iter().collect();
        assert_eq!(unique.len(), grammar.len());
        assert!(grammar.phrases().iter().all(|p| p.starts_with("jarvis ")));
    }

    #[test]
    fn build_is_deterministic() {
        let a = Grammar::build("jarvis");
        let b = Grammar::build("jarvis");
        assert_eq!(a.phrases(), b.phrases());
        assert_eq!(a.phrases()[0], "jarvis play");
        assert_eq!(a.phrases()[7], "jarvis skip one");
        assert_eq!(a.phrases().last().map(String::as_str), Some("jarvis rewind sixty"));
    }

    #[test]
    fn duplicate_verbs_are_collapsed() {
        let grammar = Grammar::with_verbs("jarvis", &["play", "Play ", "stop"], 3);
        assert_eq!(grammar.len(), 2 + 2 * 3);
    }

    #[test]
    fn wake_word_is_canonicalized() {
        let grammar = Grammar::build("  Hey  Jarvis! ");
        assert_eq!(grammar.wake_word(), "hey jarvis");
        assert_eq!(grammar.phrases()[0], "hey jarvis play");
        assert!(
            grammar
                .phrases()
                .iter()
                .all(|p| grammar.contains(&grammar.normalize(p)))
        );
        assert_eq!(Grammar::canonical_wake_word(" ?! "), "");
    }

    #[test]
    fn bound_is_capped() {
        let grammar = Grammar::with_verbs("jarvis", &BASE_VERBS, 500);
        assert_eq!(grammar.len(), BASE_VERBS.len() + 2 * MAX_NUMBER as usize);
    }

    #[test]
    fn normalize_rewrites_digits() {
        let grammar = Grammar::default();
        assert_eq!(grammar.normalize("Jarvis, skip 7!"), "jarvis skip seven");
        assert_eq!(grammar.normalize("  jarvis   rewind 21 "), "jarvis rewind twenty one");
        assert_eq!(grammar.normalize("jarvis skip 99"), "jarvis skip 99");
    }

    #[test]
    fn qualify_adds_missing_wake_word() {
        let grammar = Grammar::default();
        assert_eq!(grammar.qualify("next"), "jarvis next");
        assert_eq!(grammar.qualify("jarvis next"), "jarvis next");
        assert_eq!(grammar.qualify(""), "");
    }

    #[test]
    fn strip_requires_word_boundary() {
        let grammar = Grammar::default();
        assert_eq!(grammar.strip_wake_word("jarvis play"), Some("play"));
        assert_eq!(grammar.strip_wake_word("jarvisplay"), None);
        assert_eq!(grammar.strip_wake_word("jarvis"), None);
        assert_eq!(grammar.bodies().count(), grammar.len());
    }

    #[test]
    fn json_is_a_phrase_array() {
        let grammar = Grammar::with_verbs("jarvis", &["play"], 1);
        assert_eq!(
            grammar.to_json().unwrap(),
            r#"["jarvis play","jarvis skip one","jarvis rewind one"]"#
        );
    }
}
