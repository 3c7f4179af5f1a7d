//! Sentence extractor — splits replies into sentences and keeps the ones
//! that read like general policy.
//!
//! The relevance test favours recall: wrongly kept sentences are removed
//! later by the exclusion patterns.

use regex::Regex;

use crate::config::Limits;
use crate::error::RulesError;
use crate::pipeline::rules::{ExtractorRules, compile_patterns};

#[derive(Debug, Clone)]
pub struct SentenceExtractor {
    greetings: Vec<Regex>,
    quotes: Vec<Regex>,
    policy: Vec<Regex>,
    contact: Vec<Regex>,
    min_fragment_chars: usize,
    min_relevant_chars: usize,
    long_sentence_chars: usize,
}

impl SentenceExtractor {
    pub fn new(rules: &ExtractorRules, limits: &Limits) -> Result<Self, RulesError> {
        Ok(Self {
            greetings: compile_patterns("extractor.greeting_patterns", &rules.greeting_patterns)?,
            quotes: compile_patterns("extractor.quote_patterns", &rules.quote_patterns)?,
            policy: compile_patterns("extractor.policy_patterns", &rules.policy_patterns)?,
            contact: compile_patterns("extractor.contact_patterns", &rules.contact_patterns)?,
            min_fragment_chars: limits.min_fragment_chars,
            min_relevant_chars: limits.min_relevant_chars,
            long_sentence_chars: limits.long_sentence_chars,
        })
    }

    /// Split text into sentence candidates.
    ///
    /// Line breaks always end a sentence; inside a line, whitespace after
    /// `.`, `!` or `?` does. Short fragments and bare greetings are dropped.
    pub fn split(&self, text: &str) -> Vec<String> {
        text.lines()
            .flat_map(split_line)
            .map(|s| s.trim().trim_start_matches('.').trim().to_string())
            .filter(|s| s.chars().count() >= self.min_fragment_chars)
            .filter(|s| !self.greetings.iter().any(|g| g.is_match(s)))
            .collect()
    }

    /// Whether a sentence reads like a reusable statement.
    pub fn is_relevant(&self, sentence: &str) -> bool {
        let s = sentence.to_lowercase();
        let len = s.chars().count();
        if len < self.min_relevant_chars {
            return false;
        }
        if self.quotes.iter().any(|q| q.is_match(&s)) {
            return false;
        }
        if self.policy.iter().any(|p| p.is_match(&s)) {
            return true;
        }
        len > self.long_sentence_chars && !self.contact.iter().any(|c| c.is_match(&s))
    }

    /// Split and keep relevant sentences.
    pub fn extract(&self, text: &str) -> Vec<String> {
        self.split(text)
            .into_iter()
            .filter(|s| self.is_relevant(s))
            .collect()
    }
}

/// Split one line after sentence-ending punctuation followed by whitespace.
fn split_line(line: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut prev: Option<char> = None;
    for (idx, ch) in line.char_indices() {
        if ch.is_whitespace() && matches!(prev, Some('.' | '!' | '?')) {
            parts.push(&line[start..idx]);
            start = idx;
        }
        prev = Some(ch);
    }
    parts.push(&line[start..]);
    parts
}
