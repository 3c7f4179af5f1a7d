//! Document assembler.
//!
//! Walks the topics in rule-table order and turns each topic's ranked
//! candidates into bullets. A statement is emitted at most once across the
//! whole document: the first topic to claim its key keeps it.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info};

use crate::config::Limits;
use crate::error::RulesError;
use crate::pipeline::dedup::{Exclusion, Generalizer};
use crate::pipeline::rules::RuleSet;
use crate::pipeline::types::{CandidateSentence, TopicDocument, TopicSection};
use crate::text::normalize_key;

/// Width of the rule separating the document frame from its body.
const RULE_WIDTH: usize = 72;

/// Normalized keys already emitted somewhere in the document.
#[derive(Debug, Default)]
pub struct SeenKeys(HashSet<String>);

impl SeenKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the key was already present.
    pub fn insert(&mut self, key: String) -> bool {
        self.0.insert(key)
    }

    /// Number of keys claimed so far.
    pub fn claimed(&self) -> usize {
        self.0.len()
    }
}

/// Builds the knowledge document from per-topic candidates.
pub struct DocumentAssembler<'a> {
    rules: &'a RuleSet,
    exclusion: Exclusion,
    generalizer: Generalizer,
    key_prefix: usize,
    max_bullets: usize,
    emit_catch_all: bool,
}

impl<'a> DocumentAssembler<'a> {
    pub fn new(rules: &'a RuleSet, limits: &Limits, emit_catch_all: bool) -> Result<Self, RulesError> {
        Ok(Self {
            rules,
            exclusion: Exclusion::new(&rules.exclusion_patterns, limits.min_statement_chars)?,
            generalizer: Generalizer::new(&rules.generalizations),
            key_prefix: limits.key_prefix_chars,
            max_bullets: limits.max_bullets,
            emit_catch_all,
        })
    }

    /// Topic keys and titles in document order.
    fn section_order(&self) -> Vec<(&str, &str)> {
        let mut order: Vec<(&str, &str)> = self
            .rules
            .topics
            .iter()
            .map(|t| (t.key.as_str(), t.title.as_str()))
            .collect();
        if self.emit_catch_all {
            let key = self.rules.catch_all.as_str();
            order.push((key, self.rules.topic_title(key).unwrap_or(key)));
        }
        order
    }

    /// Filter, generalize and cap one topic's candidates.
    ///
    /// Candidates are taken in ranking order; a topic stops accepting
    /// bullets once it holds `max_bullets`.
    pub fn select(&self, candidates: &[CandidateSentence], seen: &mut SeenKeys) -> Vec<String> {
        let mut bullets = Vec::new();
        for candidate in candidates {
            if bullets.len() >= self.max_bullets {
                break;
            }
            let sentence = candidate.sentence.trim();
            if sentence.is_empty() || self.exclusion.is_excluded(sentence) {
                continue;
            }
            let key = normalize_key(sentence, self.key_prefix);
            if !seen.insert(key.clone()) {
                continue;
            }
            let statement = self.generalizer.apply(sentence);
            if self.exclusion.is_excluded(&statement) {
                debug!(statement = %statement, "Generalized statement excluded");
                continue;
            }
            let general_key = normalize_key(&statement, self.key_prefix);
            if general_key != key && !seen.insert(general_key) {
                continue;
            }
            bullets.push(statement);
        }
        bullets
    }

    /// Assemble the document. `seen` carries keys claimed so far and is
    /// updated with every emitted statement.
    pub fn assemble(
        &self,
        candidates: &BTreeMap<String, Vec<CandidateSentence>>,
        seen: &mut SeenKeys,
    ) -> TopicDocument {
        let mut sections = Vec::new();
        for (key, title) in self.section_order() {
            let Some(list) = candidates.get(key) else {
                continue;
            };
            let bullets = self.select(list, seen);
            debug!(topic = key, bullets = bullets.len(), "Assembled topic");
            if bullets.is_empty() {
                continue;
            }
            sections.push(TopicSection {
                key: key.to_string(),
                title: title.to_string(),
                bullets,
            });
        }

        let document = TopicDocument {
            header_lines: self.rules.document.header_lines.clone(),
            facts_heading: self.rules.document.facts_heading.clone(),
            reference_facts: self.rules.document.reference_facts.clone(),
            sections,
            trailer_lines: self.rules.document.trailer_lines.clone(),
        };
        info!(
            sections = document.sections.len(),
            statements = document.statement_count(),
            "Knowledge document assembled"
        );
        document
    }
}

/// Render the document as plain text with Markdown-style headings.
pub fn render(document: &TopicDocument) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut lines: Vec<String> = document.header_lines.clone();
    lines.push(String::new());
    lines.push(rule.clone());
    lines.push(String::new());
    lines.push(document.facts_heading.clone());
    lines.push(String::new());
    lines.extend(document.reference_facts.iter().map(|f| format!("- {f}")));
    lines.push(String::new());
    for section in &document.sections {
        lines.push(format!("## {}", section.title));
        lines.push(String::new());
        lines.extend(section.bullets.iter().map(|b| format!("- {b}")));
        lines.push(String::new());
    }
    lines.push(rule);
    lines.push(String::new());
    lines.extend(document.trailer_lines.iter().cloned());
    let mut text = lines.join("\n");
    text.push('\n');
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(sentence: &str, occurrences: usize) -> CandidateSentence {
        CandidateSentence {
            key: normalize_key(sentence, 80),
            sentence: sentence.into(),
            occurrences,
        }
    }

    fn two_topic_rules() -> RuleSet {
        let mut rules = RuleSet::default_rules();
        rules.topics.truncate(3);
        rules
    }

    #[test]
    fn statement_appears_under_first_topic_only() {
        let rules = two_topic_rules();
        let assembler = DocumentAssembler::new(&rules, &Limits::default(), false).unwrap();
        let shared = "Die endgültige Umstellung kann aber etwa vier Wochen betragen.";
        let mut candidates = BTreeMap::new();
        candidates.insert("Gutschein_Partner".to_string(), vec![candidate(shared, 2)]);
        candidates.insert("Werbung_Datenschutz".to_string(), vec![candidate(shared, 2)]);

        let mut seen = SeenKeys::new();
        let doc = assembler.assemble(&candidates, &mut seen);
        assert_eq!(doc.sections.len(), 1);
        assert_eq!(doc.sections[0].key, "Gutschein_Partner");
        assert_eq!(
            doc.sections[0].bullets,
            vec!["Die endgültige Umstellung kann etwa vier Wochen dauern."]
        );
        assert_eq!(seen.claimed(), 2);
    }

    #[test]
    fn excluded_and_short_statements_never_appear() {
        let rules = two_topic_rules();
        let assembler = DocumentAssembler::new(&rules, &Limits::default(), false).unwrap();
        let list = vec![
            candidate("Kurzer Satz hier.", 5),
            candidate("Ihre Buchungsnummer 123456 ist bestätigt und gültig.", 4),
            candidate("Wir versenden keine Gutscheine an Privatpersonen.", 1),
        ];
        let mut seen = SeenKeys::new();
        let bullets = assembler.select(&list, &mut seen);
        assert_eq!(bullets, vec!["Wir versenden keine Gutscheine an Privatpersonen."]);
    }

    #[test]
    fn generalized_text_is_checked_again() {
        let mut rules = two_topic_rules();
        rules.generalizations = vec![crate::pipeline::rules::Generalization {
            from: "Die Gebühr wird nach der Stornierung separat berechnet.".into(),
            to: "Die Gebühr beträgt 50 € pro Person.".into(),
        }];
        let assembler = DocumentAssembler::new(&rules, &Limits::default(), false).unwrap();
        let list = vec![candidate("Die Gebühr wird nach der Stornierung separat berechnet.", 1)];
        assert!(assembler.select(&list, &mut SeenKeys::new()).is_empty());
    }

    #[test]
    fn sections_are_capped() {
        let rules = two_topic_rules();
        let limits = Limits {
            max_bullets: 3,
            ..Limits::default()
        };
        let assembler = DocumentAssembler::new(&rules, &limits, false).unwrap();
        let list: Vec<_> = (0..10)
            .map(|i| candidate(&format!("Dies ist die allgemeine Aussage Nummer {i} zum Thema."), 1))
            .collect();
        let mut candidates = BTreeMap::new();
        candidates.insert("Werbung_Datenschutz".to_string(), list);
        let doc = assembler.assemble(&candidates, &mut SeenKeys::new());
        assert_eq!(doc.sections[0].bullets.len(), 3);
        assert!(doc.sections[0].bullets[0].contains("Nummer 0"));
    }

    #[test]
    fn catch_all_only_when_enabled() {
        let rules = two_topic_rules();
        let mut candidates = BTreeMap::new();
        candidates.insert(
            "Sonstiges".to_string(),
            vec![candidate("Wir haben Ihre Nachricht weitergeleitet an die Fachabteilung.", 1)],
        );
        let off = DocumentAssembler::new(&rules, &Limits::default(), false).unwrap();
        assert!(off.assemble(&candidates, &mut SeenKeys::new()).sections.is_empty());
        let on = DocumentAssembler::new(&rules, &Limits::default(), true).unwrap();
        let doc = on.assemble(&candidates, &mut SeenKeys::new());
        assert_eq!(doc.sections.len(), 1);
        assert_eq!(doc.sections[0].title, "Sonstiges");
    }

    #[test]
    fn render_lays_out_frame_and_sections() {
        let doc = TopicDocument {
            header_lines: vec!["# KOPF".into()],
            facts_heading: "## FAKTEN".into(),
            reference_facts: vec!["Fakt eins.".into()],
            sections: vec![TopicSection {
                key: "A".into(),
                title: "Thema A".into(),
                bullets: vec!["Aussage.".into()],
            }],
            trailer_lines: vec!["Ende.".into()],
        };
        let rule = "=".repeat(72);
        let expected = format!(
            "# KOPF\n\n{rule}\n\n## FAKTEN\n\n- Fakt eins.\n\n## Thema A\n\n- Aussage.\n\n{rule}\n\nEnde.\n"
        );
        assert_eq!(render(&doc), expected);
    }

    #[test]
    fn reference_facts_bypass_filters() {
        let rules = RuleSet::default_rules();
        let assembler = DocumentAssembler::new(&rules, &Limits::default(), false).unwrap();
        let doc = assembler.assemble(&BTreeMap::new(), &mut SeenKeys::new());
        assert_eq!(doc.reference_facts, rules.document.reference_facts);
        assert!(render(&doc).contains("- Sitz: Registergericht Oldenburg HRA 205897."));
    }
}
