//! Knowledge deduplicator and generalizer.
//!
//! Accepted sentences are grouped corpus-wide by their normalized key. A
//! group's representative is its longest surface form; its occurrence count
//! is the number of distinct pairs that produced it. Per-topic candidate
//! lists are derived from the groups, and the exclusion filter plus the
//! generalization table turn candidates into knowledge statements.

use std::collections::{BTreeSet, HashMap};

use regex::Regex;
use tracing::debug;

use crate::config::Limits;
use crate::error::RulesError;
use crate::pipeline::extractor::SentenceExtractor;
use crate::pipeline::rules::{Generalization, compile_patterns};
use crate::pipeline::types::{AnalyzedPair, CandidateSentence};
use crate::text::normalize_key;

/// All occurrences of one normalized sentence.
#[derive(Debug, Clone, PartialEq)]
pub struct SentenceGroup {
    pub key: String,
    pub representative: String,
    pub pair_ids: BTreeSet<usize>,
}

impl SentenceGroup {
    pub fn occurrences(&self) -> usize {
        self.pair_ids.len()
    }
}

/// Corpus-wide sentence groups in first-seen order.
#[derive(Debug, Default)]
pub struct SentenceIndex {
    groups: Vec<SentenceGroup>,
    by_key: HashMap<String, usize>,
    key_prefix: usize,
    min_key_chars: usize,
}

impl SentenceIndex {
    pub fn new(limits: &Limits) -> Self {
        Self {
            groups: Vec::new(),
            by_key: HashMap::new(),
            key_prefix: limits.key_prefix_chars,
            min_key_chars: limits.min_key_chars,
        }
    }

    /// Extract sentences from every pair, in pair order.
    pub fn build(pairs: &[AnalyzedPair], extractor: &SentenceExtractor, limits: &Limits) -> Self {
        let mut index = Self::new(limits);
        for pair in pairs {
            for sentence in extractor.extract(&pair.analysis_text) {
                index.add(pair.record.id, &sentence);
            }
        }
        debug!(groups = index.groups.len(), "Grouped knowledge sentences");
        index
    }

    /// Record one sentence for a pair. Returns `false` when its key is too
    /// short to be a statement.
    pub fn add(&mut self, pair_id: usize, sentence: &str) -> bool {
        let key = normalize_key(sentence, self.key_prefix);
        if key.chars().count() < self.min_key_chars {
            return false;
        }
        let sentence = sentence.trim();
        match self.by_key.get(&key) {
            Some(&idx) => {
                let group = &mut self.groups[idx];
                if sentence.chars().count() > group.representative.chars().count() {
                    group.representative = sentence.to_string();
                }
                group.pair_ids.insert(pair_id);
            }
            None => {
                self.by_key.insert(key.clone(), self.groups.len());
                self.groups.push(SentenceGroup {
                    key,
                    representative: sentence.to_string(),
                    pair_ids: BTreeSet::from([pair_id]),
                });
            }
        }
        true
    }

    pub fn groups(&self) -> &[SentenceGroup] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Groups produced by two or more pairs, most frequent first.
    pub fn repeated(&self) -> Vec<&SentenceGroup> {
        let mut repeated: Vec<&SentenceGroup> =
            self.groups.iter().filter(|g| g.occurrences() >= 2).collect();
        repeated.sort_by(|a, b| b.occurrences().cmp(&a.occurrences()));
        repeated
    }

    /// Ranked candidates for one topic: the representative of every group
    /// touching a pair with that topic, most frequent first, capped.
    pub fn candidates_for(
        &self,
        topic: &str,
        pairs: &[AnalyzedPair],
        cap: usize,
    ) -> Vec<CandidateSentence> {
        let topic_pairs: BTreeSet<usize> = pairs
            .iter()
            .filter(|p| p.topics.iter().any(|t| t == topic))
            .map(|p| p.record.id)
            .collect();

        let mut candidates: Vec<CandidateSentence> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for group in &self.groups {
            if group.pair_ids.is_disjoint(&topic_pairs) {
                continue;
            }
            let key = normalize_key(&group.representative, self.key_prefix);
            let occurrences = group.occurrences();
            match positions.get(&key) {
                Some(&pos) => {
                    if candidates[pos].occurrences < occurrences {
                        candidates[pos].sentence = group.representative.clone();
                        candidates[pos].occurrences = occurrences;
                    }
                }
                None => {
                    positions.insert(key.clone(), candidates.len());
                    candidates.push(CandidateSentence {
                        key,
                        sentence: group.representative.clone(),
                        occurrences,
                    });
                }
            }
        }
        candidates.sort_by(|a, b| b.occurrences.cmp(&a.occurrences));
        candidates.truncate(cap);
        candidates
    }
}

/// Case-specific content that must never become a knowledge statement.
#[derive(Debug, Clone)]
pub struct Exclusion {
    patterns: Vec<Regex>,
    min_chars: usize,
}

impl Exclusion {
    pub fn new(patterns: &[String], min_chars: usize) -> Result<Self, RulesError> {
        Ok(Self {
            patterns: compile_patterns("exclusion_patterns", patterns)?,
            min_chars,
        })
    }

    /// True for statements that are too short or match an exclusion pattern.
    pub fn is_excluded(&self, statement: &str) -> bool {
        let s = statement.trim().to_lowercase();
        s.chars().count() < self.min_chars || self.patterns.iter().any(|p| p.is_match(&s))
    }
}

/// Exact-text lookup from case-specific phrasing to general wording.
#[derive(Debug, Clone, Default)]
pub struct Generalizer {
    table: HashMap<String, String>,
}

impl Generalizer {
    pub fn new(entries: &[Generalization]) -> Self {
        let mut table = HashMap::with_capacity(entries.len());
        for entry in entries {
            // First entry wins for duplicated source phrasings.
            table
                .entry(entry.from.trim().to_string())
                .or_insert_with(|| entry.to.trim().to_string());
        }
        Self { table }
    }

    /// The generalized wording, or the trimmed input when no entry applies.
    pub fn apply(&self, statement: &str) -> String {
        let trimmed = statement.trim();
        self.table
            .get(trimmed)
            .cloned()
            .unwrap_or_else(|| trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::rules::RuleSet;
    use crate::pipeline::types::PairRecord;

    fn analyzed(id: usize, topics: &[&str], text: &str) -> AnalyzedPair {
        AnalyzedPair {
            record: PairRecord {
                id,
                subject: String::new(),
                inbound_date: String::new(),
                outbound_date: String::new(),
                customer: String::new(),
                inbound_raw: String::new(),
                outbound_raw: text.into(),
                outbound_clean: text.into(),
            },
            topics: topics.iter().map(|t| t.to_string()).collect(),
            analysis_text: text.into(),
        }
    }

    #[test]
    fn groups_share_key_and_count_distinct_pairs() {
        let mut index = SentenceIndex::new(&Limits::default());
        index.add(1, "Die Reiseunterlagen kommen per Post.");
        index.add(1, "die reiseunterlagen kommen per post");
        index.add(2, "Die Reiseunterlagen kommen per Post!!");
        assert_eq!(index.len(), 1);
        let group = &index.groups()[0];
        assert_eq!(group.occurrences(), 2);
        assert_eq!(group.representative, "Die Reiseunterlagen kommen per Post!!");
    }

    #[test]
    fn representative_tie_keeps_first() {
        let mut index = SentenceIndex::new(&Limits::default());
        index.add(1, "Die Reiseunterlagen kommen per Post.");
        index.add(2, "Die Reiseunterlagen kommen per Post!");
        assert_eq!(index.groups()[0].representative, "Die Reiseunterlagen kommen per Post.");
    }

    #[test]
    fn short_keys_are_dropped() {
        let mut index = SentenceIndex::new(&Limits::default());
        assert!(!index.add(1, "Alles klar, danke!"));
        assert!(index.is_empty());
    }

    #[test]
    fn repeated_lists_multi_pair_groups_by_frequency() {
        let mut index = SentenceIndex::new(&Limits::default());
        index.add(1, "Erster Satz mit genug Zeichen für einen Schlüssel.");
        index.add(1, "Zweiter Satz mit genug Zeichen für einen Schlüssel.");
        index.add(2, "Zweiter Satz mit genug Zeichen für einen Schlüssel.");
        index.add(3, "Zweiter Satz mit genug Zeichen für einen Schlüssel.");
        index.add(2, "Erster Satz mit genug Zeichen für einen Schlüssel.");
        index.add(4, "Dritter Satz mit genug Zeichen für einen Schlüssel.");
        let repeated = index.repeated();
        assert_eq!(repeated.len(), 2);
        assert_eq!(repeated[0].occurrences(), 3);
        assert!(repeated[0].representative.starts_with("Zweiter"));
        assert!(repeated[1].representative.starts_with("Erster"));
    }

    #[test]
    fn candidates_follow_topic_membership_and_frequency() {
        let pairs = vec![
            analyzed(1, &["A"], ""),
            analyzed(2, &["A", "B"], ""),
            analyzed(3, &["B"], ""),
        ];
        let mut index = SentenceIndex::new(&Limits::default());
        index.add(1, "Nur das Thema A kennt diesen Satz hier.");
        index.add(2, "Beide Themen teilen sich diesen Satz hier.");
        index.add(3, "Beide Themen teilen sich diesen Satz hier.");

        let a = index.candidates_for("A", &pairs, 35);
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].sentence, "Beide Themen teilen sich diesen Satz hier.");
        assert_eq!(a[0].occurrences, 2);
        assert_eq!(a[1].occurrences, 1);

        let b = index.candidates_for("B", &pairs, 35);
        assert_eq!(b.len(), 1);
        assert!(index.candidates_for("C", &pairs, 35).is_empty());
        assert_eq!(index.candidates_for("A", &pairs, 1).len(), 1);
    }

    #[test]
    fn build_uses_extractor_on_analysis_text() {
        let rules = RuleSet::default_rules();
        let limits = Limits::default();
        let extractor = SentenceExtractor::new(&rules.extractor, &limits).unwrap();
        let text = "Wir versenden keine Gutscheine an Privatpersonen.\nDanke!";
        let pairs = vec![analyzed(1, &["A"], text), analyzed(2, &["A"], text)];
        let index = SentenceIndex::build(&pairs, &extractor, &limits);
        assert_eq!(index.len(), 1);
        assert_eq!(index.groups()[0].occurrences(), 2);
    }

    #[test]
    fn exclusion_rejects_short_and_case_specific() {
        let rules = RuleSet::default_rules();
        let exclusion = Exclusion::new(&rules.exclusion_patterns, 30).unwrap();
        assert!(exclusion.is_excluded("Zu kurz für Wissen."));
        assert!(exclusion.is_excluded("Ihre Buchungsnummer 4711 wurde storniert, wie gewünscht."));
        assert!(exclusion.is_excluded("Die Rückzahlung von 120 € erfolgt in den nächsten Tagen."));
        assert!(exclusion.is_excluded("Hallo Frau Beispiel, vielen Dank für Ihre Nachricht."));
        assert!(!exclusion.is_excluded(
            "Die Detailplanung erfolgt etwa vierzehn Tage vor Reisebeginn."
        ));
    }

    #[test]
    fn exclusion_keeps_general_mentions_of_persons() {
        let rules = RuleSet::default_rules();
        let exclusion = Exclusion::new(&rules.exclusion_patterns, 30).unwrap();
        assert!(!exclusion.is_excluded("Die Reise kann auch für die ganze Familie gebucht werden."));
        assert!(!exclusion.is_excluded("Bei Herr und Frau gleicher Adresse genügt eine Anmeldung."));
        assert!(exclusion.is_excluded("Vielen Dank, liebe Familie Beispiel, für Ihre Geduld."));
    }

    #[test]
    fn generalization_sources_survive_sentence_split() {
        let rules = RuleSet::default_rules();
        let extractor = SentenceExtractor::new(&rules.extractor, &Limits::default()).unwrap();
        for entry in &rules.generalizations {
            assert_eq!(extractor.split(&entry.from), vec![entry.from.clone()]);
        }
    }

    #[test]
    fn generalizer_maps_exact_trimmed_text() {
        let generalizer = Generalizer::new(&RuleSet::default_rules().generalizations);
        let input = "  Wir haben die Sperrung der Daten, für weitere Übersendungen von Werbung und Angeboten aus unserem Unternehmen, vorgenommen. ";
        assert_eq!(
            generalizer.apply(input),
            "Die Sperrung der Daten für weitere Übersendungen von Werbung und Angeboten wird auf Wunsch vorgenommen."
        );
        assert_eq!(generalizer.apply(" Unbekannter Satz. "), "Unbekannter Satz.");
    }
}
