//! Topic classifier — non-exclusive keyword assignment.

use crate::pipeline::rules::TopicRule;
use crate::pipeline::types::PairRecord;
use crate::text::truncate_chars;

/// Assigns every topic whose keywords occur in a pair's text.
#[derive(Debug, Clone)]
pub struct TopicClassifier {
    /// (topic key, lowercase keywords) in rule order.
    topics: Vec<(String, Vec<String>)>,
    catch_all: String,
    prefix_chars: usize,
}

impl TopicClassifier {
    pub fn new(topics: &[TopicRule], catch_all: &str, prefix_chars: usize) -> Self {
        Self {
            topics: topics
                .iter()
                .map(|t| {
                    let keywords = t
                        .keywords
                        .iter()
                        .map(|k| k.to_lowercase())
                        .filter(|k| !k.is_empty())
                        .collect();
                    (t.key.clone(), keywords)
                })
                .collect(),
            catch_all: catch_all.to_string(),
            prefix_chars,
        }
    }

    /// Lowercased text searched for keywords: subject, inquiry prefix,
    /// cleaned reply and raw reply prefix.
    pub fn classification_text(&self, record: &PairRecord) -> String {
        [
            record.subject.as_str(),
            truncate_chars(&record.inbound_raw, self.prefix_chars),
            record.outbound_clean.as_str(),
            truncate_chars(&record.outbound_raw, self.prefix_chars),
        ]
        .join(" ")
        .to_lowercase()
    }

    /// Topics for a pair in rule order; the catch-all when nothing matches.
    pub fn classify(&self, record: &PairRecord) -> Vec<String> {
        let text = self.classification_text(record);
        let mut assigned: Vec<String> = self
            .topics
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|k| text.contains(k.as_str())))
            .map(|(key, _)| key.clone())
            .collect();
        if assigned.is_empty() {
            assigned.push(self.catch_all.clone());
        }
        assigned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::rules::RuleSet;

    fn record(subject: &str, inbound: &str, clean: &str, raw: &str) -> PairRecord {
        PairRecord {
            id: 1,
            subject: subject.into(),
            inbound_date: String::new(),
            outbound_date: String::new(),
            customer: String::new(),
            inbound_raw: inbound.into(),
            outbound_raw: raw.into(),
            outbound_clean: clean.into(),
        }
    }

    fn classifier() -> TopicClassifier {
        let rules = RuleSet::default_rules();
        TopicClassifier::new(&rules.topics, &rules.catch_all, 2000)
    }

    #[test]
    fn assigns_multiple_topics() {
        let topics = classifier().classify(&record(
            "Stornierung meiner Reise",
            "Bekomme ich eine Rückerstattung?",
            "",
            "",
        ));
        assert_eq!(topics, vec!["Stornierung_Rücktritt", "Zahlung_Rückerstattung"]);
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        let topics = classifier().classify(&record("", "", "Die SPERRUNG DER DATEN erfolgt.", ""));
        assert_eq!(topics, vec!["Werbung_Datenschutz"]);
    }

    #[test]
    fn unmatched_pair_gets_catch_all() {
        let topics = classifier().classify(&record("Hallo", "Wie geht es?", "Gut.", "Gut."));
        assert_eq!(topics, vec!["Sonstiges"]);
    }

    #[test]
    fn only_prefix_of_raw_bodies_is_searched() {
        let classifier = TopicClassifier::new(&RuleSet::default_rules().topics, "Sonstiges", 10);
        let inbound = format!("{}versicherung", "x".repeat(20));
        assert_eq!(
            classifier.classify(&record("", &inbound, "", "")),
            vec!["Sonstiges"]
        );
    }

    #[test]
    fn topics_follow_rule_order() {
        let topics = classifier().classify(&record(
            "",
            "",
            "Versicherung, Gutschein und Telefon",
            "",
        ));
        assert_eq!(
            topics,
            vec!["Kontakt_Öffnungszeiten", "Gutschein_Partner", "Versicherung"]
        );
    }
}
