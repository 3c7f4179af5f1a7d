//! Shared types for the distillation pipeline.

use serde::{Deserialize, Serialize};

use crate::mailbox::Message;

// ── Pairing ─────────────────────────────────────────────────────────

/// A customer inquiry matched with the support reply that references it.
#[derive(Debug, Clone)]
pub struct Pair {
    /// 1-based position in matching order.
    pub sequence: usize,
    pub inbound: Message,
    pub outbound: Message,
}

/// Everything the thread matcher produced, including the residual.
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    pub pairs: Vec<Pair>,
    /// Outbound messages (with an id, passing the domain filter) that
    /// referenced no available inbound message.
    pub unmatched_outbound: Vec<Message>,
    /// Inbound messages with an id that no reply consumed.
    pub unmatched_inbound: Vec<Message>,
    /// Inbound messages without an id.
    pub inbound_without_id: Vec<Message>,
    /// Outbound messages without an id.
    pub outbound_without_id: usize,
    /// Outbound messages dropped by the support-domain filter.
    pub outbound_excluded: usize,
}

// ── Pair records ────────────────────────────────────────────────────

/// Record-per-pair export; also the unit every analysis stage works on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairRecord {
    pub id: usize,
    pub subject: String,
    pub inbound_date: String,
    pub outbound_date: String,
    /// Sender of the inquiry.
    pub customer: String,
    pub inbound_raw: String,
    pub outbound_raw: String,
    pub outbound_clean: String,
}

/// A pair record after classification.
#[derive(Debug, Clone)]
pub struct AnalyzedPair {
    pub record: PairRecord,
    /// Never empty; the catch-all label when no keyword matched.
    pub topics: Vec<String>,
    /// Cleaned reply, or a raw prefix when cleaning left nothing.
    pub analysis_text: String,
}

// ── Knowledge ───────────────────────────────────────────────────────

/// A deduplicated sentence with the number of pairs that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSentence {
    #[serde(skip)]
    pub key: String,
    /// Longest surface form among all sentences sharing the key.
    pub sentence: String,
    /// Distinct pairs contributing a sentence with this key.
    pub occurrences: usize,
}

/// One heading and its bullets.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicSection {
    pub key: String,
    pub title: String,
    pub bullets: Vec<String>,
}

/// The assembled knowledge document.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicDocument {
    pub header_lines: Vec<String>,
    pub facts_heading: String,
    pub reference_facts: Vec<String>,
    /// Non-empty sections in topic order.
    pub sections: Vec<TopicSection>,
    pub trailer_lines: Vec<String>,
}

impl TopicDocument {
    /// Total bullets across all sections (reference facts excluded).
    pub fn statement_count(&self) -> usize {
        self.sections.iter().map(|s| s.bullets.len()).sum()
    }
}
