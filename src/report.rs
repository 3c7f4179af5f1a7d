//! Markdown audit report.

use std::collections::BTreeMap;

use crate::config::Limits;
use crate::mailbox::Mailbox;
use crate::pipeline::dedup::SentenceGroup;
use crate::pipeline::types::{AnalyzedPair, CandidateSentence, MatchOutcome};
use crate::text::truncate_chars;

/// Repeated statements are shortened to this many characters.
const REPEATED_PREVIEW_CHARS: usize = 120;
/// Candidates are shortened to this many characters.
const CANDIDATE_PREVIEW_CHARS: usize = 200;

/// Load counters of one mailbox.
#[derive(Debug, Clone, PartialEq)]
pub struct MailboxSummary {
    pub label: String,
    pub files: usize,
    pub with_id: usize,
    pub without_id: usize,
    pub skipped: usize,
    pub duplicate_ids: usize,
}

impl MailboxSummary {
    pub fn of(label: &str, mailbox: &Mailbox) -> Self {
        Self {
            label: label.to_string(),
            files: mailbox.stats.files,
            with_id: mailbox.by_id.len(),
            without_id: mailbox.without_id.len(),
            skipped: mailbox.stats.skipped,
            duplicate_ids: mailbox.stats.duplicate_ids,
        }
    }
}

/// Everything the report is rendered from.
pub struct ReportInput<'a> {
    /// Empty when the run started from a pairs file.
    pub mailboxes: Vec<MailboxSummary>,
    /// `None` when the run started from a pairs file.
    pub outcome: Option<&'a MatchOutcome>,
    pub pairs: &'a [AnalyzedPair],
    pub repeated: Vec<&'a SentenceGroup>,
    pub candidates: &'a BTreeMap<String, Vec<CandidateSentence>>,
    pub statements: usize,
}

/// Pairs per topic, most frequent first (ties by topic label).
pub fn topic_counts(pairs: &[AnalyzedPair]) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for pair in pairs {
        for topic in &pair.topics {
            *counts.entry(topic.as_str()).or_default() += 1;
        }
    }
    let mut counts: Vec<(String, usize)> =
        counts.into_iter().map(|(t, n)| (t.to_string(), n)).collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

fn preview(text: &str, max: usize) -> String {
    let short = truncate_chars(text, max);
    if short.len() < text.len() {
        format!("{short}…")
    } else {
        short.to_string()
    }
}

/// Render the report.
pub fn render_report(input: &ReportInput<'_>, limits: &Limits) -> String {
    let mut lines: Vec<String> = vec!["# Knowledge distillation report".into(), String::new()];

    if !input.mailboxes.is_empty() {
        lines.push("## Mailboxes".into());
        lines.push(String::new());
        lines.push("| Mailbox | Files | With Message-ID | Without Message-ID | Skipped | Duplicate ids |".into());
        lines.push("|---|---|---|---|---|---|".into());
        for m in &input.mailboxes {
            lines.push(format!(
                "| {} | {} | {} | {} | {} | {} |",
                m.label, m.files, m.with_id, m.without_id, m.skipped, m.duplicate_ids
            ));
        }
        lines.push(String::new());
    }

    lines.push("## Pairing".into());
    lines.push(String::new());
    lines.push(format!("- Pairs: {}", input.pairs.len()));
    if let Some(outcome) = input.outcome {
        lines.push(format!(
            "- Outbound excluded by support domain: {}",
            outcome.outbound_excluded
        ));
        lines.push(format!(
            "- Outbound without Message-ID: {}",
            outcome.outbound_without_id
        ));
        lines.push(format!(
            "- Outbound without match: {}",
            outcome.unmatched_outbound.len()
        ));
        lines.push(format!(
            "- Inbound without reply: {}",
            outcome.unmatched_inbound.len()
        ));
        lines.push(format!(
            "- Inbound without Message-ID: {}",
            outcome.inbound_without_id.len()
        ));
    }
    lines.push(String::new());

    lines.push("## Topics".into());
    lines.push(String::new());
    lines.push("| Topic | Pairs |".into());
    lines.push("|---|---|".into());
    for (topic, count) in topic_counts(input.pairs) {
        lines.push(format!("| {topic} | {count} |"));
    }
    lines.push(String::new());

    lines.push("## Repeated statements (2 or more pairs)".into());
    lines.push(String::new());
    for group in input.repeated.iter().take(limits.report_repeated) {
        lines.push(format!(
            "- **{}×** {}",
            group.occurrences(),
            preview(&group.representative, REPEATED_PREVIEW_CHARS)
        ));
    }
    lines.push(String::new());

    lines.push("## Knowledge candidates per topic".into());
    lines.push(String::new());
    let mut topics: Vec<(&String, &Vec<CandidateSentence>)> = input.candidates.iter().collect();
    topics.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
    for (topic, candidates) in topics {
        lines.push(format!("### {topic}"));
        lines.push(String::new());
        for candidate in candidates.iter().take(limits.report_candidates) {
            lines.push(format!(
                "- ({}×) {}",
                candidate.occurrences,
                preview(&candidate.sentence, CANDIDATE_PREVIEW_CHARS)
            ));
        }
        lines.push(String::new());
    }

    lines.push("## Document".into());
    lines.push(String::new());
    lines.push(format!("- Statements emitted: {}", input.statements));

    let mut text = lines.join("\n");
    text.push('\n');
    text
}
