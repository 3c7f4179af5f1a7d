//! Parsed message records and message-identifier helpers.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static ANGLE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("angle id pattern"));

/// A single parsed email. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Normalized Message-ID, `None` when the header is missing or blank.
    pub id: Option<String>,
    pub from: String,
    pub to: String,
    /// `YYYY-MM-DD HH:MM`, or the raw `Date` header when it does not parse.
    pub date: String,
    pub subject: String,
    /// Plain-text body (HTML-only messages are stripped to text).
    pub body: String,
    /// In-Reply-To ids followed by References ids, deduplicated in order.
    pub reference_ids: Vec<String>,
    /// File the message was read from.
    pub source: PathBuf,
}

impl Message {
    /// Whether `From` contains the given (lowercase) domain.
    pub fn is_from_domain(&self, domain: &str) -> bool {
        self.from.to_lowercase().contains(domain)
    }
}

/// Counters collected while loading a mailbox directory.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadStats {
    /// `.eml` files found.
    pub files: usize,
    /// Files that could not be read or parsed.
    pub skipped: usize,
    /// Messages whose id was already taken by an earlier file.
    pub duplicate_ids: usize,
}

/// All messages of one mailbox directory.
#[derive(Debug, Clone, Default)]
pub struct Mailbox {
    /// Messages with a usable id, ordered by id.
    pub by_id: BTreeMap<String, Message>,
    /// Messages without an id; they can never be matched.
    pub without_id: Vec<Message>,
    pub stats: LoadStats,
}

impl Mailbox {
    /// Total number of loaded messages.
    pub fn len(&self) -> usize {
        self.by_id.len() + self.without_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a message, routing it by id. The first message for an id wins.
    pub fn insert(&mut self, message: Message) {
        match message.id.clone() {
            Some(id) => {
                if self.by_id.contains_key(&id) {
                    self.stats.duplicate_ids += 1;
                    tracing::debug!(id = %id, path = %message.source.display(), "Duplicate Message-ID, keeping first");
                } else {
                    self.by_id.insert(id, message);
                }
            }
            None => self.without_id.push(message),
        }
    }
}

/// Normalize a Message-ID: trim, strip one pair of angle brackets, trim.
/// Returns `None` for blank ids.
pub fn normalize_message_id(raw: &str) -> Option<String> {
    let mut id = raw.trim();
    if let Some(inner) = id.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
        id = inner.trim();
    }
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Extract every `<...>` id from an In-Reply-To or References header.
pub fn parse_message_ids(header: &str) -> Vec<String> {
    ANGLE_ID
        .find_iter(header)
        .filter_map(|m| normalize_message_id(m.as_str()))
        .collect()
}

/// Combine In-Reply-To and References ids, in that priority, without
/// repeating an id.
pub fn collect_reference_ids(in_reply_to: &str, references: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for id in parse_message_ids(in_reply_to)
        .into_iter()
        .chain(parse_message_ids(references))
    {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: Option<&str>) -> Message {
        Message {
            id: id.map(String::from),
            from: "Kunde <kunde@example.com>".into(),
            to: "support@example.org".into(),
            date: "2025-03-15 10:00".into(),
            subject: "Frage".into(),
            body: "Text".into(),
            reference_ids: vec![],
            source: PathBuf::from("a.eml"),
        }
    }

    #[test]
    fn normalize_strips_brackets_and_whitespace() {
        assert_eq!(
            normalize_message_id("  <abc@host>  ").as_deref(),
            Some("abc@host")
        );
        assert_eq!(normalize_message_id("abc@host").as_deref(), Some("abc@host"));
        assert_eq!(normalize_message_id("< abc@host >").as_deref(), Some("abc@host"));
    }

    #[test]
    fn normalize_blank_is_absent() {
        assert_eq!(normalize_message_id(""), None);
        assert_eq!(normalize_message_id("   "), None);
        assert_eq!(normalize_message_id("<>"), None);
    }

    #[test]
    fn parse_ids_from_references() {
        let ids = parse_message_ids("<a@x> <b@y>\r\n\t<c@z>");
        assert_eq!(ids, vec!["a@x", "b@y", "c@z"]);
    }

    #[test]
    fn parse_ids_ignores_bare_text() {
        assert!(parse_message_ids("no ids here").is_empty());
    }

    #[test]
    fn reference_ids_prefer_in_reply_to_and_dedupe() {
        let ids = collect_reference_ids("<b@x>", "<a@x> <b@x> <c@x>");
        assert_eq!(ids, vec!["b@x", "a@x", "c@x"]);
    }

    #[test]
    fn mailbox_routes_by_id_and_keeps_first() {
        let mut mailbox = Mailbox::default();
        mailbox.insert(message(Some("one@x")));
        let mut dup = message(Some("one@x"));
        dup.subject = "Later".into();
        mailbox.insert(dup);
        mailbox.insert(message(None));

        assert_eq!(mailbox.by_id.len(), 1);
        assert_eq!(mailbox.by_id["one@x"].subject, "Frage");
        assert_eq!(mailbox.without_id.len(), 1);
        assert_eq!(mailbox.stats.duplicate_ids, 1);
        assert_eq!(mailbox.len(), 2);
    }

    #[test]
    fn domain_check_is_case_insensitive() {
        let msg = message(Some("x@y"));
        assert!(msg.is_from_domain("example.com"));
        assert!(!msg.is_from_domain("other.org"));
    }
}
