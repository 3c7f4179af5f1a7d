//! Pair export and import.
//!
//! The record-per-pair export is written in two forms: `pairs.json` for
//! tools and `pairs.txt` for people. `pairs.txt` can be read back with
//! [`parse_pairs_text`], which also understands the German labels of
//! older exports. `knowledge_full.txt` adds the unmatched residual.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tokio::fs;

use crate::config::Limits;
use crate::error::OutputError;
use crate::mailbox::Message;
use crate::pipeline::cleaner::AnswerCleaner;
use crate::pipeline::types::{MatchOutcome, Pair, PairRecord};
use crate::text::truncate_chars;

/// Placeholder written for empty bodies.
const NO_TEXT: &str = "(no text)";

const SEPARATOR_WIDTH: usize = 80;

static BLOCK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^---[ \t]*(?:pair|paar)[ \t]+(\d+)[ \t]*---[ \t]*$").expect("block header pattern")
});

static SUBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^(?:subject|betreff):[ \t]*(.*)$").expect("subject pattern")
});

static INBOUND_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^(?:date \(inbound\)|datum \(eingang\)):[ \t]*([^|\n]*)").expect("inbound date pattern")
});

static CUSTOMER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)\|[ \t]*(?:from|von):[ \t]*(.*)$").expect("customer pattern")
});

static OUTBOUND_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^(?:date \(reply\)|datum \(antwort\)):[ \t]*(.*)$").expect("reply date pattern")
});

static INQUIRY_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^\[[ \t]*(?:inquiry|anfrage[ \t]*/[ \t]*kunde)[ \t]*\][ \t]*$").expect("inquiry marker")
});

static REPLY_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^\[[ \t]*(?:reply|antwort[ \t]*/[ \t]*reiseteam)[ \t]*\][ \t]*$").expect("reply marker")
});

static CLEANED_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^\[[ \t]*reply,[ \t]*cleaned[ \t]*\][ \t]*$").expect("cleaned marker")
});

/// Build the export record of a matched pair.
pub fn build_record(pair: &Pair, cleaner: &AnswerCleaner, limits: &Limits) -> PairRecord {
    PairRecord {
        id: pair.sequence,
        subject: pair.inbound.subject.clone(),
        inbound_date: pair.inbound.date.clone(),
        outbound_date: pair.outbound.date.clone(),
        customer: pair.inbound.from.clone(),
        inbound_raw: truncate_chars(&pair.inbound.body, limits.export_inbound_chars).to_string(),
        outbound_raw: truncate_chars(&pair.outbound.body, limits.export_outbound_chars).to_string(),
        outbound_clean: cleaner.clean(&pair.outbound.body),
    }
}

fn body_or_placeholder(body: &str) -> &str {
    if body.trim().is_empty() { NO_TEXT } else { body }
}

fn write_record(out: &mut String, record: &PairRecord) {
    out.push_str(&format!("--- Pair {} ---\n", record.id));
    out.push_str(&format!("Subject: {}\n", record.subject));
    out.push_str(&format!(
        "Date (inbound): {} | From: {}\n",
        record.inbound_date, record.customer
    ));
    out.push_str(&format!("Date (reply): {}\n", record.outbound_date));
    out.push_str("\n[ Inquiry ]\n");
    out.push_str(body_or_placeholder(&record.inbound_raw));
    out.push_str("\n\n[ Reply ]\n");
    out.push_str(body_or_placeholder(&record.outbound_raw));
    out.push_str("\n\n[ Reply, cleaned ]\n");
    out.push_str(body_or_placeholder(&record.outbound_clean));
    out.push_str("\n\n");
}

fn section_banner(out: &mut String, title: &str) {
    let rule = "=".repeat(SEPARATOR_WIDTH);
    out.push_str(&format!("\n{rule}\n{title}\n{rule}\n\n"));
}

/// Render `pairs.txt`.
pub fn render_pairs_text(records: &[PairRecord]) -> String {
    let mut out = String::new();
    out.push_str(&format!("SUPPORT PAIRS ({})\n", records.len()));
    out.push_str(&"=".repeat(SEPARATOR_WIDTH));
    out.push_str("\n\n");
    for record in records {
        write_record(&mut out, record);
    }
    out
}

/// Render `knowledge_full.txt`: every pair plus the unmatched residual.
pub fn render_full_dump(records: &[PairRecord], outcome: &MatchOutcome, limits: &Limits) -> String {
    let mut out = String::new();
    out.push_str("SUPPORT ARCHIVE (complete)\n");
    out.push_str(&"=".repeat(SEPARATOR_WIDTH));
    out.push_str("\n\n");
    for record in records {
        write_record(&mut out, record);
    }

    let residual = |message: &Message| {
        body_or_placeholder(truncate_chars(&message.body, limits.residual_body_chars)).to_string()
    };

    section_banner(&mut out, "OUTBOUND WITHOUT MATCHING INBOUND");
    for message in &outcome.unmatched_outbound {
        out.push_str(&format!("--- Subject: {} | {} ---\n", message.subject, message.date));
        out.push_str(&residual(message));
        out.push_str("\n\n");
    }

    section_banner(&mut out, "INBOUND WITHOUT REPLY");
    for message in &outcome.unmatched_inbound {
        out.push_str(&format!(
            "--- Subject: {} | {} | From: {} ---\n",
            message.subject, message.date, message.from
        ));
        out.push_str(&residual(message));
        out.push_str("\n\n");
    }
    for message in &outcome.inbound_without_id {
        out.push_str(&format!(
            "--- [no Message-ID] Subject: {} | {} ---\n",
            message.subject, message.date
        ));
        out.push_str(&residual(message));
        out.push_str("\n\n");
    }
    out
}

/// Parse a `pairs.txt` export back into records, sorted by id.
///
/// Cleaned replies are not read back; callers re-run the cleaner so that
/// rule changes take effect.
pub fn parse_pairs_text(content: &str) -> Vec<PairRecord> {
    let content = content.replace("\r\n", "\n");
    let headers: Vec<(usize, usize, usize)> = BLOCK_HEADER
        .captures_iter(&content)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let id = caps[1].parse().ok()?;
            Some((id, whole.start(), whole.end()))
        })
        .collect();

    let mut records: Vec<PairRecord> = headers
        .iter()
        .enumerate()
        .map(|(i, &(id, _, body_start))| {
            let end = headers.get(i + 1).map_or(content.len(), |next| next.1);
            parse_block(id, &content[body_start..end])
        })
        .collect();
    records.sort_by_key(|r| r.id);
    records
}

fn parse_block(id: usize, block: &str) -> PairRecord {
    let inquiry = INQUIRY_MARKER.find(block);
    let reply = REPLY_MARKER.find(block);
    let head_end = inquiry.or(reply).map_or(block.len(), |m| m.start());
    let head = &block[..head_end];

    let field = |re: &Regex| {
        re.captures(head)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default()
    };

    let inbound_raw = match (inquiry, reply) {
        (Some(i), Some(r)) if r.start() > i.end() => section_text(&block[i.end()..r.start()]),
        (Some(i), None) => section_text(&block[i.end()..]),
        _ => String::new(),
    };
    let outbound_raw = reply
        .map(|r| {
            let rest = &block[r.end()..];
            let end = CLEANED_MARKER.find(rest).map_or(rest.len(), |m| m.start());
            section_text(&rest[..end])
        })
        .unwrap_or_default();

    PairRecord {
        id,
        subject: field(&SUBJECT),
        inbound_date: field(&INBOUND_DATE),
        outbound_date: field(&OUTBOUND_DATE),
        customer: field(&CUSTOMER),
        inbound_raw,
        outbound_raw,
        outbound_clean: String::new(),
    }
}

/// Section body without surrounding blank lines and placeholders.
fn section_text(raw: &str) -> String {
    let text = raw.trim();
    if text == NO_TEXT || text.eq_ignore_ascii_case("(kein text)") {
        String::new()
    } else {
        text.to_string()
    }
}

/// Replace `path` with `contents` via a sibling temp file and a rename.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), OutputError> {
    let io_err = |source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    fs::write(&tmp, contents).await.map_err(io_err)?;
    fs::rename(&tmp, path).await.map_err(io_err)?;
    Ok(())
}

/// Write a value as pretty JSON.
pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), OutputError> {
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    write_atomic(path, json.as_bytes()).await
}
