//! Mailbox loader — reads a directory of `.eml` files into `Message`s.

use std::path::{Path, PathBuf};

use mail_parser::{Address, MessageParser, PartType};
use tracing::{debug, info, warn};

use crate::error::LoadError;
use crate::mailbox::html::strip_html;
use crate::mailbox::message::{Mailbox, Message, collect_reference_ids, normalize_message_id};

/// Load every `.eml` file in `dir`, in sorted path order.
///
/// Files that cannot be read or parsed are skipped and counted; only a
/// missing or unreadable directory is an error.
pub async fn load_mailbox(dir: &Path) -> Result<Mailbox, LoadError> {
    if !dir.is_dir() {
        return Err(LoadError::MissingDirectory {
            path: dir.to_path_buf(),
        });
    }

    let paths = list_eml_files(dir).await?;
    let mut mailbox = Mailbox::default();
    mailbox.stats.files = paths.len();

    for path in paths {
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable message file");
                mailbox.stats.skipped += 1;
                continue;
            }
        };
        match parse_message(&bytes, &path) {
            Some(message) => mailbox.insert(message),
            None => {
                debug!(path = %path.display(), "Skipping unparseable message file");
                mailbox.stats.skipped += 1;
            }
        }
    }

    info!(
        dir = %dir.display(),
        files = mailbox.stats.files,
        with_id = mailbox.by_id.len(),
        without_id = mailbox.without_id.len(),
        skipped = mailbox.stats.skipped,
        "Mailbox loaded"
    );
    Ok(mailbox)
}

async fn list_eml_files(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let io_err = |source| LoadError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let path = entry.path();
        if path.is_file() && is_eml(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Whether a path has an `.eml` extension (any case).
pub fn is_eml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("eml"))
}

/// Parse one raw RFC 5322 message. Returns `None` if the bytes are not a
/// message at all.
pub fn parse_message(bytes: &[u8], source: &Path) -> Option<Message> {
    let parsed = MessageParser::default().parse(bytes)?;
    if parsed.headers().is_empty() {
        return None;
    }

    let id = parsed
        .message_id()
        .and_then(normalize_message_id)
        .or_else(|| raw_header(&parsed, "Message-ID").and_then(|v| normalize_message_id(&v)));

    let in_reply_to = raw_header(&parsed, "In-Reply-To").unwrap_or_default();
    let references = raw_header(&parsed, "References").unwrap_or_default();

    Some(Message {
        id,
        from: parsed.from().map(format_address).unwrap_or_default(),
        to: parsed.to().map(format_address).unwrap_or_default(),
        date: format_date(&parsed),
        subject: parsed.subject().unwrap_or_default().trim().to_string(),
        body: extract_text(&parsed),
        reference_ids: collect_reference_ids(&in_reply_to, &references),
        source: source.to_path_buf(),
    })
}

/// Raw (undecoded) value of the first header named `name`, trimmed.
fn raw_header(parsed: &mail_parser::Message<'_>, name: &str) -> Option<String> {
    let raw = parsed.raw_message();
    parsed
        .headers()
        .iter()
        .find(|h| h.name.as_str().eq_ignore_ascii_case(name))
        .and_then(|h| raw.get(h.offset_start as usize..h.offset_end as usize))
        .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `Name <address>` for the first address of a header, or just the address.
fn format_address(addr: &Address<'_>) -> String {
    let Some(first) = addr.first() else {
        return String::new();
    };
    match (first.name(), first.address()) {
        (Some(name), Some(address)) => format!("{name} <{address}>"),
        (None, Some(address)) => address.to_string(),
        (Some(name), None) => name.to_string(),
        (None, None) => String::new(),
    }
}

/// `YYYY-MM-DD HH:MM` in the header's own offset, or the raw header text.
fn format_date(parsed: &mail_parser::Message<'_>) -> String {
    let formatted = parsed.date().and_then(|d| {
        chrono::NaiveDate::from_ymd_opt(i32::from(d.year), u32::from(d.month), u32::from(d.day))
            .and_then(|date| {
                date.and_hms_opt(u32::from(d.hour), u32::from(d.minute), u32::from(d.second))
            })
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
    });
    formatted
        .or_else(|| raw_header(parsed, "Date"))
        .unwrap_or_default()
}

/// Body text: all plain-text parts, else all HTML parts stripped to text.
fn extract_text(parsed: &mail_parser::Message<'_>) -> String {
    let mut text_parts: Vec<&str> = Vec::new();
    let mut html_parts: Vec<&str> = Vec::new();
    for part in &parsed.parts {
        match &part.body {
            PartType::Text(text) => text_parts.push(text.as_ref()),
            PartType::Html(html) => html_parts.push(html.as_ref()),
            _ => {}
        }
    }
    if !text_parts.is_empty() {
        return text_parts.join("\n").replace("\r\n", "\n").trim().to_string();
    }
    if !html_parts.is_empty() {
        return strip_html(&html_parts.join("\n"));
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAIN: &str = "From: Reiseteam <reiseteam@usd.example>\r\n\
To: Kunde <kunde@example.com>\r\n\
Subject: Re: Stornierung\r\n\
Date: Sat, 15 Mar 2025 15:14:00 +0100\r\n\
Message-ID: <out-1@usd.example>\r\n\
In-Reply-To: <in-1@example.com>\r\n\
References: <root@example.com> <in-1@example.com>\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Guten Tag,\r\n\
die Stornierung ist nur per E-Mail möglich.\r\n";

    const HTML_ONLY: &str = "From: kunde@example.com\r\n\
Subject: Frage\r\n\
Message-ID: <html-1@example.com>\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<html><style>p{}</style><body><p>Wann kommen die Reiseunterlagen&nbsp;an?</p></body></html>\r\n";

    #[test]
    fn parses_headers_and_plain_body() {
        let msg = parse_message(PLAIN.as_bytes(), Path::new("a.eml")).unwrap();
        assert_eq!(msg.id.as_deref(), Some("out-1@usd.example"));
        assert_eq!(msg.from, "Reiseteam <reiseteam@usd.example>");
        assert_eq!(msg.to, "Kunde <kunde@example.com>");
        assert_eq!(msg.subject, "Re: Stornierung");
        assert_eq!(msg.date, "2025-03-15 15:14");
        assert!(msg.body.starts_with("Guten Tag,"));
        assert!(msg.body.contains("nur per E-Mail"));
        assert_eq!(msg.reference_ids, vec!["in-1@example.com", "root@example.com"]);
    }

    #[test]
    fn html_only_body_is_stripped() {
        let msg = parse_message(HTML_ONLY.as_bytes(), Path::new("b.eml")).unwrap();
        assert_eq!(msg.body, "Wann kommen die Reiseunterlagen an?");
        assert!(msg.reference_ids.is_empty());
    }

    #[test]
    fn unparseable_date_falls_back_to_raw() {
        let raw = "From: a@b.c\r\nDate: irgendwann im Mai\r\nMessage-ID: <d@b.c>\r\n\r\nText\r\n";
        let msg = parse_message(raw.as_bytes(), Path::new("c.eml")).unwrap();
        assert_eq!(msg.date, "irgendwann im Mai");
    }

    #[test]
    fn missing_message_id_is_absent() {
        let raw = "From: a@b.c\r\nSubject: Ohne ID\r\n\r\nText\r\n";
        let msg = parse_message(raw.as_bytes(), Path::new("d.eml")).unwrap();
        assert!(msg.id.is_none());
    }

    #[test]
    fn eml_extension_check() {
        assert!(is_eml(Path::new("x/mail.eml")));
        assert!(is_eml(Path::new("x/MAIL.EML")));
        assert!(!is_eml(Path::new("x/mail.txt")));
        assert!(!is_eml(Path::new("x/eml")));
    }

    #[tokio::test]
    async fn load_mailbox_skips_bad_files_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.eml"), PLAIN).unwrap();
        std::fs::write(dir.path().join("a.eml"), HTML_ONLY).unwrap();
        std::fs::write(dir.path().join("c.eml"), "").unwrap();
        std::fs::write(dir.path().join("notes.txt"), PLAIN).unwrap();

        let mailbox = load_mailbox(dir.path()).await.unwrap();
        assert_eq!(mailbox.stats.files, 3);
        assert_eq!(mailbox.stats.skipped, 1);
        assert_eq!(mailbox.by_id.len(), 2);
        assert!(mailbox.by_id.contains_key("html-1@example.com"));
        assert!(mailbox.by_id.contains_key("out-1@usd.example"));
    }

    #[tokio::test]
    async fn load_mailbox_missing_dir_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = load_mailbox(&missing).await.unwrap_err();
        assert!(matches!(err, LoadError::MissingDirectory { .. }));
    }
}
