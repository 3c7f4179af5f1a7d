//! Answer cleaner — strips quoted inquiries, forwarded headers and
//! signature blocks from support replies.
//!
//! Cleaning is an ordered list of independent rules applied to the body:
//!
//! 1. quote markers ("X hat am 15.03.2025 ... geschrieben:") cut to the end
//! 2. "original message" separators cut to the end
//! 3. forwarded From/To/Date runs are removed up to the next blank line
//! 4. a closing phrase followed by the signature marker cuts to the end
//! 5. if the legal-registration string is still present, the text is cut
//!    back to the nearest preceding greeting or contact line
//!
//! Whitespace is normalized afterwards and the result is truncated.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::RulesError;
use crate::pipeline::rules::{CleanerRules, compile_patterns};
use crate::text::truncate_chars;

static BLANK_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("blank run pattern"));
static HORIZONTAL_WS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("horizontal whitespace pattern"));
static LINE_EDGE_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" ?\n ?").expect("line edge pattern"));

/// What a cleaning rule does when its trigger matches.
#[derive(Debug, Clone)]
pub enum CleanAction {
    /// Drop everything from the first match onward.
    TruncateAt(Regex),
    /// Replace every match (capture references allowed).
    Replace { regex: Regex, replacement: String },
    /// If `marker` occurs, cut back to the last `backoff` marker before it.
    LegalBackoff { marker: String, backoff: Vec<String> },
}

/// One named, order-sensitive cleaning step.
#[derive(Debug, Clone)]
pub struct CleanRule {
    pub name: String,
    pub action: CleanAction,
}

impl CleanRule {
    /// Apply this rule to `text`.
    pub fn apply(&self, text: &str) -> String {
        match &self.action {
            CleanAction::TruncateAt(regex) => match regex.find(text) {
                Some(m) => text[..m.start()].to_string(),
                None => text.to_string(),
            },
            CleanAction::Replace { regex, replacement } => {
                regex.replace_all(text, replacement.as_str()).into_owned()
            }
            CleanAction::LegalBackoff { marker, backoff } => {
                let Some(idx) = text.find(marker.as_str()) else {
                    return text.to_string();
                };
                let before = &text[..idx];
                match backoff.iter().filter_map(|b| before.rfind(b.as_str())).max() {
                    Some(cut) if cut > 0 => text[..cut].trim().to_string(),
                    _ => text.to_string(),
                }
            }
        }
    }
}

/// Ordered cleaning pipeline for reply bodies.
#[derive(Debug, Clone)]
pub struct AnswerCleaner {
    rules: Vec<CleanRule>,
    max_chars: usize,
}

impl AnswerCleaner {
    /// Compile the cleaner from its rule table.
    pub fn new(rules: &CleanerRules, max_chars: usize) -> Result<Self, RulesError> {
        let mut steps = Vec::new();
        for (name, patterns) in [
            ("quote_marker", &rules.quote_markers),
            ("separator", &rules.separators),
        ] {
            for regex in compile_patterns(name, patterns)? {
                steps.push(CleanRule {
                    name: name.into(),
                    action: CleanAction::TruncateAt(regex),
                });
            }
        }
        for regex in compile_patterns("forwarded_header", &rules.forwarded_headers)? {
            let replacement = if regex.captures_len() > 1 { "$1" } else { "" };
            steps.push(CleanRule {
                name: "forwarded_header".into(),
                action: CleanAction::Replace {
                    regex,
                    replacement: replacement.into(),
                },
            });
        }
        for regex in compile_patterns("signature", &rules.signature_patterns)? {
            steps.push(CleanRule {
                name: "signature".into(),
                action: CleanAction::TruncateAt(regex),
            });
        }
        if let Some(marker) = &rules.legal_marker {
            steps.push(CleanRule {
                name: "legal_backoff".into(),
                action: CleanAction::LegalBackoff {
                    marker: marker.clone(),
                    backoff: rules.legal_backoff.clone(),
                },
            });
        }
        Ok(Self {
            rules: steps,
            max_chars,
        })
    }

    /// The compiled steps, in application order.
    pub fn rules(&self) -> &[CleanRule] {
        &self.rules
    }

    /// Clean a raw reply body. May legitimately return an empty string.
    pub fn clean(&self, raw: &str) -> String {
        let raw = raw.replace("\r\n", "\n");
        let mut text = raw.trim().to_string();
        if text.is_empty() {
            return text;
        }
        for rule in &self.rules {
            text = rule.apply(&text);
        }
        let text = normalize_whitespace(&text);
        truncate_chars(&text, self.max_chars).trim().to_string()
    }
}

/// Collapse 3+ newlines to one blank line, runs of spaces/tabs to one space,
/// and drop single spaces around line breaks.
pub fn normalize_whitespace(text: &str) -> String {
    let text = BLANK_RUN.replace_all(text, "\n\n");
    let text = HORIZONTAL_WS.replace_all(&text, " ");
    let text = LINE_EDGE_SPACE.replace_all(&text, "\n");
    text.trim().to_string()
}
