//! Distiller — runs the whole pipeline and writes every output file.
//!
//! Flow:
//! 1. Input detection (two mailbox folders, or an exported pairs file)
//! 2. Loading and thread matching → pair records (`pairs.txt`, `pairs.json`)
//! 3. Classification and sentence extraction → `candidates.json`
//! 4. Assembly → `knowledge.txt`, plus the audit report

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};

use crate::config::{DistillConfig, outputs};
use crate::error::{ConfigError, Result, RulesError};
use crate::export;
use crate::mailbox::{load_mailbox, loader::is_eml};
use crate::pipeline::assembler::{DocumentAssembler, SeenKeys, render};
use crate::pipeline::classifier::TopicClassifier;
use crate::pipeline::cleaner::AnswerCleaner;
use crate::pipeline::dedup::SentenceIndex;
use crate::pipeline::extractor::SentenceExtractor;
use crate::pipeline::matcher::match_threads;
use crate::pipeline::rules::RuleSet;
use crate::pipeline::types::{AnalyzedPair, CandidateSentence, MatchOutcome, PairRecord, TopicDocument};
use crate::report::{MailboxSummary, ReportInput, render_report};
use crate::text::truncate_chars;

/// Exact folder names accepted besides the substring matches.
const INBOUND_NAMES: &[&str] = &["in", "eingang"];
const OUTBOUND_NAMES: &[&str] = &["out", "ausgang"];
/// Pairs files looked up by name before scanning other `.txt` files.
const PAIRS_FILE_NAMES: &[&str] = &[outputs::PAIRS_TEXT, "paare.txt"];

/// What the pipeline reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineInput {
    Mailboxes { inbox: PathBuf, outbox: PathBuf },
    PairsFile(PathBuf),
}

/// Work out what an input path holds.
///
/// A directory is searched for an inbound and an outbound folder that
/// each hold `.eml` files; failing that, for a pairs text file. A plain
/// file is accepted only if it holds pair blocks.
pub async fn detect_input(path: &Path) -> std::result::Result<PipelineInput, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::MissingInput {
            path: path.to_path_buf(),
        });
    }
    if path.is_file() {
        return if holds_pairs(path).await {
            Ok(PipelineInput::PairsFile(path.to_path_buf()))
        } else {
            Err(ConfigError::InputNotRecognized {
                path: path.to_path_buf(),
            })
        };
    }

    let mut dirs = Vec::new();
    let mut texts = Vec::new();
    let mut entries = fs::read_dir(path).await?;
    while let Some(entry) = entries.next_entry().await? {
        let entry_path = entry.path();
        if entry_path.is_dir() {
            dirs.push(entry_path);
        } else if entry_path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("txt"))
        {
            texts.push(entry_path);
        }
    }
    dirs.sort();
    texts.sort();

    let mut inbox = None;
    let mut outbox = None;
    for dir in dirs {
        let name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_lowercase();
        if !contains_eml(&dir).await? {
            continue;
        }
        if inbox.is_none()
            && (name.contains("posteingang") || name.contains("inbox") || INBOUND_NAMES.contains(&name.as_str()))
        {
            inbox = Some(dir);
        } else if outbox.is_none()
            && (name.contains("postausgang") || name.contains("outbox") || OUTBOUND_NAMES.contains(&name.as_str()))
        {
            outbox = Some(dir);
        }
    }
    if let (Some(inbox), Some(outbox)) = (inbox, outbox) {
        debug!(inbox = %inbox.display(), outbox = %outbox.display(), "Detected mailbox folders");
        return Ok(PipelineInput::Mailboxes { inbox, outbox });
    }

    for name in PAIRS_FILE_NAMES {
        let candidate = path.join(name);
        if candidate.is_file() {
            return Ok(PipelineInput::PairsFile(candidate));
        }
    }
    for text in texts {
        if holds_pairs(&text).await {
            return Ok(PipelineInput::PairsFile(text));
        }
    }

    Err(ConfigError::InputNotRecognized {
        path: path.to_path_buf(),
    })
}

/// Unreadable or non-UTF-8 files hold no pairs.
async fn holds_pairs(path: &Path) -> bool {
    let content = fs::read_to_string(path).await.unwrap_or_default();
    !export::parse_pairs_text(&content).is_empty()
}

async fn contains_eml(dir: &Path) -> std::result::Result<bool, ConfigError> {
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.is_file() && is_eml(&path) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Result of analysis and assembly, before anything is written.
#[derive(Debug)]
pub struct Distillation {
    pub pairs: Vec<AnalyzedPair>,
    pub index: SentenceIndex,
    /// Ranked candidates per topic key.
    pub candidates: BTreeMap<String, Vec<CandidateSentence>>,
    pub document: TopicDocument,
}

/// What a run produced.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub pairs: usize,
    pub unmatched_outbound: usize,
    pub unmatched_inbound: usize,
    pub sections: usize,
    pub statements: usize,
    pub written: Vec<PathBuf>,
}

struct Pairing {
    records: Vec<PairRecord>,
    outcome: MatchOutcome,
    mailboxes: Vec<MailboxSummary>,
}

/// The compiled pipeline.
pub struct Distiller {
    config: DistillConfig,
    rules: RuleSet,
    cleaner: AnswerCleaner,
    classifier: TopicClassifier,
    extractor: SentenceExtractor,
}

impl Distiller {
    /// Compile every rule table. Fails on the first invalid pattern.
    pub fn new(config: DistillConfig, rules: RuleSet) -> std::result::Result<Self, RulesError> {
        rules.validate()?;
        let limits = &config.limits;
        let cleaner = AnswerCleaner::new(&rules.cleaner, limits.max_clean_chars)?;
        let classifier =
            TopicClassifier::new(&rules.topics, &rules.catch_all, limits.classifier_prefix_chars);
        let extractor = SentenceExtractor::new(&rules.extractor, limits)?;
        debug!(
            cleaner_steps = cleaner.rules().len(),
            topics = rules.topics.len(),
            "Pipeline compiled"
        );
        Ok(Self {
            config,
            rules,
            cleaner,
            classifier,
            extractor,
        })
    }

    /// Load the configured rule file (or the defaults) and compile.
    pub async fn from_config(config: DistillConfig) -> Result<Self> {
        let rules = match &config.rules_path {
            Some(path) => RuleSet::load(path).await?,
            None => RuleSet::default_rules(),
        };
        Ok(Self::new(config, rules)?)
    }

    pub fn config(&self) -> &DistillConfig {
        &self.config
    }

    /// Run the full pipeline.
    pub async fn run(&self, input: &PipelineInput) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let (records, outcome, mailboxes) = match input {
            PipelineInput::Mailboxes { inbox, outbox } => {
                let pairing = self.pair_mailboxes(inbox, outbox).await?;
                summary.written = self.write_pairing(&pairing).await?;
                (pairing.records, Some(pairing.outcome), pairing.mailboxes)
            }
            PipelineInput::PairsFile(path) => {
                let records = self.read_pairs_file(path).await?;
                let json = self.config.output_path(outputs::PAIRS_JSON);
                export::write_json(&json, &records).await?;
                summary.written.push(json);
                (records, None, Vec::new())
            }
        };

        let distillation = self.distill(records)?;
        let limits = &self.config.limits;

        let candidates_path = self.config.output_path(outputs::CANDIDATES);
        export::write_json(&candidates_path, &distillation.candidates).await?;
        summary.written.push(candidates_path);

        let report = render_report(
            &ReportInput {
                mailboxes,
                outcome: outcome.as_ref(),
                pairs: &distillation.pairs,
                repeated: distillation.index.repeated(),
                candidates: &distillation.candidates,
                statements: distillation.document.statement_count(),
            },
            limits,
        );
        let report_path = self.config.output_path(outputs::REPORT);
        export::write_atomic(&report_path, report.as_bytes()).await?;
        summary.written.push(report_path);

        let knowledge_path = self.config.output_path(outputs::KNOWLEDGE);
        export::write_atomic(&knowledge_path, render(&distillation.document).as_bytes()).await?;
        summary.written.push(knowledge_path);

        summary.pairs = distillation.pairs.len();
        if let Some(outcome) = &outcome {
            summary.unmatched_outbound = outcome.unmatched_outbound.len();
            summary.unmatched_inbound = outcome.unmatched_inbound.len();
        }
        summary.sections = distillation.document.sections.len();
        summary.statements = distillation.document.statement_count();
        info!(
            pairs = summary.pairs,
            sections = summary.sections,
            statements = summary.statements,
            output = %self.config.output_dir.display(),
            "Distillation complete"
        );
        Ok(summary)
    }

    /// Match mailboxes and write only the pair exports.
    pub async fn pair(&self, inbox: &Path, outbox: &Path) -> Result<RunSummary> {
        let pairing = self.pair_mailboxes(inbox, outbox).await?;
        let written = self.write_pairing(&pairing).await?;
        Ok(RunSummary {
            pairs: pairing.records.len(),
            unmatched_outbound: pairing.outcome.unmatched_outbound.len(),
            unmatched_inbound: pairing.outcome.unmatched_inbound.len(),
            written,
            ..RunSummary::default()
        })
    }

    async fn pair_mailboxes(&self, inbox_dir: &Path, outbox_dir: &Path) -> Result<Pairing> {
        // Both folders are checked before either is read.
        for dir in [inbox_dir, outbox_dir] {
            if !dir.is_dir() {
                return Err(ConfigError::MissingInput {
                    path: dir.to_path_buf(),
                }
                .into());
            }
        }
        let inbox = load_mailbox(inbox_dir).await?;
        let outbox = load_mailbox(outbox_dir).await?;
        let outcome = match_threads(&inbox, &outbox, self.config.support_domain.as_deref());
        let records = outcome
            .pairs
            .iter()
            .map(|pair| export::build_record(pair, &self.cleaner, &self.config.limits))
            .collect();
        Ok(Pairing {
            records,
            outcome,
            mailboxes: vec![
                MailboxSummary::of("Inbound", &inbox),
                MailboxSummary::of("Outbound", &outbox),
            ],
        })
    }

    async fn write_pairing(&self, pairing: &Pairing) -> Result<Vec<PathBuf>> {
        let text_path = self.config.output_path(outputs::PAIRS_TEXT);
        export::write_atomic(&text_path, export::render_pairs_text(&pairing.records).as_bytes())
            .await?;

        let json_path = self.config.output_path(outputs::PAIRS_JSON);
        export::write_json(&json_path, &pairing.records).await?;

        let dump_path = self.config.output_path(outputs::FULL_DUMP);
        let dump = export::render_full_dump(&pairing.records, &pairing.outcome, &self.config.limits);
        export::write_atomic(&dump_path, dump.as_bytes()).await?;

        Ok(vec![text_path, json_path, dump_path])
    }

    async fn read_pairs_file(&self, path: &Path) -> Result<Vec<PairRecord>> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|source| crate::error::LoadError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let mut records = export::parse_pairs_text(&content);
        for record in &mut records {
            record.outbound_clean = self.cleaner.clean(&record.outbound_raw);
        }
        info!(path = %path.display(), pairs = records.len(), "Pairs file loaded");
        Ok(records)
    }

    /// Classify pairs and choose the text each one is analysed on.
    pub fn analyze(&self, records: Vec<PairRecord>) -> Vec<AnalyzedPair> {
        records
            .into_iter()
            .map(|record| {
                let topics = self.classifier.classify(&record);
                let analysis_text = if record.outbound_clean.trim().is_empty() {
                    truncate_chars(&record.outbound_raw, self.config.limits.fallback_raw_chars)
                        .to_string()
                } else {
                    record.outbound_clean.clone()
                };
                debug!(pair = record.id, topics = ?topics, "Pair classified");
                AnalyzedPair {
                    record,
                    topics,
                    analysis_text,
                }
            })
            .collect()
    }

    /// Everything after pairing, without touching the filesystem.
    pub fn distill(&self, records: Vec<PairRecord>) -> std::result::Result<Distillation, RulesError> {
        let limits = &self.config.limits;
        let pairs = self.analyze(records);
        let index = SentenceIndex::build(&pairs, &self.extractor, limits);

        let mut topic_keys: Vec<&str> = self.rules.topics.iter().map(|t| t.key.as_str()).collect();
        topic_keys.push(self.rules.catch_all.as_str());
        let candidates: BTreeMap<String, Vec<CandidateSentence>> = topic_keys
            .into_iter()
            .map(|key| (key, index.candidates_for(key, &pairs, limits.candidates_per_topic)))
            .filter(|(_, list)| !list.is_empty())
            .map(|(key, list)| (key.to_string(), list))
            .collect();
        info!(
            groups = index.len(),
            topics = candidates.len(),
            "Knowledge candidates ranked"
        );

        let assembler = DocumentAssembler::new(&self.rules, limits, self.config.emit_catch_all)?;
        let mut seen = SeenKeys::new();
        let document = assembler.assemble(&candidates, &mut seen);
        debug!(claimed_keys = seen.claimed(), "Document assembled");
        Ok(Distillation {
            pairs,
            index,
            candidates,
            document,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: usize, subject: &str, outbound: &str) -> PairRecord {
        PairRecord {
            id,
            subject: subject.into(),
            inbound_date: String::new(),
            outbound_date: String::new(),
            customer: "Kunde <k@example.com>".into(),
            inbound_raw: "Frage".into(),
            outbound_raw: outbound.into(),
            outbound_clean: outbound.into(),
        }
    }

    fn distiller() -> Distiller {
        Distiller::new(DistillConfig::new("out".into()), RuleSet::default_rules()).unwrap()
    }

    #[tokio::test]
    async fn missing_input_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = detect_input(&dir.path().join("nope")).await.unwrap_err();
        assert!(matches!(err, ConfigError::MissingInput { .. }));
    }

    #[tokio::test]
    async fn detects_mailbox_folders() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["Posteingang", "Postausgang", "leer"] {
            fs::create_dir(dir.path().join(name)).await.unwrap();
        }
        fs::write(dir.path().join("Posteingang/a.eml"), "x").await.unwrap();
        fs::write(dir.path().join("Postausgang/b.EML"), "x").await.unwrap();
        let input = detect_input(dir.path()).await.unwrap();
        assert_eq!(
            input,
            PipelineInput::Mailboxes {
                inbox: dir.path().join("Posteingang"),
                outbox: dir.path().join("Postausgang"),
            }
        );
    }

    #[tokio::test]
    async fn folders_without_eml_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("inbox")).await.unwrap();
        fs::create_dir(dir.path().join("outbox")).await.unwrap();
        fs::write(dir.path().join("inbox/a.eml"), "x").await.unwrap();
        let err = detect_input(dir.path()).await.unwrap_err();
        assert!(matches!(err, ConfigError::InputNotRecognized { .. }));
    }

    #[tokio::test]
    async fn detects_pairs_file() {
        let dir = tempfile::tempdir().unwrap();
        let text = export::render_pairs_text(&[record(1, "Frage", "Antwort")]);
        fs::write(dir.path().join("archiv.txt"), &text).await.unwrap();
        fs::write(dir.path().join("notizen.txt"), "nichts").await.unwrap();
        assert_eq!(
            detect_input(dir.path()).await.unwrap(),
            PipelineInput::PairsFile(dir.path().join("archiv.txt"))
        );
        let file = dir.path().join("archiv.txt");
        assert_eq!(detect_input(&file).await.unwrap(), PipelineInput::PairsFile(file));
    }

    #[tokio::test]
    async fn plain_file_without_pairs_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let notes = dir.path().join("notizen.txt");
        fs::write(&notes, "nichts").await.unwrap();
        let err = detect_input(&notes).await.unwrap_err();
        assert!(matches!(err, ConfigError::InputNotRecognized { .. }));

        let invoice = dir.path().join("rechnung.pdf");
        fs::write(&invoice, "%PDF-1.4 keine Paare").await.unwrap();
        let err = detect_input(&invoice).await.unwrap_err();
        assert!(matches!(err, ConfigError::InputNotRecognized { .. }));
    }

    #[test]
    fn analysis_falls_back_to_raw_prefix() {
        let mut rec = record(1, "Frage", "Roher Text der Antwort");
        rec.outbound_clean = "  ".into();
        let analyzed = distiller().analyze(vec![rec]);
        assert_eq!(analyzed[0].analysis_text, "Roher Text der Antwort");
        assert_eq!(analyzed[0].topics, vec!["Sonstiges"]);
    }

    #[test]
    fn distill_places_shared_statement_once() {
        let sentence = "Wir haben die Sperrung der Daten, für weitere Übersendungen von Werbung und Angeboten aus unserem Unternehmen, vorgenommen.";
        let records = vec![
            record(1, "Keine Werbung mehr", sentence),
            record(2, "Werbung abbestellen", &format!("{sentence}\nDanke.")),
            record(3, "Werbung", &sentence.to_lowercase()),
        ];
        let result = distiller().distill(records).unwrap();
        let bullets: Vec<&String> = result
            .document
            .sections
            .iter()
            .flat_map(|s| s.bullets.iter())
            .collect();
        let expected = "Die Sperrung der Daten für weitere Übersendungen von Werbung und Angeboten wird auf Wunsch vorgenommen.";
        assert_eq!(bullets.iter().filter(|b| b.as_str() == expected).count(), 1);
        assert_eq!(result.document.sections[0].title, "Werbung & Datenschutz");
        assert_eq!(result.candidates["Werbung_Datenschutz"][0].occurrences, 3);
    }

    #[test]
    fn every_pair_has_a_topic() {
        let records = vec![
            record(1, "Hallo", "Nichts Besonderes hier."),
            record(2, "Stornierung", "Bitte beachten Sie unsere Bedingungen."),
        ];
        let result = distiller().distill(records).unwrap();
        assert!(result.pairs.iter().all(|p| !p.topics.is_empty()));
    }
}
