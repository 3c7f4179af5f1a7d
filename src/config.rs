//! Configuration types.

use std::path::PathBuf;

/// Default topic label for pairs matching no keyword.
pub const CATCH_ALL_TOPIC: &str = "Sonstiges";

/// Character and count limits applied across the pipeline.
#[derive(Debug, Clone)]
pub struct Limits {
    /// Maximum length of a cleaned outbound body.
    pub max_clean_chars: usize,
    /// Raw outbound prefix analysed when cleaning leaves nothing.
    pub fallback_raw_chars: usize,
    /// Prefix of the inbound body and of the raw outbound body used for
    /// keyword classification.
    pub classifier_prefix_chars: usize,
    /// Raw body truncation in the pair export.
    pub export_inbound_chars: usize,
    pub export_outbound_chars: usize,
    /// Body truncation for the unmatched sections of the full dump.
    pub residual_body_chars: usize,
    /// Sentence fragments shorter than this are discarded outright.
    pub min_fragment_chars: usize,
    /// Sentences shorter than this are never relevant.
    pub min_relevant_chars: usize,
    /// Sentences longer than this are relevant unless they carry contact data.
    pub long_sentence_chars: usize,
    /// Normalized keys shorter than this are dropped.
    pub min_key_chars: usize,
    /// Normalized keys are truncated to this many characters.
    pub key_prefix_chars: usize,
    /// Statements shorter than this are excluded from the document.
    pub min_statement_chars: usize,
    /// Candidates kept per topic after ranking.
    pub candidates_per_topic: usize,
    /// Maximum bullets per topic section.
    pub max_bullets: usize,
    /// Repeated statements listed in the audit report.
    pub report_repeated: usize,
    /// Candidates listed per topic in the audit report.
    pub report_candidates: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_clean_chars: 6000,
            fallback_raw_chars: 4000,
            classifier_prefix_chars: 2000,
            export_inbound_chars: 5000,
            export_outbound_chars: 8000,
            residual_body_chars: 4000,
            min_fragment_chars: 15,
            min_relevant_chars: 25,
            long_sentence_chars: 60,
            min_key_chars: 20,
            key_prefix_chars: 80,
            min_statement_chars: 30,
            candidates_per_topic: 35,
            max_bullets: 22,
            report_repeated: 50,
            report_candidates: 25,
        }
    }
}

/// Well-known output file names.
pub mod outputs {
    pub const PAIRS_TEXT: &str = "pairs.txt";
    pub const PAIRS_JSON: &str = "pairs.json";
    pub const FULL_DUMP: &str = "knowledge_full.txt";
    pub const CANDIDATES: &str = "candidates.json";
    pub const REPORT: &str = "report.md";
    pub const KNOWLEDGE: &str = "knowledge.txt";
}

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct DistillConfig {
    /// Directory receiving every output file.
    pub output_dir: PathBuf,
    /// Only outbound messages whose `From` contains this domain are paired.
    pub support_domain: Option<String>,
    /// Optional TOML rule file; compiled-in defaults otherwise.
    pub rules_path: Option<PathBuf>,
    /// Emit a section for the catch-all topic.
    pub emit_catch_all: bool,
    pub limits: Limits,
}

impl DistillConfig {
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            support_domain: None,
            rules_path: None,
            emit_catch_all: false,
            limits: Limits::default(),
        }
    }

    /// Set the support domain. Blank values disable the filter.
    pub fn with_support_domain(mut self, domain: Option<String>) -> Self {
        self.support_domain = domain
            .map(|d| d.trim().to_lowercase())
            .filter(|d| !d.is_empty());
        self
    }

    pub fn with_rules_path(mut self, path: Option<PathBuf>) -> Self {
        self.rules_path = path;
        self
    }

    pub fn with_catch_all(mut self, emit: bool) -> Self {
        self.emit_catch_all = emit;
        self
    }

    /// Resolve an output file name inside the output directory.
    pub fn output_path(&self, name: &str) -> PathBuf {
        self.output_dir.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_support_domain_disables_filter() {
        let config = DistillConfig::new("out".into()).with_support_domain(Some("  ".into()));
        assert!(config.support_domain.is_none());
    }

    #[test]
    fn support_domain_is_lowercased() {
        let config =
            DistillConfig::new("out".into()).with_support_domain(Some(" Example.COM ".into()));
        assert_eq!(config.support_domain.as_deref(), Some("example.com"));
    }

    #[test]
    fn output_path_joins_directory() {
        let config = DistillConfig::new("out".into());
        assert_eq!(
            config.output_path(outputs::KNOWLEDGE),
            PathBuf::from("out").join("knowledge.txt")
        );
    }
}
