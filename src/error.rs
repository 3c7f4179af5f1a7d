//! Error types for kb-distill.

use std::path::PathBuf;

/// Top-level error type for the distillation pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Rules error: {0}")]
    Rules(#[from] RulesError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),
}

/// Configuration-related errors. All of these are raised before any
/// message is processed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Input does not exist: {}", path.display())]
    MissingInput { path: PathBuf },

    #[error(
        "Input not recognized: {}. Expected a directory with inbound/outbound .eml folders or a pairs text file",
        path.display()
    )]
    InputNotRecognized { path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mailbox loading errors.
///
/// A single unreadable or malformed message file is *not* an error; it is
/// skipped and counted in `LoadStats`.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Mailbox directory not found: {}", path.display())]
    MissingDirectory { path: PathBuf },

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Rule table errors.
#[derive(Debug, thiserror::Error)]
pub enum RulesError {
    #[error("Failed to read rules file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse rules: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize rules: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid pattern in {rule}: {source}")]
    InvalidPattern {
        rule: String,
        #[source]
        source: regex::Error,
    },

    #[error("Rule table {table} is empty")]
    Empty { table: String },
}

/// Output-writing errors.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for the pipeline.
pub type Result<T> = std::result::Result<T, Error>;
