// src/core/error.rs

use std::time::Duration;

/// Failures of the vulnerability corpus. These are never swallowed: a matcher
/// that cannot reach its corpus reports it instead of returning zero matches.
#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("vulnerability corpus unavailable: {0}")]
    Unavailable(String),
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid vulnerability record: {0}")]
    InvalidRecord(String),
}

/// Engine-level outcomes that end a run early.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("assessment run cancelled")]
    Cancelled,
    #[error("assessment run exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("failed to read asset inventory: {0}")]
    Inventory(#[from] std::io::Error),
    #[error("failed to parse asset inventory: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Corpus(#[from] CorpusError),
    #[error("asset assessment cancelled")]
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
}
