//! Crate-wide error taxonomy.

use thiserror::Error;

/// Errors surfaced by the ingestion pipeline.
///
/// Per-item failures inside the sitemap resolver and the page fetcher are
/// absorbed and logged rather than raised; the variants here are what the
/// fallible operations actually return to callers. `Config`, `Embedding`,
/// and `Store` are fatal to a run, never to a single page.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Network failure, timeout, or non-success HTTP status.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// Malformed XML or fatally malformed HTML.
    #[error("parse failed: {0}")]
    Parse(String),

    /// Invalid chunking or pipeline configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The embedding capability failed or returned a malformed batch.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// Vector-store write failure. `failed_ids` carries the records the
    /// store rejected when the failure was partial.
    #[error("store failure: {reason} ({} records rejected)", .failed_ids.len())]
    Store {
        reason: String,
        failed_ids: Vec<String>,
    },

    /// Filesystem failure while persisting cache or resume state.
    #[error("io failure: {0}")]
    Io(String),
}

impl IngestError {
    /// Store failure without identifiable rejected records.
    pub fn store(reason: impl Into<String>) -> Self {
        Self::Store {
            reason: reason.into(),
            failed_ids: Vec::new(),
        }
    }
}

impl From<reqwest::Error> for IngestError {
    fn from(err: reqwest::Error) -> Self {
        IngestError::Fetch(err.to_string())
    }
}

impl From<std::io::Error> for IngestError {
    fn from(err: std::io::Error) -> Self {
        IngestError::Io(err.to_string())
    }
}
