//! Pipeline configuration.
//!
//! Everything the pipeline needs is carried in [`IngestionConfig`] and passed
//! in explicitly; the core never reads process environment. Binaries resolve
//! credentials and flags themselves and hand the result down.

use std::time::Duration;

use crate::types::IngestError;

/// How chunk identifiers are assigned during ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdPolicy {
    /// Sha-256 over the source URL, sequence index, and chunk text.
    /// Re-running ingestion on unchanged content upserts the same records,
    /// so repeated runs are idempotent.
    #[default]
    ContentHash,
    /// Fresh UUID v4 per chunk per run. Re-running ingestion on unchanged
    /// content creates duplicate records in the store.
    Random,
}

/// Tunables for a single ingestion run.
#[derive(Debug, Clone)]
pub struct IngestionConfig {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared between a chunk and its predecessor.
    pub chunk_overlap: usize,
    /// Bounded worker pool size for concurrent page fetches.
    pub fetch_concurrency: usize,
    /// Per-request timeout applied to sitemap, page, and embedding calls.
    pub request_timeout: Duration,
    /// Maximum texts per embedding capability call.
    pub embed_batch_size: usize,
    /// Chunk id assignment strategy.
    pub id_policy: IdPolicy,
    /// User agent sent with outbound HTTP requests.
    pub user_agent: String,
}

impl IngestionConfig {
    pub const DEFAULT_CHUNK_SIZE: usize = 1024;
    pub const DEFAULT_CHUNK_OVERLAP: usize = 100;
    pub const DEFAULT_FETCH_CONCURRENCY: usize = 8;
    pub const DEFAULT_EMBED_BATCH_SIZE: usize = 64;
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    #[must_use]
    pub fn with_chunking(mut self, chunk_size: usize, chunk_overlap: usize) -> Self {
        self.chunk_size = chunk_size;
        self.chunk_overlap = chunk_overlap;
        self
    }

    #[must_use]
    pub fn with_fetch_concurrency(mut self, concurrency: usize) -> Self {
        self.fetch_concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_embed_batch_size(mut self, batch_size: usize) -> Self {
        self.embed_batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_id_policy(mut self, policy: IdPolicy) -> Self {
        self.id_policy = policy;
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Rejects configurations the chunker would otherwise loop on.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::Config("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(IngestError::Config(format!(
                "chunk_overlap {} must be smaller than chunk_size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.fetch_concurrency == 0 {
            return Err(IngestError::Config(
                "fetch_concurrency must be at least 1".into(),
            ));
        }
        if self.embed_batch_size == 0 {
            return Err(IngestError::Config(
                "embed_batch_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
            chunk_overlap: Self::DEFAULT_CHUNK_OVERLAP,
            fetch_concurrency: Self::DEFAULT_FETCH_CONCURRENCY,
            request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
            embed_batch_size: Self::DEFAULT_EMBED_BATCH_SIZE,
            id_policy: IdPolicy::default(),
            user_agent: concat!("sitesmith/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(IngestionConfig::default().validate().is_ok());
    }

    #[test]
    fn overlap_equal_to_size_is_rejected() {
        let config = IngestionConfig::default().with_chunking(100, 100);
        assert!(matches!(
            config.validate(),
            Err(IngestError::Config(_))
        ));
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let config = IngestionConfig::default().with_chunking(0, 0);
        assert!(config.validate().is_err());
    }
}
