//! Chunk, embed, and upsert extracted pages into a vector index.

use std::sync::Arc;

use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use crate::chunker::{TextChunk, chunk_page};
use crate::config::{IdPolicy, IngestionConfig};
use crate::embeddings::EmbeddingClient;
use crate::extract::ExtractedPage;
use crate::stores::{DistanceMetric, UpsertRecord, VectorStore};
use crate::types::IngestError;

/// Drives the back half of the pipeline: pages in, vector records out.
///
/// Embedding and store failures are fatal to the run (they indicate a
/// misconfiguration or backend outage, not a bad page) and carry enough
/// context, such as rejected ids, to retry.
pub struct IngestionCoordinator {
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn VectorStore>,
    config: IngestionConfig,
}

impl IngestionCoordinator {
    /// Builds a coordinator from explicit collaborators. Fails fast on a
    /// configuration the chunker would reject mid-run.
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        store: Arc<dyn VectorStore>,
        config: IngestionConfig,
    ) -> Result<Self, IngestError> {
        config.validate()?;
        Ok(Self {
            embedder,
            store,
            config,
        })
    }

    pub fn config(&self) -> &IngestionConfig {
        &self.config
    }

    /// Chunks every page, embeds all chunk texts, and upserts the records
    /// into `index_name` as one logical batch. Returns the number of
    /// records written.
    pub async fn ingest(
        &self,
        pages: &[ExtractedPage],
        index_name: &str,
    ) -> Result<usize, IngestError> {
        self.store
            .ensure_index(index_name, self.embedder.dimension(), DistanceMetric::Cosine)
            .await?;
        self.store.await_ready(index_name).await?;

        let mut chunks = Vec::new();
        for page in pages {
            chunks.extend(chunk_page(
                page,
                self.config.chunk_size,
                self.config.chunk_overlap,
            )?);
        }
        if chunks.is_empty() {
            debug!(index = index_name, "no chunks to ingest");
            return Ok(0);
        }

        let vectors = self.embed_all(&chunks).await?;
        let records: Vec<UpsertRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, embedding)| UpsertRecord {
                id: self.chunk_id(chunk),
                embedding,
                content: chunk.text.clone(),
                metadata: json!({
                    "source": chunk.source_url,
                    "title": chunk.title,
                }),
            })
            .collect();

        let written = self.store.upsert(index_name, records).await?;
        info!(
            index = index_name,
            pages = pages.len(),
            records = written,
            "ingestion batch stored"
        );
        Ok(written)
    }

    async fn embed_all(&self, chunks: &[TextChunk]) -> Result<Vec<Vec<f32>>, IngestError> {
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let batch_size = self
            .config
            .embed_batch_size
            .min(self.embedder.max_batch())
            .max(1);

        let mut vectors = Vec::with_capacity(texts.len());
        for slice in texts.chunks(batch_size) {
            let embedded = self.embedder.embed(slice).await?;
            if embedded.len() != slice.len() {
                return Err(IngestError::Embedding(format!(
                    "embedding capability returned {} vectors for {} inputs",
                    embedded.len(),
                    slice.len()
                )));
            }
            vectors.extend(embedded);
        }
        Ok(vectors)
    }

    fn chunk_id(&self, chunk: &TextChunk) -> String {
        match self.config.id_policy {
            IdPolicy::Random => Uuid::new_v4().to_string(),
            IdPolicy::ContentHash => {
                let mut hasher = Sha256::new();
                hasher.update(chunk.source_url.as_bytes());
                hasher.update([0u8]);
                hasher.update(chunk.sequence_index.to_le_bytes());
                hasher.update(chunk.text.as_bytes());
                hex::encode(hasher.finalize())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::MockEmbedder;
    use crate::stores::MemoryVectorStore;

    fn page(url: &str, title: &str, text: String) -> ExtractedPage {
        ExtractedPage {
            source_url: url.to_string(),
            title: title.to_string(),
            text,
        }
    }

    fn coordinator(
        store: Arc<MemoryVectorStore>,
        config: IngestionConfig,
    ) -> IngestionCoordinator {
        IngestionCoordinator::new(Arc::new(MockEmbedder::new(8)), store, config).unwrap()
    }

    #[tokio::test]
    async fn one_long_page_yields_three_overlapping_records() {
        let store = Arc::new(MemoryVectorStore::new());
        let coordinator = coordinator(store.clone(), IngestionConfig::default());

        let written = coordinator
            .ingest(
                &[page("https://site/doc", "Doc", "x".repeat(2048))],
                "web-rag",
            )
            .await
            .unwrap();

        assert_eq!(written, 3);
        assert_eq!(store.count("web-rag"), 3);
    }

    #[tokio::test]
    async fn content_hash_ids_make_reingestion_idempotent() {
        let store = Arc::new(MemoryVectorStore::new());
        let coordinator = coordinator(store.clone(), IngestionConfig::default());
        let pages = [page("https://site/doc", "Doc", "y".repeat(3000))];

        let first = coordinator.ingest(&pages, "web-rag").await.unwrap();
        let second = coordinator.ingest(&pages, "web-rag").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.count("web-rag"), first);
    }

    #[tokio::test]
    async fn random_ids_duplicate_on_reingestion() {
        let store = Arc::new(MemoryVectorStore::new());
        let coordinator = coordinator(
            store.clone(),
            IngestionConfig::default().with_id_policy(IdPolicy::Random),
        );
        let pages = [page("https://site/doc", "Doc", "z".repeat(1500))];

        let first = coordinator.ingest(&pages, "web-rag").await.unwrap();
        coordinator.ingest(&pages, "web-rag").await.unwrap();

        assert_eq!(store.count("web-rag"), first * 2);
    }

    #[tokio::test]
    async fn chunks_from_different_pages_are_never_merged() {
        let store = Arc::new(MemoryVectorStore::new());
        let coordinator = coordinator(
            store.clone(),
            IngestionConfig::default().with_chunking(100, 10),
        );

        let written = coordinator
            .ingest(
                &[
                    page("https://site/a", "A", "a".repeat(150)),
                    page("https://site/b", "B", "b".repeat(150)),
                ],
                "web-rag",
            )
            .await
            .unwrap();

        // Two chunks per page; no chunk mixes content from both.
        assert_eq!(written, 4);
    }

    #[tokio::test]
    async fn empty_pages_write_nothing() {
        let store = Arc::new(MemoryVectorStore::new());
        let coordinator = coordinator(store.clone(), IngestionConfig::default());

        let written = coordinator
            .ingest(&[page("https://site/empty", "", String::new())], "web-rag")
            .await
            .unwrap();
        assert_eq!(written, 0);
    }

    #[test]
    fn invalid_chunking_config_fails_at_construction() {
        let result = IngestionCoordinator::new(
            Arc::new(MockEmbedder::new(8)),
            Arc::new(MemoryVectorStore::new()),
            IngestionConfig::default().with_chunking(100, 100),
        );
        assert!(matches!(result, Err(IngestError::Config(_))));
    }
}
