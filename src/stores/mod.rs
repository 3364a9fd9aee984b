//! Vector-store capability: the pipeline's contract with vector indexes.
//!
//! The pipeline needs exactly three things from a vector store: idempotent
//! index creation, batched upsert keyed by record id, and similarity search.
//! [`VectorStore`] captures that contract; how a backend performs
//! nearest-neighbor search is its own business.
//!
//! Backends:
//! - [`sqlite::SqliteVectorStore`] — bundled backend over `sqlite-vec`
//! - [`MemoryVectorStore`] — exact-scan in-memory backend for tests and
//!   dry runs

pub mod sqlite;

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::IngestError;

pub use sqlite::SqliteVectorStore;

/// Distance metric an index is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceMetric {
    #[default]
    Cosine,
    Euclidean,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclidean => "euclidean",
        }
    }
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One record slated for upsert: the vector-store primary key, the embedded
/// vector, the text the vector was computed from, and its metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub content: String,
    pub metadata: serde_json::Value,
}

/// A similarity-search result, most similar first.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub content: String,
    pub metadata: serde_json::Value,
    pub score: f32,
}

/// Contract every vector-store backend provides.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Creates the index if it does not exist. Creating an existing index
    /// is a no-op; an existing index with a different dimension is a
    /// `Store` error.
    async fn ensure_index(
        &self,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<(), IngestError>;

    /// Blocks until the index reports ready. Bundled backends are ready as
    /// soon as `ensure_index` returns; remote backends may poll here.
    async fn await_ready(&self, name: &str) -> Result<(), IngestError>;

    /// Inserts or replaces records keyed by id, as one logical batch.
    /// Returns the number of records written. When the store rejects part
    /// of the batch, accepted records stay written and the rejected ids are
    /// reported via [`IngestError::Store`], never silently dropped.
    async fn upsert(
        &self,
        index: &str,
        records: Vec<UpsertRecord>,
    ) -> Result<usize, IngestError>;

    /// Returns the `k` records most similar to `query`, best first.
    async fn similarity_search(
        &self,
        index: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>, IngestError>;
}

struct MemoryIndex {
    dimension: usize,
    metric: DistanceMetric,
    records: HashMap<String, UpsertRecord>,
}

/// Exact-scan in-memory backend.
#[derive(Default)]
pub struct MemoryVectorStore {
    indexes: RwLock<HashMap<String, MemoryIndex>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held by `index`.
    pub fn count(&self, index: &str) -> usize {
        self.indexes
            .read()
            .get(index)
            .map_or(0, |idx| idx.records.len())
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn ensure_index(
        &self,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<(), IngestError> {
        let mut indexes = self.indexes.write();
        if let Some(existing) = indexes.get(name) {
            if existing.dimension != dimension {
                return Err(IngestError::store(format!(
                    "index '{name}' exists with dimension {}, requested {dimension}",
                    existing.dimension
                )));
            }
            return Ok(());
        }
        indexes.insert(
            name.to_string(),
            MemoryIndex {
                dimension,
                metric,
                records: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn await_ready(&self, name: &str) -> Result<(), IngestError> {
        if self.indexes.read().contains_key(name) {
            Ok(())
        } else {
            Err(IngestError::store(format!("unknown index '{name}'")))
        }
    }

    async fn upsert(
        &self,
        index: &str,
        records: Vec<UpsertRecord>,
    ) -> Result<usize, IngestError> {
        let mut indexes = self.indexes.write();
        let target = indexes
            .get_mut(index)
            .ok_or_else(|| IngestError::store(format!("unknown index '{index}'")))?;

        let mut written = 0usize;
        let mut failed_ids = Vec::new();
        for record in records {
            if record.embedding.len() != target.dimension {
                failed_ids.push(record.id);
                continue;
            }
            target.records.insert(record.id.clone(), record);
            written += 1;
        }

        if failed_ids.is_empty() {
            Ok(written)
        } else {
            Err(IngestError::Store {
                reason: format!("dimension mismatch for index '{index}'"),
                failed_ids,
            })
        }
    }

    async fn similarity_search(
        &self,
        index: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>, IngestError> {
        let indexes = self.indexes.read();
        let target = indexes
            .get(index)
            .ok_or_else(|| IngestError::store(format!("unknown index '{index}'")))?;

        let mut hits: Vec<SearchHit> = target
            .records
            .values()
            .map(|record| SearchHit {
                content: record.content.clone(),
                metadata: record.metadata.clone(),
                score: match target.metric {
                    DistanceMetric::Cosine => cosine_similarity(query, &record.embedding),
                    DistanceMetric::Euclidean => -euclidean_distance(query, &record.embedding),
                },
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, embedding: Vec<f32>) -> UpsertRecord {
        UpsertRecord {
            id: id.to_string(),
            embedding,
            content: format!("content for {id}"),
            metadata: json!({"source": "https://site/doc", "title": "Doc"}),
        }
    }

    #[tokio::test]
    async fn ensure_index_is_idempotent() {
        let store = MemoryVectorStore::new();
        store
            .ensure_index("idx", 3, DistanceMetric::Cosine)
            .await
            .unwrap();
        store
            .ensure_index("idx", 3, DistanceMetric::Cosine)
            .await
            .unwrap();
        store.await_ready("idx").await.unwrap();
    }

    #[tokio::test]
    async fn dimension_mismatch_on_existing_index_is_rejected() {
        let store = MemoryVectorStore::new();
        store
            .ensure_index("idx", 3, DistanceMetric::Cosine)
            .await
            .unwrap();
        let result = store.ensure_index("idx", 4, DistanceMetric::Cosine).await;
        assert!(matches!(result, Err(IngestError::Store { .. })));
    }

    #[tokio::test]
    async fn upsert_replaces_by_id() {
        let store = MemoryVectorStore::new();
        store
            .ensure_index("idx", 2, DistanceMetric::Cosine)
            .await
            .unwrap();

        store
            .upsert("idx", vec![record("a", vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .upsert("idx", vec![record("a", vec![0.0, 1.0])])
            .await
            .unwrap();

        assert_eq!(store.count("idx"), 1);
    }

    #[tokio::test]
    async fn partial_rejection_reports_failed_ids() {
        let store = MemoryVectorStore::new();
        store
            .ensure_index("idx", 2, DistanceMetric::Cosine)
            .await
            .unwrap();

        let result = store
            .upsert(
                "idx",
                vec![record("ok", vec![1.0, 0.0]), record("bad", vec![1.0])],
            )
            .await;

        match result {
            Err(IngestError::Store { failed_ids, .. }) => {
                assert_eq!(failed_ids, vec!["bad"]);
            }
            other => panic!("expected Store error, got {other:?}"),
        }
        // The accepted record stays written.
        assert_eq!(store.count("idx"), 1);
    }

    #[tokio::test]
    async fn search_ranks_by_cosine_similarity() {
        let store = MemoryVectorStore::new();
        store
            .ensure_index("idx", 2, DistanceMetric::Cosine)
            .await
            .unwrap();
        store
            .upsert(
                "idx",
                vec![
                    record("x", vec![1.0, 0.0]),
                    record("y", vec![0.0, 1.0]),
                    record("z", vec![0.7, 0.7]),
                ],
            )
            .await
            .unwrap();

        let hits = store
            .similarity_search("idx", &[1.0, 0.0], 2)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "content for x");
        assert!(hits[0].score > hits[1].score);
    }
}
