//! ```text
//! sitemap.xml ──► SitemapResolver ──► filtered URLs
//!                                        │
//!                    PageFetcher ◄───────┘  (bounded worker pool)
//!                        │
//!            (url, raw HTML) per item, failures isolated
//!                        │
//!                 extract::extract ──► ExtractedPage { url, title, text }
//!                        │
//!                 chunker::chunk_page ──► TextChunk windows with overlap
//!                        │
//!              IngestionCoordinator ──► embed ──► upsert
//!                        │                │          │
//!                        │        EmbeddingClient  VectorStore
//!                        │        (OpenAI / mock)  (sqlite-vec / memory)
//!                        ▼
//!                 PipelineReport
//! ```
//!
//! Failures at any per-item stage are absorbed and logged so one bad URL
//! never aborts the batch; configuration, embedding, and store failures are
//! fatal to the run.

pub mod chunker;
pub mod config;
pub mod embeddings;
pub mod extract;
pub mod fetcher;
pub mod ingestion;
pub mod sitemap;
pub mod stores;
pub mod types;

pub use chunker::{TextChunk, chunk_page, split};
pub use config::{IdPolicy, IngestionConfig};
pub use embeddings::{EmbeddingClient, MockEmbedder, OpenAiConfig, OpenAiEmbedder};
pub use extract::{ExtractedPage, extract};
pub use fetcher::{FetchResult, PageFetcher};
pub use ingestion::{
    DocumentCache, IngestionCoordinator, IngestionPipeline, PipelineReport, ResumeTracker,
};
pub use sitemap::SitemapResolver;
pub use stores::{
    DistanceMetric, MemoryVectorStore, SearchHit, SqliteVectorStore, UpsertRecord, VectorStore,
};
pub use types::IngestError;
