//! Ingestion: orchestration and run-to-run state.
//!
//! * [`coordinator`] — chunk, embed, and upsert extracted pages.
//! * [`pipeline`] — sitemap-to-index orchestration with per-item isolation.
//! * [`cache`] — disk-backed cache for downloaded pages.
//! * [`resume`] — processed-URL tracking for resumable runs.

pub mod cache;
pub mod coordinator;
pub mod pipeline;
pub mod resume;

pub use cache::DocumentCache;
pub use coordinator::IngestionCoordinator;
pub use pipeline::{IngestionPipeline, PipelineReport};
pub use resume::ResumeTracker;
