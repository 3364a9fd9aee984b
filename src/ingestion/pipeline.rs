//! End-to-end orchestration: sitemap → pages → chunks → vector index.

use std::sync::Arc;

use reqwest::Client;
use tracing::{info, warn};

use crate::config::IngestionConfig;
use crate::embeddings::EmbeddingClient;
use crate::extract::{ExtractedPage, extract};
use crate::fetcher::{FetchResult, PageFetcher};
use crate::ingestion::cache::DocumentCache;
use crate::ingestion::coordinator::IngestionCoordinator;
use crate::ingestion::resume::ResumeTracker;
use crate::sitemap::SitemapResolver;
use crate::stores::VectorStore;
use crate::types::IngestError;

/// Summary of one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    /// URLs the sitemap resolver produced after filtering.
    pub urls_discovered: usize,
    /// Pages fetched and extracted successfully.
    pub pages_fetched: usize,
    /// Pages dropped by fetch or extraction failures.
    pub pages_failed: usize,
    /// URLs skipped because a resume tracker had already recorded them.
    pub pages_skipped: usize,
    /// Records written to the vector index.
    pub records_written: usize,
}

/// Wires the pipeline stages together over one shared HTTP client.
///
/// Per-item failures degrade the batch (logged, counted in the report);
/// embedding and store failures abort the run.
pub struct IngestionPipeline {
    resolver: SitemapResolver,
    fetcher: PageFetcher,
    coordinator: IngestionCoordinator,
    resume: Option<ResumeTracker>,
}

impl IngestionPipeline {
    pub fn new(
        client: Client,
        embedder: Arc<dyn EmbeddingClient>,
        store: Arc<dyn VectorStore>,
        config: IngestionConfig,
    ) -> Result<Self, IngestError> {
        let resolver = SitemapResolver::new(client.clone(), config.request_timeout);
        let fetcher = PageFetcher::new(client, &config);
        let coordinator = IngestionCoordinator::new(embedder, store, config)?;
        Ok(Self {
            resolver,
            fetcher,
            coordinator,
            resume: None,
        })
    }

    /// Reuse previously downloaded pages from a disk cache.
    #[must_use]
    pub fn with_cache(mut self, cache: DocumentCache) -> Self {
        self.fetcher = self.fetcher.clone().with_cache(cache);
        self
    }

    /// Skip URLs recorded by earlier runs and record newly ingested ones.
    #[must_use]
    pub fn with_resume(mut self, tracker: ResumeTracker) -> Self {
        self.resume = Some(tracker);
        self
    }

    /// Runs the full pipeline for one sitemap.
    pub async fn run(
        &self,
        sitemap_url: &str,
        filter_substring: &str,
        index_name: &str,
    ) -> Result<PipelineReport, IngestError> {
        let mut report = PipelineReport::default();

        let urls = self.resolver.resolve(sitemap_url, filter_substring).await;
        report.urls_discovered = urls.len();
        info!(
            sitemap = sitemap_url,
            filter = filter_substring,
            urls = urls.len(),
            "sitemap resolved"
        );

        let mut pending = Vec::with_capacity(urls.len());
        for url in urls {
            if let Some(tracker) = &self.resume {
                if tracker.contains(&url).await {
                    report.pages_skipped += 1;
                    continue;
                }
            }
            pending.push(url);
        }

        let mut processed_urls = Vec::new();
        let mut pages: Vec<ExtractedPage> = Vec::new();
        for result in self.fetcher.fetch_all(&pending).await {
            match result {
                FetchResult::Success {
                    url,
                    final_url,
                    body,
                } => match extract(&body, &final_url) {
                    Ok(page) => {
                        processed_urls.push(url);
                        pages.push(page);
                    }
                    Err(err) => {
                        warn!(url = %url, error = %err, "page extraction failed");
                        report.pages_failed += 1;
                    }
                },
                FetchResult::Failure { .. } => {
                    report.pages_failed += 1;
                }
            }
        }
        report.pages_fetched = pages.len();

        report.records_written = self.coordinator.ingest(&pages, index_name).await?;

        if let Some(tracker) = &self.resume {
            for url in &processed_urls {
                tracker.mark_processed(url).await?;
            }
        }

        Ok(report)
    }
}
