//! Concurrent page fetching with per-item failure isolation.

use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use crate::config::IngestionConfig;
use crate::ingestion::cache::DocumentCache;
use crate::types::IngestError;

/// Outcome of a single page fetch. One result per input URL; a failure
/// never prevents the rest of the batch from completing.
#[derive(Debug, Clone)]
pub enum FetchResult {
    Success {
        /// The URL as requested.
        url: String,
        /// Final URL after following redirects.
        final_url: String,
        /// Raw HTML payload.
        body: String,
    },
    Failure {
        url: String,
        reason: String,
    },
}

impl FetchResult {
    /// The requested URL this result is paired with.
    pub fn url(&self) -> &str {
        match self {
            FetchResult::Success { url, .. } | FetchResult::Failure { url, .. } => url,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FetchResult::Success { .. })
    }
}

/// Fetches batches of pages through a bounded worker pool.
#[derive(Clone)]
pub struct PageFetcher {
    client: Client,
    concurrency: usize,
    timeout: Duration,
    cache: Option<DocumentCache>,
}

impl PageFetcher {
    pub fn new(client: Client, config: &IngestionConfig) -> Self {
        Self {
            client,
            concurrency: config.fetch_concurrency.max(1),
            timeout: config.request_timeout,
            cache: None,
        }
    }

    /// Reuse previously downloaded pages from a disk cache.
    #[must_use]
    pub fn with_cache(mut self, cache: DocumentCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Fetches every URL independently. The result sequence has the same
    /// length and order as the input; at most `fetch_concurrency` requests
    /// are in flight at once.
    pub async fn fetch_all(&self, urls: &[String]) -> Vec<FetchResult> {
        stream::iter(urls.iter().cloned())
            .map(|url| self.fetch_one(url))
            .buffered(self.concurrency)
            .collect()
            .await
    }

    async fn fetch_one(&self, url: String) -> FetchResult {
        if let Some(cache) = &self.cache {
            if let Ok(parsed) = Url::parse(&url) {
                if let Some(body) = cache.load(&parsed).await {
                    debug!(url = %url, bytes = body.len(), "using cached page");
                    return FetchResult::Success {
                        final_url: url.clone(),
                        url,
                        body,
                    };
                }
            }
        }

        match self.fetch_network(&url).await {
            Ok((final_url, body)) => {
                debug!(url = %url, bytes = body.len(), "page downloaded");
                if let Some(cache) = &self.cache {
                    if let Ok(parsed) = Url::parse(&url) {
                        if let Err(err) = cache.store(&parsed, &body).await {
                            warn!(url = %url, error = %err, "failed to cache page");
                        }
                    }
                }
                FetchResult::Success {
                    url,
                    final_url,
                    body,
                }
            }
            Err(err) => {
                warn!(url = %url, error = %err, "page fetch failed");
                FetchResult::Failure {
                    url,
                    reason: err.to_string(),
                }
            }
        }
    }

    async fn fetch_network(&self, url: &str) -> Result<(String, String), IngestError> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?;
        let final_url = response.url().to_string();
        let body = response.text().await?;
        Ok((final_url, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn fetcher() -> PageFetcher {
        PageFetcher::new(Client::new(), &IngestionConfig::default())
    }

    #[tokio::test]
    async fn failures_are_isolated_per_url() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/good");
                then.status(200).body("<html><p>ok</p></html>");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/bad");
                then.status(500).body("boom");
            })
            .await;

        let urls = vec![server.url("/good"), server.url("/bad")];
        let results = fetcher().fetch_all(&urls).await;

        assert_eq!(results.len(), 2);
        assert!(results[0].is_success());
        assert!(!results[1].is_success());
        assert_eq!(results[1].url(), urls[1]);
    }

    #[tokio::test]
    async fn results_keep_input_order() {
        let server = MockServer::start_async().await;
        for path in ["/a", "/b", "/c"] {
            let body = format!("<html><p>{path}</p></html>");
            server
                .mock_async(move |when, then| {
                    when.method(GET).path(path);
                    then.status(200).body(body);
                })
                .await;
        }

        let urls: Vec<String> = ["/a", "/b", "/c"]
            .iter()
            .map(|path| server.url(*path))
            .collect();
        let results = fetcher().fetch_all(&urls).await;

        for (url, result) in urls.iter().zip(&results) {
            assert_eq!(result.url(), url);
            assert!(result.is_success());
        }
    }

    #[tokio::test]
    async fn timed_out_page_fails_without_blocking_the_other() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/fast");
                then.status(200).body("<html><p>fast</p></html>");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/slow");
                then.status(200)
                    .delay(std::time::Duration::from_secs(5))
                    .body("<html><p>slow</p></html>");
            })
            .await;

        let config =
            IngestionConfig::default().with_request_timeout(Duration::from_millis(250));
        let fetcher = PageFetcher::new(Client::new(), &config);

        let urls = vec![server.url("/fast"), server.url("/slow")];
        let results = fetcher.fetch_all(&urls).await;

        assert_eq!(results.len(), 2);
        assert!(results[0].is_success());
        match &results[1] {
            FetchResult::Failure { url, .. } => assert_eq!(url, &urls[1]),
            FetchResult::Success { .. } => panic!("slow page should have timed out"),
        }
    }

    #[tokio::test]
    async fn cache_hit_skips_the_network() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DocumentCache::new(dir.path());
        let url = Url::parse("https://unreachable.invalid/page").unwrap();
        cache.store(&url, "<html><p>cached</p></html>").await.unwrap();

        let results = fetcher()
            .with_cache(cache)
            .fetch_all(&[url.to_string()])
            .await;

        assert_eq!(results.len(), 1);
        match &results[0] {
            FetchResult::Success { body, .. } => assert!(body.contains("cached")),
            FetchResult::Failure { reason, .. } => panic!("expected cache hit, got {reason}"),
        }
    }
}
