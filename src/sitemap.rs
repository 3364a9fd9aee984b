//! Sitemap resolution: fetch a sitemap document and extract its page URLs.

use std::time::Duration;

use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use reqwest::Client;
use tracing::warn;

use crate::types::IngestError;

const SITEMAP_NS: &[u8] = b"http://www.sitemaps.org/schemas/sitemap/0.9";

/// Resolves sitemap documents into lists of page URLs.
///
/// Resolution is best-effort by contract: any failure (non-success status,
/// timeout, network error, malformed XML) is logged and degrades to an
/// empty list. Callers must treat an empty result as "could not resolve",
/// not "the sitemap is empty", and may retry out-of-band.
#[derive(Clone)]
pub struct SitemapResolver {
    client: Client,
    timeout: Duration,
}

impl SitemapResolver {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Fetches `sitemap_url` and returns its `<loc>` entries in document
    /// order. A non-empty `filter_substring` keeps only URLs containing it
    /// as a literal, case-sensitive substring.
    pub async fn resolve(&self, sitemap_url: &str, filter_substring: &str) -> Vec<String> {
        let xml = match self.fetch_sitemap(sitemap_url).await {
            Ok(body) => body,
            Err(err) => {
                warn!(sitemap = sitemap_url, error = %err, "failed to fetch sitemap");
                return Vec::new();
            }
        };

        let urls = match parse_sitemap(&xml) {
            Ok(urls) => urls,
            Err(err) => {
                warn!(sitemap = sitemap_url, error = %err, "failed to parse sitemap");
                return Vec::new();
            }
        };

        filter_urls(urls, filter_substring)
    }

    async fn fetch_sitemap(&self, url: &str) -> Result<String, IngestError> {
        let response = self.client.get(url).timeout(self.timeout).send().await?;
        if !response.status().is_success() {
            return Err(IngestError::Fetch(format!(
                "sitemap returned status {}",
                response.status()
            )));
        }
        Ok(response.text().await?)
    }
}

/// Extracts every `<loc>` text node under the sitemap 0.9 namespace, in
/// document order. Works for both `<urlset>` and `<sitemapindex>` documents.
pub fn parse_sitemap(xml: &str) -> Result<Vec<String>, IngestError> {
    let mut reader = NsReader::from_str(xml);
    let mut urls = Vec::new();
    let mut in_loc = false;
    let mut current = String::new();

    loop {
        match reader
            .read_resolved_event()
            .map_err(|err| IngestError::Parse(err.to_string()))?
        {
            (ResolveResult::Bound(Namespace(ns)), Event::Start(element))
                if ns == SITEMAP_NS && element.local_name().as_ref() == b"loc" =>
            {
                in_loc = true;
                current.clear();
            }
            (ResolveResult::Bound(Namespace(ns)), Event::End(element))
                if ns == SITEMAP_NS && element.local_name().as_ref() == b"loc" =>
            {
                in_loc = false;
                let url = current.trim();
                if !url.is_empty() {
                    urls.push(url.to_string());
                }
            }
            (_, Event::Text(text)) if in_loc => {
                let unescaped = text
                    .unescape()
                    .map_err(|err| IngestError::Parse(err.to_string()))?;
                current.push_str(&unescaped);
            }
            (_, Event::CData(data)) if in_loc => {
                current.push_str(&String::from_utf8_lossy(&data.into_inner()));
            }
            (_, Event::Eof) => break,
            _ => {}
        }
    }

    Ok(urls)
}

fn filter_urls(urls: Vec<String>, filter_substring: &str) -> Vec<String> {
    if filter_substring.is_empty() {
        return urls;
    }
    urls.into_iter()
        .filter(|url| url.contains(filter_substring))
        .collect()
}
