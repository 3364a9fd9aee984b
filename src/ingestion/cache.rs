//! Disk-backed cache for downloaded pages.

use std::path::{Path, PathBuf};

use tokio::fs;
use url::Url;

use crate::types::IngestError;

/// Filesystem cache keyed by sanitized URL path.
///
/// URLs normalize into deterministic file names, so repeated runs reuse
/// previously downloaded pages instead of hitting the network.
#[derive(Clone, Debug)]
pub struct DocumentCache {
    root: PathBuf,
}

impl DocumentCache {
    /// Creates a cache rooted at the provided directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Cache file location for a specific URL.
    pub fn entry_path(&self, url: &Url) -> PathBuf {
        let mut components: Vec<String> = url
            .path()
            .trim_start_matches('/')
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(sanitize_component)
            .collect();

        if components.is_empty() {
            components.push("index".to_string());
        }

        let mut file_name = components.join("_");

        if let Some(query) = url.query() {
            file_name.push('_');
            file_name.push_str(&sanitize_component(query));
        }

        if Path::new(&file_name).extension().is_none() {
            file_name.push_str(".html");
        }

        self.root.join(file_name)
    }

    /// Default location for pipeline state files (resume tracking).
    pub fn state_file(&self) -> PathBuf {
        self.root.join("ingest_state.json")
    }

    /// Returns the cached body for `url`, if present and readable.
    pub async fn load(&self, url: &Url) -> Option<String> {
        fs::read_to_string(self.entry_path(url)).await.ok()
    }

    /// Persists a fetched body for later runs.
    pub async fn store(&self, url: &Url, body: &str) -> Result<(), IngestError> {
        let path = self.entry_path(url);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, body).await?;
        Ok(())
    }
}

fn sanitize_component(input: &str) -> String {
    input
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
