//! Resume support for interrupted ingestion runs.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::sync::Mutex;

use crate::types::IngestError;

/// Persisted set of already-processed URLs.
///
/// A pipeline configured with a tracker skips URLs recorded by earlier runs
/// and marks newly ingested ones, so a crashed or interrupted run picks up
/// where it left off.
#[derive(Clone, Debug)]
pub struct ResumeTracker {
    path: PathBuf,
    seen: Arc<Mutex<HashSet<String>>>,
}

impl ResumeTracker {
    /// Creates a tracker that persists state to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            seen: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads previously persisted state, if any.
    pub async fn load(&self) -> Result<(), IngestError> {
        if !self.path.exists() {
            return Ok(());
        }
        let data = fs::read_to_string(&self.path).await?;
        let urls: Vec<String> =
            serde_json::from_str(&data).map_err(|err| IngestError::Io(err.to_string()))?;
        let mut seen = self.seen.lock().await;
        seen.clear();
        seen.extend(urls);
        Ok(())
    }

    /// Returns `true` if `url` was already processed.
    pub async fn contains(&self, url: &str) -> bool {
        self.seen.lock().await.contains(url)
    }

    /// Records `url` as processed and persists the updated state.
    pub async fn mark_processed(&self, url: &str) -> Result<(), IngestError> {
        let mut seen = self.seen.lock().await;
        let inserted = seen.insert(url.to_string());
        if !inserted && self.path.exists() {
            return Ok(());
        }
        let mut urls: Vec<String> = seen.iter().cloned().collect();
        drop(seen);
        urls.sort();

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let serialized =
            serde_json::to_string(&urls).map_err(|err| IngestError::Io(err.to_string()))?;
        fs::write(&self.path, serialized).await?;
        Ok(())
    }
}
