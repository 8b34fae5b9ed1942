//! History persisted as one JSON document.
//!
//! Every mutation rewrites the document through a temp file and a rename,
//! so a crash leaves either the old or the new file behind.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use nasdu_core::HistoryError;
use nasdu_core::history::{
    HistoryFilter, HistoryStats, HistoryStore, apply_delete, completed_sizes_from,
    newest_first, stats_for,
};
use nasdu_core::ids::ScanSlug;
use nasdu_core::model::ScanResult;
use nasdu_core::paths::{CaseFolding, PathKey, RemotePath};

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct HistoryDocument {
    version: u32,
    results: Vec<ScanResult>,
}

#[derive(Debug)]
pub struct JsonFileHistoryStore {
    path: PathBuf,
    results: Mutex<Vec<ScanResult>>,
    folding: CaseFolding,
}

impl JsonFileHistoryStore {
    /// Load `path`, or start empty when it does not exist yet.
    pub async fn open(
        path: impl Into<PathBuf>,
        folding: CaseFolding,
    ) -> Result<Self, HistoryError> {
        let path = path.into();
        let results = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let document: HistoryDocument = serde_json::from_slice(&bytes)?;
                if document.version != FORMAT_VERSION {
                    return Err(HistoryError::Internal(format!(
                        "unsupported history format version {} in {}",
                        document.version,
                        path.display()
                    )));
                }
                document.results
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };

        info!(path = %path.display(), results = results.len(), "history loaded");
        Ok(Self {
            path,
            results: Mutex::new(results),
            folding,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn len(&self) -> usize {
        self.results.lock().await.len()
    }

    async fn persist(&self, results: &[ScanResult]) -> Result<(), HistoryError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let document = HistoryDocument {
            version: FORMAT_VERSION,
            results: results.to_vec(),
        };
        let bytes = serde_json::to_vec_pretty(&document)?;

        let mut temp = self.path.clone().into_os_string();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);
        tokio::fs::write(&temp, &bytes).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        debug!(path = %self.path.display(), bytes = bytes.len(), "history written");
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for JsonFileHistoryStore {
    async fn put(&self, result: ScanResult) -> Result<(), HistoryError> {
        let mut results = self.results.lock().await;
        results.push(result);
        if let Err(err) = self.persist(&results).await {
            results.pop();
            return Err(err);
        }
        Ok(())
    }

    async fn latest(&self, slug: &ScanSlug) -> Result<Option<ScanResult>, HistoryError> {
        Ok(self
            .results
            .lock()
            .await
            .iter()
            .filter(|r| &r.scan_slug == slug)
            .max_by_key(|r| r.timestamp)
            .cloned())
    }

    async fn list(
        &self,
        slug: &ScanSlug,
        limit: Option<usize>,
    ) -> Result<Vec<ScanResult>, HistoryError> {
        let mut matching: Vec<ScanResult> = self
            .results
            .lock()
            .await
            .iter()
            .rev()
            .filter(|r| &r.scan_slug == slug)
            .cloned()
            .collect();
        newest_first(&mut matching);
        if let Some(limit) = limit {
            matching.truncate(limit);
        }
        Ok(matching)
    }

    async fn completed_sizes(
        &self,
        slug: &ScanSlug,
        paths: &[RemotePath],
        folding: CaseFolding,
    ) -> Result<HashMap<PathKey, u64>, HistoryError> {
        let mut snapshot: Vec<ScanResult> = self
            .results
            .lock()
            .await
            .iter()
            .rev()
            .filter(|r| &r.scan_slug == slug)
            .cloned()
            .collect();
        newest_first(&mut snapshot);
        Ok(completed_sizes_from(&snapshot, slug, paths, folding))
    }

    async fn delete(&self, filter: &HistoryFilter) -> Result<usize, HistoryError> {
        let mut results = self.results.lock().await;
        let previous = results.clone();
        let removed = apply_delete(&mut results, filter, self.folding);
        if removed > 0
            && let Err(err) = self.persist(&results).await
        {
            *results = previous;
            return Err(err);
        }
        Ok(removed)
    }

    async fn stats(&self) -> Result<HistoryStats, HistoryError> {
        Ok(stats_for(&self.results.lock().await))
    }
}
