//! Persisted scan history contract.
//!
//! The runner writes one [`ScanResult`] per finished run; the baseline
//! resolver reads the sizes of the last completed run back as weights. Concrete
//! stores live next to whatever owns the storage medium. The in-memory store
//! here backs tests and one-shot CLI runs.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::HistoryError;
use crate::ids::ScanSlug;
use crate::model::{ScanLifecycleStatus, ScanResult};
use crate::paths::{CaseFolding, PathKey, RemotePath};

/// Selects results (or per-path items of results) to delete.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    pub scan_slug: Option<ScanSlug>,
    pub path: Option<RemotePath>,
    pub older_than: Option<DateTime<Utc>>,
}

impl HistoryFilter {
    pub fn for_scan(slug: ScanSlug) -> Self {
        Self {
            scan_slug: Some(slug),
            ..Self::default()
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.scan_slug.is_none() && self.path.is_none() && self.older_than.is_none()
    }

    /// Whether the whole result falls under the scan and age criteria.
    pub fn matches_result(&self, result: &ScanResult) -> bool {
        if let Some(slug) = &self.scan_slug
            && &result.scan_slug != slug
        {
            return false;
        }
        if let Some(cutoff) = self.older_than
            && result.timestamp >= cutoff
        {
            return false;
        }
        true
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub result_count: usize,
    pub scan_count: usize,
    pub path_count: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn put(&self, result: ScanResult) -> Result<(), HistoryError>;

    async fn latest(&self, slug: &ScanSlug) -> Result<Option<ScanResult>, HistoryError>;

    /// Results for one scan, newest first.
    async fn list(
        &self,
        slug: &ScanSlug,
        limit: Option<usize>,
    ) -> Result<Vec<ScanResult>, HistoryError>;

    /// Byte size per path from the newest completed run of `slug` that
    /// measured exactly `paths`. Empty when there is no such run.
    async fn completed_sizes(
        &self,
        slug: &ScanSlug,
        paths: &[RemotePath],
        folding: CaseFolding,
    ) -> Result<HashMap<PathKey, u64>, HistoryError>;

    /// Returns the number of removed entries (whole results, or path items
    /// when the filter names a path).
    async fn delete(&self, filter: &HistoryFilter) -> Result<usize, HistoryError>;

    async fn stats(&self) -> Result<HistoryStats, HistoryError>;
}

/// Per-path byte sizes of the newest completed result of `slug` whose path
/// set equals `paths`. Results ordered newest first. Zero-byte items carry
/// no weight and are left out.
pub fn completed_sizes_from<'a>(
    newest_first: impl IntoIterator<Item = &'a ScanResult>,
    slug: &ScanSlug,
    paths: &[RemotePath],
    folding: CaseFolding,
) -> HashMap<PathKey, u64> {
    let wanted: HashSet<PathKey> = paths.iter().map(|p| p.key(folding)).collect();

    let matching = newest_first.into_iter().find(|result| {
        &result.scan_slug == slug
            && result.status == ScanLifecycleStatus::Completed
            && result
                .results
                .iter()
                .map(|item| item.path.key(folding))
                .collect::<HashSet<_>>()
                == wanted
    });

    matching
        .map(|result| {
            result
                .results
                .iter()
                .filter(|item| item.success && item.total_size.bytes > 0)
                .map(|item| (item.path.key(folding), item.total_size.bytes))
                .collect()
        })
        .unwrap_or_default()
}

/// Apply `filter` to `results` in place, returning the removed entry count.
pub fn apply_delete(
    results: &mut Vec<ScanResult>,
    filter: &HistoryFilter,
    folding: CaseFolding,
) -> usize {
    let Some(path) = &filter.path else {
        let before = results.len();
        results.retain(|result| !filter.matches_result(result));
        return before - results.len();
    };

    let key = path.key(folding);
    let mut removed = 0;
    for result in results.iter_mut().filter(|r| filter.matches_result(r)) {
        let before = result.results.len();
        result.results.retain(|item| item.path.key(folding) != key);
        removed += before - result.results.len();
    }
    results.retain(|result| !result.results.is_empty() || result.error.is_some());
    removed
}

pub fn stats_for(results: &[ScanResult]) -> HistoryStats {
    let scans: HashSet<&ScanSlug> = results.iter().map(|r| &r.scan_slug).collect();
    let paths: HashSet<&RemotePath> = results
        .iter()
        .flat_map(|r| r.results.iter().map(|item| &item.path))
        .collect();
    HistoryStats {
        result_count: results.len(),
        scan_count: scans.len(),
        path_count: paths.len(),
        oldest: results.iter().map(|r| r.timestamp).min(),
        newest: results.iter().map(|r| r.timestamp).max(),
    }
}

/// Sort newest first; ties keep insertion order reversed.
pub fn newest_first(results: &mut [ScanResult]) {
    results.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

/// Process-local history, newest result last.
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    results: RwLock<Vec<ScanResult>>,
    folding: CaseFolding,
}

impl InMemoryHistoryStore {
    pub fn new(folding: CaseFolding) -> Self {
        Self {
            results: RwLock::new(Vec::new()),
            folding,
        }
    }

    pub fn with_results(results: Vec<ScanResult>, folding: CaseFolding) -> Self {
        Self {
            results: RwLock::new(results),
            folding,
        }
    }

    pub fn len(&self) -> usize {
        self.results.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.read().is_empty()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn put(&self, result: ScanResult) -> Result<(), HistoryError> {
        self.results.write().push(result);
        Ok(())
    }

    async fn latest(&self, slug: &ScanSlug) -> Result<Option<ScanResult>, HistoryError> {
        Ok(self
            .results
            .read()
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
            .read()
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
            .read()
            .iter()
            .rev()
            .filter(|r| &r.scan_slug == slug)
            .cloned()
            .collect();
        newest_first(&mut snapshot);
        Ok(completed_sizes_from(&snapshot, slug, paths, folding))
    }

    async fn delete(&self, filter: &HistoryFilter) -> Result<usize, HistoryError> {
        Ok(apply_delete(&mut self.results.write(), filter, self.folding))
    }

    async fn stats(&self) -> Result<HistoryStats, HistoryError> {
        Ok(stats_for(&self.results.read()))
    }
}
