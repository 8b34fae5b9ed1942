use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::ProgressConfig;
use crate::ids::{RunId, ScanKey, ScanSlug};
use crate::model::ScanLifecycleStatus;
use crate::paths::RemotePath;

use super::snapshot::AggregateProgress;

/// Error reported for one path of a run.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PathError {
    pub path: RemotePath,
    pub message: String,
}

/// Immutable view of one invocation. The store swaps whole entries, so a
/// reader holding an `Arc<ProgressEntry>` always sees a consistent value.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressEntry {
    pub slug: ScanSlug,
    pub display_name: String,
    pub run_id: RunId,
    pub status: ScanLifecycleStatus,
    pub progress: Arc<AggregateProgress>,
    pub errors: Vec<PathError>,
    pub started_at: DateTime<Utc>,
    pub terminal_at: Option<DateTime<Utc>>,
    pub evict_at: Option<Instant>,
}

impl ProgressEntry {
    pub fn pending(
        slug: ScanSlug,
        display_name: impl Into<String>,
        run_id: RunId,
        paths: &[RemotePath],
    ) -> Self {
        Self {
            slug,
            display_name: display_name.into(),
            run_id,
            status: ScanLifecycleStatus::Pending,
            progress: Arc::new(AggregateProgress::pending(paths)),
            errors: Vec::new(),
            started_at: Utc::now(),
            terminal_at: None,
            evict_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.evict_at.is_some_and(|at| now >= at)
    }
}

/// Process-wide latest-progress map, keyed by canonical slug.
///
/// Display names resolve through a separate alias table so that one
/// invocation never has two diverging entries.
#[derive(Debug)]
pub struct ProgressStore {
    entries: DashMap<ScanSlug, Arc<ProgressEntry>>,
    aliases: DashMap<String, ScanSlug>,
    grace: Duration,
}

impl ProgressStore {
    pub fn new(grace: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            aliases: DashMap::new(),
            grace,
        }
    }

    pub fn from_config(config: &ProgressConfig) -> Self {
        Self::new(config.grace_window())
    }

    pub fn grace_window(&self) -> Duration {
        self.grace
    }

    /// Insert or replace the entry for `entry.slug`.
    pub fn put(&self, entry: ProgressEntry) {
        self.register_alias(&entry.display_name, &entry.slug);
        trace!(scan = %entry.slug, status = entry.status.as_str(), "progress entry stored");
        self.entries.insert(entry.slug.clone(), Arc::new(entry));
    }

    /// Make `name` resolve to `slug` in lookups.
    pub fn register_alias(&self, name: &str, slug: &ScanSlug) {
        let name = name.trim();
        if !name.is_empty() && name != slug.as_str() {
            self.aliases.insert(name.to_string(), slug.clone());
        }
    }

    /// Replace the snapshot of a live run. Ignored when the entry belongs
    /// to another run or is already terminal.
    pub fn publish_progress(
        &self,
        slug: &ScanSlug,
        run_id: RunId,
        progress: Arc<AggregateProgress>,
    ) -> bool {
        self.modify(slug, run_id, |entry| {
            if entry.status.is_terminal() {
                return false;
            }
            entry.progress = progress;
            true
        })
    }

    pub fn mark_running(&self, slug: &ScanSlug, run_id: RunId) -> bool {
        self.modify(slug, run_id, |entry| {
            if entry.status != ScanLifecycleStatus::Pending {
                return false;
            }
            entry.status = ScanLifecycleStatus::Running;
            true
        })
    }

    /// Record the terminal state of a run and schedule its eviction after the
    /// grace window.
    pub fn finish(
        &self,
        slug: &ScanSlug,
        run_id: RunId,
        status: ScanLifecycleStatus,
        progress: Arc<AggregateProgress>,
        errors: Vec<PathError>,
    ) -> bool {
        let evict_at = Instant::now() + self.grace;
        self.modify(slug, run_id, |entry| {
            if entry.status.is_terminal() {
                return false;
            }
            entry.status = status;
            entry.progress = progress;
            entry.errors = errors;
            entry.terminal_at = Some(Utc::now());
            entry.evict_at = Some(evict_at);
            true
        })
    }

    /// Schedule removal of an entry `after` from now.
    pub fn evict(&self, slug: &ScanSlug, after: Duration) -> bool {
        let Some(mut slot) = self.entries.get_mut(slug) else {
            return false;
        };
        let mut entry = ProgressEntry::clone(&slot);
        entry.evict_at = Some(Instant::now() + after);
        *slot = Arc::new(entry);
        true
    }

    /// Look up by slug first, then by display-name alias. Entries past their
    /// eviction deadline are invisible even before the sweeper removes them.
    pub fn get(&self, key: &ScanKey) -> Option<Arc<ProgressEntry>> {
        let slug = self.resolve(key)?;
        self.get_by_slug(&slug)
    }

    pub fn get_by_slug(&self, slug: &ScanSlug) -> Option<Arc<ProgressEntry>> {
        let entry = self.entries.get(slug)?.value().clone();
        if entry.is_expired(Instant::now()) {
            return None;
        }
        Some(entry)
    }

    pub fn resolve(&self, key: &ScanKey) -> Option<ScanSlug> {
        if let Some(slug) = key.as_slug()
            && self.entries.contains_key(&slug)
        {
            return Some(slug);
        }
        self.aliases.get(key.as_str()).map(|slug| slug.clone())
    }

    /// Drop expired entries and aliases that no longer point anywhere.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.aliases
                .retain(|_, slug| self.entries.contains_key(slug));
            debug!(removed, "evicted finished scans from progress store");
        }
        removed
    }

    /// Entries that are not terminal.
    pub fn active(&self) -> Vec<Arc<ProgressEntry>> {
        self.entries
            .iter()
            .filter(|entry| !entry.status.is_terminal())
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn modify(
        &self,
        slug: &ScanSlug,
        run_id: RunId,
        apply: impl FnOnce(&mut ProgressEntry) -> bool,
    ) -> bool {
        let Some(mut slot) = self.entries.get_mut(slug) else {
            return false;
        };
        if slot.run_id != run_id {
            return false;
        }
        let mut entry = ProgressEntry::clone(&slot);
        if !apply(&mut entry) {
            return false;
        }
        *slot = Arc::new(entry);
        true
    }
}
