//! Read side used by the CLI and the HTTP API.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ids::{RunId, ScanKey, ScanSlug};
use crate::model::ScanLifecycleStatus;

use super::snapshot::AggregateProgress;
use super::store::{PathError, ProgressEntry, ProgressStore};

/// Status vocabulary exposed to pollers. `pending` is folded into
/// `running`; callers only care whether work is still in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollStatus {
    Running,
    Completed,
    Failed,
}

impl PollStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollStatus::Running => "running",
            PollStatus::Completed => "completed",
            PollStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, PollStatus::Running)
    }
}

impl From<ScanLifecycleStatus> for PollStatus {
    fn from(status: ScanLifecycleStatus) -> Self {
        match status {
            ScanLifecycleStatus::Pending | ScanLifecycleStatus::Running => PollStatus::Running,
            ScanLifecycleStatus::Completed => PollStatus::Completed,
            ScanLifecycleStatus::Failed => PollStatus::Failed,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub scan_slug: ScanSlug,
    pub scan_name: String,
    pub run_id: RunId,
    pub status: PollStatus,
    pub progress: Arc<AggregateProgress>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<PathError>,
}

impl From<&ProgressEntry> for ProgressReport {
    fn from(entry: &ProgressEntry) -> Self {
        Self {
            scan_slug: entry.slug.clone(),
            scan_name: entry.display_name.clone(),
            run_id: entry.run_id,
            status: entry.status.into(),
            progress: entry.progress.clone(),
            errors: entry.errors.clone(),
        }
    }
}

/// Outcome of a progress lookup. `NotFound` is a normal answer, not an error.
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressView {
    NotFound,
    Found(ProgressReport),
}

impl ProgressView {
    pub fn report(&self) -> Option<&ProgressReport> {
        match self {
            ProgressView::Found(report) => Some(report),
            ProgressView::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, ProgressView::Found(_))
    }
}

/// Pure reader over the [`ProgressStore`]; never touches runner state.
#[derive(Clone, Debug)]
pub struct ProgressReader {
    store: Arc<ProgressStore>,
}

impl ProgressReader {
    pub fn new(store: Arc<ProgressStore>) -> Self {
        Self { store }
    }

    /// Only a malformed id is an error; unknown and evicted scans are
    /// [`ProgressView::NotFound`].
    pub fn get_progress(&self, raw_id: &str) -> Result<ProgressView> {
        let key = ScanKey::parse(raw_id)?;
        Ok(self.lookup(&key))
    }

    pub fn lookup(&self, key: &ScanKey) -> ProgressView {
        match self.store.get(key) {
            Some(entry) => ProgressView::Found(ProgressReport::from(entry.as_ref())),
            None => ProgressView::NotFound,
        }
    }
}
