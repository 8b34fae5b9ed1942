use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio::time::Instant;

use crate::model::SizeCounts;
use crate::paths::RemotePath;

/// Completion estimate for a scan.
///
/// `Unknown` is distinct from `Known(0.0)`: it means there is no complete
/// baseline to measure against, not that nothing has been collected.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum ProgressPercent {
    #[default]
    Unknown,
    Known(f64),
}

impl ProgressPercent {
    pub fn from_totals(current_bytes: u64, baseline_bytes: Option<u64>) -> Self {
        match baseline_bytes {
            Some(baseline) if baseline > 0 => {
                ProgressPercent::Known(current_bytes as f64 / baseline as f64 * 100.0)
            }
            _ => ProgressPercent::Unknown,
        }
    }

    /// Unclamped ratio; can exceed 100 when a directory grew past history.
    pub fn raw(&self) -> Option<f64> {
        match self {
            ProgressPercent::Known(value) => Some(*value),
            ProgressPercent::Unknown => None,
        }
    }

    /// Value shown to users, clamped to `0..=100`.
    pub fn display(&self) -> Option<f64> {
        self.raw().map(|value| value.clamp(0.0, 100.0))
    }

    pub fn is_known(&self) -> bool {
        matches!(self, ProgressPercent::Known(_))
    }
}

impl Serialize for ProgressPercent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.display() {
            Some(value) => serializer.serialize_some(&((value * 100.0).round() / 100.0)),
            None => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for ProgressPercent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?
            .map(ProgressPercent::Known)
            .unwrap_or_default())
    }
}

/// One status reading for a path, as observed by its polling loop.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PathReport {
    pub counts: SizeCounts,
    pub finished: bool,
    pub waited: Duration,
    pub observed_at: Instant,
}

impl PathReport {
    pub fn new(counts: SizeCounts, finished: bool, waited: Duration) -> Self {
        Self {
            counts,
            finished,
            waited,
            observed_at: Instant::now(),
        }
    }

    pub fn observed_at(mut self, at: Instant) -> Self {
        self.observed_at = at;
        self
    }
}

/// Per-path mirror of a remote task, owned by the aggregator.
#[derive(Clone, Debug, PartialEq)]
pub struct PathTaskStatus {
    pub path: RemotePath,
    pub counts: SizeCounts,
    pub finished: bool,
    pub waited: Duration,
    pub error: Option<String>,
    pub observed_at: Option<Instant>,
    pub last_growth_at: Option<Instant>,
}

impl PathTaskStatus {
    pub fn new(path: RemotePath) -> Self {
        Self {
            path,
            counts: SizeCounts::ZERO,
            finished: false,
            waited: Duration::ZERO,
            error: None,
            observed_at: None,
            last_growth_at: None,
        }
    }

    pub fn is_observed(&self) -> bool {
        self.observed_at.is_some()
    }
}

/// Per-path slice of an [`AggregateProgress`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathProgress {
    pub path: RemotePath,
    pub num_dir: u64,
    pub num_file: u64,
    pub total_size: u64,
    pub finished: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&PathTaskStatus> for PathProgress {
    fn from(status: &PathTaskStatus) -> Self {
        Self {
            path: status.path.clone(),
            num_dir: status.counts.num_dir,
            num_file: status.counts.num_file,
            total_size: status.counts.total_size,
            finished: status.finished,
            error: status.error.clone(),
        }
    }
}

/// Combined progress of one scan invocation. Published as an immutable
/// value; a newer snapshot replaces it wholesale.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateProgress {
    pub num_dir: u64,
    pub num_file: u64,
    pub total_size: u64,
    /// Seconds the longest-running path task has been outstanding.
    pub waited: u64,
    pub finished: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_path: Option<RemotePath>,
    #[serde(default)]
    pub progress_percent: ProgressPercent,
    pub expected_paths: usize,
    pub finished_paths: usize,
    #[serde(default)]
    pub paths: Vec<PathProgress>,
}

impl AggregateProgress {
    /// Snapshot for a registered but not yet started invocation.
    pub fn pending(expected: &[RemotePath]) -> Self {
        Self {
            expected_paths: expected.len(),
            paths: expected
                .iter()
                .cloned()
                .map(|path| PathProgress::from(&PathTaskStatus::new(path)))
                .collect(),
            ..Self::default()
        }
    }

    pub fn counts(&self) -> SizeCounts {
        SizeCounts::new(self.num_dir, self.num_file, self.total_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_unknown_without_positive_baseline() {
        assert_eq!(ProgressPercent::from_totals(10, None), ProgressPercent::Unknown);
        assert_eq!(ProgressPercent::from_totals(10, Some(0)), ProgressPercent::Unknown);
    }

    #[test]
    fn display_clamps_but_raw_does_not() {
        let grown = ProgressPercent::from_totals(3000, Some(1000));
        assert_eq!(grown.raw(), Some(300.0));
        assert_eq!(grown.display(), Some(100.0));
    }

    #[test]
    fn serializes_as_nullable_number() {
        let known = serde_json::to_string(&ProgressPercent::from_totals(875, Some(1000))).unwrap();
        assert_eq!(known, "87.5");
        let unknown = serde_json::to_string(&ProgressPercent::Unknown).unwrap();
        assert_eq!(unknown, "null");

        let parsed: ProgressPercent = serde_json::from_str("null").unwrap();
        assert_eq!(parsed, ProgressPercent::Unknown);
    }

    #[test]
    fn pending_snapshot_lists_expected_paths() {
        let snapshot =
            AggregateProgress::pending(&[RemotePath::new("/a"), RemotePath::new("/b")]);
        assert_eq!(snapshot.expected_paths, 2);
        assert_eq!(snapshot.paths.len(), 2);
        assert!(!snapshot.finished);
        assert!(!snapshot.progress_percent.is_known());
    }
}
