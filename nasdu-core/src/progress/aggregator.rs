use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::baseline::Baseline;
use crate::error::{Result, ScanError};
use crate::ids::{RunId, ScanSlug};
use crate::model::SizeCounts;
use crate::paths::{CaseFolding, PathKey, RemotePath};

use super::snapshot::{AggregateProgress, PathProgress, PathReport, PathTaskStatus, ProgressPercent};
use super::store::ProgressStore;

/// Everything the aggregator needs to know up front about an invocation.
#[derive(Clone, Debug)]
pub struct Registration {
    pub slug: ScanSlug,
    pub run_id: RunId,
    pub paths: Vec<RemotePath>,
    pub baseline: Baseline,
    pub folding: CaseFolding,
}

/// What happened to an `update` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    /// Older than the last accepted report for the path.
    Stale,
    /// The path already reached its terminal state.
    Settled,
}

/// Combines independently progressing path tasks into one snapshot.
///
/// Each path has its own lock, so a slow update on one path never holds up
/// another. Recomputing the aggregate is serialized through `publish` and
/// only reads per-path state for the duration of a copy.
pub struct ProgressAggregator {
    slug: ScanSlug,
    run_id: RunId,
    folding: CaseFolding,
    order: Vec<PathKey>,
    paths: HashMap<PathKey, Mutex<PathTaskStatus>>,
    baseline: Baseline,
    publish: Mutex<()>,
    latest: RwLock<Arc<AggregateProgress>>,
    store: Arc<ProgressStore>,
}

impl ProgressAggregator {
    /// Declare the expected path set. Duplicate paths (after normalization)
    /// collapse into one entry.
    pub fn register(store: Arc<ProgressStore>, registration: Registration) -> Result<Self> {
        let Registration {
            slug,
            run_id,
            paths: requested,
            baseline,
            folding,
        } = registration;

        if requested.is_empty() {
            return Err(ScanError::InvalidInvocation(format!(
                "scan {slug} has no paths to measure"
            )));
        }

        let mut order = Vec::with_capacity(requested.len());
        let mut paths = HashMap::with_capacity(requested.len());
        for path in requested {
            let key = path.key(folding);
            if paths.contains_key(&key) {
                continue;
            }
            order.push(key.clone());
            paths.insert(key, Mutex::new(PathTaskStatus::new(path)));
        }

        let aggregator = Self {
            slug,
            run_id,
            folding,
            order,
            paths,
            baseline,
            publish: Mutex::new(()),
            latest: RwLock::new(Arc::new(AggregateProgress::default())),
            store,
        };
        aggregator.publish();
        Ok(aggregator)
    }

    pub fn slug(&self) -> &ScanSlug {
        &self.slug
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Registered paths in registration order.
    pub fn paths(&self) -> Vec<RemotePath> {
        self.order
            .iter()
            .filter_map(|key| self.paths.get(key))
            .map(|slot| slot.lock().path.clone())
            .collect()
    }

    /// Apply one status reading and republish the aggregate.
    pub fn update(&self, path: &RemotePath, report: PathReport) -> Result<UpdateOutcome> {
        let outcome = {
            let mut status = self.slot(path)?.lock();
            apply_report(&mut status, report)
        };
        if outcome == UpdateOutcome::Applied {
            self.publish();
        } else {
            trace!(scan = %self.slug, path = %path, ?outcome, "ignored path report");
        }
        Ok(outcome)
    }

    /// Mark a path as finished with partial data and an error.
    pub fn fail_path(&self, path: &RemotePath, error: impl Into<String>) -> Result<UpdateOutcome> {
        let error = error.into();
        let outcome = {
            let mut status = self.slot(path)?.lock();
            if status.finished {
                UpdateOutcome::Settled
            } else {
                debug!(scan = %self.slug, path = %path, %error, "path failed");
                status.finished = true;
                status.error = Some(error);
                status.observed_at.get_or_insert_with(tokio::time::Instant::now);
                UpdateOutcome::Applied
            }
        };
        if outcome == UpdateOutcome::Applied {
            self.publish();
        }
        Ok(outcome)
    }

    /// Last counts recorded for a path.
    pub fn path_counts(&self, path: &RemotePath) -> Option<SizeCounts> {
        self.paths
            .get(&path.key(self.folding))
            .map(|slot| slot.lock().counts)
    }

    pub fn path_status(&self, path: &RemotePath) -> Option<PathTaskStatus> {
        self.paths
            .get(&path.key(self.folding))
            .map(|slot| slot.lock().clone())
    }

    pub fn snapshot(&self) -> Arc<AggregateProgress> {
        self.latest.read().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.latest.read().finished
    }

    fn slot(&self, path: &RemotePath) -> Result<&Mutex<PathTaskStatus>> {
        self.paths.get(&path.key(self.folding)).ok_or_else(|| {
            ScanError::Internal(format!("path {path} is not registered for scan {}", self.slug))
        })
    }

    fn publish(&self) {
        let _guard = self.publish.lock();
        if self.latest.read().finished {
            return;
        }

        let statuses: Vec<PathTaskStatus> = self
            .order
            .iter()
            .filter_map(|key| self.paths.get(key))
            .map(|slot| slot.lock().clone())
            .collect();
        let snapshot = Arc::new(self.combine(&statuses));

        *self.latest.write() = snapshot.clone();
        self.store.publish_progress(&self.slug, self.run_id, snapshot);
    }

    fn combine(&self, statuses: &[PathTaskStatus]) -> AggregateProgress {
        let counts = statuses
            .iter()
            .fold(SizeCounts::ZERO, |acc, status| acc.saturating_add(status.counts));
        let observed = statuses.iter().filter(|s| s.is_observed()).count();
        let finished_paths = statuses.iter().filter(|s| s.finished).count();
        let finished = observed == self.order.len() && finished_paths == self.order.len();

        let baseline_total = self.baseline.total_for(&self.order);
        let waited = statuses
            .iter()
            .map(|s| s.waited)
            .max()
            .unwrap_or(Duration::ZERO);

        AggregateProgress {
            num_dir: counts.num_dir,
            num_file: counts.num_file,
            total_size: counts.total_size,
            waited: waited.as_secs(),
            finished,
            current_path: if finished { None } else { current_path(statuses) },
            progress_percent: ProgressPercent::from_totals(counts.total_size, baseline_total),
            expected_paths: self.order.len(),
            finished_paths,
            paths: statuses.iter().map(PathProgress::from).collect(),
        }
    }
}

impl std::fmt::Debug for ProgressAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressAggregator")
            .field("slug", &self.slug)
            .field("run_id", &self.run_id)
            .field("paths", &self.order.len())
            .finish_non_exhaustive()
    }
}

fn apply_report(status: &mut PathTaskStatus, report: PathReport) -> UpdateOutcome {
    if status.finished {
        return UpdateOutcome::Settled;
    }
    if status
        .observed_at
        .is_some_and(|previous| report.observed_at < previous)
    {
        return UpdateOutcome::Stale;
    }

    let merged = status.counts.max(report.counts);
    if merged.grew_since(&status.counts) {
        status.last_growth_at = Some(report.observed_at);
    }
    status.counts = merged;
    status.waited = status.waited.max(report.waited);
    status.observed_at = Some(report.observed_at);
    if report.finished {
        status.finished = true;
    }
    UpdateOutcome::Applied
}

/// The unfinished path that grew most recently, falling back to the first
/// unfinished path that has reported at all.
fn current_path(statuses: &[PathTaskStatus]) -> Option<RemotePath> {
    let active = statuses.iter().filter(|s| !s.finished);
    active
        .clone()
        .filter(|s| s.last_growth_at.is_some())
        .max_by_key(|s| s.last_growth_at)
        .or_else(|| active.clone().find(|s| s.is_observed()))
        .map(|s| s.path.clone())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tokio::time::Instant;

    use super::*;
    use crate::model::ScanLifecycleStatus;
    use crate::progress::store::ProgressEntry;

    fn alice() -> RemotePath {
        RemotePath::new("homes/alice")
    }

    fn bob() -> RemotePath {
        RemotePath::new("homes/bob")
    }

    fn registration(paths: Vec<RemotePath>, baseline: Baseline) -> Registration {
        Registration {
            slug: ScanSlug::parse("homes").unwrap(),
            run_id: RunId::new(),
            paths,
            baseline,
            folding: CaseFolding::Sensitive,
        }
    }

    fn bytes(total: u64) -> SizeCounts {
        SizeCounts::new(0, 0, total)
    }

    fn report(total: u64, finished: bool) -> PathReport {
        PathReport::new(bytes(total), finished, Duration::from_secs(1))
    }

    fn complete_baseline(entries: &[(RemotePath, u64)]) -> Baseline {
        Baseline::Complete(
            entries
                .iter()
                .map(|(path, size)| (path.key(CaseFolding::Sensitive), *size))
                .collect::<HashMap<_, _>>(),
        )
    }

    fn store() -> Arc<ProgressStore> {
        Arc::new(ProgressStore::new(Duration::from_secs(8)))
    }

    #[test]
    fn empty_path_set_is_rejected() {
        let err = ProgressAggregator::register(store(), registration(vec![], Baseline::Empty))
            .expect_err("empty registration");
        assert!(matches!(err, ScanError::InvalidInvocation(_)));
    }

    #[test]
    fn weighted_percent_follows_baseline() {
        let baseline = complete_baseline(&[(alice(), 1000), (bob(), 3000)]);
        let aggregator =
            ProgressAggregator::register(store(), registration(vec![alice(), bob()], baseline))
                .expect("register");

        aggregator.update(&alice(), report(500, false)).unwrap();
        aggregator.update(&bob(), report(3000, true)).unwrap();

        let snapshot = aggregator.snapshot();
        assert!(!snapshot.finished);
        assert_eq!(snapshot.progress_percent.raw(), Some(87.5));
        assert_eq!(snapshot.current_path, Some(alice()));

        aggregator.update(&alice(), report(1000, true)).unwrap();
        let snapshot = aggregator.snapshot();
        assert!(snapshot.finished);
        assert_eq!(snapshot.progress_percent.display(), Some(100.0));
        assert_eq!(snapshot.finished_paths, 2);
    }

    #[test]
    fn two_of_three_finished_is_not_finished() {
        let carol = RemotePath::new("/homes/carol");
        let aggregator = ProgressAggregator::register(
            store(),
            registration(vec![alice(), bob(), carol], Baseline::Empty),
        )
        .unwrap();

        aggregator.update(&alice(), report(10, true)).unwrap();
        aggregator.update(&bob(), report(10, true)).unwrap();

        let snapshot = aggregator.snapshot();
        assert!(!snapshot.finished);
        assert_eq!(snapshot.finished_paths, 2);
        assert_eq!(snapshot.expected_paths, 3);
    }

    #[test]
    fn partial_baseline_yields_unknown_percent() {
        let mut known = HashMap::new();
        known.insert(alice().key(CaseFolding::Sensitive), 1000);
        let baseline = Baseline::Incomplete {
            known,
            missing: vec![bob()],
        };
        let aggregator =
            ProgressAggregator::register(store(), registration(vec![alice(), bob()], baseline))
                .unwrap();

        aggregator.update(&alice(), report(800, false)).unwrap();
        assert_eq!(aggregator.snapshot().progress_percent, ProgressPercent::Unknown);
    }

    #[test]
    fn counts_never_regress_and_stale_reports_are_dropped() {
        let aggregator =
            ProgressAggregator::register(store(), registration(vec![alice()], Baseline::Empty))
                .unwrap();

        let early = Instant::now();
        let late = early + Duration::from_millis(500);

        aggregator
            .update(&alice(), report(700, false).observed_at(late))
            .unwrap();
        let outcome = aggregator
            .update(&alice(), report(200, false).observed_at(early))
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Stale);
        assert_eq!(aggregator.snapshot().total_size, 700);

        aggregator
            .update(
                &alice(),
                PathReport::new(SizeCounts::new(3, 1, 650), false, Duration::from_secs(2))
                    .observed_at(late + Duration::from_millis(1)),
            )
            .unwrap();
        let snapshot = aggregator.snapshot();
        assert_eq!(snapshot.total_size, 700);
        assert_eq!(snapshot.num_dir, 3);
    }

    #[test]
    fn finished_snapshot_is_frozen() {
        let aggregator =
            ProgressAggregator::register(store(), registration(vec![alice()], Baseline::Empty))
                .unwrap();
        aggregator.update(&alice(), report(100, true)).unwrap();
        let frozen = aggregator.snapshot();

        let outcome = aggregator.update(&alice(), report(900, true)).unwrap();
        assert_eq!(outcome, UpdateOutcome::Settled);
        assert!(Arc::ptr_eq(&frozen, &aggregator.snapshot()));
    }

    #[test]
    fn failed_path_keeps_partial_counts() {
        let aggregator = ProgressAggregator::register(
            store(),
            registration(vec![alice(), bob()], Baseline::Empty),
        )
        .unwrap();
        aggregator.update(&alice(), report(400, false)).unwrap();
        aggregator.fail_path(&alice(), "permission denied").unwrap();
        aggregator.update(&bob(), report(100, true)).unwrap();

        let snapshot = aggregator.snapshot();
        assert!(snapshot.finished);
        assert_eq!(snapshot.total_size, 500);
        assert_eq!(
            snapshot.paths[0].error.as_deref(),
            Some("permission denied")
        );
    }

    #[test]
    fn unregistered_paths_are_rejected() {
        let aggregator =
            ProgressAggregator::register(store(), registration(vec![alice()], Baseline::Empty))
                .unwrap();
        assert!(aggregator.update(&bob(), report(1, false)).is_err());
    }

    #[test]
    fn duplicate_paths_collapse_after_normalization() {
        let aggregator = ProgressAggregator::register(
            store(),
            registration(
                vec![alice(), RemotePath::new("/homes/alice/")],
                Baseline::Empty,
            ),
        )
        .unwrap();
        assert_eq!(aggregator.paths().len(), 1);
        aggregator.update(&alice(), report(1, true)).unwrap();
        assert!(aggregator.is_finished());
    }

    #[test]
    fn updates_are_published_to_the_store() {
        let store = store();
        let registration = registration(vec![alice()], Baseline::Empty);
        store.put(ProgressEntry::pending(
            registration.slug.clone(),
            "Homes",
            registration.run_id,
            &registration.paths,
        ));

        let aggregator = ProgressAggregator::register(store.clone(), registration).unwrap();
        aggregator.update(&alice(), report(42, false)).unwrap();

        let entry = store
            .get_by_slug(aggregator.slug())
            .expect("entry present");
        assert_eq!(entry.progress.total_size, 42);
        assert_eq!(entry.status, ScanLifecycleStatus::Pending);
    }
}
