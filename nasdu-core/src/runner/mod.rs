//! Drives one scan invocation end to end: starts remote tasks, polls them
//! with an adaptive cadence, feeds the aggregator and persists the result.

pub mod cadence;
pub mod ledger;
pub mod retry;

pub use cadence::PollCadence;
pub use ledger::TaskLedger;
pub use retry::{CallError, RetryPolicy};

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::time::{Instant, sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::baseline::BaselineResolver;
use crate::config::RunnerConfig;
use crate::error::{Result, ScanError};
use crate::history::HistoryStore;
use crate::model::{
    PathOutcome, ScanInvocation, ScanLifecycleStatus, ScanMode, ScanResult, SizeCounts,
};
use crate::paths::{CaseFolding, RemotePath};
use crate::progress::{PathError, PathReport, ProgressAggregator, ProgressEntry, ProgressStore, Registration};
use crate::remote::{RemoteSizeTasks, RemoteTaskStatus, TaskHandle};

const CANCELLED: &str = "scan cancelled";

/// How long a start call that outlived its path may take to hand back the
/// task so it can be stopped.
const START_SETTLE: Duration = Duration::from_secs(5);

/// Stand-in ceiling when `max_wait` does not fit in an `Instant`.
const UNBOUNDED_WAIT: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

pub struct ScanRunner {
    remote: Arc<dyn RemoteSizeTasks>,
    history: Arc<dyn HistoryStore>,
    store: Arc<ProgressStore>,
    baseline: BaselineResolver,
    config: RunnerConfig,
    retry: RetryPolicy,
}

impl ScanRunner {
    pub fn new(
        remote: Arc<dyn RemoteSizeTasks>,
        history: Arc<dyn HistoryStore>,
        store: Arc<ProgressStore>,
        config: RunnerConfig,
        folding: CaseFolding,
    ) -> Self {
        Self {
            baseline: BaselineResolver::new(history.clone(), folding),
            retry: RetryPolicy::new(config.retry),
            remote,
            history,
            store,
            config,
        }
    }

    pub fn store(&self) -> &Arc<ProgressStore> {
        &self.store
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Execute `invocation` until every path resolves or `cancel` fires.
    ///
    /// Path failures never abort siblings; they surface as failed outcomes
    /// and a `Failed` terminal status. The progress entry turns terminal
    /// first, then the result is written to history exactly once. The entry
    /// stays readable for the grace window.
    #[instrument(skip_all, fields(scan = %invocation.slug, run = %invocation.run_id))]
    pub async fn run(
        &self,
        invocation: ScanInvocation,
        cancel: CancellationToken,
    ) -> Result<ScanResult> {
        if invocation.paths.is_empty() {
            return Err(ScanError::InvalidInvocation(format!(
                "scan {} has no paths to measure",
                invocation.slug
            )));
        }

        let ScanInvocation {
            run_id,
            slug,
            name,
            paths,
            mode,
        } = invocation;
        let started_at = Utc::now();

        self.store
            .put(ProgressEntry::pending(slug.clone(), &name, run_id, &paths));
        info!(paths = paths.len(), ?mode, "scan started");

        let baseline = self.baseline.resolve(&slug, &paths).await;
        let aggregator = ProgressAggregator::register(
            self.store.clone(),
            Registration {
                slug: slug.clone(),
                run_id,
                paths,
                baseline,
                folding: self.baseline.folding(),
            },
        )?;
        let paths = aggregator.paths();
        let ledger = TaskLedger::new(self.remote.clone());
        let driver = PathDriver {
            runner: self,
            aggregator: &aggregator,
            ledger: &ledger,
            cancel: &cancel,
        };

        let mut outcomes: Vec<(usize, PathOutcome)> = match mode {
            ScanMode::Parallel => {
                let driver = &driver;
                stream::iter(paths.into_iter().enumerate())
                    .map(|(index, path)| async move { (index, driver.measure(path).await) })
                    .buffer_unordered(self.config.parallel_limit())
                    .collect()
                    .await
            }
            ScanMode::Sequential => {
                let mut outcomes = Vec::with_capacity(paths.len());
                for (index, path) in paths.into_iter().enumerate() {
                    outcomes.push((index, driver.measure(path).await));
                }
                outcomes
            }
        };
        outcomes.sort_by_key(|(index, _)| *index);
        let results: Vec<PathOutcome> = outcomes.into_iter().map(|(_, outcome)| outcome).collect();

        let leftover = ledger.stop_all().await;
        if leftover > 0 {
            warn!(leftover, "stopped remote tasks still outstanding at scan exit");
        }

        let errors: Vec<PathError> = results
            .iter()
            .filter(|outcome| !outcome.success)
            .map(|outcome| PathError {
                path: outcome.path.clone(),
                message: outcome.error.clone().unwrap_or_default(),
            })
            .collect();
        let status = if errors.is_empty() {
            ScanLifecycleStatus::Completed
        } else {
            ScanLifecycleStatus::Failed
        };
        let error = if cancel.is_cancelled() {
            Some(CANCELLED.to_string())
        } else if !errors.is_empty() {
            Some(format!("{} of {} paths failed", errors.len(), results.len()))
        } else {
            None
        };

        let result = ScanResult {
            run_id,
            scan_slug: slug.clone(),
            scan_name: name,
            started_at,
            timestamp: Utc::now(),
            status,
            results,
            error,
        };

        self.store
            .finish(&slug, run_id, status, aggregator.snapshot(), errors);

        if let Err(err) = self.history.put(result.clone()).await {
            error!(error = %err, "failed to persist scan result");
        }

        let totals = result.totals();
        info!(
            status = status.as_str(),
            num_dir = totals.num_dir,
            num_file = totals.num_file,
            total_size = totals.total_size,
            "scan finished"
        );
        Ok(result)
    }
}

impl std::fmt::Debug for ScanRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanRunner")
            .field("config", &self.config)
            .field("baseline", &self.baseline)
            .finish_non_exhaustive()
    }
}

enum StartStep {
    Started(std::result::Result<TaskHandle, CallError>),
    Deadline,
    Cancelled,
}

enum PollStep {
    Status(std::result::Result<RemoteTaskStatus, CallError>),
    Deadline,
    Cancelled,
}

/// Per-run borrow bundle used by the path loops.
struct PathDriver<'a> {
    runner: &'a ScanRunner,
    aggregator: &'a ProgressAggregator,
    ledger: &'a TaskLedger,
    cancel: &'a CancellationToken,
}

impl PathDriver<'_> {
    async fn measure(&self, path: RemotePath) -> PathOutcome {
        let started = Instant::now();
        match self.drive(&path, started).await {
            Ok(counts) => {
                debug!(path = %path, total_size = counts.total_size, "path finished");
                PathOutcome::succeeded(path, counts, elapsed_ms(started))
            }
            Err(reason) => {
                if let Err(error) = self.aggregator.fail_path(&path, reason.clone()) {
                    warn!(path = %path, %error, "could not record path failure");
                }
                let partial = self.aggregator.path_counts(&path).unwrap_or_default();
                warn!(path = %path, error = %reason, "path failed");
                PathOutcome::failed(path, partial, elapsed_ms(started), reason)
            }
        }
    }

    async fn drive(&self, path: &RemotePath, started: Instant) -> std::result::Result<SizeCounts, String> {
        let remote = self.runner.remote.as_ref();
        let retry = &self.runner.retry;
        let deadline = started
            .checked_add(self.runner.config.max_wait())
            .unwrap_or_else(|| started + UNBOUNDED_WAIT);

        let start = retry.run("start", self.cancel, || remote.start(path));
        tokio::pin!(start);
        let step = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => StartStep::Cancelled,
            _ = sleep_until(deadline) => StartStep::Deadline,
            started_task = &mut start => StartStep::Started(started_task),
        };
        let task = match step {
            StartStep::Started(Ok(task)) => task,
            StartStep::Started(Err(CallError::Cancelled)) => return Err(CANCELLED.to_string()),
            StartStep::Started(Err(CallError::Remote(error))) => return Err(error.to_string()),
            StartStep::Cancelled => {
                self.settle_start(path, start).await;
                return Err(CANCELLED.to_string());
            }
            StartStep::Deadline => {
                self.settle_start(path, start).await;
                return Err(self.timeout_message());
            }
        };

        self.ledger.track(task.clone(), path.clone());
        self.runner
            .store
            .mark_running(self.aggregator.slug(), self.aggregator.run_id());
        debug!(path = %path, task = %task, "remote task started");

        let mut cadence = PollCadence::from_config(&self.runner.config);
        loop {
            let step = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => PollStep::Cancelled,
                _ = sleep_until(deadline) => PollStep::Deadline,
                status = retry.run("poll", self.cancel, || remote.poll(&task)) => PollStep::Status(status),
            };

            match step {
                PollStep::Status(Ok(status)) => {
                    if let Some(counts) = self.record(path, &status, started) {
                        self.ledger.release(&task);
                        return Ok(counts);
                    }
                    let delay = cadence.next_delay(status.counts, started.elapsed());
                    let wake = (Instant::now() + delay).min(deadline);
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => {}
                        _ = sleep_until(wake) => {}
                    }
                }
                PollStep::Status(Err(CallError::Remote(error))) => {
                    self.ledger.stop(&task).await;
                    return Err(error.to_string());
                }
                PollStep::Status(Err(CallError::Cancelled)) | PollStep::Cancelled => {
                    self.ledger.stop(&task).await;
                    return Err(CANCELLED.to_string());
                }
                PollStep::Deadline => return self.final_check(path, &task, started).await,
            }
        }
    }

    /// Let an abandoned start call finish and stop whatever task it created.
    async fn settle_start<F>(&self, path: &RemotePath, start: Pin<&mut F>)
    where
        F: Future<Output = std::result::Result<TaskHandle, CallError>>,
    {
        match timeout(START_SETTLE, start).await {
            Ok(Ok(task)) => {
                debug!(path = %path, task = %task, "stopping task started after the path gave up");
                self.ledger.track(task.clone(), path.clone());
                self.ledger.stop(&task).await;
            }
            Ok(Err(_)) => {}
            Err(_) => warn!(path = %path, "start call still pending; remote task may outlive the scan"),
        }
    }

    /// One last look at a task that hit its ceiling; it may have finished
    /// between the previous poll and the deadline.
    async fn final_check(
        &self,
        path: &RemotePath,
        task: &TaskHandle,
        started: Instant,
    ) -> std::result::Result<SizeCounts, String> {
        let remote = self.runner.remote.as_ref();
        match timeout(self.runner.config.max_poll_interval(), remote.poll(task)).await {
            Ok(Ok(status)) => {
                if let Some(counts) = self.record(path, &status, started) {
                    self.ledger.release(task);
                    return Ok(counts);
                }
            }
            Ok(Err(error)) => debug!(path = %path, %error, "final status check failed"),
            Err(_) => debug!(path = %path, "final status check timed out"),
        }
        self.ledger.stop(task).await;
        Err(self.timeout_message())
    }

    /// Feed a reading to the aggregator; returns final counts once finished.
    fn record(&self, path: &RemotePath, status: &RemoteTaskStatus, started: Instant) -> Option<SizeCounts> {
        let report = PathReport::new(status.counts, status.finished, started.elapsed());
        if let Err(error) = self.aggregator.update(path, report) {
            warn!(path = %path, %error, "dropped path report");
        }
        status
            .finished
            .then(|| self.aggregator.path_counts(path).unwrap_or(status.counts))
    }

    fn timeout_message(&self) -> String {
        format!(
            "timed out after {}s",
            self.runner.config.max_wait().as_secs()
        )
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::history::{InMemoryHistoryStore, MockHistoryStore};
    use crate::ids::{RunId, ScanSlug};
    use crate::remote::MockRemoteSizeTasks;

    fn invocation(paths: &[&str], mode: ScanMode) -> ScanInvocation {
        ScanInvocation {
            run_id: RunId::new(),
            slug: ScanSlug::parse("homes").unwrap(),
            name: "Homes".into(),
            paths: paths.iter().map(|p| RemotePath::new(p)).collect(),
            mode,
        }
    }

    fn runner(remote: MockRemoteSizeTasks, config: RunnerConfig) -> (ScanRunner, Arc<InMemoryHistoryStore>) {
        let history = Arc::new(InMemoryHistoryStore::default());
        let runner = ScanRunner::new(
            Arc::new(remote),
            history.clone(),
            Arc::new(ProgressStore::new(Duration::from_secs(8))),
            config,
            CaseFolding::Sensitive,
        );
        (runner, history)
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_start_errors_fail_the_path_without_retry() {
        let mut remote = MockRemoteSizeTasks::new();
        remote
            .expect_start()
            .times(1)
            .returning(|path| Err(RemoteError::PathNotFound(path.to_string())));
        remote.expect_stop().never();

        let (runner, history) = runner(remote, RunnerConfig::default());
        let result = runner
            .run(invocation(&["/gone"], ScanMode::Parallel), CancellationToken::new())
            .await
            .expect("run completes");

        assert_eq!(result.status, ScanLifecycleStatus::Failed);
        assert!(result.results[0].error.as_deref().unwrap().contains("/gone"));
        assert_eq!(history.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_start_errors_are_retried() {
        let mut remote = MockRemoteSizeTasks::new();
        let mut attempts = 0;
        remote.expect_start().times(2).returning(move |_| {
            attempts += 1;
            if attempts == 1 {
                Err(RemoteError::RateLimited {
                    retry_after: Some(Duration::from_millis(200)),
                })
            } else {
                Ok(TaskHandle::new("t1"))
            }
        });
        remote
            .expect_poll()
            .returning(|_| Ok(RemoteTaskStatus::finished(SizeCounts::new(2, 5, 4096))));
        remote.expect_stop().never();

        let (runner, _) = runner(remote, RunnerConfig::default());
        let result = runner
            .run(invocation(&["/media"], ScanMode::Sequential), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.status, ScanLifecycleStatus::Completed);
        assert_eq!(result.results[0].total_size.bytes, 4096);
        assert_eq!(result.results[0].num_file, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_paths_are_stopped_after_a_final_check() {
        let mut remote = MockRemoteSizeTasks::new();
        remote
            .expect_start()
            .returning(|_| Ok(TaskHandle::new("slow")));
        remote
            .expect_poll()
            .returning(|_| Ok(RemoteTaskStatus::running(SizeCounts::new(1, 1, 10))));
        remote
            .expect_stop()
            .withf(|task| task.as_str() == "slow")
            .times(1)
            .returning(|_| Ok(()));

        let config = RunnerConfig {
            max_wait_secs: 5,
            ..RunnerConfig::default()
        };
        let (runner, _) = runner(remote, config);
        let result = runner
            .run(invocation(&["/slow"], ScanMode::Parallel), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.status, ScanLifecycleStatus::Failed);
        let outcome = &result.results[0];
        assert_eq!(outcome.error.as_deref(), Some("timed out after 5s"));
        assert_eq!(outcome.total_size.bytes, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_max_wait_still_runs_to_completion() {
        let mut remote = MockRemoteSizeTasks::new();
        remote.expect_start().returning(|_| Ok(TaskHandle::new("t1")));
        let mut polls = 0;
        remote.expect_poll().returning(move |_| {
            polls += 1;
            if polls < 3 {
                Ok(RemoteTaskStatus::running(SizeCounts::new(1, 1, 10)))
            } else {
                Ok(RemoteTaskStatus::finished(SizeCounts::new(1, 2, 20)))
            }
        });
        remote.expect_stop().never();

        let config = RunnerConfig {
            max_wait_secs: u64::MAX,
            ..RunnerConfig::default()
        };
        let (runner, _) = runner(remote, config);
        let result = runner
            .run(invocation(&["/media"], ScanMode::Parallel), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.status, ScanLifecycleStatus::Completed);
        assert_eq!(result.results[0].total_size.bytes, 20);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_is_terminal_before_the_result_is_persisted() {
        let mut remote = MockRemoteSizeTasks::new();
        remote.expect_start().returning(|_| Ok(TaskHandle::new("t1")));
        remote
            .expect_poll()
            .returning(|_| Ok(RemoteTaskStatus::finished(SizeCounts::new(1, 1, 64))));

        let store = Arc::new(ProgressStore::new(Duration::from_secs(8)));
        let seen = store.clone();
        let mut history = MockHistoryStore::new();
        history
            .expect_completed_sizes()
            .returning(|_, _, _| Ok(Default::default()));
        history.expect_put().times(1).returning(move |result| {
            let entry = seen.get_by_slug(&result.scan_slug).expect("entry published");
            assert_eq!(entry.status, ScanLifecycleStatus::Completed);
            assert!(entry.progress.finished);
            Ok(())
        });

        let runner = ScanRunner::new(
            Arc::new(remote),
            Arc::new(history),
            store,
            RunnerConfig::default(),
            CaseFolding::Sensitive,
        );
        let result = runner
            .run(invocation(&["/media"], ScanMode::Parallel), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.status, ScanLifecycleStatus::Completed);
    }

    #[tokio::test]
    async fn empty_invocations_are_rejected_before_touching_state() {
        let (runner, history) = runner(MockRemoteSizeTasks::new(), RunnerConfig::default());
        let err = runner
            .run(invocation(&[], ScanMode::Parallel), CancellationToken::new())
            .await
            .expect_err("no paths");

        assert!(matches!(err, ScanError::InvalidInvocation(_)));
        assert!(runner.store().is_empty());
        assert!(history.is_empty());
    }
}
