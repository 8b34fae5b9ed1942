use std::{fmt, sync::Arc, time::Duration};

use axum::http::StatusCode;
use dashmap::{DashMap, mapref::entry::Entry};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use nasdu_core::api_types::{CancelAck, ScanSummary, TriggerAck};
use nasdu_core::ids::{RunId, ScanKey, ScanSlug};
use nasdu_core::model::{ScanDefinition, ScanInvocation, ScanLifecycleStatus};
use nasdu_core::progress::{ProgressEntry, ProgressStore};
use nasdu_core::runner::ScanRunner;
use nasdu_core::schedule::{RepeatingTask, TickFlow};

use super::catalog::ScanCatalog;

/// Starts, tracks and cancels scan runs. At most one run per scan is
/// active; a second trigger is acknowledged without starting anything.
#[derive(Clone)]
pub struct ScanControlPlane {
    inner: Arc<ScanControlPlaneInner>,
}

impl fmt::Debug for ScanControlPlane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanControlPlane")
            .field("configured_scans", &self.inner.catalog.len())
            .field("active_scans", &self.inner.active.len())
            .field("shutting_down", &self.inner.shutdown.is_cancelled())
            .finish()
    }
}

struct ScanControlPlaneInner {
    catalog: Arc<ScanCatalog>,
    runner: Arc<ScanRunner>,
    active: DashMap<ScanSlug, ActiveRun>,
    shutdown: CancellationToken,
    sweeper: Mutex<Option<RepeatingTask>>,
}

struct ActiveRun {
    run_id: RunId,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ScanControlPlane {
    pub fn new(catalog: Arc<ScanCatalog>, runner: Arc<ScanRunner>) -> Self {
        catalog.register_aliases(runner.store());
        Self {
            inner: Arc::new(ScanControlPlaneInner {
                catalog,
                runner,
                active: DashMap::new(),
                shutdown: CancellationToken::new(),
                sweeper: Mutex::new(None),
            }),
        }
    }

    pub fn catalog(&self) -> &Arc<ScanCatalog> {
        &self.inner.catalog
    }

    pub fn store(&self) -> &Arc<ProgressStore> {
        self.inner.runner.store()
    }

    pub fn runner(&self) -> &Arc<ScanRunner> {
        &self.inner.runner
    }

    /// Evict expired progress entries every `period` until shutdown.
    pub fn spawn_sweeper(&self, period: Duration) {
        let store = self.store().clone();
        let task = RepeatingTask::spawn(
            "progress-sweeper",
            period,
            self.inner.shutdown.child_token(),
            move || {
                let store = store.clone();
                async move {
                    store.sweep();
                    TickFlow::Continue
                }
            },
        );
        if let Some(previous) = self.inner.sweeper.lock().replace(task) {
            warn!(task = previous.name(), "replacing running sweeper");
        }
    }

    #[instrument(skip(self))]
    pub fn trigger(&self, scan_id: &str) -> Result<TriggerAck, ScanControlError> {
        let definition = self.lookup(scan_id)?;
        if !definition.enabled {
            return Err(ScanControlError::ScanDisabled);
        }
        if self.inner.shutdown.is_cancelled() {
            return Err(ScanControlError::internal("server is shutting down".into()));
        }

        match self.inner.active.entry(definition.slug.clone()) {
            Entry::Occupied(existing) => {
                info!(scan = %definition.slug, "scan already running");
                Ok(TriggerAck {
                    scan_name: definition.name.clone(),
                    scan_slug: definition.slug.clone(),
                    triggered: false,
                    message: format!("Scan '{}' is already running", definition.name),
                    run_id: Some(existing.get().run_id),
                })
            }
            Entry::Vacant(slot) => {
                let invocation = ScanInvocation::from_definition(&definition);
                let run_id = invocation.run_id;
                let cancel = self.inner.shutdown.child_token();

                self.store().put(ProgressEntry::pending(
                    invocation.slug.clone(),
                    &invocation.name,
                    run_id,
                    &invocation.paths,
                ));

                let handle = tokio::spawn(Arc::clone(&self.inner).execute(
                    invocation,
                    cancel.clone(),
                ));
                slot.insert(ActiveRun {
                    run_id,
                    cancel,
                    handle,
                });

                info!(scan = %definition.slug, run = %run_id, "scan triggered");
                Ok(TriggerAck {
                    scan_name: definition.name.clone(),
                    scan_slug: definition.slug.clone(),
                    triggered: true,
                    message: format!("Scan '{}' started", definition.name),
                    run_id: Some(run_id),
                })
            }
        }
    }

    /// Request cancellation of the active run. Cleanup happens on the run
    /// task; the progress entry turns `failed` once it is done.
    #[instrument(skip(self))]
    pub fn cancel(&self, scan_id: &str) -> Result<CancelAck, ScanControlError> {
        let definition = self.lookup(scan_id)?;
        let run = self
            .inner
            .active
            .get(&definition.slug)
            .ok_or(ScanControlError::ScanNotRunning)?;
        run.cancel.cancel();
        info!(scan = %definition.slug, run = %run.run_id, "scan cancellation requested");
        Ok(CancelAck {
            scan_slug: definition.slug.clone(),
            run_id: run.run_id,
        })
    }

    pub fn is_running(&self, slug: &ScanSlug) -> bool {
        self.inner.active.contains_key(slug)
    }

    pub fn active_scans(&self) -> Vec<(ScanSlug, RunId)> {
        let mut active: Vec<_> = self
            .inner
            .active
            .iter()
            .map(|entry| (entry.key().clone(), entry.run_id))
            .collect();
        active.sort_by(|a, b| a.0.cmp(&b.0));
        active
    }

    pub fn definitions(&self) -> Vec<ScanSummary> {
        self.inner
            .catalog
            .definitions()
            .iter()
            .map(|definition| {
                ScanSummary::from_definition(definition, self.is_running(&definition.slug))
            })
            .collect()
    }

    /// Resolve a caller-supplied id against the catalog.
    pub fn lookup(&self, scan_id: &str) -> Result<ScanDefinition, ScanControlError> {
        let key = ScanKey::parse(scan_id)
            .map_err(|_| ScanControlError::MalformedScanId)?;
        self.inner
            .catalog
            .resolve(&key)
            .cloned()
            .ok_or(ScanControlError::ScanNotFound)
    }

    /// Cancel every run and wait until their remote tasks are released.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();

        let slugs: Vec<ScanSlug> = self
            .inner
            .active
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for slug in slugs {
            if let Some((_, run)) = self.inner.active.remove(&slug) {
                run.cancel.cancel();
                if let Err(err) = run.handle.await {
                    error!(scan = %slug, error = %err, "scan task ended abnormally");
                }
            }
        }

        let sweeper = self.inner.sweeper.lock().take();
        if let Some(sweeper) = sweeper {
            sweeper.stop().await;
        }
        info!("scan control plane stopped");
    }
}

impl ScanControlPlaneInner {
    async fn execute(self: Arc<Self>, invocation: ScanInvocation, cancel: CancellationToken) {
        let slug = invocation.slug.clone();
        let run_id = invocation.run_id;

        match self.runner.run(invocation, cancel).await {
            Ok(result) => {
                if result.status == ScanLifecycleStatus::Failed {
                    warn!(
                        scan = %slug,
                        run = %run_id,
                        error = result.error.as_deref().unwrap_or_default(),
                        "scan finished with failures"
                    );
                }
            }
            Err(err) => {
                error!(scan = %slug, run = %run_id, error = %err, "scan run aborted");
                self.runner.store().finish(
                    &slug,
                    run_id,
                    ScanLifecycleStatus::Failed,
                    self.runner
                        .store()
                        .get_by_slug(&slug)
                        .map(|entry| entry.progress.clone())
                        .unwrap_or_default(),
                    Vec::new(),
                );
            }
        }

        self.active.remove_if(&slug, |_, run| run.run_id == run_id);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanControlError {
    ScanNotFound,
    ScanDisabled,
    ScanNotRunning,
    MalformedScanId,
    Internal(String),
}

impl ScanControlError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ScanControlError::ScanNotFound => StatusCode::NOT_FOUND,
            ScanControlError::ScanDisabled => StatusCode::CONFLICT,
            ScanControlError::ScanNotRunning => StatusCode::CONFLICT,
            ScanControlError::MalformedScanId => StatusCode::BAD_REQUEST,
            ScanControlError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ScanControlError::ScanNotFound => "scan_not_found".into(),
            ScanControlError::ScanDisabled => "scan_disabled".into(),
            ScanControlError::ScanNotRunning => "scan_not_running".into(),
            ScanControlError::MalformedScanId => "malformed_scan_id".into(),
            ScanControlError::Internal(reason) => reason.clone(),
        }
    }

    fn internal(msg: String) -> Self {
        ScanControlError::Internal(msg)
    }
}

impl fmt::Display for ScanControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ScanControlError {}
