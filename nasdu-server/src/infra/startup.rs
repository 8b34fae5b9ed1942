use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use nasdu_core::history::HistoryStore;
use nasdu_core::progress::{ProgressReader, ProgressStore};
use nasdu_core::remote::RemoteSizeTasks;
use nasdu_core::runner::ScanRunner;

use crate::infra::{
    app_state::AppState,
    config::Config,
    history::JsonFileHistoryStore,
    remote::LocalDirSizeTasks,
    scan::{ScanCatalog, ScanControlPlane},
};

/// Wire the runner, progress store and control plane around the given
/// backends.
pub fn build_state(
    config: Config,
    remote: Arc<dyn RemoteSizeTasks>,
    history: Arc<dyn HistoryStore>,
) -> AppState {
    let store = Arc::new(ProgressStore::from_config(&config.progress));
    let runner = Arc::new(ScanRunner::new(
        remote,
        history.clone(),
        store.clone(),
        config.runner.clone(),
        config.case_folding(),
    ));
    let catalog = Arc::new(ScanCatalog::new(config.scans.clone()));
    let scan_control = Arc::new(ScanControlPlane::new(catalog, runner));

    AppState {
        config: Arc::new(config),
        scan_control,
        progress: ProgressReader::new(store),
        history,
        started_at: Utc::now(),
    }
}

/// Production backends: the local-mount walker and the JSON history file.
pub async fn build_production_state(config: Config) -> Result<AppState> {
    let history = JsonFileHistoryStore::open(
        config.storage.history_path.clone(),
        config.case_folding(),
    )
    .await
    .with_context(|| {
        format!(
            "failed to open history at {}",
            config.storage.history_path.display()
        )
    })?;
    let remote = LocalDirSizeTasks::new(config.mount.root.clone());
    Ok(build_state(config, Arc::new(remote), Arc::new(history)))
}

#[async_trait]
pub trait StartupHooks: Send + Sync {
    async fn run(&self, state: &AppState) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct ProdStartupHooks;

#[async_trait]
impl StartupHooks for ProdStartupHooks {
    async fn run(&self, state: &AppState) -> Result<()> {
        state
            .scan_control
            .spawn_sweeper(state.config.progress.sweep_interval());

        for scan in state.config.scans.iter() {
            info!(
                scan = %scan.slug,
                name = %scan.name,
                paths = scan.paths.len(),
                enabled = scan.enabled,
                "scan configured"
            );
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct NoopStartupHooks;

#[async_trait]
impl StartupHooks for NoopStartupHooks {
    async fn run(&self, _state: &AppState) -> Result<()> {
        Ok(())
    }
}
