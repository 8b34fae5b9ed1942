#![allow(dead_code)]

use std::{fs, sync::Arc, time::Duration};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use nasdu_core::RemoteError;
use nasdu_core::config::RunnerConfig;
use nasdu_core::history::{HistoryStore, InMemoryHistoryStore};
use nasdu_core::model::{ScanDefinition, SizeCounts};
use nasdu_core::paths::RemotePath;
use nasdu_core::remote::{RemoteSizeTasks, RemoteTaskStatus, TaskHandle};
use nasdu_server::{
    AppState,
    infra::{
        config::{Config, MountConfig},
        remote::LocalDirSizeTasks,
        startup::build_state,
    },
    routes,
};

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub history: Arc<InMemoryHistoryStore>,
    pub tempdir: TempDir,
}

/// Remote whose tasks never finish until stopped.
#[derive(Debug, Default)]
pub struct StuckRemote;

#[async_trait]
impl RemoteSizeTasks for StuckRemote {
    async fn start(&self, path: &RemotePath) -> Result<TaskHandle, RemoteError> {
        Ok(TaskHandle::new(path.to_string()))
    }

    async fn poll(&self, _task: &TaskHandle) -> Result<RemoteTaskStatus, RemoteError> {
        Ok(RemoteTaskStatus::running(SizeCounts::new(1, 2, 300)))
    }

    async fn stop(&self, _task: &TaskHandle) -> Result<(), RemoteError> {
        Ok(())
    }
}

pub fn fast_runner() -> RunnerConfig {
    RunnerConfig {
        min_poll_interval_ms: 10,
        max_poll_interval_ms: 20,
        poll_step_ms: 5,
        ..RunnerConfig::default()
    }
}

fn share_tree() -> Result<TempDir> {
    let dir = tempfile::tempdir()?;
    let homes = dir.path().join("homes");
    fs::create_dir_all(homes.join("alice"))?;
    fs::create_dir_all(homes.join("bob"))?;
    fs::write(homes.join("alice/a.bin"), vec![0u8; 1000])?;
    fs::write(homes.join("bob/b.bin"), vec![0u8; 3000])?;
    Ok(dir)
}

fn scans() -> Vec<ScanDefinition> {
    vec![
        ScanDefinition::new(
            "Home Folders",
            [RemotePath::new("/homes/alice"), RemotePath::new("/homes/bob")],
        ),
        ScanDefinition::new("Missing", [RemotePath::new("/does-not-exist")]),
    ]
}

/// App backed by a temp share tree and the local-mount walker.
pub fn build_test_app() -> Result<TestApp> {
    let tempdir = share_tree()?;
    let config = Config {
        mount: MountConfig {
            root: Some(tempdir.path().to_path_buf()),
        },
        runner: fast_runner(),
        scans: scans(),
        ..Config::default()
    };
    let remote = Arc::new(LocalDirSizeTasks::new(config.mount.root.clone()));
    Ok(assemble(config, remote, tempdir))
}

/// App whose scans run until cancelled.
pub fn build_stuck_app() -> Result<TestApp> {
    let tempdir = tempfile::tempdir()?;
    let config = Config {
        runner: fast_runner(),
        scans: scans(),
        ..Config::default()
    };
    Ok(assemble(config, Arc::new(StuckRemote), tempdir))
}

fn assemble(config: Config, remote: Arc<dyn RemoteSizeTasks>, tempdir: TempDir) -> TestApp {
    let history = Arc::new(InMemoryHistoryStore::default());
    let state = build_state(config, remote, history.clone() as Arc<dyn HistoryStore>);
    let router = routes::create_app(state.clone());
    TestApp {
        router,
        state,
        history,
        tempdir,
    }
}

impl TestApp {
    pub async fn call(&self, method: Method, uri: &str) -> Result<(StatusCode, Value)> {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())?;
        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok((status, body))
    }

    pub async fn get(&self, uri: &str) -> Result<(StatusCode, Value)> {
        self.call(Method::GET, uri).await
    }

    pub async fn post(&self, uri: &str) -> Result<(StatusCode, Value)> {
        self.call(Method::POST, uri).await
    }

    pub async fn delete(&self, uri: &str) -> Result<(StatusCode, Value)> {
        self.call(Method::DELETE, uri).await
    }

    /// Poll the progress endpoint until it reports a terminal status and the
    /// run has released its slot.
    pub async fn wait_for_terminal(&self, scan: &str) -> Result<Value> {
        for _ in 0..500 {
            let (status, body) = self.get(&format!("/api/v1/scans/{scan}/progress")).await?;
            let released = self
                .state
                .scan_control
                .active_scans()
                .iter()
                .all(|(slug, _)| body["scan_slug"] != slug.as_str());
            if status == StatusCode::OK && body["status"] != "running" && released {
                return Ok(body);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Err(anyhow!("scan {scan} did not finish"))
    }
}
