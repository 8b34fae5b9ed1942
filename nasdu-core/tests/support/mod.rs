#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use nasdu_core::RemoteError;
use nasdu_core::config::RunnerConfig;
use nasdu_core::history::{HistoryStore, InMemoryHistoryStore};
use nasdu_core::ids::{RunId, ScanSlug};
use nasdu_core::model::{ScanInvocation, ScanMode, SizeCounts};
use nasdu_core::paths::{CaseFolding, RemotePath};
use nasdu_core::progress::ProgressStore;
use nasdu_core::remote::{RemoteSizeTasks, RemoteTaskStatus, TaskHandle};
use nasdu_core::runner::ScanRunner;

pub const GRACE: Duration = Duration::from_secs(8);

/// Scripted behaviour of one remote path.
#[derive(Clone, Debug, Default)]
pub struct PathScript {
    start_errors: VecDeque<RemoteError>,
    polls: VecDeque<Result<RemoteTaskStatus, RemoteError>>,
    poll_latency: Duration,
    start_latency: Duration,
}

impl PathScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_error(mut self, error: RemoteError) -> Self {
        self.start_errors.push_back(error);
        self
    }

    pub fn running(mut self, total_size: u64) -> Self {
        self.polls
            .push_back(Ok(RemoteTaskStatus::running(counts(total_size))));
        self
    }

    pub fn finished(mut self, total_size: u64) -> Self {
        self.polls
            .push_back(Ok(RemoteTaskStatus::finished(counts(total_size))));
        self
    }

    pub fn poll_error(mut self, error: RemoteError) -> Self {
        self.polls.push_back(Err(error));
        self
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.poll_latency = latency;
        self
    }

    /// Delay between the remote creating the task and `start` returning.
    pub fn start_latency(mut self, latency: Duration) -> Self {
        self.start_latency = latency;
        self
    }
}

pub fn counts(total_size: u64) -> SizeCounts {
    SizeCounts::new(total_size / 100, total_size / 10, total_size)
}

/// In-memory remote that plays back a script per path. Once a script is
/// exhausted the last status repeats, so an unfinished script never ends.
#[derive(Debug, Default)]
pub struct ScriptedRemote {
    scripts: Mutex<HashMap<String, PathScript>>,
    last: Mutex<HashMap<String, RemoteTaskStatus>>,
    tasks: Mutex<HashMap<TaskHandle, String>>,
    next_id: AtomicU64,
    started: Mutex<Vec<String>>,
    stopped: Mutex<Vec<TaskHandle>>,
    start_calls: AtomicU64,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, path: &str, script: PathScript) -> Self {
        self.scripts
            .lock()
            .insert(RemotePath::new(path).to_string(), script);
        self
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().clone()
    }

    pub fn stopped(&self) -> Vec<TaskHandle> {
        self.stopped.lock().clone()
    }

    pub fn start_calls(&self) -> u64 {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn path_of(&self, task: &TaskHandle) -> Option<String> {
        self.tasks.lock().get(task).cloned()
    }
}

#[async_trait]
impl RemoteSizeTasks for ScriptedRemote {
    async fn start(&self, path: &RemotePath) -> Result<TaskHandle, RemoteError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        let key = path.to_string();
        if let Some(error) = self
            .scripts
            .lock()
            .get_mut(&key)
            .and_then(|script| script.start_errors.pop_front())
        {
            return Err(error);
        }

        let latency = self
            .scripts
            .lock()
            .get(&key)
            .map(|script| script.start_latency)
            .unwrap_or_default();

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let task = TaskHandle::new(format!("task-{id}"));
        self.tasks.lock().insert(task.clone(), key.clone());
        self.started.lock().push(key);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        Ok(task)
    }

    async fn poll(&self, task: &TaskHandle) -> Result<RemoteTaskStatus, RemoteError> {
        let Some(path) = self.path_of(task) else {
            return Err(RemoteError::TaskNotFound(task.to_string()));
        };

        let (next, latency) = {
            let mut scripts = self.scripts.lock();
            match scripts.get_mut(&path) {
                Some(script) => (script.polls.pop_front(), script.poll_latency),
                None => (None, Duration::ZERO),
            }
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        match next {
            Some(Ok(status)) => {
                self.last.lock().insert(path, status.clone());
                Ok(status)
            }
            Some(Err(error)) => Err(error),
            None => Ok(self.last.lock().get(&path).cloned().unwrap_or_default()),
        }
    }

    async fn stop(&self, task: &TaskHandle) -> Result<(), RemoteError> {
        self.stopped.lock().push(task.clone());
        Ok(())
    }
}

pub struct Harness {
    pub remote: Arc<ScriptedRemote>,
    pub history: Arc<InMemoryHistoryStore>,
    pub store: Arc<ProgressStore>,
    pub runner: Arc<ScanRunner>,
}

impl Harness {
    pub fn new(remote: ScriptedRemote) -> Self {
        Self::with_config(remote, RunnerConfig::default())
    }

    pub fn with_config(remote: ScriptedRemote, config: RunnerConfig) -> Self {
        Self::with_history(remote, config, InMemoryHistoryStore::default())
    }

    pub fn with_history(
        remote: ScriptedRemote,
        config: RunnerConfig,
        history: InMemoryHistoryStore,
    ) -> Self {
        let remote = Arc::new(remote);
        let history = Arc::new(history);
        let store = Arc::new(ProgressStore::new(GRACE));
        let runner = Arc::new(ScanRunner::new(
            remote.clone(),
            history.clone() as Arc<dyn HistoryStore>,
            store.clone(),
            config,
            CaseFolding::Sensitive,
        ));
        Self {
            remote,
            history,
            store,
            runner,
        }
    }
}

pub fn invocation(slug: &str, name: &str, paths: &[&str], mode: ScanMode) -> ScanInvocation {
    ScanInvocation {
        run_id: RunId::new(),
        slug: ScanSlug::parse(slug).expect("valid slug"),
        name: name.to_string(),
        paths: paths.iter().map(|p| RemotePath::new(p)).collect(),
        mode,
    }
}
