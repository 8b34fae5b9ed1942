//! Directory-size tasks computed against a locally mounted share.
//!
//! Each started task walks its directory on the blocking pool and publishes
//! running totals that `poll` reads without waiting for the walk.

use std::{
    io,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};
use walkdir::WalkDir;

use nasdu_core::RemoteError;
use nasdu_core::model::SizeCounts;
use nasdu_core::paths::RemotePath;
use nasdu_core::remote::{RemoteSizeTasks, RemoteTaskStatus, TaskHandle};

/// Entries walked between two publications of the running totals.
const PUBLISH_EVERY: u64 = 128;

#[derive(Debug)]
pub struct LocalDirSizeTasks {
    root: Option<PathBuf>,
    tasks: DashMap<TaskHandle, Arc<WalkState>>,
    next_id: AtomicU64,
}

#[derive(Debug, Default)]
struct WalkState {
    counts: Mutex<SizeCounts>,
    current: Mutex<Option<String>>,
    failure: Mutex<Option<RemoteError>>,
    finished: AtomicBool,
    stop: AtomicBool,
}

impl LocalDirSizeTasks {
    /// Remote paths are resolved below `root`, or used as host paths when
    /// no root is configured.
    pub fn new(root: Option<PathBuf>) -> Self {
        Self {
            root,
            tasks: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn outstanding(&self) -> usize {
        self.tasks.len()
    }

    fn resolve(&self, path: &RemotePath) -> PathBuf {
        match &self.root {
            Some(root) => root.join(path.as_str().trim_start_matches('/')),
            None => PathBuf::from(path.as_str()),
        }
    }
}

#[async_trait]
impl RemoteSizeTasks for LocalDirSizeTasks {
    async fn start(&self, path: &RemotePath) -> Result<TaskHandle, RemoteError> {
        if path.escapes_upward() {
            return Err(RemoteError::PermissionDenied(format!(
                "{path} leaves the mount root"
            )));
        }
        let local = self.resolve(path);
        let metadata = tokio::fs::metadata(&local)
            .await
            .map_err(|err| classify_io(path, &err))?;
        if !metadata.is_dir() {
            return Err(RemoteError::PathNotFound(format!(
                "{path} is not a directory"
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = TaskHandle::new(format!("local-{id}"));
        let state = Arc::new(WalkState::default());
        self.tasks.insert(handle.clone(), Arc::clone(&state));

        debug!(path = %path, local = %local.display(), task = %handle, "walk started");
        tokio::task::spawn_blocking(move || walk(&local, &state));
        Ok(handle)
    }

    async fn poll(&self, task: &TaskHandle) -> Result<RemoteTaskStatus, RemoteError> {
        let state = self
            .tasks
            .get(task)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RemoteError::TaskNotFound(task.to_string()))?;

        if let Some(failure) = state.failure.lock().clone() {
            self.tasks.remove(task);
            return Err(failure);
        }

        let finished = state.finished.load(Ordering::Acquire);
        let status = RemoteTaskStatus {
            counts: *state.counts.lock(),
            finished,
            processing_path: state.current.lock().clone(),
        };
        if finished {
            self.tasks.remove(task);
        }
        Ok(status)
    }

    async fn stop(&self, task: &TaskHandle) -> Result<(), RemoteError> {
        if let Some((_, state)) = self.tasks.remove(task) {
            state.stop.store(true, Ordering::Release);
            debug!(task = %task, "walk stop requested");
        }
        Ok(())
    }
}

fn walk(root: &Path, state: &WalkState) {
    let mut counts = SizeCounts::ZERO;
    let mut walked: u64 = 0;

    for entry in WalkDir::new(root).follow_links(false) {
        if state.stop.load(Ordering::Acquire) {
            return;
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                let reason = err
                    .io_error()
                    .map(|io| classify_io(&RemotePath::new(&root.to_string_lossy()), io))
                    .unwrap_or_else(|| RemoteError::Protocol(err.to_string()));
                *state.failure.lock() = Some(reason);
                return;
            }
            Err(err) => {
                debug!(error = %err, "skipping unreadable entry");
                continue;
            }
        };

        let file_type = entry.file_type();
        if entry.depth() > 0 {
            if file_type.is_dir() {
                counts.num_dir += 1;
            } else if file_type.is_file() {
                counts.num_file += 1;
                match entry.metadata() {
                    Ok(metadata) => counts.total_size += metadata.len(),
                    Err(err) => debug!(error = %err, "size unavailable"),
                }
            }
        }
        if file_type.is_dir() {
            *state.current.lock() = Some(entry.path().to_string_lossy().into_owned());
        }

        walked += 1;
        if walked.is_multiple_of(PUBLISH_EVERY) {
            *state.counts.lock() = counts;
        }
    }

    *state.counts.lock() = counts;
    *state.current.lock() = None;
    state.finished.store(true, Ordering::Release);
}

fn classify_io(path: &RemotePath, err: &io::Error) -> RemoteError {
    match err.kind() {
        io::ErrorKind::NotFound => RemoteError::PathNotFound(path.to_string()),
        io::ErrorKind::PermissionDenied => RemoteError::PermissionDenied(path.to_string()),
        io::ErrorKind::TimedOut => RemoteError::Timeout,
        _ => {
            warn!(path = %path, error = %err, "unexpected filesystem error");
            RemoteError::Unavailable(err.to_string())
        }
    }
}
