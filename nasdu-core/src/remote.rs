//! Contract for the remote directory-size task service.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;
use crate::model::SizeCounts;
use crate::paths::RemotePath;

/// Opaque handle of a started size task.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskHandle(String);

impl TaskHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One status reading of a remote task.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTaskStatus {
    pub counts: SizeCounts,
    pub finished: bool,
    /// Directory the remote is currently walking, when it says.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_path: Option<String>,
}

impl RemoteTaskStatus {
    pub fn running(counts: SizeCounts) -> Self {
        Self {
            counts,
            finished: false,
            processing_path: None,
        }
    }

    pub fn finished(counts: SizeCounts) -> Self {
        Self {
            counts,
            finished: true,
            processing_path: None,
        }
    }
}

/// Start, poll and stop directory-size computations on the remote system.
///
/// Implementations only translate calls; retries, timeouts and cleanup are
/// handled by the runner.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteSizeTasks: Send + Sync {
    async fn start(&self, path: &RemotePath) -> Result<TaskHandle, RemoteError>;

    async fn poll(&self, task: &TaskHandle) -> Result<RemoteTaskStatus, RemoteError>;

    /// Best-effort; the task may already be gone on the remote side.
    async fn stop(&self, task: &TaskHandle) -> Result<(), RemoteError>;
}
