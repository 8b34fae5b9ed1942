use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::paths::RemotePath;
use crate::remote::{RemoteSizeTasks, TaskHandle};

/// Remote tasks started by one run that have not been settled yet.
///
/// Every handle is either released (the remote reported completion) or
/// stopped. Whatever is still outstanding when the ledger is dropped gets a
/// best-effort stop on the current runtime.
pub struct TaskLedger {
    remote: Arc<dyn RemoteSizeTasks>,
    outstanding: Mutex<HashMap<TaskHandle, RemotePath>>,
}

impl TaskLedger {
    pub fn new(remote: Arc<dyn RemoteSizeTasks>) -> Self {
        Self {
            remote,
            outstanding: Mutex::new(HashMap::new()),
        }
    }

    pub fn track(&self, task: TaskHandle, path: RemotePath) {
        self.outstanding.lock().insert(task, path);
    }

    /// Forget a task that finished on the remote side.
    pub fn release(&self, task: &TaskHandle) {
        self.outstanding.lock().remove(task);
    }

    /// Stop one task; errors are logged and otherwise ignored.
    pub async fn stop(&self, task: &TaskHandle) {
        let Some(path) = self.outstanding.lock().remove(task) else {
            return;
        };
        stop_task(self.remote.as_ref(), task, &path).await;
    }

    /// Stop every outstanding task, returning how many were stopped.
    pub async fn stop_all(&self) -> usize {
        let drained: Vec<(TaskHandle, RemotePath)> = self.outstanding.lock().drain().collect();
        for (task, path) in &drained {
            stop_task(self.remote.as_ref(), task, path).await;
        }
        drained.len()
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.lock().len()
    }
}

async fn stop_task(remote: &dyn RemoteSizeTasks, task: &TaskHandle, path: &RemotePath) {
    match remote.stop(task).await {
        Ok(()) => debug!(task = %task, path = %path, "stopped remote task"),
        Err(error) => warn!(task = %task, path = %path, %error, "failed to stop remote task"),
    }
}

impl Drop for TaskLedger {
    fn drop(&mut self) {
        let drained: Vec<(TaskHandle, RemotePath)> = self.outstanding.get_mut().drain().collect();
        if drained.is_empty() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(tasks = drained.len(), "no runtime left to stop outstanding remote tasks");
            return;
        };
        let remote = self.remote.clone();
        runtime.spawn(async move {
            for (task, path) in &drained {
                stop_task(remote.as_ref(), task, path).await;
            }
        });
    }
}

impl std::fmt::Debug for TaskLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskLedger")
            .field("outstanding", &self.outstanding())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;

    use super::*;
    use crate::error::RemoteError;
    use crate::remote::MockRemoteSizeTasks;

    #[tokio::test]
    async fn released_tasks_are_not_stopped() {
        let mut remote = MockRemoteSizeTasks::new();
        remote
            .expect_stop()
            .with(eq(TaskHandle::new("t2")))
            .times(1)
            .returning(|_| Ok(()));

        let ledger = TaskLedger::new(Arc::new(remote));
        ledger.track(TaskHandle::new("t1"), RemotePath::new("/a"));
        ledger.track(TaskHandle::new("t2"), RemotePath::new("/b"));
        ledger.release(&TaskHandle::new("t1"));

        assert_eq!(ledger.stop_all().await, 1);
        assert_eq!(ledger.outstanding(), 0);
    }

    #[tokio::test]
    async fn stop_errors_are_swallowed() {
        let mut remote = MockRemoteSizeTasks::new();
        remote
            .expect_stop()
            .times(1)
            .returning(|_| Err(RemoteError::TaskNotFound("t1".into())));

        let ledger = TaskLedger::new(Arc::new(remote));
        ledger.track(TaskHandle::new("t1"), RemotePath::new("/a"));
        ledger.stop(&TaskHandle::new("t1")).await;
        ledger.stop(&TaskHandle::new("t1")).await;
        assert_eq!(ledger.outstanding(), 0);
    }

    #[tokio::test]
    async fn dropping_with_outstanding_tasks_stops_them() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let mut remote = MockRemoteSizeTasks::new();
        remote.expect_stop().times(1).returning(move |task| {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(task.clone());
            }
            Ok(())
        });

        let ledger = TaskLedger::new(Arc::new(remote));
        ledger.track(TaskHandle::new("leaked"), RemotePath::new("/a"));
        drop(ledger);

        let stopped = rx.await.expect("stop issued on drop");
        assert_eq!(stopped, TaskHandle::new("leaked"));
    }
}
