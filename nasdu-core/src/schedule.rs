//! Repeating background work with structural cancellation.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// What the callback wants to happen after a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickFlow {
    Continue,
    Stop,
}

/// A task that runs a callback every `period` until its token is cancelled
/// or the callback asks to stop.
#[derive(Debug)]
pub struct RepeatingTask {
    name: &'static str,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl RepeatingTask {
    /// Spawn on the current runtime. The first tick fires immediately.
    pub fn spawn<F, Fut>(
        name: &'static str,
        period: Duration,
        token: CancellationToken,
        mut tick: F,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = TickFlow> + Send + 'static,
    {
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if tick().await == TickFlow::Stop {
                    break;
                }
            }
            debug!(task = name, "repeating task stopped");
        });

        Self {
            name,
            token,
            handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel and wait for the loop to exit.
    pub async fn stop(self) {
        self.token.cancel();
        let _ = self.handle.await;
    }

    /// Wait for the loop to end on its own.
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ticks_until_cancelled() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let task = RepeatingTask::spawn(
            "counter",
            Duration::from_secs(1),
            CancellationToken::new(),
            move || {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    TickFlow::Continue
                }
            },
        );

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        task.stop().await;
        let after_stop = count.load(Ordering::SeqCst);
        assert_eq!(after_stop, 3);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn callback_can_end_the_loop() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let task = RepeatingTask::spawn(
            "twice",
            Duration::from_millis(100),
            CancellationToken::new(),
            move || {
                let seen = seen.clone();
                async move {
                    if seen.fetch_add(1, Ordering::SeqCst) == 1 {
                        TickFlow::Stop
                    } else {
                        TickFlow::Continue
                    }
                }
            },
        );

        task.join().await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
