use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Upper bound on concurrently polled paths within one run.
pub const MAX_PARALLEL_PATHS: usize = 10;

/// Knobs for the scan runner.
///
/// Every field has a default so a config file only needs to name what it
/// changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Poll interval used right after a task starts and whenever counts grow.
    pub min_poll_interval_ms: u64,
    /// Ceiling for the adaptive poll interval.
    pub max_poll_interval_ms: u64,
    /// Increment applied after `idle_polls_before_backoff` polls without growth.
    pub poll_step_ms: u64,
    pub idle_polls_before_backoff: u32,
    /// Every elapsed period raises the interval floor by one `poll_step_ms`.
    pub ramp_period_secs: u64,
    /// Per-path ceiling before the task is stopped and the path fails.
    pub max_wait_secs: u64,
    pub max_parallel_paths: usize,
    pub retry: RetryConfig,
}

impl RunnerConfig {
    pub fn min_poll_interval(&self) -> Duration {
        Duration::from_millis(self.min_poll_interval_ms.max(1))
    }

    pub fn max_poll_interval(&self) -> Duration {
        Duration::from_millis(self.max_poll_interval_ms).max(self.min_poll_interval())
    }

    pub fn poll_step(&self) -> Duration {
        Duration::from_millis(self.poll_step_ms)
    }

    pub fn ramp_period(&self) -> Option<Duration> {
        (self.ramp_period_secs > 0).then(|| Duration::from_secs(self.ramp_period_secs))
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }

    /// Concurrency limit clamped to `1..=MAX_PARALLEL_PATHS`.
    pub fn parallel_limit(&self) -> usize {
        self.max_parallel_paths.clamp(1, MAX_PARALLEL_PATHS)
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            min_poll_interval_ms: 1_000,
            max_poll_interval_ms: 10_000,
            poll_step_ms: 2_000,
            idle_polls_before_backoff: 3,
            ramp_period_secs: 60,
            max_wait_secs: 300,
            max_parallel_paths: 4,
            retry: RetryConfig::default(),
        }
    }
}

/// Backoff for transient remote failures.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per remote call, including the first one.
    pub max_attempts: u16,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Percentage-based jitter to spread out retries.
    pub jitter_ratio: f32,
    /// Minimum jitter in milliseconds so short delays still randomise a bit.
    pub jitter_min_ms: u64,
}

impl RetryConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
            jitter_ratio: 0.25,
            jitter_min_ms: 50,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// How long a finished scan stays readable before eviction.
    pub grace_window_ms: u64,
    /// Cadence of the eviction sweeper.
    pub sweep_interval_ms: u64,
    /// Match history paths case-insensitively.
    pub case_insensitive_paths: bool,
}

impl ProgressConfig {
    pub fn grace_window(&self) -> Duration {
        Duration::from_millis(self.grace_window_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(10))
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            grace_window_ms: 8_000,
            sweep_interval_ms: 1_000,
            case_insensitive_paths: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parallel_limit_is_clamped() {
        let mut config = RunnerConfig {
            max_parallel_paths: 0,
            ..RunnerConfig::default()
        };
        assert_eq!(config.parallel_limit(), 1);
        config.max_parallel_paths = 64;
        assert_eq!(config.parallel_limit(), MAX_PARALLEL_PATHS);
    }

    #[test]
    fn partial_payloads_fill_defaults() {
        let config: RunnerConfig =
            serde_json::from_str(r#"{"max_wait_secs": 30, "retry": {"max_attempts": 2}}"#)
                .unwrap();
        assert_eq!(config.max_wait(), Duration::from_secs(30));
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.backoff_base_ms, 500);
        assert_eq!(config.min_poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn max_interval_never_drops_below_min() {
        let config = RunnerConfig {
            min_poll_interval_ms: 5_000,
            max_poll_interval_ms: 1_000,
            ..RunnerConfig::default()
        };
        assert_eq!(config.max_poll_interval(), Duration::from_secs(5));
    }
}
