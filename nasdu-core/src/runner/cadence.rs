use std::time::Duration;

use crate::config::RunnerConfig;
use crate::model::SizeCounts;

/// Adaptive poll interval for one remote task.
///
/// Growth in any count snaps the interval back to the minimum. After
/// `idle_before_backoff` consecutive idle polls every further idle poll adds
/// one step, up to the maximum. Independently the floor rises by one step
/// per elapsed ramp period so long scans are polled less often.
#[derive(Clone, Debug)]
pub struct PollCadence {
    min: Duration,
    max: Duration,
    step: Duration,
    idle_before_backoff: u32,
    ramp: Option<Duration>,
    current: Duration,
    idle_polls: u32,
    last: SizeCounts,
}

impl PollCadence {
    pub fn from_config(config: &RunnerConfig) -> Self {
        let min = config.min_poll_interval();
        Self {
            min,
            max: config.max_poll_interval(),
            step: config.poll_step(),
            idle_before_backoff: config.idle_polls_before_backoff.max(1),
            ramp: config.ramp_period(),
            current: min,
            idle_polls: 0,
            last: SizeCounts::ZERO,
        }
    }

    /// Feed the latest reading; returns the delay before the next poll.
    pub fn next_delay(&mut self, counts: SizeCounts, elapsed: Duration) -> Duration {
        if counts.grew_since(&self.last) {
            self.current = self.min;
            self.idle_polls = 0;
        } else {
            self.idle_polls = self.idle_polls.saturating_add(1);
            if self.idle_polls >= self.idle_before_backoff {
                self.current = (self.current + self.step).min(self.max);
            }
        }
        self.last = self.last.max(counts);

        self.current.max(self.floor(elapsed)).min(self.max)
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    fn floor(&self, elapsed: Duration) -> Duration {
        let Some(ramp) = self.ramp else {
            return self.min;
        };
        let periods = (elapsed.as_millis() / ramp.as_millis().max(1)).min(u32::MAX as u128) as u32;
        self.min.saturating_add(self.step.saturating_mul(periods))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cadence() -> PollCadence {
        PollCadence::from_config(&RunnerConfig::default())
    }

    fn secs(value: u64) -> Duration {
        Duration::from_secs(value)
    }

    #[test]
    fn idle_polls_back_off_in_steps_up_to_max() {
        let mut cadence = cadence();
        let counts = SizeCounts::new(1, 1, 1);
        assert_eq!(cadence.next_delay(counts, secs(1)), secs(1));

        assert_eq!(cadence.next_delay(counts, secs(2)), secs(1));
        assert_eq!(cadence.next_delay(counts, secs(3)), secs(1));
        assert_eq!(cadence.next_delay(counts, secs(4)), secs(3));
        assert_eq!(cadence.next_delay(counts, secs(7)), secs(5));
        for _ in 0..10 {
            cadence.next_delay(counts, secs(8));
        }
        assert_eq!(cadence.next_delay(counts, secs(9)), secs(10));
    }

    #[test]
    fn growth_resets_to_minimum() {
        let mut cadence = cadence();
        let idle = SizeCounts::new(1, 1, 1);
        for _ in 0..6 {
            cadence.next_delay(idle, secs(5));
        }
        assert!(cadence.current() > secs(1));

        let grown = SizeCounts::new(1, 2, 1);
        assert_eq!(cadence.next_delay(grown, secs(6)), secs(1));
    }

    #[test]
    fn floor_rises_with_elapsed_time() {
        let mut cadence = cadence();
        let mut total = 0;
        let mut delay_at = |elapsed: u64| {
            total += 1;
            cadence.next_delay(SizeCounts::new(0, 0, total), secs(elapsed))
        };
        assert_eq!(delay_at(30), secs(1));
        assert_eq!(delay_at(61), secs(3));
        assert_eq!(delay_at(125), secs(5));
        assert_eq!(delay_at(3_600), secs(10));
    }
}
