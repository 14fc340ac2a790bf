use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use crate::config::GeocodeConfig;

/// Multiplier applied to the wait time from the second rate-limit hit on.
pub const WAIT_BACKOFF_FACTOR: f64 = 1.5;

/// Request pacing for one run. Delay and wait only grow; a restart of the
/// process is the only way back to the configured defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct PacingState {
    rate_limit_hits: u32,
    delay: Duration,
    wait_time: Duration,
    delay_increment: Duration,
}

impl PacingState {
    pub fn new(
        initial_delay: Duration,
        initial_wait_time: Duration,
        delay_increment: Duration,
    ) -> Self {
        Self {
            rate_limit_hits: 0,
            delay: initial_delay,
            wait_time: initial_wait_time,
            delay_increment,
        }
    }

    pub fn from_config(config: &GeocodeConfig) -> Self {
        Self::new(
            config.initial_delay(),
            config.initial_wait_time(),
            config.delay_increment(),
        )
    }

    pub fn rate_limit_hits(&self) -> u32 {
        self.rate_limit_hits
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn wait_time(&self) -> Duration {
        self.wait_time
    }

    /// Registers one rate-limit signal and returns the cooldown before the
    /// same row is tried again.
    pub fn record_rate_limit(&mut self) -> Duration {
        self.rate_limit_hits += 1;
        if self.rate_limit_hits > 1 {
            self.wait_time = self.wait_time.mul_f64(WAIT_BACKOFF_FACTOR);
        }
        self.delay += self.delay_increment;
        self.delay + self.wait_time
    }
}

/// Rows handled since the last checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressCounter {
    processed: usize,
    batch_size: usize,
}

impl ProgressCounter {
    pub fn new(batch_size: usize) -> Self {
        Self {
            processed: 0,
            batch_size: batch_size.max(1),
        }
    }

    pub fn record(&mut self) {
        self.processed += 1;
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn batch_complete(&self) -> bool {
        self.processed >= self.batch_size
    }

    pub fn reset(&mut self) {
        self.processed = 0;
    }
}

#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn wait(&self, delay: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

#[async_trait]
impl Scheduler for TokioScheduler {
    async fn wait(&self, delay: Duration) {
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn first_hit_only_grows_delay() {
        let mut pacing = PacingState::new(ms(100), ms(5_000), ms(100));
        let cooldown = pacing.record_rate_limit();
        assert_eq!(pacing.rate_limit_hits(), 1);
        assert_eq!(pacing.delay(), ms(200));
        assert_eq!(pacing.wait_time(), ms(5_000));
        assert_eq!(cooldown, ms(5_200));
    }

    #[test]
    fn later_hits_compound_wait_time() {
        let mut pacing = PacingState::new(ms(100), ms(5_000), ms(100));
        pacing.record_rate_limit();
        let second = pacing.record_rate_limit();
        assert_eq!(pacing.wait_time(), ms(7_500));
        assert_eq!(second, ms(7_800));
        let third = pacing.record_rate_limit();
        assert_eq!(pacing.wait_time(), ms(11_250));
        assert_eq!(pacing.delay(), ms(400));
        assert_eq!(third, ms(11_650));
    }

    #[test]
    fn backoff_never_shrinks() {
        let mut pacing = PacingState::new(ms(0), ms(10), ms(7));
        let mut previous = pacing.clone();
        for _ in 0..20 {
            pacing.record_rate_limit();
            assert!(pacing.delay() >= previous.delay());
            assert!(pacing.wait_time() >= previous.wait_time());
            previous = pacing.clone();
        }
    }

    #[test]
    fn progress_counter_tracks_batches() {
        let mut progress = ProgressCounter::new(2);
        progress.record();
        assert!(!progress.batch_complete());
        progress.record();
        assert!(progress.batch_complete());
        progress.reset();
        assert_eq!(progress.processed(), 0);
        assert!(!ProgressCounter::new(0).batch_complete());
    }

    #[tokio::test]
    async fn zero_wait_returns_immediately() {
        TokioScheduler.wait(Duration::ZERO).await;
    }
}
