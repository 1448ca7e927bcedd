//! Auto-restart policy applied after dial failure, session loss or listener failure.

use std::time::Duration;

use serde::Deserialize;

/// Default: restart forever, immediately, except after listener failures, which
/// always back off and give up after a few consecutive attempts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RestartPolicy {
    /// Consecutive restarts allowed before giving up to Idle. None = unlimited.
    pub max_consecutive: Option<u32>,
    /// Delay before the first restart, doubled on each further consecutive restart.
    pub initial_delay_ms: u64,
    /// Cap on the doubled delay.
    pub max_delay_ms: u64,
    /// Minimum delay before re-listening after the listener itself failed (default 500),
    /// doubled per consecutive listener failure up to `max_delay_ms`.
    pub listener_retry_delay_ms: u64,
    /// Consecutive listener failures tolerated before giving up to Idle (default 5).
    pub listener_max_consecutive: u32,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        RestartPolicy {
            max_consecutive: None,
            initial_delay_ms: 0,
            max_delay_ms: 30_000,
            listener_retry_delay_ms: 500,
            listener_max_consecutive: 5,
        }
    }
}

impl RestartPolicy {
    /// Never give up, never wait (listener failures still back off).
    pub fn immediate() -> Self {
        Self::default()
    }

    /// Exponential back-off with an attempt limit.
    pub fn backoff(max_consecutive: u32, initial: Duration, max: Duration) -> Self {
        RestartPolicy {
            max_consecutive: Some(max_consecutive),
            initial_delay_ms: millis(initial),
            max_delay_ms: millis(max),
            ..Self::default()
        }
    }

    /// Override the listener-failure floor and limit.
    pub fn with_listener_retry(mut self, delay: Duration, max_consecutive: u32) -> Self {
        self.listener_retry_delay_ms = millis(delay);
        self.listener_max_consecutive = max_consecutive;
        self
    }

    /// Whether restart number `attempt` (1-based) is permitted.
    pub fn allows(&self, attempt: u32) -> bool {
        match self.max_consecutive {
            Some(max) => attempt <= max,
            None => true,
        }
    }

    /// Delay before restart number `attempt` (1-based): initial * 2^(attempt-1), capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        doubled(self.initial_delay_ms, attempt, self.max_delay_ms)
    }

    /// Whether re-listening after listener failure number `failure` (1-based) is permitted.
    pub fn allows_listener(&self, failure: u32) -> bool {
        failure <= self.listener_max_consecutive
    }

    /// Floor on the delay before re-listening after listener failure number `failure`.
    pub fn listener_delay_for(&self, failure: u32) -> Duration {
        doubled(self.listener_retry_delay_ms, failure, self.max_delay_ms)
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn doubled(initial_ms: u64, attempt: u32, max_ms: u64) -> Duration {
    if initial_ms == 0 || attempt == 0 {
        return Duration::ZERO;
    }
    let shift = attempt.saturating_sub(1).min(32);
    let ms = initial_ms
        .saturating_mul(1u64 << shift)
        .min(max_ms.max(initial_ms));
    Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_unlimited_and_immediate() {
        let p = RestartPolicy::default();
        assert!(p.allows(1));
        assert!(p.allows(u32::MAX));
        assert_eq!(p.delay_for(1), Duration::ZERO);
        assert_eq!(p.delay_for(50), Duration::ZERO);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = RestartPolicy::backoff(5, Duration::from_millis(100), Duration::from_millis(350));
        assert_eq!(p.delay_for(1), Duration::from_millis(100));
        assert_eq!(p.delay_for(2), Duration::from_millis(200));
        assert_eq!(p.delay_for(3), Duration::from_millis(350));
        assert_eq!(p.delay_for(40), Duration::from_millis(350));
        assert!(p.allows(5));
        assert!(!p.allows(6));
    }

    #[test]
    fn listener_failures_back_off_by_default() {
        let p = RestartPolicy::default();
        assert_eq!(p.listener_delay_for(1), Duration::from_millis(500));
        assert_eq!(p.listener_delay_for(2), Duration::from_millis(1000));
        assert_eq!(p.listener_delay_for(20), Duration::from_millis(30_000));
        assert!(p.allows_listener(5));
        assert!(!p.allows_listener(6));
    }

    #[test]
    fn oversized_durations_saturate() {
        let p = RestartPolicy::backoff(1, Duration::MAX, Duration::MAX)
            .with_listener_retry(Duration::MAX, 1);
        assert_eq!(p.initial_delay_ms, u64::MAX);
        assert_eq!(p.max_delay_ms, u64::MAX);
        assert_eq!(p.listener_retry_delay_ms, u64::MAX);
        assert_eq!(p.delay_for(3), Duration::from_millis(u64::MAX));
    }
}
