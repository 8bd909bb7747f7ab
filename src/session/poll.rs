//! Fixed-count, fixed-interval polling
//!
//! Every lifecycle wait (stale session, launch readiness, post-kill
//! confirmation) is a [`RetryPolicy`]. Sleeping goes through
//! `tokio::time`, so tests run the waits on tokio's paused clock.

use std::future::Future;
use std::time::Duration;

use crate::common::config::PollConfig;

/// How many times to probe and how long to sleep between probes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Probes including the first one (minimum 1)
    pub max_attempts: u32,
    /// Sleep between consecutive probes
    pub interval: Duration,
}

impl RetryPolicy {
    pub const fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Probes actually made when every probe fails
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Total time spent sleeping when every probe fails
    pub fn budget(&self) -> Duration {
        self.interval * self.attempts().saturating_sub(1)
    }

    /// Budget in milliseconds, for error messages
    pub fn budget_ms(&self) -> u64 {
        u64::try_from(self.budget().as_millis()).unwrap_or(u64::MAX)
    }

    /// Probe until `condition` returns true or the attempts run out
    ///
    /// Returns whether the condition was met. There is no sleep after the
    /// final probe.
    pub async fn poll_until<F, Fut>(&self, what: &str, mut condition: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let max_attempts = self.attempts();

        for attempt in 1..=max_attempts {
            tracing::info!(attempt, max_attempts, "{}", what);

            if condition().await {
                tracing::debug!(attempt, "{}: condition met", what);
                return true;
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        tracing::warn!(max_attempts, "{}: attempts exhausted", what);
        false
    }
}

impl From<PollConfig> for RetryPolicy {
    fn from(config: PollConfig) -> Self {
        Self::fixed(config.attempts, Duration::from_millis(config.interval_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn test_budget_excludes_final_sleep() {
        let policy = RetryPolicy::fixed(10, Duration::from_secs(5));
        assert_eq!(policy.budget(), Duration::from_secs(45));
        assert_eq!(policy.budget_ms(), 45_000);
    }

    #[test]
    fn test_zero_attempts_still_probes_once() {
        let policy = RetryPolicy::fixed(0, Duration::from_secs(1));
        assert_eq!(policy.budget(), Duration::ZERO);
    }

    #[test]
    fn test_from_poll_config() {
        let policy = RetryPolicy::from(PollConfig {
            attempts: 4,
            interval_ms: 250,
        });
        assert_eq!(policy, RetryPolicy::fixed(4, Duration::from_millis(250)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_at_first_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = RetryPolicy::fixed(10, Duration::from_secs(2));
        let start = Instant::now();

        let met = policy
            .poll_until("probe", || async move {
                calls.fetch_add(1, Ordering::SeqCst) + 1 == 3
            })
            .await;

        assert!(met);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_budget() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = RetryPolicy::fixed(10, Duration::from_secs(5));
        let start = Instant::now();

        let met = policy
            .poll_until("probe", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                false
            })
            .await;

        assert!(!met);
        assert_eq!(calls.load(Ordering::SeqCst), 10);
        assert_eq!(start.elapsed(), Duration::from_secs(45));
    }
}
