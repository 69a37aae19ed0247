//! Waiter
//!
//! Fixed-cadence polling of a predicate, bounded by a per-call timeout and by
//! the overall run deadline. This is the only place the test flow blocks on
//! captured data.

use std::time::Duration;

use tokio::time::Instant;

use crate::error::{HarnessError, HarnessResult};
use crate::runtime::store::BatchStore;

/// Timeout and cadence for one wait
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl WaitPolicy {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(180),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Outcome of a single predicate check
#[derive(Debug, Clone, PartialEq)]
pub enum Probe<T> {
    Ready(T),
    /// Not yet satisfied; `observed` is reported if the wait times out
    Pending { observed: usize },
}

impl Probe<()> {
    /// Adapt a count-based condition
    pub fn at_least(observed: usize, wanted: usize) -> Self {
        if observed >= wanted {
            Probe::Ready(())
        } else {
            Probe::Pending { observed }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Waiter {
    deadline: Option<Instant>,
}

impl Waiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waiter whose waits never outlive `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Re-check `probe` every `policy.poll_interval` until it is ready
    ///
    /// Returns immediately when the first check succeeds. Fails with
    /// [`HarnessError::Timeout`] once the earlier of the policy timeout and the
    /// run deadline passes; the last check happens at that instant.
    pub async fn wait_for<T, F>(&self, what: &str, policy: WaitPolicy, mut probe: F) -> HarnessResult<T>
    where
        F: FnMut() -> Probe<T>,
    {
        let started = Instant::now();
        let mut limit = started + policy.timeout;
        if let Some(deadline) = self.deadline {
            limit = limit.min(deadline);
        }

        loop {
            let observed = match probe() {
                Probe::Ready(value) => {
                    tracing::debug!("✅ {} satisfied after {:?}", what, started.elapsed());
                    return Ok(value);
                }
                Probe::Pending { observed } => observed,
            };

            let now = Instant::now();
            if now >= limit {
                tracing::warn!("⏰ Timeout waiting for {} (observed {})", what, observed);
                return Err(HarnessError::Timeout {
                    what: what.to_string(),
                    observed,
                    waited: now - started,
                });
            }

            tokio::time::sleep_until((now + policy.poll_interval).min(limit)).await;
        }
    }

    /// Wait until `store` holds at least `wanted` batches
    pub async fn wait_for_batches(&self, store: &BatchStore, wanted: usize, policy: WaitPolicy) -> HarnessResult<()> {
        let what = format!("{wanted} batches");
        self.wait_for(&what, policy, || Probe::at_least(store.count(), wanted))
            .await?;
        tracing::info!("✅ Received {} batches (wanted {})", store.count(), wanted);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast_policy(timeout_ms: u64, poll_ms: u64) -> WaitPolicy {
        WaitPolicy::new(Duration::from_millis(timeout_ms), Duration::from_millis(poll_ms))
    }

    #[tokio::test]
    async fn test_ready_predicate_returns_without_sleeping() {
        let waiter = Waiter::new();
        let started = std::time::Instant::now();

        let value = waiter
            .wait_for("ready", fast_policy(5_000, 1_000), || Probe::Ready(7))
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_never_ready_times_out_near_timeout() {
        let waiter = Waiter::new();
        let started = std::time::Instant::now();

        let err = waiter
            .wait_for::<(), _>("never", fast_policy(300, 50), || Probe::Pending { observed: 3 })
            .await
            .unwrap_err();

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "returned early: {elapsed:?}");
        assert!(elapsed < Duration::from_millis(300 + 50 + 250), "returned late: {elapsed:?}");
        match err {
            HarnessError::Timeout { what, observed, .. } => {
                assert_eq!(what, "never");
                assert_eq!(observed, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_becomes_ready_after_a_few_polls() {
        let waiter = Waiter::new();
        let calls = Cell::new(0);

        waiter
            .wait_for("third call", fast_policy(2_000, 10), || {
                calls.set(calls.get() + 1);
                Probe::at_least(calls.get(), 3)
            })
            .await
            .unwrap();

        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_run_deadline_caps_the_timeout() {
        let waiter = Waiter::with_deadline(Instant::now() + Duration::from_millis(100));
        let started = std::time::Instant::now();

        let err = waiter
            .wait_for::<(), _>("capped", fast_policy(10_000, 20), || Probe::Pending { observed: 0 })
            .await
            .unwrap_err();

        assert!(matches!(err, HarnessError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_wait_for_batches_reports_count() {
        let store = BatchStore::new();
        let err = Waiter::new()
            .wait_for_batches(&store, 2, fast_policy(50, 10))
            .await
            .unwrap_err();

        assert!(matches!(err, HarnessError::Timeout { observed: 0, .. }));
    }
}
