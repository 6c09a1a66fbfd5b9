//! Backoff policies for retries and status polling.

use crate::error::ServiceError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Retry policy for transient failures.
///
/// The default performs no retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    #[serde(with = "millis")]
    pub initial_delay: Duration,
    /// Upper bound on the delay between retries.
    #[serde(with = "millis")]
    pub max_delay: Duration,
    /// Backoff multiplier (2.0 doubles the delay each retry).
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self { max_retries, initial_delay, max_delay, multiplier }
    }

    /// Delay before retry number `retry_count` (zero-based):
    /// `initial_delay * multiplier^retry_count`, capped at `max_delay`.
    pub fn calculate_delay(&self, retry_count: u32) -> Duration {
        let delay_ms = (self.initial_delay.as_millis() as f64 * self.multiplier.powi(retry_count as i32))
            .min(self.max_delay.as_millis() as f64) as u64;
        Duration::from_millis(delay_ms)
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or retries run out.
    pub async fn run<T, E, F, Fut>(&self, what: &str, is_transient: impl Fn(&E) -> bool, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut retry_count = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if retry_count < self.max_retries && is_transient(&e) => {
                    let delay = self.calculate_delay(retry_count);
                    debug!(what, retry = retry_count + 1, delay_ms = delay.as_millis() as u64, error = %e, "retrying after backoff");
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Polling schedule for remote state that is waited on (training jobs, endpoints).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    /// First interval between status checks.
    #[serde(with = "millis")]
    pub interval: Duration,
    /// Upper bound on the interval.
    #[serde(with = "millis")]
    pub max_interval: Duration,
    /// Interval growth per poll.
    pub backoff_multiplier: f64,
    /// Total time to wait before giving up.
    #[serde(with = "millis")]
    pub max_wait: Duration,
    /// Consecutive failed status checks tolerated before the wait fails.
    pub max_consecutive_errors: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            max_interval: Duration::from_secs(60),
            backoff_multiplier: 1.5,
            max_wait: Duration::from_secs(2 * 60 * 60),
            max_consecutive_errors: 3,
        }
    }
}

impl PollPolicy {
    #[must_use]
    pub fn next_interval(&self, current: Duration) -> Duration {
        let next = current.as_secs_f64() * self.backoff_multiplier.max(1.0);
        Duration::from_secs_f64(next.min(self.max_interval.as_secs_f64()))
    }
}

/// Result of one status check in [`poll_until`].
pub(crate) enum Poll<T> {
    Ready(T),
    Pending,
}

/// Why [`poll_until`] stopped without a ready value.
#[derive(Debug)]
pub(crate) enum PollFailure {
    TimedOut(Duration),
    Cancelled,
    Service(ServiceError),
}

/// Call `check` on the policy's schedule until it reports ready.
///
/// Transient service errors count against `max_consecutive_errors`; any other service
/// error ends the wait immediately. Cancelling `cancel` only stops the wait.
pub(crate) async fn poll_until<T, F, Fut>(
    policy: &PollPolicy,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<T, PollFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Poll<T>, ServiceError>>,
{
    let start = Instant::now();
    let mut interval = policy.interval;
    let mut consecutive_errors = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(PollFailure::Cancelled);
        }

        match check().await {
            Ok(Poll::Ready(value)) => return Ok(value),
            Ok(Poll::Pending) => consecutive_errors = 0,
            Err(e) if e.is_transient() && consecutive_errors < policy.max_consecutive_errors => {
                consecutive_errors += 1;
                warn!(error = %e, attempt = consecutive_errors, "status check failed; will poll again");
            }
            Err(e) => return Err(PollFailure::Service(e)),
        }

        let elapsed = start.elapsed();
        if elapsed >= policy.max_wait {
            return Err(PollFailure::TimedOut(elapsed));
        }

        let sleep_for = interval.min(policy.max_wait - elapsed);
        tokio::select! {
            () = cancel.cancelled() => return Err(PollFailure::Cancelled),
            () = tokio::time::sleep(sleep_for) => {}
        }
        interval = policy.next_interval(interval);
    }
}

pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_calculate_delay_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(300), 2.0);
        assert_eq!(policy.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(policy.calculate_delay(1), Duration::from_millis(200));
        assert_eq!(policy.calculate_delay(4), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_run_retries_only_transient_errors() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2), 2.0);
        let counter = AtomicU32::new(0);
        let attempts = &counter;

        let result: Result<u32, String> = policy
            .run("flaky", |e: &String| e == "transient", move || async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n < 2 { Err("transient".to_string()) } else { Ok(n) }
            })
            .await;
        assert_eq!(result, Ok(2));

        attempts.store(0, Ordering::SeqCst);
        let result: Result<u32, String> = policy
            .run("fatal", |e: &String| e == "transient", move || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err("conflict".to_string())
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_poll_interval_grows_to_cap() {
        let poll = PollPolicy {
            interval: Duration::from_secs(10),
            max_interval: Duration::from_secs(20),
            backoff_multiplier: 1.5,
            ..PollPolicy::default()
        };
        assert_eq!(poll.next_interval(Duration::from_secs(10)), Duration::from_secs(15));
        assert_eq!(poll.next_interval(Duration::from_secs(15)), Duration::from_secs(20));
    }

    fn quick_poll(max_wait_ms: u64) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(2),
            max_interval: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            max_wait: Duration::from_millis(max_wait_ms),
            max_consecutive_errors: 1,
        }
    }

    #[tokio::test]
    async fn test_poll_until_ready_after_pending() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let value = poll_until(&quick_poll(1_000), &CancellationToken::new(), move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 3 { Ok(Poll::Pending) } else { Ok(Poll::Ready("done")) }
        })
        .await
        .unwrap();
        assert_eq!(value, "done");
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_poll_until_times_out() {
        let result: Result<(), _> =
            poll_until(&quick_poll(20), &CancellationToken::new(), || async { Ok(Poll::Pending) }).await;
        assert!(matches!(result, Err(PollFailure::TimedOut(_))));
    }

    #[tokio::test]
    async fn test_poll_until_honours_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<(), _> = poll_until(&quick_poll(1_000), &cancel, || async { Ok(Poll::Pending) }).await;
        assert!(matches!(result, Err(PollFailure::Cancelled)));
    }

    #[tokio::test]
    async fn test_poll_until_tolerates_limited_transient_errors() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = poll_until(&quick_poll(1_000), &CancellationToken::new(), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ServiceError::Transport("timeout".to_string()))
        })
        .await;
        assert!(matches!(result, Err(PollFailure::Service(ServiceError::Transport(_)))));
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        let result: Result<(), _> = poll_until(&quick_poll(1_000), &CancellationToken::new(), || async {
            Err(ServiceError::NotFound("job".to_string()))
        })
        .await;
        assert!(matches!(result, Err(PollFailure::Service(ServiceError::NotFound(_)))));
    }

    #[test]
    fn test_poll_policy_from_toml_millis() {
        let poll: PollPolicy = toml::from_str("interval = 250\nmax_wait = 1000").unwrap();
        assert_eq!(poll.interval, Duration::from_millis(250));
        assert_eq!(poll.max_wait, Duration::from_secs(1));
        assert_eq!(poll.max_consecutive_errors, 3);
    }
}
