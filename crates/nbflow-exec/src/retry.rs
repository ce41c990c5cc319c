//! Bounded retry for registration calls.
//!
//! A coarse fixed-wait policy: `max_attempts` tries with `wait` between them.
//! It is meant for short registration RPCs, not general network resilience.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Retry configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (not retries).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed wait between attempts.
    #[serde(default = "default_wait", with = "duration_secs")]
    pub wait: Duration,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_wait() -> Duration {
    Duration::from_secs(3)
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            wait: default_wait(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, wait: Duration) -> Self {
        Self { max_attempts, wait }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

/// Waits between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// What happened across all attempts of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOutcome {
    /// Number of times the operation was invoked.
    pub attempts: u32,

    /// Error of the last attempt, `None` when an attempt succeeded.
    pub error: Option<String>,
}

impl RetryOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs operations under a [`RetryPolicy`].
#[derive(Clone)]
pub struct Retrier {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl Retrier {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Use a custom sleeper (tests, deadline-bounded waits).
    pub fn with_sleeper(policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { policy, sleeper }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Invoke `op` until it succeeds or attempts run out.
    pub async fn run<F, Fut, E>(&self, label: &str, mut op: F) -> RetryOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: std::fmt::Display,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match op().await {
                Ok(()) => {
                    return RetryOutcome {
                        attempts: attempt,
                        error: None,
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        operation = label,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Operation failed"
                    );
                    last_error = Some(e.to_string());
                    if attempt < max_attempts {
                        self.sleeper.sleep(self.policy.wait).await;
                    }
                }
            }
        }

        tracing::error!(operation = label, max_attempts, "Operation failed after all attempts");
        RetryOutcome {
            attempts: max_attempts,
            error: last_error,
        }
    }
}

impl Default for Retrier {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl std::fmt::Debug for Retrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retrier").field("policy", &self.policy).finish()
    }
}

/// Run `op` with the tokio sleeper.
pub async fn with_retry<F, Fut, E>(policy: RetryPolicy, label: &str, op: F) -> RetryOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    Retrier::new(policy).run(label, op).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct CountingSleeper(AtomicU32);

    #[async_trait]
    impl Sleeper for CountingSleeper {
        async fn sleep(&self, _duration: Duration) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.wait, Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_succeeds_after_failures() {
        let sleeper = Arc::new(CountingSleeper::default());
        let retrier = Retrier::with_sleeper(RetryPolicy::default(), sleeper.clone());
        let calls = AtomicU32::new(0);

        let outcome = retrier
            .run("register", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("unavailable")
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert!(outcome.succeeded());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(sleeper.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_always_failing_stops_at_max_attempts() {
        let sleeper = Arc::new(CountingSleeper::default());
        let policy = RetryPolicy::new(4, Duration::from_secs(1));
        let retrier = Retrier::with_sleeper(policy, sleeper.clone());
        let calls = AtomicU32::new(0);

        let outcome = retrier
            .run("register", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("boom") }
            })
            .await;

        assert!(!outcome.succeeded());
        assert_eq!(outcome.attempts, 4);
        assert_eq!(outcome.error.as_deref(), Some("boom"));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(sleeper.0.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_waits_between_attempts() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let outcome = with_retry(RetryPolicy::default(), "register", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err("first")
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(outcome.succeeded());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_first_success_does_not_sleep() {
        let sleeper = Arc::new(CountingSleeper::default());
        let retrier = Retrier::with_sleeper(RetryPolicy::default(), sleeper.clone());
        let outcome = retrier.run("register", || async { Ok::<(), String>(()) }).await;
        assert_eq!(outcome.attempts, 1);
        assert_eq!(sleeper.0.load(Ordering::SeqCst), 0);
    }
}
