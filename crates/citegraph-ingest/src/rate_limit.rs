//! Shared call quota and retry/backoff policy.
//!
//! One [`FixedWindowLimiter`] is shared by every worker that talks to the same service, so
//! the quota bounds the aggregate call rate rather than the rate of any single worker.

use std::future::Future;
use std::time::{Duration, Instant};

use citegraph_core::config::{RateLimitConfig, RetryConfig};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{IngestError, Result};

struct WindowState {
    started: Instant,
    calls: u32,
}

/// At most `max_calls` acquisitions per `window`, across all callers.
pub struct FixedWindowLimiter {
    max_calls: u32,
    window: Duration,
    state: Mutex<WindowState>,
}

impl FixedWindowLimiter {
    pub fn new(max_calls: u32, window: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1),
            window,
            state: Mutex::new(WindowState {
                started: Instant::now(),
                calls: 0,
            }),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_calls, Duration::from_secs(config.window_secs))
    }

    /// Wait until a call fits in the current window, then count it.
    ///
    /// The lock is released while sleeping so other callers can observe the rollover.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                if state.started.elapsed() >= self.window {
                    state.started = Instant::now();
                    state.calls = 0;
                }
                if state.calls < self.max_calls {
                    state.calls += 1;
                    return;
                }
                self.window.saturating_sub(state.started.elapsed())
            };
            debug!(wait_ms = wait.as_millis() as u64, "call quota exhausted, waiting for window");
            sleep(wait).await;
        }
    }

    /// Calls counted in the current window.
    pub async fn calls_in_window(&self) -> u32 {
        let state = self.state.lock().await;
        if state.started.elapsed() >= self.window {
            0
        } else {
            state.calls
        }
    }
}

/// Outcome of one attempt inside [`RetryPolicy::run`].
pub enum Attempt<T> {
    Done(T),
    /// Retry after backoff. `error: None` means the service rejected the call for rate.
    Retry {
        after: Option<Duration>,
        error: Option<IngestError>,
    },
    Fail(IngestError),
}

impl<T> Attempt<T> {
    /// Classify a result: transient errors retry, the rest fail.
    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(value) => Attempt::Done(value),
            Err(e) if e.is_transient() => Attempt::Retry {
                after: None,
                error: Some(e),
            },
            Err(e) => Attempt::Fail(e),
        }
    }
}

/// Bounded exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }

    /// Delay before retry number `retry` (0-based). A server-provided delay wins.
    pub fn delay_for(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(after) = retry_after {
            return after.min(self.max_delay);
        }
        self.base_delay
            .saturating_mul(2u32.saturating_pow(retry))
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails permanently, or the attempt budget is spent.
    /// Every attempt first takes a slot from `limiter`.
    pub async fn run<T, F, Fut>(
        &self,
        limiter: &FixedWindowLimiter,
        service: &str,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Attempt<T>>,
    {
        let mut attempt = 0u32;
        loop {
            limiter.acquire().await;
            match op(attempt).await {
                Attempt::Done(value) => return Ok(value),
                Attempt::Fail(error) => return Err(error),
                Attempt::Retry { after, error } => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        warn!(service, attempts = attempt, "retry budget exhausted");
                        return Err(error.unwrap_or_else(|| IngestError::RateLimited {
                            service: service.to_string(),
                            attempts: attempt,
                        }));
                    }
                    let delay = self.delay_for(attempt - 1, after);
                    let delay_ms = delay.as_millis() as u64;
                    match &error {
                        Some(e) => warn!(
                            service,
                            attempt,
                            delay_ms,
                            error = %e,
                            "transient failure, backing off"
                        ),
                        None => warn!(service, attempt, delay_ms, "rate limited, backing off"),
                    }
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(5))
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(8, Duration::from_millis(100), Duration::from_secs(1));
        assert_eq!(policy.delay_for(0, None), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1, None), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3, None), Duration::from_millis(800));
        assert_eq!(policy.delay_for(4, None), Duration::from_secs(1));
        assert_eq!(policy.delay_for(40, None), Duration::from_secs(1));
    }

    #[test]
    fn retry_after_is_honored_but_capped() {
        let policy = RetryPolicy::new(8, Duration::from_millis(100), Duration::from_secs(10));
        assert_eq!(
            policy.delay_for(0, Some(Duration::from_secs(3))),
            Duration::from_secs(3)
        );
        assert_eq!(
            policy.delay_for(0, Some(Duration::from_secs(60))),
            Duration::from_secs(10)
        );
    }

    #[tokio::test]
    async fn limiter_waits_for_next_window() {
        let limiter = FixedWindowLimiter::new(2, Duration::from_millis(150));
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(100));
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert_eq!(limiter.calls_in_window().await, 1);
    }

    #[tokio::test]
    async fn limiter_quota_is_shared_across_tasks() {
        let limiter = Arc::new(FixedWindowLimiter::new(3, Duration::from_secs(30)));
        for _ in 0..3 {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move { limiter.acquire().await })
                .await
                .unwrap();
        }
        assert_eq!(limiter.calls_in_window().await, 3);

        let blocked = tokio::time::timeout(Duration::from_millis(50), limiter.acquire()).await;
        assert!(blocked.is_err());
    }

    #[tokio::test]
    async fn run_retries_rate_limits_until_success() {
        let limiter = FixedWindowLimiter::new(100, Duration::from_secs(60));
        let calls = AtomicU32::new(0);

        let value = fast_policy(8)
            .run(&limiter, "test", |_| async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Attempt::Retry {
                        after: None,
                        error: None,
                    }
                } else {
                    Attempt::Done(7)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(limiter.calls_in_window().await, 3);
    }

    #[tokio::test]
    async fn run_gives_up_after_max_attempts() {
        let limiter = FixedWindowLimiter::new(100, Duration::from_secs(60));
        let calls = AtomicU32::new(0);

        let err = fast_policy(4)
            .run(&limiter, "test", |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Attempt::<()>::Retry {
                    after: None,
                    error: None,
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::RateLimited { attempts: 4, .. }));
        assert!(err.is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn run_does_not_retry_permanent_failures() {
        let limiter = FixedWindowLimiter::new(100, Duration::from_secs(60));
        let calls = AtomicU32::new(0);

        let err = fast_policy(8)
            .run(&limiter, "test", |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Attempt::<()>::Fail(IngestError::NotFound("x".into()))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::NotFound(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
