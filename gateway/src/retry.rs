//! Retry policy: exponential backoff with optional jitter, cancellable
//! sleeps, and a caller-supplied classifier deciding whether a given
//! failure is worth retrying at all.

use std::time::Duration;

use forge_core::CancelScope;
use rand::Rng;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// `delay_i = min(maxDelay, baseDelay * backoffFactor^i)`, optionally
    /// jittered by up to +-25%.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.backoff_factor.powi(attempt as i32);
        let base_millis = self.base_delay.as_secs_f64() * 1000.0 * exp;
        let capped = base_millis.min(self.max_delay.as_secs_f64() * 1000.0);
        let millis = if self.jitter {
            let factor = rand::thread_rng().gen_range(0.75..=1.25);
            capped * factor
        } else {
            capped
        };
        Duration::from_secs_f64((millis / 1000.0).max(0.0))
    }

    /// Run `attempt` for `i in 0..=max_retries`, retrying only while
    /// `is_retryable(&err)` holds and the scope has not cancelled. Sleeps
    /// between attempts race the scope's cancellation.
    pub async fn run<F, Fut, T, E>(
        &self,
        scope: &CancelScope,
        is_retryable: impl Fn(&E) -> bool,
        mut attempt: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let mut last_err = None;
        for i in 0..=self.max_retries {
            if scope.is_cancelled() {
                if let Some(err) = last_err {
                    return Err(err);
                }
            }
            match attempt().await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    let retryable = is_retryable(&e) && i < self.max_retries;
                    last_err = Some(e);
                    if !retryable {
                        break;
                    }
                    let delay = self.delay_for_attempt(i);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = scope.cancelled() => break,
                    }
                }
            }
        }
        Err(last_err.expect("at least one attempt always runs"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn delay_grows_exponentially_and_is_capped() {
        let policy = RetryPolicy {
            jitter: false,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for_attempt(0), policy.base_delay);
        assert_eq!(
            policy.delay_for_attempt(1),
            Duration::from_millis(400)
        );
        let huge = policy.delay_for_attempt(20);
        assert!(huge <= policy.max_delay);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_factor: 1.0,
            jitter: false,
        };
        let scope = CancelScope::with_timeout(Duration::from_secs(5));
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result: Result<u32, &'static str> = policy
            .run(&scope, |_| true, || {
                let calls = calls2.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err("transient")
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_stops_immediately() {
        let policy = RetryPolicy::default();
        let scope = CancelScope::with_timeout(Duration::from_secs(5));
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result: Result<u32, &'static str> = policy
            .run(&scope, |_| false, || {
                let calls = calls2.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("fatal")
                }
            })
            .await;
        assert_eq!(result, Err("fatal"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_max_retries_then_returns_last_error() {
        let policy = RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            backoff_factor: 1.0,
            jitter: false,
        };
        let scope = CancelScope::with_timeout(Duration::from_secs(5));
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result: Result<u32, &'static str> = policy
            .run(&scope, |_| true, || {
                let calls = calls2.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("still failing")
                }
            })
            .await;
        assert_eq!(result, Err("still failing"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
