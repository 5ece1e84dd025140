//! Per-model three-state circuit breaker: `Closed -> Open -> HalfOpen ->
//! Closed`. Trips to `Open` when, within a sliding window `interval`,
//! `requests >= N && failures/requests >= theta`. `N`/`theta` scale with
//! the model's declared reliability (higher RPM/TPM -> more lenient).
//! While `Open`, calls are refused immediately. After `timeout`, the
//! breaker admits up to `max_probes` `HalfOpen` probes; all succeeding
//! closes it, any failing reopens it.

use std::collections::VecDeque;
use std::time::Duration;

use forge_core::ModelConfig;
use parking_lot::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: BreakerState,
    opened_at: Instant,
    window: VecDeque<(Instant, bool)>,
    half_open_probes_issued: u32,
    half_open_successes: u32,
}

pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    interval: Duration,
    n: u32,
    theta: f64,
    timeout: Duration,
    max_probes: u32,
}

impl CircuitBreaker {
    pub fn new(n: u32, theta: f64, interval: Duration, timeout: Duration, max_probes: u32) -> Self {
        CircuitBreaker {
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                opened_at: Instant::now(),
                window: VecDeque::new(),
                half_open_probes_issued: 0,
                half_open_successes: 0,
            }),
            interval,
            n,
            theta,
            timeout,
            max_probes,
        }
    }

    /// `N=10, theta=0.6` for higher-reliability models (RPM or TPM above a
    /// generous floor); `N=3, theta=0.4` otherwise -- a sparser limiter
    /// budget gets a twitchier breaker.
    pub fn from_model_config(cfg: &ModelConfig) -> Self {
        let reliable = cfg.max_rpm >= 60.0 || cfg.max_tpm >= 60_000.0;
        let (n, theta) = if reliable { (10, 0.6) } else { (3, 0.4) };
        CircuitBreaker::new(n, theta, Duration::from_secs(60), Duration::from_secs(30), 3)
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    fn prune(interval: Duration, window: &mut VecDeque<(Instant, bool)>) {
        let cutoff = Instant::now().checked_sub(interval).unwrap_or_else(Instant::now);
        while let Some(&(ts, _)) = window.front() {
            if ts < cutoff {
                window.pop_front();
            } else {
                break;
            }
        }
    }

    /// Non-blocking admission check; transitions `Open -> HalfOpen` when
    /// `timeout` has elapsed. Returns `false` if the call should be
    /// refused immediately.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                if inner.opened_at.elapsed() >= self.timeout {
                    inner.state = BreakerState::HalfOpen;
                    inner.half_open_probes_issued = 1;
                    inner.half_open_successes = 0;
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                if inner.half_open_probes_issued < self.max_probes {
                    inner.half_open_probes_issued += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record the outcome of a call that [`CircuitBreaker::allow`] admitted.
    pub fn on_result(&self, success: bool) {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => {
                Self::prune(self.interval, &mut inner.window);
                inner.window.push_back((Instant::now(), success));
                let requests = inner.window.len() as u32;
                let failures = inner.window.iter().filter(|(_, ok)| !*ok).count() as u32;
                if requests >= self.n && failures as f64 / requests as f64 >= self.theta {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Instant::now();
                    inner.window.clear();
                }
            }
            BreakerState::HalfOpen => {
                if !success {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Instant::now();
                    inner.window.clear();
                    inner.half_open_probes_issued = 0;
                    inner.half_open_successes = 0;
                } else {
                    inner.half_open_successes += 1;
                    if inner.half_open_successes >= self.max_probes {
                        inner.state = BreakerState::Closed;
                        inner.window.clear();
                        inner.half_open_probes_issued = 0;
                        inner.half_open_successes = 0;
                    }
                }
            }
            BreakerState::Open => {
                // allow() never admits a call while Open; a result arriving
                // here would be a caller bug, not a state we need to handle.
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_open_after_n_requests_over_threshold() {
        let cb = CircuitBreaker::new(3, 0.4, Duration::from_secs(60), Duration::from_secs(30), 3);
        assert!(cb.allow());
        cb.on_result(false);
        assert!(cb.allow());
        cb.on_result(false);
        assert_eq!(cb.state(), BreakerState::Closed);
        assert!(cb.allow());
        cb.on_result(true);
        assert_eq!(cb.state(), BreakerState::Open);
    }

    #[test]
    fn open_breaker_refuses_immediately() {
        let cb = CircuitBreaker::new(1, 0.1, Duration::from_secs(60), Duration::from_secs(30), 3);
        assert!(cb.allow());
        cb.on_result(false);
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(!cb.allow());
    }

    #[test]
    fn half_open_closes_after_max_probes_succeed() {
        let cb = CircuitBreaker::new(1, 0.1, Duration::from_secs(60), Duration::from_millis(10), 2);
        assert!(cb.allow());
        cb.on_result(false);
        assert_eq!(cb.state(), BreakerState::Open);

        std::thread::sleep(Duration::from_millis(25));
        assert!(cb.allow());
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        cb.on_result(true);
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        assert!(cb.allow());
        cb.on_result(true);
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_reopens_on_any_probe_failure() {
        let cb = CircuitBreaker::new(1, 0.1, Duration::from_secs(60), Duration::from_millis(10), 3);
        assert!(cb.allow());
        cb.on_result(false);
        std::thread::sleep(Duration::from_millis(25));
        assert!(cb.allow());
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        cb.on_result(false);
        assert_eq!(cb.state(), BreakerState::Open);
    }
}
