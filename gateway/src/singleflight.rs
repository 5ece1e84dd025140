//! Collapses concurrent calls sharing a cache key into one in-flight
//! execution. Followers receive the same result as the caller that
//! actually ran the call -- no re-execution, no retry amplification.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use futures::future::{FutureExt, Shared};
use serde_json::Value;

type CallResult = Result<Value, String>;
type SharedCall = Shared<Pin<Box<dyn Future<Output = CallResult> + Send>>>;

#[derive(Debug, Default)]
pub struct KeyCounters {
    pub requests: AtomicU64,
    pub deduplicated: AtomicU64,
}

#[derive(Default)]
pub struct Singleflight {
    inflight: DashMap<String, SharedCall>,
    counters: DashMap<String, KeyCounters>,
}

impl Singleflight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` for `key`, or join an already-running call for the same key.
    ///
    /// The check-then-insert must happen under a single map-shard lock, or
    /// two concurrent callers can each observe no in-flight entry and each
    /// build their own future. `DashMap::entry` gives us that: the closure
    /// only runs when the entry is vacant, so whichever caller wins the race
    /// installs the shared future and every other caller joins it instead of
    /// starting a second one.
    pub async fn call<F, Fut>(&self, key: &str, f: F) -> CallResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CallResult> + Send + 'static,
    {
        self.counters
            .entry(key.to_string())
            .or_default()
            .requests
            .fetch_add(1, Ordering::Relaxed);

        let mut joined_existing = true;
        let shared = self
            .inflight
            .entry(key.to_string())
            .or_insert_with(|| {
                joined_existing = false;
                let boxed: Pin<Box<dyn Future<Output = CallResult> + Send>> = Box::pin(f());
                boxed.shared()
            })
            .clone();

        if joined_existing {
            self.counters
                .entry(key.to_string())
                .or_default()
                .deduplicated
                .fetch_add(1, Ordering::Relaxed);
        }

        let result = shared.await;
        if !joined_existing {
            self.inflight.remove(key);
        }
        result
    }

    pub fn requests_for(&self, key: &str) -> u64 {
        self.counters
            .get(key)
            .map(|c| c.requests.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn deduplicated_for(&self, key: &str) -> u64 {
        self.counters
            .get(key)
            .map(|c| c.deduplicated.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn concurrent_calls_with_same_key_execute_once() {
        let sf = Arc::new(Singleflight::new());
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let sf = sf.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                sf.call("k", move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    Ok(serde_json::json!({"v": 1}))
                })
                .await
            }));
        }
        for h in handles {
            let r = h.await.unwrap().unwrap();
            assert_eq!(r, serde_json::json!({"v": 1}));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(sf.requests_for("k"), 8);
        assert_eq!(sf.deduplicated_for("k"), 7);
    }

    /// Runs on a real multi-worker runtime with a barrier so every task
    /// reaches `call()` at the same instant, forcing the admission race the
    /// single-threaded test above can't: without an atomic check-then-insert,
    /// more than one task would observe no in-flight entry and each execute.
    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn racing_callers_on_the_same_key_collapse_to_one_execution() {
        let sf = Arc::new(Singleflight::new());
        let calls = Arc::new(AtomicU32::new(0));
        let barrier = Arc::new(tokio::sync::Barrier::new(8));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let sf = sf.clone();
            let calls = calls.clone();
            let barrier = barrier.clone();
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                sf.call("race-key", move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    Ok(serde_json::json!({"v": 1}))
                })
                .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sequential_calls_with_same_key_each_execute() {
        let sf = Singleflight::new();
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            sf.call("k", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(serde_json::json!(1))
            })
            .await
            .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
