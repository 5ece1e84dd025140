//! A cancellation scope every public operation in this workspace accepts.
//!
//! Built directly on `tokio::sync::watch` rather than pulling in a dedicated
//! cancellation-token crate: a `watch<bool>` channel is enough to broadcast
//! a one-shot "cancelled" flag to an arbitrary number of clones, and every
//! other crate here already depends on `tokio`.

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Cancellation signalled either by an explicit call to [`CancelHandle::cancel`]
/// or by the wall-clock deadline passing.
#[derive(Clone)]
pub struct CancelScope {
    rx: watch::Receiver<bool>,
    deadline: Instant,
}

/// The paired handle that can trigger cancellation of every [`CancelScope`]
/// clone derived from it.
#[derive(Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelScope {
    /// Create a scope that expires after `timeout`, with no external cancel
    /// handle (the deadline is the only cancellation source).
    pub fn with_timeout(timeout: Duration) -> Self {
        let (_handle, scope) = Self::new(timeout);
        scope
    }

    /// Create a linked (handle, scope) pair. The scope is cancelled when
    /// either `handle.cancel()` is called or `timeout` elapses.
    pub fn new(timeout: Duration) -> (CancelHandle, Self) {
        let (tx, rx) = watch::channel(false);
        let deadline = Instant::now() + timeout;
        (CancelHandle { tx }, CancelScope { rx, deadline })
    }

    /// True once cancellation has been signalled or the deadline has passed.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || Instant::now() >= self.deadline
    }

    /// Time remaining until the deadline; zero if already past.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Resolves once the scope is cancelled (explicitly or via deadline).
    /// Races an explicit-cancel wait against a deadline sleep so callers can
    /// `tokio::select!` this against the operation they want to bound.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let sleep = tokio::time::sleep_until(self.deadline);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return,
                changed = rx.changed() => {
                    if changed.is_err() || *rx.borrow() {
                        return;
                    }
                }
            }
        }
    }

    /// Run `fut` to completion, or return `None` if the scope is cancelled
    /// first. The spawned future is dropped on cancellation, so any `Drop`
    /// impls in `fut` still run (no leaked guards).
    pub async fn run<F, T>(&self, fut: F) -> Option<T>
    where
        F: std::future::Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = self.cancelled() => None,
            out = fut => Some(out),
        }
    }

    /// Derive a child scope bounded by `min(self.remaining(), timeout)`.
    pub fn child(&self, timeout: Duration) -> CancelScope {
        let bound = self.remaining().min(timeout);
        let (_handle, mut scope) = Self::new(bound);
        scope.rx = self.rx.clone();
        scope
    }
}

impl CancelHandle {
    /// Signal cancellation to every scope derived from this handle.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn deadline_cancels_without_explicit_signal() {
        let scope = CancelScope::with_timeout(Duration::from_millis(10));
        assert!(!scope.is_cancelled());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(scope.is_cancelled());
    }

    #[tokio::test]
    async fn explicit_cancel_propagates_to_clones() {
        let (handle, scope) = CancelScope::new(Duration::from_secs(30));
        let scope2 = scope.clone();
        assert!(!scope2.is_cancelled());
        handle.cancel();
        scope2.cancelled().await;
        assert!(scope2.is_cancelled());
    }

    #[tokio::test]
    async fn run_returns_none_when_cancelled_first() {
        let scope = CancelScope::with_timeout(Duration::from_millis(5));
        let out = scope
            .run(async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                42
            })
            .await;
        assert_eq!(out, None);
    }

    #[tokio::test]
    async fn run_returns_some_when_fast_enough() {
        let scope = CancelScope::with_timeout(Duration::from_secs(5));
        let out = scope.run(async { 7 }).await;
        assert_eq!(out, Some(7));
    }

    #[tokio::test]
    async fn child_scope_is_bounded_by_parent_remaining() {
        let scope = CancelScope::with_timeout(Duration::from_millis(10));
        let child = scope.child(Duration::from_secs(30));
        assert!(child.remaining() <= Duration::from_millis(10));
    }
}
