//! One-shot readiness flag that async tasks can await.
//!
//! A flag starts out "not ready" and flips exactly once. Waiters that
//! subscribe before or after the flip both observe it.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReadinessError {
    #[error("readiness not reached within {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait Readiness: Send + Sync {
    fn is_ready(&self) -> bool;

    /// Marks the flag ready. Returns `true` only for the call that flipped it.
    fn mark_ready(&self) -> bool;

    async fn wait_ready(&self);

    async fn wait_ready_timeout(&self, timeout: Duration) -> Result<(), ReadinessError> {
        tokio::time::timeout(timeout, self.wait_ready())
            .await
            .map_err(|_| ReadinessError::Timeout(timeout))
    }
}

#[derive(Debug)]
pub struct ReadinessFlag {
    ready: AtomicBool,
    tx: watch::Sender<bool>,
}

impl ReadinessFlag {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            ready: AtomicBool::new(false),
            tx,
        }
    }

    /// A flag that is ready from the start.
    pub fn ready() -> Self {
        let flag = Self::new();
        flag.mark_ready();
        flag
    }
}

impl Default for ReadinessFlag {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Readiness for ReadinessFlag {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn mark_ready(&self) -> bool {
        if self
            .ready
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.tx.send_replace(true);
        true
    }

    async fn wait_ready(&self) {
        if self.is_ready() {
            return;
        }
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so `wait_for` only returns once the value flips.
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::Arc;

    #[tokio::test]
    async fn mark_ready_flips_once() {
        let flag = ReadinessFlag::new();
        assert!(!flag.is_ready());
        assert!(flag.mark_ready());
        assert!(!flag.mark_ready());
        assert!(flag.is_ready());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn waiters_are_released_by_mark_ready() {
        let flag = Arc::new(ReadinessFlag::new());
        let waiter = {
            let flag = Arc::clone(&flag);
            tokio::spawn(async move { flag.wait_ready().await })
        };
        tokio::task::yield_now().await;
        flag.mark_ready();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter released")
            .expect("join");
    }

    #[tokio::test]
    async fn wait_times_out_when_never_ready() {
        let flag = ReadinessFlag::new();
        let result = flag.wait_ready_timeout(Duration::from_millis(20)).await;
        assert_matches!(result, Err(ReadinessError::Timeout(_)));
    }

    #[tokio::test]
    async fn ready_constructor_does_not_block() {
        let flag = ReadinessFlag::ready();
        flag.wait_ready_timeout(Duration::from_millis(20))
            .await
            .expect("already ready");
    }
}
