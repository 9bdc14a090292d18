//! Cooperative cancellation and first-writer-wins resolution
//!
//! Every background activity of one submission (rebroadcast loop, poll loop,
//! push listener) watches the same [`CancelToken`]. The race outcome lives in
//! a [`Decision`]: whoever flips its flag first owns the outcome, every later
//! `resolve` is a no-op, and the winning write also fires the token.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};

/// Clonable, idempotent cancellation signal
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request cancellation. Calling this more than once has no further effect.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Completes once `cancel` has been called (immediately if it already was)
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot observe a close
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-assignment result cell shared by competing observers
#[derive(Debug)]
pub struct Decision<T> {
    decided: AtomicBool,
    slot: Mutex<Option<oneshot::Sender<T>>>,
    token: CancelToken,
}

impl<T> Decision<T> {
    /// Create a decision bound to `token`; the receiver yields the winning value
    pub fn new(token: CancelToken) -> (Arc<Self>, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        let decision = Arc::new(Self {
            decided: AtomicBool::new(false),
            slot: Mutex::new(Some(tx)),
            token,
        });
        (decision, rx)
    }

    /// Try to decide. Returns `true` only for the first caller.
    pub fn resolve(&self, value: T) -> bool {
        if self
            .decided
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        if let Some(tx) = self.slot.lock().take() {
            let _ = tx.send(value);
        }
        self.token.cancel();
        true
    }

    pub fn is_decided(&self) -> bool {
        self.decided.load(Ordering::Acquire)
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn first_writer_wins() {
        let (decision, rx) = Decision::new(CancelToken::new());
        assert!(decision.resolve("push"));
        assert!(!decision.resolve("poll"));
        assert!(!decision.resolve("deadline"));
        assert_eq!(rx.await.unwrap(), "push");
        assert!(decision.token().is_cancelled());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_resolvers_produce_exactly_one_winner() {
        for _ in 0..50 {
            let (decision, rx) = Decision::new(CancelToken::new());
            let winners = Arc::new(AtomicUsize::new(0));

            let mut handles = Vec::new();
            for id in 0..8u32 {
                let decision = Arc::clone(&decision);
                let winners = Arc::clone(&winners);
                handles.push(tokio::spawn(async move {
                    if decision.resolve(id) {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                }));
            }
            for handle in handles {
                handle.await.unwrap();
            }

            assert_eq!(winners.load(Ordering::SeqCst), 1);
            assert!(rx.await.unwrap() < 8);
        }
    }

    #[tokio::test]
    async fn cancel_is_idempotent_and_wakes_waiters() {
        let token = CancelToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };

        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();

        // Already cancelled: completes immediately
        token.cancelled().await;
    }
}
