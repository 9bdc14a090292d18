//! Best-effort periodic resubmission of identical wire bytes
//!
//! Resubmitting the same signed bytes is idempotent at the ledger, so errors
//! here are only logged. The loop exists to improve delivery odds while the
//! confirmation race is running.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use super::decision::CancelToken;
use super::transaction::SignedTransaction;
use crate::metrics::metrics;
use crate::transport::Transport;

pub const DEFAULT_REBROADCAST_INTERVAL: Duration = Duration::from_millis(300);

/// Background resubmission loop for one transaction
#[derive(Debug)]
pub struct Rebroadcaster {
    cancel: CancelToken,
    handle: Option<JoinHandle<u64>>,
}

impl Rebroadcaster {
    /// Start resubmitting `tx` every `interval` until `cancel` fires or
    /// `deadline` passes. The first resend happens one interval from now;
    /// the caller is expected to have submitted once already.
    pub fn spawn(
        transport: Arc<dyn Transport>,
        tx: SignedTransaction,
        interval: Duration,
        deadline: Instant,
        cancel: CancelToken,
    ) -> Self {
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut sent = 0u64;
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = sleep_until(deadline) => break,
                    _ = ticker.tick() => {}
                }

                // An in-flight resend is dropped as soon as cancellation lands
                let result = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    result = transport.submit_raw(tx.bytes()) => result,
                };

                sent += 1;
                metrics().rebroadcasts_total.inc();
                match result {
                    Ok(signature) => trace!(signature = %signature, attempt = sent, "Rebroadcast"),
                    Err(e) if e.is_transient() => {
                        metrics().rebroadcast_errors.inc();
                        debug!(error = %e, attempt = sent, "Rebroadcast failed, ignoring");
                    }
                    Err(e) => {
                        metrics().rebroadcast_errors.inc();
                        warn!(
                            category = e.category(),
                            error = %e,
                            attempt = sent,
                            "Rebroadcast rejected by endpoint"
                        );
                    }
                }
            }

            sent
        });

        Self {
            cancel,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the loop and wait for it to exit
    ///
    /// Returns the number of resends performed, or `None` if the loop was
    /// already stopped. Once this returns no resend is in flight.
    pub async fn stop(&mut self) -> Option<u64> {
        self.cancel.cancel();
        let handle = self.handle.take()?;
        match handle.await {
            Ok(sent) => {
                debug!(resends = sent, "Rebroadcaster stopped");
                Some(sent)
            }
            Err(e) => {
                warn!(error = %e, "Rebroadcast task ended abnormally");
                None
            }
        }
    }
}

impl Drop for Rebroadcaster {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
