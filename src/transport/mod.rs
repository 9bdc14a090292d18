//! Transport seam between the submission engine and a remote ledger endpoint
//!
//! The engine only needs five calls from the outside world:
//! - **submit_raw**: hand signed wire bytes to the endpoint
//! - **get_status**: request/response confirmation lookup
//! - **subscribe_signature**: push notification when a signature lands
//! - **simulate**: dry-run used to explain failures
//! - **latest_blockhash**: needed when building transactions from instructions
//!
//! `subscribe_signature` has a default implementation returning
//! [`TransportError::Unsupported`] so that request/response-only transports
//! degrade to poll-only confirmation.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_sdk::{commitment_config::CommitmentConfig, hash::Hash, signature::Signature};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

pub mod errors;
pub mod rpc;

pub use errors::TransportError;
pub use rpc::SolanaTransport;

/// How long `Subscription::cancel` waits for the listener to unsubscribe
/// before aborting it outright
const UNSUBSCRIBE_GRACE: Duration = Duration::from_millis(500);

/// Status lookup result for a single signature
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Execution error reported by the ledger, serialized
    pub err: Option<String>,
    /// Number of confirmations, `None` once rooted
    pub confirmations: Option<u64>,
    /// "processed" / "confirmed" / "finalized"
    pub confirmation_status: Option<String>,
}

/// Push notification for a subscribed signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureNotification {
    pub slot: u64,
    pub err: Option<String>,
}

/// Result of a dry-run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub err: Option<serde_json::Value>,
    pub logs: Option<Vec<String>>,
}

/// Handle on a live signature subscription
///
/// `cancel` unsubscribes cooperatively; dropping the handle aborts the
/// listener task so a forgotten subscription can never outlive its owner.
#[derive(Debug, Default)]
pub struct Subscription {
    cancel: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(cancel: oneshot::Sender<()>, handle: JoinHandle<()>) -> Self {
        Self {
            cancel: Some(cancel),
            handle: Some(handle),
        }
    }

    /// A subscription with no listener task to tear down
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Unsubscribe and wait for the listener to exit. Idempotent.
    pub async fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(mut handle) = self.handle.take() {
            if tokio::time::timeout(UNSUBSCRIBE_GRACE, &mut handle)
                .await
                .is_err()
            {
                debug!("Listener did not unsubscribe in time, aborting");
                handle.abort();
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Remote ledger endpoint consumed by the submission engine
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Submit signed wire bytes; returns the transaction signature
    async fn submit_raw(&self, bytes: &[u8]) -> Result<Signature, TransportError>;

    /// Look up the current status; `Ok(None)` means the endpoint has no record yet
    async fn get_status(&self, signature: &Signature)
        -> Result<Option<StatusRecord>, TransportError>;

    /// Register for a push notification once `signature` reaches `commitment`
    ///
    /// Notifications are delivered on `sink`. Setup failures must be reported
    /// through the returned `Result`, not through the sink.
    async fn subscribe_signature(
        &self,
        _signature: &Signature,
        _commitment: CommitmentConfig,
        _sink: mpsc::UnboundedSender<SignatureNotification>,
    ) -> Result<Subscription, TransportError> {
        Err(TransportError::Unsupported("subscribe_signature"))
    }

    /// Dry-run the transaction without committing it
    async fn simulate(
        &self,
        bytes: &[u8],
        commitment: CommitmentConfig,
    ) -> Result<SimulationReport, TransportError>;

    /// Fetch a recent blockhash at the given commitment
    async fn latest_blockhash(&self, commitment: CommitmentConfig)
        -> Result<Hash, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscription_cancel_is_idempotent() {
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _ = cancel_rx.await;
        });
        let mut sub = Subscription::new(cancel_tx, handle);
        assert!(sub.cancel.is_some());

        sub.cancel().await;
        assert!(!sub.is_active());
        sub.cancel().await;
        assert!(!sub.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn subscription_cancel_aborts_stuck_listener() {
        let (cancel_tx, _cancel_rx) = oneshot::channel::<()>();
        // Listener ignores the cancel signal entirely
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        let mut sub = Subscription::new(cancel_tx, handle);
        sub.cancel().await;
        assert!(!sub.is_active());
    }

    #[test]
    fn detached_subscription_is_inactive() {
        let sub = Subscription::detached();
        assert!(!sub.is_active());
    }
}
