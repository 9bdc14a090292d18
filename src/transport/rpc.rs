//! JSON-RPC + WebSocket transport backed by `solana_client`

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use futures_util::StreamExt;
use serde::Deserialize;
use solana_client::nonblocking::pubsub_client::PubsubClient;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_rpc_client_api::client_error::Error as ClientError;
use solana_rpc_client_api::config::RpcSignatureSubscribeConfig;
use solana_rpc_client_api::request::RpcRequest;
use solana_rpc_client_api::response::RpcSignatureResult;
use solana_sdk::{commitment_config::CommitmentConfig, hash::Hash, signature::Signature};
use solana_transaction_status::TransactionConfirmationStatus;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::{
    SignatureNotification, SimulationReport, StatusRecord, Subscription, Transport,
    TransportError,
};

/// `simulateTransaction` result envelope
#[derive(Debug, Deserialize)]
struct SimulateEnvelope {
    value: SimulationReport,
}

/// Transport talking to a Solana JSON-RPC endpoint, with optional pubsub
pub struct SolanaTransport {
    rpc: Arc<RpcClient>,
    rpc_url: String,
    ws_url: Option<String>,
    request_timeout: Duration,
}

impl std::fmt::Debug for SolanaTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaTransport")
            .field("rpc_url", &self.rpc_url)
            .field("ws_url", &self.ws_url)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl SolanaTransport {
    /// Create a transport; without `ws_url` confirmation runs poll-only
    pub fn new(
        rpc_url: impl Into<String>,
        ws_url: Option<String>,
        request_timeout: Duration,
        commitment: CommitmentConfig,
    ) -> Self {
        let rpc_url = rpc_url.into();
        let rpc = RpcClient::new_with_timeout_and_commitment(
            rpc_url.clone(),
            request_timeout,
            commitment,
        );
        Self {
            rpc: Arc::new(rpc),
            rpc_url,
            ws_url,
            request_timeout,
        }
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    pub fn ws_url(&self) -> Option<&str> {
        self.ws_url.as_deref()
    }

    fn classify(&self, err: &ClientError) -> TransportError {
        TransportError::from_client_error(err, self.request_timeout)
    }
}

fn confirmation_status_str(status: &TransactionConfirmationStatus) -> &'static str {
    match status {
        TransactionConfirmationStatus::Processed => "processed",
        TransactionConfirmationStatus::Confirmed => "confirmed",
        TransactionConfirmationStatus::Finalized => "finalized",
    }
}

/// Ledger errors are surfaced as their JSON form, the same shape the RPC returns
fn ledger_error_string<E: serde::Serialize + std::fmt::Debug>(err: &E) -> String {
    serde_json::to_string(err).unwrap_or_else(|_| format!("{err:?}"))
}

#[async_trait]
impl Transport for SolanaTransport {
    async fn submit_raw(&self, bytes: &[u8]) -> Result<Signature, TransportError> {
        let params = serde_json::json!([
            BASE64_STANDARD.encode(bytes),
            {
                "encoding": "base64",
                "skipPreflight": true,
            }
        ]);
        let signature: String = self
            .rpc
            .send(RpcRequest::SendTransaction, params)
            .await
            .map_err(|e| self.classify(&e))?;

        Signature::from_str(&signature).map_err(|e| TransportError::Decode(e.to_string()))
    }

    async fn get_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<StatusRecord>, TransportError> {
        let response = self
            .rpc
            .get_signature_statuses(&[*signature])
            .await
            .map_err(|e| self.classify(&e))?;

        let status = response.value.into_iter().next().flatten();
        Ok(status.map(|s| StatusRecord {
            err: s.err.as_ref().map(ledger_error_string),
            confirmations: s.confirmations.map(|c| c as u64),
            confirmation_status: s
                .confirmation_status
                .as_ref()
                .map(|c| confirmation_status_str(c).to_string()),
        }))
    }

    async fn subscribe_signature(
        &self,
        signature: &Signature,
        commitment: CommitmentConfig,
        sink: mpsc::UnboundedSender<SignatureNotification>,
    ) -> Result<Subscription, TransportError> {
        let ws_url = self
            .ws_url
            .as_deref()
            .ok_or(TransportError::Unsupported("subscribe_signature"))?;

        debug!("Connecting to WebSocket: {}", ws_url);
        let client = PubsubClient::new(ws_url).await?;

        let signature = *signature;
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), TransportError>>();
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

        // The notification stream borrows the client, so both live in the task
        let handle = tokio::spawn(async move {
            let (mut notifications, unsubscribe) = match client
                .signature_subscribe(
                    &signature,
                    Some(RpcSignatureSubscribeConfig {
                        commitment: Some(commitment),
                        enable_received_notification: Some(false),
                    }),
                )
                .await
            {
                Ok(result) => result,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.into()));
                    return;
                }
            };
            if ready_tx.send(Ok(())).is_err() {
                // Caller gave up during setup
                unsubscribe().await;
                return;
            }

            loop {
                tokio::select! {
                    _ = &mut cancel_rx => break,
                    _ = sink.closed() => break,
                    next = notifications.next() => {
                        let Some(response) = next else { break };
                        if let RpcSignatureResult::ProcessedSignature(processed) = response.value {
                            let notification = SignatureNotification {
                                slot: response.context.slot,
                                err: processed.err.as_ref().map(ledger_error_string),
                            };
                            if sink.send(notification).is_err() {
                                debug!("Receiver dropped, unsubscribing");
                                break;
                            }
                        }
                    }
                }
            }
            unsubscribe().await;
        });

        match ready_rx.await {
            Ok(Ok(())) => {
                info!(signature = %signature, "Signature subscription established");
                Ok(Subscription::new(cancel_tx, handle))
            }
            Ok(Err(e)) => {
                warn!(signature = %signature, error = %e, "Signature subscription failed");
                Err(e)
            }
            Err(_) => Err(TransportError::transport(
                "subscription listener exited before subscribing",
            )),
        }
    }

    async fn simulate(
        &self,
        bytes: &[u8],
        commitment: CommitmentConfig,
    ) -> Result<SimulationReport, TransportError> {
        let params = serde_json::json!([
            BASE64_STANDARD.encode(bytes),
            {
                "encoding": "base64",
                "commitment": commitment.commitment.to_string(),
                "sigVerify": false,
                "replaceRecentBlockhash": true,
            }
        ]);
        let envelope: SimulateEnvelope = self
            .rpc
            .send(RpcRequest::SimulateTransaction, params)
            .await
            .map_err(|e| self.classify(&e))?;
        Ok(envelope.value)
    }

    async fn latest_blockhash(
        &self,
        commitment: CommitmentConfig,
    ) -> Result<Hash, TransportError> {
        let (hash, _last_valid_block_height) = self
            .rpc
            .get_latest_blockhash_with_commitment(commitment)
            .await
            .map_err(|e| self.classify(&e))?;
        Ok(hash)
    }
}
