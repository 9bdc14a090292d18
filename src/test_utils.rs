//! Test utilities
//!
//! A scriptable in-memory [`Transport`] for deterministic tests. Combine with
//! `#[tokio::test(start_paused = true)]`: every call is recorded with its
//! virtual timestamp so tests can assert on timing and on the absence of
//! calls after shutdown.
//!
//! Only compiled when running tests or with the `test_utils` feature.

#![cfg(any(test, feature = "test_utils"))]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use solana_sdk::{commitment_config::CommitmentConfig, hash::Hash, signature::Signature};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::transport::{
    SignatureNotification, SimulationReport, StatusRecord, Subscription, Transport,
    TransportError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    SubmitRaw,
    GetStatus,
    Subscribe,
    Simulate,
    LatestBlockhash,
}

/// One scripted answer to `get_status`
#[derive(Debug, Clone)]
pub enum StatusStep {
    Record(Option<StatusRecord>),
    Error(TransportError),
    /// Never answers
    Hang,
}

/// How `subscribe_signature` behaves
#[derive(Debug, Clone)]
pub enum PushBehavior {
    /// Falls back to the trait default
    Unsupported,
    FailSetup(TransportError),
    /// Subscribes but never notifies
    Silent,
    /// Notifies once after the delay, with the given error
    NotifyAfter(Duration, Option<String>),
}

/// Scriptable transport
///
/// Unscripted calls succeed: `submit_raw` returns
/// [`FakeTransport::default_signature`], `get_status` returns the default
/// step (no record), `simulate` returns a clean report.
#[derive(Debug)]
pub struct FakeTransport {
    submit_results: Mutex<VecDeque<Result<Signature, TransportError>>>,
    submit_delay: Option<Duration>,
    status_script: Mutex<VecDeque<StatusStep>>,
    status_default: StatusStep,
    push: PushBehavior,
    simulation: Result<SimulationReport, TransportError>,
    simulation_delay: Option<Duration>,
    blockhash: Hash,
    calls: Mutex<Vec<(CallKind, Instant)>>,
    unsubscribed: Arc<AtomicBool>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            submit_results: Mutex::new(VecDeque::new()),
            submit_delay: None,
            status_script: Mutex::new(VecDeque::new()),
            status_default: StatusStep::Record(None),
            push: PushBehavior::Unsupported,
            simulation: Ok(SimulationReport::default()),
            simulation_delay: None,
            blockhash: Hash::new_from_array([3u8; 32]),
            calls: Mutex::new(Vec::new()),
            unsubscribed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn default_signature() -> Signature {
        Signature::from([7u8; 64])
    }

    /// Results for successive `submit_raw` calls; afterwards the default
    pub fn with_submit_results(self, results: Vec<Result<Signature, TransportError>>) -> Self {
        *self.submit_results.lock() = results.into();
        self
    }

    pub fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = Some(delay);
        self
    }

    /// Answers for successive `get_status` calls; afterwards the default step
    pub fn with_status_script(self, steps: Vec<StatusStep>) -> Self {
        *self.status_script.lock() = steps.into();
        self
    }

    pub fn with_status_default(mut self, step: StatusStep) -> Self {
        self.status_default = step;
        self
    }

    pub fn with_push(mut self, push: PushBehavior) -> Self {
        self.push = push;
        self
    }

    pub fn with_simulation(mut self, simulation: Result<SimulationReport, TransportError>) -> Self {
        self.simulation = simulation;
        self
    }

    /// Delay before `simulate` answers
    pub fn with_simulation_delay(mut self, delay: Duration) -> Self {
        self.simulation_delay = Some(delay);
        self
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.calls.lock().iter().filter(|(k, _)| *k == kind).count()
    }

    /// Calls of any kind made strictly after `instant`
    pub fn calls_since(&self, instant: Instant) -> usize {
        self.calls.lock().iter().filter(|(_, at)| *at > instant).count()
    }

    /// Whether a subscription was cancelled cooperatively
    pub fn unsubscribed(&self) -> bool {
        self.unsubscribed.load(Ordering::SeqCst)
    }

    fn record(&self, kind: CallKind) {
        self.calls.lock().push((kind, Instant::now()));
    }
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn submit_raw(&self, _bytes: &[u8]) -> Result<Signature, TransportError> {
        self.record(CallKind::SubmitRaw);
        if let Some(delay) = self.submit_delay {
            tokio::time::sleep(delay).await;
        }
        self.submit_results
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(Self::default_signature()))
    }

    async fn get_status(
        &self,
        _signature: &Signature,
    ) -> Result<Option<StatusRecord>, TransportError> {
        self.record(CallKind::GetStatus);
        let step = self
            .status_script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.status_default.clone());
        match step {
            StatusStep::Record(record) => Ok(record),
            StatusStep::Error(e) => Err(e),
            StatusStep::Hang => std::future::pending().await,
        }
    }

    async fn subscribe_signature(
        &self,
        _signature: &Signature,
        _commitment: CommitmentConfig,
        sink: mpsc::UnboundedSender<SignatureNotification>,
    ) -> Result<Subscription, TransportError> {
        self.record(CallKind::Subscribe);
        let notify = match &self.push {
            PushBehavior::Unsupported => {
                return Err(TransportError::Unsupported("subscribe_signature"))
            }
            PushBehavior::FailSetup(e) => return Err(e.clone()),
            PushBehavior::Silent => None,
            PushBehavior::NotifyAfter(delay, err) => Some((*delay, err.clone())),
        };

        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
        let unsubscribed = Arc::clone(&self.unsubscribed);
        let handle = tokio::spawn(async move {
            if let Some((delay, err)) = notify {
                tokio::select! {
                    _ = &mut cancel_rx => {
                        unsubscribed.store(true, Ordering::SeqCst);
                        return;
                    }
                    _ = tokio::time::sleep(delay) => {
                        let _ = sink.send(SignatureNotification { slot: 1, err });
                    }
                }
            }
            if cancel_rx.await.is_ok() {
                unsubscribed.store(true, Ordering::SeqCst);
            }
        });
        Ok(Subscription::new(cancel_tx, handle))
    }

    async fn simulate(
        &self,
        _bytes: &[u8],
        _commitment: CommitmentConfig,
    ) -> Result<SimulationReport, TransportError> {
        self.record(CallKind::Simulate);
        if let Some(delay) = self.simulation_delay {
            tokio::time::sleep(delay).await;
        }
        self.simulation.clone()
    }

    async fn latest_blockhash(
        &self,
        _commitment: CommitmentConfig,
    ) -> Result<Hash, TransportError> {
        self.record(CallKind::LatestBlockhash);
        Ok(self.blockhash)
    }
}
