//! Submission state machine
//!
//! One call to [`Submitter::submit`] drives a transaction through:
//!
//! ```text
//! Built -> Submitted -> Racing -> Confirmed
//!                          |  \-> Diagnosing -> Failed
//!                          \-> TimedOut -> Diagnosing -> Failed
//! ```
//!
//! While `Racing`, a [`Rebroadcaster`] resends the identical bytes and a
//! [`ConfirmationRace`] watches push and poll observers. Both share one
//! [`CancelToken`], so the race resolving stops every background activity.

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::{commitment_config::CommitmentConfig, signature::Signature};
use tokio::time::Instant;
use tracing::{debug, info, warn, Instrument};

pub mod confirm;
pub mod decision;
pub mod diagnose;
pub mod errors;
pub mod rebroadcast;
pub mod transaction;

pub use confirm::{
    classify, ConfirmationRace, ConfirmationStatus, ObservationSource, RaceOutcome,
    DEFAULT_POLL_INTERVAL,
};
pub use decision::{CancelToken, Decision};
pub use diagnose::{extract_program_log, Diagnoser, Diagnosis, DEFAULT_DIAGNOSIS_TIMEOUT};
pub use errors::{ErrorKind, SubmitError};
pub use rebroadcast::{Rebroadcaster, DEFAULT_REBROADCAST_INTERVAL};
pub use transaction::SignedTransaction;

use crate::metrics::metrics;
use crate::observability::CorrelationId;
use crate::transport::Transport;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(15_000);

/// Tunables for the submission pipeline
#[derive(Debug, Clone)]
pub struct SubmitterConfig {
    pub rebroadcast_interval: Duration,
    pub poll_interval: Duration,
    /// Run a simulation after a timeout and attach its explanation
    pub diagnose_on_timeout: bool,
    /// Upper bound on the post-failure simulation
    pub diagnosis_timeout: Duration,
    pub default_commitment: CommitmentConfig,
    pub default_timeout: Duration,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            rebroadcast_interval: DEFAULT_REBROADCAST_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            diagnose_on_timeout: true,
            diagnosis_timeout: DEFAULT_DIAGNOSIS_TIMEOUT,
            default_commitment: CommitmentConfig::confirmed(),
            default_timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Terminal result of one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Success(Signature),
    Failure(SubmitError),
}

impl SubmissionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

#[derive(Debug, Clone)]
pub struct SubmitReport {
    pub outcome: SubmissionOutcome,
    /// Time from the initial submission to the outcome
    pub elapsed: Duration,
    pub correlation_id: CorrelationId,
}

impl SubmitReport {
    pub fn into_result(self) -> Result<Signature, SubmitError> {
        match self.outcome {
            SubmissionOutcome::Success(signature) => Ok(signature),
            SubmissionOutcome::Failure(err) => Err(err),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum SubmitState {
    Built,
    Submitted,
    Racing,
    TimedOut,
    Diagnosing,
    Confirmed,
    Failed,
}

/// Forward-only state tracker; every transition is logged
struct StateTracker<'a> {
    state: SubmitState,
    correlation_id: &'a CorrelationId,
}

impl<'a> StateTracker<'a> {
    fn new(correlation_id: &'a CorrelationId) -> Self {
        Self {
            state: SubmitState::Built,
            correlation_id,
        }
    }

    fn advance(&mut self, next: SubmitState) {
        debug_assert!(next > self.state, "{:?} -> {:?}", self.state, next);
        debug!(
            correlation_id = %self.correlation_id,
            from = ?self.state,
            to = ?next,
            "Submission state transition"
        );
        self.state = next;
    }
}

/// Drives signed transactions to a terminal outcome
#[derive(Debug, Clone)]
pub struct Submitter {
    transport: Arc<dyn Transport>,
    config: SubmitterConfig,
}

impl Submitter {
    pub fn new(transport: Arc<dyn Transport>, config: SubmitterConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &SubmitterConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Submit with the configured commitment and timeout
    pub async fn submit_default(&self, tx: &SignedTransaction) -> SubmitReport {
        self.submit(tx, self.config.default_commitment, self.config.default_timeout)
            .await
    }

    /// Submit `tx` and wait for a terminal outcome
    ///
    /// The deadline is measured from the initial submission. The call returns
    /// no later than the deadline plus one poll interval plus the diagnosis
    /// timeout. An initial submission still pending at the deadline is
    /// abandoned and reported as an initial submit failure.
    pub async fn submit(
        &self,
        tx: &SignedTransaction,
        commitment: CommitmentConfig,
        timeout: Duration,
    ) -> SubmitReport {
        let correlation_id = CorrelationId::new();
        let span = tracing::info_span!(
            "submit",
            correlation_id = %correlation_id,
            commitment = ?commitment.commitment,
            timeout_ms = timeout.as_millis() as u64,
        );
        let started = Instant::now();
        let outcome = self
            .run(tx, commitment, started + timeout, &correlation_id)
            .instrument(span)
            .await;

        match &outcome {
            SubmissionOutcome::Success(_) => metrics().submissions_confirmed.inc(),
            SubmissionOutcome::Failure(err) => metrics()
                .submissions_failed
                .with_label_values(&[err.category()])
                .inc(),
        }

        SubmitReport {
            outcome,
            elapsed: started.elapsed(),
            correlation_id,
        }
    }

    fn diagnoser(&self) -> Diagnoser {
        Diagnoser::new(Arc::clone(&self.transport)).with_timeout(self.config.diagnosis_timeout)
    }

    async fn run(
        &self,
        tx: &SignedTransaction,
        commitment: CommitmentConfig,
        deadline: Instant,
        correlation_id: &CorrelationId,
    ) -> SubmissionOutcome {
        let started = Instant::now();
        let mut state = StateTracker::new(correlation_id);
        metrics().submissions_total.inc();

        let submitted =
            tokio::time::timeout_at(deadline, self.transport.submit_raw(tx.bytes())).await;
        let signature = match submitted {
            Ok(Ok(signature)) => signature,
            Ok(Err(e)) => {
                warn!(error = %e, "Initial submission rejected");
                state.advance(SubmitState::Failed);
                return SubmissionOutcome::Failure(SubmitError::InitialSubmit(e.to_string()));
            }
            Err(_) => {
                warn!("Initial submission still pending at deadline, abandoning");
                state.advance(SubmitState::Failed);
                return SubmissionOutcome::Failure(SubmitError::InitialSubmit(
                    "Timed out submitting transaction".to_string(),
                ));
            }
        };
        state.advance(SubmitState::Submitted);
        if let Some(expected) = tx.expected_signature() {
            if *expected != signature {
                warn!(
                    expected = %expected,
                    returned = %signature,
                    "Transport returned a different signature, correlating on returned one"
                );
            }
        }
        info!(signature = %signature, "Started awaiting confirmation");

        let cancel = CancelToken::new();
        let mut rebroadcaster = Rebroadcaster::spawn(
            Arc::clone(&self.transport),
            tx.clone(),
            self.config.rebroadcast_interval,
            deadline,
            cancel.clone(),
        );
        state.advance(SubmitState::Racing);

        let race = ConfirmationRace::new(Arc::clone(&self.transport), commitment)
            .with_poll_interval(self.config.poll_interval);
        let outcome = race.run(signature, deadline, cancel).await;
        rebroadcaster.stop().await;

        match outcome {
            RaceOutcome::Confirmed { status, source } => {
                state.advance(SubmitState::Confirmed);
                let latency = started.elapsed();
                metrics()
                    .confirmation_latency
                    .observe(latency.as_secs_f64());
                info!(
                    signature = %signature,
                    status = ?status,
                    source = source.as_str(),
                    latency_ms = latency.as_millis() as u64,
                    "Transaction confirmed"
                );
                SubmissionOutcome::Success(signature)
            }
            RaceOutcome::Failed { detail, source } => {
                warn!(
                    signature = %signature,
                    source = source.as_str(),
                    detail = %detail,
                    "Transaction rejected, diagnosing"
                );
                state.advance(SubmitState::Diagnosing);
                let diagnosis = self.diagnoser().diagnose(tx, commitment).await;
                state.advance(SubmitState::Failed);
                let err = match diagnosis {
                    Diagnosis::ProgramLog(reason) | Diagnosis::RawError(reason) => {
                        SubmitError::Execution {
                            reason: Some(reason),
                        }
                    }
                    Diagnosis::NoExecutionError => SubmitError::Execution { reason: None },
                    Diagnosis::Unavailable(_) => SubmitError::DiagnosisUnavailable {
                        detail: Some(detail),
                    },
                };
                SubmissionOutcome::Failure(err)
            }
            RaceOutcome::TimedOut | RaceOutcome::Cancelled => {
                state.advance(SubmitState::TimedOut);
                warn!(signature = %signature, "Timed out awaiting confirmation on transaction");
                let diagnosis = if self.config.diagnose_on_timeout {
                    state.advance(SubmitState::Diagnosing);
                    self.diagnoser()
                        .diagnose(tx, commitment)
                        .await
                        .reason()
                        .map(str::to_string)
                } else {
                    None
                };
                state.advance(SubmitState::Failed);
                SubmissionOutcome::Failure(SubmitError::Timeout { diagnosis })
            }
        }
    }
}
