//! Confirmation race: push subscription vs. periodic status polling
//!
//! Both observers start together and write into one [`Decision`]. The first
//! terminal observation wins; the deadline timer competes for the same cell,
//! so a late push or poll result after a timeout is discarded, and vice versa.
//!
//! ## Poll classification
//!
//! In priority order:
//! 1. no record yet -> `Unknown`
//! 2. record with an error -> `Failed`
//! 3. record without confirmations and without a "confirmed"/"finalized"
//!    status -> `Pending` (a record existing does not mean it landed)
//! 4. otherwise -> `Confirmed` / `Finalized`

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::{commitment_config::CommitmentConfig, signature::Signature};
use tokio::sync::mpsc;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::decision::{CancelToken, Decision};
use crate::metrics::metrics;
use crate::transport::{SignatureNotification, StatusRecord, Transport, TransportError};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(300);

/// Observed state of a signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationStatus {
    Unknown,
    Pending,
    Confirmed,
    Finalized,
    Failed(String),
}

impl ConfirmationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Finalized | Self::Failed(_))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Finalized)
    }
}

/// Map one status lookup onto a [`ConfirmationStatus`]
pub fn classify(record: Option<&StatusRecord>) -> ConfirmationStatus {
    let Some(record) = record else {
        return ConfirmationStatus::Unknown;
    };
    if let Some(err) = &record.err {
        return ConfirmationStatus::Failed(err.clone());
    }
    match record.confirmation_status.as_deref() {
        Some("finalized") => ConfirmationStatus::Finalized,
        Some("confirmed") => ConfirmationStatus::Confirmed,
        _ if record.confirmations.is_some_and(|c| c > 0) => ConfirmationStatus::Confirmed,
        _ => ConfirmationStatus::Pending,
    }
}

/// Which observer produced a terminal status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationSource {
    Push,
    Poll,
}

impl ObservationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Poll => "poll",
        }
    }
}

/// Result of one confirmation race
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RaceOutcome {
    Confirmed {
        status: ConfirmationStatus,
        source: ObservationSource,
    },
    Failed {
        detail: String,
        source: ObservationSource,
    },
    TimedOut,
    /// The caller cancelled the race before any observer decided
    Cancelled,
}

impl RaceOutcome {
    fn from_status(status: ConfirmationStatus, source: ObservationSource) -> Option<Self> {
        match status {
            ConfirmationStatus::Failed(detail) => Some(Self::Failed { detail, source }),
            s if s.is_success() => Some(Self::Confirmed { status: s, source }),
            _ => None,
        }
    }

    fn source(&self) -> Option<ObservationSource> {
        match self {
            Self::Confirmed { source, .. } | Self::Failed { source, .. } => Some(*source),
            Self::TimedOut | Self::Cancelled => None,
        }
    }
}

type SharedDecision = Arc<Decision<RaceOutcome>>;

/// Races a push subscription against status polling for one signature
#[derive(Debug, Clone)]
pub struct ConfirmationRace {
    transport: Arc<dyn Transport>,
    commitment: CommitmentConfig,
    poll_interval: Duration,
}

impl ConfirmationRace {
    pub fn new(transport: Arc<dyn Transport>, commitment: CommitmentConfig) -> Self {
        Self {
            transport,
            commitment,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run until a terminal status, the deadline, or `cancel`
    ///
    /// When this returns, `cancel` has fired and both observers have exited;
    /// no further transport calls are made on behalf of this race.
    pub async fn run(
        &self,
        signature: Signature,
        deadline: Instant,
        cancel: CancelToken,
    ) -> RaceOutcome {
        let (decision, mut rx) = Decision::new(cancel.clone());

        let push = tokio::spawn(push_path(
            Arc::clone(&self.transport),
            signature,
            self.commitment,
            Arc::clone(&decision),
        ));
        let poll = tokio::spawn(poll_path(
            Arc::clone(&self.transport),
            signature,
            self.poll_interval,
            Arc::clone(&decision),
        ));

        // The deadline and external cancellation compete for the same cell;
        // if they lose, the winner's value is already in `rx`
        let outcome = tokio::select! {
            biased;
            res = &mut rx => res.unwrap_or(RaceOutcome::Cancelled),
            _ = sleep_until(deadline) => {
                if decision.resolve(RaceOutcome::TimedOut) {
                    info!(signature = %signature, "Timed out awaiting confirmation");
                }
                (&mut rx).await.unwrap_or(RaceOutcome::TimedOut)
            }
            _ = cancel.cancelled() => {
                decision.resolve(RaceOutcome::Cancelled);
                (&mut rx).await.unwrap_or(RaceOutcome::Cancelled)
            }
        };

        // Idempotent: the winning resolve already fired it
        cancel.cancel();
        if let Err(e) = push.await {
            warn!(error = %e, "Push listener ended abnormally");
        }
        if let Err(e) = poll.await {
            warn!(error = %e, "Poll loop ended abnormally");
        }

        if let Some(source) = outcome.source() {
            metrics().race_wins.with_label_values(&[source.as_str()]).inc();
        }
        outcome
    }
}

/// Push observer: one notification is authoritative
async fn push_path(
    transport: Arc<dyn Transport>,
    signature: Signature,
    commitment: CommitmentConfig,
    decision: SharedDecision,
) {
    let cancel = decision.token().clone();
    let (sink, mut notifications) = mpsc::unbounded_channel::<SignatureNotification>();

    let setup = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        setup = transport.subscribe_signature(&signature, commitment, sink) => setup,
    };
    let mut subscription = match setup {
        Ok(subscription) => subscription,
        Err(TransportError::Unsupported(_)) => {
            debug!(signature = %signature, "Push not supported, poll-only");
            return;
        }
        Err(e) => {
            metrics().subscription_failures.inc();
            warn!(signature = %signature, error = %e, "WS error in setup, continuing poll-only");
            return;
        }
    };
    debug!(signature = %signature, "Set up signature subscription");

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {}
        notification = notifications.recv() => match notification {
            Some(notification) => {
                let outcome = match notification.err {
                    Some(detail) => RaceOutcome::Failed {
                        detail,
                        source: ObservationSource::Push,
                    },
                    None => RaceOutcome::Confirmed {
                        status: ConfirmationStatus::Confirmed,
                        source: ObservationSource::Push,
                    },
                };
                if decision.resolve(outcome) {
                    info!(signature = %signature, slot = notification.slot, "WS confirmed");
                } else {
                    debug!(signature = %signature, "WS result discarded, already decided");
                }
            }
            None => debug!(signature = %signature, "Subscription closed without notification"),
        }
    }

    subscription.cancel().await;
}

/// Poll observer: query immediately, then every `poll_interval`
async fn poll_path(
    transport: Arc<dyn Transport>,
    signature: Signature,
    poll_interval: Duration,
    decision: SharedDecision,
) {
    let cancel = decision.token().clone();
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        metrics().poll_requests.inc();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            result = transport.get_status(&signature) => result,
        };

        let record = match result {
            Ok(record) => record,
            Err(e) => {
                metrics().poll_errors.inc();
                if e.is_transient() {
                    debug!(signature = %signature, error = %e, "REST connection error");
                } else {
                    warn!(
                        signature = %signature,
                        category = e.category(),
                        error = %e,
                        "Status lookup rejected, still polling"
                    );
                }
                continue;
            }
        };

        let status = classify(record.as_ref());
        match RaceOutcome::from_status(status.clone(), ObservationSource::Poll) {
            Some(outcome) => {
                if decision.resolve(outcome) {
                    info!(signature = %signature, status = ?status, "REST terminal status");
                } else {
                    debug!(signature = %signature, "REST result discarded, already decided");
                }
                return;
            }
            None if status == ConfirmationStatus::Pending => {
                debug!(signature = %signature, record = ?record, "REST not confirmed");
            }
            None => trace!(signature = %signature, "REST null result"),
        }
    }
}
