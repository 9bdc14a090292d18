//! Error taxonomy for one submission
//!
//! Exactly one of these is produced per failed `Submitter::submit` call.
//! Transport error types never escape: they are flattened to strings here.

use thiserror::Error;

/// Coarse failure class, stable for callers that branch on it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The first submission was rejected; nothing was rebroadcast
    InitialSubmit,
    /// No terminal status within the deadline
    Timeout,
    /// The ledger or program rejected the transaction
    Execution,
    /// The transaction failed and the simulation could not run to explain why
    DiagnosisUnavailable,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InitialSubmit => "initial_submit",
            Self::Timeout => "timeout",
            Self::Execution => "execution",
            Self::DiagnosisUnavailable => "diagnosis_unavailable",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const GENERIC_FAILURE: &str = "Transaction failed";
pub const TIMEOUT_MESSAGE: &str = "Timed out awaiting confirmation on transaction";

fn reason_suffix(reason: &Option<String>) -> String {
    match reason {
        Some(r) => format!(": {r}"),
        None => String::new(),
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// Initial `submit_raw` failed; fatal, not retried
    #[error("Initial submission failed: {0}")]
    InitialSubmit(String),

    /// Confirmation never reached a terminal state
    ///
    /// `diagnosis` carries the simulation's explanation when the timeout
    /// path ran the diagnoser and it found one.
    #[error("Timed out awaiting confirmation on transaction{}", reason_suffix(.diagnosis))]
    Timeout { diagnosis: Option<String> },

    /// Rejected by the ledger; `reason` is the extracted program log line
    /// or the serialized simulation error
    #[error("Transaction failed{}", reason_suffix(.reason))]
    Execution { reason: Option<String> },

    /// Failed, and the dry-run could not be executed
    ///
    /// `detail` is the raw error reported on the confirmation path, if any.
    #[error("Transaction failed")]
    DiagnosisUnavailable { detail: Option<String> },
}

impl SubmitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InitialSubmit(_) => ErrorKind::InitialSubmit,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Execution { .. } => ErrorKind::Execution,
            Self::DiagnosisUnavailable { .. } => ErrorKind::DiagnosisUnavailable,
        }
    }

    /// The most specific human-readable message
    ///
    /// For execution failures this is the bare diagnostic (e.g. the program
    /// log payload), without the "Transaction failed" framing.
    pub fn message(&self) -> String {
        match self {
            Self::InitialSubmit(msg) => msg.clone(),
            Self::Timeout { .. } => TIMEOUT_MESSAGE.to_string(),
            Self::Execution { reason: Some(r) } => r.clone(),
            Self::Execution { reason: None } => GENERIC_FAILURE.to_string(),
            Self::DiagnosisUnavailable { .. } => GENERIC_FAILURE.to_string(),
        }
    }

    /// Label for metrics
    pub fn category(&self) -> &'static str {
        self.kind().as_str()
    }

    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SubmitError::Execution {
            reason: Some("insufficient funds".to_string()),
        };
        assert_eq!(err.to_string(), "Transaction failed: insufficient funds");
        assert_eq!(err.message(), "insufficient funds");

        let err = SubmitError::Execution { reason: None };
        assert_eq!(err.to_string(), "Transaction failed");

        let err = SubmitError::Timeout { diagnosis: None };
        assert_eq!(
            err.to_string(),
            "Timed out awaiting confirmation on transaction"
        );

        let err = SubmitError::Timeout {
            diagnosis: Some("blockhash not found".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Timed out awaiting confirmation on transaction: blockhash not found"
        );
    }

    #[test]
    fn timeout_is_distinguishable_from_execution() {
        let timeout = SubmitError::Timeout {
            diagnosis: Some("insufficient funds".to_string()),
        };
        let exec = SubmitError::Execution {
            reason: Some("insufficient funds".to_string()),
        };
        assert_eq!(timeout.kind(), ErrorKind::Timeout);
        assert_eq!(exec.kind(), ErrorKind::Execution);
        assert!(timeout.is_timeout());
        assert!(!exec.is_timeout());
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(
            SubmitError::InitialSubmit("x".into()).category(),
            "initial_submit"
        );
        assert_eq!(
            SubmitError::DiagnosisUnavailable { detail: None }.category(),
            "diagnosis_unavailable"
        );
    }
}
