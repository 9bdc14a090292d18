//! solray - transaction submission and confirmation engine
//!
//! Submits a signed transaction, rebroadcasts it while racing a push
//! subscription against status polling, and explains failures by
//! simulating the transaction.
//!
//! ```no_run
//! # async fn run(tx: solray::SignedTransaction) -> Result<(), solray::SubmitError> {
//! use std::sync::Arc;
//! use std::time::Duration;
//! use solana_sdk::commitment_config::CommitmentConfig;
//! use solray::{SolanaTransport, Submitter, SubmitterConfig};
//!
//! let transport = SolanaTransport::new(
//!     "http://127.0.0.1:8899",
//!     Some("ws://127.0.0.1:8900".to_string()),
//!     Duration::from_secs(30),
//!     CommitmentConfig::confirmed(),
//! );
//! let submitter = Submitter::new(Arc::new(transport), SubmitterConfig::default());
//! let _signature = submitter
//!     .submit(&tx, CommitmentConfig::confirmed(), Duration::from_secs(15))
//!     .await
//!     .into_result()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod metrics;
pub mod observability;
pub mod program;
pub mod submit;
pub mod test_utils;
pub mod transport;

pub use config::{Config, ConfigError};
pub use program::{authority_metas, AuthorityMeta, InstructionAuthority, ProgramClient};
pub use submit::{
    ConfirmationStatus, Diagnoser, Diagnosis, ErrorKind, SignedTransaction, SubmissionOutcome,
    SubmitError, SubmitReport, Submitter, SubmitterConfig,
};
pub use transport::{SolanaTransport, StatusRecord, Transport, TransportError};

// Re-export commonly used types
pub use solana_sdk::{commitment_config::CommitmentConfig, pubkey::Pubkey, signature::Signature};
