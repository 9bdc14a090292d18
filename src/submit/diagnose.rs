//! Post-failure diagnosis by dry-run
//!
//! Scans the simulation logs back to front for the last program log line,
//! which is usually the most specific message a failing program emits.

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::commitment_config::CommitmentConfig;
use tracing::{debug, warn};

use super::transaction::SignedTransaction;
use crate::metrics::{metrics, Timer};
use crate::transport::Transport;

pub const PROGRAM_LOG_PREFIX: &str = "Program log: ";

/// Upper bound on one dry-run
pub const DEFAULT_DIAGNOSIS_TIMEOUT: Duration = Duration::from_secs(2);

/// Leading markers programs conventionally put before the actual reason
const FAILURE_MARKERS: &[&str] = &["failed: ", "Error: ", "error: "];

/// What the simulation says about a failed transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnosis {
    /// Payload of the last program log line
    ProgramLog(String),
    /// Serialized simulation error, no program log available
    RawError(String),
    /// Simulation ran clean; the failure is not reproducible
    NoExecutionError,
    /// The dry-run itself could not be executed
    Unavailable(String),
}

impl Diagnosis {
    /// Human-readable reason, if the simulation produced one
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::ProgramLog(reason) | Self::RawError(reason) => Some(reason),
            Self::NoExecutionError | Self::Unavailable(_) => None,
        }
    }
}

/// Last `"Program log: "` line with the prefix and any failure marker removed
pub fn extract_program_log(logs: &[String]) -> Option<String> {
    logs.iter().rev().find_map(|line| {
        let payload = line.strip_prefix(PROGRAM_LOG_PREFIX)?;
        let payload = FAILURE_MARKERS
            .iter()
            .find_map(|marker| payload.strip_prefix(marker))
            .unwrap_or(payload);
        Some(payload.trim().to_string())
    })
}

#[derive(Debug, Clone)]
pub struct Diagnoser {
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl Diagnoser {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            timeout: DEFAULT_DIAGNOSIS_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Simulate `tx` and explain the result
    ///
    /// Never takes longer than the configured timeout; a stalled dry-run is
    /// reported as [`Diagnosis::Unavailable`].
    pub async fn diagnose(
        &self,
        tx: &SignedTransaction,
        commitment: CommitmentConfig,
    ) -> Diagnosis {
        metrics().simulations_total.inc();
        let timer = Timer::new();
        let result =
            tokio::time::timeout(self.timeout, self.transport.simulate(tx.bytes(), commitment))
                .await;
        timer.observe_duration(&metrics().simulation_latency);

        let report = match result {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                metrics().simulation_failures.inc();
                warn!(error = %e, "Simulation failed, cannot diagnose");
                return Diagnosis::Unavailable(e.to_string());
            }
            Err(_) => {
                metrics().simulation_failures.inc();
                let timeout_ms = self.timeout.as_millis() as u64;
                warn!(timeout_ms, "Simulation timed out, cannot diagnose");
                return Diagnosis::Unavailable(format!("simulation timed out after {timeout_ms}ms"));
            }
        };

        if let Some(reason) = report.logs.as_deref().and_then(extract_program_log) {
            debug!(reason = %reason, "Diagnosed from program log");
            return Diagnosis::ProgramLog(reason);
        }

        match report.err {
            Some(err) => {
                let raw = serde_json::to_string(&err).unwrap_or_else(|_| err.to_string());
                debug!(error = %raw, "Diagnosed from simulation error");
                Diagnosis::RawError(raw)
            }
            None => Diagnosis::NoExecutionError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeTransport;
    use crate::transport::{SimulationReport, TransportError};
    use serde_json::json;

    fn logs(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|l| l.to_string()).collect()
    }

    fn tx() -> SignedTransaction {
        SignedTransaction::from_raw(vec![9u8; 16], vec![])
    }

    #[test]
    fn extracts_last_program_log_and_strips_marker() {
        let lines = logs(&[
            "Program log: step1",
            "Program log: failed: insufficient funds",
            "Program consumed 1234 of 200000 compute units",
        ]);
        assert_eq!(
            extract_program_log(&lines).as_deref(),
            Some("insufficient funds")
        );
    }

    #[test]
    fn no_program_log_lines() {
        let lines = logs(&[
            "Program 11111111111111111111111111111111 invoke [1]",
            "Program 11111111111111111111111111111111 failed: custom program error: 0x1",
        ]);
        assert_eq!(extract_program_log(&lines), None);
        assert_eq!(extract_program_log(&[]), None);
    }

    #[test]
    fn unmarked_payload_is_kept_verbatim() {
        let lines = logs(&["Program log: Instruction: Deposit", "Program log: slippage exceeded"]);
        assert_eq!(
            extract_program_log(&lines).as_deref(),
            Some("slippage exceeded")
        );
    }

    #[tokio::test]
    async fn diagnose_prefers_program_log() {
        let transport = Arc::new(FakeTransport::new().with_simulation(Ok(SimulationReport {
            err: Some(json!({"InstructionError": [0, {"Custom": 1}]})),
            logs: Some(logs(&["Program log: Error: account frozen"])),
        })));
        let diagnosis = Diagnoser::new(transport)
            .diagnose(&tx(), CommitmentConfig::processed())
            .await;
        assert_eq!(diagnosis, Diagnosis::ProgramLog("account frozen".into()));
    }

    #[tokio::test]
    async fn diagnose_falls_back_to_raw_error() {
        let transport = Arc::new(FakeTransport::new().with_simulation(Ok(SimulationReport {
            err: Some(json!("BlockhashNotFound")),
            logs: Some(vec![]),
        })));
        let diagnosis = Diagnoser::new(transport)
            .diagnose(&tx(), CommitmentConfig::processed())
            .await;
        assert_eq!(diagnosis, Diagnosis::RawError("\"BlockhashNotFound\"".into()));
        assert_eq!(diagnosis.reason(), Some("\"BlockhashNotFound\""));
    }

    #[tokio::test]
    async fn clean_simulation_and_unavailable() {
        let transport = Arc::new(FakeTransport::new());
        let diagnosis = Diagnoser::new(transport)
            .diagnose(&tx(), CommitmentConfig::processed())
            .await;
        assert_eq!(diagnosis, Diagnosis::NoExecutionError);
        assert_eq!(diagnosis.reason(), None);

        let transport = Arc::new(
            FakeTransport::new().with_simulation(Err(TransportError::transport("node unhealthy"))),
        );
        let diagnosis = Diagnoser::new(transport)
            .diagnose(&tx(), CommitmentConfig::processed())
            .await;
        assert!(matches!(diagnosis, Diagnosis::Unavailable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_simulation_is_cut_off() {
        let transport = Arc::new(
            FakeTransport::new()
                .with_simulation(Ok(SimulationReport {
                    err: Some(json!("AccountInUse")),
                    logs: Some(logs(&["Program log: too late"])),
                }))
                .with_simulation_delay(Duration::from_secs(3600)),
        );
        let started = tokio::time::Instant::now();
        let diagnosis = Diagnoser::new(transport)
            .with_timeout(Duration::from_millis(500))
            .diagnose(&tx(), CommitmentConfig::processed())
            .await;

        assert_eq!(
            diagnosis,
            Diagnosis::Unavailable("simulation timed out after 500ms".to_string())
        );
        assert_eq!(diagnosis.reason(), None);
        assert_eq!(started.elapsed(), Duration::from_millis(500));
    }
}
