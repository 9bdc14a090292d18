//! Configuration for the submission engine
//!
//! Loaded from a TOML file, then overridden from the environment (a `.env`
//! file is honored). Every field has a default, so an empty file is valid.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use solana_sdk::commitment_config::{CommitmentConfig, CommitmentLevel};
use thiserror::Error;

use crate::submit::SubmitterConfig;

pub const ENV_RPC_URL: &str = "SOLRAY_RPC_URL";
pub const ENV_WS_URL: &str = "SOLRAY_WS_URL";
pub const ENV_COMMITMENT: &str = "SOLRAY_COMMITMENT";
pub const ENV_TIMEOUT_MS: &str = "SOLRAY_TIMEOUT_MS";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// RPC endpoint configuration
    #[serde(default)]
    pub rpc: RpcConfig,

    /// Submission and confirmation tunables
    #[serde(default)]
    pub submit: SubmitConfig,

    /// Monitoring and metrics
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// JSON-RPC HTTP endpoint
    #[serde(default = "default_rpc_url")]
    pub url: String,

    /// Pubsub endpoint; without it confirmation is poll-only
    #[serde(default)]
    pub ws_url: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitConfig {
    /// "processed", "confirmed" or "finalized"
    #[serde(default = "default_commitment")]
    pub commitment: String,

    /// Confirmation deadline, measured from the initial submission
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_interval_ms")]
    pub rebroadcast_interval_ms: u64,

    #[serde(default = "default_interval_ms")]
    pub poll_interval_ms: u64,

    /// Simulate after a timeout to explain it
    #[serde(default = "default_true")]
    pub diagnose_on_timeout: bool,

    /// Upper bound on the post-failure simulation
    #[serde(default = "default_diagnosis_timeout_ms")]
    pub diagnosis_timeout_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Print Prometheus metrics on exit
    #[serde(default)]
    pub enable_metrics: bool,
}

// Default value functions
fn default_rpc_url() -> String { "http://127.0.0.1:8899".to_string() }
fn default_request_timeout() -> u64 { 30 }
fn default_commitment() -> String { "confirmed".to_string() }
fn default_timeout_ms() -> u64 { 15_000 }
fn default_interval_ms() -> u64 { 300 }
fn default_true() -> bool { true }
fn default_diagnosis_timeout_ms() -> u64 { 2_000 }

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: default_rpc_url(),
            ws_url: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            commitment: default_commitment(),
            timeout_ms: default_timeout_ms(),
            rebroadcast_interval_ms: default_interval_ms(),
            poll_interval_ms: default_interval_ms(),
            diagnose_on_timeout: default_true(),
            diagnosis_timeout_ms: default_diagnosis_timeout_ms(),
        }
    }
}

/// Parse a commitment name as accepted in config files and on the CLI
pub fn parse_commitment(value: &str) -> Result<CommitmentConfig, ConfigError> {
    let commitment = match value.trim().to_ascii_lowercase().as_str() {
        "processed" => CommitmentLevel::Processed,
        "confirmed" => CommitmentLevel::Confirmed,
        "finalized" => CommitmentLevel::Finalized,
        other => {
            return Err(ConfigError::invalid(
                "submit.commitment",
                format!("unknown commitment '{other}'"),
            ))
        }
    };
    Ok(CommitmentConfig { commitment })
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with `.env` and environment variable overrides
    ///
    /// Without a path the defaults are used as the base.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_RPC_URL) {
            self.rpc.url = url;
        }
        if let Some(ws_url) = lookup(ENV_WS_URL) {
            self.rpc.ws_url = Some(ws_url).filter(|s| !s.is_empty());
        }
        if let Some(commitment) = lookup(ENV_COMMITMENT) {
            self.submit.commitment = commitment;
        }
        if let Some(timeout) = lookup(ENV_TIMEOUT_MS) {
            self.submit.timeout_ms = timeout.trim().parse().map_err(|e| {
                ConfigError::invalid("submit.timeout_ms", format!("{ENV_TIMEOUT_MS}: {e}"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc.url.trim().is_empty() {
            return Err(ConfigError::invalid("rpc.url", "must not be empty"));
        }
        if self.rpc.request_timeout_secs == 0 {
            return Err(ConfigError::invalid("rpc.request_timeout_secs", "must be > 0"));
        }
        if self.submit.timeout_ms == 0 {
            return Err(ConfigError::invalid("submit.timeout_ms", "must be > 0"));
        }
        if self.submit.rebroadcast_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "submit.rebroadcast_interval_ms",
                "must be > 0",
            ));
        }
        if self.submit.poll_interval_ms == 0 {
            return Err(ConfigError::invalid("submit.poll_interval_ms", "must be > 0"));
        }
        if self.submit.diagnosis_timeout_ms == 0 {
            return Err(ConfigError::invalid("submit.diagnosis_timeout_ms", "must be > 0"));
        }
        parse_commitment(&self.submit.commitment)?;
        Ok(())
    }
}

impl RpcConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl SubmitConfig {
    pub fn commitment(&self) -> Result<CommitmentConfig, ConfigError> {
        parse_commitment(&self.commitment)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn to_submitter_config(&self) -> Result<SubmitterConfig, ConfigError> {
        Ok(SubmitterConfig {
            rebroadcast_interval: Duration::from_millis(self.rebroadcast_interval_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            diagnose_on_timeout: self.diagnose_on_timeout,
            diagnosis_timeout: Duration::from_millis(self.diagnosis_timeout_ms),
            default_commitment: self.commitment()?,
            default_timeout: self.timeout(),
        })
    }
}
