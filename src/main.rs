//! solray command line
//!
//! - `solray send <FILE>`: submit a signed transaction and wait for confirmation
//! - `solray simulate <FILE>`: dry-run a signed transaction and print the diagnosis
//!
//! `FILE` holds a bincode-serialized `VersionedTransaction`, either raw or
//! base64 encoded.

#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(unused_must_use)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use solray::config::{self, Config};
use solray::metrics::metrics;
use solray::{Diagnoser, Diagnosis, SignedTransaction, SolanaTransport, Submitter};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// JSON-RPC endpoint, overrides the config file
    #[arg(long, global = true)]
    rpc_url: Option<String>,

    /// Pubsub endpoint, overrides the config file
    #[arg(long, global = true)]
    ws_url: Option<String>,

    /// processed, confirmed or finalized
    #[arg(long, global = true)]
    commitment: Option<String>,

    /// Confirmation timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a signed transaction and wait for confirmation
    Send { file: PathBuf },
    /// Simulate a signed transaction and print what went wrong
    Simulate { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.log_json)?;

    let config = load_config(&args)?;
    let commitment = config.submit.commitment()?;
    let transport = Arc::new(SolanaTransport::new(
        config.rpc.url.clone(),
        config.rpc.ws_url.clone(),
        config.rpc.request_timeout(),
        commitment,
    ));
    info!(
        rpc_url = %config.rpc.url,
        push = config.rpc.ws_url.is_some(),
        "Using endpoint"
    );

    let result = match &args.command {
        Command::Send { file } => {
            let tx = read_transaction(file)?;
            let submitter = Submitter::new(transport, config.submit.to_submitter_config()?);
            let report = submitter.submit_default(&tx).await;
            info!(
                correlation_id = %report.correlation_id,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Submission finished"
            );
            report
                .into_result()
                .map(|signature| println!("{signature}"))
                .map_err(|e| {
                    error!(kind = %e.kind(), error = %e, "Submission failed");
                    anyhow::Error::new(e)
                })
        }
        Command::Simulate { file } => {
            let tx = read_transaction(file)?;
            let diagnosis = Diagnoser::new(transport)
                .with_timeout(config.rpc.request_timeout())
                .diagnose(&tx, commitment)
                .await;
            describe_diagnosis(diagnosis)
                .map(|line| println!("{line}"))
                .inspect_err(|e| error!(error = %e, "Simulation failed"))
        }
    };

    if config.monitoring.enable_metrics {
        eprintln!("{}", metrics().gather_text()?);
    }

    result
}

/// Line printed by `simulate`; an unavailable dry-run is an error
fn describe_diagnosis(diagnosis: Diagnosis) -> Result<String> {
    match diagnosis {
        Diagnosis::ProgramLog(reason) | Diagnosis::RawError(reason) => Ok(reason),
        Diagnosis::NoExecutionError => Ok("Simulation succeeded".to_string()),
        Diagnosis::Unavailable(reason) => anyhow::bail!("Simulation unavailable: {reason}"),
    }
}

/// Initialize logging with tracing
fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let env_filter = if verbose {
        "solray=debug,info"
    } else {
        "solray=info,warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| {
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
        }))
        .init();

    Ok(())
}

/// Config file and environment first, then command line flags
fn load_config(args: &Args) -> Result<Config> {
    let mut config = Config::load(args.config.as_deref()).with_context(|| match &args.config {
        Some(path) => format!("Failed to load config from {}", path.display()),
        None => "Failed to load config".to_string(),
    })?;

    if let Some(url) = &args.rpc_url {
        config.rpc.url = url.clone();
    }
    if let Some(ws_url) = &args.ws_url {
        config.rpc.ws_url = Some(ws_url.clone());
    }
    if let Some(commitment) = &args.commitment {
        config::parse_commitment(commitment)?;
        config.submit.commitment = commitment.clone();
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.submit.timeout_ms = timeout_ms;
    }
    config.validate()?;
    Ok(config)
}

fn read_transaction(path: &Path) -> Result<SignedTransaction> {
    let content =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let decoded = std::str::from_utf8(&content)
        .ok()
        .and_then(|text| BASE64_STANDARD.decode(text.trim()).ok());
    let wire = decoded.as_deref().unwrap_or(&content[..]);
    SignedTransaction::from_wire(wire)
        .with_context(|| format!("{} is not a serialized transaction", path.display()))
}
