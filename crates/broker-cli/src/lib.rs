//! # Broker CLI
//!
//! Command-line interface for inspecting and maintaining broker queues.
//!
//! This module provides CLI commands for:
//! - Backend and queue status (`info`, `ping`)
//! - Cluster statistics (`stats`, `stat`)
//! - Queue maintenance (`purge`, `delete-queue`)
//!
//! Settings are read the same way services read them: an optional file given
//! with `--config` (or `BROKER_CONFIG`) overlaid with `BROKER__*` environment
//! variables.

use broker_runtime::{Broker, BrokerError, BrokerFactory, ErrorKind};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

// ============================================================================
// CLI Structure
// ============================================================================

/// Broker CLI - inspect and maintain task queues
#[derive(Debug, Parser)]
#[command(name = "broker")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect and maintain broker queues")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "BROKER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Queue to operate on; defaults to the cluster name
    #[arg(short, long, global = true)]
    pub queue: Option<String>,

    /// Logging level or filter directive
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Show backend, queue, sizes and connectivity
    Info,

    /// Check the backend connection; exits non-zero when unreachable
    Ping,

    /// Print all cluster stats as JSON lines
    Stats {
        /// Key pattern, passed through to the stats lookup
        #[arg(short, long, default_value = "*")]
        pattern: String,
    },

    /// Print a single stat
    Stat {
        /// Stat key
        key: String,
    },

    /// Remove all pending tasks from the queue
    Purge,

    /// Destroy the queue and its backlog
    DeleteQueue {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

// ============================================================================
// CLI Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Backend {backend} did not respond to ping")]
    PingFailed { backend: String },

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("Output failed: {0}")]
    Output(#[from] std::io::Error),

    #[error("Output encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl CliError {
    /// Process exit code for this error
    ///
    /// 1 configuration, 2 broker failure, 3 ping failed, 4 invalid argument.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Broker(e) => match e.kind() {
                ErrorKind::Configuration => 1,
                ErrorKind::Validation => 4,
                _ => 2,
            },
            Self::PingFailed { .. } => 3,
            Self::InvalidArgument { .. } => 4,
            Self::Output(_) | Self::Encoding(_) => 2,
        }
    }
}

// ============================================================================
// Output Types
// ============================================================================

/// Result of the `info` command
#[derive(Debug, Serialize)]
pub struct BrokerInfo {
    pub backend: String,
    pub queue: String,
    pub info: Option<String>,
    pub ping: bool,
    /// `None` when the backend cannot report it
    pub queue_size: Option<u64>,
    pub lock_size: Option<u64>,
    pub stats_enabled: bool,
}

// ============================================================================
// Entry Points
// ============================================================================

/// Main CLI entry point
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();
    initialize_logging(&cli)?;

    let factory = BrokerFactory::load(cli.config.as_deref())?;
    info!(backend = %factory.backend_kind(), "Loaded broker settings");

    let mut stdout = std::io::stdout().lock();
    execute(&cli, &factory, &mut stdout).await
}

/// Run the parsed command against brokers from `factory`, writing to `out`
pub async fn execute(
    cli: &Cli,
    factory: &BrokerFactory,
    out: &mut impl Write,
) -> Result<(), CliError> {
    // Reject before any connection is made
    if let Commands::DeleteQueue { yes: false } = cli.command {
        return Err(CliError::InvalidArgument {
            arg: "--yes".to_string(),
            message: "delete-queue destroys the queue and its backlog; pass --yes to confirm"
                .to_string(),
        });
    }

    let broker = factory.get_broker(cli.queue.as_deref())?;

    match &cli.command {
        Commands::Info => execute_info_command(&broker, out).await,
        Commands::Ping => execute_ping_command(&broker, out).await,
        Commands::Stats { pattern } => execute_stats_command(&broker, pattern, out).await,
        Commands::Stat { key } => execute_stat_command(&broker, key, out).await,
        Commands::Purge => {
            broker.purge_queue().await?;
            info!(queue = %broker.list_key(), "Queue purged");
            writeln!(out, "purged {}", broker.list_key())?;
            Ok(())
        }
        Commands::DeleteQueue { .. } => {
            broker.delete_queue().await?;
            warn!(queue = %broker.list_key(), "Queue deleted");
            writeln!(out, "deleted {}", broker.list_key())?;
            Ok(())
        }
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// Initialize logging based on CLI arguments
///
/// Logs go to stderr so command output on stdout stays machine readable.
fn initialize_logging(cli: &Cli) -> Result<(), CliError> {
    let filter = EnvFilter::try_new(&cli.log_level).map_err(|e| CliError::InvalidArgument {
        arg: "--log-level".to_string(),
        message: e.to_string(),
    })?;

    let json_layer = cli.json_logs.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    let text_layer = (!cli.json_logs)
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    // A subscriber may already be installed (tests); keep it
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init();
    Ok(())
}

async fn execute_info_command(broker: &Broker, out: &mut impl Write) -> Result<(), CliError> {
    let report = BrokerInfo {
        backend: broker.backend_name().to_string(),
        queue: broker.list_key().to_string(),
        info: broker.info().map(str::to_string),
        ping: broker.ping().await,
        queue_size: optional_count(broker.queue_size().await)?,
        lock_size: optional_count(broker.lock_size().await)?,
        stats_enabled: broker.stats().is_enabled(),
    };

    serde_json::to_writer_pretty(&mut *out, &report)?;
    writeln!(out)?;
    Ok(())
}

/// Unsupported counts are reported as missing rather than failing the command
fn optional_count(result: Result<u64, BrokerError>) -> Result<Option<u64>, CliError> {
    match result {
        Ok(count) => Ok(Some(count)),
        Err(e) if e.kind() == ErrorKind::NotImplemented => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn execute_ping_command(broker: &Broker, out: &mut impl Write) -> Result<(), CliError> {
    if broker.ping().await {
        writeln!(out, "{} is reachable", broker.backend_name())?;
        Ok(())
    } else {
        Err(CliError::PingFailed {
            backend: broker.backend_name().to_string(),
        })
    }
}

async fn execute_stats_command(
    broker: &Broker,
    pattern: &str,
    out: &mut impl Write,
) -> Result<(), CliError> {
    match broker.get_stats(pattern).await? {
        Some(stats) => {
            for stat in stats {
                serde_json::to_writer(&mut *out, &stat)?;
                writeln!(out)?;
            }
        }
        None => warn!("No cache configured; cluster statistics are unavailable"),
    }
    Ok(())
}

async fn execute_stat_command(
    broker: &Broker,
    key: &str,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let value = broker.get_stat(key).await?;
    serde_json::to_writer(&mut *out, &value)?;
    writeln!(out)?;
    Ok(())
}
