//! SynchroConnectr CLI
//!
//! Command-line contact sync between a device address book file and the
//! CRM.
//!
//! # Commands
//!
//! - `sync` - Reconcile the device file with the CRM
//! - `inspect` - Show how each CRM contact relates to the device file
//! - `normalize` - Print the matching key for a phone, email or name

mod client;
mod commands;
mod device_file;

use clap::{Args, Parser, Subcommand};
use commands::normalize::KeyKind;
use std::path::PathBuf;
use std::time::Duration;
use synchro_engine::{RetryConfig, SyncConfig, SyncMode};
use synchro_model::PipelineStage;
use tracing_subscriber::EnvFilter;

/// SynchroConnectr contact sync tools.
#[derive(Parser)]
#[command(name = "synchro")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// CRM connection settings.
#[derive(Args)]
struct RemoteArgs {
    /// Base URL of the CRM API
    #[arg(long, env = "SYNCHRO_SERVER_URL")]
    server: String,

    /// Bearer token for the CRM API
    #[arg(long, env = "SYNCHRO_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

impl RemoteArgs {
    fn config(self) -> SyncConfig {
        let config = SyncConfig::new(self.server).with_timeout(Duration::from_secs(self.timeout));
        match self.token {
            Some(token) => config.with_auth_token(token),
            None => config,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the device contact file with the CRM
    Sync {
        /// Device contacts JSON file
        #[arg(short, long)]
        device: Option<PathBuf>,

        #[command(flatten)]
        remote: RemoteArgs,

        /// Sync mode (full, import, push, repair)
        #[arg(short, long, default_value = "full")]
        mode: SyncMode,

        /// Pipeline stage for imported contacts
        #[arg(long, default_value = "New")]
        stage: PipelineStage,

        /// Attempts per contact write on transient failures
        #[arg(long, default_value_t = 1)]
        attempts: u32,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show how each CRM contact relates to the device file
    Inspect {
        /// Device contacts JSON file
        #[arg(short, long)]
        device: PathBuf,

        #[command(flatten)]
        remote: RemoteArgs,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the matching key for an identifier
    Normalize {
        /// Kind of identifier
        #[arg(value_enum)]
        kind: KeyKind,

        /// Raw value
        value: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Sync {
            device,
            remote,
            mode,
            stage,
            attempts,
            format,
        } => {
            let retry = if attempts > 1 {
                RetryConfig::new(attempts)
            } else {
                RetryConfig::no_retry()
            };
            let config = remote.config().with_import_stage(stage).with_retry(retry);
            commands::sync::run(device.as_deref(), config, mode, &format)?;
        }
        Commands::Inspect {
            device,
            remote,
            format,
        } => {
            commands::inspect::run(&device, remote.config(), &format)?;
        }
        Commands::Normalize { kind, value } => {
            commands::normalize::run(kind, &value)?;
        }
        Commands::Version => {
            println!("SynchroConnectr CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
