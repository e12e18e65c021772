// crates/centinel-cli/src/main.rs
//
// CLI entrypoint for the Centinel collector's integrity tooling.
//
// Provides the offline hash-chain auditor, a one-shot recovery decision,
// checkpoint history inspection and base-key generation.

mod commands;
mod config;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use config::CentinelConfig;

/// Centinel: tamper-evident electoral results collection.
#[derive(Parser, Debug)]
#[command(
    name = "centinel",
    version = "0.1.0",
    about = "Centinel integrity tooling: chain verification, checkpoint recovery, key generation"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Debug, Subcommand)]
enum Commands {
    /// Verify the snapshot hash chain under a storage root.
    Verify {
        /// Storage root holding `snapshots/`.
        #[arg(long)]
        dir: PathBuf,
        /// Chain from recomputed hashes instead of stored ones.
        #[arg(long)]
        rechain: bool,
    },

    /// Decide how the pipeline should resume and print the decision.
    Recover,

    /// List historical checkpoints for the configured run.
    Checkpoints {
        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Generate a new checkpoint base key.
    Keygen,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let (config, defaulted) = CentinelConfig::load_or_default(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if defaulted {
        tracing::warn!(path = %config_path.display(), "Config file not found, using defaults");
    }

    match &cli.command {
        Commands::Verify { dir, rechain } => {
            if !commands::verify::run(dir, *rechain).await? {
                std::process::exit(1);
            }
        }
        Commands::Recover => commands::recover::run(&config).await?,
        Commands::Checkpoints { json } => commands::checkpoints::run(&config, *json).await?,
        Commands::Keygen => commands::keygen::run().await?,
    }

    Ok(())
}
