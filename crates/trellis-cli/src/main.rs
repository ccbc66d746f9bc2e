// crates/trellis-cli/src/main.rs
//
// CLI entrypoint for Trellis.
//
// Runs trust scenarios against a fresh in-memory trust domain and prints
// the effective configuration.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use commands::run::RunCmd;
use config::CliConfig;

/// Trellis: trust propagation, inheritance and boundary verification.
#[derive(Parser, Debug)]
#[command(
    name = "trellis",
    version = "0.1.0",
    about = "Trellis: propagate, inherit and verify trust between entities"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "trellis.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply a scenario file and enforce every registered boundary.
    Run(RunCmd),

    /// Print the effective configuration as TOML.
    Config,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // The subscriber needs the configured level, so the load result is
    // only logged once it is installed.
    let loaded = CliConfig::load(&cli.config);
    let log_level = match &loaded {
        Ok(cfg) => cfg.log_level.clone(),
        Err(_) => CliConfig::default().log_level,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .init();

    let config = match loaded {
        Ok(cfg) => {
            tracing::info!("Loaded configuration from {}", cli.config);
            cfg
        }
        Err(e) => {
            tracing::warn!(
                "Could not load config from {}: {}. Using defaults.",
                cli.config,
                e
            );
            CliConfig::default()
        }
    };

    match &cli.command {
        Commands::Run(cmd) => commands::run::run(cmd, &config.engine)?,
        Commands::Config => commands::config::run(&config)?,
    }

    Ok(())
}
