//! PiHub unified CLI.
//!
//! Command server for a small single-board home-automation hub.
//!
//! # Quick Start
//!
//! ```bash
//! # Start the hub with the defaults (port 65002)
//! pihub start
//!
//! # Start with a config file and a port override
//! pihub start --config /etc/pihub.toml --port 7000
//!
//! # Inspect the merged configuration
//! pihub config show
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// PiHub - command server for a single-board home-automation hub.
#[derive(Parser)]
#[command(name = "pihub")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information.
    Version,

    /// Start the hub daemon.
    Start {
        /// Path to the configuration file (default: ./pihub.toml if present).
        #[arg(short, long)]
        config: Option<String>,

        /// Override the listening port.
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Configuration management commands.
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the merged configuration as TOML.
    Show {
        /// Path to the configuration file.
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Check the configuration for errors.
    Validate {
        /// Path to the configuration file.
        #[arg(short, long)]
        config: Option<String>,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
        Commands::Start { config, port } => commands::start::run(config.as_deref(), port),
        Commands::Config(ConfigCommands::Show { config }) => {
            commands::config::show(config.as_deref())
        }
        Commands::Config(ConfigCommands::Validate { config }) => {
            commands::config::validate(config.as_deref())
        }
    }
}
