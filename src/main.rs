//! statehold - data-driven finite state machine engine
//!
//! Command-line driver: derives ids, validates definition documents and
//! simulates users moving through a machine on an in-memory engine.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use config::Config;
use statehold_core::Address;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "statehold")]
#[command(about = "Data-driven finite state machine engine")]
#[command(version)]
struct Cli {
    /// Path to a YAML config file
    #[arg(short, long, env = "STATEHOLD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the derived id of each name and whether it is a valid name
    Id {
        /// Names to derive
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Validate a machine definition (JSON or YAML)
    Validate {
        /// Definition file, relative to the definitions directory
        file: PathBuf,
    },

    /// Install a definition on an in-memory engine and drive a user through it
    Simulate {
        /// Definition file, relative to the definitions directory
        file: PathBuf,

        /// User address
        #[arg(short, long, default_value = "0x000000000000000000000000000000000000beef")]
        user: Address,

        /// Action names to invoke, in order
        #[arg(short, long, value_delimiter = ',')]
        actions: Vec<String>,
    },

    /// List capability-group interface ids
    Interfaces,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(2);
        }
    };
    tracing::debug!("owner {} output {:?}", config.owner, config.output);

    match commands::execute(&config, cli.command) {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }
}
