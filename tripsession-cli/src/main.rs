//! TripSession CLI - Command-line interface
//!
//! Drives the trip session engine against a simulated drive and manages
//! its configuration file.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::config::ConfigAction;
use commands::simulate::SimulateArgs;

#[derive(Debug, Parser)]
#[command(name = "tripsession", version, about = "Trip session engine driver")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Replay a simulated drive along a route and report what the session saw
    Simulate(SimulateArgs),
    /// Inspect or create a configuration file
    Config {
        /// Configuration file to read (defaults are used when omitted)
        #[arg(long, global = true)]
        config: Option<PathBuf>,

        #[command(subcommand)]
        action: ConfigAction,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Simulate(args) => commands::simulate::run(args),
        Commands::Config { config, action } => commands::config::run(config.as_deref(), action),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}
