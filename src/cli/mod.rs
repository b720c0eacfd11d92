//! CLI interface for digit-trader
//!
//! Provides subcommands for:
//! - `run`: Start trading (paper or live)
//! - `config`: Validate and show configuration

mod run;

pub use run::RunArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "digit-trader")]
#[command(about = "Tick-driven digit contract trading bot")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start trading
    Run(RunArgs),
    /// Validate and show configuration
    Config,
}
