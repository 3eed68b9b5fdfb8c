//! CLI subcommand definitions and handlers.
//!
//! - `tapo-inventory serve` - Run the HTTP API
//! - `tapo-inventory import <RANGE>` - Scan a range and store found devices
//! - `tapo-inventory list` - Show stored devices
//! - `tapo-inventory remove <ID>` - Delete a stored device
//! - `tapo-inventory export <PATH>` - Write the device inventory JSON

mod devices;
mod export;
mod import;
mod serve;

pub use devices::{ListCommand, RemoveCommand};
pub use export::ExportCommand;
pub use import::ImportCommand;
pub use serve::ServeCommand;

use crate::config::{Settings, DEFAULT_CONFIG_FILE};
use crate::error::CliResult;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Discover TP-Link Tapo devices and keep an inventory of them.
///
/// Devices are found by sweeping an address range, fingerprinting the
/// embedded HTTP server and reading device details over the local KLAP
/// protocol with the configured account credentials.
#[derive(Parser, Debug)]
#[command(name = "tapo-inventory")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Tapo device discovery and inventory", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the YAML configuration file
    #[arg(long, global = true, value_name = "PATH", env = "CONFIG_PATH")]
    pub config: Option<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API
    Serve(ServeCommand),

    /// Scan an address range and store the Tapo devices found
    #[command(alias = "i")]
    Import(ImportCommand),

    /// List stored devices
    #[command(alias = "ls")]
    List(ListCommand),

    /// Delete a stored device
    #[command(alias = "rm")]
    Remove(RemoveCommand),

    /// Export the device inventory as JSON
    #[command(alias = "e")]
    Export(ExportCommand),
}

impl Cli {
    /// Configuration path and whether it was given explicitly.
    pub fn config_path(&self) -> (PathBuf, bool) {
        match &self.config {
            Some(path) => (path.clone(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        }
    }

    /// Load the settings this invocation should use.
    pub fn load_settings(&self) -> CliResult<Settings> {
        let (path, explicit) = self.config_path();
        Ok(Settings::load(&path, explicit)?)
    }

    /// Run the selected subcommand.
    pub async fn execute(&self, settings: Settings) -> CliResult<()> {
        match &self.command {
            Commands::Serve(cmd) => cmd.execute(settings, self.quiet).await,
            Commands::Import(cmd) => cmd.execute(settings, self.quiet).await,
            Commands::List(cmd) => cmd.execute(settings).await,
            Commands::Remove(cmd) => cmd.execute(settings, self.quiet).await,
            Commands::Export(cmd) => cmd.execute(settings, self.quiet).await,
        }
    }
}

/// Output format for results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable plain text
    #[default]
    Plain,
    /// JSON structured output
    Json,
    /// CSV format for data analysis
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::Json => write!(f, "json"),
            Self::Csv => write!(f, "csv"),
        }
    }
}
