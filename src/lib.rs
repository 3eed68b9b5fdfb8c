//! # tapo-inventory
//!
//! Discovers TP-Link Tapo smart-home devices on a local network and keeps a
//! persistent inventory of them.
//!
//! An import sweeps an IPv4 or IPv6 address range for live hosts,
//! fingerprints each host's embedded web server, reads device details over
//! the local KLAP protocol (or secure passthrough on older firmware) and
//! upserts the results into SQLite. The inventory is exposed through a small
//! HTTP API, the CLI, and a JSON export for control scripts.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use tapo_inventory::{AppContext, config::Settings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::from_yaml("tapo:\n  username: me@example.com\n  password: secret\n")?;
//!     let context = AppContext::open(settings, None).await?;
//!
//!     let summary = context.pipeline.import_range("192.168.1.0/24").await?;
//!     println!("imported {} device(s)", summary.imported);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`types`] - Address ranges, hosts and device records
//! - [`scanner`] - Host enumeration, vendor probing and the scan orchestrator
//! - [`tapo`] - KLAP and secure passthrough sessions, and the device info fetcher
//! - [`storage`] - Device repository and inventory export
//! - [`import`] - Range import pipeline
//! - [`server`] - HTTP API
//! - [`config`] - YAML settings
//! - [`error`] - Error types
//! - [`output`] - Terminal output formatting

pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod import;
pub mod output;
pub mod scanner;
pub mod server;
pub mod storage;
pub mod tapo;
pub mod types;

// Re-export commonly used types
pub use context::AppContext;
pub use error::{CliError, ImportError, ScanError, StorageError};
pub use import::{ImportPipeline, ImportSummary};
pub use scanner::ScanOrchestrator;
pub use storage::{DeviceRepository, SqliteDeviceRepository};
pub use types::{ImportId, RangeSpec};
