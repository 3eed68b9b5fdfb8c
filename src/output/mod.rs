//! Output formatting module.
//!
//! Renders stored devices and import summaries as plain text, JSON, or CSV.

mod csv_format;
mod json_format;
mod plain;

pub use json_format::write_json;
pub use plain::{print_error, print_info, print_success, print_warning};

use crate::cli::OutputFormat;
use crate::import::ImportSummary;
use crate::storage::PersistedDevice;
use std::io;

/// Print stored devices to stdout in `format`.
pub fn print_devices(devices: &[PersistedDevice], format: OutputFormat) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match format {
        OutputFormat::Plain => plain::write_devices(&mut out, devices),
        OutputFormat::Json => write_json(&mut out, devices),
        OutputFormat::Csv => csv_format::write_devices(out, devices),
    }
}

/// Print an import summary to stdout in `format`.
pub fn print_summary(summary: &ImportSummary, format: OutputFormat) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match format {
        OutputFormat::Plain => plain::write_summary(&mut out, summary),
        OutputFormat::Json => write_json(&mut out, summary),
        OutputFormat::Csv => csv_format::write_summary(out, summary),
    }
}
