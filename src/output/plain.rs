//! Plain text output formatting.
//!
//! Produces human-readable output with colors and formatting.

use crate::import::ImportSummary;
use crate::storage::PersistedDevice;
use console::{style, Style};
use std::io::{self, Write};

const RULE: &str = "═══════════════════════════════════════════════════════════════════════";
const THIN_RULE: &str = "───────────────────────────────────────────────────────────────────────";

/// Print a table of stored devices.
pub fn write_devices<W: Write>(out: &mut W, devices: &[PersistedDevice]) -> io::Result<()> {
    writeln!(out)?;
    if devices.is_empty() {
        writeln!(out, "  {}", style("No devices stored.").dim())?;
        writeln!(out)?;
        return Ok(());
    }

    writeln!(out, "  {}", style(THIN_RULE).dim())?;
    writeln!(
        out,
        "  {:>4}  {:<15}  {:<17}  {:<6}  {:<8}  {}",
        style("ID").bold(),
        style("ADDRESS").bold(),
        style("MAC").bold(),
        style("STATE").bold(),
        style("MODEL").bold(),
        style("NAME").bold()
    )?;
    writeln!(out, "  {}", style(THIN_RULE).dim())?;

    for device in devices {
        let state = device.state.as_deref().unwrap_or("-");
        let state_style = match state {
            "up" => Style::new().green().bold(),
            "down" => Style::new().red(),
            _ => Style::new().yellow(),
        };

        writeln!(
            out,
            "  {:>4}  {:<15}  {:<17}  {:<6}  {:<8}  {}",
            device.id,
            device.ip,
            device.mac.as_deref().unwrap_or("-"),
            state_style.apply_to(state),
            device.model.as_deref().unwrap_or("-"),
            truncate_string(device.nickname.as_deref().unwrap_or(""), 30)
        )?;
    }

    writeln!(out, "  {}", style(THIN_RULE).dim())?;
    writeln!(out, "  {} device(s)", devices.len())?;
    writeln!(out)?;
    Ok(())
}

/// Print the result of an import run.
pub fn write_summary<W: Write>(out: &mut W, summary: &ImportSummary) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", style(RULE).cyan())?;
    writeln!(out, "                    {} Import Summary", style("Tapo").cyan().bold())?;
    writeln!(out, "{}", style(RULE).cyan())?;
    writeln!(out)?;

    writeln!(out, "  {} {}", style("Range:").bold(), summary.range)?;
    writeln!(
        out,
        "  {} {}",
        style("Import ID:").bold(),
        style(summary.import_id.short()).dim()
    )?;
    writeln!(
        out,
        "  {} {} live hosts, {} Tapo devices in {:.2}s",
        style("Scanned:").bold(),
        summary.live_hosts,
        summary.vendor_devices,
        summary.duration_ms as f64 / 1000.0
    )?;
    writeln!(
        out,
        "  {} {} imported, {} skipped",
        style("Result:").bold(),
        style(summary.imported).green().bold(),
        style(summary.skipped).yellow()
    )?;
    if summary.interrupted {
        writeln!(
            out,
            "  {}",
            style("Scan was interrupted; results are partial.").yellow()
        )?;
    }

    writeln!(out)?;
    writeln!(out, "{}", style(RULE).cyan())?;
    writeln!(out)?;
    Ok(())
}

/// Print an error message.
pub fn print_error(msg: &str) {
    eprintln!("{} {}", style("Error:").red().bold(), msg);
}

/// Print a warning message.
pub fn print_warning(msg: &str) {
    eprintln!("{} {}", style("Warning:").yellow().bold(), msg);
}

/// Print a success message.
pub fn print_success(msg: &str) {
    println!("{} {}", style("✓").green().bold(), msg);
}

/// Print an info message.
pub fn print_info(msg: &str) {
    println!("{} {}", style("ℹ").blue().bold(), msg);
}

/// Truncate to at most `max_chars` characters, adding an ellipsis if cut.
fn truncate_string(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
