//! Import subcommand implementation.
//!
//! Handles `tapo-inventory import <RANGE>`: scans the range in the
//! foreground and stores every device whose details could be read.

use crate::cli::OutputFormat;
use crate::config::Settings;
use crate::context::AppContext;
use crate::error::CliResult;
use crate::output;
use crate::types::{ImportId, RangeSpec};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

/// Scan an address range and store the Tapo devices found.
#[derive(Parser, Debug)]
pub struct ImportCommand {
    /// Address range to scan
    ///
    /// Examples:
    ///   192.168.1.7                    Single address
    ///   192.168.1.0/24                 CIDR block
    ///   192.168.1.10-192.168.1.20      Explicit range
    ///   192.168.1.10-20                Last-octet shorthand
    #[arg(value_name = "RANGE")]
    pub range: String,

    /// Output format for the summary
    #[arg(short, long, value_enum, default_value = "plain")]
    pub output: OutputFormat,

    /// Maximum number of hosts processed at once (overrides scan.concurrency)
    #[arg(short = 'c', long)]
    pub concurrency: Option<usize>,

    /// Stop starting new hosts after this many seconds
    #[arg(long, value_name = "SECS")]
    pub deadline: Option<u64>,
}

impl ImportCommand {
    pub async fn execute(&self, mut settings: Settings, quiet: bool) -> CliResult<()> {
        // Reject bad input before touching the network or the database.
        let range = RangeSpec::parse(&self.range)?;

        if let Some(concurrency) = self.concurrency {
            settings.scan.concurrency = concurrency.max(1);
        }
        if self.deadline.is_some() {
            settings.scan.deadline_secs = self.deadline;
        }

        let interactive = !quiet && self.output == OutputFormat::Plain;
        let progress = interactive.then(progress_bar);

        if interactive {
            output::print_info(&format!(
                "Scanning {} ({} addresses)",
                range,
                range.size()
            ));
        }

        let context = AppContext::open(settings, progress.clone()).await?;

        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_signal.cancel();
            }
        });

        let result = context
            .pipeline
            .import(&range, ImportId::new(), &cancel)
            .await;

        if let Some(pb) = &progress {
            pb.finish_and_clear();
        }
        let summary = result?;

        if summary.interrupted && !quiet {
            output::print_warning("import interrupted, results are partial");
        }
        output::print_summary(&summary, self.output)?;
        Ok(())
    }
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} hosts ({percent}%) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
    pb.set_style(style);
    pb
}
