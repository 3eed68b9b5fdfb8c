//! Stored device subcommands: `list` and `remove`.

use crate::cli::OutputFormat;
use crate::config::Settings;
use crate::error::CliResult;
use crate::output;
use crate::storage::{DeviceFilter, DeviceId, DeviceRepository, SqliteDeviceRepository};
use clap::Parser;

/// List stored devices.
#[derive(Parser, Debug)]
pub struct ListCommand {
    /// Page number, starting at 1
    #[arg(long, default_value = "1")]
    pub page: i64,

    /// Devices per page
    #[arg(long, default_value = "10")]
    pub page_size: i64,

    /// Only show devices in this state (up, down, stale)
    #[arg(long)]
    pub state: Option<String>,

    /// Show every device instead of one page
    #[arg(short, long, conflicts_with_all = ["page", "page_size"])]
    pub all: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "plain")]
    pub output: OutputFormat,
}

impl ListCommand {
    pub async fn execute(&self, settings: Settings) -> CliResult<()> {
        let repository = SqliteDeviceRepository::open(&settings.database_path()?).await?;

        let devices = if self.all {
            let mut devices = repository.all().await?;
            if let Some(state) = &self.state {
                devices.retain(|device| device.state.as_deref() == Some(state.as_str()));
            }
            devices
        } else {
            let mut filter = DeviceFilter::new();
            if let Some(state) = &self.state {
                filter = filter.state(state.clone());
            }
            repository.list(self.page, self.page_size, &filter).await?
        };

        output::print_devices(&devices, self.output)?;
        Ok(())
    }
}

/// Delete a stored device.
#[derive(Parser, Debug)]
pub struct RemoveCommand {
    /// Identifier shown by `list`
    #[arg(value_name = "ID")]
    pub id: i64,
}

impl RemoveCommand {
    pub async fn execute(&self, settings: Settings, quiet: bool) -> CliResult<()> {
        let repository = SqliteDeviceRepository::open(&settings.database_path()?).await?;
        let id = DeviceId::new(self.id);

        repository.delete(id).await?;

        if !quiet {
            output::print_success(&format!("Removed device {}", id));
        }
        Ok(())
    }
}
