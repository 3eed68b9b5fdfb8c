//! Export subcommand implementation.
//!
//! Handles `tapo-inventory export <PATH>`: writes the configured account and
//! every active stored device to a JSON file for Tapo control scripts.

use crate::config::Settings;
use crate::error::CliResult;
use crate::output;
use crate::storage::{build_inventory, write_inventory, DeviceRepository, SqliteDeviceRepository};
use clap::Parser;
use std::path::PathBuf;

/// Export the device inventory as JSON.
#[derive(Parser, Debug)]
pub struct ExportCommand {
    /// Destination file
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Leave the account password out of the file
    #[arg(long)]
    pub redact_password: bool,
}

impl ExportCommand {
    pub async fn execute(&self, settings: Settings, quiet: bool) -> CliResult<()> {
        let repository = SqliteDeviceRepository::open(&settings.database_path()?).await?;
        let devices = repository.all().await?;

        let mut inventory = build_inventory(&settings.tapo, &devices);
        if self.redact_password {
            inventory.account.password.clear();
        }
        write_inventory(&inventory, &self.path)?;

        if !quiet {
            output::print_success(&format!(
                "Exported {} device(s) to {}",
                inventory.devices.len(),
                self.path.display()
            ));
        }
        Ok(())
    }
}
