//! Application context built once at startup.
//!
//! Holds the settings, the repository handle and the import pipeline, and is
//! passed explicitly to the CLI commands and the HTTP router.

use crate::config::Settings;
use crate::error::{CliResult, ImportError};
use crate::import::ImportPipeline;
use crate::scanner::ScanOrchestrator;
use crate::storage::{SharedRepository, SqliteDeviceRepository};
use indicatif::ProgressBar;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppContext {
    pub settings: Arc<Settings>,
    pub repository: SharedRepository,
    pub pipeline: Arc<ImportPipeline>,
}

impl AppContext {
    /// Open the configured database and wire up the scan pipeline.
    pub async fn open(settings: Settings, progress: Option<ProgressBar>) -> CliResult<Self> {
        let database = settings.database_path()?;
        let repository: SharedRepository =
            Arc::new(SqliteDeviceRepository::open(&database).await?);

        let mut orchestrator =
            ScanOrchestrator::from_settings(&settings.scan).map_err(ImportError::from)?;
        if let Some(progress) = progress {
            orchestrator = orchestrator.with_progress(progress);
        }

        if settings.tapo.is_empty() {
            warn!("no tapo credentials configured, device info retrieval will fail");
        }
        info!(
            database = %database.display(),
            concurrency = settings.scan.concurrency,
            "application context ready"
        );

        Ok(Self::new(settings, repository, orchestrator))
    }

    /// Assemble a context from already built parts.
    pub fn new(
        settings: Settings,
        repository: SharedRepository,
        orchestrator: ScanOrchestrator,
    ) -> Self {
        let pipeline = ImportPipeline::new(
            orchestrator,
            Arc::clone(&repository),
            settings.tapo.clone(),
        );

        Self {
            settings: Arc::new(settings),
            repository,
            pipeline: Arc::new(pipeline),
        }
    }
}
