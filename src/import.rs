//! Import pipeline: scan a range and persist what was found.

use crate::error::ImportResult;
use crate::scanner::ScanOrchestrator;
use crate::storage::{DeviceUpsert, SharedRepository};
use crate::types::{Credentials, ImportId, RangeSpec};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};

/// Counts reported after an import.
#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub import_id: ImportId,
    pub range: String,
    pub live_hosts: usize,
    pub vendor_devices: usize,
    /// Devices written to the repository.
    pub imported: usize,
    /// Scanned hosts that produced no device record.
    pub skipped: usize,
    pub interrupted: bool,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Scans ranges and upserts every retrieved device.
pub struct ImportPipeline {
    orchestrator: ScanOrchestrator,
    repository: SharedRepository,
    credentials: Credentials,
}

impl ImportPipeline {
    pub fn new(
        orchestrator: ScanOrchestrator,
        repository: SharedRepository,
        credentials: Credentials,
    ) -> Self {
        Self {
            orchestrator,
            repository,
            credentials,
        }
    }

    pub fn repository(&self) -> &SharedRepository {
        &self.repository
    }

    /// Parse `range` and import it to completion.
    pub async fn import_range(&self, range: &str) -> ImportResult<ImportSummary> {
        let range = RangeSpec::parse(range)?;
        self.import(&range, ImportId::new(), &CancellationToken::new())
            .await
    }

    /// Import an already validated range under `import_id`.
    ///
    /// Per-host failures only reduce the number of imported devices. The
    /// import fails when the probing subsystem is unavailable or a write to
    /// the repository fails.
    pub async fn import(
        &self,
        range: &RangeSpec,
        import_id: ImportId,
        cancel: &CancellationToken,
    ) -> ImportResult<ImportSummary> {
        let span = info_span!("import", id = %import_id.short(), range = %range);
        self.run_import(range, import_id, cancel).instrument(span).await
    }

    async fn run_import(
        &self,
        range: &RangeSpec,
        import_id: ImportId,
        cancel: &CancellationToken,
    ) -> ImportResult<ImportSummary> {
        let started_at = Utc::now();
        let start_time = Instant::now();
        info!("starting import");

        let report = self.orchestrator.run(range, &self.credentials, cancel).await?;

        let mut imported = 0;
        for outcome in &report.hosts {
            match &outcome.record {
                Some(record) => {
                    let id = self.repository.upsert(DeviceUpsert::from(record)).await?;
                    imported += 1;
                    info!(
                        address = %record.address,
                        device = %id,
                        nickname = record.info.nickname.as_deref().unwrap_or("-"),
                        "device imported"
                    );
                }
                None => info!(
                    address = %outcome.host.address,
                    vendor = outcome.is_vendor_device(),
                    reason = outcome.failure.as_deref().unwrap_or("no device details"),
                    "host skipped"
                ),
            }
        }

        let summary = ImportSummary {
            import_id,
            range: report.range.clone(),
            live_hosts: report.live_hosts,
            vendor_devices: report.vendor_devices(),
            imported,
            skipped: report.hosts.len() - imported,
            interrupted: report.interrupted,
            started_at,
            duration_ms: start_time.elapsed().as_millis() as u64,
        };

        info!(
            live_hosts = summary.live_hosts,
            vendor_devices = summary.vendor_devices,
            imported = summary.imported,
            skipped = summary.skipped,
            interrupted = summary.interrupted,
            duration_ms = summary.duration_ms,
            "import finished"
        );

        Ok(summary)
    }
}
