//! Scanner module - coordinates the discovery pipeline.
//!
//! Enumeration, vendor classification and device-info retrieval are driven
//! here across the whole candidate set with bounded concurrency. A failure at
//! any stage for one host degrades to "no details for this host" and never
//! touches the others.

pub mod enumerator;
pub mod neighbors;
pub mod rate_limiter;
pub mod signature;
pub mod tcp;
pub mod traits;

use crate::config::ScanSettings;
use crate::error::ScanResult;
use crate::tapo::TapoClient;
use crate::types::{
    CandidateHost, ClassificationResult, Credentials, DeviceInfoRecord, RangeSpec,
};
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use enumerator::HostEnumerator;
pub use neighbors::{NeighborSource, NeighborTable};
pub use rate_limiter::RateLimiter;
pub use signature::{HttpSignatureProbe, TAPO_SIGNATURE};
pub use tcp::TcpLivenessProbe;
pub use traits::{
    DeviceInfoFetcher, LivenessProbe, SharedFetcher, SharedLivenessProbe, SharedVendorProbe,
    VendorProbe,
};

/// Everything the pipeline learned about one live host.
#[derive(Debug, Clone, Serialize)]
pub struct HostOutcome {
    pub host: CandidateHost,
    pub classification: ClassificationResult,
    /// Device details; `None` for non-vendor hosts and failed fetches.
    pub record: Option<DeviceInfoRecord>,
    /// Why the fetch failed, for vendor hosts without a record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl HostOutcome {
    pub fn is_vendor_device(&self) -> bool {
        self.classification.is_vendor_device
    }
}

/// Result of one orchestrated scan. Host order is not significant.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub range: String,
    pub hosts: Vec<HostOutcome>,
    /// Live hosts found by the sweep, including any abandoned by cancellation.
    pub live_hosts: usize,
    /// True when cancellation or the deadline cut the scan short.
    pub interrupted: bool,
    pub duration_ms: u64,
}

impl ScanReport {
    pub fn vendor_devices(&self) -> usize {
        self.hosts.iter().filter(|h| h.is_vendor_device()).count()
    }

    pub fn records(&self) -> impl Iterator<Item = &DeviceInfoRecord> {
        self.hosts.iter().filter_map(|h| h.record.as_ref())
    }
}

/// Drives enumerate → classify → fetch over a range.
pub struct ScanOrchestrator {
    enumerator: HostEnumerator,
    classifier: SharedVendorProbe,
    fetcher: SharedFetcher,
    concurrency: usize,
    rate_limiter: Option<RateLimiter>,
    deadline: Option<Duration>,
    progress: Option<ProgressBar>,
}

impl ScanOrchestrator {
    pub fn new(
        enumerator: HostEnumerator,
        classifier: SharedVendorProbe,
        fetcher: SharedFetcher,
        concurrency: usize,
    ) -> Self {
        Self {
            enumerator,
            classifier,
            fetcher,
            concurrency: concurrency.max(1),
            rate_limiter: None,
            deadline: None,
            progress: None,
        }
    }

    /// Build the production pipeline: TCP liveness sweep, HTTP banner
    /// fingerprint and Tapo device-info client.
    pub fn from_settings(settings: &ScanSettings) -> ScanResult<Self> {
        let liveness = TcpLivenessProbe::new(
            settings.liveness_ports.clone(),
            settings.liveness_timeout(),
        );
        let enumerator = HostEnumerator::new(Arc::new(liveness), settings.concurrency);
        let classifier = HttpSignatureProbe::new(
            settings.probe_port,
            settings.probe_timeout(),
            settings.signature.clone(),
        )?;
        let fetcher = TapoClient::new(settings.fetch_port, settings.fetch_timeout())?;

        Ok(Self::new(
            enumerator,
            Arc::new(classifier),
            Arc::new(fetcher),
            settings.concurrency,
        )
        .with_rate_limit(settings.rate_limit)
        .with_deadline(settings.deadline()))
    }

    /// Pace new host operations; 0 disables pacing.
    pub fn with_rate_limit(mut self, rate: u32) -> Self {
        self.rate_limiter = RateLimiter::per_second(rate);
        self
    }

    /// Stop starting new work after `deadline` and return what finished.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Report per-host progress on an interactive progress bar.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run the full pipeline over `range`.
    ///
    /// Only subsystem failures of the enumerator are errors. When `cancel`
    /// fires (or the deadline passes) no new hosts are started, in-flight
    /// work is abandoned and the outcomes completed so far are returned.
    pub async fn run(
        &self,
        range: &RangeSpec,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> ScanResult<ScanReport> {
        let start_time = Instant::now();
        let token = cancel.child_token();
        let timer = self.deadline.map(|deadline| {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                warn!(deadline_ms = deadline.as_millis() as u64, "scan deadline reached");
                token.cancel();
            })
        });

        let hosts = match self.enumerator.enumerate(range, &token).await {
            Ok(hosts) => hosts,
            Err(e) => {
                if let Some(timer) = timer {
                    timer.abort();
                }
                return Err(e);
            }
        };
        let live_hosts = hosts.len();

        if let Some(pb) = &self.progress {
            pb.set_length(live_hosts as u64);
        }

        let results = Mutex::new(Vec::with_capacity(live_hosts));
        let interrupted = if token.is_cancelled() {
            true
        } else {
            let work = stream::iter(hosts).for_each_concurrent(self.concurrency, |host| {
                let results = &results;
                async move {
                    if let Some(limiter) = &self.rate_limiter {
                        limiter.wait().await;
                    }
                    let outcome = self.process_host(host, credentials).await;
                    if let Some(pb) = &self.progress {
                        pb.inc(1);
                    }
                    results.lock().await.push(outcome);
                }
            });

            tokio::select! {
                _ = work => false,
                _ = token.cancelled() => true,
            }
        };

        if let Some(timer) = timer {
            timer.abort();
        }

        let hosts = results.into_inner();
        if interrupted {
            warn!(
                range = %range,
                completed = hosts.len(),
                abandoned = live_hosts - hosts.len(),
                "scan interrupted, returning completed hosts"
            );
        }

        let report = ScanReport {
            range: range.to_string(),
            hosts,
            live_hosts,
            interrupted,
            duration_ms: start_time.elapsed().as_millis() as u64,
        };

        info!(
            range = %report.range,
            live_hosts = report.live_hosts,
            vendor_devices = report.vendor_devices(),
            records = report.records().count(),
            duration_ms = report.duration_ms,
            "scan complete"
        );

        Ok(report)
    }

    /// Classify one host and, only if it is a vendor device, fetch its info.
    async fn process_host(&self, host: CandidateHost, credentials: &Credentials) -> HostOutcome {
        let classification = self.classifier.classify(host.address).await;

        if !classification.is_vendor_device {
            debug!(address = %host.address, "not a vendor device");
            return HostOutcome {
                host,
                classification,
                record: None,
                failure: None,
            };
        }

        info!(address = %host.address, "vendor device detected");

        match self.fetcher.fetch(host.address, credentials).await {
            Ok(record) => {
                let record = record.with_host(&host);
                info!(
                    address = %host.address,
                    nickname = record.info.nickname.as_deref().unwrap_or("-"),
                    model = record.info.model.as_deref().unwrap_or("-"),
                    "device info retrieved"
                );
                HostOutcome {
                    host,
                    classification,
                    record: Some(record),
                    failure: None,
                }
            }
            Err(e) => {
                warn!(
                    address = %host.address,
                    kind = e.kind(),
                    error = %e,
                    "device info fetch failed"
                );
                HostOutcome {
                    host,
                    classification,
                    record: None,
                    failure: Some(e.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted pipeline stages shared by the orchestrator and import tests.

    use super::*;
    use crate::error::{FetchError, FetchResult, ScanError};
    use crate::types::{DeviceInfo, Liveness};
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::net::IpAddr;
    use std::sync::Mutex as StdMutex;

    pub struct ScriptedLiveness {
        pub up: HashSet<IpAddr>,
        pub available: bool,
    }

    #[async_trait]
    impl LivenessProbe for ScriptedLiveness {
        fn ensure_available(&self, _ipv6: bool) -> ScanResult<()> {
            if self.available {
                Ok(())
            } else {
                Err(ScanError::ProbeUnavailable("raw sockets not permitted".into()))
            }
        }

        async fn probe(&self, address: IpAddr) -> Liveness {
            if self.up.contains(&address) {
                Liveness::Up
            } else {
                Liveness::Down
            }
        }

        fn timeout(&self) -> Duration {
            Duration::from_millis(5)
        }
    }

    pub struct ScriptedClassifier {
        pub vendor: HashSet<IpAddr>,
    }

    #[async_trait]
    impl VendorProbe for ScriptedClassifier {
        async fn classify(&self, address: IpAddr) -> ClassificationResult {
            if self.vendor.contains(&address) {
                ClassificationResult::vendor(address)
            } else {
                ClassificationResult::not_vendor(address)
            }
        }
    }

    /// Answers from a table; records every address it was asked about.
    pub struct ScriptedFetcher {
        pub devices: HashMap<IpAddr, DeviceInfo>,
        pub password: String,
        pub delay: HashMap<IpAddr, Duration>,
        pub calls: StdMutex<Vec<IpAddr>>,
    }

    impl ScriptedFetcher {
        pub fn new(password: &str) -> Self {
            Self {
                devices: HashMap::new(),
                password: password.to_string(),
                delay: HashMap::new(),
                calls: StdMutex::new(Vec::new()),
            }
        }

        pub fn with_device(mut self, address: &str, info: DeviceInfo) -> Self {
            self.devices.insert(address.parse().unwrap(), info);
            self
        }

        pub fn with_delay(mut self, address: &str, delay: Duration) -> Self {
            self.delay.insert(address.parse().unwrap(), delay);
            self
        }

        pub fn calls(&self) -> Vec<IpAddr> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DeviceInfoFetcher for ScriptedFetcher {
        async fn fetch(
            &self,
            address: IpAddr,
            credentials: &Credentials,
        ) -> FetchResult<DeviceInfoRecord> {
            self.calls.lock().unwrap().push(address);
            if let Some(delay) = self.delay.get(&address) {
                tokio::time::sleep(*delay).await;
            }
            if credentials.password != self.password {
                return Err(FetchError::Authentication {
                    address: address.to_string(),
                    reason: "handshake hash mismatch".into(),
                });
            }
            match self.devices.get(&address) {
                Some(info) => Ok(DeviceInfoRecord::new(address, info.clone())),
                None => Err(FetchError::Transport {
                    address: address.to_string(),
                    reason: "connection reset".into(),
                }),
            }
        }
    }

    pub fn plug(device_id: &str, nickname: &str) -> DeviceInfo {
        DeviceInfo {
            device_id: Some(device_id.to_string()),
            nickname: Some(nickname.to_string()),
            model: Some("P110".to_string()),
            device_type: Some("SMART.TAPOPLUG".to_string()),
            device_on: Some(true),
            rssi: Some(-51),
            ..Default::default()
        }
    }

    pub fn addrs(list: &[&str]) -> HashSet<IpAddr> {
        list.iter().map(|s| s.parse().unwrap()).collect()
    }

    pub fn orchestrator(
        up: &[&str],
        vendor: &[&str],
        fetcher: Arc<ScriptedFetcher>,
    ) -> ScanOrchestrator {
        let liveness = ScriptedLiveness {
            up: addrs(up),
            available: true,
        };
        let enumerator = HostEnumerator::new(Arc::new(liveness), 8)
            .with_neighbor_source(NeighborSource::Disabled);
        let classifier = ScriptedClassifier {
            vendor: addrs(vendor),
        };
        ScanOrchestrator::new(enumerator, Arc::new(classifier), fetcher, 8)
    }
}
