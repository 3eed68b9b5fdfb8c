//! Host enumeration: range expansion plus a liveness sweep.

use crate::error::ScanResult;
use crate::scanner::neighbors::NeighborSource;
use crate::scanner::traits::SharedLivenessProbe;
use crate::types::{CandidateHost, Liveness, RangeSpec};
use futures::stream::{self, StreamExt};
use std::net::IpAddr;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Expands range expressions and keeps the addresses that answer.
pub struct HostEnumerator {
    probe: SharedLivenessProbe,
    neighbors: NeighborSource,
    concurrency: usize,
}

impl HostEnumerator {
    pub fn new(probe: SharedLivenessProbe, concurrency: usize) -> Self {
        Self {
            probe,
            neighbors: NeighborSource::default(),
            concurrency: concurrency.max(1),
        }
    }

    /// Override where link addresses are resolved from.
    pub fn with_neighbor_source(mut self, neighbors: NeighborSource) -> Self {
        self.neighbors = neighbors;
        self
    }

    /// Sweep every address of `range` and return the live hosts.
    ///
    /// Hosts that do not answer are left out rather than returned as down.
    /// When `cancel` fires the sweep stops and the hosts found so far are
    /// returned.
    pub async fn enumerate(
        &self,
        range: &RangeSpec,
        cancel: &CancellationToken,
    ) -> ScanResult<Vec<CandidateHost>> {
        let addresses = range.addresses();

        if addresses.iter().any(IpAddr::is_ipv4) {
            self.probe.ensure_available(false)?;
        }
        if addresses.iter().any(IpAddr::is_ipv6) {
            self.probe.ensure_available(true)?;
        }

        info!(
            range = %range,
            candidates = addresses.len(),
            timeout_ms = self.probe.timeout().as_millis() as u64,
            "starting liveness sweep"
        );

        let probe = &self.probe;
        let mut live: Vec<IpAddr> = stream::iter(addresses)
            .map(|address| async move { (address, probe.probe(address).await) })
            .buffer_unordered(self.concurrency)
            .take_until(cancel.cancelled())
            .filter_map(|(address, liveness)| async move {
                trace!(%address, %liveness, "liveness probe finished");
                (liveness == Liveness::Up).then_some(address)
            })
            .collect()
            .await;
        live.sort();

        let neighbors = self.neighbors.snapshot().await;
        let hosts: Vec<CandidateHost> = live
            .into_iter()
            .map(|address| {
                let host = CandidateHost::up(address).with_link_address(neighbors.lookup(address));
                debug!(
                    address = %host.address,
                    liveness = %host.liveness,
                    link_address = ?host.link_address.map(|mac| mac.to_string()),
                    "host is up"
                );
                host
            })
            .collect();

        info!(range = %range, live_hosts = hosts.len(), "liveness sweep complete");
        Ok(hosts)
    }
}
