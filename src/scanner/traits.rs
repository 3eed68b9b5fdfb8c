//! Probe trait abstractions.
//!
//! Each pipeline stage sits behind a trait so the orchestrator can be driven
//! by real network probes in production and by scripted fakes in tests.

use crate::error::{FetchResult, ScanResult};
use crate::types::{ClassificationResult, Credentials, DeviceInfoRecord, Liveness};
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// Reachability check used by the liveness sweep.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// Fail if the probing capability itself is unusable for this address
    /// family (missing privileges, no network stack).
    fn ensure_available(&self, ipv6: bool) -> ScanResult<()>;

    /// Probe one address. Any failure is reported as [`Liveness::Down`].
    async fn probe(&self, address: IpAddr) -> Liveness;

    /// Get the configured timeout per attempt.
    fn timeout(&self) -> Duration;
}

/// Unauthenticated vendor fingerprint check.
///
/// Implementations never return an error for a single host: transport
/// failures, timeouts and mismatches all classify as "not a vendor device".
#[async_trait]
pub trait VendorProbe: Send + Sync {
    async fn classify(&self, address: IpAddr) -> ClassificationResult;
}

/// Authenticated device-info retrieval.
///
/// Implementations keep no mutable state shared between calls, so fetches
/// for different hosts may run concurrently.
#[async_trait]
pub trait DeviceInfoFetcher: Send + Sync {
    async fn fetch(&self, address: IpAddr, credentials: &Credentials)
        -> FetchResult<DeviceInfoRecord>;
}

/// Shared handles for dynamic dispatch.
pub type SharedLivenessProbe = Arc<dyn LivenessProbe>;
pub type SharedVendorProbe = Arc<dyn VendorProbe>;
pub type SharedFetcher = Arc<dyn DeviceInfoFetcher>;
