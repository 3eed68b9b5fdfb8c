//! Core type definitions shared by the scan pipeline and storage.
//!
//! Newtypes keep addresses, identifiers and vendor payloads from being mixed
//! up as raw strings.

mod device;
mod host;
mod import_id;
mod range;

pub use device::{ClassificationResult, Credentials, DeviceInfo, DeviceInfoRecord};
pub use host::{CandidateHost, LinkAddress, LinkAddressError, Liveness};
pub use import_id::ImportId;
pub use range::{RangeError, RangeSpec};
