//! Device records produced by classification and device-info retrieval.

use super::host::{CandidateHost, LinkAddress, Liveness};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Outcome of the vendor fingerprint check for one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClassificationResult {
    pub address: IpAddr,
    pub is_vendor_device: bool,
}

impl ClassificationResult {
    pub fn vendor(address: IpAddr) -> Self {
        Self {
            address,
            is_vendor_device: true,
        }
    }

    pub fn not_vendor(address: IpAddr) -> Self {
        Self {
            address,
            is_vendor_device: false,
        }
    }
}

/// Account credentials for the device's local protocol.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_empty() && self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Attributes reported by `get_device_info`.
///
/// Every field is optional: plugs, bulbs, hubs and cameras report different
/// subsets, and a field the device does not report stays `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    pub device_id: Option<String>,
    pub mac: Option<String>,
    pub avatar: Option<String>,
    pub device_on: Option<bool>,
    pub fw_id: Option<String>,
    pub fw_ver: Option<String>,
    pub has_set_location_info: Option<bool>,
    pub hw_id: Option<String>,
    pub hw_ver: Option<String>,
    pub lang: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub model: Option<String>,
    #[serde(deserialize_with = "base64_text")]
    pub nickname: Option<String>,
    pub oem_id: Option<String>,
    pub on_time: Option<i64>,
    pub region: Option<String>,
    pub rssi: Option<i64>,
    pub signal_level: Option<i64>,
    pub specs: Option<String>,
    #[serde(deserialize_with = "base64_text")]
    pub ssid: Option<String>,
    pub time_diff: Option<i64>,
    #[serde(rename = "type", alias = "device_type")]
    pub device_type: Option<String>,
}

impl DeviceInfo {
    /// Parse the `result` object of a `get_device_info` response.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// Tapo firmware base64-encodes user supplied strings. Values that are not
/// valid base64 UTF-8 are kept as reported.
fn base64_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.map(|value| decode_base64_or_raw(&value)))
}

fn decode_base64_or_raw(value: &str) -> String {
    STANDARD
        .decode(value)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| value.to_string())
}

/// Device details retrieved from one positively classified host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfoRecord {
    pub address: IpAddr,
    pub link_address: Option<LinkAddress>,
    pub state: Liveness,
    pub info: DeviceInfo,
}

impl DeviceInfoRecord {
    /// A record for `address` before the enumeration data is merged in.
    pub fn new(address: IpAddr, info: DeviceInfo) -> Self {
        Self {
            address,
            link_address: None,
            state: Liveness::Up,
            info,
        }
    }

    /// Merge link address and liveness from the enumerated host.
    pub fn with_host(mut self, host: &CandidateHost) -> Self {
        self.link_address = host.link_address;
        self.state = host.liveness;
        self
    }

    /// MAC to persist: the device's own report wins over the neighbour table.
    pub fn mac(&self) -> Option<String> {
        self.info
            .mac
            .as_deref()
            .and_then(|mac| mac.parse::<LinkAddress>().ok())
            .or(self.link_address)
            .map(|mac| mac.to_string())
            .or_else(|| self.info.mac.clone())
    }
}
