//! Device persistence.
//!
//! [`DeviceRepository`] is the seam between the import pipeline and the
//! storage engine. The shipped implementation is SQLite; filters and updates
//! are restricted to a fixed set of column names.

mod export;
mod sqlite;

pub use export::{build_inventory, write_inventory, AccountExport, DeviceExport, Inventory};
pub use rusqlite::types::Value as FieldValue;
pub use sqlite::SqliteDeviceRepository;

use crate::error::{StorageError, StorageResult};
use crate::types::{DeviceInfo, DeviceInfoRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

/// State written to records that lost their address to another device.
pub const STALE_STATE: &str = "stale";

/// Columns that may be filtered on or updated.
pub const DEVICE_COLUMNS: &[&str] = &[
    "ip",
    "mac",
    "state",
    "avatar",
    "device_id",
    "device_on",
    "fw_id",
    "fw_ver",
    "has_set_location_info",
    "hw_id",
    "hw_ver",
    "lang",
    "latitude",
    "longitude",
    "model",
    "nickname",
    "oem_id",
    "on_time",
    "region",
    "rssi",
    "signal_level",
    "specs",
    "ssid",
    "time_diff",
    "device_type",
];

/// Opaque identifier of a persisted device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(i64);

impl DeviceId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DeviceId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// A stored device row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedDevice {
    pub id: DeviceId,
    pub ip: String,
    pub mac: Option<String>,
    pub state: Option<String>,
    pub avatar: Option<String>,
    pub device_id: Option<String>,
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
    pub nickname: Option<String>,
    pub oem_id: Option<String>,
    pub on_time: Option<i64>,
    pub region: Option<String>,
    pub rssi: Option<i64>,
    pub signal_level: Option<i64>,
    pub specs: Option<String>,
    pub ssid: Option<String>,
    pub time_diff: Option<i64>,
    pub device_type: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl PersistedDevice {
    pub fn is_stale(&self) -> bool {
        self.state.as_deref() == Some(STALE_STATE)
    }
}

/// Data written by one import for one device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceUpsert {
    pub ip: IpAddr,
    pub mac: Option<String>,
    pub state: String,
    pub info: DeviceInfo,
}

impl DeviceUpsert {
    /// Column/value pairs for every data column, in [`DEVICE_COLUMNS`] order.
    pub(crate) fn values(&self) -> Vec<(&'static str, FieldValue)> {
        let info = &self.info;
        vec![
            ("ip", FieldValue::from(self.ip.to_string())),
            ("mac", FieldValue::from(self.mac.clone())),
            ("state", FieldValue::from(self.state.clone())),
            ("avatar", FieldValue::from(info.avatar.clone())),
            ("device_id", FieldValue::from(info.device_id.clone())),
            ("device_on", FieldValue::from(info.device_on)),
            ("fw_id", FieldValue::from(info.fw_id.clone())),
            ("fw_ver", FieldValue::from(info.fw_ver.clone())),
            ("has_set_location_info", FieldValue::from(info.has_set_location_info)),
            ("hw_id", FieldValue::from(info.hw_id.clone())),
            ("hw_ver", FieldValue::from(info.hw_ver.clone())),
            ("lang", FieldValue::from(info.lang.clone())),
            ("latitude", FieldValue::from(info.latitude)),
            ("longitude", FieldValue::from(info.longitude)),
            ("model", FieldValue::from(info.model.clone())),
            ("nickname", FieldValue::from(info.nickname.clone())),
            ("oem_id", FieldValue::from(info.oem_id.clone())),
            ("on_time", FieldValue::from(info.on_time)),
            ("region", FieldValue::from(info.region.clone())),
            ("rssi", FieldValue::from(info.rssi)),
            ("signal_level", FieldValue::from(info.signal_level)),
            ("specs", FieldValue::from(info.specs.clone())),
            ("ssid", FieldValue::from(info.ssid.clone())),
            ("time_diff", FieldValue::from(info.time_diff)),
            ("device_type", FieldValue::from(info.device_type.clone())),
        ]
    }
}

impl From<&DeviceInfoRecord> for DeviceUpsert {
    fn from(record: &DeviceInfoRecord) -> Self {
        Self {
            ip: record.address,
            mac: record.mac(),
            state: record.state.to_string(),
            info: record.info.clone(),
        }
    }
}

/// Exact-match column values, used both as a list filter and as an update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceFields {
    fields: BTreeMap<String, FieldValue>,
}

/// Filter for [`DeviceRepository::list`].
pub type DeviceFilter = DeviceFields;

/// Field changes for [`DeviceRepository::update`].
pub type DeviceUpdate = DeviceFields;

impl DeviceFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column value. Column names are checked when the query runs.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(column.into(), value.into());
        self
    }

    /// Shorthand for `with("state", state)`.
    pub fn state(self, state: impl Into<String>) -> Self {
        self.with("state", state.into())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Reject any column not in [`DEVICE_COLUMNS`].
    pub fn validate(&self) -> StorageResult<()> {
        match self
            .fields
            .keys()
            .find(|column| !DEVICE_COLUMNS.contains(&column.as_str()))
        {
            Some(column) => Err(StorageError::UnknownField(column.clone())),
            None => Ok(()),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(column, value)| (column.as_str(), value))
    }
}

/// Durable storage of imported devices.
#[async_trait]
pub trait DeviceRepository: Send + Sync {
    /// Insert or refresh a device and return its identifier.
    ///
    /// Devices are matched on the vendor `device_id` when one is reported and
    /// on the address otherwise. Other records still holding the address are
    /// marked stale.
    async fn upsert(&self, device: DeviceUpsert) -> StorageResult<DeviceId>;

    /// One page of devices matching `filter`, ordered by id.
    ///
    /// Pages start at 1; smaller values are treated as 1.
    async fn list(
        &self,
        page: i64,
        page_size: i64,
        filter: &DeviceFilter,
    ) -> StorageResult<Vec<PersistedDevice>>;

    /// Every stored device, ordered by id.
    async fn all(&self) -> StorageResult<Vec<PersistedDevice>>;

    async fn get(&self, id: DeviceId) -> StorageResult<Option<PersistedDevice>>;

    /// The active record for `ip`, preferring non-stale and recently seen rows.
    async fn get_by_address(&self, ip: IpAddr) -> StorageResult<Option<PersistedDevice>>;

    async fn update(&self, id: DeviceId, fields: DeviceUpdate) -> StorageResult<()>;

    async fn delete(&self, id: DeviceId) -> StorageResult<()>;
}

/// Shared repository handle.
pub type SharedRepository = Arc<dyn DeviceRepository>;
