//! Inventory export for downstream controller tooling.
//!
//! Produces the account plus device list document consumed by Tapo control
//! scripts: `{"account": {...}, "devices": [{name, device_type, ip_addr}]}`.

use super::PersistedDevice;
use crate::error::{StorageError, StorageResult};
use crate::types::Credentials;
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountExport {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceExport {
    pub name: Option<String>,
    pub device_type: Option<String>,
    pub ip_addr: String,
}

/// The exported document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    pub account: AccountExport,
    pub devices: Vec<DeviceExport>,
}

/// Build the export from stored devices. Stale records are left out.
pub fn build_inventory(credentials: &Credentials, devices: &[PersistedDevice]) -> Inventory {
    Inventory {
        account: AccountExport {
            username: credentials.username.clone(),
            password: credentials.password.clone(),
        },
        devices: devices
            .iter()
            .filter(|device| !device.is_stale())
            .map(|device| DeviceExport {
                name: device.nickname.clone(),
                device_type: device.device_type.clone(),
                ip_addr: device.ip.clone(),
            })
            .collect(),
    }
}

/// Write `inventory` to `path` as JSON indented by four spaces.
pub fn write_inventory(inventory: &Inventory, path: &Path) -> StorageResult<()> {
    let export_error = |reason: String| StorageError::Export {
        path: path.to_path_buf(),
        reason,
    };

    let mut buf = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    inventory.serialize(&mut serializer)?;

    fs::write(path, buf).map_err(|e| export_error(e.to_string()))?;
    info!(path = %path.display(), devices = inventory.devices.len(), "stored device inventory");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{DeviceId, STALE_STATE};
    use chrono::Utc;
    use tempfile::TempDir;

    fn stored(id: i64, ip: &str, nickname: &str, state: &str) -> PersistedDevice {
        let now = Utc::now();
        PersistedDevice {
            id: DeviceId::new(id),
            ip: ip.into(),
            mac: None,
            state: Some(state.into()),
            avatar: None,
            device_id: None,
            device_on: None,
            fw_id: None,
            fw_ver: None,
            has_set_location_info: None,
            hw_id: None,
            hw_ver: None,
            lang: None,
            latitude: None,
            longitude: None,
            model: None,
            nickname: Some(nickname.into()),
            oem_id: None,
            on_time: None,
            region: None,
            rssi: None,
            signal_level: None,
            specs: None,
            ssid: None,
            time_diff: None,
            device_type: Some("SMART.TAPOPLUG".into()),
            first_seen: now,
            last_seen: now,
        }
    }

    #[test]
    fn test_build_inventory_skips_stale() {
        let devices = vec![
            stored(1, "10.0.0.5", "Porch", "up"),
            stored(2, "10.0.0.6", "Old", STALE_STATE),
        ];
        let inventory = build_inventory(&Credentials::new("me", "pw"), &devices);

        assert_eq!(inventory.account.username, "me");
        assert_eq!(
            inventory.devices,
            vec![DeviceExport {
                name: Some("Porch".into()),
                device_type: Some("SMART.TAPOPLUG".into()),
                ip_addr: "10.0.0.5".into(),
            }]
        );
    }

    #[test]
    fn test_write_inventory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("devices.json");
        let inventory =
            build_inventory(&Credentials::new("me", "pw"), &[stored(1, "10.0.0.5", "Porch", "up")]);

        write_inventory(&inventory, &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n    \"account\""));
        let parsed: Inventory = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, inventory);
    }

    #[test]
    fn test_write_to_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("devices.json");
        let inventory = build_inventory(&Credentials::default(), &[]);

        let err = write_inventory(&inventory, &path).unwrap_err();
        assert!(matches!(err, StorageError::Export { .. }));
    }
}
