//! Application settings and paths.
//!
//! Settings are read from a YAML file. Paths follow the XDG Base Directory
//! Specification and are only consulted for defaults the file leaves out.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Credentials;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Default database file name.
pub const DEFAULT_DATABASE_FILE: &str = "iot_devices.db";

/// Application directory paths.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Data directory (~/.local/share/tapo-inventory)
    pub data_dir: PathBuf,
}

impl Paths {
    /// Resolve paths using XDG directories.
    pub fn discover() -> ConfigResult<Self> {
        let project = ProjectDirs::from("com", "tapo-inventory", "tapo-inventory")
            .ok_or(ConfigError::DirectoryNotFound)?;

        Ok(Self {
            data_dir: project.data_dir().to_path_buf(),
        })
    }

    /// Get the path to the default device database, creating its directory.
    pub fn default_database(&self) -> ConfigResult<PathBuf> {
        fs::create_dir_all(&self.data_dir)?;
        Ok(self.data_dir.join(DEFAULT_DATABASE_FILE))
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: IpAddr,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            port: 4667,
        }
    }
}

/// Scan pipeline tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Maximum number of hosts worked on at once.
    pub concurrency: usize,
    /// TCP ports tried by the liveness sweep.
    pub liveness_ports: Vec<u16>,
    /// Connect timeout per liveness attempt in milliseconds.
    pub liveness_timeout_ms: u64,
    /// Port of the unauthenticated fingerprint request.
    pub probe_port: u16,
    /// Timeout of the fingerprint request in milliseconds.
    pub probe_timeout_ms: u64,
    /// Substring expected in the `Server` header of vendor devices.
    pub signature: String,
    /// Port of the authenticated device protocol.
    pub fetch_port: u16,
    /// Timeout per device protocol request in milliseconds.
    pub fetch_timeout_ms: u64,
    /// New host operations per second, 0 for unlimited.
    pub rate_limit: u32,
    /// Abandon the scan after this many seconds and keep what finished.
    pub deadline_secs: Option<u64>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            concurrency: 24,
            liveness_ports: vec![80, 443],
            liveness_timeout_ms: 1000,
            probe_port: 80,
            probe_timeout_ms: 3000,
            signature: "SHIP 2.0".to_string(),
            fetch_port: 80,
            fetch_timeout_ms: 5000,
            rate_limit: 0,
            deadline_secs: None,
        }
    }
}

impl ScanSettings {
    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

/// Application-wide settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Log file; logs go to stderr when unset.
    pub log_file: Option<PathBuf>,
    /// SQLite database location; defaults to the XDG data directory.
    pub database: Option<PathBuf>,
    /// Credentials of the vendor cloud account the devices are bound to.
    pub tapo: Credentials,
    pub server: ServerSettings,
    pub scan: ScanSettings,
}

impl Settings {
    /// Load settings from `path`.
    ///
    /// When `explicit` is false a missing file yields the defaults; an
    /// explicitly requested file must exist.
    pub fn load(path: &Path, explicit: bool) -> ConfigResult<Self> {
        if !path.exists() {
            if explicit {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            tracing::warn!(path = %path.display(), "configuration file not found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Self::from_yaml(&content)
    }

    /// Parse and validate settings from YAML text.
    pub fn from_yaml(content: &str) -> ConfigResult<Self> {
        let settings: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| ConfigError::InvalidFormat(e.to_string()))?
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the scan pipeline cannot work with.
    pub fn validate(&self) -> ConfigResult<()> {
        let scan = &self.scan;
        if scan.concurrency == 0 {
            return Err(ConfigError::InvalidValue(
                "scan.concurrency must be at least 1".to_string(),
            ));
        }
        if scan.liveness_ports.is_empty() {
            return Err(ConfigError::InvalidValue(
                "scan.liveness_ports must not be empty".to_string(),
            ));
        }
        if scan.liveness_ports.contains(&0) {
            return Err(ConfigError::InvalidValue(
                "scan.liveness_ports must not contain port 0".to_string(),
            ));
        }
        for (name, value) in [
            ("scan.liveness_timeout_ms", scan.liveness_timeout_ms),
            ("scan.probe_timeout_ms", scan.probe_timeout_ms),
            ("scan.fetch_timeout_ms", scan.fetch_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue(format!("{} must be positive", name)));
            }
        }
        if scan.signature.is_empty() {
            return Err(ConfigError::InvalidValue(
                "scan.signature must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Database path, falling back to the XDG data directory.
    pub fn database_path(&self) -> ConfigResult<PathBuf> {
        match &self.database {
            Some(path) => Ok(path.clone()),
            None => Paths::discover()?.default_database(),
        }
    }
}
