//! Error types for tapo-inventory.
//!
//! Uses `thiserror` for ergonomic error definitions. Errors are split by the
//! boundary they belong to: input errors surface immediately, per-host errors
//! are absorbed by the orchestrator, subsystem errors abort the whole import.

use std::path::PathBuf;
use thiserror::Error;

pub use crate::types::RangeError;

/// Errors raised by the scanning subsystem as a whole.
///
/// Individual host failures are never reported through this type; a host that
/// does not answer simply does not appear in the results.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("probing subsystem unavailable: {0}")]
    ProbeUnavailable(String),

    #[error("HTTP client could not be initialised: {0}")]
    HttpClient(String),

    #[error(transparent)]
    InvalidRange(#[from] RangeError),
}

/// Result type alias for scan operations.
pub type ScanResult<T> = Result<T, ScanError>;

/// Errors from the authenticated device-info retrieval of a single host.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("authentication rejected by {address}: {reason}")]
    Authentication { address: String, reason: String },

    #[error("transport failure talking to {address}: {reason}")]
    Transport { address: String, reason: String },

    #[error("malformed response from {address}: {reason}")]
    MalformedResponse { address: String, reason: String },

    #[error("session key exchange with {address} failed: {reason}")]
    KeyExchange { address: String, reason: String },

    #[error("{0} speaks neither KLAP nor secure passthrough")]
    UnsupportedProtocol(String),
}

impl FetchError {
    /// Short machine-friendly label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authentication { .. } => "authentication",
            Self::Transport { .. } => "transport",
            Self::MalformedResponse { .. } => "malformed_response",
            Self::KeyExchange { .. } => "key_exchange",
            Self::UnsupportedProtocol(_) => "unsupported_protocol",
        }
    }
}

/// Result type alias for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// Errors related to device persistence.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("unknown device field: {0}")]
    UnknownField(String),

    #[error("device not found: {0}")]
    NotFound(String),

    #[error("storage task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("export to {path} failed: {reason}")]
    Export { path: PathBuf, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors related to configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read {path}: {reason}")]
    ReadFailed { path: PathBuf, reason: String },

    #[error("invalid configuration format: {0}")]
    InvalidFormat(String),

    #[error("invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("could not determine data directory")]
    DirectoryNotFound,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that abort an import as a whole.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error(transparent)]
    InvalidRange(#[from] RangeError),

    #[error(transparent)]
    Scan(ScanError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<ScanError> for ImportError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::InvalidRange(e) => Self::InvalidRange(e),
            other => Self::Scan(other),
        }
    }
}

/// Result type alias for import operations.
pub type ImportResult<T> = Result<T, ImportError>;

/// Top-level error for CLI command execution.
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Range(#[from] RangeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for CLI operations.
pub type CliResult<T> = Result<T, CliError>;
