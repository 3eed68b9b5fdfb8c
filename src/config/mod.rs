//! Configuration management for tapo-inventory.
//!
//! Provides YAML settings loading and XDG-compliant default paths.

mod settings;

pub use settings::{
    Paths, ScanSettings, ServerSettings, Settings, DEFAULT_CONFIG_FILE, DEFAULT_DATABASE_FILE,
};
