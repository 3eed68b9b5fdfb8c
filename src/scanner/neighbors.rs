//! Link-layer address lookup from the kernel neighbour table.
//!
//! The liveness sweep leaves ARP entries behind for every host on the local
//! segment, so reading the table afterwards resolves MAC addresses without
//! raw sockets.

use crate::types::LinkAddress;
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

/// Location of the IPv4 neighbour table on Linux.
pub const PROC_NET_ARP: &str = "/proc/net/arp";

/// Snapshot of IP → MAC mappings.
#[derive(Debug, Clone, Default)]
pub struct NeighborTable {
    entries: HashMap<IpAddr, LinkAddress>,
}

impl NeighborTable {
    /// Read the table from `path`. A missing or unreadable table (non-Linux
    /// hosts, containers without /proc) yields an empty snapshot.
    pub async fn load(path: &Path) -> Self {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Self::parse(&content),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "neighbour table unavailable");
                Self::default()
            }
        }
    }

    /// Parse `/proc/net/arp` formatted text.
    pub fn parse(content: &str) -> Self {
        let entries = content
            .lines()
            .skip(1)
            .filter_map(|line| {
                let fields: Vec<&str> = line.split_whitespace().collect();
                let ip: IpAddr = fields.first()?.parse().ok()?;
                let mac: LinkAddress = fields.get(3)?.parse().ok()?;
                (!mac.is_unspecified()).then_some((ip, mac))
            })
            .collect();

        Self { entries }
    }

    pub fn lookup(&self, address: IpAddr) -> Option<LinkAddress> {
        self.entries.get(&address).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Where the enumerator gets link addresses from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NeighborSource {
    /// Read a neighbour table file after the sweep.
    File(PathBuf),
    /// Do not resolve link addresses.
    Disabled,
}

impl Default for NeighborSource {
    fn default() -> Self {
        Self::File(PathBuf::from(PROC_NET_ARP))
    }
}

impl NeighborSource {
    pub async fn snapshot(&self) -> NeighborTable {
        match self {
            Self::File(path) => NeighborTable::load(path).await,
            Self::Disabled => NeighborTable::default(),
        }
    }
}
