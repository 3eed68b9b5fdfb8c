//! Hosts discovered by the liveness sweep.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Liveness of a candidate host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    Up,
    Down,
}

impl Liveness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

impl fmt::Display for Liveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A link-layer (MAC) address, normalised to upper-case colon-separated hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LinkAddress([u8; 6]);

impl LinkAddress {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// The all-zero address the kernel reports for incomplete neighbour entries.
    pub fn is_unspecified(&self) -> bool {
        self.0 == [0; 6]
    }
}

impl fmt::Display for LinkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a, b, c, d, e, g
        )
    }
}

/// Error returned when a link address cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid link address: {0}")]
pub struct LinkAddressError(String);

impl FromStr for LinkAddress {
    type Err = LinkAddressError;

    /// Accepts `aa:bb:cc:dd:ee:ff` and the `AA-BB-CC-DD-EE-FF` form Tapo
    /// firmware reports.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(|c| c == ':' || c == '-').collect();
        if parts.len() != 6 {
            return Err(LinkAddressError(s.to_string()));
        }

        let mut octets = [0u8; 6];
        for (slot, part) in octets.iter_mut().zip(parts) {
            if part.len() != 2 {
                return Err(LinkAddressError(s.to_string()));
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| LinkAddressError(s.to_string()))?;
        }
        Ok(Self(octets))
    }
}

impl TryFrom<String> for LinkAddress {
    type Error = LinkAddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LinkAddress> for String {
    fn from(value: LinkAddress) -> Self {
        value.to_string()
    }
}

/// A host found during enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateHost {
    pub address: IpAddr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_address: Option<LinkAddress>,
    pub liveness: Liveness,
}

impl CandidateHost {
    /// Create a live host without a resolved link address.
    pub fn up(address: IpAddr) -> Self {
        Self {
            address,
            link_address: None,
            liveness: Liveness::Up,
        }
    }

    /// Attach a link address.
    pub fn with_link_address(mut self, link_address: Option<LinkAddress>) -> Self {
        self.link_address = link_address;
        self
    }

    pub fn is_up(&self) -> bool {
        self.liveness == Liveness::Up
    }
}

impl fmt::Display for CandidateHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.link_address {
            Some(mac) => write!(f, "{} ({})", self.address, mac),
            None => write!(f, "{}", self.address),
        }
    }
}
