//! Range expressions for host enumeration.
//!
//! Supports:
//! - Single IP addresses (`192.168.1.7`, `::1`)
//! - CIDR notation (`192.168.1.0/24`, `fd00::/120`)
//! - Explicit ranges (`192.168.1.10-192.168.1.20`)
//! - Last-octet shorthand (`192.168.1.10-20`)

use ipnetwork::IpNetwork;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Error type for range expression parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("range expression is empty")]
    Empty,
    #[error("invalid range expression: {0}")]
    InvalidFormat(String),
    #[error("invalid CIDR notation: {0}")]
    InvalidCidr(String),
    #[error("range start {0} is after range end {1}")]
    Reversed(IpAddr, IpAddr),
    #[error("range endpoints {0} and {1} belong to different address families")]
    MixedFamilies(IpAddr, IpAddr),
    #[error("range too large: {0} addresses (max: {1})")]
    TooLarge(u128, u128),
}

/// A parsed range expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeSpec {
    /// A single address.
    Single(IpAddr),
    /// A CIDR network.
    Cidr(IpNetwork),
    /// An inclusive address span.
    Span { start: IpAddr, end: IpAddr },
}

impl RangeSpec {
    /// Maximum number of addresses a single expression may expand to.
    pub const MAX_HOSTS: u128 = 65536; // /16 for IPv4

    /// Parse a range expression.
    pub fn parse(s: &str) -> Result<Self, RangeError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(RangeError::Empty);
        }

        if let Ok(ip) = s.parse::<IpAddr>() {
            return Ok(Self::Single(ip));
        }

        if s.contains('/') {
            let network: IpNetwork = s
                .parse()
                .map_err(|_| RangeError::InvalidCidr(s.to_string()))?;
            let spec = Self::Cidr(network);
            spec.check_size()?;
            return Ok(spec);
        }

        if let Some((left, right)) = s.split_once('-') {
            let start: IpAddr = left
                .trim()
                .parse()
                .map_err(|_| RangeError::InvalidFormat(s.to_string()))?;
            let end = parse_span_end(start, right.trim())
                .ok_or_else(|| RangeError::InvalidFormat(s.to_string()))?;

            if start.is_ipv4() != end.is_ipv4() {
                return Err(RangeError::MixedFamilies(start, end));
            }
            if ip_to_u128(start) > ip_to_u128(end) {
                return Err(RangeError::Reversed(start, end));
            }

            let spec = Self::Span { start, end };
            spec.check_size()?;
            return Ok(spec);
        }

        Err(RangeError::InvalidFormat(s.to_string()))
    }

    /// Number of addresses covered by the expression, before any filtering.
    ///
    /// Saturates at `u128::MAX` for `::/0` and the full IPv6 span.
    pub fn size(&self) -> u128 {
        match self {
            Self::Single(_) => 1,
            Self::Cidr(IpNetwork::V4(net)) => 1u128 << (32 - u32::from(net.prefix().min(32))),
            Self::Cidr(IpNetwork::V6(net)) => {
                let host_bits = 128 - u32::from(net.prefix().min(128));
                1u128.checked_shl(host_bits).unwrap_or(u128::MAX)
            }
            Self::Span { start, end } => (ip_to_u128(*end) - ip_to_u128(*start)).saturating_add(1),
        }
    }

    fn check_size(&self) -> Result<(), RangeError> {
        let size = self.size();
        if size > Self::MAX_HOSTS {
            return Err(RangeError::TooLarge(size, Self::MAX_HOSTS));
        }
        Ok(())
    }

    /// Expand the expression to candidate host addresses.
    ///
    /// For IPv4 CIDRs with a prefix shorter than /31 the network and broadcast
    /// addresses are excluded.
    pub fn addresses(&self) -> Vec<IpAddr> {
        match self {
            Self::Single(ip) => vec![*ip],

            Self::Cidr(network) => network
                .iter()
                .filter(|ip| {
                    if let (IpNetwork::V4(net), IpAddr::V4(addr)) = (network, ip) {
                        if net.prefix() < 31 {
                            return *addr != net.network() && *addr != net.broadcast();
                        }
                    }
                    true
                })
                .collect(),

            Self::Span { start, end } => {
                let (lo, hi) = (ip_to_u128(*start), ip_to_u128(*end));
                (lo..=hi)
                    .map(|n| match start {
                        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::from(n as u32)),
                        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::from(n)),
                    })
                    .collect()
            }
        }
    }

    /// Check whether an address lies inside the expression.
    pub fn contains(&self, ip: IpAddr) -> bool {
        match self {
            Self::Single(single) => *single == ip,
            Self::Cidr(network) => network.contains(ip),
            Self::Span { start, end } => {
                start.is_ipv4() == ip.is_ipv4()
                    && (ip_to_u128(*start)..=ip_to_u128(*end)).contains(&ip_to_u128(ip))
            }
        }
    }
}

impl FromStr for RangeSpec {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RangeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(ip) => write!(f, "{}", ip),
            Self::Cidr(network) => write!(f, "{}", network),
            Self::Span { start, end } => write!(f, "{}-{}", start, end),
        }
    }
}

/// Parse the right-hand side of `a-b`: either a full address or, for IPv4,
/// a last-octet value.
fn parse_span_end(start: IpAddr, right: &str) -> Option<IpAddr> {
    if let Ok(ip) = right.parse::<IpAddr>() {
        return Some(ip);
    }
    match start {
        IpAddr::V4(v4) => {
            let last: u8 = right.parse().ok()?;
            let [a, b, c, _] = v4.octets();
            Some(IpAddr::V4(Ipv4Addr::new(a, b, c, last)))
        }
        IpAddr::V6(_) => None,
    }
}

fn ip_to_u128(ip: IpAddr) -> u128 {
    match ip {
        IpAddr::V4(v4) => u32::from(v4) as u128,
        IpAddr::V6(v6) => u128::from(v6),
    }
}
