//! TCP connect liveness probe.
//!
//! Decides whether a host is up the way an unprivileged ping sweep does: a
//! TCP handshake to a few common ports. A completed handshake and an active
//! refusal both prove the host is there; silence or an unreachable error
//! means it is not.

use crate::error::{ScanError, ScanResult};
use crate::scanner::traits::LivenessProbe;
use crate::types::Liveness;
use async_trait::async_trait;
use futures::future::join_all;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// What a single connect attempt told us about the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectOutcome {
    Connected,
    Refused,
    NoResponse,
}

/// TCP connect liveness probe.
///
/// Does not require elevated privileges.
pub struct TcpLivenessProbe {
    ports: Vec<u16>,
    timeout: Duration,
}

impl TcpLivenessProbe {
    /// Create a new probe.
    ///
    /// # Arguments
    /// * `ports` - Ports tried concurrently for each host
    /// * `timeout` - Connect timeout per attempt
    pub fn new(ports: Vec<u16>, timeout: Duration) -> Self {
        Self { ports, timeout }
    }

    async fn attempt_connect(&self, addr: SocketAddr) -> ConnectOutcome {
        match timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => ConnectOutcome::Connected,
            Ok(Err(e)) => match e.kind() {
                io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset => {
                    ConnectOutcome::Refused
                }
                _ => ConnectOutcome::NoResponse,
            },
            Err(_) => ConnectOutcome::NoResponse,
        }
    }
}

#[async_trait]
impl LivenessProbe for TcpLivenessProbe {
    fn ensure_available(&self, ipv6: bool) -> ScanResult<()> {
        let domain = if ipv6 { Domain::IPV6 } else { Domain::IPV4 };
        Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
            .map(drop)
            .map_err(|e| ScanError::ProbeUnavailable(format!("cannot open TCP socket: {}", e)))
    }

    async fn probe(&self, address: IpAddr) -> Liveness {
        let attempts = self
            .ports
            .iter()
            .map(|&port| self.attempt_connect(SocketAddr::new(address, port)));

        let answered = join_all(attempts)
            .await
            .into_iter()
            .any(|outcome| outcome != ConnectOutcome::NoResponse);

        if answered {
            Liveness::Up
        } else {
            Liveness::Down
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::net::TcpListener;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[tokio::test]
    async fn test_listening_host_is_up() {
        let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let probe = TcpLivenessProbe::new(vec![port], Duration::from_millis(500));
        assert_eq!(probe.probe(LOCALHOST).await, Liveness::Up);
    }

    #[tokio::test]
    async fn test_refusing_host_is_up() {
        let port = {
            let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let probe = TcpLivenessProbe::new(vec![port], Duration::from_millis(500));
        assert_eq!(probe.probe(LOCALHOST).await, Liveness::Up);
    }

    #[tokio::test]
    async fn test_silent_host_is_down() {
        // TEST-NET-1 is never routed; the attempt either times out or is
        // rejected as unreachable.
        let probe = TcpLivenessProbe::new(vec![80], Duration::from_millis(100));
        let addr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));
        assert_eq!(probe.probe(addr).await, Liveness::Down);
    }

    #[test]
    fn test_ipv4_sockets_available() {
        let probe = TcpLivenessProbe::new(vec![80], Duration::from_millis(100));
        assert!(probe.ensure_available(false).is_ok());
        assert_eq!(probe.timeout(), Duration::from_millis(100));
    }
}
