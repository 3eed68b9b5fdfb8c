//! Vendor fingerprinting from the HTTP `Server` banner.
//!
//! Tapo devices answer a plain `GET /` on their local HTTP port with a
//! `Server: SHIP 2.0` header. The check is best-effort: anything that does not
//! produce the expected banner is treated as "not a Tapo device", and false
//! positives are caught later when the authenticated handshake fails.

use crate::error::{ScanError, ScanResult};
use crate::scanner::traits::VendorProbe;
use crate::types::ClassificationResult;
use async_trait::async_trait;
use reqwest::header::SERVER;
use reqwest::redirect::Policy;
use reqwest::Client;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::debug;

/// Banner advertised by Tapo firmware.
pub const TAPO_SIGNATURE: &str = "SHIP 2.0";

/// Classifies hosts by matching the `Server` header of `GET /`.
pub struct HttpSignatureProbe {
    client: Client,
    port: u16,
    signature: String,
}

impl HttpSignatureProbe {
    /// Create a probe.
    ///
    /// Fails only if the HTTP client itself cannot be built.
    pub fn new(port: u16, timeout: Duration, signature: impl Into<String>) -> ScanResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .redirect(Policy::none())
            .build()
            .map_err(|e| ScanError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            port,
            signature: signature.into(),
        })
    }

    /// Check whether a `Server` header value carries the vendor signature.
    pub fn matches(&self, server: &str) -> bool {
        server.contains(&self.signature)
    }
}

#[async_trait]
impl VendorProbe for HttpSignatureProbe {
    async fn classify(&self, address: IpAddr) -> ClassificationResult {
        let url = format!("http://{}/", SocketAddr::new(address, self.port));

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(%address, error = %e, timeout = e.is_timeout(), "signature probe failed");
                return ClassificationResult::not_vendor(address);
            }
        };

        let server = response
            .headers()
            .get(SERVER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();

        debug!(%address, status = %response.status(), server, "signature probe response");

        if self.matches(server) {
            ClassificationResult::vendor(address)
        } else {
            ClassificationResult::not_vendor(address)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;
    use axum::routing::get;
    use axum::Router;
    use std::net::Ipv4Addr;
    use tokio::net::TcpListener;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    async fn serve_banner(banner: &'static str) -> u16 {
        let app = Router::new().route("/", get(move || async move { ([(header::SERVER, banner)], "ok") }));
        let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        port
    }

    #[tokio::test]
    async fn test_matching_banner_classifies_vendor() {
        let port = serve_banner("SHIP 2.0").await;
        let probe = HttpSignatureProbe::new(port, Duration::from_secs(3), TAPO_SIGNATURE).unwrap();

        let result = probe.classify(LOCALHOST).await;
        assert!(result.is_vendor_device);
        assert_eq!(result.address, LOCALHOST);
    }

    #[tokio::test]
    async fn test_other_banner_is_not_vendor() {
        let port = serve_banner("nginx/1.25.3").await;
        let probe = HttpSignatureProbe::new(port, Duration::from_secs(3), TAPO_SIGNATURE).unwrap();

        assert!(!probe.classify(LOCALHOST).await.is_vendor_device);
    }

    #[tokio::test]
    async fn test_closed_port_is_not_vendor() {
        let port = {
            let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let probe = HttpSignatureProbe::new(port, Duration::from_millis(300), TAPO_SIGNATURE).unwrap();

        assert!(!probe.classify(LOCALHOST).await.is_vendor_device);
    }

    #[test]
    fn test_signature_is_substring_match() {
        let probe = HttpSignatureProbe::new(80, Duration::from_secs(1), TAPO_SIGNATURE).unwrap();
        assert!(probe.matches("SHIP 2.0"));
        assert!(probe.matches("Server SHIP 2.0 (tp-link)"));
        assert!(!probe.matches("SHIP 1.0"));
        assert!(!probe.matches(""));
    }
}
