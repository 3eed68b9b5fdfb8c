//! Tapo device-info client.
//!
//! Each fetch opens its own session and keeps it local to that call, so
//! fetches for different hosts share nothing but the HTTP connection pool and
//! the RSA key pair. KLAP is tried first; firmware that answers handshake1
//! with 404 is retried over secure passthrough.

use crate::error::{FetchError, FetchResult, ScanError, ScanResult};
use crate::scanner::traits::DeviceInfoFetcher;
use crate::tapo::klap::{self, KlapCipher, SEED_LEN};
use crate::tapo::passthrough::{self, KeyPair, PassthroughCipher};
use crate::types::{Credentials, DeviceInfo, DeviceInfoRecord};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, COOKIE, SET_COOKIE};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

/// Name of the session cookie issued by both handshakes.
const SESSION_COOKIE: &str = "TP_SESSIONID";

/// Device error codes that mean the credentials or the session were refused.
const AUTH_ERROR_CODES: &[i32] = &[-1501, -40401, 9999];

/// Envelope of every device response.
#[derive(Debug, Deserialize)]
struct TapoResponse {
    error_code: i32,
    #[serde(default)]
    result: Option<Value>,
}

/// An authenticated KLAP session with one device.
struct KlapSession {
    address: IpAddr,
    base_url: String,
    cookie: String,
    cipher: KlapCipher,
}

/// A secure passthrough session with one device.
struct PassthroughSession {
    address: IpAddr,
    url: String,
    cookie: String,
    cipher: PassthroughCipher,
    token: Option<String>,
}

/// Fetches device info over KLAP, falling back to secure passthrough.
pub struct TapoClient {
    client: Client,
    port: u16,
    key_pair: OnceCell<Arc<KeyPair>>,
}

impl TapoClient {
    /// Create a client talking to `port` with `timeout` per request.
    pub fn new(port: u16, timeout: Duration) -> ScanResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ScanError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            port,
            key_pair: OnceCell::new(),
        })
    }

    async fn klap_handshake(
        &self,
        address: IpAddr,
        credentials: &Credentials,
    ) -> FetchResult<KlapSession> {
        let base_url = format!("http://{}/app", SocketAddr::new(address, self.port));
        let local_seed: [u8; SEED_LEN] = rand::random();
        let auth_hash = klap::auth_hash(credentials);

        let response = self
            .client
            .post(format!("{}/handshake1", base_url))
            .body(local_seed.to_vec())
            .send()
            .await
            .map_err(|e| transport(address, e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(FetchError::UnsupportedProtocol(address.to_string()));
        }
        if !response.status().is_success() {
            return Err(malformed(
                address,
                format!("handshake1 returned {}", response.status()),
            ));
        }

        let cookie = session_cookie(response.headers())
            .ok_or_else(|| malformed(address, "handshake1 set no session cookie"))?;
        let body = response.bytes().await.map_err(|e| transport(address, e))?;
        if body.len() != SEED_LEN + 32 {
            return Err(malformed(
                address,
                format!("handshake1 body has {} bytes", body.len()),
            ));
        }

        let (remote_seed, server_hash) = body.split_at(SEED_LEN);
        if klap::server_proof(&local_seed, remote_seed, &auth_hash)[..] != *server_hash {
            return Err(FetchError::Authentication {
                address: address.to_string(),
                reason: "device does not recognise these credentials".to_string(),
            });
        }

        let response = self
            .client
            .post(format!("{}/handshake2", base_url))
            .header(COOKIE, &cookie)
            .body(klap::client_proof(&local_seed, remote_seed, &auth_hash).to_vec())
            .send()
            .await
            .map_err(|e| transport(address, e))?;

        if !response.status().is_success() {
            return Err(FetchError::Authentication {
                address: address.to_string(),
                reason: format!("handshake2 rejected with {}", response.status()),
            });
        }

        debug!(%address, "KLAP session established");

        Ok(KlapSession {
            address,
            base_url,
            cookie,
            cipher: KlapCipher::new(&local_seed, remote_seed, &auth_hash),
        })
    }

    async fn klap_request(&self, session: &mut KlapSession, method: &str) -> FetchResult<Value> {
        let address = session.address;
        let plaintext = serde_json::to_vec(&call(method, None)).map_err(|e| malformed(address, e))?;
        let (payload, seq) = session.cipher.encrypt(&plaintext);

        let response = self
            .client
            .post(format!("{}/request", session.base_url))
            .query(&[("seq", seq)])
            .header(COOKIE, &session.cookie)
            .body(payload)
            .send()
            .await
            .map_err(|e| transport(address, e))?;
        let response = check_status(address, response)?;

        let encrypted = response.bytes().await.map_err(|e| transport(address, e))?;
        let decrypted = session
            .cipher
            .open(seq, &encrypted)
            .map_err(|e| malformed(address, e))?;

        envelope_result(address, method, &decrypted)
    }

    /// Key pair shared by every passthrough session of this client.
    async fn key_pair(&self, address: IpAddr) -> FetchResult<Arc<KeyPair>> {
        let key_exchange = |reason: String| FetchError::KeyExchange {
            address: address.to_string(),
            reason,
        };

        self.key_pair
            .get_or_try_init(|| async {
                let pair = tokio::task::spawn_blocking(KeyPair::generate)
                    .await
                    .map_err(|e| key_exchange(e.to_string()))?
                    .map_err(|e| key_exchange(e.to_string()))?;
                Ok::<_, FetchError>(Arc::new(pair))
            })
            .await
            .map(Arc::clone)
    }

    async fn passthrough_login(
        &self,
        address: IpAddr,
        credentials: &Credentials,
    ) -> FetchResult<PassthroughSession> {
        let url = format!("http://{}/app", SocketAddr::new(address, self.port));
        let key_pair = self.key_pair(address).await?;

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "method": "handshake",
                "params": { "key": key_pair.public_pem() },
                "requestTimeMils": now_millis(),
            }))
            .send()
            .await
            .map_err(|e| transport(address, e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(FetchError::UnsupportedProtocol(address.to_string()));
        }
        let response = check_status(address, response)?;
        let cookie = session_cookie(response.headers())
            .ok_or_else(|| malformed(address, "handshake set no session cookie"))?;
        let body = response.bytes().await.map_err(|e| transport(address, e))?;

        let result = envelope_result(address, "handshake", &body)?;
        let encrypted_key = result
            .get("key")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed(address, "handshake returned no key"))?;
        let cipher = key_pair
            .open_session_key(encrypted_key)
            .map_err(|e| FetchError::KeyExchange {
                address: address.to_string(),
                reason: e.to_string(),
            })?;

        let mut session = PassthroughSession {
            address,
            url,
            cookie,
            cipher,
            token: None,
        };

        let (username, password) = passthrough::login_params(credentials);
        let params = json!({ "username": username, "password": password });
        let result = self
            .passthrough_request(&session, "login_device", Some(params))
            .await?;
        let token = result
            .get("token")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed(address, "login_device returned no token"))?;
        session.token = Some(token.to_string());

        debug!(%address, "secure passthrough session established");
        Ok(session)
    }

    async fn passthrough_request(
        &self,
        session: &PassthroughSession,
        method: &str,
        params: Option<Value>,
    ) -> FetchResult<Value> {
        let address = session.address;
        let inner = serde_json::to_vec(&call(method, params)).map_err(|e| malformed(address, e))?;
        let envelope = json!({
            "method": "securePassthrough",
            "params": { "request": session.cipher.encrypt(&inner) },
        });

        let mut request = self
            .client
            .post(&session.url)
            .header(COOKIE, &session.cookie)
            .json(&envelope);
        if let Some(token) = &session.token {
            request = request.query(&[("token", token)]);
        }

        let response = request.send().await.map_err(|e| transport(address, e))?;
        let response = check_status(address, response)?;
        let body = response.bytes().await.map_err(|e| transport(address, e))?;

        let outer = envelope_result(address, "securePassthrough", &body)?;
        let encrypted = outer
            .get("response")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed(address, "securePassthrough returned no response"))?;
        let decrypted = session
            .cipher
            .decrypt(encrypted)
            .map_err(|e| malformed(address, e))?;

        envelope_result(address, method, &decrypted)
    }
}

#[async_trait]
impl DeviceInfoFetcher for TapoClient {
    async fn fetch(
        &self,
        address: IpAddr,
        credentials: &Credentials,
    ) -> FetchResult<DeviceInfoRecord> {
        let result = match self.klap_handshake(address, credentials).await {
            Ok(mut session) => self.klap_request(&mut session, "get_device_info").await?,
            Err(FetchError::UnsupportedProtocol(_)) => {
                debug!(%address, "no KLAP endpoint, trying secure passthrough");
                let session = self.passthrough_login(address, credentials).await?;
                self.passthrough_request(&session, "get_device_info", None)
                    .await?
            }
            Err(e) => return Err(e),
        };
        let info = DeviceInfo::from_value(result).map_err(|e| malformed(address, e))?;

        Ok(DeviceInfoRecord::new(address, info))
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn call(method: &str, params: Option<Value>) -> Value {
    let mut body = json!({
        "method": method,
        "requestTimeMils": now_millis(),
    });
    if let Some(params) = params {
        body["params"] = params;
    }
    body
}

fn check_status(address: IpAddr, response: Response) -> FetchResult<Response> {
    match response.status() {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(FetchError::Authentication {
            address: address.to_string(),
            reason: format!("request rejected with {}", response.status()),
        }),
        status if !status.is_success() => {
            Err(malformed(address, format!("request returned {}", status)))
        }
        _ => Ok(response),
    }
}

/// Parse a `{"error_code", "result"}` envelope and map non-zero codes.
fn envelope_result(address: IpAddr, method: &str, body: &[u8]) -> FetchResult<Value> {
    let envelope: TapoResponse = serde_json::from_slice(body).map_err(|e| malformed(address, e))?;

    match envelope.error_code {
        0 => envelope
            .result
            .ok_or_else(|| malformed(address, format!("{} returned no result", method))),
        code if AUTH_ERROR_CODES.contains(&code) => Err(FetchError::Authentication {
            address: address.to_string(),
            reason: format!("{} failed with error code {}", method, code),
        }),
        code => Err(malformed(
            address,
            format!("{} failed with error code {}", method, code),
        )),
    }
}

/// Extract `TP_SESSIONID=...` from the `Set-Cookie` headers.
fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .map(str::trim)
        .find(|part| part.starts_with(SESSION_COOKIE) && part[SESSION_COOKIE.len()..].starts_with('='))
        .map(str::to_string)
}

fn transport(address: IpAddr, err: reqwest::Error) -> FetchError {
    FetchError::Transport {
        address: address.to_string(),
        reason: err.to_string(),
    }
}

fn malformed(address: IpAddr, reason: impl ToString) -> FetchError {
    FetchError::MalformedResponse {
        address: address.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tapo::fake::FakeDevice;
    use reqwest::header::HeaderValue;
    use std::net::Ipv4Addr;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    fn creds(password: &str) -> Credentials {
        Credentials::new("owner@example.com", password)
    }

    #[test]
    fn test_session_cookie_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            SET_COOKIE,
            HeaderValue::from_static("TP_SESSIONID=5A1B2C;TIMEOUT=86400"),
        );
        assert_eq!(
            session_cookie(&headers).as_deref(),
            Some("TP_SESSIONID=5A1B2C")
        );

        let mut other = HeaderMap::new();
        other.insert(SET_COOKIE, HeaderValue::from_static("TP_SESSIONIDX=1"));
        assert_eq!(session_cookie(&other), None);
    }

    #[tokio::test]
    async fn test_fetch_device_info() {
        let port = FakeDevice::new(creds("secret")).spawn().await;
        let client = TapoClient::new(port, Duration::from_secs(3)).unwrap();

        let record = client.fetch(LOCALHOST, &creds("secret")).await.unwrap();
        assert_eq!(record.address, LOCALHOST);
        assert_eq!(record.info.device_id.as_deref(), Some("80223C6A2A1B"));
        assert_eq!(record.info.nickname.as_deref(), Some("Kitchen Plug"));
        assert_eq!(record.info.ssid.as_deref(), Some("HomeNet"));
        assert_eq!(record.info.device_on, Some(false));
        assert_eq!(record.info.latitude, None);
    }

    #[tokio::test]
    async fn test_wrong_password_is_authentication_error() {
        let port = FakeDevice::new(creds("secret")).spawn().await;
        let client = TapoClient::new(port, Duration::from_secs(3)).unwrap();

        let err = client.fetch(LOCALHOST, &creds("guess")).await.unwrap_err();
        assert!(matches!(err, FetchError::Authentication { .. }), "{err}");
    }

    #[tokio::test]
    async fn test_device_error_code() {
        let port = FakeDevice::new(creds("secret")).with_error_code(-1008).spawn().await;
        let client = TapoClient::new(port, Duration::from_secs(3)).unwrap();

        let err = client.fetch(LOCALHOST, &creds("secret")).await.unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse { .. }), "{err}");
        assert!(err.to_string().contains("-1008"));
    }

    #[tokio::test]
    async fn test_auth_error_code() {
        let port = FakeDevice::new(creds("secret")).with_error_code(-1501).spawn().await;
        let client = TapoClient::new(port, Duration::from_secs(3)).unwrap();

        let err = client.fetch(LOCALHOST, &creds("secret")).await.unwrap_err();
        assert!(matches!(err, FetchError::Authentication { .. }), "{err}");
    }

    #[tokio::test]
    async fn test_device_without_either_protocol_is_unsupported() {
        let port = FakeDevice::new(creds("secret")).without_klap().spawn().await;
        let client = TapoClient::new(port, Duration::from_secs(3)).unwrap();

        let err = client.fetch(LOCALHOST, &creds("secret")).await.unwrap_err();
        assert!(matches!(err, FetchError::UnsupportedProtocol(_)), "{err}");
    }

    #[tokio::test]
    async fn test_legacy_firmware_uses_secure_passthrough() {
        let port = FakeDevice::new(creds("secret"))
            .without_klap()
            .with_passthrough()
            .spawn()
            .await;
        let client = TapoClient::new(port, Duration::from_secs(10)).unwrap();

        let record = client.fetch(LOCALHOST, &creds("secret")).await.unwrap();
        assert_eq!(record.info.device_id.as_deref(), Some("80223C6A2A1B"));
        assert_eq!(record.info.nickname.as_deref(), Some("Kitchen Plug"));
        assert_eq!(record.info.model.as_deref(), Some("P110"));

        // The key pair is generated once and reused for the next session.
        let again = client.fetch(LOCALHOST, &creds("secret")).await.unwrap();
        assert_eq!(again.info.device_id, record.info.device_id);
    }

    #[tokio::test]
    async fn test_legacy_firmware_wrong_password() {
        let port = FakeDevice::new(creds("secret"))
            .without_klap()
            .with_passthrough()
            .spawn()
            .await;
        let client = TapoClient::new(port, Duration::from_secs(10)).unwrap();

        let err = client.fetch(LOCALHOST, &creds("guess")).await.unwrap_err();
        assert!(matches!(err, FetchError::Authentication { .. }), "{err}");
    }

    #[tokio::test]
    async fn test_legacy_firmware_device_error_code() {
        let port = FakeDevice::new(creds("secret"))
            .without_klap()
            .with_passthrough()
            .with_error_code(-1008)
            .spawn()
            .await;
        let client = TapoClient::new(port, Duration::from_secs(10)).unwrap();

        let err = client.fetch(LOCALHOST, &creds("secret")).await.unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse { .. }), "{err}");
        assert!(err.to_string().contains("-1008"));
    }

    #[test]
    fn test_envelope_error_codes() {
        assert_eq!(
            envelope_result(LOCALHOST, "m", br#"{"error_code":0,"result":{"a":1}}"#).unwrap(),
            json!({"a": 1})
        );
        assert!(matches!(
            envelope_result(LOCALHOST, "m", br#"{"error_code":9999}"#),
            Err(FetchError::Authentication { .. })
        ));
        assert!(matches!(
            envelope_result(LOCALHOST, "m", br#"{"error_code":0}"#),
            Err(FetchError::MalformedResponse { .. })
        ));
        assert!(matches!(
            envelope_result(LOCALHOST, "m", b"<html>"),
            Err(FetchError::MalformedResponse { .. })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let port = {
            let listener = tokio::net::TcpListener::bind((LOCALHOST, 0)).await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = TapoClient::new(port, Duration::from_millis(500)).unwrap();

        let err = client.fetch(LOCALHOST, &creds("secret")).await.unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }), "{err}");
    }
}
