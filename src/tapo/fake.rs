//! In-process Tapo device for tests.
//!
//! Serves the `SHIP 2.0` banner on `GET /` and speaks enough KLAP or secure
//! passthrough to answer `get_device_info`, using the same ciphers as the
//! client.

use crate::tapo::klap::{self, KlapCipher, SEED_LEN};
use crate::tapo::passthrough::{self, PassthroughCipher, KEY_MATERIAL_LEN};
use crate::types::Credentials;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Encrypt, RsaPublicKey};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

struct Session {
    local_seed: Vec<u8>,
    remote_seed: [u8; SEED_LEN],
    established: bool,
}

struct LegacySession {
    cipher: PassthroughCipher,
    token: Option<String>,
}

struct DeviceState {
    auth_hash: [u8; 32],
    login: (String, String),
    klap: bool,
    passthrough: bool,
    error_code: i32,
    info: Value,
    sessions: Mutex<HashMap<String, Session>>,
    legacy_sessions: Mutex<HashMap<String, LegacySession>>,
}

impl DeviceState {
    fn reply(&self, method: Option<&str>) -> Value {
        match (self.error_code, method) {
            (0, Some("get_device_info")) => json!({ "error_code": 0, "result": self.info }),
            (0, _) => json!({ "error_code": -1002 }),
            (code, _) => json!({ "error_code": code }),
        }
    }
}

#[derive(Deserialize)]
struct SeqQuery {
    seq: i32,
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Builder for a fake device bound to an ephemeral localhost port.
pub struct FakeDevice {
    credentials: Credentials,
    klap: bool,
    passthrough: bool,
    error_code: i32,
    info: Value,
}

impl FakeDevice {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            klap: true,
            passthrough: false,
            error_code: 0,
            info: json!({
                "device_id": "80223C6A2A1B",
                "mac": "6C-5A-B0-01-02-0F",
                "model": "P110",
                "type": "SMART.TAPOPLUG",
                "fw_ver": "1.3.0 Build 230905 Rel.152200",
                "hw_ver": "1.0",
                "nickname": STANDARD.encode("Kitchen Plug"),
                "ssid": STANDARD.encode("HomeNet"),
                "device_on": false,
                "on_time": 0,
                "rssi": -48,
                "signal_level": 3,
                "region": "Europe/Berlin",
                "has_set_location_info": false
            }),
        }
    }

    /// Answer handshake1 with 404 like pre-KLAP firmware.
    pub fn without_klap(mut self) -> Self {
        self.klap = false;
        self
    }

    /// Answer secure passthrough calls on `POST /app`.
    pub fn with_passthrough(mut self) -> Self {
        self.passthrough = true;
        self
    }

    pub fn with_error_code(mut self, code: i32) -> Self {
        self.error_code = code;
        self
    }

    pub fn with_info(mut self, info: Value) -> Self {
        self.info = info;
        self
    }

    /// Start serving and return the port.
    pub async fn spawn(self) -> u16 {
        let state = Arc::new(DeviceState {
            auth_hash: klap::auth_hash(&self.credentials),
            login: passthrough::login_params(&self.credentials),
            klap: self.klap,
            passthrough: self.passthrough,
            error_code: self.error_code,
            info: self.info,
            sessions: Mutex::new(HashMap::new()),
            legacy_sessions: Mutex::new(HashMap::new()),
        });

        let app = Router::new()
            .route("/", get(banner))
            .route("/app", post(secure_passthrough))
            .route("/app/handshake1", post(handshake1))
            .route("/app/handshake2", post(handshake2))
            .route("/app/request", post(request))
            .with_state(state);

        let listener = TcpListener::bind((IpAddr::V4(Ipv4Addr::LOCALHOST), 0))
            .await
            .unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        port
    }
}

async fn banner() -> impl IntoResponse {
    ([(header::SERVER, "SHIP 2.0")], "")
}

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .find_map(|part| part.trim().strip_prefix("TP_SESSIONID="))
        .map(str::to_string)
}

async fn handshake1(State(state): State<Arc<DeviceState>>, body: Bytes) -> Response {
    if !state.klap {
        return StatusCode::NOT_FOUND.into_response();
    }
    if body.len() != SEED_LEN {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let remote_seed: [u8; SEED_LEN] = rand::random();
    let id = uuid::Uuid::new_v4().simple().to_string();
    let mut payload = remote_seed.to_vec();
    payload.extend_from_slice(&klap::server_proof(&body, &remote_seed, &state.auth_hash));

    state.sessions.lock().unwrap().insert(
        id.clone(),
        Session {
            local_seed: body.to_vec(),
            remote_seed,
            established: false,
        },
    );

    (
        [(header::SET_COOKIE, format!("TP_SESSIONID={};TIMEOUT=86400", id))],
        payload,
    )
        .into_response()
}

async fn handshake2(
    State(state): State<Arc<DeviceState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let Some(id) = session_id(&headers) else {
        return StatusCode::FORBIDDEN;
    };
    let mut sessions = state.sessions.lock().unwrap();
    let Some(session) = sessions.get_mut(&id) else {
        return StatusCode::FORBIDDEN;
    };

    let expected = klap::client_proof(&session.local_seed, &session.remote_seed, &state.auth_hash);
    if body[..] != expected[..] {
        return StatusCode::FORBIDDEN;
    }
    session.established = true;
    StatusCode::OK
}

async fn request(
    State(state): State<Arc<DeviceState>>,
    Query(query): Query<SeqQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let cipher = {
        let sessions = state.sessions.lock().unwrap();
        match session_id(&headers).and_then(|id| sessions.get(&id)) {
            Some(session) if session.established => {
                KlapCipher::new(&session.local_seed, &session.remote_seed, &state.auth_hash)
            }
            _ => return StatusCode::FORBIDDEN.into_response(),
        }
    };

    let Ok(plaintext) = cipher.open(query.seq, &body) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let Ok(call) = serde_json::from_slice::<Value>(&plaintext) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    let reply = state.reply(call["method"].as_str());

    cipher
        .seal(query.seq, reply.to_string().as_bytes())
        .into_response()
}

fn seal_session_key(public_pem: &str, material: &[u8]) -> Option<String> {
    let public = RsaPublicKey::from_public_key_pem(public_pem).ok()?;
    let sealed = public
        .encrypt(&mut rand::thread_rng(), Pkcs1v15Encrypt, material)
        .ok()?;
    Some(STANDARD.encode(sealed))
}

async fn secure_passthrough(
    State(state): State<Arc<DeviceState>>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !state.passthrough {
        return StatusCode::NOT_FOUND.into_response();
    }
    let Ok(call) = serde_json::from_slice::<Value>(&body) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    match call["method"].as_str() {
        Some("handshake") => {
            let material: [u8; KEY_MATERIAL_LEN] = rand::random();
            let Some(key) = call["params"]["key"]
                .as_str()
                .and_then(|pem| seal_session_key(pem, &material))
            else {
                return Json(json!({ "error_code": -1010 })).into_response();
            };
            let Ok(cipher) = PassthroughCipher::from_material(&material) else {
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            };

            let id = uuid::Uuid::new_v4().simple().to_string();
            state
                .legacy_sessions
                .lock()
                .unwrap()
                .insert(id.clone(), LegacySession { cipher, token: None });

            (
                [(header::SET_COOKIE, format!("TP_SESSIONID={};TIMEOUT=1440", id))],
                Json(json!({ "error_code": 0, "result": { "key": key } })),
            )
                .into_response()
        }
        Some("securePassthrough") => {
            let mut sessions = state.legacy_sessions.lock().unwrap();
            let session = match session_id(&headers) {
                Some(id) => sessions.get_mut(&id),
                None => None,
            };
            let Some(session) = session else {
                return StatusCode::FORBIDDEN.into_response();
            };
            let Some(inner) = call["params"]["request"]
                .as_str()
                .and_then(|request| session.cipher.decrypt(request).ok())
                .and_then(|plain| serde_json::from_slice::<Value>(&plain).ok())
            else {
                return Json(json!({ "error_code": -1003 })).into_response();
            };

            let reply = match inner["method"].as_str() {
                Some("login_device") => {
                    let (username, password) = &state.login;
                    if inner["params"]["username"] == username.as_str()
                        && inner["params"]["password"] == password.as_str()
                    {
                        let token = uuid::Uuid::new_v4().simple().to_string();
                        session.token = Some(token.clone());
                        json!({ "error_code": 0, "result": { "token": token } })
                    } else {
                        json!({ "error_code": -1501 })
                    }
                }
                method if session.token.is_some() && session.token == query.token => {
                    state.reply(method)
                }
                _ => json!({ "error_code": 9999 }),
            };

            let response = session.cipher.encrypt(reply.to_string().as_bytes());
            Json(json!({ "error_code": 0, "result": { "response": response } })).into_response()
        }
        _ => Json(json!({ "error_code": -1002 })).into_response(),
    }
}
