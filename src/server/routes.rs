//! HTTP endpoints over the repository and the import pipeline.

use crate::import::ImportPipeline;
use crate::storage::{DeviceFilter, SharedRepository};
use crate::types::{ImportId, RangeSpec};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Prefix every endpoint is mounted under.
pub const API_PREFIX: &str = "/api";

/// Registered endpoints as (method, path below [`API_PREFIX`]).
pub const ROUTES: &[(&str, &str)] = &[("GET", "/devices"), ("POST", "/import_devices")];

const DEFAULT_PAGE: i64 = 1;
const DEFAULT_PAGE_SIZE: i64 = 10;

/// State shared by the handlers.
#[derive(Clone)]
pub struct ApiState {
    pub repository: SharedRepository,
    pub pipeline: Arc<ImportPipeline>,
    /// Cancelled on shutdown; background imports run under child tokens.
    pub shutdown: CancellationToken,
}

/// Query of `GET /devices`. Paging values that are not integers fall back
/// to the defaults instead of rejecting the request.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    page: Option<String>,
    page_size: Option<String>,
    state: Option<String>,
}

impl ListParams {
    fn page(&self) -> i64 {
        int_or(self.page.as_deref(), DEFAULT_PAGE)
    }

    fn page_size(&self) -> i64 {
        int_or(self.page_size.as_deref(), DEFAULT_PAGE_SIZE)
    }
}

fn int_or(value: Option<&str>, default: i64) -> i64 {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Build the router with every endpoint under `/api`.
pub fn router(state: ApiState) -> Router {
    let api = Router::new()
        .route("/devices", get(list_devices))
        .route("/import_devices", post(import_devices));

    Router::new()
        .nest(API_PREFIX, api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

async fn list_devices(State(state): State<ApiState>, Query(params): Query<ListParams>) -> Response {
    let page = params.page();
    let page_size = params.page_size();

    let mut filter = DeviceFilter::new();
    if let Some(device_state) = params.state.filter(|s| !s.is_empty()) {
        filter = filter.state(device_state);
    }

    match state.repository.list(page, page_size, &filter).await {
        Ok(devices) => Json(devices).into_response(),
        Err(e) => {
            error!(error = %e, "listing devices failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Validate the range, then run the import in the background.
async fn import_devices(State(state): State<ApiState>, body: Bytes) -> Response {
    let ip_range = serde_json::from_slice::<Value>(&body)
        .ok()
        .and_then(|body| body.get("ip_range").and_then(Value::as_str).map(str::to_string))
        .filter(|range| !range.trim().is_empty());

    let Some(ip_range) = ip_range else {
        return error_response(StatusCode::BAD_REQUEST, "ip_range is required");
    };

    let range = match RangeSpec::parse(&ip_range) {
        Ok(range) => range,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, format!("invalid ip_range: {}", e))
        }
    };

    let import_id = ImportId::new();
    let pipeline = Arc::clone(&state.pipeline);
    let cancel = state.shutdown.child_token();
    info!(id = %import_id.short(), range = %range, "import accepted");

    tokio::spawn(async move {
        if let Err(e) = pipeline.import(&range, import_id, &cancel).await {
            error!(id = %import_id.short(), error = %e, "import failed");
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(json!({
            "message": format!("Import of IP range {} started.", ip_range),
            "import_id": import_id,
        })),
    )
        .into_response()
}
