use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use beacon_types::{Slot, StateId};
use beacon_validator_resolution::{QueryService, ValidatorQueryError};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::validators;

#[derive(Clone)]
pub struct AppState {
    pub queries: QueryService,
    pub start_time: Instant,
    pub node_id: String,
    pub req_count: Arc<AtomicUsize>,
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new<S: Into<String>>(node_id: S, queries: QueryService) -> Self {
        Self {
            queries,
            start_time: Instant::now(),
            node_id: node_id.into(),
            req_count: Arc::new(AtomicUsize::new(0)),
            prometheus: None,
        }
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    pub(crate) fn record_request(&self) -> u64 {
        self.req_count.fetch_add(1, Ordering::Relaxed) as u64 + 1
    }

    fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

pub(crate) type SharedState = Arc<AppState>;

/// JSON envelope for successful query responses.
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub data: T,
}

impl<T> DataResponse<T> {
    pub(crate) fn json(data: T) -> Json<Self> {
        Json(Self { data })
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    node_id: String,
    uptime_secs: u64,
    head_slot: Option<Slot>,
    req_total: u64,
}

#[derive(Debug, Serialize)]
struct VersionResponse {
    node_id: String,
    version: &'static str,
    commit: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: u16,
    message: String,
}

#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new<S: Into<String>>(status: StatusCode, message: S) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub(crate) fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub(crate) fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub(crate) fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Label used for the request counter.
    pub(crate) fn outcome(&self) -> &'static str {
        match self.status {
            StatusCode::BAD_REQUEST => "invalid",
            StatusCode::NOT_FOUND => "not_found",
            _ => "error",
        }
    }
}

impl From<ValidatorQueryError> for ApiError {
    fn from(err: ValidatorQueryError) -> Self {
        if err.is_client_error() {
            Self::bad_request(err.to_string())
        } else if err.is_not_found() {
            Self::not_found(err.to_string())
        } else {
            warn!("Validator query failed: {}", err);
            Self::internal(err.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = Json(ErrorResponse {
            code: self.status.as_u16(),
            message: self.message,
        });
        (self.status, payload).into_response()
    }
}

pub async fn start_server(state: AppState, addr: &str) -> Result<()> {
    let app = build_router(state);
    let listener = bind_listener(addr).await?;
    info!("Beacon API listening on {}", addr);
    axum::serve(listener, app)
        .await
        .context("RPC server terminated unexpectedly")
}

async fn bind_listener(addr: &str) -> Result<tokio::net::TcpListener> {
    if let Ok(socket_addr) = addr.parse::<SocketAddr>() {
        tokio::net::TcpListener::bind(socket_addr)
            .await
            .with_context(|| format!("failed to bind RPC listener on {socket_addr}"))
    } else {
        tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind RPC listener on {addr}"))
    }
}

pub fn build_router(state: AppState) -> Router {
    let shared: SharedState = Arc::new(state);
    Router::new()
        .route("/health", get(handle_health))
        .route("/version", get(handle_version))
        .route("/metrics", get(handle_metrics))
        .merge(validators::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

async fn handle_health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let req_total = state.record_request();
    let head_slot = match state.queries.resolver().resolve(&StateId::Head).await {
        Ok(head) => head.map(|head| head.slot()),
        Err(err) => {
            warn!("Health check could not load head state: {}", err);
            None
        }
    };

    Json(HealthResponse {
        status: if head_slot.is_some() { "ok" } else { "degraded" },
        node_id: state.node_id.clone(),
        uptime_secs: state.uptime_seconds(),
        head_slot,
        req_total,
    })
}

async fn handle_version(State(state): State<SharedState>) -> Json<VersionResponse> {
    state.record_request();
    Json(VersionResponse {
        node_id: state.node_id.clone(),
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GIT_COMMIT_HASH").unwrap_or("unknown"),
    })
}

async fn handle_metrics(State(state): State<SharedState>) -> Response {
    let req_total = state.record_request();
    let uptime = state.uptime_seconds();

    let mut metrics =
        "# HELP beacon_http_requests_total Total number of HTTP requests handled\n".to_string();
    metrics.push_str("# TYPE beacon_http_requests_total counter\n");
    metrics.push_str(&format!("beacon_http_requests_total {req_total}\n"));
    metrics.push_str("# HELP beacon_uptime_seconds Uptime of the node in seconds\n");
    metrics.push_str("# TYPE beacon_uptime_seconds gauge\n");
    metrics.push_str(&format!("beacon_uptime_seconds {uptime}\n"));

    if let Some(handle) = &state.prometheus {
        metrics.push_str(&handle.render());
    }

    let mut response = Response::new(Body::from(metrics));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    response
}
