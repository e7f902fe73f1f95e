//! Caching Proxy Server
//!
//! Exposes the worker over HTTP. Every request that is not an admin route is
//! turned into a fetch event against the configured origin, so the browser
//! (or any client) talks to the proxy and gets cache-backed answers.
//!
//! Admin routes:
//! - `GET  /_worker/status`     lifecycle state, pending sync tasks, cache stats
//! - `POST /_worker/sync/:tag`  signal a background sync tag
//! - `POST /_worker/push`       deliver a push payload (request body)
//! - `POST /_worker/message`    post a client message, e.g. `{"type":"SKIP_WAITING"}`

use crate::background::{Notification, SyncReport, SyncTag};
use crate::cache::CacheStatsSnapshot;
use crate::error::{Error, Result};
use crate::http::{FetchRequest, FetchResponse, Method, RequestMode};
use crate::network::is_hop_by_hop;
use crate::worker::{EventOutcome, EventRouter, OfflineWorker, WorkerEvent, WorkerMessage};
use axum::{
    body::{to_bytes, Bytes},
    extract::{Path, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use reqwest::Url;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

// =============================================================================
// Server Configuration
// =============================================================================

/// Configuration for the proxy server
#[derive(Debug, Clone)]
pub struct ProxyServerConfig {
    /// Bind address
    pub addr: SocketAddr,
    /// Largest request body accepted
    pub max_body_bytes: usize,
}

impl Default for ProxyServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8088)),
            max_body_bytes: 10 * 1024 * 1024, // 10MB
        }
    }
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatusResponse {
    pub version: String,
    pub state: String,
    pub skip_waiting: bool,
    pub clients_claimed: bool,
    pub pending_sync: BTreeMap<String, usize>,
    pub hit_ratio: f64,
    pub stats: CacheStatsSnapshot,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
}

fn api_error(status: StatusCode, error: &str, message: impl ToString) -> Response {
    (
        status,
        Json(ApiErrorResponse {
            error: error.into(),
            message: message.to_string(),
        }),
    )
        .into_response()
}

// =============================================================================
// Request Conversion
// =============================================================================

/// Build a fetch request for `uri` against the origin
///
/// Navigation is detected from `Sec-Fetch-Mode`, falling back to an
/// `Accept: text/html` GET for clients that do not send fetch metadata.
pub fn to_fetch_request(
    origin: &Url,
    method: &axum::http::Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<FetchRequest> {
    let method = Method::parse(method.as_str())
        .ok_or_else(|| Error::InvalidRequest(format!("Unsupported method {}", method)))?;

    let target = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let url = origin
        .join(target)
        .map_err(|e| Error::InvalidRequest(format!("Invalid target {}: {}", target, e)))?;
    if url.origin() != origin.origin() {
        return Err(Error::InvalidRequest(format!(
            "Target {} leaves the origin",
            target
        )));
    }

    let mut request = FetchRequest::from_url(method, url).with_body(body);
    for (name, value) in headers {
        if is_hop_by_hop(name.as_str()) || *name == header::HOST {
            continue;
        }
        if let Ok(value) = value.to_str() {
            request = request.with_header(name.as_str(), value);
        }
    }

    let navigate = match request.header("sec-fetch-mode") {
        Some(mode) => mode == "navigate",
        None => {
            request.is_get()
                && request
                    .header("accept")
                    .map(|a| a.contains("text/html"))
                    .unwrap_or(false)
        }
    };
    if navigate {
        request = request.with_mode(RequestMode::Navigate);
    }
    Ok(request)
}

/// Convert a worker response into an HTTP response
pub fn to_http_response(response: FetchResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut headers = HeaderMap::new();
    for (name, value) in &response.headers {
        if is_hop_by_hop(name) || name == "content-length" {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(name, value);
        }
    }
    (status, headers, response.body).into_response()
}

// =============================================================================
// Router
// =============================================================================

#[derive(Clone)]
struct ProxyState {
    worker: Arc<OfflineWorker>,
    events: Arc<EventRouter>,
    origin: Url,
    max_body_bytes: usize,
}

/// Build the proxy router for a worker
pub fn build_router(worker: Arc<OfflineWorker>, max_body_bytes: usize) -> Result<Router> {
    let state = ProxyState {
        origin: worker.config().origin_url()?,
        events: Arc::new(EventRouter::new(worker.clone())),
        worker,
        max_body_bytes,
    };

    Ok(Router::new()
        .route("/_worker/status", get(worker_status))
        .route("/_worker/sync/:tag", post(trigger_sync))
        .route("/_worker/push", post(trigger_push))
        .route("/_worker/message", post(post_message))
        .fallback(proxy)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

async fn proxy(State(state): State<ProxyState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = match to_bytes(body, state.max_body_bytes).await {
        Ok(body) => body,
        Err(e) => return api_error(StatusCode::PAYLOAD_TOO_LARGE, "body_too_large", e),
    };

    let fetch = match to_fetch_request(&state.origin, &parts.method, &parts.uri, &parts.headers, body) {
        Ok(fetch) => fetch,
        Err(e) => return api_error(StatusCode::BAD_REQUEST, "invalid_request", e),
    };

    let url = fetch.url.clone();
    match state.events.dispatch(WorkerEvent::Fetch(fetch)).await {
        Ok(EventOutcome::Response(response)) => to_http_response(response),
        Ok(other) => {
            error!(url = %url, outcome = ?other, "Fetch produced no response");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", "fetch produced no response")
        }
        Err(e) => {
            warn!(url = %url, error = %e, "Upstream fetch failed");
            api_error(StatusCode::BAD_GATEWAY, "upstream_unavailable", e)
        }
    }
}

async fn worker_status(State(state): State<ProxyState>) -> impl IntoResponse {
    let worker = &state.worker;
    let stats = worker.dispatcher().stats();
    let pending_sync = SyncTag::ALL
        .iter()
        .map(|tag| (tag.to_string(), worker.sync_queue().pending(*tag)))
        .collect();

    Json(WorkerStatusResponse {
        version: worker.version_tag().to_string(),
        state: worker.state().to_string(),
        skip_waiting: worker.is_skip_waiting(),
        clients_claimed: worker.clients_claimed(),
        pending_sync,
        hit_ratio: stats.hit_ratio(),
        stats,
    })
}

async fn trigger_sync(State(state): State<ProxyState>, Path(tag): Path<String>) -> Response {
    info!(tag = %tag, "Sync signalled");
    match state.events.dispatch(WorkerEvent::Sync(tag)).await {
        Ok(EventOutcome::Synced(report)) => Json::<SyncReport>(report).into_response(),
        Ok(_) => Json(SyncReport::default()).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, "sync_failed", e),
    }
}

async fn trigger_push(State(state): State<ProxyState>, body: Bytes) -> Response {
    let payload = Some(body).filter(|b| !b.is_empty());
    match state.events.dispatch(WorkerEvent::Push(payload)).await {
        Ok(EventOutcome::Notified(notification)) => {
            Json::<Option<Notification>>(notification).into_response()
        }
        Ok(_) => Json(Option::<Notification>::None).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, "push_failed", e),
    }
}

async fn post_message(State(state): State<ProxyState>, body: Bytes) -> Response {
    let message = match WorkerMessage::parse(&body) {
        Ok(message) => message,
        Err(e) => return api_error(StatusCode::BAD_REQUEST, "invalid_message", e),
    };
    match state.events.dispatch(WorkerEvent::Message(message)).await {
        Ok(_) => StatusCode::ACCEPTED.into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, "message_failed", e),
    }
}

// =============================================================================
// Proxy Server
// =============================================================================

/// HTTP front end for the worker
pub struct ProxyServer {
    config: ProxyServerConfig,
    worker: Arc<OfflineWorker>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ProxyServer {
    pub fn new(config: ProxyServerConfig, worker: Arc<OfflineWorker>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            worker,
            shutdown_tx,
        }
    }

    /// Serve until shutdown is triggered
    pub async fn run(&self) -> Result<()> {
        let app = build_router(self.worker.clone(), self.config.max_body_bytes)?;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let listener = tokio::net::TcpListener::bind(self.config.addr)
            .await
            .map_err(|e| Error::Internal(format!("Failed to bind proxy server: {}", e)))?;
        info!(addr = %self.config.addr, origin = %self.worker.config().origin, "Proxy listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Proxy server shutting down");
            })
            .await
            .map_err(|e| Error::Internal(format!("Proxy server error: {}", e)))?;

        Ok(())
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}
