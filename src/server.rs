//!
//! HTTP server core: shared application state, routing, and the single
//! error-to-HTTP mapping point.
//!
//! All process-wide state (configuration, HTTP session, model registry,
//! leak and attack loggers) lives in [`AppState`], constructed once at
//! startup and passed explicitly to every handler. Converters and tool
//! handlers raise typed errors; only [`create_error_response`] turns them
//! into wire responses.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use tracing::error;

use crate::attack::AttackLogger;
use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::models::ModelRegistry;
use crate::session::HttpSession;
use crate::tools::leaked::LeakLogger;

/* --- types ----------------------------------------------------------------------------------- */

///
/// How the proxy treats inbound traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxyMode {
    /// Translate between client formats and the Argo dialect (normal mode)
    #[default]
    Translate,
    /// Forward OpenAI-format bodies unchanged to the native OpenAI upstream
    NativeOpenAi,
    /// Forward Anthropic-format bodies unchanged to the native upstream
    NativeAnthropic,
    /// Pure passthrough for development against a local upstream
    Dev,
}

///
/// Application state containing all process-wide dependencies.
pub struct AppState {
    /** application configuration */
    pub config: Config,
    /** proxy operating mode from the CLI */
    pub mode: ProxyMode,
    /** shared upstream HTTP session */
    pub session: HttpSession,
    /** aliased model registry */
    pub registry: ModelRegistry,
    /** leaked-tool-call log sink */
    pub leak_logger: LeakLogger,
    /** malformed-request log sink */
    pub attack_logger: AttackLogger,
    /** metrics for monitoring */
    pub metrics: AppMetrics,
}

///
/// Request counters exposed by the health endpoint.
#[derive(Debug, Default)]
pub struct AppMetrics {
    pub total_requests: AtomicU64,
    pub successful_requests: AtomicU64,
    pub failed_requests: AtomicU64,
}

/* --- start of code -------------------------------------------------------------------------- */

impl AppState {
    ///
    /// Create the application state with all dependencies.
    ///
    /// # Arguments
    ///  * `config` - loaded application configuration
    ///  * `mode` - proxy operating mode
    ///
    /// # Returns
    ///  * Initialized state
    ///  * `ProxyError::Config` if the HTTP session cannot be built
    pub fn new(config: Config, mode: ProxyMode) -> Result<Self> {
        let session = HttpSession::new(&config.session)?;
        let leak_logger = LeakLogger::new(config.log_dir("leaked_tool_calls"));
        let attack_logger = AttackLogger::new(config.log_dir("attack_logs"));

        Ok(Self {
            config,
            mode,
            session,
            registry: ModelRegistry::new(),
            leak_logger,
            attack_logger,
            metrics: AppMetrics::default(),
        })
    }
}

/* --- shared request plumbing ------------------------------------------------------------------ */

///
/// Best-effort remote address for log records.
pub fn remote_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').next().unwrap_or(v).trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

///
/// Parse a request body as JSON, recording malformed input as an attack.
///
/// # Arguments
///  * `state` - application state (for the attack logger)
///  * `headers` - request headers (remote address extraction)
///  * `body` - raw request bytes
///
/// # Returns
///  * Parsed JSON value
///  * `ProxyError::BadRequest` on invalid JSON
pub fn parse_json_body(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<Value> {
    serde_json::from_slice(body).map_err(|e| {
        let raw = String::from_utf8_lossy(body);
        state.attack_logger.log_attack(&remote_ip(headers), &raw, "InvalidJson", &e.to_string());
        ProxyError::BadRequest(format!("Invalid JSON body: {}", e))
    })
}

///
/// POST a JSON body to an upstream URL, forwarding credential headers.
///
/// Forwards `Authorization`, `x-api-key` and `anthropic-version` when the
/// client supplied them. Non-2xx upstream responses become
/// [`ProxyError::UpstreamRejected`] with the upstream body embedded.
///
/// # Arguments
///  * `state` - application state (shared session)
///  * `url` - upstream URL
///  * `body` - JSON body to send
///  * `headers` - inbound request headers to forward credentials from
pub async fn post_upstream(
    state: &AppState,
    url: &str,
    body: &Value,
    headers: &HeaderMap,
) -> Result<reqwest::Response> {
    let mut request = state
        .session
        .client()
        .post(url)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .json(body);

    for name in ["authorization", "x-api-key", "anthropic-version"] {
        if let Some(value) = headers.get(name) {
            if let Ok(value) = value.to_str() {
                request = request.header(name, value);
            }
        }
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
        error!("Upstream rejected request ({}): {}", status, body);
        return Err(ProxyError::UpstreamRejected { status: status.as_u16(), body });
    }
    Ok(response)
}

///
/// Map a typed error to its HTTP response.
///
/// This is the only place where [`ProxyError`] becomes a wire response.
pub fn create_error_response(error: &ProxyError) -> Response {
    let (status, error_type) = match error {
        ProxyError::BadRequest(_)
        | ProxyError::UnsupportedContent(_)
        | ProxyError::UnsupportedImageSource(_) => {
            (StatusCode::BAD_REQUEST, "invalid_request_error")
        }
        ProxyError::UpstreamUnavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "upstream_unavailable")
        }
        ProxyError::UpstreamRejected { .. } => (StatusCode::BAD_GATEWAY, "upstream_api_error"),
        ProxyError::UpstreamInvalidResponse(_) => (StatusCode::BAD_GATEWAY, "upstream_invalid_json"),
        ProxyError::UpstreamEmpty => (StatusCode::BAD_GATEWAY, "upstream_no_response"),
        ProxyError::Cancelled => {
            // The client is gone; nothing useful can be written.
            return StatusCode::from_u16(499)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
                .into_response();
        }
        ProxyError::Config(_) | ProxyError::Serialization(_) | ProxyError::Internal(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
        }
    };

    let message = match error {
        ProxyError::UpstreamEmpty => {
            "Upstream model returned no response. Please try different request parameters."
                .to_string()
        }
        ProxyError::Internal(_) | ProxyError::Serialization(_) | ProxyError::Config(_) => {
            "An internal error occurred while processing the request.".to_string()
        }
        other => other.to_string(),
    };

    let envelope = json!({
        "object": "error",
        "message": message,
        "type": error_type,
    });

    (status, Json(envelope)).into_response()
}

///
/// Wrap a handler result, bumping the success/failure metrics.
pub fn finish_request(state: &AppState, result: Result<Response>) -> Response {
    state.metrics.total_requests.fetch_add(1, Ordering::Relaxed);
    match result {
        Ok(response) => {
            state.metrics.successful_requests.fetch_add(1, Ordering::Relaxed);
            response
        }
        Err(e) => {
            state.metrics.failed_requests.fetch_add(1, Ordering::Relaxed);
            create_error_response(&e)
        }
    }
}

/* --- model endpoints -------------------------------------------------------------------------- */

///
/// Handle `GET /v1/models`: the registry as an OpenAI model list.
pub async fn models(State(state): State<Arc<AppState>>) -> Json<Value> {
    let created = chrono::Utc::now().timestamp();
    let data: Vec<Value> = state
        .registry
        .list()
        .into_iter()
        .map(|entry| {
            json!({
                "id": entry.alias_key,
                "object": "model",
                "created": created,
                "owned_by": entry.family.as_str(),
            })
        })
        .collect();

    Json(json!({"object": "list", "data": data}))
}

///
/// Handle `POST /v1/models/refresh`: re-fetch the upstream catalogue.
///
/// A failed refresh keeps the previous registry and reports non-fatally.
pub async fn models_refresh(State(state): State<Arc<AppState>>) -> Json<Value> {
    match state.registry.refresh(state.session.client(), &state.config.models_url()).await {
        Ok(count) => Json(json!({
            "object": "refresh",
            "success": true,
            "message": format!("Model catalogue refreshed: {} models", count),
            "models": count,
        })),
        Err(e) => Json(json!({
            "object": "refresh",
            "success": false,
            "message": format!("Refresh failed, previous catalogue kept: {}", e),
        })),
    }
}

/* --- service endpoints ------------------------------------------------------------------------ */

///
/// Handle `GET /health`.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let total = state.metrics.total_requests.load(Ordering::Relaxed);
    let successful = state.metrics.successful_requests.load(Ordering::Relaxed);
    let failed = state.metrics.failed_requests.load(Ordering::Relaxed);

    Json(json!({
        "status": "ok",
        "mode": format!("{:?}", state.mode),
        "metrics": {
            "total_requests": total,
            "successful_requests": successful,
            "failed_requests": failed,
        }
    }))
}

///
/// Handle `GET /version`.
pub async fn version() -> Json<Value> {
    Json(json!({"name": "argomux", "version": env!("CARGO_PKG_VERSION")}))
}

///
/// Fallback for unmatched routes: classify and log, answer 404.
pub async fn fallback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: axum::extract::Request,
) -> Response {
    let raw = format!("{} {}", request.method(), request.uri());
    state.attack_logger.log_attack(&remote_ip(&headers), &raw, "UnknownRoute", "no such route");
    (
        StatusCode::NOT_FOUND,
        Json(json!({"object": "error", "message": "Not found", "type": "not_found"})),
    )
        .into_response()
}
