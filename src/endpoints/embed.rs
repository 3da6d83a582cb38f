//!
//! OpenAI embeddings endpoint.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use tracing::debug;

use crate::convert::argo;
use crate::error::{ProxyError, Result};
use crate::models::ModelKind;
use crate::server::{AppState, ProxyMode, finish_request, parse_json_body, post_upstream};

/* --- handlers --------------------------------------------------------------------------------- */

///
/// Handle `POST /v1/embeddings`.
pub async fn embeddings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let result = process_embeddings(state.clone(), &headers, &body).await;
    finish_request(&state, result)
}

///
/// Validate, resolve the embedding model, and translate both directions.
async fn process_embeddings(
    state: Arc<AppState>,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Response> {
    let data = parse_json_body(&state, headers, body)?;
    let map = data
        .as_object()
        .ok_or_else(|| ProxyError::BadRequest("request body must be a JSON object".into()))?;

    let model = map
        .get("model")
        .and_then(Value::as_str)
        .ok_or_else(|| ProxyError::BadRequest("Missing required field: model".into()))?;
    let input = map
        .get("input")
        .ok_or_else(|| ProxyError::BadRequest("Missing required field: input".into()))?;

    match state.mode {
        ProxyMode::Dev => {
            return super::chat::passthrough(&state, &state.config.embed_url(), &data, headers, false)
                .await;
        }
        ProxyMode::NativeOpenAi => {
            let url = native_openai_url(&state, "/embeddings")?;
            return super::chat::passthrough(&state, &url, &data, headers, false).await;
        }
        _ => {}
    }

    let internal = state.registry.resolve(model, ModelKind::Embed);
    debug!("Resolved embedding model '{}' -> '{}'", model, internal);

    let argo_body = argo::embed_request_to_argo(input, &internal, &state.config.argo.user)?;
    let response = post_upstream(&state, &state.config.embed_url(), &argo_body, headers).await?;
    let body: Value = response
        .json()
        .await
        .map_err(|e| ProxyError::UpstreamInvalidResponse(e.to_string()))?;

    let wire = argo::embed_response_to_openai(&body, model)?;
    Ok(Json(wire).into_response())
}

///
/// Native OpenAI upstream URL for a given path suffix.
pub(super) fn native_openai_url(state: &AppState, suffix: &str) -> Result<String> {
    state
        .config
        .passthrough
        .openai_base_url
        .as_deref()
        .map(|base| format!("{}{}", base.trim_end_matches('/'), suffix))
        .ok_or_else(|| ProxyError::Config("passthrough.openai_base_url is not configured".into()))
}
