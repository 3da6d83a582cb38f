//!
//! OpenAI chat completions and legacy completions endpoints.
//!
//! Pipeline per request: validate, inline images, convert to IR, resolve
//! the model alias, rewrite tools for the target family, emit the Argo
//! body, post upstream, and rebuild the OpenAI response. Streaming requests
//! go to Argo's streaming path and are re-emitted as chat chunks; when the
//! upstream answers with a buffered JSON body instead, the response is
//! pseudo-streamed so the client still sees the SSE sequence it asked for.
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
use axum::response::sse::Event;
use axum::response::{IntoResponse, Response, Sse};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info};

use crate::convert::{argo, openai};
use crate::error::{ProxyError, Result};
use crate::images;
use crate::ir::{IrRequest, IrResponse, Usage};
use crate::models::{ModelFamily, ModelKind};
use crate::server::{AppState, ProxyMode, finish_request, parse_json_body, post_upstream};
use crate::stream::{
    STREAMING_CHANNEL_BUFFER, StreamDecoder, chat_chunk, pseudo_stream_chat, send_sse_json,
    send_stream_done,
};
use crate::tools::{input as tool_input, output as tool_output};

/* --- handlers --------------------------------------------------------------------------------- */

///
/// Handle `POST /v1/chat/completions`.
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let result = process_chat(state.clone(), &headers, &body, ChatFlavor::Chat).await;
    finish_request(&state, result)
}

///
/// Handle `POST /v1/completions` (legacy prompt API).
pub async fn completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let result = process_chat(state.clone(), &headers, &body, ChatFlavor::Legacy).await;
    finish_request(&state, result)
}

///
/// Which OpenAI chat surface the request came in on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChatFlavor {
    Chat,
    Legacy,
}

/* --- pipeline --------------------------------------------------------------------------------- */

///
/// End-to-end chat pipeline shared by both OpenAI surfaces.
async fn process_chat(
    state: Arc<AppState>,
    headers: &HeaderMap,
    body: &Bytes,
    flavor: ChatFlavor,
) -> Result<Response> {
    let mut data = parse_json_body(&state, headers, body)?;
    validate_chat_request(&data, flavor)?;

    if matches!(state.mode, ProxyMode::NativeOpenAi | ProxyMode::Dev) {
        let url = passthrough_chat_url(&state)?;
        let stream = data.get("stream").and_then(Value::as_bool).unwrap_or(false);
        return passthrough(&state, &url, &data, headers, stream).await;
    }

    if state.config.server.verbose {
        info!("[chat] input: {}", images::sanitize_for_logging(&data));
    }

    images::process_chat_images(&state.session, &mut data).await;

    let mut ir = openai::request_to_ir(&data)?;
    let requested_model =
        ir.model.clone().unwrap_or_else(|| crate::models::DEFAULT_CHAT_MODEL.to_string());
    let internal = state.registry.resolve(&requested_model, ModelKind::Chat);
    let family = state.registry.family_of(&internal);
    debug!("Resolved model '{}' -> '{}' ({})", requested_model, internal, family.as_str());

    tool_input::rewrite_tools(&mut ir, family, state.config.tools.native_tools);

    let stream_requested = ir.stream.unwrap_or(false);
    let argo_body = argo::ir_request_to_argo(&ir, &internal, family, &state.config.argo.user)?;

    if state.config.server.verbose {
        info!("[chat] upstream body: {}", images::sanitize_for_logging(&argo_body));
    }

    if stream_requested {
        stream_chat(&state, headers, &argo_body, &ir, &internal, family).await
    } else {
        let response = post_upstream(&state, &state.config.chat_url(), &argo_body, headers).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| ProxyError::UpstreamInvalidResponse(e.to_string()))?;
        let ir_response = upstream_body_to_ir(&state, &body, &ir, &internal, family)?;
        let wire = match flavor {
            ChatFlavor::Chat => openai::ir_response_to_wire(&ir_response)?,
            ChatFlavor::Legacy => openai::ir_response_to_completion_wire(&ir_response),
        };
        Ok(Json(wire).into_response())
    }
}

///
/// Validate the per-endpoint required fields.
fn validate_chat_request(data: &Value, flavor: ChatFlavor) -> Result<()> {
    let map = data
        .as_object()
        .ok_or_else(|| ProxyError::BadRequest("request body must be a JSON object".into()))?;

    if !map.contains_key("model") {
        return Err(ProxyError::BadRequest("Missing required field: model".into()));
    }
    match flavor {
        ChatFlavor::Chat => {
            match map.get("messages") {
                Some(Value::Array(_)) => Ok(()),
                Some(_) => Err(ProxyError::BadRequest("Field 'messages' must be a list".into())),
                None => Err(ProxyError::BadRequest("Missing required field: messages".into())),
            }
        }
        ChatFlavor::Legacy => match map.get("prompt") {
            Some(Value::String(_)) | Some(Value::Array(_)) => Ok(()),
            Some(_) => {
                Err(ProxyError::BadRequest("Field 'prompt' must be a string or list".into()))
            }
            None => Err(ProxyError::BadRequest("Missing required field: prompt".into())),
        },
    }
}

///
/// Normalise an Argo response body into an IR response.
///
/// Runs tool-call normalisation (including Gemini tag extraction and leaked
/// Claude tool recovery) and fills the usage block, estimating when the
/// upstream did not provide one.
fn upstream_body_to_ir(
    state: &AppState,
    body: &Value,
    request: &IrRequest,
    internal: &str,
    family: ModelFamily,
) -> Result<IrResponse> {
    let response_field = body
        .get("response")
        .ok_or_else(|| ProxyError::UpstreamInvalidResponse("missing 'response' field".into()))?;

    let normalized = tool_output::normalize_response(
        response_field,
        family,
        internal,
        &state.leak_logger,
        state.config.tools.enable_leaked_tool_fix,
    )?;

    let completion_text = normalized.text.clone().unwrap_or_default();
    let usage = argo::usage_from_body(body)
        .or_else(|| Some(estimate_usage(request, &completion_text)));

    let reported_model = request.model.clone().unwrap_or_else(|| internal.to_string());
    argo::build_ir_response(normalized.text, normalized.tool_calls, &reported_model, usage)
}

///
/// Rough token estimate when the upstream reports no usage.
///
/// The real tokenizer lives outside this service; one token per four
/// characters is the documented approximation.
fn estimate_usage(request: &IrRequest, completion: &str) -> Usage {
    let prompt_chars: usize = request.messages.iter().map(|m| m.joined_text().len()).sum();
    let prompt_tokens = (prompt_chars / 4) as u32;
    let completion_tokens = (completion.len() / 4) as u32;
    Usage {
        prompt_tokens,
        completion_tokens,
        total_tokens: prompt_tokens + completion_tokens,
    }
}

/* --- streaming -------------------------------------------------------------------------------- */

///
/// Handle a streaming chat request.
///
/// Posts to Argo's streaming path. A streaming upstream is decoded
/// UTF-8-safely and re-emitted chunk by chunk in order; an upstream that
/// answers with a buffered JSON body is normalised and pseudo-streamed.
async fn stream_chat(
    state: &Arc<AppState>,
    headers: &HeaderMap,
    argo_body: &Value,
    request: &IrRequest,
    internal: &str,
    family: ModelFamily,
) -> Result<Response> {
    let response = post_upstream(state, &state.config.stream_url(), argo_body, headers).await?;

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let (tx, rx) = mpsc::channel::<Result<Event>>(STREAMING_CHANNEL_BUFFER);

    if content_type.starts_with("application/json") {
        // Buffered upstream answer: replay it as a pseudo-stream.
        let body: Value = response
            .json()
            .await
            .map_err(|e| ProxyError::UpstreamInvalidResponse(e.to_string()))?;
        let ir_response = upstream_body_to_ir(state, &body, request, internal, family)?;
        tokio::spawn(pseudo_stream_chat(tx, ir_response));
    } else {
        let id = argo::generate_response_id();
        let created = chrono::Utc::now().timestamp();
        let model = request.model.clone().unwrap_or_else(|| internal.to_string());
        tokio::spawn(forward_live_stream(response, tx, id, created, model));
    }

    Ok(Sse::new(ReceiverStream::new(rx)).into_response())
}

///
/// Re-emit a live upstream text stream as OpenAI chat chunks.
///
/// Chunks are forwarded in upstream order; the UTF-8 decoder may defer up
/// to three trailing bytes to the next chunk. If the client disconnects the
/// channel closes and the upstream read stops at the next chunk.
async fn forward_live_stream(
    response: reqwest::Response,
    tx: mpsc::Sender<Result<Event>>,
    id: String,
    created: i64,
    model: String,
) {
    let mut upstream = response.bytes_stream();
    let mut decoder = StreamDecoder::new();

    send_sse_json(&tx, &chat_chunk(&id, created, &model, serde_json::json!({"role": "assistant"}), None))
        .await;

    while let Some(chunk) = upstream.next().await {
        match chunk {
            Ok(bytes) => {
                let text = decoder.decode(&bytes);
                if text.is_empty() {
                    continue;
                }
                let delta = serde_json::json!({"content": text});
                if tx.is_closed() {
                    debug!("Client disconnected mid-stream, dropping upstream read");
                    return;
                }
                send_sse_json(&tx, &chat_chunk(&id, created, &model, delta, None)).await;
            }
            Err(e) => {
                // Past the first byte the only option is to truncate.
                error!("Upstream stream error, truncating: {}", e);
                break;
            }
        }
    }

    let tail = decoder.flush();
    if !tail.is_empty() {
        let delta = serde_json::json!({"content": tail});
        send_sse_json(&tx, &chat_chunk(&id, created, &model, delta, None)).await;
    }

    send_sse_json(&tx, &chat_chunk(&id, created, &model, serde_json::json!({}), Some("stop"))).await;
    send_stream_done(&tx).await;
}

/* --- passthrough ------------------------------------------------------------------------------ */

///
/// Upstream URL for non-translating chat modes.
fn passthrough_chat_url(state: &AppState) -> Result<String> {
    match state.mode {
        ProxyMode::NativeOpenAi => state
            .config
            .passthrough
            .openai_base_url
            .clone()
            .map(|base| format!("{}/chat/completions", base.trim_end_matches('/')))
            .ok_or_else(|| {
                ProxyError::Config("passthrough.openai_base_url is not configured".into())
            }),
        ProxyMode::Dev => Ok(state.config.chat_url()),
        _ => Err(ProxyError::Internal("passthrough URL requested outside passthrough mode".into())),
    }
}

///
/// Forward a body unchanged and pipe the upstream answer back.
pub async fn passthrough(
    state: &AppState,
    url: &str,
    body: &Value,
    headers: &HeaderMap,
    stream: bool,
) -> Result<Response> {
    let response = post_upstream(state, url, body, headers).await?;

    if stream {
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/event-stream")
            .to_string();
        let stream = response.bytes_stream().map(|chunk| {
            chunk.map_err(|e| std::io::Error::other(e.to_string()))
        });
        let body = axum::body::Body::from_stream(stream);
        return Ok(([(axum::http::header::CONTENT_TYPE, content_type)], body).into_response());
    }

    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|e| ProxyError::UpstreamInvalidResponse(e.to_string()))?;
    Ok((axum::http::StatusCode::from_u16(status.as_u16()).unwrap_or_default(), Json(body))
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_chat_requires_model_and_messages() {
        assert!(validate_chat_request(&json!({"messages": []}), ChatFlavor::Chat).is_err());
        assert!(validate_chat_request(&json!({"model": "m"}), ChatFlavor::Chat).is_err());
        assert!(
            validate_chat_request(&json!({"model": "m", "messages": "no"}), ChatFlavor::Chat)
                .is_err()
        );
        assert!(
            validate_chat_request(&json!({"model": "m", "messages": []}), ChatFlavor::Chat).is_ok()
        );
    }

    #[test]
    fn test_validate_legacy_requires_prompt() {
        assert!(validate_chat_request(&json!({"model": "m"}), ChatFlavor::Legacy).is_err());
        assert!(
            validate_chat_request(&json!({"model": "m", "prompt": "hi"}), ChatFlavor::Legacy)
                .is_ok()
        );
        assert!(
            validate_chat_request(&json!({"model": "m", "prompt": ["a"]}), ChatFlavor::Legacy)
                .is_ok()
        );
        assert!(
            validate_chat_request(&json!({"model": "m", "prompt": 4}), ChatFlavor::Legacy).is_err()
        );
    }

    #[test]
    fn test_estimate_usage_quarters_chars() {
        let request = IrRequest {
            messages: vec![crate::ir::IrMessage::text(crate::ir::Role::User, "x".repeat(40))],
            ..Default::default()
        };
        let usage = estimate_usage(&request, &"y".repeat(20));
        assert_eq!(usage.prompt_tokens, 10);
        assert_eq!(usage.completion_tokens, 5);
        assert_eq!(usage.total_tokens, 15);
    }
}
