//!
//! Anthropic Messages endpoint.
//!
//! In translate mode the request is converted through the IR onto the Argo
//! dialect and the answer is rebuilt as an Anthropic Message; streaming
//! clients receive the Anthropic SSE event sequence replayed from the
//! buffered answer. Under `--native-anthropic` bodies are forwarded
//! unchanged (only `argo:` model aliases are resolved) with credential
//! headers and the `metadata.user_id` mirror applied.
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
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use crate::convert::{anthropic, argo};
use crate::error::{ProxyError, Result};
use crate::images;
use crate::ir::IrResponse;
use crate::models::ModelKind;
use crate::server::{AppState, ProxyMode, finish_request, parse_json_body, post_upstream};
use crate::stream::{PSEUDO_CHUNK_DELAY_MS, PSEUDO_CHUNK_SIZE, STREAMING_CHANNEL_BUFFER, chunk_text};
use crate::tools::{input as tool_input, output as tool_output};

/* --- handlers --------------------------------------------------------------------------------- */

///
/// Handle `POST /v1/messages`.
pub async fn messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let result = process_messages(state.clone(), &headers, &body).await;
    finish_request(&state, result)
}

async fn process_messages(
    state: Arc<AppState>,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Response> {
    let mut data = parse_json_body(&state, headers, body)?;
    validate_messages_request(&data)?;

    apply_user_identification(&mut data, &state.config.argo.user);

    if matches!(state.mode, ProxyMode::NativeAnthropic | ProxyMode::Dev) {
        return native_passthrough(&state, &mut data, headers).await;
    }

    if state.config.server.verbose {
        info!("[messages] input: {}", images::sanitize_for_logging(&data));
    }

    images::process_chat_images(&state.session, &mut data).await;

    let mut ir = anthropic::request_to_ir(&data)?;
    let requested_model =
        ir.model.clone().unwrap_or_else(|| crate::models::DEFAULT_CHAT_MODEL.to_string());
    let internal = state.registry.resolve(&requested_model, ModelKind::Chat);
    let family = state.registry.family_of(&internal);
    debug!("Resolved model '{}' -> '{}' ({})", requested_model, internal, family.as_str());

    tool_input::rewrite_tools(&mut ir, family, state.config.tools.native_tools);

    let stream_requested = ir.stream.unwrap_or(false);
    let argo_body = argo::ir_request_to_argo(&ir, &internal, family, &state.config.argo.user)?;

    let response = post_upstream(&state, &state.config.chat_url(), &argo_body, headers).await?;
    let body: Value = response
        .json()
        .await
        .map_err(|e| ProxyError::UpstreamInvalidResponse(e.to_string()))?;
    let response_field = body
        .get("response")
        .ok_or_else(|| ProxyError::UpstreamInvalidResponse("missing 'response' field".into()))?;

    let normalized = tool_output::normalize_response(
        response_field,
        family,
        &internal,
        &state.leak_logger,
        state.config.tools.enable_leaked_tool_fix,
    )?;
    let ir_response = argo::build_ir_response(
        normalized.text,
        normalized.tool_calls,
        &requested_model,
        argo::usage_from_body(&body),
    )?;

    if stream_requested {
        let (tx, rx) = mpsc::channel::<Result<Event>>(STREAMING_CHANNEL_BUFFER);
        tokio::spawn(pseudo_stream_anthropic(tx, ir_response));
        Ok(Sse::new(ReceiverStream::new(rx)).into_response())
    } else {
        Ok(Json(anthropic::ir_response_to_wire(&ir_response)?).into_response())
    }
}

///
/// Validate the Messages required fields.
fn validate_messages_request(data: &Value) -> Result<()> {
    let map = data
        .as_object()
        .ok_or_else(|| ProxyError::BadRequest("request body must be a JSON object".into()))?;
    if !map.contains_key("model") {
        return Err(ProxyError::BadRequest("Missing required field: model".into()));
    }
    match map.get("messages") {
        Some(Value::Array(_)) => Ok(()),
        Some(_) => Err(ProxyError::BadRequest("Field 'messages' must be a list".into())),
        None => Err(ProxyError::BadRequest("Missing required field: messages".into())),
    }
}

///
/// Inject the process user and mirror it to `metadata.user_id`.
fn apply_user_identification(data: &mut Value, user: &str) {
    let Some(map) = data.as_object_mut() else {
        return;
    };
    if !map.contains_key("user") {
        map.insert("user".into(), Value::String(user.to_string()));
    }
    let user_id = map.get("user").and_then(Value::as_str).unwrap_or(user).to_string();
    let metadata = map.entry("metadata").or_insert_with(|| json!({}));
    if let Some(metadata) = metadata.as_object_mut() {
        metadata.entry("user_id").or_insert(Value::String(user_id));
    }
}

/* --- native passthrough ----------------------------------------------------------------------- */

///
/// Forward the body unchanged to the native Anthropic upstream.
///
/// Only `argo:` aliases are resolved; other model names pass through as-is.
async fn native_passthrough(
    state: &AppState,
    data: &mut Value,
    headers: &HeaderMap,
) -> Result<Response> {
    let model = data.get("model").and_then(Value::as_str).map(str::to_string);
    if let Some(model) = model {
        if model.starts_with("argo:") {
            let resolved = state.registry.resolve(&model, ModelKind::Chat);
            info!("Resolved model alias: {} -> {}", model, resolved);
            data["model"] = Value::String(resolved);
        }
    }

    images::process_chat_images(&state.session, data).await;

    if let Some(Value::Array(_)) = data.get("tools") {
        // Native passthrough still honours the prompting rewrite for
        // families without native tool support.
        let family = data
            .get("model")
            .and_then(Value::as_str)
            .map(|m| state.registry.family_of(m))
            .unwrap_or(crate::models::ModelFamily::Anthropic);
        if matches!(family, crate::models::ModelFamily::Google | crate::models::ModelFamily::Unknown)
        {
            rewrite_passthrough_tools(data)?;
        }
    }

    let url = match state.mode {
        ProxyMode::Dev => state.config.chat_url(),
        _ => state.config.passthrough.anthropic_base_url.clone().ok_or_else(|| {
            ProxyError::Config("passthrough.anthropic_base_url is not configured".into())
        })?,
    };
    let stream = data.get("stream").and_then(Value::as_bool).unwrap_or(false);
    super::chat::passthrough(state, &url, data, headers, stream).await
}

///
/// Replace structured tools in an Anthropic-format body with the prompting
/// preamble, prepended to the `system` field.
fn rewrite_passthrough_tools(data: &mut Value) -> Result<()> {
    let Some(map) = data.as_object_mut() else {
        return Ok(());
    };

    let mut tools = Vec::new();
    if let Some(Value::Array(raw)) = map.get("tools") {
        for tool in raw {
            tools.push(anthropic::tool_to_ir(tool)?);
        }
    }
    let choice = match map.get("tool_choice") {
        Some(value) => Some(anthropic::tool_choice_to_ir(value)?),
        None => None,
    };

    let preamble = tool_input::build_tool_preamble(&tools, choice.as_ref());
    let system = match map.get("system") {
        Some(Value::String(s)) if !s.is_empty() => format!("{}\n\n{}", s, preamble),
        _ => preamble,
    };
    map.insert("system".into(), Value::String(system));
    map.remove("tools");
    map.remove("tool_choice");
    Ok(())
}

/* --- anthropic pseudo-stream ------------------------------------------------------------------- */

///
/// Replay a buffered response as the Anthropic Messages SSE sequence:
/// `message_start`, one content block per text/tool part (text is sliced
/// into delta chunks with the standard inter-chunk delay), `message_delta`
/// with the stop reason, and `message_stop`.
async fn pseudo_stream_anthropic(tx: mpsc::Sender<Result<Event>>, response: IrResponse) {
    let Ok(message) = anthropic::ir_response_to_wire(&response) else {
        return;
    };
    let Some(choice) = response.choices.first() else {
        return;
    };

    let mut start = message.clone();
    if let Some(map) = start.as_object_mut() {
        map.insert("content".into(), json!([]));
        map.insert("stop_reason".into(), Value::Null);
    }
    send_event(&tx, "message_start", &json!({"type": "message_start", "message": start})).await;

    let mut block_index = 0;
    let text = choice.message.joined_text();
    if !text.is_empty() {
        send_event(
            &tx,
            "content_block_start",
            &json!({
                "type": "content_block_start",
                "index": block_index,
                "content_block": {"type": "text", "text": ""},
            }),
        )
        .await;
        for chunk in chunk_text(&text, PSEUDO_CHUNK_SIZE) {
            send_event(
                &tx,
                "content_block_delta",
                &json!({
                    "type": "content_block_delta",
                    "index": block_index,
                    "delta": {"type": "text_delta", "text": chunk},
                }),
            )
            .await;
            tokio::time::sleep(std::time::Duration::from_millis(PSEUDO_CHUNK_DELAY_MS)).await;
        }
        send_event(
            &tx,
            "content_block_stop",
            &json!({"type": "content_block_stop", "index": block_index}),
        )
        .await;
        block_index += 1;
    }

    for call in choice.message.tool_calls.as_deref().unwrap_or_default() {
        send_event(
            &tx,
            "content_block_start",
            &json!({
                "type": "content_block_start",
                "index": block_index,
                "content_block": {"type": "tool_use", "id": call.id, "name": call.name, "input": {}},
            }),
        )
        .await;
        send_event(
            &tx,
            "content_block_delta",
            &json!({
                "type": "content_block_delta",
                "index": block_index,
                "delta": {"type": "input_json_delta", "partial_json": call.arguments.to_string()},
            }),
        )
        .await;
        send_event(
            &tx,
            "content_block_stop",
            &json!({"type": "content_block_stop", "index": block_index}),
        )
        .await;
        block_index += 1;
    }

    let stop_reason = message.get("stop_reason").cloned().unwrap_or(Value::Null);
    send_event(
        &tx,
        "message_delta",
        &json!({
            "type": "message_delta",
            "delta": {"stop_reason": stop_reason, "stop_sequence": Value::Null},
            "usage": message.get("usage").cloned().unwrap_or_else(|| json!({})),
        }),
    )
    .await;
    send_event(&tx, "message_stop", &json!({"type": "message_stop"})).await;
}

///
/// Send one named Anthropic SSE event.
async fn send_event(tx: &mpsc::Sender<Result<Event>>, name: &str, payload: &Value) {
    match serde_json::to_string(payload) {
        Ok(data) => {
            let _ = tx.send(Ok(Event::default().event(name).data(data))).await;
        }
        Err(e) => tracing::error!("Failed to serialize {} event: {}", name, e),
    }
}
