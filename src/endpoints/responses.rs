//!
//! OpenAI Responses endpoint.
//!
//! Translates the Responses `input`/`instructions` shape onto the shared
//! chat pipeline and rebuilds a Responses object from the IR result. Tool
//! calls come back as `function_call` output items.
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
use serde_json::{Value, json};

use crate::convert::{argo, openai};
use crate::error::{ProxyError, Result};
use crate::ir::{ContentPart, IrMessage, IrRequest, IrResponse, Role};
use crate::models::ModelKind;
use crate::server::{AppState, ProxyMode, finish_request, parse_json_body, post_upstream};
use crate::tools::{input as tool_input, output as tool_output};

/* --- handlers --------------------------------------------------------------------------------- */

///
/// Handle `POST /v1/responses`.
pub async fn responses(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let result = process_responses(state.clone(), &headers, &body).await;
    finish_request(&state, result)
}

async fn process_responses(
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
        .ok_or_else(|| ProxyError::BadRequest("Missing required field: model".into()))?
        .to_string();
    let input = map
        .get("input")
        .ok_or_else(|| ProxyError::BadRequest("Missing required field: input".into()))?;

    match state.mode {
        ProxyMode::Dev => {
            return super::chat::passthrough(&state, &state.config.chat_url(), &data, headers, false)
                .await;
        }
        ProxyMode::NativeOpenAi => {
            let url = super::embed::native_openai_url(&state, "/responses")?;
            return super::chat::passthrough(&state, &url, &data, headers, false).await;
        }
        _ => {}
    }

    let mut ir = IrRequest {
        messages: input_to_messages(input, map.get("instructions"))?,
        model: Some(model.clone()),
        temperature: map.get("temperature").and_then(Value::as_f64),
        top_p: map.get("top_p").and_then(Value::as_f64),
        max_tokens: map.get("max_output_tokens").and_then(Value::as_u64).map(|n| n as u32),
        ..Default::default()
    };
    if let Some(Value::Array(raw)) = map.get("tools") {
        let mut tools = Vec::with_capacity(raw.len());
        for tool in raw {
            // Responses tools are flat {type:"function", name, parameters}.
            let tool = if tool.get("function").is_some() {
                openai::tool_to_ir(tool)?
            } else {
                openai::tool_to_ir(&json!({"type": "function", "function": tool}))?
            };
            tools.push(tool);
        }
        ir.tools = Some(tools);
    }

    let internal = state.registry.resolve(&model, ModelKind::Chat);
    let family = state.registry.family_of(&internal);
    tool_input::rewrite_tools(&mut ir, family, state.config.tools.native_tools);

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
        &model,
        argo::usage_from_body(&body),
    )?;

    Ok(Json(ir_response_to_responses_wire(&ir_response)).into_response())
}

/* --- conversion ------------------------------------------------------------------------------- */

///
/// Responses `input` (+ optional `instructions`) → IR messages.
fn input_to_messages(input: &Value, instructions: Option<&Value>) -> Result<Vec<IrMessage>> {
    let mut messages = Vec::new();

    if let Some(instructions) = instructions.and_then(Value::as_str) {
        if !instructions.is_empty() {
            messages.push(IrMessage::text(Role::System, instructions));
        }
    }

    match input {
        Value::String(text) => messages.push(IrMessage::text(Role::User, text.clone())),
        Value::Array(items) => {
            for item in items {
                let role = item
                    .get("role")
                    .and_then(Value::as_str)
                    .and_then(Role::parse)
                    .unwrap_or(Role::User);
                let text = match item.get("content") {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Array(blocks)) => {
                        let mut out = String::new();
                        for block in blocks {
                            if let Some(t) = block.get("text").and_then(Value::as_str) {
                                out.push_str(t);
                            }
                        }
                        out
                    }
                    _ => String::new(),
                };
                messages.push(IrMessage::text(role, text));
            }
        }
        _ => return Err(ProxyError::BadRequest("'input' must be a string or array".into())),
    }

    Ok(messages)
}

///
/// IR response → Responses object.
fn ir_response_to_responses_wire(ir: &IrResponse) -> Value {
    let mut output = Vec::new();

    if let Some(choice) = ir.choices.first() {
        let text: String = choice
            .message
            .content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        if !text.is_empty() {
            output.push(json!({
                "type": "message",
                "id": format!("msg_{}", ir.id.trim_start_matches("chatcmpl-")),
                "status": "completed",
                "role": "assistant",
                "content": [{"type": "output_text", "text": text, "annotations": []}],
            }));
        }
        for call in choice.message.tool_calls.as_deref().unwrap_or_default() {
            let arguments = match &call.arguments {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            output.push(json!({
                "type": "function_call",
                "id": format!("fc_{}", call.id),
                "call_id": call.id,
                "name": call.name,
                "arguments": arguments,
                "status": "completed",
            }));
        }
    }

    let usage = ir.usage.unwrap_or_default();
    json!({
        "id": format!("resp_{}", ir.id.trim_start_matches("chatcmpl-")),
        "object": "response",
        "created_at": ir.created,
        "status": "completed",
        "model": ir.model,
        "output": output,
        "usage": {
            "input_tokens": usage.prompt_tokens,
            "output_tokens": usage.completion_tokens,
            "total_tokens": usage.total_tokens,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_string_becomes_user_message() {
        let messages = input_to_messages(&json!("Hello"), None).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
    }

    #[test]
    fn test_instructions_become_system_message() {
        let messages = input_to_messages(&json!("Hi"), Some(&json!("Be brief."))).unwrap();
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::User);
    }

    #[test]
    fn test_input_array_with_blocks() {
        let input = json!([
            {"role": "user", "content": [{"type": "input_text", "text": "part one"}]},
            {"role": "assistant", "content": "earlier answer"}
        ]);
        let messages = input_to_messages(&input, None).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].joined_text(), "part one");
        assert_eq!(messages[1].role, Role::Assistant);
    }

    #[test]
    fn test_responses_wire_shape() {
        use crate::ir::{FinishReason, IrChoice};
        let ir = IrResponse {
            id: "chatcmpl-7".into(),
            created: 5,
            model: "gpt4o".into(),
            choices: vec![IrChoice {
                index: 0,
                message: IrMessage::text(Role::Assistant, "answer"),
                finish_reason: FinishReason::Stop,
            }],
            usage: None,
        };
        let wire = ir_response_to_responses_wire(&ir);
        assert_eq!(wire["object"], json!("response"));
        assert_eq!(wire["id"], json!("resp_7"));
        assert_eq!(wire["output"][0]["content"][0]["text"], json!("answer"));
    }
}
