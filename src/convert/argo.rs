//!
//! Argo gateway dialect ↔ IR conversion.
//!
//! Argo accepts an OpenAI-compatible message envelope for every model but
//! expects tool definitions, tool choices and assistant tool calls in the
//! wire conventions of the upstream model family. Images must already be
//! data URLs; HTTP(S) URLs reaching this converter are an error, because the
//! image pipeline is responsible for inlining them first.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Map, Value, json};

use crate::error::{ProxyError, Result};
use crate::ir::{
    ContentPart, FinishReason, ImageSource, IrChoice, IrMessage, IrRequest, IrResponse, Role,
    ToolCallPart, Usage,
};
use crate::models::ModelFamily;

use super::{anthropic, google, openai};

/* --- constants ------------------------------------------------------------------------------ */

/** Monotonic per-process counter folded into generated response ids */
static RESPONSE_COUNTER: AtomicU64 = AtomicU64::new(0);

/* --- request conversion ----------------------------------------------------------------------- */

///
/// IR request → Argo request body.
///
/// # Arguments
///  * `ir` - request in IR form (images already inlined, tools already
///    rewritten for the target family)
///  * `internal_model` - resolved upstream internal id
///  * `family` - wire-format family of the resolved model
///  * `user` - per-process username injected into the body
///
/// # Returns
///  * Argo-dialect JSON body
///  * `ProxyError::UnsupportedImageSource` for non-data image URLs
///  * `ProxyError::UnsupportedContent` for file parts
pub fn ir_request_to_argo(
    ir: &IrRequest,
    internal_model: &str,
    family: ModelFamily,
    user: &str,
) -> Result<Value> {
    let mut map = Map::new();

    let mut messages = Vec::with_capacity(ir.messages.len());
    for message in &ir.messages {
        messages.push(ir_message_to_argo(message, family)?);
    }
    map.insert("messages".into(), Value::Array(messages));

    if let Some(tools) = &ir.tools {
        let tools: Vec<Value> = tools
            .iter()
            .map(|tool| match family {
                ModelFamily::Anthropic => anthropic::ir_tool_to_wire(tool),
                ModelFamily::Google => google::ir_tool_to_wire(tool),
                _ => openai::ir_tool_to_wire(tool),
            })
            .collect();
        map.insert("tools".into(), Value::Array(tools));
    }
    if let Some(choice) = &ir.tool_choice {
        let choice = match family {
            ModelFamily::Anthropic => anthropic::ir_tool_choice_to_wire(choice),
            ModelFamily::Google => google::ir_tool_choice_to_wire(choice),
            _ => openai::ir_tool_choice_to_wire(choice),
        };
        map.insert("tool_choice".into(), choice);
    }

    openai::copy_ir_scalars(ir, &mut map);
    map.insert("model".into(), Value::String(internal_model.to_string()));
    map.insert("user".into(), Value::String(user.to_string()));

    Ok(Value::Object(map))
}

///
/// One IR message → Argo message.
///
/// Single-text content collapses to a bare string; assistant tool calls are
/// emitted in the family's convention (`tool_calls` array for OpenAI-style
/// models, embedded `tool_use` blocks for Anthropic, `functionCall` parts
/// for Google).
pub fn ir_message_to_argo(message: &IrMessage, family: ModelFamily) -> Result<Value> {
    let mut map = Map::new();
    map.insert("role".into(), Value::String(message.role.as_str().to_string()));

    let has_tool_calls = message.tool_calls.as_ref().map(|c| !c.is_empty()).unwrap_or(false);
    let embed_in_content = has_tool_calls && matches!(family, ModelFamily::Anthropic | ModelFamily::Google);

    if message.is_single_text() && !embed_in_content {
        map.insert("content".into(), Value::String(message.joined_text()));
    } else {
        let mut blocks = Vec::with_capacity(message.content.len());
        for part in &message.content {
            blocks.push(argo_content_part(part)?);
        }
        if embed_in_content {
            for (index, call) in message.tool_calls.as_deref().unwrap_or_default().iter().enumerate() {
                let call = normalized_call(call, index);
                blocks.push(match family {
                    ModelFamily::Anthropic => anthropic::ir_tool_call_to_wire(&call),
                    _ => google::ir_tool_call_to_wire(&call),
                });
            }
        }
        if blocks.is_empty() {
            map.insert("content".into(), Value::String(String::new()));
        } else if blocks.len() == 1 && blocks[0].get("type").and_then(Value::as_str) == Some("text")
        {
            let text = blocks[0].get("text").and_then(Value::as_str).unwrap_or_default();
            map.insert("content".into(), Value::String(text.to_string()));
        } else {
            map.insert("content".into(), Value::Array(blocks));
        }
    }

    if has_tool_calls && !embed_in_content {
        let calls: Vec<Value> = message
            .tool_calls
            .as_deref()
            .unwrap_or_default()
            .iter()
            .enumerate()
            .map(|(index, call)| openai::ir_tool_call_to_wire(&normalized_call(call, index)))
            .collect();
        map.insert("tool_calls".into(), Value::Array(calls));
    }

    if let Some(name) = &message.name {
        map.insert("name".into(), Value::String(name.clone()));
    }
    if let Some(id) = &message.tool_call_id {
        map.insert("tool_call_id".into(), Value::String(id.clone()));
    }

    Ok(Value::Object(map))
}

///
/// Fill an empty tool-call id with the deterministic positional fallback.
fn normalized_call(call: &ToolCallPart, index: usize) -> ToolCallPart {
    if call.id.is_empty() {
        ToolCallPart { id: format!("call_{}", index), ..call.clone() }
    } else {
        call.clone()
    }
}

///
/// One IR content part → Argo content block.
fn argo_content_part(part: &ContentPart) -> Result<Value> {
    match part {
        ContentPart::Text { text } => Ok(openai::ir_text_to_wire(text)),
        ContentPart::Image { source, detail } => {
            match source {
                ImageSource::Url(url) if !url.starts_with("data:") => {
                    Err(ProxyError::UnsupportedImageSource(format!(
                        "Argo accepts only data URLs; run the image pipeline first: {}",
                        truncate(url, 100)
                    )))
                }
                _ => Ok(openai::ir_image_to_wire(source, *detail)),
            }
        }
        ContentPart::ToolCall(call) => Ok(openai::ir_tool_call_to_wire(call)),
        ContentPart::ToolResult { tool_call_id, content } => Ok(json!({
            "role": "tool",
            "tool_call_id": tool_call_id,
            "content": content,
        })),
        ContentPart::File => {
            Err(ProxyError::UnsupportedContent("file content parts are not supported".into()))
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/* --- response conversion ---------------------------------------------------------------------- */

///
/// Assemble an IR response from normalised Argo output.
///
/// # Arguments
///  * `text` - assistant text, None when the response was tool calls only
///  * `tool_calls` - normalised tool calls in upstream order
///  * `model` - model name to report to the client
///  * `usage` - upstream usage block when present
///
/// # Returns
///  * IR response with a single choice
///  * `ProxyError::UpstreamEmpty` when there is neither text nor a tool call
pub fn build_ir_response(
    text: Option<String>,
    tool_calls: Vec<ToolCallPart>,
    model: &str,
    usage: Option<Usage>,
) -> Result<IrResponse> {
    let has_text = text.as_ref().map(|t| !t.is_empty()).unwrap_or(false);
    if !has_text && tool_calls.is_empty() {
        return Err(ProxyError::UpstreamEmpty);
    }

    let finish_reason =
        if tool_calls.is_empty() { FinishReason::Stop } else { FinishReason::ToolCalls };

    let content = match text {
        Some(text) if !text.is_empty() => vec![ContentPart::Text { text }],
        _ => Vec::new(),
    };

    Ok(IrResponse {
        id: generate_response_id(),
        created: chrono::Utc::now().timestamp(),
        model: model.to_string(),
        choices: vec![IrChoice {
            index: 0,
            message: IrMessage {
                role: Role::Assistant,
                content,
                name: None,
                tool_call_id: None,
                tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
            },
            finish_reason,
        }],
        usage,
    })
}

///
/// Extract an OpenAI-shaped usage block from an Argo response body.
pub fn usage_from_body(body: &Value) -> Option<Usage> {
    let usage = body.get("usage")?.as_object()?;
    let prompt = usage.get("prompt_tokens").and_then(Value::as_u64)? as u32;
    let completion = usage.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0) as u32;
    let total = usage
        .get("total_tokens")
        .and_then(Value::as_u64)
        .map(|t| t as u32)
        .unwrap_or(prompt + completion);
    Some(Usage { prompt_tokens: prompt, completion_tokens: completion, total_tokens: total })
}

///
/// Unique per-process response id in the OpenAI `chatcmpl-` style.
pub fn generate_response_id() -> String {
    let counter = RESPONSE_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("chatcmpl-{:x}{:04x}", chrono::Utc::now().timestamp_micros(), counter & 0xffff)
}

/* --- embeddings ------------------------------------------------------------------------------- */

///
/// Build the Argo embeddings request body.
///
/// The OpenAI `input` field (string or array of strings) becomes Argo's
/// `prompt` array.
pub fn embed_request_to_argo(input: &Value, internal_model: &str, user: &str) -> Result<Value> {
    let prompts = match input {
        Value::String(s) => vec![Value::String(s.clone())],
        Value::Array(items) => {
            for item in items {
                if !item.is_string() {
                    return Err(ProxyError::BadRequest(
                        "'input' array must contain strings".into(),
                    ));
                }
            }
            items.clone()
        }
        _ => return Err(ProxyError::BadRequest("'input' must be a string or array".into())),
    };

    Ok(json!({
        "user": user,
        "model": internal_model,
        "prompt": prompts,
    }))
}

///
/// Argo embeddings response → OpenAI embeddings response.
pub fn embed_response_to_openai(body: &Value, model: &str) -> Result<Value> {
    let embeddings = body
        .get("embedding")
        .or_else(|| body.get("embeddings"))
        .and_then(Value::as_array)
        .ok_or_else(|| {
            ProxyError::UpstreamInvalidResponse("embeddings response without 'embedding'".into())
        })?;

    let data: Vec<Value> = embeddings
        .iter()
        .enumerate()
        .map(|(index, embedding)| {
            json!({"object": "embedding", "index": index, "embedding": embedding})
        })
        .collect();

    Ok(json!({
        "object": "list",
        "data": data,
        "model": model,
        "usage": body.get("usage").cloned().unwrap_or_else(|| json!({
            "prompt_tokens": 0,
            "total_tokens": 0,
        })),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ImageData;

    fn user_message(text: &str) -> IrMessage {
        IrMessage::text(Role::User, text)
    }

    #[test]
    fn test_single_text_collapses_to_bare_string() {
        let wire = ir_message_to_argo(&user_message("Hi"), ModelFamily::OpenAi).unwrap();
        assert_eq!(wire, json!({"role": "user", "content": "Hi"}));
    }

    #[test]
    fn test_http_image_url_rejected() {
        let mut message = user_message("look");
        message.content.push(ContentPart::Image {
            source: ImageSource::Url("https://example.com/x.png".into()),
            detail: Default::default(),
        });
        let err = ir_message_to_argo(&message, ModelFamily::OpenAi);
        assert!(matches!(err, Err(ProxyError::UnsupportedImageSource(_))));
    }

    #[test]
    fn test_data_image_accepted() {
        let mut message = user_message("look");
        message.content.push(ContentPart::Image {
            source: ImageSource::Data(ImageData {
                data: "AAAA".into(),
                media_type: "image/png".into(),
            }),
            detail: Default::default(),
        });
        let wire = ir_message_to_argo(&message, ModelFamily::OpenAi).unwrap();
        assert_eq!(
            wire["content"][1]["image_url"]["url"],
            json!("data:image/png;base64,AAAA")
        );
    }

    #[test]
    fn test_assistant_tool_calls_per_family() {
        let mut message = IrMessage::text(Role::Assistant, "Checking");
        message.tool_calls = Some(vec![ToolCallPart {
            id: "call_1".into(),
            name: "f".into(),
            arguments: json!({"a": 1}),
        }]);

        let openai_wire = ir_message_to_argo(&message, ModelFamily::OpenAi).unwrap();
        assert_eq!(openai_wire["tool_calls"][0]["function"]["name"], json!("f"));

        let anthropic_wire = ir_message_to_argo(&message, ModelFamily::Anthropic).unwrap();
        assert_eq!(anthropic_wire["content"][1]["type"], json!("tool_use"));
        assert!(anthropic_wire.get("tool_calls").is_none());

        let google_wire = ir_message_to_argo(&message, ModelFamily::Google).unwrap();
        assert_eq!(google_wire["content"][1]["functionCall"]["name"], json!("f"));
    }

    #[test]
    fn test_request_injects_model_and_user() {
        let ir = IrRequest {
            messages: vec![user_message("Hi")],
            model: Some("argo:gpt-4o".into()),
            user: Some("client-supplied".into()),
            ..Default::default()
        };
        let wire = ir_request_to_argo(&ir, "gpt4o", ModelFamily::OpenAi, "proxy-user").unwrap();
        assert_eq!(wire["model"], json!("gpt4o"));
        assert_eq!(wire["user"], json!("proxy-user"));
    }

    #[test]
    fn test_build_ir_response_empty_is_error() {
        let err = build_ir_response(None, Vec::new(), "gpt4o", None);
        assert!(matches!(err, Err(ProxyError::UpstreamEmpty)));
    }

    #[test]
    fn test_build_ir_response_tool_calls_set_finish_reason() {
        let response = build_ir_response(
            None,
            vec![ToolCallPart { id: "call_0".into(), name: "f".into(), arguments: json!({}) }],
            "gpt4o",
            None,
        )
        .unwrap();
        assert_eq!(response.choices[0].finish_reason, FinishReason::ToolCalls);
    }

    #[test]
    fn test_embed_request_and_response() {
        let request = embed_request_to_argo(&json!("hello"), "v3small", "u").unwrap();
        assert_eq!(request["prompt"], json!(["hello"]));

        let response =
            embed_response_to_openai(&json!({"embedding": [[0.1, 0.2]]}), "v3small").unwrap();
        assert_eq!(response["data"][0]["embedding"], json!([0.1, 0.2]));
        assert_eq!(response["object"], json!("list"));
    }
}
