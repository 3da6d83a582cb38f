//!
//! Anthropic Messages wire format ↔ IR conversion.
//!
//! Handles the Messages request shape (separate `system` field, content
//! block arrays, `tool_use` / `tool_result` blocks) and rebuilds Anthropic
//! Message responses from IR. Tool results arriving inside a user message
//! are split into IR tool messages so the rest of the pipeline sees the
//! same shape regardless of the inbound protocol.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use serde_json::{Map, Value, json};
use tracing::warn;

use crate::error::{ProxyError, Result};
use crate::ir::{
    ContentPart, FinishReason, ImageData, ImageDetail, ImageSource, IrMessage, IrRequest,
    IrResponse, Role, ToolCallPart, ToolChoice, ToolDefinition,
};

/* --- atomic conversions ---------------------------------------------------------------------- */

///
/// Anthropic `{type:"image", source:{…}}` block → IR image part.
pub fn image_to_ir(value: &Value) -> Result<ContentPart> {
    let source = value
        .get("source")
        .and_then(Value::as_object)
        .ok_or_else(|| ProxyError::BadRequest("image block without 'source'".into()))?;

    let source = match source.get("type").and_then(Value::as_str) {
        Some("base64") => {
            let media_type = source
                .get("media_type")
                .and_then(Value::as_str)
                .unwrap_or("image/jpeg")
                .to_string();
            let data = source
                .get("data")
                .and_then(Value::as_str)
                .ok_or_else(|| ProxyError::BadRequest("base64 image source without data".into()))?
                .to_string();
            ImageSource::Data(ImageData { data, media_type })
        }
        Some("url") => {
            let url = source
                .get("url")
                .and_then(Value::as_str)
                .ok_or_else(|| ProxyError::BadRequest("url image source without url".into()))?;
            super::openai::parse_image_url(url)
        }
        other => {
            return Err(ProxyError::BadRequest(format!(
                "unknown image source type {:?}",
                other
            )));
        }
    };

    Ok(ContentPart::Image { source, detail: ImageDetail::Auto })
}

///
/// IR image part → Anthropic `{type:"image", source:{…}}` block.
pub fn ir_image_to_wire(source: &ImageSource) -> Value {
    match source {
        ImageSource::Data(data) => json!({
            "type": "image",
            "source": {"type": "base64", "media_type": data.media_type, "data": data.data}
        }),
        ImageSource::Url(url) => {
            // Data URLs sneaking through as plain URLs still emit base64 form.
            if let ImageSource::Data(data) = super::openai::parse_image_url(url) {
                json!({
                    "type": "image",
                    "source": {"type": "base64", "media_type": data.media_type, "data": data.data}
                })
            } else {
                json!({"type": "image", "source": {"type": "url", "url": url}})
            }
        }
    }
}

///
/// Anthropic `tool_use` block → IR tool call.
pub fn tool_call_to_ir(value: &Value, index: usize) -> Result<ToolCallPart> {
    let name = value
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| ProxyError::BadRequest("tool_use block without name".into()))?;
    let id = value
        .get("id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("call_{}", index));
    Ok(ToolCallPart {
        id,
        name: name.to_string(),
        arguments: value.get("input").cloned().unwrap_or_else(|| json!({})),
    })
}

///
/// IR tool call → Anthropic `tool_use` block.
pub fn ir_tool_call_to_wire(call: &ToolCallPart) -> Value {
    json!({
        "type": "tool_use",
        "id": call.id,
        "name": call.name,
        "input": call.arguments,
    })
}

///
/// Anthropic tool definition `{name, description, input_schema}` → IR.
pub fn tool_to_ir(value: &Value) -> Result<ToolDefinition> {
    let name = value
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| ProxyError::BadRequest("tool definition without name".into()))?;
    Ok(ToolDefinition {
        name: name.to_string(),
        description: value.get("description").and_then(Value::as_str).map(str::to_string),
        parameters: value
            .get("input_schema")
            .cloned()
            .unwrap_or_else(|| json!({"type": "object"})),
    })
}

///
/// IR tool definition → Anthropic wire shape.
pub fn ir_tool_to_wire(tool: &ToolDefinition) -> Value {
    let mut map = Map::new();
    map.insert("name".into(), Value::String(tool.name.clone()));
    if let Some(description) = &tool.description {
        map.insert("description".into(), Value::String(description.clone()));
    }
    map.insert("input_schema".into(), tool.parameters.clone());
    Value::Object(map)
}

///
/// Anthropic tool choice → IR.
pub fn tool_choice_to_ir(value: &Value) -> Result<ToolChoice> {
    match value.get("type").and_then(Value::as_str) {
        Some("auto") => Ok(ToolChoice::Auto),
        Some("any") => Ok(ToolChoice::Required),
        Some("none") => Ok(ToolChoice::None),
        Some("tool") => {
            let name = value
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| ProxyError::BadRequest("tool_choice 'tool' without name".into()))?;
            Ok(ToolChoice::Specific { name: name.to_string() })
        }
        other => Err(ProxyError::BadRequest(format!("unknown tool_choice type {:?}", other))),
    }
}

///
/// IR tool choice → Anthropic wire shape.
pub fn ir_tool_choice_to_wire(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!({"type": "auto"}),
        ToolChoice::Required => json!({"type": "any"}),
        ToolChoice::None => json!({"type": "none"}),
        ToolChoice::Specific { name } => json!({"type": "tool", "name": name}),
    }
}

/* --- request conversion ----------------------------------------------------------------------- */

///
/// Anthropic Messages request → IR request.
///
/// The separate `system` field becomes a leading system message. Each
/// `tool_result` block in a user message is emitted as its own IR tool
/// message, in block order, after the remaining user content.
pub fn request_to_ir(value: &Value) -> Result<IrRequest> {
    let map = value
        .as_object()
        .ok_or_else(|| ProxyError::BadRequest("request body must be a JSON object".into()))?;

    let mut messages = Vec::new();
    if let Some(system) = map.get("system") {
        let text = system_text(system)?;
        if !text.is_empty() {
            messages.push(IrMessage::text(Role::System, text));
        }
    }

    let raw_messages = map
        .get("messages")
        .and_then(Value::as_array)
        .ok_or_else(|| ProxyError::BadRequest("request requires 'messages'".into()))?;
    for message in raw_messages {
        messages.extend(message_to_ir(message)?);
    }

    let tools = match map.get("tools") {
        Some(Value::Array(raw)) => {
            let mut tools = Vec::with_capacity(raw.len());
            for tool in raw {
                tools.push(tool_to_ir(tool)?);
            }
            Some(tools)
        }
        _ => None,
    };

    Ok(IrRequest {
        messages,
        tools,
        tool_choice: map.get("tool_choice").map(tool_choice_to_ir).transpose()?,
        model: map.get("model").and_then(Value::as_str).map(str::to_string),
        temperature: map.get("temperature").and_then(Value::as_f64),
        top_p: map.get("top_p").and_then(Value::as_f64),
        max_tokens: map.get("max_tokens").and_then(Value::as_u64).map(|n| n as u32),
        stream: map.get("stream").and_then(Value::as_bool),
        stop: map.get("stop_sequences").cloned(),
        user: map
            .get("metadata")
            .and_then(|m| m.get("user_id"))
            .and_then(Value::as_str)
            .map(str::to_string),
        ..Default::default()
    })
}

///
/// The `system` field as plain text (string or text-block array).
fn system_text(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Array(blocks) => {
            let mut out = String::new();
            for block in blocks {
                if let Some(text) = block.get("text").and_then(Value::as_str) {
                    out.push_str(text);
                }
            }
            Ok(out)
        }
        Value::Null => Ok(String::new()),
        _ => Err(ProxyError::BadRequest("'system' must be a string or array".into())),
    }
}

///
/// One Anthropic message → one or more IR messages.
pub fn message_to_ir(value: &Value) -> Result<Vec<IrMessage>> {
    let map = value
        .as_object()
        .ok_or_else(|| ProxyError::BadRequest("message must be an object".into()))?;
    let role_str = map
        .get("role")
        .and_then(Value::as_str)
        .ok_or_else(|| ProxyError::BadRequest("message without role".into()))?;
    let role = Role::parse(role_str)
        .ok_or_else(|| ProxyError::BadRequest(format!("unknown message role '{}'", role_str)))?;

    let mut content = Vec::new();
    let mut tool_calls = Vec::new();
    let mut tool_results: Vec<IrMessage> = Vec::new();

    match map.get("content") {
        Some(Value::String(s)) => content.push(ContentPart::Text { text: s.clone() }),
        Some(Value::Array(blocks)) => {
            for block in blocks {
                match block.get("type").and_then(Value::as_str) {
                    Some("text") => {
                        content.push(super::openai::text_to_ir(block)?);
                    }
                    Some("image") => content.push(image_to_ir(block)?),
                    Some("tool_use") => tool_calls.push(tool_call_to_ir(block, tool_calls.len())?),
                    Some("tool_result") => tool_results.push(tool_result_to_ir(block)?),
                    other => {
                        warn!("Dropping unknown Anthropic content block type {:?}", other);
                    }
                }
            }
        }
        Some(Value::Null) | None => {}
        Some(other) => content.push(ContentPart::Text { text: other.to_string() }),
    }

    let mut messages = Vec::new();
    if !content.is_empty() || !tool_calls.is_empty() {
        messages.push(IrMessage {
            role,
            content,
            name: None,
            tool_call_id: None,
            tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
        });
    }
    messages.extend(tool_results);
    Ok(messages)
}

///
/// Anthropic `tool_result` block → IR tool message.
fn tool_result_to_ir(block: &Value) -> Result<IrMessage> {
    let tool_call_id = block
        .get("tool_use_id")
        .and_then(Value::as_str)
        .ok_or_else(|| ProxyError::BadRequest("tool_result without tool_use_id".into()))?;

    let content = match block.get("content") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(blocks)) => {
            let mut out = String::new();
            for inner in blocks {
                if let Some(text) = inner.get("text").and_then(Value::as_str) {
                    out.push_str(text);
                }
            }
            out
        }
        _ => String::new(),
    };

    Ok(IrMessage {
        role: Role::Tool,
        content: vec![ContentPart::Text { text: content }],
        name: None,
        tool_call_id: Some(tool_call_id.to_string()),
        tool_calls: None,
    })
}

/* --- response conversion ---------------------------------------------------------------------- */

///
/// IR response → Anthropic Message object.
///
/// Only the first choice is representable; Anthropic Messages has no
/// multi-choice concept.
pub fn ir_response_to_wire(ir: &IrResponse) -> Result<Value> {
    let choice = ir.choices.first().ok_or(ProxyError::UpstreamEmpty)?;

    let mut content = Vec::new();
    let text = choice.message.joined_text();
    if !text.is_empty() {
        content.push(json!({"type": "text", "text": text}));
    }
    if let Some(calls) = &choice.message.tool_calls {
        for call in calls {
            content.push(ir_tool_call_to_wire(call));
        }
    }

    let has_tool_calls = choice.message.tool_calls.as_ref().map(|c| !c.is_empty()).unwrap_or(false);
    let finish_reason = if has_tool_calls { FinishReason::ToolCalls } else { choice.finish_reason };

    let usage = ir.usage.unwrap_or_default();
    Ok(json!({
        "id": format!("msg_{}", ir.id.trim_start_matches("chatcmpl-")),
        "type": "message",
        "role": "assistant",
        "model": ir.model,
        "content": content,
        "stop_reason": finish_reason.as_anthropic_str(),
        "stop_sequence": Value::Null,
        "usage": {
            "input_tokens": usage.prompt_tokens,
            "output_tokens": usage.completion_tokens,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_definition_round_trip() {
        let wire = json!({
            "name": "search",
            "description": "Search the web",
            "input_schema": {"type": "object", "properties": {"q": {"type": "string"}}}
        });
        let tool = tool_to_ir(&wire).unwrap();
        assert_eq!(ir_tool_to_wire(&tool), wire);
    }

    #[test]
    fn test_tool_choice_round_trip() {
        for (wire, ir) in [
            (json!({"type": "auto"}), ToolChoice::Auto),
            (json!({"type": "any"}), ToolChoice::Required),
            (json!({"type": "tool", "name": "s"}), ToolChoice::Specific { name: "s".into() }),
        ] {
            assert_eq!(tool_choice_to_ir(&wire).unwrap(), ir);
            assert_eq!(ir_tool_choice_to_wire(&ir), wire);
        }
    }

    #[test]
    fn test_base64_image_round_trip() {
        let wire = json!({
            "type": "image",
            "source": {"type": "base64", "media_type": "image/png", "data": "AAAA"}
        });
        let part = image_to_ir(&wire).unwrap();
        match &part {
            ContentPart::Image { source, .. } => assert_eq!(ir_image_to_wire(source), wire),
            other => panic!("unexpected part: {:?}", other),
        }
    }

    #[test]
    fn test_system_field_becomes_leading_message() {
        let ir = request_to_ir(&json!({
            "model": "claude-sonnet-4",
            "system": "Be terse.",
            "max_tokens": 100,
            "messages": [{"role": "user", "content": "Hi"}]
        }))
        .unwrap();
        assert_eq!(ir.messages[0].role, Role::System);
        assert_eq!(ir.messages[0].joined_text(), "Be terse.");
        assert_eq!(ir.messages[1].role, Role::User);
        assert_eq!(ir.max_tokens, Some(100));
    }

    #[test]
    fn test_tool_result_splits_into_tool_message() {
        let messages = message_to_ir(&json!({
            "role": "user",
            "content": [
                {"type": "tool_result", "tool_use_id": "toolu_01", "content": "42"},
                {"type": "text", "text": "Now answer."}
            ]
        }))
        .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Tool);
        assert_eq!(messages[1].tool_call_id.as_deref(), Some("toolu_01"));
        assert_eq!(messages[1].joined_text(), "42");
    }

    #[test]
    fn test_assistant_tool_use_becomes_tool_calls() {
        let messages = message_to_ir(&json!({
            "role": "assistant",
            "content": [
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "toolu_02", "name": "search", "input": {"q": "x"}}
            ]
        }))
        .unwrap();
        assert_eq!(messages.len(), 1);
        let calls = messages[0].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id, "toolu_02");
        assert_eq!(calls[0].arguments, json!({"q": "x"}));
    }

    #[test]
    fn test_response_carries_tool_use_and_stop_reason() {
        use crate::ir::{IrChoice, ToolCallPart};
        let ir = IrResponse {
            id: "chatcmpl-42".into(),
            created: 1,
            model: "claudesonnet4".into(),
            choices: vec![IrChoice {
                index: 0,
                message: IrMessage {
                    role: Role::Assistant,
                    content: vec![ContentPart::Text { text: "Looking".into() }],
                    name: None,
                    tool_call_id: None,
                    tool_calls: Some(vec![ToolCallPart {
                        id: "toolu_03".into(),
                        name: "search".into(),
                        arguments: json!({"q": "x"}),
                    }]),
                },
                finish_reason: FinishReason::Stop,
            }],
            usage: None,
        };
        let wire = ir_response_to_wire(&ir).unwrap();
        assert_eq!(wire["stop_reason"], json!("tool_use"));
        assert_eq!(wire["content"][1]["type"], json!("tool_use"));
        assert_eq!(wire["id"], json!("msg_42"));
    }
}
