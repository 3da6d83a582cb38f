//!
//! OpenAI Chat Completions wire format ↔ IR conversion.
//!
//! Covers the atomic content parts (text, image, tool call, tool result,
//! tool definition, tool choice) plus message-, request- and response-level
//! assembly. Requests may use the legacy `prompt` field, which is
//! synthesised into a single user message.
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
    IrResponse, Role, ToolCallPart, ToolChoice, ToolDefinition, Usage,
};

/* --- constants ------------------------------------------------------------------------------ */

/** Scalar request fields copied verbatim between wire and IR */
const SCALAR_FIELDS: &[&str] = &[
    "model",
    "temperature",
    "top_p",
    "max_tokens",
    "stream",
    "stop",
    "seed",
    "presence_penalty",
    "frequency_penalty",
    "logit_bias",
    "user",
    "n",
    "response_format",
];

/** All request fields the converter understands; others are dropped with a warning */
const KNOWN_FIELDS: &[&str] = &[
    "messages",
    "prompt",
    "tools",
    "tool_choice",
    "model",
    "temperature",
    "top_p",
    "max_tokens",
    "max_completion_tokens",
    "stream",
    "stream_options",
    "stop",
    "seed",
    "presence_penalty",
    "frequency_penalty",
    "logit_bias",
    "user",
    "n",
    "response_format",
];

/* --- atomic conversions ---------------------------------------------------------------------- */

///
/// OpenAI text content → IR text part.
///
/// Accepts both a bare string and the `{type:"text", text}` object form.
pub fn text_to_ir(value: &Value) -> Result<ContentPart> {
    match value {
        Value::String(s) => Ok(ContentPart::Text { text: s.clone() }),
        Value::Object(map) => {
            let text = map
                .get("text")
                .and_then(Value::as_str)
                .ok_or_else(|| ProxyError::BadRequest("text block without 'text' field".into()))?;
            Ok(ContentPart::Text { text: text.to_string() })
        }
        _ => Err(ProxyError::BadRequest("text content must be a string or object".into())),
    }
}

///
/// IR text part → OpenAI `{type:"text", text}` block.
pub fn ir_text_to_wire(text: &str) -> Value {
    json!({"type": "text", "text": text})
}

///
/// OpenAI `{type:"image_url", image_url:{url, detail}}` → IR image part.
pub fn image_to_ir(value: &Value) -> Result<ContentPart> {
    let image_url = value
        .get("image_url")
        .ok_or_else(|| ProxyError::BadRequest("image_url block without 'image_url'".into()))?;
    // Some clients send the URL directly instead of the nested object.
    let (url, detail) = match image_url {
        Value::String(url) => (url.as_str(), ImageDetail::Auto),
        Value::Object(map) => {
            let url = map
                .get("url")
                .and_then(Value::as_str)
                .ok_or_else(|| ProxyError::BadRequest("image_url without 'url'".into()))?;
            let detail =
                map.get("detail").and_then(Value::as_str).map(ImageDetail::parse).unwrap_or_default();
            (url, detail)
        }
        _ => return Err(ProxyError::BadRequest("image_url must be a string or object".into())),
    };

    Ok(ContentPart::Image { source: parse_image_url(url), detail })
}

///
/// Split a data URL into its base64 payload; plain URLs stay as URLs.
pub fn parse_image_url(url: &str) -> ImageSource {
    if let Some(rest) = url.strip_prefix("data:") {
        if let Some((media_type, data)) = rest.split_once(";base64,") {
            return ImageSource::Data(ImageData {
                data: data.to_string(),
                media_type: media_type.to_string(),
            });
        }
    }
    ImageSource::Url(url.to_string())
}

///
/// IR image part → OpenAI `{type:"image_url", image_url:{url, detail}}`.
pub fn ir_image_to_wire(source: &ImageSource, detail: ImageDetail) -> Value {
    let url = match source {
        ImageSource::Url(url) => url.clone(),
        ImageSource::Data(data) => format!("data:{};base64,{}", data.media_type, data.data),
    };
    json!({"type": "image_url", "image_url": {"url": url, "detail": detail.as_str()}})
}

///
/// OpenAI tool call `{id, type, function:{name, arguments}}` → IR.
///
/// Wire arguments are a JSON-encoded string; unparseable argument strings
/// are preserved as a raw string value rather than dropped.
pub fn tool_call_to_ir(value: &Value, index: usize) -> Result<ToolCallPart> {
    let function = value
        .get("function")
        .ok_or_else(|| ProxyError::BadRequest("tool call without 'function'".into()))?;
    let name = function
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| ProxyError::BadRequest("tool call without function name".into()))?;

    let arguments = match function.get("arguments") {
        Some(Value::String(s)) => {
            serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone()))
        }
        Some(v) => v.clone(),
        None => json!({}),
    };

    let id = value
        .get("id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("call_{}", index));

    Ok(ToolCallPart { id, name: name.to_string(), arguments })
}

///
/// IR tool call → OpenAI wire shape with stringified arguments.
pub fn ir_tool_call_to_wire(call: &ToolCallPart) -> Value {
    let arguments = match &call.arguments {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    json!({
        "id": call.id,
        "type": "function",
        "function": {"name": call.name, "arguments": arguments}
    })
}

///
/// OpenAI tool definition `{type:"function", function:{…}}` → IR.
pub fn tool_to_ir(value: &Value) -> Result<ToolDefinition> {
    let function = value
        .get("function")
        .ok_or_else(|| ProxyError::BadRequest("tool definition without 'function'".into()))?;
    let name = function
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| ProxyError::BadRequest("tool definition without name".into()))?;

    Ok(ToolDefinition {
        name: name.to_string(),
        description: function.get("description").and_then(Value::as_str).map(str::to_string),
        parameters: function.get("parameters").cloned().unwrap_or_else(|| json!({"type": "object"})),
    })
}

///
/// IR tool definition → OpenAI wire shape.
pub fn ir_tool_to_wire(tool: &ToolDefinition) -> Value {
    let mut function = Map::new();
    function.insert("name".into(), Value::String(tool.name.clone()));
    if let Some(description) = &tool.description {
        function.insert("description".into(), Value::String(description.clone()));
    }
    function.insert("parameters".into(), tool.parameters.clone());
    json!({"type": "function", "function": Value::Object(function)})
}

///
/// OpenAI tool choice → IR.
pub fn tool_choice_to_ir(value: &Value) -> Result<ToolChoice> {
    match value {
        Value::String(s) => match s.as_str() {
            "auto" => Ok(ToolChoice::Auto),
            "none" => Ok(ToolChoice::None),
            "required" => Ok(ToolChoice::Required),
            other => Err(ProxyError::BadRequest(format!("unknown tool_choice '{}'", other))),
        },
        Value::Object(map) => {
            let name = map
                .get("function")
                .and_then(|f| f.get("name"))
                .and_then(Value::as_str)
                .ok_or_else(|| ProxyError::BadRequest("tool_choice object without function name".into()))?;
            Ok(ToolChoice::Specific { name: name.to_string() })
        }
        _ => Err(ProxyError::BadRequest("tool_choice must be a string or object".into())),
    }
}

///
/// IR tool choice → OpenAI wire shape.
pub fn ir_tool_choice_to_wire(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::None => json!("none"),
        ToolChoice::Required => json!("required"),
        ToolChoice::Specific { name } => {
            json!({"type": "function", "function": {"name": name}})
        }
    }
}

/* --- message conversion ----------------------------------------------------------------------- */

///
/// OpenAI message → IR message.
///
/// Bare-string content becomes a single text part; unknown block types are
/// treated as text of their JSON rendering so nothing is silently lost.
pub fn message_to_ir(value: &Value) -> Result<IrMessage> {
    let map = value
        .as_object()
        .ok_or_else(|| ProxyError::BadRequest("message must be an object".into()))?;

    let role_str = map
        .get("role")
        .and_then(Value::as_str)
        .ok_or_else(|| ProxyError::BadRequest("message without role".into()))?;
    let role = Role::parse(role_str)
        .ok_or_else(|| ProxyError::BadRequest(format!("unknown message role '{}'", role_str)))?;

    let tool_call_id = map.get("tool_call_id").and_then(Value::as_str).map(str::to_string);
    if role == Role::Tool && tool_call_id.is_none() {
        return Err(ProxyError::BadRequest("tool message requires tool_call_id".into()));
    }

    let content = match map.get("content") {
        Some(Value::String(s)) => vec![ContentPart::Text { text: s.clone() }],
        Some(Value::Array(blocks)) => {
            let mut parts = Vec::with_capacity(blocks.len());
            for block in blocks {
                parts.push(content_block_to_ir(block)?);
            }
            parts
        }
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![ContentPart::Text { text: other.to_string() }],
    };

    let tool_calls = match map.get("tool_calls") {
        Some(Value::Array(calls)) => {
            let mut parts = Vec::with_capacity(calls.len());
            for (index, call) in calls.iter().enumerate() {
                parts.push(tool_call_to_ir(call, index)?);
            }
            Some(parts)
        }
        _ => None,
    };

    Ok(IrMessage {
        role,
        content,
        name: map.get("name").and_then(Value::as_str).map(str::to_string),
        tool_call_id,
        tool_calls,
    })
}

///
/// One OpenAI content block → IR content part.
fn content_block_to_ir(block: &Value) -> Result<ContentPart> {
    if block.is_string() {
        return text_to_ir(block);
    }
    match block.get("type").and_then(Value::as_str) {
        Some("text") => text_to_ir(block),
        Some("image_url") => image_to_ir(block),
        Some("file") => Err(ProxyError::UnsupportedContent("file content parts".into())),
        _ => Ok(ContentPart::Text { text: block.to_string() }),
    }
}

///
/// IR message → OpenAI message.
///
/// A message whose content is exactly one text part collapses to a bare
/// string, preserving the legacy non-multimodal shape.
pub fn ir_message_to_wire(message: &IrMessage) -> Result<Value> {
    let mut map = Map::new();
    map.insert("role".into(), Value::String(message.role.as_str().to_string()));

    if message.is_single_text() {
        map.insert("content".into(), Value::String(message.joined_text()));
    } else if message.content.is_empty() {
        map.insert("content".into(), Value::Null);
    } else {
        let mut blocks = Vec::with_capacity(message.content.len());
        for part in &message.content {
            blocks.push(ir_content_part_to_wire(part)?);
        }
        map.insert("content".into(), Value::Array(blocks));
    }

    if let Some(name) = &message.name {
        map.insert("name".into(), Value::String(name.clone()));
    }
    if let Some(id) = &message.tool_call_id {
        map.insert("tool_call_id".into(), Value::String(id.clone()));
    }
    if let Some(calls) = &message.tool_calls {
        let calls: Vec<Value> = calls.iter().map(ir_tool_call_to_wire).collect();
        map.insert("tool_calls".into(), Value::Array(calls));
    }

    Ok(Value::Object(map))
}

///
/// One IR content part → OpenAI block.
pub fn ir_content_part_to_wire(part: &ContentPart) -> Result<Value> {
    match part {
        ContentPart::Text { text } => Ok(ir_text_to_wire(text)),
        ContentPart::Image { source, detail } => Ok(ir_image_to_wire(source, *detail)),
        ContentPart::ToolCall(call) => Ok(ir_tool_call_to_wire(call)),
        ContentPart::ToolResult { tool_call_id, content } => Ok(json!({
            "type": "tool_result",
            "tool_call_id": tool_call_id,
            "content": content,
        })),
        ContentPart::File => Err(ProxyError::UnsupportedContent("file content parts".into())),
    }
}

/* --- request conversion ----------------------------------------------------------------------- */

///
/// OpenAI chat (or legacy completions) request → IR request.
///
/// When `messages` is absent, the legacy `prompt` field (string or array of
/// strings) is accepted by synthesising a single user message. Unknown
/// top-level fields are dropped with a warning; no field is silently mutated.
pub fn request_to_ir(value: &Value) -> Result<IrRequest> {
    let map = value
        .as_object()
        .ok_or_else(|| ProxyError::BadRequest("request body must be a JSON object".into()))?;

    for key in map.keys() {
        if !KNOWN_FIELDS.contains(&key.as_str()) {
            warn!("Dropping unknown request field '{}'", key);
        }
    }

    let messages = match map.get("messages") {
        Some(Value::Array(raw)) => {
            let mut messages = Vec::with_capacity(raw.len());
            for message in raw {
                messages.push(message_to_ir(message)?);
            }
            messages
        }
        Some(_) => return Err(ProxyError::BadRequest("'messages' must be an array".into())),
        None => prompt_to_messages(map.get("prompt"))?,
    };

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

    let tool_choice = map.get("tool_choice").map(tool_choice_to_ir).transpose()?;

    let mut ir = IrRequest {
        messages,
        tools,
        tool_choice,
        model: map.get("model").and_then(Value::as_str).map(str::to_string),
        temperature: map.get("temperature").and_then(Value::as_f64),
        top_p: map.get("top_p").and_then(Value::as_f64),
        stream: map.get("stream").and_then(Value::as_bool),
        stop: map.get("stop").cloned(),
        seed: map.get("seed").and_then(Value::as_i64),
        presence_penalty: map.get("presence_penalty").and_then(Value::as_f64),
        frequency_penalty: map.get("frequency_penalty").and_then(Value::as_f64),
        logit_bias: map.get("logit_bias").cloned(),
        user: map.get("user").and_then(Value::as_str).map(str::to_string),
        n: map.get("n").and_then(Value::as_u64).map(|n| n as u32),
        response_format: map.get("response_format").cloned(),
        ..Default::default()
    };
    ir.max_tokens = map
        .get("max_tokens")
        .or_else(|| map.get("max_completion_tokens"))
        .and_then(Value::as_u64)
        .map(|n| n as u32);

    Ok(ir)
}

///
/// Legacy `prompt` field → synthesised user message list.
fn prompt_to_messages(prompt: Option<&Value>) -> Result<Vec<IrMessage>> {
    match prompt {
        Some(Value::String(text)) => Ok(vec![IrMessage::text(Role::User, text.clone())]),
        Some(Value::Array(parts)) => {
            let mut joined = String::new();
            for part in parts {
                match part {
                    Value::String(s) => {
                        if !joined.is_empty() {
                            joined.push('\n');
                        }
                        joined.push_str(s);
                    }
                    _ => {
                        return Err(ProxyError::BadRequest(
                            "'prompt' array must contain strings".into(),
                        ));
                    }
                }
            }
            Ok(vec![IrMessage::text(Role::User, joined)])
        }
        Some(_) => Err(ProxyError::BadRequest("'prompt' must be a string or array".into())),
        None => Err(ProxyError::BadRequest("request requires 'messages' or 'prompt'".into())),
    }
}

///
/// IR request → OpenAI chat request.
pub fn ir_request_to_wire(ir: &IrRequest) -> Result<Value> {
    let mut map = Map::new();

    let mut messages = Vec::with_capacity(ir.messages.len());
    for message in &ir.messages {
        messages.push(ir_message_to_wire(message)?);
    }
    map.insert("messages".into(), Value::Array(messages));

    if let Some(tools) = &ir.tools {
        let tools: Vec<Value> = tools.iter().map(ir_tool_to_wire).collect();
        map.insert("tools".into(), Value::Array(tools));
    }
    if let Some(choice) = &ir.tool_choice {
        map.insert("tool_choice".into(), ir_tool_choice_to_wire(choice));
    }

    copy_ir_scalars(ir, &mut map);
    Ok(Value::Object(map))
}

///
/// Copy the whitelisted scalar fields from the IR into a wire map.
pub fn copy_ir_scalars(ir: &IrRequest, map: &mut Map<String, Value>) {
    let scalars: [(&str, Option<Value>); 13] = [
        ("model", ir.model.clone().map(Value::String)),
        ("temperature", ir.temperature.and_then(|v| serde_json::Number::from_f64(v).map(Value::Number))),
        ("top_p", ir.top_p.and_then(|v| serde_json::Number::from_f64(v).map(Value::Number))),
        ("max_tokens", ir.max_tokens.map(|v| Value::Number(v.into()))),
        ("stream", ir.stream.map(Value::Bool)),
        ("stop", ir.stop.clone()),
        ("seed", ir.seed.map(|v| Value::Number(v.into()))),
        (
            "presence_penalty",
            ir.presence_penalty.and_then(|v| serde_json::Number::from_f64(v).map(Value::Number)),
        ),
        (
            "frequency_penalty",
            ir.frequency_penalty.and_then(|v| serde_json::Number::from_f64(v).map(Value::Number)),
        ),
        ("logit_bias", ir.logit_bias.clone()),
        ("user", ir.user.clone().map(Value::String)),
        ("n", ir.n.map(|v| Value::Number(v.into()))),
        ("response_format", ir.response_format.clone()),
    ];
    debug_assert_eq!(scalars.len(), SCALAR_FIELDS.len());
    for (key, value) in scalars {
        if let Some(value) = value {
            map.insert(key.to_string(), value);
        }
    }
}

/* --- response conversion ---------------------------------------------------------------------- */

///
/// IR response → OpenAI chat completion object.
pub fn ir_response_to_wire(ir: &IrResponse) -> Result<Value> {
    let mut choices = Vec::with_capacity(ir.choices.len());
    for choice in &ir.choices {
        let mut message = Map::new();
        message.insert("role".into(), Value::String("assistant".into()));

        let text = choice.message.joined_text();
        let has_tool_calls =
            choice.message.tool_calls.as_ref().map(|c| !c.is_empty()).unwrap_or(false);
        if text.is_empty() && has_tool_calls {
            message.insert("content".into(), Value::Null);
        } else {
            message.insert("content".into(), Value::String(text));
        }

        if let Some(calls) = &choice.message.tool_calls {
            if !calls.is_empty() {
                let calls: Vec<Value> = calls.iter().map(ir_tool_call_to_wire).collect();
                message.insert("tool_calls".into(), Value::Array(calls));
            }
        }

        let finish_reason =
            if has_tool_calls { FinishReason::ToolCalls } else { choice.finish_reason };

        choices.push(json!({
            "index": choice.index,
            "message": Value::Object(message),
            "finish_reason": finish_reason.as_str(),
        }));
    }

    let mut map = Map::new();
    map.insert("id".into(), Value::String(ir.id.clone()));
    map.insert("object".into(), Value::String("chat.completion".into()));
    map.insert("created".into(), Value::Number(ir.created.into()));
    map.insert("model".into(), Value::String(ir.model.clone()));
    map.insert("choices".into(), Value::Array(choices));
    if let Some(usage) = &ir.usage {
        map.insert("usage".into(), usage_to_wire(usage));
    }
    Ok(Value::Object(map))
}

///
/// IR response → OpenAI legacy text completion object.
pub fn ir_response_to_completion_wire(ir: &IrResponse) -> Value {
    let choices: Vec<Value> = ir
        .choices
        .iter()
        .map(|choice| {
            json!({
                "index": choice.index,
                "text": choice.message.joined_text(),
                "logprobs": Value::Null,
                "finish_reason": choice.finish_reason.as_str(),
            })
        })
        .collect();

    let mut map = Map::new();
    map.insert("id".into(), Value::String(ir.id.clone()));
    map.insert("object".into(), Value::String("text_completion".into()));
    map.insert("created".into(), Value::Number(ir.created.into()));
    map.insert("model".into(), Value::String(ir.model.clone()));
    map.insert("choices".into(), Value::Array(choices));
    if let Some(usage) = &ir.usage {
        map.insert("usage".into(), usage_to_wire(usage));
    }
    Value::Object(map)
}

///
/// Usage block in OpenAI shape.
pub fn usage_to_wire(usage: &Usage) -> Value {
    json!({
        "prompt_tokens": usage.prompt_tokens,
        "completion_tokens": usage.completion_tokens,
        "total_tokens": usage.total_tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_round_trip() {
        let part = text_to_ir(&json!({"type": "text", "text": "hello"})).unwrap();
        assert_eq!(part, ContentPart::Text { text: "hello".into() });
        // Bare strings are accepted too.
        let bare = text_to_ir(&json!("hello")).unwrap();
        assert_eq!(bare, part);
    }

    #[test]
    fn test_image_data_url_round_trip() {
        let wire = json!({
            "type": "image_url",
            "image_url": {"url": "data:image/png;base64,iVBORw0KGgo=", "detail": "high"}
        });
        let part = image_to_ir(&wire).unwrap();
        match &part {
            ContentPart::Image { source: ImageSource::Data(data), detail } => {
                assert_eq!(data.media_type, "image/png");
                assert_eq!(data.data, "iVBORw0KGgo=");
                assert_eq!(*detail, ImageDetail::High);
                assert_eq!(ir_image_to_wire(&ImageSource::Data(data.clone()), *detail), wire);
            }
            other => panic!("unexpected part: {:?}", other),
        }
    }

    #[test]
    fn test_tool_call_arguments_parse_from_string() {
        let wire = json!({
            "id": "call_abc",
            "type": "function",
            "function": {"name": "get_weather", "arguments": "{\"location\":\"Chicago\"}"}
        });
        let call = tool_call_to_ir(&wire, 0).unwrap();
        assert_eq!(call.id, "call_abc");
        assert_eq!(call.arguments, json!({"location": "Chicago"}));

        let back = ir_tool_call_to_wire(&call);
        assert_eq!(back["function"]["arguments"], json!("{\"location\":\"Chicago\"}"));
    }

    #[test]
    fn test_tool_call_missing_id_synthesised() {
        let wire = json!({"type": "function", "function": {"name": "f", "arguments": "{}"}});
        let call = tool_call_to_ir(&wire, 2).unwrap();
        assert_eq!(call.id, "call_2");
    }

    #[test]
    fn test_tool_definition_round_trip() {
        let wire = json!({
            "type": "function",
            "function": {
                "name": "get_weather",
                "description": "Look up weather",
                "parameters": {"type": "object", "properties": {"location": {"type": "string"}}}
            }
        });
        let tool = tool_to_ir(&wire).unwrap();
        assert_eq!(ir_tool_to_wire(&tool), wire);
    }

    #[test]
    fn test_tool_choice_variants() {
        assert_eq!(tool_choice_to_ir(&json!("auto")).unwrap(), ToolChoice::Auto);
        assert_eq!(tool_choice_to_ir(&json!("required")).unwrap(), ToolChoice::Required);
        let specific =
            tool_choice_to_ir(&json!({"type": "function", "function": {"name": "f"}})).unwrap();
        assert_eq!(specific, ToolChoice::Specific { name: "f".into() });
        assert_eq!(
            ir_tool_choice_to_wire(&specific),
            json!({"type": "function", "function": {"name": "f"}})
        );
    }

    #[test]
    fn test_single_text_message_collapses_to_bare_string() {
        let message = message_to_ir(&json!({"role": "user", "content": "Hi"})).unwrap();
        let wire = ir_message_to_wire(&message).unwrap();
        assert_eq!(wire, json!({"role": "user", "content": "Hi"}));
    }

    #[test]
    fn test_tool_message_requires_tool_call_id() {
        let err = message_to_ir(&json!({"role": "tool", "content": "result"}));
        assert!(matches!(err, Err(ProxyError::BadRequest(_))));
    }

    #[test]
    fn test_legacy_prompt_synthesises_user_message() {
        let ir = request_to_ir(&json!({"model": "gpt-4o", "prompt": "Hello"})).unwrap();
        assert_eq!(ir.messages.len(), 1);
        assert_eq!(ir.messages[0].role, Role::User);
        assert_eq!(ir.messages[0].joined_text(), "Hello");
    }

    #[test]
    fn test_request_round_trip_preserves_scalars() {
        let wire = json!({
            "model": "argo:gpt-4o",
            "messages": [{"role": "user", "content": "Hi"}],
            "temperature": 0.5,
            "max_tokens": 128,
            "stream": true,
            "user": "someone",
        });
        let ir = request_to_ir(&wire).unwrap();
        let back = ir_request_to_wire(&ir).unwrap();
        assert_eq!(back["model"], wire["model"]);
        assert_eq!(back["temperature"], wire["temperature"]);
        assert_eq!(back["max_tokens"], wire["max_tokens"]);
        assert_eq!(back["stream"], wire["stream"]);
        assert_eq!(back["messages"], wire["messages"]);
    }

    #[test]
    fn test_response_tool_calls_force_finish_reason() {
        use crate::ir::{IrChoice, IrMessage};
        let ir = IrResponse {
            id: "chatcmpl-1".into(),
            created: 1,
            model: "gpt4o".into(),
            choices: vec![IrChoice {
                index: 0,
                message: IrMessage {
                    role: Role::Assistant,
                    content: vec![],
                    name: None,
                    tool_call_id: None,
                    tool_calls: Some(vec![ToolCallPart {
                        id: "call_1".into(),
                        name: "f".into(),
                        arguments: json!({}),
                    }]),
                },
                finish_reason: FinishReason::Stop,
            }],
            usage: None,
        };
        let wire = ir_response_to_wire(&ir).unwrap();
        assert_eq!(wire["choices"][0]["finish_reason"], json!("tool_calls"));
        assert_eq!(wire["choices"][0]["message"]["content"], Value::Null);
    }
}
