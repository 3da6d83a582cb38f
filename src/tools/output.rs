//!
//! Response-side tool call normalisation.
//!
//! Reduces the Argo `response` field, whatever its dialect, to plain text
//! plus a list of IR tool calls: structured OpenAI/Anthropic/Google call
//! shapes, Gemini `<tool_call>` tagged blocks embedded in text, and leaked
//! Claude tool calls recovered from text content.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::convert::{anthropic, google, openai};
use crate::error::{ProxyError, Result};
use crate::ir::ToolCallPart;
use crate::models::ModelFamily;

use super::leaked::{LeakLogger, LeakedToolParser};

/* --- constants ------------------------------------------------------------------------------ */

/** Opening tag of a Gemini text-embedded tool call */
const TOOL_CALL_OPEN: &str = "<tool_call>";

/** Closing tag of a Gemini text-embedded tool call */
const TOOL_CALL_CLOSE: &str = "</tool_call>";

/* --- types ----------------------------------------------------------------------------------- */

///
/// Normalised upstream output: assistant text plus tool calls in upstream
/// order. `text` is None when nothing but tool calls remained.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NormalizedOutput {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCallPart>,
}

/* --- start of code -------------------------------------------------------------------------- */

///
/// Normalise the Argo `response` field into text plus IR tool calls.
///
/// Handles, in order:
/// 1. the three envelope shapes — bare string, `{content, tool_calls}`
///    object, Anthropic-style content-block array;
/// 2. family-specific structured tool call parsing;
/// 3. Gemini `<tool_call>` tagged blocks when the family is Google-like and
///    no structured calls exist;
/// 4. leaked Claude tool calls embedded in text (logged always, substituted
///    only when the fix is enabled).
///
/// # Arguments
///  * `response` - the Argo `response` field value
///  * `family` - wire-format family of the answering model
///  * `model` - internal model id (for leak records)
///  * `leak_logger` - leak log sink
///  * `fix_leaked` - substitute recovered leaks into the result
pub fn normalize_response(
    response: &Value,
    family: ModelFamily,
    model: &str,
    leak_logger: &LeakLogger,
    fix_leaked: bool,
) -> Result<NormalizedOutput> {
    let (mut text, raw_calls) = split_envelope(response)?;

    let mut tool_calls = Vec::with_capacity(raw_calls.len());
    for (index, raw) in raw_calls.iter().enumerate() {
        match parse_tool_call(raw, family, index) {
            Ok(call) => tool_calls.push(call),
            Err(e) => warn!("Dropping unparseable upstream tool call: {}", e),
        }
    }

    // Gemini leaks tool calls as tagged text when it ignores the native
    // protocol; only scan when nothing structured came back.
    if tool_calls.is_empty() && matches!(family, ModelFamily::Google | ModelFamily::Unknown) {
        if let Some(current) = text.take() {
            let (tagged, cleaned) = extract_tagged_tool_calls(&current);
            if tagged.is_empty() {
                text = Some(current);
            } else {
                tool_calls.extend(tagged);
                text = if cleaned.is_empty() { None } else { Some(cleaned) };
            }
        }
    }

    if family == ModelFamily::Anthropic {
        if let Some(current) = text.as_ref() {
            let parser = LeakedToolParser::new();
            let (leaks, cleaned) = parser.extract_all(current);
            if !leaks.is_empty() {
                for leak in &leaks {
                    leak_logger.record(leak, model, fix_leaked);
                }
                if fix_leaked {
                    for leak in leaks {
                        tool_calls.push(ToolCallPart {
                            id: leak.id,
                            name: leak.name,
                            arguments: leak.input,
                        });
                    }
                    text = if cleaned.is_empty() { None } else { Some(cleaned) };
                }
            }
        }
    }

    Ok(NormalizedOutput { text, tool_calls })
}

///
/// Split the `response` envelope into raw text and raw tool-call values.
fn split_envelope(response: &Value) -> Result<(Option<String>, Vec<Value>)> {
    match response {
        Value::String(s) => Ok((Some(s.clone()), Vec::new())),
        Value::Array(blocks) => Ok(split_block_array(blocks)),
        Value::Object(map) => {
            let calls = map
                .get("tool_calls")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let text = match map.get("content") {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Array(blocks)) => {
                    let (text, block_calls) = split_block_array(blocks);
                    if calls.is_empty() && !block_calls.is_empty() {
                        return Ok((text, block_calls));
                    }
                    text
                }
                Some(Value::Null) | None => None,
                Some(other) => Some(other.to_string()),
            };
            Ok((text, calls))
        }
        other => Err(ProxyError::UpstreamInvalidResponse(format!(
            "unexpected response shape: {}",
            other
        ))),
    }
}

///
/// Anthropic-style content block array → (text, raw tool_use blocks).
fn split_block_array(blocks: &[Value]) -> (Option<String>, Vec<Value>) {
    let mut text = String::new();
    let mut calls = Vec::new();
    for block in blocks {
        match block {
            Value::String(s) => text.push_str(s),
            Value::Object(map) => match map.get("type").and_then(Value::as_str) {
                Some("text") => {
                    if let Some(t) = map.get("text").and_then(Value::as_str) {
                        text.push_str(t);
                    }
                }
                Some("tool_use") => calls.push(block.clone()),
                _ => {}
            },
            _ => {}
        }
    }
    let text = if text.is_empty() && !calls.is_empty() { None } else { Some(text) };
    (text, calls)
}

///
/// Parse one structured tool call in the family's dialect.
///
/// The per-dialect markers win over the declared family, so a response that
/// mixes conventions still lands on the right parser.
fn parse_tool_call(raw: &Value, family: ModelFamily, index: usize) -> Result<ToolCallPart> {
    if raw.get("function").is_some() {
        return openai::tool_call_to_ir(raw, index);
    }
    if raw.get("type").and_then(Value::as_str) == Some("tool_use") || raw.get("input").is_some() {
        return anthropic::tool_call_to_ir(raw, index);
    }
    if raw.get("functionCall").is_some()
        || raw.get("function_call").is_some()
        || raw.get("args").is_some()
    {
        return google::tool_call_to_ir(raw, index);
    }
    match family {
        ModelFamily::Anthropic => anthropic::tool_call_to_ir(raw, index),
        ModelFamily::Google => google::tool_call_to_ir(raw, index),
        _ => openai::tool_call_to_ir(raw, index),
    }
}

/* --- gemini tagged calls ---------------------------------------------------------------------- */

///
/// Extract `<tool_call>{…}</tool_call>` blocks from text.
///
/// Each matched JSON must contain at minimum `name`; `arguments` defaults to
/// an empty object. Matched tag substrings are stripped from the text.
/// Synthesised ids are `call_gemini_<i>_<stable-hash>` so retries of the
/// same response produce the same ids.
///
/// # Arguments
///  * `text` - assistant text content
///
/// # Returns
///  * Synthesised tool calls in match order, and the cleaned text
pub fn extract_tagged_tool_calls(text: &str) -> (Vec<ToolCallPart>, String) {
    let mut calls = Vec::new();
    let mut cleaned = String::with_capacity(text.len());
    let mut rest = text;
    let mut index = 0;

    while let Some(open) = rest.find(TOOL_CALL_OPEN) {
        let after_open = &rest[open + TOOL_CALL_OPEN.len()..];
        let Some(close) = after_open.find(TOOL_CALL_CLOSE) else {
            break;
        };

        let payload = after_open[..close].trim();
        match serde_json::from_str::<Value>(payload) {
            Ok(data) if data.get("name").and_then(Value::as_str).is_some() => {
                let name = data["name"].as_str().unwrap_or_default().to_string();
                let arguments = data.get("arguments").cloned().unwrap_or_else(|| json!({}));
                calls.push(ToolCallPart {
                    id: format!("call_gemini_{}_{}", index, stable_hash(payload)),
                    name,
                    arguments,
                });
                index += 1;
            }
            Ok(_) => warn!("Tagged tool call without 'name', dropping: {}", payload),
            Err(e) => warn!("Failed to parse tagged tool call JSON: {}", e),
        }

        cleaned.push_str(&rest[..open]);
        rest = &after_open[close + TOOL_CALL_CLOSE.len()..];
    }

    cleaned.push_str(rest);
    (calls, cleaned.trim().to_string())
}

///
/// Stable five-digit hash of a tagged payload.
fn stable_hash(payload: &str) -> u32 {
    let digest = Sha256::digest(payload.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) % 100_000
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logger() -> (tempfile::TempDir, LeakLogger) {
        let dir = tempfile::tempdir().unwrap();
        let logger = LeakLogger::new(dir.path().to_path_buf());
        (dir, logger)
    }

    #[test]
    fn test_bare_string_envelope() {
        let (_dir, leak) = logger();
        let out = normalize_response(&json!("hello"), ModelFamily::OpenAi, "gpt4o", &leak, false)
            .unwrap();
        assert_eq!(out.text.as_deref(), Some("hello"));
        assert!(out.tool_calls.is_empty());
    }

    #[test]
    fn test_object_envelope_with_openai_calls() {
        let (_dir, leak) = logger();
        let response = json!({
            "content": null,
            "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": {"name": "f", "arguments": "{\"a\":1}"}
            }]
        });
        let out =
            normalize_response(&response, ModelFamily::OpenAi, "gpt4o", &leak, false).unwrap();
        assert!(out.text.is_none());
        assert_eq!(out.tool_calls[0].name, "f");
        assert_eq!(out.tool_calls[0].arguments, json!({"a": 1}));
    }

    #[test]
    fn test_anthropic_block_array_envelope() {
        let (_dir, leak) = logger();
        let response = json!([
            {"type": "text", "text": "Let me look."},
            {"type": "tool_use", "id": "toolu_9", "name": "search", "input": {"q": "x"}}
        ]);
        let out =
            normalize_response(&response, ModelFamily::Anthropic, "claudesonnet4", &leak, false)
                .unwrap();
        assert_eq!(out.text.as_deref(), Some("Let me look."));
        assert_eq!(out.tool_calls[0].id, "toolu_9");
    }

    #[test]
    fn test_gemini_tagged_call_extracted() {
        let (_dir, leak) = logger();
        let response = json!(
            "hello<tool_call>{\"name\": \"get_weather\", \"arguments\": {\"location\": \"Chicago\"}}</tool_call>"
        );
        let out =
            normalize_response(&response, ModelFamily::Google, "gemini25pro", &leak, false)
                .unwrap();
        assert_eq!(out.text.as_deref(), Some("hello"));
        assert_eq!(out.tool_calls.len(), 1);
        assert_eq!(out.tool_calls[0].name, "get_weather");
        assert_eq!(out.tool_calls[0].arguments, json!({"location": "Chicago"}));
        assert!(out.tool_calls[0].id.starts_with("call_gemini_0_"));
    }

    #[test]
    fn test_gemini_tag_only_yields_null_text() {
        let (calls, cleaned) = extract_tagged_tool_calls(
            "<tool_call>{\"name\": \"f\"}</tool_call>",
        );
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments, json!({}));
        assert!(cleaned.is_empty());
    }

    #[test]
    fn test_gemini_ids_are_stable() {
        let payload = "<tool_call>{\"name\": \"f\"}</tool_call>";
        let (first, _) = extract_tagged_tool_calls(payload);
        let (second, _) = extract_tagged_tool_calls(payload);
        assert_eq!(first[0].id, second[0].id);
    }

    #[test]
    fn test_structured_calls_suppress_tag_scan() {
        let (_dir, leak) = logger();
        let response = json!({
            "content": "<tool_call>{\"name\": \"f\"}</tool_call>",
            "tool_calls": [{"functionCall": {"name": "g", "args": {}}}]
        });
        let out =
            normalize_response(&response, ModelFamily::Google, "gemini25pro", &leak, false)
                .unwrap();
        assert_eq!(out.tool_calls.len(), 1);
        assert_eq!(out.tool_calls[0].name, "g");
        // The tagged text stays in content untouched.
        assert!(out.text.as_deref().unwrap_or_default().contains(TOOL_CALL_OPEN));
    }

    #[test]
    fn test_leaked_tool_fix_disabled_keeps_text() {
        let (_dir, leak) = logger();
        let text = "Let me search.{'id': 'toolu_01A', 'input': {'q': 'x'}, 'name': 's', 'type': 'tool_use'}";
        let out = normalize_response(
            &json!(text),
            ModelFamily::Anthropic,
            "claudesonnet4",
            &leak,
            false,
        )
        .unwrap();
        assert_eq!(out.text.as_deref(), Some(text));
        assert!(out.tool_calls.is_empty());
    }

    #[test]
    fn test_leaked_tool_fix_enabled_substitutes() {
        let (_dir, leak) = logger();
        let text = "Let me search.{'id': 'toolu_01A', 'input': {'q': 'x'}, 'name': 's', 'type': 'tool_use'}";
        let out = normalize_response(
            &json!(text),
            ModelFamily::Anthropic,
            "claudesonnet4",
            &leak,
            true,
        )
        .unwrap();
        assert_eq!(out.text.as_deref(), Some("Let me search."));
        assert_eq!(out.tool_calls.len(), 1);
        assert_eq!(out.tool_calls[0].id, "toolu_01A");
        assert_eq!(out.tool_calls[0].arguments, json!({"q": "x"}));
    }

    #[test]
    fn test_google_call_ids_synthesised_by_position() {
        let (_dir, leak) = logger();
        let response = json!({
            "content": "",
            "tool_calls": [
                {"functionCall": {"name": "a", "args": {}}},
                {"functionCall": {"name": "b", "args": {}}}
            ]
        });
        let out =
            normalize_response(&response, ModelFamily::Google, "gemini25pro", &leak, false)
                .unwrap();
        assert_eq!(out.tool_calls[0].id, "call_0");
        assert_eq!(out.tool_calls[1].id, "call_1");
    }
}
