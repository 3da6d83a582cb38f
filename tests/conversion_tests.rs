//!
//! End-to-end conversion tests: client wire format → IR → Argo dialect and
//! back, including alias resolution and image handling.

use argomux::convert::{anthropic, argo, openai};
use argomux::models::{ModelFamily, ModelKind, ModelRegistry};
use argomux::tools::leaked::LeakLogger;
use argomux::tools::output::normalize_response;
use serde_json::{Value, json};

fn leak_logger() -> (tempfile::TempDir, LeakLogger) {
    let dir = tempfile::tempdir().unwrap();
    let logger = LeakLogger::new(dir.path().to_path_buf());
    (dir, logger)
}

#[test]
fn chat_alias_request_produces_internal_model_upstream() {
    let registry = ModelRegistry::new();
    let request = json!({
        "model": "argo:gpt-4o",
        "messages": [{"role": "user", "content": "Hi"}]
    });

    let ir = openai::request_to_ir(&request).unwrap();
    let internal = registry.resolve(ir.model.as_deref().unwrap(), ModelKind::Chat);
    assert_eq!(internal, "gpt4o");

    let upstream =
        argo::ir_request_to_argo(&ir, &internal, registry.family_of(&internal), "tester").unwrap();
    assert_eq!(upstream["model"], json!("gpt4o"));
    assert_eq!(upstream["user"], json!("tester"));
    assert_eq!(upstream["messages"], json!([{"role": "user", "content": "Hi"}]));
}

#[test]
fn bare_model_name_resolves_like_alias() {
    let registry = ModelRegistry::new();
    let aliased = registry.resolve("argo:gpt-4o", ModelKind::Chat);
    let bare = registry.resolve("gpt-4o", ModelKind::Chat);
    assert_eq!(aliased, bare);
}

#[test]
fn bare_string_upstream_becomes_single_choice_completion() {
    let (_dir, leak) = leak_logger();
    let normalized =
        normalize_response(&json!("Hello!"), ModelFamily::OpenAi, "gpt4o", &leak, false).unwrap();
    let ir = argo::build_ir_response(normalized.text, normalized.tool_calls, "argo:gpt-4o", None)
        .unwrap();
    let wire = openai::ir_response_to_wire(&ir).unwrap();

    assert_eq!(wire["object"], json!("chat.completion"));
    assert_eq!(wire["choices"].as_array().unwrap().len(), 1);
    assert_eq!(wire["choices"][0]["message"]["content"], json!("Hello!"));
    assert_eq!(wire["choices"][0]["finish_reason"], json!("stop"));
}

#[test]
fn data_url_image_reaches_argo_but_http_url_fails() {
    let data_request = json!({
        "model": "argo:gpt-4o",
        "messages": [{"role": "user", "content": [
            {"type": "text", "text": "what is this"},
            {"type": "image_url", "image_url": {"url": "data:image/png;base64,iVBORw0KGgo="}}
        ]}]
    });
    let ir = openai::request_to_ir(&data_request).unwrap();
    let upstream = argo::ir_request_to_argo(&ir, "gpt4o", ModelFamily::OpenAi, "u").unwrap();
    assert_eq!(
        upstream["messages"][0]["content"][1]["image_url"]["url"],
        json!("data:image/png;base64,iVBORw0KGgo=")
    );

    let http_request = json!({
        "model": "argo:gpt-4o",
        "messages": [{"role": "user", "content": [
            {"type": "image_url", "image_url": {"url": "https://example.com/x.png"}}
        ]}]
    });
    let ir = openai::request_to_ir(&http_request).unwrap();
    let err = argo::ir_request_to_argo(&ir, "gpt4o", ModelFamily::OpenAi, "u");
    assert!(matches!(err, Err(argomux::ProxyError::UnsupportedImageSource(_))));
}

#[test]
fn round_trip_openai_request_is_stable_modulo_normalisations() {
    let wire = json!({
        "model": "argo:gpt-4o",
        "messages": [
            {"role": "system", "content": "Be terse."},
            {"role": "user", "content": [
                {"type": "text", "text": "a"},
                {"type": "text", "text": "b"}
            ]},
            {"role": "assistant", "content": "ok", "tool_calls": [{
                "id": "call_9",
                "type": "function",
                "function": {"name": "f", "arguments": "{\"x\":1}"}
            }]},
            {"role": "tool", "content": "42", "tool_call_id": "call_9"}
        ],
        "temperature": 0.2,
        "stream": false
    });

    let ir = openai::request_to_ir(&wire).unwrap();
    let back = openai::ir_request_to_wire(&ir).unwrap();
    let again = openai::request_to_ir(&back).unwrap();
    assert_eq!(ir, again);
}

#[test]
fn anthropic_request_translates_to_argo_with_anthropic_tools() {
    let registry = ModelRegistry::new();
    let request = json!({
        "model": "argo:claude-sonnet-4",
        "max_tokens": 512,
        "system": "Be helpful.",
        "messages": [{"role": "user", "content": "Hi"}],
        "tools": [{
            "name": "search",
            "description": "Search things",
            "input_schema": {"type": "object", "properties": {"q": {"type": "string"}}}
        }]
    });

    let ir = anthropic::request_to_ir(&request).unwrap();
    let internal = registry.resolve(ir.model.as_deref().unwrap(), ModelKind::Chat);
    assert_eq!(internal, "claudesonnet4");
    let family = registry.family_of(&internal);
    assert_eq!(family, ModelFamily::Anthropic);

    let upstream = argo::ir_request_to_argo(&ir, &internal, family, "tester").unwrap();
    // Anthropic-family tool definitions keep the input_schema shape.
    assert_eq!(upstream["tools"][0]["input_schema"]["type"], json!("object"));
    assert_eq!(upstream["messages"][0]["role"], json!("system"));
    assert_eq!(upstream["max_tokens"], json!(512));
}

#[test]
fn anthropic_response_rebuilt_from_openai_style_tool_calls() {
    let (_dir, leak) = leak_logger();
    let upstream = json!({
        "response": {
            "content": "Let me check.",
            "tool_calls": [{
                "id": "toolu_77",
                "type": "function",
                "function": {"name": "search", "arguments": "{\"q\":\"x\"}"}
            }]
        }
    });
    let normalized = normalize_response(
        upstream.get("response").unwrap(),
        ModelFamily::Anthropic,
        "claudesonnet4",
        &leak,
        false,
    )
    .unwrap();
    let ir = argo::build_ir_response(
        normalized.text,
        normalized.tool_calls,
        "argo:claude-sonnet-4",
        None,
    )
    .unwrap();
    let wire = anthropic::ir_response_to_wire(&ir).unwrap();

    assert_eq!(wire["stop_reason"], json!("tool_use"));
    assert_eq!(wire["content"][0]["text"], json!("Let me check."));
    assert_eq!(wire["content"][1]["id"], json!("toolu_77"));
    assert_eq!(wire["content"][1]["input"], json!({"q": "x"}));
}

#[test]
fn embeddings_translate_both_directions() {
    let request = argo::embed_request_to_argo(&json!(["a", "b"]), "v3small", "tester").unwrap();
    assert_eq!(request["model"], json!("v3small"));
    assert_eq!(request["prompt"], json!(["a", "b"]));

    let response = argo::embed_response_to_openai(
        &json!({"embedding": [[0.1, 0.2], [0.3, 0.4]]}),
        "argo:text-embedding-3-small",
    )
    .unwrap();
    assert_eq!(response["data"].as_array().unwrap().len(), 2);
    assert_eq!(response["data"][1]["index"], json!(1));
    assert_eq!(response["model"], json!("argo:text-embedding-3-small"));
}

#[test]
fn unknown_fields_are_dropped_not_copied() {
    let wire = json!({
        "model": "argo:gpt-4o",
        "messages": [{"role": "user", "content": "Hi"}],
        "some_vendor_extension": {"a": 1}
    });
    let ir = openai::request_to_ir(&wire).unwrap();
    let upstream = argo::ir_request_to_argo(&ir, "gpt4o", ModelFamily::OpenAi, "u").unwrap();
    assert!(upstream.get("some_vendor_extension").is_none());
}

#[test]
fn file_parts_are_rejected_as_unsupported() {
    let wire = json!({
        "model": "argo:gpt-4o",
        "messages": [{"role": "user", "content": [
            {"type": "file", "file": {"file_id": "f1"}}
        ]}]
    });
    let err = openai::request_to_ir(&wire);
    assert!(matches!(err, Err(argomux::ProxyError::UnsupportedContent(_))));
}

#[test]
fn upstream_usage_is_passed_through() {
    let body = json!({
        "response": "ok",
        "usage": {"prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12}
    });
    let usage = argo::usage_from_body(&body).unwrap();
    assert_eq!(usage.prompt_tokens, 10);
    assert_eq!(usage.total_tokens, 12);
    assert!(argo::usage_from_body(&json!({"response": "ok"})).is_none());
}

#[test]
fn google_family_request_emits_google_tool_shapes() {
    let registry = ModelRegistry::new();
    let request = json!({
        "model": "argo:gemini-2.5-pro",
        "messages": [{"role": "user", "content": "party time"}],
        "tools": [{
            "type": "function",
            "function": {
                "name": "power_disco_ball",
                "description": "Powers the spinning disco ball.",
                "parameters": {"type": "object", "properties": {"power": {"type": "boolean"}}}
            }
        }],
        "tool_choice": "auto"
    });

    let ir = openai::request_to_ir(&request).unwrap();
    let internal = registry.resolve("argo:gemini-2.5-pro", ModelKind::Chat);
    let family = registry.family_of(&internal);
    assert_eq!(family, ModelFamily::Google);

    // Without the prompting rewrite the Google wire shapes appear verbatim.
    let upstream = argo::ir_request_to_argo(&ir, &internal, family, "u").unwrap();
    assert_eq!(upstream["tools"][0]["name"], json!("power_disco_ball"));
    assert!(upstream["tools"][0].get("function").is_none());
    assert_eq!(
        upstream["tool_choice"]["function_calling_config"]["mode"],
        json!("AUTO")
    );
}

#[test]
fn argo_single_text_collapse_round_trips_through_ir() {
    // bare string ↔ single-text-part is the documented normalisation pair
    let message = openai::message_to_ir(&json!({"role": "user", "content": "Hi"})).unwrap();
    let argo_msg = argo::ir_message_to_argo(&message, ModelFamily::OpenAi).unwrap();
    assert_eq!(argo_msg["content"], Value::String("Hi".into()));

    let multi = openai::message_to_ir(&json!({
        "role": "user",
        "content": [{"type": "text", "text": "a"}, {"type": "text", "text": "b"}]
    }))
    .unwrap();
    let argo_multi = argo::ir_message_to_argo(&multi, ModelFamily::OpenAi).unwrap();
    assert!(argo_multi["content"].is_array());
}
