//!
//! Streaming transport tests: pseudo-stream frame sequence and SSE payload
//! integrity.

use argomux::convert::argo;
use argomux::ir::{FinishReason, IrChoice, IrMessage, IrResponse, Role};
use argomux::models::ModelFamily;
use argomux::stream::{DONE_MARKER, chunk_text, pseudo_chunk_payloads, sse_frame};
use argomux::tools::leaked::LeakLogger;
use argomux::tools::output::normalize_response;
use serde_json::{Value, json};

fn buffered_response(text: &str) -> IrResponse {
    IrResponse {
        id: "chatcmpl-t".into(),
        created: 1,
        model: "gpt4o".into(),
        choices: vec![IrChoice {
            index: 0,
            message: IrMessage::text(Role::Assistant, text),
            finish_reason: FinishReason::Stop,
        }],
        usage: None,
    }
}

#[test]
fn pseudo_stream_of_buffered_upstream_answer() {
    // A non-streaming upstream answered with a buffered string while the
    // client requested streaming.
    let dir = tempfile::tempdir().unwrap();
    let leak = LeakLogger::new(dir.path().to_path_buf());
    let normalized = normalize_response(
        &json!("12345678901234567890"),
        ModelFamily::OpenAi,
        "gpt4o",
        &leak,
        false,
    )
    .unwrap();
    let response =
        argo::build_ir_response(normalized.text, normalized.tool_calls, "gpt4o", None).unwrap();

    let payloads = pseudo_chunk_payloads(&response);
    // role delta + at least one content chunk + finish: at least two data
    // frames before [DONE].
    assert!(payloads.len() >= 2);

    let last_content = payloads
        .iter()
        .rev()
        .find_map(|p| p["choices"][0]["delta"]["content"].as_str())
        .unwrap();
    assert!(last_content.ends_with("0"));

    let finish = payloads.last().unwrap();
    assert_eq!(finish["choices"][0]["finish_reason"], json!("stop"));
}

#[test]
fn long_text_splits_into_fixed_size_chunks() {
    let response = buffered_response(&"x".repeat(95));
    let payloads = pseudo_chunk_payloads(&response);

    let contents: Vec<&str> = payloads
        .iter()
        .filter_map(|p| p["choices"][0]["delta"]["content"].as_str())
        .collect();
    assert_eq!(contents.len(), 4); // 30 + 30 + 30 + 5
    assert_eq!(contents[0].len(), 30);
    assert_eq!(contents[3].len(), 5);
}

#[test]
fn concatenated_frames_reassemble_the_answer() {
    let text = "The quick brown fox jumps over the lazy dog, twice over.";
    let response = buffered_response(text);
    let payloads = pseudo_chunk_payloads(&response);

    let mut reassembled = String::new();
    for payload in &payloads {
        // Every frame payload is a well-formed JSON object.
        let serialized = serde_json::to_string(payload).unwrap();
        let parsed: Value = serde_json::from_str(&serialized).unwrap();
        if let Some(content) = parsed["choices"][0]["delta"]["content"].as_str() {
            reassembled.push_str(content);
        }
    }
    assert_eq!(reassembled, text);
}

#[test]
fn chunking_respects_character_boundaries() {
    let text = "héllo wörld ".repeat(10);
    let chunks = chunk_text(&text, 30);
    assert_eq!(chunks.concat(), text);
    for chunk in &chunks[..chunks.len() - 1] {
        assert_eq!(chunk.chars().count(), 30);
    }
}

#[test]
fn sse_frames_and_done_marker() {
    assert_eq!(sse_frame("{\"a\":1}"), "data: {\"a\":1}\n\n");
    assert_eq!(DONE_MARKER, "[DONE]");
}

#[test]
fn tool_call_chunks_follow_text_chunks() {
    let mut response = buffered_response("thinking");
    response.choices[0].message.tool_calls = Some(vec![argomux::ir::ToolCallPart {
        id: "call_1".into(),
        name: "f".into(),
        arguments: json!({"a": 1}),
    }]);

    let payloads = pseudo_chunk_payloads(&response);
    let tool_frame = payloads
        .iter()
        .find(|p| p["choices"][0]["delta"].get("tool_calls").is_some())
        .unwrap();
    assert_eq!(
        tool_frame["choices"][0]["delta"]["tool_calls"][0]["function"]["name"],
        json!("f")
    );
}
