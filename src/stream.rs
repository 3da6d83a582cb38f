//!
//! Streaming transport: UTF-8-safe chunk decoding, SSE framing, and
//! pseudo-streaming of buffered responses.
//!
//! Upstream byte chunks may split multi-byte UTF-8 sequences across packet
//! boundaries; the stateful decoder carries at most three pending bytes
//! between invocations and flushes with replacement at end of stream. The
//! pseudo-stream generator slices a fully buffered answer into fixed-size
//! chunks with a short inter-chunk delay so clients that requested
//! streaming see an SSE sequence indistinguishable from a live stream.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use axum::response::sse::Event;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::error;

use crate::error::Result;
use crate::ir::IrResponse;

/* --- constants ------------------------------------------------------------------------------ */

/** Characters per pseudo-stream chunk */
pub const PSEUDO_CHUNK_SIZE: usize = 30;

/** Delay between pseudo-stream chunks in milliseconds */
pub const PSEUDO_CHUNK_DELAY_MS: u64 = 10;

/** Channel buffer size for streaming responses */
pub const STREAMING_CHANNEL_BUFFER: usize = 100;

/** Terminal SSE payload for chat-completions streams */
pub const DONE_MARKER: &str = "[DONE]";

/* --- types ----------------------------------------------------------------------------------- */

///
/// Stateful UTF-8 stream decoder.
///
/// Decodes the longest UTF-8-valid prefix of each chunk and retains the
/// unparsed tail (at most three bytes, by UTF-8 sequence length) for the
/// next call. Invalid sequences inside a chunk are replaced immediately so
/// the pending buffer never grows past a partial trailing character.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    pending: Vec<u8>,
}

/* --- start of code -------------------------------------------------------------------------- */

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    ///
    /// Decode one byte chunk.
    ///
    /// # Arguments
    ///  * `chunk` - raw bytes from the wire
    ///
    /// # Returns
    ///  * All text that became decodable with this chunk
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut buffer = std::mem::take(&mut self.pending);
        buffer.extend_from_slice(chunk);

        let mut out = String::with_capacity(buffer.len());
        let mut rest: &[u8] = &buffer;

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let valid_len = e.valid_up_to();
                    out.push_str(std::str::from_utf8(&rest[..valid_len]).unwrap_or_default());
                    rest = &rest[valid_len..];
                    match e.error_len() {
                        Some(invalid) => {
                            // Definitely malformed; replace and keep going.
                            out.push('\u{FFFD}');
                            rest = &rest[invalid..];
                        }
                        None => {
                            // Incomplete trailing sequence (≤3 bytes): defer.
                            break;
                        }
                    }
                }
            }
        }

        self.pending = rest.to_vec();
        out
    }

    ///
    /// Flush remaining bytes at end of stream, replacing invalid sequences.
    pub fn flush(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let pending = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&pending).into_owned()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/* --- sse framing ------------------------------------------------------------------------------ */

///
/// Encode one payload as a raw SSE data frame (`data: <payload>\n\n`).
///
/// Used where frames are written to the socket by hand (passthrough
/// streaming); axum handlers use [`Event`] instead, which produces the same
/// bytes.
pub fn sse_frame(payload: &str) -> String {
    format!("data: {}\n\n", payload)
}

///
/// Send one SSE data event through a streaming channel.
pub async fn send_sse_event(tx: &mpsc::Sender<Result<Event>>, data: &str) {
    let _ = tx.send(Ok(Event::default().data(data))).await;
}

///
/// Send a JSON payload as an SSE data event.
pub async fn send_sse_json(tx: &mpsc::Sender<Result<Event>>, payload: &Value) {
    match serde_json::to_string(payload) {
        Ok(json) => send_sse_event(tx, &json).await,
        Err(e) => error!("Failed to serialize SSE payload: {}", e),
    }
}

///
/// Send the final [DONE] event that terminates a chat-completions stream.
pub async fn send_stream_done(tx: &mpsc::Sender<Result<Event>>) {
    send_sse_event(tx, DONE_MARKER).await;
}

/* --- chunk builders --------------------------------------------------------------------------- */

///
/// Build one OpenAI `chat.completion.chunk` object.
pub fn chat_chunk(id: &str, created: i64, model: &str, delta: Value, finish_reason: Option<&str>) -> Value {
    json!({
        "id": id,
        "object": "chat.completion.chunk",
        "created": created,
        "model": model,
        "choices": [{
            "index": 0,
            "delta": delta,
            "finish_reason": finish_reason,
        }],
    })
}

///
/// Split text into fixed-size chunks on character boundaries.
pub fn chunk_text(text: &str, size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::with_capacity(size * 4);
    let mut count = 0;
    for ch in text.chars() {
        current.push(ch);
        count += 1;
        if count == size {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/* --- pseudo-stream ---------------------------------------------------------------------------- */

///
/// The chunk payloads that replay a buffered IR response as an OpenAI
/// chat-completions stream: a role delta, fixed-size text chunks, any tool
/// calls, and the finish chunk. The terminal [DONE] marker is not included.
pub fn pseudo_chunk_payloads(response: &IrResponse) -> Vec<Value> {
    let Some(choice) = response.choices.first() else {
        return Vec::new();
    };
    let id = response.id.as_str();
    let created = response.created;
    let model = response.model.as_str();

    let mut payloads =
        vec![chat_chunk(id, created, model, json!({"role": "assistant"}), None)];

    let text = choice.message.joined_text();
    for chunk in chunk_text(&text, PSEUDO_CHUNK_SIZE) {
        payloads.push(chat_chunk(id, created, model, json!({"content": chunk}), None));
    }

    if let Some(calls) = &choice.message.tool_calls {
        for (index, call) in calls.iter().enumerate() {
            let arguments = match &call.arguments {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let delta = json!({
                "tool_calls": [{
                    "index": index,
                    "id": call.id,
                    "type": "function",
                    "function": {"name": call.name, "arguments": arguments},
                }],
            });
            payloads.push(chat_chunk(id, created, model, delta, None));
        }
    }

    let finish = choice.finish_reason.as_str();
    payloads.push(chat_chunk(id, created, model, json!({}), Some(finish)));
    payloads
}

///
/// Emit a fully buffered IR response as an OpenAI chat-completions SSE
/// stream, with the standard inter-chunk delay between text frames,
/// terminated by the [DONE] marker.
///
/// # Arguments
///  * `tx` - streaming channel to the client
///  * `response` - buffered response to replay
pub async fn pseudo_stream_chat(tx: mpsc::Sender<Result<Event>>, response: IrResponse) {
    for payload in pseudo_chunk_payloads(&response) {
        send_sse_json(&tx, &payload).await;
        tokio::time::sleep(std::time::Duration::from_millis(PSEUDO_CHUNK_DELAY_MS)).await;
    }
    send_stream_done(&tx).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_handles_split_multibyte() {
        let mut decoder = StreamDecoder::new();
        // "世界" split mid-character.
        let bytes = "世界".as_bytes();
        let first = decoder.decode(&bytes[..4]);
        assert_eq!(first, "世");
        assert!(decoder.has_pending());
        let second = decoder.decode(&bytes[4..]);
        assert_eq!(second, "界");
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_decoder_pending_never_exceeds_three_bytes() {
        let mut decoder = StreamDecoder::new();
        let bytes = "😀".as_bytes(); // four bytes
        decoder.decode(&bytes[..3]);
        assert!(decoder.pending.len() <= 3);
        let rest = decoder.decode(&bytes[3..]);
        assert_eq!(rest, "😀");
    }

    #[test]
    fn test_decoder_replaces_invalid_sequence() {
        let mut decoder = StreamDecoder::new();
        let out = decoder.decode(b"ok\xffrest");
        assert_eq!(out, "ok\u{FFFD}rest");
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_decoder_flush_replaces_truncated_tail() {
        let mut decoder = StreamDecoder::new();
        let bytes = "界".as_bytes();
        let out = decoder.decode(&bytes[..2]);
        assert_eq!(out, "");
        let flushed = decoder.flush();
        assert_eq!(flushed, "\u{FFFD}\u{FFFD}");
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_sse_frame_shape() {
        assert_eq!(sse_frame("{}"), "data: {}\n\n");
    }

    #[test]
    fn test_chunk_text_boundaries() {
        let chunks = chunk_text("12345678901234567890", 30);
        assert_eq!(chunks, vec!["12345678901234567890".to_string()]);

        let chunks = chunk_text(&"a".repeat(65), 30);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].len(), 5);

        // Multi-byte characters never split.
        let chunks = chunk_text(&"é".repeat(31), 30);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), 30);
    }

    #[tokio::test]
    async fn test_pseudo_stream_emits_frames_and_done() {
        use crate::ir::{FinishReason, IrChoice, IrMessage, Role};

        let response = IrResponse {
            id: "chatcmpl-test".into(),
            created: 1,
            model: "gpt4o".into(),
            choices: vec![IrChoice {
                index: 0,
                message: IrMessage::text(Role::Assistant, "a".repeat(65)),
                finish_reason: FinishReason::Stop,
            }],
            usage: None,
        };

        let (tx, mut rx) = mpsc::channel(STREAMING_CHANNEL_BUFFER);
        tokio::spawn(pseudo_stream_chat(tx, response));

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event.unwrap());
        }
        // role + 3 text chunks + finish + [DONE]
        assert_eq!(events.len(), 6);
    }
}
