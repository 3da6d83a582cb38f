//!
//! Canonical intermediate representation (IR) for chat traffic.
//!
//! Every wire-specific converter produces or consumes only these types; no
//! converter reaches across the IR to another wire format directly. All IR
//! values are per-request, owned by the endpoint handler, and dropped once
//! the response has been written.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use serde_json::Value;

/* --- types ----------------------------------------------------------------------------------- */

///
/// Conversation role of an IR message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

///
/// Image detail hint carried through from OpenAI-style requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageDetail {
    #[default]
    Auto,
    Low,
    High,
}

///
/// Inline base64 image payload with its MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    /** base64-encoded image bytes (no data-URL prefix) */
    pub data: String,
    /** MIME type, e.g. `image/png` */
    pub media_type: String,
}

///
/// Where an IR image comes from. Exactly one source is present per image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /** remote or data URL as received on the wire */
    Url(String),
    /** decoded base64 payload */
    Data(ImageData),
}

///
/// A single tool invocation requested by the model.
///
/// The id is preserved opaquely in whatever format the origin dialect used
/// (`call_…`, `toolu_…`, or a synthesized `call_<index>`).
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallPart {
    /** non-empty tool call identifier */
    pub id: String,
    /** function name to invoke */
    pub name: String,
    /** parsed JSON arguments object */
    pub arguments: Value,
}

///
/// Tagged content part of an IR message.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    /** plain text */
    Text { text: String },
    /** image by URL or inline data */
    Image {
        source: ImageSource,
        detail: ImageDetail,
    },
    /** tool invocation embedded in content */
    ToolCall(ToolCallPart),
    /** result of an earlier tool invocation */
    ToolResult {
        tool_call_id: String,
        content: String,
    },
    /** reserved; emitting this toward any wire fails with `UnsupportedContent` */
    File,
}

///
/// A tool the model may call, with its JSON-Schema parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: Option<String>,
    /** JSON Schema object describing the parameters */
    pub parameters: Value,
}

///
/// How the model should select among the available tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolChoice {
    Auto,
    None,
    Required,
    /** force a specific named tool */
    Specific { name: String },
}

///
/// A single conversation message in IR form.
///
/// `content` is always an ordered part list, even when the wire format used a
/// bare string. A message with role [`Role::Tool`] must carry `tool_call_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct IrMessage {
    pub role: Role,
    pub content: Vec<ContentPart>,
    pub name: Option<String>,
    pub tool_call_id: Option<String>,
    pub tool_calls: Option<Vec<ToolCallPart>>,
}

///
/// A full chat request in IR form.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IrRequest {
    pub messages: Vec<IrMessage>,
    pub model: Option<String>,
    pub tools: Option<Vec<ToolDefinition>>,
    pub tool_choice: Option<ToolChoice>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_tokens: Option<u32>,
    pub stream: Option<bool>,
    pub stop: Option<Value>,
    pub seed: Option<i64>,
    pub presence_penalty: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub logit_bias: Option<Value>,
    pub user: Option<String>,
    pub n: Option<u32>,
    pub response_format: Option<Value>,
}

///
/// Why a choice stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
}

///
/// Token accounting attached to a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

///
/// One generated alternative within a response.
#[derive(Debug, Clone, PartialEq)]
pub struct IrChoice {
    pub index: u32,
    pub message: IrMessage,
    pub finish_reason: FinishReason,
}

///
/// A full chat response in IR form.
///
/// Invariant: if any choice's message carries tool calls, that choice's
/// finish reason is [`FinishReason::ToolCalls`].
#[derive(Debug, Clone, PartialEq)]
pub struct IrResponse {
    pub id: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<IrChoice>,
    pub usage: Option<Usage>,
}

/* --- start of code -------------------------------------------------------------------------- */

impl Role {
    ///
    /// Wire-level role string shared by the OpenAI and Argo dialects.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }

    ///
    /// Parse a wire-level role string.
    ///
    /// # Arguments
    ///  * `s` - role string from any supported dialect
    ///
    /// # Returns
    ///  * Parsed role, or None for unknown roles
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" | "developer" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" | "model" => Some(Role::Assistant),
            "tool" => Some(Role::Tool),
            _ => None,
        }
    }
}

impl ImageDetail {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageDetail::Auto => "auto",
            ImageDetail::Low => "low",
            ImageDetail::High => "high",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "low" => ImageDetail::Low,
            "high" => ImageDetail::High,
            _ => ImageDetail::Auto,
        }
    }
}

impl FinishReason {
    ///
    /// OpenAI-compatible finish reason string.
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ToolCalls => "tool_calls",
            FinishReason::ContentFilter => "content_filter",
        }
    }

    ///
    /// Anthropic-compatible stop reason string.
    pub fn as_anthropic_str(&self) -> &'static str {
        match self {
            FinishReason::Stop => "end_turn",
            FinishReason::Length => "max_tokens",
            FinishReason::ToolCalls => "tool_use",
            FinishReason::ContentFilter => "end_turn",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "length" | "max_tokens" => FinishReason::Length,
            "tool_calls" | "tool_use" => FinishReason::ToolCalls,
            "content_filter" => FinishReason::ContentFilter,
            _ => FinishReason::Stop,
        }
    }
}

impl IrMessage {
    ///
    /// Build a plain message with a single text part.
    ///
    /// Used for legacy `prompt` synthesis and system preambles.
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![ContentPart::Text { text: text.into() }],
            name: None,
            tool_call_id: None,
            tool_calls: None,
        }
    }

    ///
    /// Concatenate all text parts of this message.
    pub fn joined_text(&self) -> String {
        let mut out = String::new();
        for part in &self.content {
            if let ContentPart::Text { text } = part {
                out.push_str(text);
            }
        }
        out
    }

    ///
    /// True when the content is exactly one text part.
    ///
    /// Such messages collapse to a bare string on emission, preserving the
    /// legacy shape used by non-multimodal calls.
    pub fn is_single_text(&self) -> bool {
        matches!(self.content.as_slice(), [ContentPart::Text { .. }])
    }
}
