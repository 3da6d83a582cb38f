//!
//! Leaked tool call recovery for Claude-family responses.
//!
//! Some upstream Claude responses embed tool calls directly in assistant
//! text as Python-literal dicts instead of returning them in the structured
//! tool-call array, e.g.:
//!
//! ```text
//! Let me search.{'id': 'toolu_01A', 'input': {'q': 'x'}, 'name': 'search', 'type': 'tool_use'}
//! ```
//!
//! The parser anchors on `{'id': 'toolu_`, enumerates candidate end braces
//! in order, and tries a fixed sequence of repair strategies on each
//! candidate until one parses into a dict with both `id` and `name`. Spans
//! that never parse are replaced with a sentinel so scanning always makes
//! progress. Every recovered leak is recorded to a per-process log
//! directory, whether or not substitution into the response is enabled.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::io::Write;
use std::path::PathBuf;

use flate2::Compression;
use flate2::write::GzEncoder;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

/* --- constants ------------------------------------------------------------------------------ */

/** Anchor introducing a leaked Claude tool call */
const ANCHOR_PREFIX: &str = "{'id':";

/** Required id prefix of a genuine leaked tool call */
const TOOL_ID_PREFIX: &str = "toolu_";

/** Sentinel substituted for anchors that never parse */
const UNPARSEABLE_SENTINEL: &str = "[UNPARSEABLE_TOOL]";

/** Raw-string size cap in leak log records */
const LOG_RAW_LIMIT: usize = 4096;

/* --- types ----------------------------------------------------------------------------------- */

///
/// A leaked tool call extracted from text content.
#[derive(Debug, Clone, PartialEq)]
pub struct LeakedToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
    /** the exact substring that was parsed */
    pub raw: String,
    /** byte offset of the span start in the scanned text */
    pub start: usize,
    /** byte offset one past the span end */
    pub end: usize,
}

///
/// Parser for leaked tool calls embedded in assistant text.
#[derive(Debug, Default)]
pub struct LeakedToolParser;

///
/// Records every recovered leak to a gzipped JSONL file per UTC day.
#[derive(Debug, Clone)]
pub struct LeakLogger {
    log_dir: PathBuf,
}

/* --- start of code -------------------------------------------------------------------------- */

impl LeakedToolParser {
    pub fn new() -> Self {
        Self
    }

    ///
    /// Extract all leaked tool calls and return the cleaned text.
    ///
    /// Parsed spans are removed from the text; anchors that never parse are
    /// replaced with [`UNPARSEABLE_SENTINEL`] and scanning continues, so a
    /// single pass always terminates and spans never overlap.
    ///
    /// # Arguments
    ///  * `text` - assistant text content to scan
    ///
    /// # Returns
    ///  * Recovered calls in the order encountered, and the cleaned text
    pub fn extract_all(&self, text: &str) -> (Vec<LeakedToolCall>, String) {
        let mut leaked = Vec::new();
        let mut cleaned = text.to_string();
        let mut search_from = 0;

        while let Some(anchor) = find_anchor(&cleaned, search_from) {
            match self.extract_single(&cleaned, anchor) {
                Some(call) => {
                    cleaned.replace_range(call.start..call.end, "");
                    search_from = call.start;
                    warn!("Extracted leaked tool call: {} (id={})", call.name, call.id);
                    leaked.push(call);
                }
                None => {
                    // Swap the anchor for a sentinel and keep scanning past it.
                    let anchor_end = anchor_pattern_end(&cleaned, anchor);
                    cleaned.replace_range(anchor..anchor_end, UNPARSEABLE_SENTINEL);
                    search_from = anchor + UNPARSEABLE_SENTINEL.len();
                    warn!("Found unparseable leaked tool pattern, inserting sentinel");
                }
            }
        }

        (leaked, cleaned)
    }

    ///
    /// Extract a single leaked tool call starting at the given anchor.
    ///
    /// Enumerates every closing-brace offset after the anchor in order and
    /// accepts the first candidate substring that parses (possibly after
    /// repair) into a dict with a `toolu_`-prefixed id and a name.
    pub fn extract_single(&self, text: &str, start: usize) -> Option<LeakedToolCall> {
        let bytes = text.as_bytes();
        let mut end = start;

        while let Some(offset) = memchr_from(bytes, b'}', end + 1) {
            end = offset;
            let candidate = &text[start..=end];
            if let Some(dict) = Self::try_parse_candidate(candidate) {
                let id = dict.get("id").and_then(Value::as_str).unwrap_or_default();
                return Some(LeakedToolCall {
                    id: id.to_string(),
                    name: dict.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                    input: dict.get("input").cloned().unwrap_or_else(|| json!({})),
                    raw: candidate.to_string(),
                    start,
                    end: end + 1,
                });
            }
        }
        None
    }

    ///
    /// Parse a candidate span as a Python-literal dict, applying repair
    /// strategies in order until one produces a dict with both `id` and
    /// `name` where the id begins with `toolu_`.
    ///
    /// Repairs, in order:
    ///  1. escape stray newlines;
    ///  2. un-double-escape quotes;
    ///  3. both of the above;
    ///  4. collapse a doubled closing brace before `'name'` / `'type'`;
    ///  5. strategies 1 and 4 together.
    pub fn try_parse_candidate(candidate: &str) -> Option<Map<String, Value>> {
        let attempts = [
            candidate.to_string(),
            escape_newlines(candidate),
            unescape_quotes(candidate),
            unescape_quotes(&escape_newlines(candidate)),
            collapse_double_brace(candidate),
            collapse_double_brace(&escape_newlines(candidate)),
        ];

        for attempt in &attempts {
            if let Some(Value::Object(map)) = parse_python_literal(attempt) {
                let id_ok = map
                    .get("id")
                    .and_then(Value::as_str)
                    .map(|id| id.starts_with(TOOL_ID_PREFIX))
                    .unwrap_or(false);
                if id_ok && map.contains_key("name") {
                    return Some(map);
                }
            }
        }
        None
    }
}

///
/// Find the next leaked-tool anchor (`{'id':` followed by `'toolu_`).
fn find_anchor(text: &str, from: usize) -> Option<usize> {
    let mut search = from;
    while let Some(relative) = text.get(search..)?.find(ANCHOR_PREFIX) {
        let anchor = search + relative;
        let after = &text[anchor + ANCHOR_PREFIX.len()..];
        let trimmed = after.trim_start_matches(' ');
        if trimmed.starts_with('\'') && trimmed[1..].starts_with(TOOL_ID_PREFIX) {
            return Some(anchor);
        }
        search = anchor + ANCHOR_PREFIX.len();
    }
    None
}

///
/// End offset of the full anchor pattern (`{'id':` + spaces + `'toolu_`).
fn anchor_pattern_end(text: &str, anchor: usize) -> usize {
    let mut end = anchor + ANCHOR_PREFIX.len();
    while text[end..].starts_with(' ') {
        end += 1;
    }
    // The quote and the id prefix were verified by find_anchor.
    end + 1 + TOOL_ID_PREFIX.len()
}

///
/// Next occurrence of a byte at or after `from`.
fn memchr_from(bytes: &[u8], needle: u8, from: usize) -> Option<usize> {
    bytes.get(from..)?.iter().position(|&b| b == needle).map(|p| from + p)
}

/// Repair 1: literal newlines inside the span break the literal syntax.
fn escape_newlines(s: &str) -> String {
    s.replace('\n', "\\n")
}

/// Repair 2: doubly escaped quotes collapse to single escapes.
fn unescape_quotes(s: &str) -> String {
    s.replace("\\\\'", "\\'").replace("\\\\\"", "\\\"")
}

/// Repair 4: a doubled closing brace before the next key.
fn collapse_double_brace(s: &str) -> String {
    s.replace("}}, 'name'", "}, 'name'").replace("}}, 'type'", "}, 'type'")
}

/* --- python literal parsing ------------------------------------------------------------------- */

///
/// Parse a Python literal (dict/list/tuple/str/number/bool/None) into JSON.
///
/// Covers the subset Claude emits in leaked tool calls: single- and
/// double-quoted strings with backslash escapes, integers, floats, nested
/// containers, `True`/`False`/`None`.
pub fn parse_python_literal(input: &str) -> Option<Value> {
    let mut parser = PyParser { bytes: input.as_bytes(), pos: 0 };
    parser.skip_ws();
    let value = parser.parse_value()?;
    parser.skip_ws();
    if parser.pos == parser.bytes.len() { Some(value) } else { None }
}

struct PyParser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> PyParser<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r')) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_value(&mut self) -> Option<Value> {
        self.skip_ws();
        match self.peek()? {
            b'{' => self.parse_dict(),
            b'[' => self.parse_seq(b'[', b']'),
            b'(' => self.parse_seq(b'(', b')'),
            b'\'' | b'"' => self.parse_string().map(Value::String),
            b'T' | b'F' | b'N' => self.parse_keyword(),
            b'-' | b'0'..=b'9' => self.parse_number(),
            _ => None,
        }
    }

    fn parse_dict(&mut self) -> Option<Value> {
        self.eat(b'{').then_some(())?;
        let mut map = Map::new();
        self.skip_ws();
        if self.eat(b'}') {
            return Some(Value::Object(map));
        }
        loop {
            self.skip_ws();
            let key = self.parse_string()?;
            self.skip_ws();
            self.eat(b':').then_some(())?;
            let value = self.parse_value()?;
            map.insert(key, value);
            self.skip_ws();
            if self.eat(b',') {
                self.skip_ws();
                // Trailing comma before the closing brace is valid Python.
                if self.eat(b'}') {
                    return Some(Value::Object(map));
                }
                continue;
            }
            self.eat(b'}').then_some(())?;
            return Some(Value::Object(map));
        }
    }

    fn parse_seq(&mut self, open: u8, close: u8) -> Option<Value> {
        self.eat(open).then_some(())?;
        let mut items = Vec::new();
        self.skip_ws();
        if self.eat(close) {
            return Some(Value::Array(items));
        }
        loop {
            items.push(self.parse_value()?);
            self.skip_ws();
            if self.eat(b',') {
                self.skip_ws();
                if self.eat(close) {
                    return Some(Value::Array(items));
                }
                continue;
            }
            self.eat(close).then_some(())?;
            return Some(Value::Array(items));
        }
    }

    fn parse_string(&mut self) -> Option<String> {
        let quote = self.peek()?;
        if quote != b'\'' && quote != b'"' {
            return None;
        }
        self.pos += 1;
        let mut out = Vec::new();
        loop {
            let byte = self.peek()?;
            self.pos += 1;
            if byte == quote {
                break;
            }
            if byte == b'\\' {
                let escaped = self.peek()?;
                self.pos += 1;
                match escaped {
                    b'n' => out.push(b'\n'),
                    b't' => out.push(b'\t'),
                    b'r' => out.push(b'\r'),
                    b'\\' => out.push(b'\\'),
                    b'\'' => out.push(b'\''),
                    b'"' => out.push(b'"'),
                    other => {
                        out.push(b'\\');
                        out.push(other);
                    }
                }
            } else {
                out.push(byte);
            }
        }
        String::from_utf8(out).ok()
    }

    fn parse_keyword(&mut self) -> Option<Value> {
        for (word, value) in
            [("True", Value::Bool(true)), ("False", Value::Bool(false)), ("None", Value::Null)]
        {
            if self.bytes[self.pos..].starts_with(word.as_bytes()) {
                self.pos += word.len();
                return Some(value);
            }
        }
        None
    }

    fn parse_number(&mut self) -> Option<Value> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        let mut is_float = false;
        while let Some(byte) = self.peek() {
            match byte {
                b'0'..=b'9' => self.pos += 1,
                b'.' | b'e' | b'E' | b'+' | b'-' if self.pos > start => {
                    is_float = true;
                    self.pos += 1;
                }
                _ => break,
            }
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).ok()?;
        if is_float {
            serde_json::Number::from_f64(text.parse().ok()?).map(Value::Number)
        } else {
            text.parse::<i64>().ok().map(|n| Value::Number(n.into()))
        }
    }
}

/* --- leak logging ----------------------------------------------------------------------------- */

impl LeakLogger {
    ///
    /// Build a logger writing under the given directory.
    ///
    /// The directory is created lazily on first write.
    pub fn new(log_dir: PathBuf) -> Self {
        Self { log_dir }
    }

    ///
    /// Record one recovered leak.
    ///
    /// Logging failures never affect request processing.
    ///
    /// # Arguments
    ///  * `call` - the recovered tool call
    ///  * `model` - internal model id that produced the leak
    ///  * `fix_enabled` - whether substitution into the response is active
    pub fn record(&self, call: &LeakedToolCall, model: &str, fix_enabled: bool) {
        let now = chrono::Utc::now();
        let mut raw = call.raw.clone();
        if raw.len() > LOG_RAW_LIMIT {
            let mut cut = LOG_RAW_LIMIT;
            while !raw.is_char_boundary(cut) {
                cut -= 1;
            }
            raw.truncate(cut);
        }

        let entry = json!({
            "timestamp": now.to_rfc3339(),
            "model": model,
            "id": call.id,
            "name": call.name,
            "input": call.input,
            "raw": raw,
            "fix_enabled": fix_enabled,
        });

        if let Err(e) = self.append(&now, &entry) {
            debug!("Failed to save leaked tool log: {}", e);
        }
    }

    fn append(&self, now: &chrono::DateTime<chrono::Utc>, entry: &Value) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.log_dir)?;
        let path = self.log_dir.join(format!("leaked_tools_{}.jsonl.gz", now.format("%Y-%m-%d")));
        let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        writeln!(encoder, "{}", entry)?;
        encoder.finish()?;
        Ok(())
    }
}
