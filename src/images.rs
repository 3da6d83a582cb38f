//!
//! Image pipeline: download external image URLs referenced by a request and
//! inline them as base64 data URLs before conversion.
//!
//! Argo accepts only data URLs, so every `http(s)` image reference must be
//! fetched, validated (status, MIME allow-list, magic bytes) and replaced in
//! place. Validation failures drop the URL with a warning and leave the
//! content part unchanged; the Argo converter will then reject it. The whole
//! pass is idempotent: payloads whose URLs are already data URLs are
//! untouched.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::collections::{HashMap, HashSet};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, warn};

use crate::session::HttpSession;

/* --- constants ------------------------------------------------------------------------------ */

/** MIME types accepted from upstream image servers */
const SUPPORTED_IMAGE_FORMATS: &[&str] =
    &["image/png", "image/jpeg", "image/jpg", "image/webp", "image/gif"];

/** Extension fallback when the server sends no Content-Type */
const SUPPORTED_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".webp", ".gif"];

/** Base64 length shown when sanitising payloads for logs */
const LOG_BASE64_LIMIT: usize = 100;

/* --- start of code -------------------------------------------------------------------------- */

///
/// Inline every external image URL in a chat payload.
///
/// Walks the message tree, deduplicates the `http(s)` URLs, downloads them
/// concurrently on the shared session, and rewrites each successfully
/// validated URL to `data:<mime>;base64,<bytes>`.
///
/// # Arguments
///  * `session` - shared HTTP session (pool bounds the fan-out)
///  * `data` - request payload, modified in place
pub async fn process_chat_images(session: &HttpSession, data: &mut Value) {
    let urls = collect_image_urls(data);
    if urls.is_empty() {
        return;
    }

    debug!("Downloading {} external image URL(s)", urls.len());
    let fetches = urls.iter().map(|url| download_image_to_data_url(session, url));
    let results = join_all(fetches).await;

    let mut replacements = HashMap::new();
    for (url, result) in urls.into_iter().zip(results) {
        match result {
            Some(data_url) => {
                replacements.insert(url, data_url);
            }
            None => warn!("Dropping image URL after failed download/validation: {}", url),
        }
    }

    if !replacements.is_empty() {
        replace_image_urls(data, &replacements);
    }
}

///
/// Collect every distinct non-data image URL referenced by the payload.
///
/// Understands both the OpenAI `image_url` block and the Anthropic
/// `{type:"image", source:{type:"url"}}` block.
fn collect_image_urls(data: &Value) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    let Some(messages) = data.get("messages").and_then(Value::as_array) else {
        return urls;
    };
    for message in messages {
        let Some(blocks) = message.get("content").and_then(Value::as_array) else {
            continue;
        };
        for block in blocks {
            if let Some(url) = block_image_url(block) {
                if is_http_url(url) && seen.insert(url.to_string()) {
                    urls.push(url.to_string());
                }
            }
        }
    }
    urls
}

///
/// The image URL carried by a content block, if any.
fn block_image_url(block: &Value) -> Option<&str> {
    match block.get("type").and_then(Value::as_str) {
        Some("image_url") => match block.get("image_url") {
            Some(Value::String(url)) => Some(url.as_str()),
            Some(Value::Object(map)) => map.get("url").and_then(Value::as_str),
            _ => None,
        },
        Some("image") => {
            let source = block.get("source")?;
            if source.get("type").and_then(Value::as_str) == Some("url") {
                source.get("url").and_then(Value::as_str)
            } else {
                None
            }
        }
        _ => None,
    }
}

///
/// Rewrite validated URLs in place.
fn replace_image_urls(data: &mut Value, replacements: &HashMap<String, String>) {
    let Some(messages) = data.get_mut("messages").and_then(Value::as_array_mut) else {
        return;
    };
    for message in messages {
        let Some(blocks) = message.get_mut("content").and_then(Value::as_array_mut) else {
            continue;
        };
        for block in blocks {
            let Some(current) = block_image_url(block).map(str::to_string) else {
                continue;
            };
            let Some(data_url) = replacements.get(&current) else {
                continue;
            };
            match block.get("type").and_then(Value::as_str) {
                Some("image_url") => match block.get_mut("image_url") {
                    Some(Value::String(url)) => *url = data_url.clone(),
                    Some(Value::Object(map)) => {
                        map.insert("url".into(), Value::String(data_url.clone()));
                    }
                    _ => {}
                },
                Some("image") => {
                    // Rewrite the url source into Anthropic's base64 source form.
                    if let Some((media_type, payload)) =
                        data_url.strip_prefix("data:").and_then(|rest| rest.split_once(";base64,"))
                    {
                        block["source"] = serde_json::json!({
                            "type": "base64",
                            "media_type": media_type,
                            "data": payload,
                        });
                    }
                }
                _ => {}
            }
        }
    }
}

///
/// Download one image and produce its data URL.
///
/// # Arguments
///  * `session` - shared HTTP session
///  * `url` - image URL to fetch
///
/// # Returns
///  * `Some(data_url)` on success, None on any download/validation failure
async fn download_image_to_data_url(session: &HttpSession, url: &str) -> Option<String> {
    let response = match session
        .client()
        .get(url)
        .timeout(session.image_timeout())
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            warn!("Failed to download image from {}: {}", url, e);
            return None;
        }
    };

    if response.status() != reqwest::StatusCode::OK {
        warn!("Failed to download image from {}: HTTP {}", url, response.status());
        return None;
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_lowercase())
        .unwrap_or_default();

    let bytes = match response.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Failed to read image body from {}: {}", url, e);
            return None;
        }
    };

    let content_type = effective_content_type(&content_type, url)?;
    if !validate_image_content(&bytes, &content_type) {
        warn!("Image content validation failed: {} (content-type: {})", url, content_type);
        return None;
    }

    Some(format!("data:{};base64,{}", content_type, BASE64.encode(&bytes)))
}

///
/// Resolve the MIME type to validate against.
///
/// The declared Content-Type wins when it is supported; with no usable
/// header the URL extension decides. Unsupported formats are rejected.
fn effective_content_type(content_type: &str, url: &str) -> Option<String> {
    if SUPPORTED_IMAGE_FORMATS.contains(&content_type) {
        return Some(content_type.to_string());
    }
    if !content_type.is_empty() && content_type != "application/octet-stream" {
        warn!("Unsupported image format: {} (content-type: {})", url, content_type);
        return None;
    }

    let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
    for ext in SUPPORTED_EXTENSIONS {
        if path.ends_with(ext) {
            let mime = match *ext {
                ".png" => "image/png",
                ".webp" => "image/webp",
                ".gif" => "image/gif",
                _ => "image/jpeg",
            };
            return Some(mime.to_string());
        }
    }
    warn!("Unsupported image format: {} (no content-type, unknown extension)", url);
    None
}

///
/// Check image magic bytes against the declared MIME type.
pub fn validate_image_content(data: &[u8], content_type: &str) -> bool {
    if data.len() < 8 {
        return false;
    }
    match content_type {
        "image/png" => data.starts_with(b"\x89PNG\r\n\x1a\n"),
        "image/jpeg" | "image/jpg" => data.starts_with(b"\xff\xd8\xff"),
        "image/webp" => data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP",
        "image/gif" => data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a"),
        _ => true,
    }
}

///
/// True for `http://` and `https://` URLs.
pub fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/* --- log sanitising --------------------------------------------------------------------------- */

///
/// Copy of a payload with base64 image data truncated, for verbose logging.
pub fn sanitize_for_logging(data: &Value) -> Value {
    let mut copy = data.clone();
    if let Some(messages) = copy.get_mut("messages").and_then(Value::as_array_mut) {
        for message in messages {
            let Some(blocks) = message.get_mut("content").and_then(Value::as_array_mut) else {
                continue;
            };
            for block in blocks {
                if let Some(Value::Object(map)) = block.get_mut("image_url") {
                    if let Some(Value::String(url)) = map.get_mut("url") {
                        *url = truncate_base64(url);
                    }
                }
                if let Some(source) = block.get_mut("source") {
                    if let Some(Value::String(data)) = source.get_mut("data") {
                        if data.len() > LOG_BASE64_LIMIT {
                            let remaining = data.len() - LOG_BASE64_LIMIT;
                            data.truncate(LOG_BASE64_LIMIT);
                            data.push_str(&format!("...[{} more chars]", remaining));
                        }
                    }
                }
            }
        }
    }
    copy
}

///
/// Shorten the base64 payload of a data URL for readable logs.
fn truncate_base64(url: &str) -> String {
    if !url.starts_with("data:") {
        return url.to_string();
    }
    match url.split_once(";base64,") {
        Some((header, payload)) if payload.len() > LOG_BASE64_LIMIT => {
            format!(
                "{};base64,{}...[{} more chars]",
                header,
                &payload[..LOG_BASE64_LIMIT],
                payload.len() - LOG_BASE64_LIMIT
            )
        }
        _ => url.to_string(),
    }
}
