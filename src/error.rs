//!
//! Error handling for the Argo translating proxy server.
//!
//! Defines all error types used throughout the application using thiserror
//! for ergonomic error handling. Converters raise typed errors; the endpoint
//! layer is the only place where they are mapped to HTTP responses.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use thiserror::Error;

/* --- types ----------------------------------------------------------------------------------- */

///
/// Application error types following Rust best practices.
///
/// Covers all possible error conditions that can occur during proxy operation.
/// Uses thiserror for automatic Display and Error trait implementations.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Unsupported content: {0}")]
    UnsupportedContent(String),

    #[error("Unsupported image source: {0}")]
    UnsupportedImageSource(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Upstream rejected request ({status}): {body}")]
    UpstreamRejected {
        /** HTTP status returned by the upstream */
        status: u16,
        /** raw upstream error body */
        body: String,
    },

    #[error("Upstream returned invalid JSON: {0}")]
    UpstreamInvalidResponse(String),

    #[error("Upstream model returned no response")]
    UpstreamEmpty,

    #[error("Client disconnected")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/* --- start of code -------------------------------------------------------------------------- */

impl From<reqwest::Error> for ProxyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ProxyError::UpstreamInvalidResponse(e.to_string())
        } else {
            // Connect failures, timeouts and transport errors all mean the
            // upstream could not be reached or did not answer usably.
            ProxyError::UpstreamUnavailable(e.to_string())
        }
    }
}

/// Result type alias for cleaner error handling throughout the application
pub type Result<T> = std::result::Result<T, ProxyError>;
