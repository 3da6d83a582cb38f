//! # ArgoMux - Argo Gateway Translating Proxy Library
//!
//! This crate provides a reverse proxy that exposes OpenAI Chat
//! Completions, OpenAI Responses/Embeddings and Anthropic Messages wire
//! protocols and translates them to and from the Argo LLM gateway's native
//! JSON dialect, which varies by upstream model family. While primarily a
//! binary application, the core functionality is exposed for programmatic
//! use.
//!
//! ## Library Usage
//!
//! ```rust,no_run
//! use argomux::{Config, ProxyMode, create_app};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load configuration
//!     let config = Config::load(None)?;
//!
//!     // Create the application
//!     let app = create_app(config, ProxyMode::Translate)?;
//!
//!     // Start server
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:44497").await?;
//!     axum::serve(listener, app).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`] - Configuration management and environment variable handling
//! - [`session`] - Shared upstream HTTP session with DNS overrides
//! - [`models`] - Aliased model registry with refresh
//! - [`ir`] - Canonical intermediate representation
//! - [`convert`] - Wire format ↔ IR converters (OpenAI, Anthropic, Google, Argo)
//! - [`images`] - Parallel image download and base64 inlining
//! - [`tools`] - Tool-call rewriting, normalisation, and leak recovery
//! - [`stream`] - UTF-8-safe decoding, SSE framing, pseudo-streaming
//! - [`server`] - Application state and route handlers
//! - [`endpoints`] - Per-protocol endpoint handlers
//! - [`attack`] - Malformed-request logging
//! - [`error`] - Error types and handling

pub mod attack;
pub mod config;
pub mod convert;
pub mod endpoints;
pub mod error;
pub mod images;
pub mod ir;
pub mod models;
pub mod server;
pub mod session;
pub mod stream;
pub mod tools;

// Re-export commonly used types
pub use config::Config;
pub use error::{ProxyError, Result};
pub use server::{AppState, ProxyMode};

/// Creates the ArgoMux application router with the given configuration.
///
/// This is a convenience function that sets up the full application stack
/// including state, routing, and middleware.
///
/// # Arguments
///
/// * `config` - Application configuration
/// * `mode` - Proxy operating mode (translate, native passthrough, dev)
///
/// # Returns
///
/// Returns an Axum Router that can be served directly.
///
/// # Errors
///
/// Returns a `ProxyError` if the HTTP session or other state cannot be
/// initialized.
pub fn create_app(config: Config, mode: ProxyMode) -> Result<axum::Router> {
    use std::sync::Arc;

    use axum::Router;
    use axum::routing::{get, post};
    use tower_http::cors::CorsLayer;
    use tower_http::trace::TraceLayer;

    let app_state = Arc::new(server::AppState::new(config, mode)?);

    Ok(Router::new()
        .route("/v1/chat/completions", post(endpoints::chat::chat_completions))
        .route("/v1/completions", post(endpoints::chat::completions))
        .route("/v1/responses", post(endpoints::responses::responses))
        .route("/v1/embeddings", post(endpoints::embed::embeddings))
        .route("/v1/messages", post(endpoints::messages::messages))
        .route("/v1/models", get(server::models))
        .route("/v1/models/refresh", post(server::models_refresh))
        .route("/health", get(server::health))
        .route("/version", get(server::version))
        .fallback(server::fallback)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state))
}
