//!
//! Configuration management for ArgoMux.
//!
//! Layered configuration in the standard hierarchy: built-in defaults, then
//! a TOML configuration file (user config directory or an explicit path),
//! then environment variables (`ARGO_API_URL`, `ARGO_PROXY_*`,
//! `ENABLE_LEAKED_TOOL_FIX`). The attack-log and leaked-tool-log directories
//! are resolved relative to the configuration file that was loaded.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ProxyError, Result};

/* --- types ----------------------------------------------------------------------------------- */

///
/// Main application configuration structure.
///
/// TOML-compatible fields grouped by concern. The loaded config also records
/// where it came from so log directories can be placed next to it.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream Argo gateway configuration
    #[serde(default)]
    pub argo: ArgoConfig,
    /// Native passthrough target URLs
    #[serde(default)]
    pub passthrough: PassthroughConfig,
    /// Tool-call handling configuration
    #[serde(default)]
    pub tools: ToolsConfig,
    /// Shared HTTP session configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Path of the config file this was loaded from (not serialized)
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

///
/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server port number
    #[serde(default = "default_port")]
    pub port: u16,
    /// Application logging level
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
    /// Verbose request/response payload logging
    #[serde(default)]
    pub verbose: bool,
}

///
/// Upstream Argo gateway configuration.
///
/// Only `base_url` and `user` are normally needed; the per-operation URLs are
/// derived from the base and can be overridden individually.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgoConfig {
    /// Base URL of the Argo resource API (trailing slash optional)
    #[serde(default = "default_argo_base_url")]
    pub base_url: String,
    /// Username injected into every upstream request body
    #[serde(default = "default_user")]
    pub user: String,
    /// Override for the non-streaming chat endpoint
    #[serde(default)]
    pub chat_url: Option<String>,
    /// Override for the streaming chat endpoint
    #[serde(default)]
    pub stream_url: Option<String>,
    /// Override for the embeddings endpoint
    #[serde(default)]
    pub embed_url: Option<String>,
    /// Override for the model catalogue endpoint
    #[serde(default)]
    pub models_url: Option<String>,
}

///
/// Alternate base URLs used by the `--native-openai` / `--native-anthropic`
/// passthrough modes, where request bodies are forwarded unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PassthroughConfig {
    #[serde(default)]
    pub openai_base_url: Option<String>,
    #[serde(default)]
    pub anthropic_base_url: Option<String>,
}

///
/// Tool-call handling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Use native tool wire shapes for families that support them.
    /// Google and unknown families always use prompting-based handling.
    #[serde(default = "default_true")]
    pub native_tools: bool,
    /// Substitute recovered leaked tool calls into the response.
    /// Leaks are logged either way.
    #[serde(default)]
    pub enable_leaked_tool_fix: bool,
}

///
/// Shared HTTP session configuration (one connection pool per process).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum total connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Maximum connections per host
    #[serde(default = "default_max_connections_per_host")]
    pub max_connections_per_host: usize,
    /// Keep-alive idle timeout in seconds
    #[serde(default = "default_keepalive_timeout")]
    pub keepalive_timeout: u64,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    /// Socket read timeout in seconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout: u64,
    /// Total request timeout in seconds
    #[serde(default = "default_total_timeout")]
    pub total_timeout: u64,
    /// Image download timeout in seconds
    #[serde(default = "default_image_timeout")]
    pub image_timeout: u64,
    /// DNS cache TTL in seconds
    #[serde(default = "default_dns_cache_ttl")]
    pub dns_cache_ttl: u64,
    /// DNS resolution overrides mapping "host:port" to an IP address,
    /// mirroring `curl --resolve` for tunnelled deployments
    #[serde(default)]
    pub resolve: HashMap<String, String>,
}

///
/// Logging level enumeration compatible with the tracing crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/* --- defaults -------------------------------------------------------------------------------- */

fn default_port() -> u16 {
    44497
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_true() -> bool {
    true
}

fn default_argo_base_url() -> String {
    "https://apps.inside.anl.gov/argoapi/api/v1/resource/".to_string()
}

fn default_user() -> String {
    whoami_fallback()
}

fn default_max_connections() -> usize {
    200
}

fn default_max_connections_per_host() -> usize {
    50
}

fn default_keepalive_timeout() -> u64 {
    600
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    600
}

fn default_total_timeout() -> u64 {
    1800
}

fn default_image_timeout() -> u64 {
    30
}

fn default_dns_cache_ttl() -> u64 {
    300
}

/// Process owner name used when no user is configured.
fn whoami_fallback() -> String {
    env::var("USER").or_else(|_| env::var("USERNAME")).unwrap_or_else(|_| "argomux".to_string())
}

/* --- implementations ------------------------------------------------------------------------- */

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: default_port(), log_level: default_log_level(), verbose: false }
    }
}

impl Default for ArgoConfig {
    fn default() -> Self {
        Self {
            base_url: default_argo_base_url(),
            user: default_user(),
            chat_url: None,
            stream_url: None,
            embed_url: None,
            models_url: None,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self { native_tools: default_true(), enable_leaked_tool_fix: false }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_connections_per_host: default_max_connections_per_host(),
            keepalive_timeout: default_keepalive_timeout(),
            connect_timeout: default_connect_timeout(),
            read_timeout: default_read_timeout(),
            total_timeout: default_total_timeout(),
            image_timeout: default_image_timeout(),
            dns_cache_ttl: default_dns_cache_ttl(),
            resolve: HashMap::new(),
        }
    }
}

impl Config {
    ///
    /// Load configuration from the standard hierarchy:
    /// 1. Environment variables (highest priority)
    /// 2. Explicit config file path, if given
    /// 3. User config file (~/.config/argomux/config.toml)
    /// 4. Built-in defaults (lowest priority)
    ///
    /// # Arguments
    ///  * `explicit_path` - config file path from the CLI, if any
    ///
    /// # Returns
    ///  * `Ok(Config)` - successfully loaded configuration
    ///  * `ProxyError::Config` - file unreadable or malformed
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match Self::locate_config_file(explicit_path)? {
            Some(path) => {
                let contents = std::fs::read_to_string(&path).map_err(|e| {
                    ProxyError::Config(format!(
                        "Failed to read config file '{}': {}",
                        path.display(),
                        e
                    ))
                })?;
                let mut config: Config = toml::from_str(&contents).map_err(|e| {
                    ProxyError::Config(format!(
                        "Failed to parse config file '{}': {}",
                        path.display(),
                        e
                    ))
                })?;
                config.config_path = Some(path);
                config
            }
            None => Config::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    ///
    /// Locate the configuration file to use, if any.
    ///
    /// An explicit path must exist; the default locations are optional.
    fn locate_config_file(explicit_path: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit_path {
            let expanded = expand_path(path)?;
            if !expanded.exists() {
                return Err(ProxyError::Config(format!(
                    "Config file not found: {}",
                    expanded.display()
                )));
            }
            return Ok(Some(expanded));
        }

        for candidate in Self::default_config_paths() {
            if candidate.exists() {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    ///
    /// Candidate config file locations in priority order.
    pub fn default_config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(dirs) = directories::ProjectDirs::from("", "", "argomux") {
            paths.push(dirs.config_dir().join("config.toml"));
        }
        paths.push(PathBuf::from("/etc/argomux/config.toml"));
        paths
    }

    ///
    /// Apply environment variable overrides on top of the loaded values.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var("ARGO_API_URL") {
            if !url.trim().is_empty() {
                self.argo.base_url = url.trim().to_string();
            }
        }
        if let Ok(user) = env::var("ARGO_USER") {
            if !user.trim().is_empty() {
                self.argo.user = user.trim().to_string();
            }
        }
        env_usize("ARGO_PROXY_MAX_CONNECTIONS", &mut self.session.max_connections);
        env_usize("ARGO_PROXY_MAX_CONNECTIONS_PER_HOST", &mut self.session.max_connections_per_host);
        env_u64("ARGO_PROXY_KEEPALIVE_TIMEOUT", &mut self.session.keepalive_timeout);
        env_u64("ARGO_PROXY_CONNECT_TIMEOUT", &mut self.session.connect_timeout);
        env_u64("ARGO_PROXY_READ_TIMEOUT", &mut self.session.read_timeout);
        env_u64("ARGO_PROXY_TOTAL_TIMEOUT", &mut self.session.total_timeout);
        env_u64("ARGO_PROXY_DNS_CACHE_TTL", &mut self.session.dns_cache_ttl);
        if let Ok(v) = env::var("ENABLE_LEAKED_TOOL_FIX") {
            self.tools.enable_leaked_tool_fix = matches!(v.as_str(), "1" | "true" | "yes" | "on");
        }
    }

    ///
    /// Validate the current configuration.
    ///
    /// # Returns
    ///  * `Ok(())` - configuration is usable
    ///  * `ProxyError::Config` - with details of the first problem found
    pub fn validate(&self) -> Result<()> {
        if self.argo.base_url.trim().is_empty() {
            return Err(ProxyError::Config(
                "argo.base_url must not be empty. Set it in the config file or via ARGO_API_URL."
                    .to_string(),
            ));
        }
        if !self.argo.base_url.starts_with("http://") && !self.argo.base_url.starts_with("https://")
        {
            return Err(ProxyError::Config(format!(
                "argo.base_url must be an http(s) URL, got '{}'",
                self.argo.base_url
            )));
        }
        if self.session.max_connections == 0 || self.session.max_connections_per_host == 0 {
            return Err(ProxyError::Config(
                "session connection limits must be greater than zero".to_string(),
            ));
        }
        for key in self.session.resolve.keys() {
            if !key.contains(':') {
                return Err(ProxyError::Config(format!(
                    "session.resolve keys must be 'host:port', got '{}'",
                    key
                )));
            }
        }
        Ok(())
    }

    /// Non-streaming chat endpoint URL.
    pub fn chat_url(&self) -> String {
        self.argo.chat_url.clone().unwrap_or_else(|| self.join_base("chat/"))
    }

    /// Streaming chat endpoint URL.
    pub fn stream_url(&self) -> String {
        self.argo.stream_url.clone().unwrap_or_else(|| self.join_base("streamchat/"))
    }

    /// Embeddings endpoint URL.
    pub fn embed_url(&self) -> String {
        self.argo.embed_url.clone().unwrap_or_else(|| self.join_base("embed/"))
    }

    /// Model catalogue endpoint URL.
    pub fn models_url(&self) -> String {
        self.argo.models_url.clone().unwrap_or_else(|| self.join_base("models/"))
    }

    fn join_base(&self, suffix: &str) -> String {
        let base = self.argo.base_url.trim_end_matches('/');
        format!("{}/{}", base, suffix)
    }

    ///
    /// Directory for persisted logs, relative to the config file location
    /// (or the working directory when no config file was loaded).
    ///
    /// # Arguments
    ///  * `name` - subdirectory name, e.g. `attack_logs`
    pub fn log_dir(&self, name: &str) -> PathBuf {
        let base = self
            .config_path
            .as_ref()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join(name)
    }

    ///
    /// Configuration file example as a TOML string.
    pub fn example_toml() -> &'static str {
        r#"# ArgoMux Configuration
# Place at ~/.config/argomux/config.toml (Linux) or pass the path explicitly.

[server]
port = 44497
log_level = "info"
verbose = false

[argo]
base_url = "https://apps.inside.anl.gov/argoapi/api/v1/resource/"
user = "your-login"

[tools]
# Families without native tool support always use prompting-based handling.
native_tools = true
# Substitute recovered leaked tool calls into responses (they are logged regardless).
enable_leaked_tool_fix = false

[session]
max_connections = 200
max_connections_per_host = 50
keepalive_timeout = 600
connect_timeout = 10
read_timeout = 600
total_timeout = 1800
dns_cache_ttl = 300

# DNS overrides for tunnelled deployments (curl --resolve semantics):
# [session.resolve]
# "apps.inside.anl.gov:443" = "127.0.0.1"

[passthrough]
# openai_base_url = "https://.../v1"
# anthropic_base_url = "https://.../v1/messages"
"#
    }
}

impl LogLevel {
    /// Convert to tracing::Level for logging setup
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/* --- helper functions ------------------------------------------------------------------------ */

///
/// Expand `~` and environment variables in a path.
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw)
        .map_err(|e| ProxyError::Config(format!("Invalid path '{}': {}", raw, e)))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

fn env_usize(name: &str, target: &mut usize) {
    if let Ok(v) = env::var(name) {
        if let Ok(parsed) = v.trim().parse() {
            *target = parsed;
        } else {
            tracing::warn!("Ignoring invalid {}: '{}'", name, v);
        }
    }
}

fn env_u64(name: &str, target: &mut u64) {
    if let Ok(v) = env::var(name) {
        if let Ok(parsed) = v.trim().parse() {
            *target = parsed;
        } else {
            tracing::warn!("Ignoring invalid {}: '{}'", name, v);
        }
    }
}
