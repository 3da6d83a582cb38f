//!
//! Shared HTTP session for all upstream traffic.
//!
//! One connection pool per process: every endpoint handler, image download
//! and registry refresh goes through the same client, so the pool is the
//! sole point of contention and bounds fan-out automatically. Supports DNS
//! resolution overrides mirroring `curl --resolve`, needed for tunnelled
//! deployments where the TLS SNI hostname must be preserved while the
//! connection routes to a local endpoint.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::error::{ProxyError, Result};

/* --- constants ------------------------------------------------------------------------------ */

/** User agent sent with every upstream request */
const USER_AGENT: &str = concat!("argomux/", env!("CARGO_PKG_VERSION"));

/* --- types ----------------------------------------------------------------------------------- */

///
/// Process-wide HTTP session wrapping the shared connection pool.
#[derive(Debug, Clone)]
pub struct HttpSession {
    /** pooled HTTP client */
    client: Client,
    /** per-fetch timeout for image downloads */
    image_timeout: Duration,
}

/* --- start of code -------------------------------------------------------------------------- */

impl HttpSession {
    ///
    /// Build the shared session from configuration.
    ///
    /// Applies pool caps, keep-alive, connect/read/total timeouts and the
    /// DNS override table. Port-scoped overrides are expressed as
    /// `"host:port" = "ip"`; a port of 0 in the override applies the
    /// request's own port, matching `curl --resolve` behaviour.
    ///
    /// # Arguments
    ///  * `config` - session configuration (env overrides already applied)
    ///
    /// # Returns
    ///  * Shared HTTP session
    ///  * `ProxyError::Config` if an override entry is malformed or the
    ///    client cannot be constructed
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(config.max_connections_per_host)
            .pool_idle_timeout(Duration::from_secs(config.keepalive_timeout))
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .read_timeout(Duration::from_secs(config.read_timeout))
            .timeout(Duration::from_secs(config.total_timeout))
            .tcp_nodelay(true)
            .tcp_keepalive(Duration::from_secs(config.keepalive_timeout));

        for (key, ip) in &config.resolve {
            let (host, addr) = parse_resolve_entry(key, ip)?;
            info!("DNS override: {} -> {}", key, ip);
            builder = builder.resolve(&host, addr);
        }

        let client = builder
            .build()
            .map_err(|e| ProxyError::Config(format!("Failed to create HTTP client: {}", e)))?;

        debug!(
            "HTTP session created: {} connections per host, keepalive {}s, total timeout {}s",
            config.max_connections_per_host, config.keepalive_timeout, config.total_timeout
        );

        Ok(Self { client, image_timeout: Duration::from_secs(config.image_timeout) })
    }

    ///
    /// The pooled HTTP client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    ///
    /// Per-fetch timeout applied to each image download.
    pub fn image_timeout(&self) -> Duration {
        self.image_timeout
    }
}

///
/// Parse one `"host:port" = "ip"` override entry.
///
/// # Arguments
///  * `key` - the `host:port` override key
///  * `ip` - the target IP address
///
/// # Returns
///  * Hostname and socket address for `ClientBuilder::resolve`
///  * `ProxyError::Config` on a malformed key or address
fn parse_resolve_entry(key: &str, ip: &str) -> Result<(String, SocketAddr)> {
    let (host, port) = key
        .rsplit_once(':')
        .ok_or_else(|| ProxyError::Config(format!("resolve key must be 'host:port': '{}'", key)))?;
    let port: u16 = port
        .parse()
        .map_err(|_| ProxyError::Config(format!("resolve key has invalid port: '{}'", key)))?;
    let ip: IpAddr = ip
        .parse()
        .map_err(|_| ProxyError::Config(format!("resolve target is not an IP address: '{}'", ip)))?;
    Ok((host.to_string(), SocketAddr::new(ip, port)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;

    #[test]
    fn test_parse_resolve_entry() {
        let (host, addr) = parse_resolve_entry("apps.example.gov:8383", "127.0.0.1").unwrap();
        assert_eq!(host, "apps.example.gov");
        assert_eq!(addr, "127.0.0.1:8383".parse().unwrap());
    }

    #[test]
    fn test_parse_resolve_entry_rejects_garbage() {
        assert!(parse_resolve_entry("no-port", "127.0.0.1").is_err());
        assert!(parse_resolve_entry("host:not-a-port", "127.0.0.1").is_err());
        assert!(parse_resolve_entry("host:80", "not-an-ip").is_err());
    }

    #[test]
    fn test_session_builds_with_overrides() {
        let mut config = SessionConfig::default();
        config.resolve.insert("apps.example.gov:443".to_string(), "127.0.0.1".to_string());
        let session = HttpSession::new(&config).unwrap();
        assert_eq!(session.image_timeout(), Duration::from_secs(30));
    }
}
