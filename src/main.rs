//! # ArgoMux - Argo Gateway Translating Proxy Server
//!
//! A reverse proxy that exposes OpenAI- and Anthropic-compatible endpoints
//! and translates requests to the Argo LLM gateway's native dialect, with
//! per-model-family tool calling, image inlining, and streaming support.
//!
//! ## Quick Start
//!
//! ```bash
//! argomux                       # start with defaults / config file
//! argomux --config ./argomux.toml
//! argomux --verbose             # payload logging
//! argomux --native-anthropic    # forward Anthropic bodies unchanged
//! ```

/* --- uses ------------------------------------------------------------------------------------ */

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use tracing::info;

use argomux::config::Config;
use argomux::server::ProxyMode;
use argomux::{ProxyError, Result, create_app};

/* --- constants ------------------------------------------------------------------------------ */

/** the version as defined in cargo.toml */
const VERSION: &str = env!("CARGO_PKG_VERSION");

/** exit code for configuration errors */
const EXIT_CONFIG_ERROR: u8 = 1;

/** exit code for unrecoverable startup errors */
const EXIT_STARTUP_ERROR: u8 = 2;

/* --- types ----------------------------------------------------------------------------------- */

///
/// Parsed command line options.
#[derive(Debug, Default)]
struct CliOptions {
    config_path: Option<PathBuf>,
    mode: ProxyMode,
    verbose: bool,
}

/* --- start of code -------------------------------------------------------------------------- */

///
/// Main application entry point for the ArgoMux proxy server.
///
/// Parses CLI flags, loads configuration, initializes logging, and starts
/// the HTTP server.
///
/// # Returns
///  * exit code 0 on normal shutdown
///  * 1 on configuration errors
///  * 2 on unrecoverable startup errors
#[tokio::main]
async fn main() -> ExitCode {
    // Load .env for environment variable support (before any config loading)
    if let Err(e) = dotenvy::dotenv() {
        if std::path::Path::new(".env").exists() {
            eprintln!("Warning: Could not load .env file: {}", e);
        }
    }

    let options = match parse_cli_args() {
        Ok(Some(options)) => options,
        Ok(None) => return ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("Error: {}", message);
            eprintln!();
            eprintln!("Run 'argomux --help' for usage.");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let config = match Config::load(options.config_path.as_deref()) {
        Ok(mut config) => {
            if options.verbose {
                config.server.verbose = true;
                config.server.log_level = argomux::config::LogLevel::Debug;
            }
            config
        }
        Err(e) => {
            eprintln!("Configuration error:");
            for line in e.to_string().lines() {
                eprintln!("  {}", line);
            }
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    initialize_logging(&config);

    match run(config, options.mode).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error:");
            for line in e.to_string().lines() {
                eprintln!("  {}", line);
            }
            ExitCode::from(EXIT_STARTUP_ERROR)
        }
    }
}

///
/// Parse command line arguments.
///
/// # Returns
///  * `Ok(Some(options))` to continue with startup
///  * `Ok(None)` when a flag like `--help` handled the invocation
///  * `Err(message)` on invalid arguments
fn parse_cli_args() -> std::result::Result<Option<CliOptions>, String> {
    let mut options = CliOptions::default();
    let mut args = env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("argomux {}", VERSION);
                return Ok(None);
            }
            "--help" | "-h" => {
                print_help();
                return Ok(None);
            }
            "--example-config" => {
                print!("{}", Config::example_toml());
                return Ok(None);
            }
            "--native-openai" => options.mode = ProxyMode::NativeOpenAi,
            "--native-anthropic" => options.mode = ProxyMode::NativeAnthropic,
            "--dev" => options.mode = ProxyMode::Dev,
            "--verbose" | "-v" => options.verbose = true,
            "--config" | "-c" => {
                let path = args.next().ok_or("--config requires a path argument")?;
                options.config_path = Some(PathBuf::from(path));
            }
            other if other.starts_with('-') => {
                return Err(format!("Unknown option: {}", other));
            }
            other => {
                // A bare path argument is treated as the config file.
                if options.config_path.is_some() {
                    return Err(format!("Unexpected argument: {}", other));
                }
                options.config_path = Some(PathBuf::from(other));
            }
        }
    }

    Ok(Some(options))
}

///
/// Print help information for the ArgoMux CLI.
fn print_help() {
    println!("ArgoMux v{}", VERSION);
    println!("Reverse proxy translating OpenAI/Anthropic API requests to the Argo gateway dialect");
    println!();
    println!("USAGE:");
    println!("    argomux [OPTIONS] [CONFIG_PATH]");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config <PATH>     Configuration file (TOML)");
    println!("    -v, --verbose           Verbose request/response payload logging");
    println!("        --native-openai     Forward OpenAI-format bodies unchanged");
    println!("        --native-anthropic  Forward Anthropic-format bodies unchanged");
    println!("        --dev               Pure passthrough for development");
    println!("        --example-config    Print an example configuration file");
    println!("    -h, --help              Print help information");
    println!("    -V, --version           Print version information");
    println!();
    println!("ENVIRONMENT VARIABLES:");
    println!("    ARGO_API_URL                        Upstream Argo base URL");
    println!("    ARGO_USER                           Username injected into upstream requests");
    println!("    ARGO_PROXY_MAX_CONNECTIONS          Connection pool cap");
    println!("    ARGO_PROXY_MAX_CONNECTIONS_PER_HOST Per-host connection cap");
    println!("    ARGO_PROXY_CONNECT_TIMEOUT          Connect timeout (seconds, default 10)");
    println!("    ARGO_PROXY_READ_TIMEOUT             Read timeout (seconds, default 600)");
    println!("    ARGO_PROXY_TOTAL_TIMEOUT            Total timeout (seconds, default 1800)");
    println!("    ARGO_PROXY_KEEPALIVE_TIMEOUT        Keep-alive timeout (seconds, default 600)");
    println!("    ARGO_PROXY_DNS_CACHE_TTL            DNS cache TTL (seconds, default 300)");
    println!("    ENABLE_LEAKED_TOOL_FIX              Substitute recovered leaked tool calls");
    println!();
    println!("EXIT CODES:");
    println!("    0   normal shutdown");
    println!("    1   configuration error");
    println!("    2   unrecoverable startup error");
}

///
/// Initialize logging based on configuration settings.
fn initialize_logging(config: &Config) {
    let level = config.server.log_level.to_tracing_level();
    tracing_subscriber::fmt().with_max_level(level).with_target(false).init();
}

///
/// Build the application and serve it until shutdown.
async fn run(config: Config, mode: ProxyMode) -> Result<()> {
    let port = config.server.port;
    let app = create_app(config, mode)?;

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await.map_err(|e| {
        let error_msg = format!("Failed to bind to port {}: {}", port, e);
        if e.kind() == std::io::ErrorKind::AddrInUse {
            ProxyError::Config(format!(
                "{}\n\n\
                 Port {} is already in use. Here are some solutions:\n\
                 1. Find and stop the other instance:  lsof -i :{}\n\
                 2. Change the port in the config file or set server.port",
                error_msg, port, port
            ))
        } else {
            ProxyError::Config(format!(
                "{}\n\n\
                 To fix this:\n\
                 • Check if the port is valid (1-65535)\n\
                 • Ensure you have permission to bind to the port",
                error_msg
            ))
        }
    })?;

    log_startup_info(port, mode);

    axum::serve(listener, app)
        .await
        .map_err(|e| ProxyError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}

///
/// Log startup information and configuration details.
fn log_startup_info(port: u16, mode: ProxyMode) {
    info!("ArgoMux v{} running on port {}", VERSION, port);
    info!("OpenAI-compatible endpoint:    http://localhost:{}/v1", port);
    info!("Anthropic-compatible endpoint: http://localhost:{}/v1/messages", port);
    if mode != ProxyMode::Translate {
        info!("Proxy mode: {:?}", mode);
    }
}
