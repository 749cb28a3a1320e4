//! Server configuration loading from file and environment variables.

use porter_types::GatewayPolicy;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Admin surface settings.
    #[serde(default)]
    pub admin: AdminConfig,

    /// Local-agent hook settings.
    #[serde(default)]
    pub hook: HookConfig,

    /// Gateway policy (rate limits, skew window, retention, body bound).
    #[serde(default)]
    pub gateway: GatewayPolicy,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// The domain this gateway answers for (the `to` field of inbound
    /// knocks). Informational; not enforced.
    #[serde(default)]
    pub public_domain: String,

    /// Whether to take the client address from `X-Forwarded-For`. Enable
    /// only behind a proxy that overwrites the header; otherwise any client
    /// can pick its own rate-limit bucket per request.
    #[serde(default)]
    pub trust_forwarded_header: bool,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Busy timeout for SQLite connections, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled SQLite connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "porter_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Admin surface configuration.
///
/// Without a token the admin endpoints reject everything — there is no
/// unauthenticated fallback.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminConfig {
    /// Bearer token required on `/peers` and `/knocks` routes.
    pub token: Option<String>,
}

/// Local-agent hook configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HookConfig {
    /// URL the gateway POSTs notifications to. Absent disables forwarding.
    pub url: Option<String>,

    /// Bearer token sent with each notification.
    pub token: Option<String>,

    /// Per-request timeout for the forward call, in seconds.
    #[serde(default = "default_hook_timeout")]
    pub timeout_seconds: u64,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    7710
}

fn default_db_path() -> String {
    "porter.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_hook_timeout() -> u64 {
    5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_domain: String::new(),
            trust_forwarded_header: false,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            timeout_seconds: default_hook_timeout(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `PORTER_HOST` overrides `server.host`
/// - `PORTER_PORT` overrides `server.port`
/// - `PORTER_PUBLIC_DOMAIN` overrides `server.public_domain`
/// - `PORTER_TRUST_FORWARDED_HEADER` overrides `server.trust_forwarded_header`
/// - `PORTER_DB_PATH` overrides `database.path`
/// - `PORTER_LOG_LEVEL` overrides `logging.level`
/// - `PORTER_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `PORTER_ADMIN_TOKEN` overrides `admin.token`
/// - `PORTER_HOOK_URL` overrides `hook.url`
/// - `PORTER_HOOK_TOKEN` overrides `hook.token`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    if let Ok(host) = std::env::var("PORTER_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Ok(port) = std::env::var("PORTER_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Ok(domain) = std::env::var("PORTER_PUBLIC_DOMAIN") {
        config.server.public_domain = domain;
    }
    if let Ok(trust) = std::env::var("PORTER_TRUST_FORWARDED_HEADER") {
        config.server.trust_forwarded_header = trust == "true" || trust == "1";
    }
    if let Ok(db_path) = std::env::var("PORTER_DB_PATH") {
        config.database.path = db_path;
    }
    if let Ok(level) = std::env::var("PORTER_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("PORTER_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Ok(token) = std::env::var("PORTER_ADMIN_TOKEN") {
        config.admin.token = Some(token);
    }
    if let Ok(url) = std::env::var("PORTER_HOOK_URL") {
        config.hook.url = Some(url);
    }
    if let Ok(token) = std::env::var("PORTER_HOOK_TOKEN") {
        config.hook.token = Some(token);
    }

    Ok(config)
}
