//! Gateway configuration types.
//!
//! This module defines the YAML configuration file and the [`ConfigStore`]
//! that holds the live snapshot. Every field has a default, so an empty file
//! is a valid configuration.
//!
//! ```yaml
//! server:
//!   http_addr: "0.0.0.0:8080"
//!   debug: true
//! router:
//!   default_rate_limit: 50
//! proxy_routes:
//!   - path: "/search"
//!     target_url: "http://localhost:8302"
//!     enable: true
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tollgate_routing::{CircuitBreakerConfig, RouteEntry};
use tollgate_services::{ExampleAgent, ExampleToolService, ServiceConfig};

use crate::ws::WsSettings;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid YAML for this schema.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The configuration parsed but holds an unusable value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Root of the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Listening surfaces and request limits.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging output.
    #[serde(default)]
    pub log: LogConfig,

    /// WebSocket connection policy.
    #[serde(default)]
    pub websocket: WebSocketConfig,

    /// Rate limiting and circuit breaking policy.
    #[serde(default)]
    pub router: RouterConfig,

    /// Agent and tool service defaults.
    #[serde(default)]
    pub services: ServicesConfig,

    /// Route table entries, loaded on start and on every reload.
    #[serde(default)]
    pub routes: Vec<RouteEntry>,

    /// Reverse-proxy declarations.
    #[serde(default)]
    pub proxy_routes: Vec<ProxyRouteConfig>,
}

/// Listening surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Application traffic (e.g., "0.0.0.0:8080").
    #[serde(default = "ServerConfig::default_http_addr")]
    pub http_addr: String,

    /// WebSocket traffic.
    #[serde(default = "ServerConfig::default_ws_addr")]
    pub ws_addr: String,

    /// Administrative control surface.
    #[serde(default = "ServerConfig::default_admin_addr")]
    pub admin_addr: String,

    /// Exposes `GET /config` on the admin surface.
    #[serde(default)]
    pub debug: bool,

    /// Upper bound on graceful shutdown, in seconds.
    #[serde(default = "ServerConfig::default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,

    /// Timeout for a whole proxied request, in seconds.
    #[serde(default = "ServerConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Maximum request body size in bytes.
    #[serde(default = "ServerConfig::default_max_body")]
    pub max_body_bytes: usize,

    /// Allowed CORS origins.
    #[serde(default = "ServerConfig::default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl ServerConfig {
    fn default_http_addr() -> String {
        "0.0.0.0:8080".to_string()
    }

    fn default_ws_addr() -> String {
        "0.0.0.0:8081".to_string()
    }

    fn default_admin_addr() -> String {
        "0.0.0.0:8082".to_string()
    }

    const fn default_shutdown_timeout() -> u64 {
        30
    }

    const fn default_request_timeout() -> u64 {
        60
    }

    const fn default_max_body() -> usize {
        10 * 1024 * 1024 // 10 MB
    }

    fn default_cors_origins() -> Vec<String> {
        vec!["*".to_string()]
    }

    /// Get the shutdown timeout as a `Duration`.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: Self::default_http_addr(),
            ws_addr: Self::default_ws_addr(),
            admin_addr: Self::default_admin_addr(),
            debug: false,
            shutdown_timeout_seconds: Self::default_shutdown_timeout(),
            request_timeout_seconds: Self::default_request_timeout(),
            max_body_bytes: Self::default_max_body(),
            cors_origins: Self::default_cors_origins(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-field lines.
    #[default]
    Text,
    /// Abbreviated single-line output.
    Compact,
    /// Newline-delimited JSON.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Invalid(format!("unknown log format: {other}"))),
        }
    }
}

/// Logging output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Filter directive, e.g. "info" or "info,tollgate=debug". `RUST_LOG` wins.
    #[serde(default = "LogConfig::default_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl LogConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            format: LogFormat::default(),
        }
    }
}

/// WebSocket connection policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConfig {
    /// Interval of the manager-wide liveness sweep, in seconds.
    #[serde(default = "WebSocketConfig::default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,

    /// Interval of per-connection protocol pings, in seconds.
    #[serde(default = "WebSocketConfig::default_ping_interval")]
    pub ping_interval_seconds: u64,

    /// Rolling read deadline, in seconds.
    #[serde(default = "WebSocketConfig::default_read_timeout")]
    pub read_timeout_seconds: u64,

    /// Per-frame write deadline, in seconds.
    #[serde(default = "WebSocketConfig::default_write_timeout")]
    pub write_timeout_seconds: u64,

    /// Outbound queue capacity per connection.
    #[serde(default = "WebSocketConfig::default_buffer")]
    pub send_buffer: usize,

    /// Inbound queue capacity per connection.
    #[serde(default = "WebSocketConfig::default_buffer")]
    pub recv_buffer: usize,

    /// Upgrades beyond this many live connections are refused.
    #[serde(default = "WebSocketConfig::default_max_connections")]
    pub max_connections: usize,
}

impl WebSocketConfig {
    const fn default_heartbeat_interval() -> u64 {
        30
    }

    const fn default_ping_interval() -> u64 {
        15
    }

    const fn default_read_timeout() -> u64 {
        30
    }

    const fn default_write_timeout() -> u64 {
        5
    }

    const fn default_buffer() -> usize {
        100
    }

    const fn default_max_connections() -> usize {
        1000
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_seconds: Self::default_heartbeat_interval(),
            ping_interval_seconds: Self::default_ping_interval(),
            read_timeout_seconds: Self::default_read_timeout(),
            write_timeout_seconds: Self::default_write_timeout(),
            send_buffer: Self::default_buffer(),
            recv_buffer: Self::default_buffer(),
            max_connections: Self::default_max_connections(),
        }
    }
}

impl From<&WebSocketConfig> for WsSettings {
    fn from(config: &WebSocketConfig) -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(config.heartbeat_interval_seconds),
            ping_interval: Duration::from_secs(config.ping_interval_seconds),
            read_timeout: Duration::from_secs(config.read_timeout_seconds),
            write_timeout: Duration::from_secs(config.write_timeout_seconds),
            send_buffer: config.send_buffer,
            recv_buffer: config.recv_buffer,
            max_connections: config.max_connections,
        }
    }
}

/// Admission and failure isolation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Enforce rate limits at all.
    #[serde(default = "RouterConfig::default_true")]
    pub enable_rate_limit: bool,

    /// Tokens per second for limiters without an explicit setting.
    #[serde(default = "RouterConfig::default_rate_limit")]
    pub default_rate_limit: f64,

    /// Bucket capacity for limiters without an explicit setting.
    #[serde(default = "RouterConfig::default_burst")]
    pub default_burst: u32,

    /// Enforce circuit breaking. When false the breaker admits everything.
    #[serde(default = "RouterConfig::default_true")]
    pub circuit_break: bool,

    /// Errors that open a service's circuit.
    #[serde(default = "RouterConfig::default_threshold")]
    pub circuit_break_threshold: u32,

    /// Seconds an open circuit waits before a trial request.
    #[serde(default = "RouterConfig::default_timeout")]
    pub circuit_break_timeout_seconds: u64,

    /// Successes in half-open state that close the circuit.
    #[serde(default = "RouterConfig::default_success_threshold")]
    pub circuit_break_success_threshold: u32,
}

impl RouterConfig {
    const fn default_true() -> bool {
        true
    }

    const fn default_rate_limit() -> f64 {
        100.0
    }

    const fn default_burst() -> u32 {
        100
    }

    const fn default_threshold() -> u32 {
        CircuitBreakerConfig::DEFAULT_ERROR_THRESHOLD
    }

    const fn default_timeout() -> u64 {
        CircuitBreakerConfig::DEFAULT_TIMEOUT.as_secs()
    }

    const fn default_success_threshold() -> u32 {
        CircuitBreakerConfig::DEFAULT_SUCCESS_THRESHOLD
    }

    /// Breaker thresholds described by this section.
    #[must_use]
    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            error_threshold: self.circuit_break_threshold,
            success_threshold: self.circuit_break_success_threshold,
            timeout: Duration::from_secs(self.circuit_break_timeout_seconds),
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            enable_rate_limit: true,
            default_rate_limit: Self::default_rate_limit(),
            default_burst: Self::default_burst(),
            circuit_break: true,
            circuit_break_threshold: Self::default_threshold(),
            circuit_break_timeout_seconds: Self::default_timeout(),
            circuit_break_success_threshold: Self::default_success_threshold(),
        }
    }
}

/// Agent and tool service defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// Agent used when a request names none.
    #[serde(default = "ServicesConfig::default_agent")]
    pub default_agent: String,

    /// Tool service used when a request names none.
    #[serde(default = "ServicesConfig::default_tool_service")]
    pub default_tool_service: String,

    /// Per-service configuration passed to `initialize` on first use.
    #[serde(default)]
    pub config: HashMap<String, ServiceConfig>,
}

impl ServicesConfig {
    fn default_agent() -> String {
        ExampleAgent::NAME.to_string()
    }

    fn default_tool_service() -> String {
        ExampleToolService::NAME.to_string()
    }

    /// Initialization config for `name`; empty if none is configured.
    #[must_use]
    pub fn config_for(&self, name: &str) -> ServiceConfig {
        self.config.get(name).cloned().unwrap_or_default()
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            default_agent: Self::default_agent(),
            default_tool_service: Self::default_tool_service(),
            config: HashMap::new(),
        }
    }
}

/// One reverse-proxy declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRouteConfig {
    /// Path to claim; a trailing `/*` claims the whole subtree.
    #[serde(default)]
    pub path: String,

    /// Backend base URL.
    #[serde(default)]
    pub target_url: String,

    /// Disabled declarations are skipped.
    #[serde(default = "ProxyRouteConfig::default_enable")]
    pub enable: bool,
}

impl ProxyRouteConfig {
    const fn default_enable() -> bool {
        true
    }
}

impl GatewayConfig {
    /// Parse a configuration from YAML text.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` if the text does not match the schema.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read and parse a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Check values that parse but cannot work.
    ///
    /// Route entries and proxy declarations are checked when they are
    /// installed, not here.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, addr) in [
            ("server.http_addr", &self.server.http_addr),
            ("server.ws_addr", &self.server.ws_addr),
            ("server.admin_addr", &self.server.admin_addr),
        ] {
            addr.parse::<SocketAddr>()
                .map_err(|_| ConfigError::Invalid(format!("{name} is not a socket address: {addr}")))?;
        }

        if self.websocket.send_buffer == 0 || self.websocket.recv_buffer == 0 {
            return Err(ConfigError::Invalid(
                "websocket buffers must be greater than zero".into(),
            ));
        }
        if self.websocket.heartbeat_interval_seconds == 0 || self.websocket.ping_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "websocket intervals must be greater than zero".into(),
            ));
        }
        if !(self.router.default_rate_limit.is_finite() && self.router.default_rate_limit >= 0.0) {
            return Err(ConfigError::Invalid(
                "router.default_rate_limit must be a non-negative number".into(),
            ));
        }
        Ok(())
    }
}

/// Command-line values that take precedence over the file.
///
/// They are re-applied after every reload so a reload never reverts them.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Replaces `server.http_addr`.
    pub http_addr: Option<String>,
    /// Replaces `server.ws_addr`.
    pub ws_addr: Option<String>,
    /// Replaces `server.admin_addr`.
    pub admin_addr: Option<String>,
    /// Forces `server.debug` on.
    pub debug: bool,
    /// Replaces `log.level`.
    pub log_level: Option<String>,
    /// Replaces `log.format`.
    pub log_format: Option<LogFormat>,
}

impl ConfigOverrides {
    fn apply(&self, config: &mut GatewayConfig) {
        if let Some(addr) = &self.http_addr {
            config.server.http_addr.clone_from(addr);
        }
        if let Some(addr) = &self.ws_addr {
            config.server.ws_addr.clone_from(addr);
        }
        if let Some(addr) = &self.admin_addr {
            config.server.admin_addr.clone_from(addr);
        }
        if self.debug {
            config.server.debug = true;
        }
        if let Some(level) = &self.log_level {
            config.log.level.clone_from(level);
        }
        if let Some(format) = self.log_format {
            config.log.format = format;
        }
    }
}

/// Holder of the live configuration snapshot.
///
/// Readers take an `Arc` to the current snapshot and keep using it for as
/// long as they like. Reloads build a complete new snapshot and swap it in
/// with one write, so nobody ever observes a half-applied file.
#[derive(Debug)]
pub struct ConfigStore {
    path: Option<PathBuf>,
    overrides: ConfigOverrides,
    current: RwLock<Arc<GatewayConfig>>,
}

impl ConfigStore {
    /// Load from `path` (or defaults when `None`) and apply `overrides`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: Option<PathBuf>, overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        let store = Self {
            path,
            overrides,
            current: RwLock::new(Arc::new(GatewayConfig::default())),
        };
        let initial = store.read_fresh()?;
        *store.current.write() = Arc::new(initial);
        Ok(store)
    }

    /// Wrap an in-memory configuration. `reload` keeps it unchanged.
    #[must_use]
    pub fn from_config(config: GatewayConfig) -> Self {
        Self {
            path: None,
            overrides: ConfigOverrides::default(),
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// The file this store reloads from.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The current snapshot.
    #[must_use]
    pub fn current(&self) -> Arc<GatewayConfig> {
        Arc::clone(&self.current.read())
    }

    /// Build a new snapshot from the file without installing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn read_fresh(&self) -> Result<GatewayConfig, ConfigError> {
        let mut config = match &self.path {
            Some(path) => GatewayConfig::from_file(path)?,
            None => GatewayConfig::clone(&self.current()),
        };
        self.overrides.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Install a snapshot, returning it.
    pub fn swap(&self, config: GatewayConfig) -> Arc<GatewayConfig> {
        let config = Arc::new(config);
        *self.current.write() = Arc::clone(&config);
        config
    }

    /// Re-read the file and install the result.
    ///
    /// On error the previous snapshot stays active.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn reload(&self) -> Result<Arc<GatewayConfig>, ConfigError> {
        let fresh = self.read_fresh()?;
        Ok(self.swap(fresh))
    }

    /// Install a modified copy of the current snapshot.
    pub fn update(&self, f: impl FnOnce(&mut GatewayConfig)) -> Arc<GatewayConfig> {
        let mut current = self.current.write();
        let mut next = GatewayConfig::clone(&current);
        f(&mut next);
        *current = Arc::new(next);
        Arc::clone(&current)
    }
}
