//! Gateway application state.
//!
//! This module defines the shared state that is available to all request
//! handlers on every surface, and the reload operations that mutate it.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use tollgate_routing::{CircuitBreaker, RateLimitManager, RouteTable};
use tollgate_services::{AgentManager, ToolManager};

use crate::admission::Admission;
use crate::config::{ConfigStore, GatewayConfig, ProxyRouteConfig};
use crate::error::GatewayError;
use crate::hub::ServiceHub;
use crate::proxy::ProxyTable;
use crate::ws::{register_default_handlers, ConnectionManager, WsSettings};

/// Tracing target for reload events.
const AUDIT_TARGET: &str = "tollgate::audit";

/// What a configuration reload installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReloadSummary {
    /// Number of route table entries.
    pub routes: usize,
    /// Live proxy paths.
    pub proxy_routes: Vec<String>,
}

/// Shared application state for the gateway.
///
/// One instance backs all three listeners. Every component is internally
/// synchronized, so handlers only ever need `&GatewayState`.
#[derive(Debug)]
pub struct GatewayState {
    /// Live configuration snapshot.
    pub config: Arc<ConfigStore>,
    /// Route table for generic forwarding.
    pub routes: Arc<RouteTable>,
    /// Rate limiters keyed by caller or service.
    pub rate_limits: Arc<RateLimitManager>,
    /// Circuit breaker keyed by service.
    pub breaker: Arc<CircuitBreaker>,
    /// Rate limiter plus breaker as one gate.
    pub admission: Admission,
    /// Agents and tool services.
    pub hub: ServiceHub,
    /// Live WebSocket connections.
    pub connections: Arc<ConnectionManager>,
    /// Live reverse-proxy routes.
    pub proxy: ProxyTable,
    http_client: reqwest::Client,
    registered_proxy_routes: Mutex<BTreeSet<String>>,
    reload_lock: Mutex<()>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    started_at: DateTime<Utc>,
}

impl GatewayState {
    /// Build the state from the store's current snapshot.
    ///
    /// Routes and proxy routes from the configuration are installed and the
    /// built-in WebSocket handlers are registered. No service factories are
    /// registered; see `ServiceHub::register_examples`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured routes are invalid or the HTTP
    /// client cannot be built.
    pub fn new(config: Arc<ConfigStore>) -> Result<Arc<Self>, GatewayError> {
        let snapshot = config.current();
        let router = &snapshot.router;

        let rate_limits = Arc::new(RateLimitManager::new(
            router.default_rate_limit,
            router.default_burst,
        ));
        let breaker = Arc::new(CircuitBreaker::new(router.breaker_config()));
        let admission = Admission::new(
            Arc::clone(&config),
            Arc::clone(&rate_limits),
            Arc::clone(&breaker),
        );
        let hub = ServiceHub::new(
            Arc::clone(&config),
            Arc::new(AgentManager::new("agent")),
            Arc::new(ToolManager::new("tool")),
            admission.clone(),
        );

        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        let connections = Arc::new(ConnectionManager::new(
            WsSettings::from(&snapshot.websocket),
            shutdown.clone(),
            tracker.clone(),
        ));
        register_default_handlers(&connections, &hub);

        let http_client = reqwest::Client::builder()
            .timeout(snapshot.server.request_timeout())
            .build()?;

        let routes = Arc::new(RouteTable::new());
        routes.replace_all(snapshot.routes.iter().cloned())?;

        let state = Self {
            config,
            routes,
            rate_limits,
            breaker,
            admission,
            hub,
            connections,
            proxy: ProxyTable::new(),
            http_client,
            registered_proxy_routes: Mutex::new(BTreeSet::new()),
            reload_lock: Mutex::new(()),
            shutdown,
            tracker,
            started_at: Utc::now(),
        };
        state.apply_policy(&snapshot);
        state.install_proxy_routes(&snapshot.proxy_routes);

        Ok(Arc::new(state))
    }

    /// Client used for every forwarded request.
    #[must_use]
    pub fn http_client(&self) -> &reqwest::Client {
        &self.http_client
    }

    /// Token cancelled when the gateway shuts down.
    #[must_use]
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Tracker of every background task the gateway spawned.
    #[must_use]
    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// When the state was created.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Proxy paths installed by the most recent install, sorted.
    #[must_use]
    pub fn registered_proxy_routes(&self) -> Vec<String> {
        self.registered_proxy_routes.lock().iter().cloned().collect()
    }

    /// Re-read the configuration file and apply all of it.
    ///
    /// The route table is rebuilt first; if that fails nothing changes.
    /// Then the new snapshot is installed, limiter defaults, breaker
    /// thresholds and WebSocket settings are updated, and proxy routes are
    /// reinstalled. Routes added through the admin API are replaced by the
    /// file's routes.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or holds invalid routes;
    /// the previous configuration stays active.
    pub fn reload_config(&self) -> Result<ReloadSummary, GatewayError> {
        let _guard = self.reload_lock.lock();

        let fresh = self.config.read_fresh()?;
        let routes = self.routes.replace_all(fresh.routes.iter().cloned())?;
        let snapshot = self.config.swap(fresh);
        self.apply_policy(&snapshot);
        let proxy_routes = self.install_proxy_routes(&snapshot.proxy_routes);

        tracing::info!(
            target: AUDIT_TARGET,
            action = "config.reload",
            routes,
            proxy_routes = proxy_routes.len(),
            "Configuration reloaded"
        );
        Ok(ReloadSummary {
            routes,
            proxy_routes,
        })
    }

    /// Re-read the configuration file and reinstall only its proxy routes.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded.
    pub fn reload_proxy_routes(&self) -> Result<Vec<String>, GatewayError> {
        let _guard = self.reload_lock.lock();

        let fresh = self.config.read_fresh()?;
        let snapshot = self
            .config
            .update(|config| config.proxy_routes = fresh.proxy_routes);
        let paths = self.install_proxy_routes(&snapshot.proxy_routes);

        tracing::info!(
            target: AUDIT_TARGET,
            action = "proxy.reload",
            proxy_routes = paths.len(),
            "Proxy routes reloaded"
        );
        Ok(paths)
    }

    fn apply_policy(&self, config: &GatewayConfig) {
        let router = &config.router;
        self.rate_limits
            .set_defaults(router.default_rate_limit, router.default_burst);
        self.breaker.apply_config(router.breaker_config());
        if router.circuit_break {
            self.breaker.enable_fallback();
        } else {
            self.breaker.disable_fallback();
        }
        self.connections
            .apply_settings(WsSettings::from(&config.websocket));
    }

    fn install_proxy_routes(&self, routes: &[ProxyRouteConfig]) -> Vec<String> {
        let mut live = BTreeSet::new();
        self.proxy.install_all(routes, |path| {
            live.insert(path.to_string());
        });
        let paths = live.iter().cloned().collect();
        *self.registered_proxy_routes.lock() = live;
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigOverrides;
    use tollgate_routing::CircuitState;

    const INITIAL: &str = r#"
router:
  default_rate_limit: 10
  default_burst: 10
routes:
  - id: a
    method: get
    path: /items
    service_name: items
    backend_url: http://localhost:9100
proxy_routes:
  - path: /search
    target_url: http://localhost:8302
"#;

    fn state_from(yaml: &str) -> (tempfile::NamedTempFile, Arc<GatewayState>) {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), yaml).unwrap();
        let store = ConfigStore::load(Some(file.path().to_path_buf()), ConfigOverrides::default())
            .unwrap();
        let state = GatewayState::new(Arc::new(store)).unwrap();
        (file, state)
    }

    #[test]
    fn new_installs_configured_routes() {
        let (_file, state) = state_from(INITIAL);
        assert_eq!(state.routes.len(), 1);
        assert!(state.routes.match_route("GET", "/items").is_some());
        assert_eq!(state.registered_proxy_routes(), vec!["/search"]);
        assert_eq!(state.rate_limits.defaults(), (10.0, 10));
    }

    #[test]
    fn reload_applies_whole_file() {
        let (file, state) = state_from(INITIAL);
        std::fs::write(
            file.path(),
            r#"
router:
  default_rate_limit: 3
  default_burst: 4
  circuit_break: false
routes:
  - id: b
    method: POST
    path: /orders
    service_name: orders
    backend_url: http://localhost:9200
proxy_routes:
  - path: /docs/*
    target_url: http://localhost:8400
"#,
        )
        .unwrap();

        let summary = state.reload_config().unwrap();
        assert_eq!(summary.routes, 1);
        assert_eq!(summary.proxy_routes, vec!["/docs/*"]);
        assert!(state.routes.match_route("GET", "/items").is_none());
        assert!(state.routes.match_route("POST", "/orders").is_some());
        assert_eq!(state.rate_limits.defaults(), (3.0, 4));
        assert!(state.breaker.is_fallback_disabled());
        assert!(state.proxy.resolve("/search").is_none());
        assert!(state.proxy.resolve("/docs/x").is_some());
    }

    #[test]
    fn failed_reload_changes_nothing() {
        let (file, state) = state_from(INITIAL);
        std::fs::write(
            file.path(),
            r#"
routes:
  - id: bad
    method: GET
    path: no-slash
    service_name: s
    backend_url: http://localhost:1
"#,
        )
        .unwrap();

        assert!(matches!(
            state.reload_config(),
            Err(GatewayError::Routes(_))
        ));
        assert!(state.routes.match_route("GET", "/items").is_some());
        assert_eq!(state.config.current().router.default_rate_limit, 10.0);
    }

    #[test]
    fn proxy_reload_leaves_other_settings() {
        let (file, state) = state_from(INITIAL);
        std::fs::write(
            file.path(),
            r#"
router:
  default_rate_limit: 1
proxy_routes:
  - path: /search
    target_url: http://localhost:8302
  - path: /maps
    target_url: http://localhost:8303
"#,
        )
        .unwrap();

        let paths = state.reload_proxy_routes().unwrap();
        assert_eq!(paths, vec!["/maps", "/search"]);
        assert_eq!(state.registered_proxy_routes(), paths);
        assert_eq!(state.config.current().router.default_rate_limit, 10.0);
        assert_eq!(state.routes.len(), 1);
    }

    #[test]
    fn reload_keeps_breaker_state() {
        let (_file, state) = state_from(INITIAL);
        for _ in 0..5 {
            state.breaker.record_failure("items");
        }
        state.reload_config().unwrap();
        assert_eq!(state.breaker.state("items"), CircuitState::Open);
    }
}
