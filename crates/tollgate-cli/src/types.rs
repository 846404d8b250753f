//! Response bodies of the admin surface, as seen by the client.

use std::collections::BTreeMap;

use serde::Deserialize;
use tollgate_routing::RouteEntry;

/// `GET /status`.
#[derive(Debug, Clone, Deserialize)]
pub struct Status {
    pub service: String,
    pub version: String,
    pub status: String,
    pub uptime_seconds: i64,
    #[serde(default)]
    pub ai_agents: Vec<String>,
    #[serde(default)]
    pub mcp_services: Vec<String>,
    #[serde(default)]
    pub proxy_routes: Vec<String>,
    pub routes: usize,
    pub connections: usize,
}

/// `GET /routes`.
#[derive(Debug, Clone, Deserialize)]
pub struct Routes {
    pub routes: Vec<RouteEntry>,
}

/// One service in `GET /circuit-breakers`.
#[derive(Debug, Clone, Deserialize)]
pub struct BreakerService {
    pub state: String,
    pub error_count: u32,
    pub success_count: u32,
    pub since_state_change_ms: u64,
}

/// `GET /circuit-breakers`.
#[derive(Debug, Clone, Deserialize)]
pub struct Breakers {
    pub error_threshold: u32,
    pub success_threshold: u32,
    pub timeout_ms: u64,
    pub fallback_disabled: bool,
    #[serde(default)]
    pub services: BTreeMap<String, BreakerService>,
}

/// One limiter in `GET /rate-limiters`.
#[derive(Debug, Clone, Deserialize)]
pub struct Limiter {
    pub rate: f64,
    pub burst: u32,
    pub tokens: f64,
    pub enabled: bool,
}

/// `GET /rate-limiters`.
#[derive(Debug, Clone, Deserialize)]
pub struct Limiters {
    pub default_rate: f64,
    pub default_burst: u32,
    #[serde(default)]
    pub limiters: BTreeMap<String, Limiter>,
}

/// `POST /reload-config`.
#[derive(Debug, Clone, Deserialize)]
pub struct Reload {
    pub message: String,
    pub routes: usize,
    #[serde(default)]
    pub proxy_routes: Vec<String>,
}

/// `POST /reload-proxy-routes`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyReload {
    pub message: String,
    #[serde(default)]
    pub proxy_routes: Vec<String>,
}

/// Plain acknowledgement.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message: String,
}

/// Error envelope returned with every non-2xx response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

/// Body of [`ApiErrorResponse`].
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}
