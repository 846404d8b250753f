//! Administrative endpoints.
//!
//! Served on the admin listener only:
//!
//! - `GET /health`, `GET /status`, `GET /config` (debug mode only)
//! - `POST /reload-config`, `POST /reload-proxy-routes`
//! - `GET|POST /routes`, `PUT|DELETE /routes/:id`
//! - `GET /circuit-breakers`, `POST /circuit-breakers/reset`,
//!   `POST /circuit-breakers/:service/reset`
//! - `GET /rate-limiters`, `PUT /rate-limiters/:key`

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tollgate_core::RouteId;
use tollgate_routing::{CircuitBreakerSnapshot, RateLimiterSnapshot, RouteEntry};

use super::json_body;
use crate::config::GatewayConfig;
use crate::error::{ApiError, GatewayError};
use crate::state::{GatewayState, ReloadSummary};

/// Tracing target for admin mutations.
const AUDIT_TARGET: &str = "tollgate::audit";

// =============================================================================
// Request/Response Types
// =============================================================================

/// Response of `GET /status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Service name.
    pub service: &'static str,
    /// Service version.
    pub version: &'static str,
    /// Always "running" while the listener answers.
    pub status: &'static str,
    /// Current time.
    pub timestamp: DateTime<Utc>,
    /// Seconds since start.
    pub uptime_seconds: i64,
    /// Registered agents.
    pub ai_agents: Vec<String>,
    /// Registered tool services.
    pub mcp_services: Vec<String>,
    /// Live proxy paths.
    pub proxy_routes: Vec<String>,
    /// Route table entries.
    pub routes: usize,
    /// Live WebSocket connections.
    pub connections: usize,
}

/// Generic acknowledgement.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    /// Human-readable result.
    pub message: String,
}

/// Response of `POST /reload-config`.
#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    /// Human-readable result.
    pub message: &'static str,
    /// What was installed.
    #[serde(flatten)]
    pub summary: ReloadSummary,
}

/// Response of `POST /reload-proxy-routes`.
#[derive(Debug, Serialize)]
pub struct ProxyReloadResponse {
    /// Human-readable result.
    pub message: &'static str,
    /// Live proxy paths.
    pub proxy_routes: Vec<String>,
}

/// Response of `GET /routes`.
#[derive(Debug, Serialize)]
pub struct RoutesResponse {
    /// Every entry, sorted by key then ID.
    pub routes: Vec<RouteEntry>,
}

/// Response of `GET /rate-limiters`.
#[derive(Debug, Serialize)]
pub struct RateLimitersResponse {
    /// Default rate for new limiters.
    pub default_rate: f64,
    /// Default burst for new limiters.
    pub default_burst: u32,
    /// Every limiter by key.
    pub limiters: BTreeMap<String, RateLimiterSnapshot>,
}

/// Body of `PUT /rate-limiters/:key`.
#[derive(Debug, Deserialize)]
pub struct RateLimiterUpdate {
    /// Tokens per second.
    pub rate: f64,
    /// Bucket capacity.
    pub burst: u32,
    /// Enable or disable the limiter; unchanged when absent.
    #[serde(default)]
    pub enabled: Option<bool>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Liveness of the admin listener.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Gateway status.
pub async fn status(State(state): State<Arc<GatewayState>>) -> Json<StatusResponse> {
    let now = Utc::now();
    Json(StatusResponse {
        service: crate::SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
        timestamp: now,
        uptime_seconds: (now - state.started_at()).num_seconds(),
        ai_agents: state.hub.agents().list_available().await,
        mcp_services: state.hub.tools().list_available().await,
        proxy_routes: state.registered_proxy_routes(),
        routes: state.routes.len(),
        connections: state.connections.len(),
    })
}

/// The live configuration. Only answered in debug mode.
///
/// # Errors
///
/// Returns 404 unless `server.debug` is set.
pub async fn config(State(state): State<Arc<GatewayState>>) -> Result<Json<GatewayConfig>, ApiError> {
    let config = state.config.current();
    if !config.server.debug {
        return Err(ApiError::NotFound("config endpoint is only available in debug mode".into()));
    }
    Ok(Json(GatewayConfig::clone(&config)))
}

/// Reload the whole configuration file.
///
/// # Errors
///
/// Returns 500 if the file cannot be loaded or 400 if it holds invalid
/// routes; the previous configuration stays active.
pub async fn reload_config(State(state): State<Arc<GatewayState>>) -> Result<Json<ReloadResponse>, ApiError> {
    let summary = blocking(state, |state| state.reload_config()).await?;
    Ok(Json(ReloadResponse {
        message: "Config reloaded successfully",
        summary,
    }))
}

/// Reload only the proxy routes from the configuration file.
///
/// # Errors
///
/// Returns 500 if the file cannot be loaded.
pub async fn reload_proxy_routes(
    State(state): State<Arc<GatewayState>>,
) -> Result<Json<ProxyReloadResponse>, ApiError> {
    let proxy_routes = blocking(state, |state| state.reload_proxy_routes()).await?;
    Ok(Json(ProxyReloadResponse {
        message: "Proxy routes reloaded successfully",
        proxy_routes,
    }))
}

/// Run a reload on the blocking pool. Reloads read the configuration file
/// while holding the reload lock.
async fn blocking<T, F>(state: Arc<GatewayState>, reload: F) -> Result<T, ApiError>
where
    F: FnOnce(&GatewayState) -> Result<T, GatewayError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || reload(&state))
        .await
        .map_err(|err| ApiError::Internal(format!("reload task failed: {err}")))?
        .map_err(ApiError::from)
}

/// List route table entries.
pub async fn list_routes(State(state): State<Arc<GatewayState>>) -> Json<RoutesResponse> {
    Json(RoutesResponse {
        routes: state.routes.list_routes(),
    })
}

/// Add a route table entry.
///
/// # Errors
///
/// Returns 400 for an invalid entry or 409 for a duplicate ID.
pub async fn create_route(
    State(state): State<Arc<GatewayState>>,
    payload: Result<Json<RouteEntry>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = json_body(payload)?;
    state.routes.add_route(entry.clone())?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// Replace the route table entry with the given ID.
///
/// The path's ID wins over any ID in the body.
///
/// # Errors
///
/// Returns 400 for an invalid entry or 404 for an unknown ID.
pub async fn update_route(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
    payload: Result<Json<RouteEntry>, JsonRejection>,
) -> Result<Json<RouteEntry>, ApiError> {
    let id = parse_route_id(&id)?;
    let mut entry = json_body(payload)?;
    entry.id = id;
    state.routes.update_route(entry.clone())?;
    Ok(Json(entry))
}

/// Remove the route table entry with the given ID.
///
/// # Errors
///
/// Returns 404 for an unknown ID.
pub async fn delete_route(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
) -> Result<Json<RouteEntry>, ApiError> {
    let id = parse_route_id(&id)?;
    let removed = state.routes.remove_route(&id)?;
    Ok(Json(removed))
}

/// Breaker thresholds and per-service states.
pub async fn circuit_breakers(State(state): State<Arc<GatewayState>>) -> Json<CircuitBreakerSnapshot> {
    Json(state.breaker.snapshot())
}

/// Close every circuit.
pub async fn reset_circuit_breakers(State(state): State<Arc<GatewayState>>) -> Json<MessageResponse> {
    state.breaker.reset_all();
    tracing::info!(target: AUDIT_TARGET, action = "breaker.reset_all", "All circuits reset");
    Json(MessageResponse {
        message: "All circuit breakers reset".into(),
    })
}

/// Close one service's circuit.
pub async fn reset_circuit_breaker(
    State(state): State<Arc<GatewayState>>,
    Path(service): Path<String>,
) -> Json<MessageResponse> {
    state.breaker.reset_service(&service);
    tracing::info!(target: AUDIT_TARGET, action = "breaker.reset", service = %service, "Circuit reset");
    Json(MessageResponse {
        message: format!("Circuit breaker for {service} reset"),
    })
}

/// Defaults and every limiter.
pub async fn rate_limiters(State(state): State<Arc<GatewayState>>) -> Json<RateLimitersResponse> {
    let (default_rate, default_burst) = state.rate_limits.defaults();
    Json(RateLimitersResponse {
        default_rate,
        default_burst,
        limiters: state.rate_limits.get_all_rate_limiters(),
    })
}

/// Set the rate and burst of one limiter, creating it if needed.
///
/// # Errors
///
/// Returns 400 for a negative or non-finite rate.
pub async fn update_rate_limiter(
    State(state): State<Arc<GatewayState>>,
    Path(key): Path<String>,
    payload: Result<Json<RateLimiterUpdate>, JsonRejection>,
) -> Result<Json<RateLimiterSnapshot>, ApiError> {
    let update = json_body(payload)?;
    if !(update.rate.is_finite() && update.rate >= 0.0) {
        return Err(ApiError::BadRequest("rate must be a non-negative number".into()));
    }

    let limiter = state
        .rate_limits
        .update_rate_limiter(&key, update.rate, update.burst);
    match update.enabled {
        Some(true) => limiter.enable(),
        Some(false) => limiter.disable(),
        None => {}
    }

    tracing::info!(
        target: AUDIT_TARGET,
        action = "limiter.update",
        key = %key,
        rate = update.rate,
        burst = update.burst,
        "Rate limiter updated"
    );
    Ok(Json(limiter.snapshot()))
}

fn parse_route_id(s: &str) -> Result<RouteId, ApiError> {
    RouteId::new(s).map_err(|err| ApiError::BadRequest(format!("invalid route ID {s:?}: {err}")))
}
