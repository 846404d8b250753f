//! Router configuration.
//!
//! This module builds the three Axum routers (application, WebSocket and
//! admin) with their middleware.

use std::any::Any;
use std::sync::Arc;

use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::handlers::{admin, agents, dispatch, health, tools, ws};
use crate::state::GatewayState;

/// Create the application router.
///
/// # Routes
///
/// - `GET /api/v1/health` - Health check
/// - `GET /api/v1/version` - Version
/// - `POST /api/v1/ai-agent/chat` - Chat with an agent
/// - `POST /api/v1/ai-agent/completion` - Text completion
/// - `POST /api/v1/ai-agent/embedding` - Embeddings
/// - `GET /api/v1/ai-agent/models` - Agents and models
/// - `POST /api/v1/mcp/command` - Invoke a tool
/// - `GET /api/v1/mcp/services` - Tool services
/// - anything else - proxy table, then route table, then 404
pub fn create_app_router(state: Arc<GatewayState>) -> Router {
    let server = state.config.current().server.clone();

    let router = Router::new()
        .route("/api/v1/health", get(health::health))
        .route("/api/v1/version", get(health::version))
        .route("/api/v1/ai-agent/chat", post(agents::chat))
        .route("/api/v1/ai-agent/completion", post(agents::completion))
        .route("/api/v1/ai-agent/embedding", post(agents::embedding))
        .route("/api/v1/ai-agent/models", get(agents::models))
        .route("/api/v1/mcp/command", post(tools::command))
        .route("/api/v1/mcp/services", get(tools::services))
        .fallback(dispatch::dispatch)
        .with_state(state);

    with_middleware(router, &server)
        .layer(TimeoutLayer::new(server.request_timeout()))
}

/// Create the WebSocket router.
///
/// # Routes
///
/// - `GET /ws/connect` - General connection
/// - `GET /ws/ai-agent` - Agent-bound connection
/// - `GET /ws/mcp` - Tool-service-bound connection
pub fn create_ws_router(state: Arc<GatewayState>) -> Router {
    let server = state.config.current().server.clone();

    let router = Router::new()
        .route("/ws/connect", get(ws::connect))
        .route("/ws/ai-agent", get(ws::agent))
        .route("/ws/mcp", get(ws::tool))
        .fallback(not_found)
        .with_state(state);

    with_middleware(router, &server)
}

/// Create the admin router.
///
/// # Routes
///
/// - `GET /health`, `GET /status`, `GET /config`
/// - `POST /reload-config`, `POST /reload-proxy-routes`
/// - `GET|POST /routes`, `PUT|DELETE /routes/:id`
/// - `GET /circuit-breakers`, `POST /circuit-breakers/reset`,
///   `POST /circuit-breakers/:service/reset`
/// - `GET /rate-limiters`, `PUT /rate-limiters/:key`
pub fn create_admin_router(state: Arc<GatewayState>) -> Router {
    let server = state.config.current().server.clone();

    let router = Router::new()
        .route("/health", get(admin::health))
        .route("/status", get(admin::status))
        .route("/config", get(admin::config))
        .route("/reload-config", post(admin::reload_config))
        .route("/reload-proxy-routes", post(admin::reload_proxy_routes))
        .route("/routes", get(admin::list_routes).post(admin::create_route))
        .route(
            "/routes/:id",
            put(admin::update_route).delete(admin::delete_route),
        )
        .route("/circuit-breakers", get(admin::circuit_breakers))
        .route("/circuit-breakers/reset", post(admin::reset_circuit_breakers))
        .route(
            "/circuit-breakers/:service/reset",
            post(admin::reset_circuit_breaker),
        )
        .route("/rate-limiters", get(admin::rate_limiters))
        .route("/rate-limiters/:key", put(admin::update_rate_limiter))
        .fallback(not_found)
        .with_state(state);

    with_middleware(router, &server)
}

/// Layers shared by every surface.
fn with_middleware(router: Router, server: &ServerConfig) -> Router {
    router
        .layer(RequestBodyLimitLayer::new(server.max_body_bytes))
        .layer(build_cors_layer(&server.cors_origins))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
}

async fn not_found() -> ApiError {
    ApiError::NotFound("no such endpoint".into())
}

/// Turn a handler panic into a 500 with the uniform error body.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = %detail, "Request handler panicked");
    ApiError::Internal("internal server error".into()).into_response()
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(AnyOrigin)
            .allow_methods(AnyOrigin)
            .allow_headers(AnyOrigin)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(AnyOrigin)
            .allow_headers(AnyOrigin)
    }
}
