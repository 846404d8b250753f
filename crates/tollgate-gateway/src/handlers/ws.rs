//! WebSocket upgrade endpoints.
//!
//! - `GET /ws/connect`: general connection
//! - `GET /ws/ai-agent?agent_id=`: bound to an agent (default agent if absent)
//! - `GET /ws/mcp?service_id=`: bound to a tool service (default if absent)
//!
//! Upgrades are refused with 503 once `websocket.max_connections` clients
//! are connected. The limit is enforced again when the socket is attached,
//! where a late arrival is closed with code 1013.

use std::sync::Arc;

use axum::extract::ws::WebSocket;
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use futures::StreamExt;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::GatewayState;
use crate::ws::Binding;

/// Query of `/ws/ai-agent`.
#[derive(Debug, Deserialize)]
pub struct AgentQuery {
    /// Agent to bind to.
    pub agent_id: Option<String>,
}

/// Query of `/ws/mcp`.
#[derive(Debug, Deserialize)]
pub struct ToolQuery {
    /// Tool service to bind to.
    pub service_id: Option<String>,
}

/// Upgrade to a general connection.
///
/// # Errors
///
/// Returns 503 when the connection limit is reached.
pub async fn connect(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
) -> Result<Response, ApiError> {
    upgrade(ws, state, Binding::General)
}

/// Upgrade to a connection bound to an agent.
///
/// The agent is created (if needed) before the upgrade, so an unknown agent
/// fails the handshake with 404.
///
/// # Errors
///
/// Returns 503 when the connection limit is reached or 404 for an unknown
/// agent.
pub async fn agent(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<AgentQuery>,
) -> Result<Response, ApiError> {
    ensure_capacity(&state)?;
    let (name, _) = state.hub.agent(query.agent_id.as_deref()).await?;
    upgrade(ws, state, Binding::Agent(name))
}

/// Upgrade to a connection bound to a tool service.
///
/// # Errors
///
/// Returns 503 when the connection limit is reached or 404 for an unknown
/// service.
pub async fn tool(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<ToolQuery>,
) -> Result<Response, ApiError> {
    ensure_capacity(&state)?;
    let (name, _) = state.hub.tool_service(query.service_id.as_deref()).await?;
    upgrade(ws, state, Binding::Tool(name))
}

fn ensure_capacity(state: &GatewayState) -> Result<(), ApiError> {
    if state.connections.has_capacity() {
        Ok(())
    } else {
        tracing::warn!(live = state.connections.len(), "WebSocket connection limit reached");
        Err(ApiError::Unavailable("connection limit reached".into()))
    }
}

fn upgrade(ws: WebSocketUpgrade, state: Arc<GatewayState>, binding: Binding) -> Result<Response, ApiError> {
    ensure_capacity(&state)?;
    tracing::debug!(binding = %binding, "WebSocket upgrade accepted");
    Ok(ws.on_upgrade(move |socket: WebSocket| async move {
        let (sink, stream) = socket.split();
        state.connections.attach(stream, sink, binding);
    }))
}
