//! Tool service endpoints of the application surface.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use tollgate_services::ToolResponse;

use super::json_body;
use crate::error::ApiError;
use crate::state::GatewayState;

/// Body of `POST /api/v1/mcp/command`.
#[derive(Debug, Deserialize)]
pub struct CommandBody {
    /// Tool service to call; the configured default when absent.
    #[serde(default)]
    pub service_id: Option<String>,
    /// Tool to run.
    pub command: String,
    /// Tool arguments.
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

/// Query of `GET /api/v1/mcp/services`.
#[derive(Debug, Deserialize)]
pub struct ServicesQuery {
    /// Also list the tools of this service.
    pub service_id: Option<String>,
}

/// Response of `GET /api/v1/mcp/services`.
#[derive(Debug, Serialize)]
pub struct ServicesResponse {
    /// Every registered tool service.
    pub services: Vec<String>,
    /// Tools of the requested service, when one was named.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
}

/// Invoke a tool.
///
/// A tool that fails on its own terms still answers 200 with
/// `{"success": false, "error": {...}}`.
///
/// # Errors
///
/// Returns 400 for a malformed body, 404 for an unknown service, 429 or 503
/// when admission refuses the call, or the service's error.
pub async fn command(
    State(state): State<Arc<GatewayState>>,
    payload: Result<Json<CommandBody>, JsonRejection>,
) -> Result<Json<ToolResponse>, ApiError> {
    let body = json_body(payload)?;
    let response = state
        .hub
        .call_tool(body.service_id.as_deref(), &body.command, body.parameters)
        .await?;
    Ok(Json(response))
}

/// List registered tool services.
///
/// # Errors
///
/// Returns 404 if `service_id` names an unknown service.
pub async fn services(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<ServicesQuery>,
) -> Result<Json<ServicesResponse>, ApiError> {
    let services = state.hub.tools().list_available().await;
    let tools = match query.service_id.as_deref() {
        Some(name) => {
            let (_, service) = state.hub.tool_service(Some(name)).await?;
            Some(service.list_tools().await?)
        }
        None => None,
    };
    Ok(Json(ServicesResponse { services, tools }))
}
