//! Agent endpoints of the application surface.
//!
//! Each call names its agent with `agent_id`; the configured default agent
//! is used when it is absent. Calls are rate limited and circuit broken
//! under the key `agent:<name>`.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use tollgate_services::{
    ChatRequest, ChatResponse, CompletionRequest, CompletionResponse, EmbeddingRequest,
    EmbeddingResponse,
};

use super::json_body;
use crate::error::ApiError;
use crate::state::GatewayState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Body of `POST /api/v1/ai-agent/chat`.
#[derive(Debug, Deserialize)]
pub struct ChatBody {
    /// Agent to use.
    #[serde(default)]
    pub agent_id: Option<String>,
    /// The chat request itself.
    #[serde(flatten)]
    pub request: ChatRequest,
}

/// Body of `POST /api/v1/ai-agent/completion`.
#[derive(Debug, Deserialize)]
pub struct CompletionBody {
    /// Agent to use.
    #[serde(default)]
    pub agent_id: Option<String>,
    /// The completion request itself.
    #[serde(flatten)]
    pub request: CompletionRequest,
}

/// Embedding input: one text or several.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingInput {
    /// A single text.
    One(String),
    /// Several texts.
    Many(Vec<String>),
}

/// Body of `POST /api/v1/ai-agent/embedding`.
#[derive(Debug, Deserialize)]
pub struct EmbeddingBody {
    /// Agent to use.
    #[serde(default)]
    pub agent_id: Option<String>,
    /// Model to use.
    #[serde(default)]
    pub model: String,
    /// Texts to embed.
    pub input: EmbeddingInput,
}

/// Query of `GET /api/v1/ai-agent/models`.
#[derive(Debug, Deserialize)]
pub struct ModelsQuery {
    /// Agent whose models to list.
    pub agent_id: Option<String>,
}

/// Response of `GET /api/v1/ai-agent/models`.
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    /// Every registered agent.
    pub agents: Vec<String>,
    /// Agent the models belong to.
    pub agent_id: String,
    /// Models offered by that agent.
    pub models: Vec<String>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Run a chat request.
///
/// # Errors
///
/// Returns 400 for a malformed body, 404 for an unknown agent, 429 or 503
/// when admission refuses the call, or the agent's error.
pub async fn chat(
    State(state): State<Arc<GatewayState>>,
    payload: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let body = json_body(payload)?;
    let response = state
        .hub
        .chat(body.agent_id.as_deref(), body.request)
        .await?;
    Ok(Json(response))
}

/// Run a text completion request.
///
/// # Errors
///
/// Same as [`chat`].
pub async fn completion(
    State(state): State<Arc<GatewayState>>,
    payload: Result<Json<CompletionBody>, JsonRejection>,
) -> Result<Json<CompletionResponse>, ApiError> {
    let body = json_body(payload)?;
    let response = state
        .hub
        .completion(body.agent_id.as_deref(), body.request)
        .await?;
    Ok(Json(response))
}

/// Run an embedding request.
///
/// # Errors
///
/// Same as [`chat`]; agents without embedding support answer 501.
pub async fn embedding(
    State(state): State<Arc<GatewayState>>,
    payload: Result<Json<EmbeddingBody>, JsonRejection>,
) -> Result<Json<EmbeddingResponse>, ApiError> {
    let body = json_body(payload)?;
    let input = match body.input {
        EmbeddingInput::One(text) => vec![text],
        EmbeddingInput::Many(texts) => texts,
    };
    let request = EmbeddingRequest {
        model: body.model,
        input,
    };
    let response = state
        .hub
        .embedding(body.agent_id.as_deref(), request)
        .await?;
    Ok(Json(response))
}

/// List registered agents and the models of one of them.
///
/// # Errors
///
/// Returns 404 for an unknown agent.
pub async fn models(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<ModelsQuery>,
) -> Result<Json<ModelsResponse>, ApiError> {
    let (agent_id, models) = state.hub.models(query.agent_id.as_deref()).await?;
    let agents = state.hub.agents().list_available().await;
    Ok(Json(ModelsResponse {
        agents,
        agent_id,
        models,
    }))
}
