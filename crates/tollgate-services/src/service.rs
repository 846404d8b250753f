//! Service traits.
//!
//! Every pluggable service shares the [`ManagedService`] lifecycle. The
//! domain traits add the operations the gateway exposes over HTTP and
//! WebSocket.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    ChatRequest, ChatResponse, CompletionRequest, CompletionResponse, EmbeddingRequest,
    EmbeddingResponse, ServiceConfig, ToolRequest, ToolResponse,
};

/// Lifecycle shared by agents and tool services.
#[async_trait]
pub trait ManagedService: Send + Sync {
    /// Prepare the service with its configuration.
    ///
    /// Called once by the manager before the instance is handed out.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is unusable.
    async fn initialize(&self, config: ServiceConfig) -> Result<()>;

    /// Release resources held by the service.
    async fn shutdown(&self) -> Result<()>;

    /// Service name.
    fn name(&self) -> &str;

    /// Service version.
    fn version(&self) -> &str;

    /// Report whether the service is able to take requests.
    async fn health_check(&self) -> Result<()>;
}

/// A conversational model service.
#[async_trait]
pub trait Agent: ManagedService {
    /// Produce the next assistant message for a conversation.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;

    /// Continue a text prompt.
    async fn text_completion(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Embed a batch of texts.
    async fn embedding(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse>;

    /// Names of the models this agent serves.
    async fn list_models(&self) -> Result<Vec<String>>;
}

/// A service exposing named tools.
#[async_trait]
pub trait ToolService: ManagedService {
    /// Run one tool.
    ///
    /// Tool-level failures (unknown tool, bad arguments) are reported in the
    /// returned [`ToolResponse`]; `Err` means the service itself failed.
    async fn call(&self, request: ToolRequest) -> Result<ToolResponse>;

    /// Run several tools, returning one response per request in order.
    async fn batch_call(&self, requests: Vec<ToolRequest>) -> Result<Vec<ToolResponse>>;

    /// Names of the available tools.
    async fn list_tools(&self) -> Result<Vec<String>>;
}
