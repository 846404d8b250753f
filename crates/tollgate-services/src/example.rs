//! Reference agent and tool service.
//!
//! These are registered by the gateway binary out of the box so the agent
//! and tool endpoints have something to talk to. They also show how a
//! concrete service embeds a base implementation and overrides only part of it.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};

use crate::base::{BaseAgent, BaseToolService};
use crate::error::{Result, ServiceError};
use crate::service::{Agent, ManagedService, ToolService};
use crate::types::{
    ChatChoice, ChatMessage, ChatRequest, ChatResponse, CompletionChoice, CompletionRequest,
    CompletionResponse, EmbeddingRequest, EmbeddingResponse, ServiceConfig, ToolRequest,
    ToolResponse, Usage,
};

const MODELS: [&str; 2] = ["example-model-1", "example-model-2"];
const TOOLS: [&str; 3] = ["echo", "get_time", "calculate"];

/// Config key: artificial delay applied to every request, in milliseconds.
pub const LATENCY_KEY: &str = "latency_ms";

/// Agent that answers by echoing the last user message.
#[derive(Debug)]
pub struct ExampleAgent {
    base: BaseAgent,
}

impl ExampleAgent {
    /// Registered name.
    pub const NAME: &'static str = "example-agent";

    /// Create the agent.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: BaseAgent::new(Self::NAME, "1.0.0"),
        }
    }

    async fn simulate_latency(&self) {
        if let Some(delay) = latency(self.base.config_value(LATENCY_KEY)) {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for ExampleAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ManagedService for ExampleAgent {
    async fn initialize(&self, config: ServiceConfig) -> Result<()> {
        if let Some(value) = config.get(LATENCY_KEY) {
            if !value.is_u64() {
                return Err(ServiceError::Initialization {
                    name: Self::NAME.to_string(),
                    reason: format!("{LATENCY_KEY} must be a non-negative integer"),
                });
            }
        }
        self.base.initialize(config).await
    }

    async fn shutdown(&self) -> Result<()> {
        self.base.shutdown().await
    }

    fn name(&self) -> &str {
        self.base.name()
    }

    fn version(&self) -> &str {
        self.base.version()
    }

    async fn health_check(&self) -> Result<()> {
        self.base.health_check().await
    }
}

#[async_trait]
impl Agent for ExampleAgent {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .ok_or_else(|| ServiceError::InvalidRequest("no user message".into()))?;

        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Processing chat request"
        );
        self.simulate_latency().await;

        let content = format!("{} received: {}", Self::NAME, last_user.content);
        let usage = usage_for(
            request.messages.iter().map(|m| m.content.as_str()),
            &content,
        );

        Ok(ChatResponse {
            id: response_id("chat"),
            object: "chat.completion".into(),
            created: Utc::now().timestamp(),
            model: model_or_default(&request.model),
            choices: vec![ChatChoice {
                index: 0,
                message: ChatMessage::new("assistant", content),
            }],
            usage,
        })
    }

    async fn text_completion(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        if request.prompt.is_empty() {
            return Err(ServiceError::InvalidRequest("prompt is required".into()));
        }
        self.simulate_latency().await;

        let text = format!("{} continues: {}", Self::NAME, request.prompt);
        let usage = usage_for(std::iter::once(request.prompt.as_str()), &text);

        Ok(CompletionResponse {
            id: response_id("completion"),
            object: "text.completion".into(),
            created: Utc::now().timestamp(),
            model: model_or_default(&request.model),
            choices: vec![CompletionChoice { index: 0, text }],
            usage,
        })
    }

    async fn embedding(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        self.base.embedding(request).await
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        Ok(MODELS.iter().map(ToString::to_string).collect())
    }
}

/// Tool service with `echo`, `get_time` and `calculate`.
#[derive(Debug)]
pub struct ExampleToolService {
    base: BaseToolService,
}

impl ExampleToolService {
    /// Registered name.
    pub const NAME: &'static str = "example-tools";

    /// Create the service.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: BaseToolService::new(Self::NAME, "1.0.0"),
        }
    }

    fn calculate(params: &Map<String, Value>) -> ToolResponse {
        let a = params.get("a").and_then(Value::as_f64);
        let b = params.get("b").and_then(Value::as_f64);
        let op = params.get("operation").and_then(Value::as_str);

        let (Some(a), Some(b), Some(op)) = (a, b, op) else {
            return ToolResponse::failure("INVALID_PARAMS", "Missing or invalid parameters");
        };

        let result = match op {
            "add" => a + b,
            "subtract" => a - b,
            "multiply" => a * b,
            "divide" => {
                if b == 0.0 {
                    return ToolResponse::failure("DIVISION_BY_ZERO", "Cannot divide by zero");
                }
                a / b
            }
            other => {
                return ToolResponse::failure(
                    "INVALID_OPERATION",
                    format!("Unknown operation: {other}"),
                )
            }
        };

        ToolResponse::success(json!({
            "result": result,
            "operation": op,
            "a": a,
            "b": b,
        }))
    }
}

impl Default for ExampleToolService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ManagedService for ExampleToolService {
    async fn initialize(&self, config: ServiceConfig) -> Result<()> {
        self.base.initialize(config).await
    }

    async fn shutdown(&self) -> Result<()> {
        self.base.shutdown().await
    }

    fn name(&self) -> &str {
        self.base.name()
    }

    fn version(&self) -> &str {
        self.base.version()
    }

    async fn health_check(&self) -> Result<()> {
        self.base.health_check().await
    }
}

#[async_trait]
impl ToolService for ExampleToolService {
    async fn call(&self, request: ToolRequest) -> Result<ToolResponse> {
        tracing::debug!(tool = %request.tool_name, "Processing tool request");
        if let Some(delay) = latency(self.base.config_value(LATENCY_KEY)) {
            tokio::time::sleep(delay).await;
        }

        let response = match request.tool_name.as_str() {
            "echo" => ToolResponse::success(json!({ "echo": request.params })),
            "get_time" => ToolResponse::success(json!({ "current_time": Utc::now().to_rfc3339() })),
            "calculate" => Self::calculate(&request.params),
            other => ToolResponse::failure("UNKNOWN_TOOL", format!("Unknown tool: {other}")),
        };
        Ok(response)
    }

    async fn batch_call(&self, requests: Vec<ToolRequest>) -> Result<Vec<ToolResponse>> {
        let mut responses = Vec::with_capacity(requests.len());
        for request in requests {
            responses.push(self.call(request).await?);
        }
        Ok(responses)
    }

    async fn list_tools(&self) -> Result<Vec<String>> {
        Ok(TOOLS.iter().map(ToString::to_string).collect())
    }
}

fn latency(value: Option<Value>) -> Option<Duration> {
    value
        .and_then(|v| v.as_u64())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

fn response_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4().simple())
}

fn model_or_default(model: &str) -> String {
    if model.is_empty() {
        MODELS[0].to_string()
    } else {
        model.to_string()
    }
}

/// Rough whitespace token count, good enough for the usage block.
fn usage_for<'a>(prompt: impl Iterator<Item = &'a str>, completion: &str) -> Usage {
    let count = |s: &str| u32::try_from(s.split_whitespace().count()).unwrap_or(u32::MAX);
    let prompt_tokens = prompt.map(count).fold(0u32, u32::saturating_add);
    let completion_tokens = count(completion);
    Usage {
        prompt_tokens,
        completion_tokens,
        total_tokens: prompt_tokens.saturating_add(completion_tokens),
    }
}
