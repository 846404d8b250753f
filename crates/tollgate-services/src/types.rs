//! Request and response types for agent and tool services.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form configuration handed to a service on initialization.
pub type ServiceConfig = Map<String, Value>;

// =============================================================================
// Agent Types
// =============================================================================

/// One message in a chat conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Speaker role ("system", "user", "assistant").
    pub role: String,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Create a message.
    #[must_use]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Chat request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model to use; services pick a default when empty.
    #[serde(default)]
    pub model: String,
    /// Conversation so far.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Upper bound on generated tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Service-specific parameters.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,
}

/// Token accounting for a response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt.
    pub prompt_tokens: u32,
    /// Tokens generated.
    pub completion_tokens: u32,
    /// Sum of both.
    pub total_tokens: u32,
}

/// One chat completion choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatChoice {
    /// Choice index.
    pub index: u32,
    /// Generated message.
    pub message: ChatMessage,
}

/// Chat response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Response identifier.
    pub id: String,
    /// Object kind, e.g. "chat.completion".
    pub object: String,
    /// Unix timestamp of creation.
    pub created: i64,
    /// Model that produced the response.
    pub model: String,
    /// Generated choices.
    pub choices: Vec<ChatChoice>,
    /// Token accounting.
    #[serde(default)]
    pub usage: Usage,
}

/// Text completion request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model to use.
    #[serde(default)]
    pub model: String,
    /// Prompt text.
    pub prompt: String,
    /// Upper bound on generated tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// One text completion choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionChoice {
    /// Choice index.
    pub index: u32,
    /// Generated text.
    pub text: String,
}

/// Text completion response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Response identifier.
    pub id: String,
    /// Object kind, e.g. "text.completion".
    pub object: String,
    /// Unix timestamp of creation.
    pub created: i64,
    /// Model that produced the response.
    pub model: String,
    /// Generated choices.
    pub choices: Vec<CompletionChoice>,
    /// Token accounting.
    #[serde(default)]
    pub usage: Usage,
}

/// Embedding request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// Model to use.
    #[serde(default)]
    pub model: String,
    /// Texts to embed.
    pub input: Vec<String>,
}

/// One embedding vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    /// Position of the input this vector belongs to.
    pub index: u32,
    /// The vector.
    pub embedding: Vec<f32>,
}

/// Embedding response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    /// Model that produced the vectors.
    pub model: String,
    /// One vector per input.
    pub data: Vec<Embedding>,
    /// Token accounting.
    #[serde(default)]
    pub usage: Usage,
}

// =============================================================================
// Tool Types
// =============================================================================

/// A tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Service that owns the tool.
    pub service_name: String,
    /// Tool to run.
    pub tool_name: String,
    /// Tool arguments.
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// Structured failure reported by a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolError {
    /// Machine-readable code, e.g. `DIVISION_BY_ZERO`.
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

/// Result of a tool invocation: either `data` or `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    /// Whether the tool succeeded.
    pub success: bool,
    /// Payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Failure details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
}

impl ToolResponse {
    /// A successful response carrying `data`.
    #[must_use]
    pub fn success(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// A failed response.
    #[must_use]
    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ToolError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_response_omits_empty_side() {
        let ok = serde_json::to_value(ToolResponse::success(json!({"x": 1}))).unwrap();
        assert_eq!(ok, json!({"success": true, "data": {"x": 1}}));

        let err = serde_json::to_value(ToolResponse::failure("BAD", "nope")).unwrap();
        assert_eq!(
            err,
            json!({"success": false, "error": {"code": "BAD", "message": "nope"}})
        );
    }

    #[test]
    fn chat_request_defaults() {
        let req: ChatRequest =
            serde_json::from_value(json!({"messages": [{"role": "user", "content": "hi"}]}))
                .unwrap();
        assert!(req.model.is_empty());
        assert_eq!(req.messages[0], ChatMessage::new("user", "hi"));
        assert!(req.parameters.is_empty());
    }
}
