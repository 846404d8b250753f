//! Default service implementations.
//!
//! [`BaseAgent`] and [`BaseToolService`] implement every trait method. The
//! lifecycle methods do real work (store configuration, log); the domain
//! operations return [`ServiceError::NotImplemented`]. A concrete service
//! embeds one and forwards whatever it does not implement itself.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::{Result, ServiceError};
use crate::service::{Agent, ManagedService, ToolService};
use crate::types::{
    ChatRequest, ChatResponse, CompletionRequest, CompletionResponse, EmbeddingRequest,
    EmbeddingResponse, ServiceConfig, ToolRequest, ToolResponse,
};

/// Name, version and configuration shared by both base services.
#[derive(Debug)]
struct ServiceInfo {
    name: String,
    version: String,
    config: RwLock<ServiceConfig>,
}

impl ServiceInfo {
    fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            config: RwLock::new(ServiceConfig::new()),
        }
    }

    fn initialize(&self, kind: &str, config: ServiceConfig) {
        *self.config.write() = config;
        tracing::info!(kind, name = %self.name, version = %self.version, "Service initialized");
    }

    fn shutdown(&self, kind: &str) {
        tracing::info!(kind, name = %self.name, "Service shut down");
    }
}

/// Default agent.
#[derive(Debug)]
pub struct BaseAgent {
    info: ServiceInfo,
}

impl BaseAgent {
    /// Create a base agent.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            info: ServiceInfo::new(name, version),
        }
    }

    /// Read a configuration value captured at initialization.
    #[must_use]
    pub fn config_value(&self, key: &str) -> Option<Value> {
        self.info.config.read().get(key).cloned()
    }
}

#[async_trait]
impl ManagedService for BaseAgent {
    async fn initialize(&self, config: ServiceConfig) -> Result<()> {
        self.info.initialize("agent", config);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.info.shutdown("agent");
        Ok(())
    }

    fn name(&self) -> &str {
        &self.info.name
    }

    fn version(&self) -> &str {
        &self.info.version
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl Agent for BaseAgent {
    async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse> {
        Err(ServiceError::NotImplemented("chat"))
    }

    async fn text_completion(&self, _request: CompletionRequest) -> Result<CompletionResponse> {
        Err(ServiceError::NotImplemented("text_completion"))
    }

    async fn embedding(&self, _request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        Err(ServiceError::NotImplemented("embedding"))
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Default tool service.
#[derive(Debug)]
pub struct BaseToolService {
    info: ServiceInfo,
}

impl BaseToolService {
    /// Create a base tool service.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            info: ServiceInfo::new(name, version),
        }
    }

    /// Read a configuration value captured at initialization.
    #[must_use]
    pub fn config_value(&self, key: &str) -> Option<Value> {
        self.info.config.read().get(key).cloned()
    }
}

#[async_trait]
impl ManagedService for BaseToolService {
    async fn initialize(&self, config: ServiceConfig) -> Result<()> {
        self.info.initialize("tool", config);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.info.shutdown("tool");
        Ok(())
    }

    fn name(&self) -> &str {
        &self.info.name
    }

    fn version(&self) -> &str {
        &self.info.version
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl ToolService for BaseToolService {
    async fn call(&self, _request: ToolRequest) -> Result<ToolResponse> {
        Err(ServiceError::NotImplemented("call"))
    }

    async fn batch_call(&self, _requests: Vec<ToolRequest>) -> Result<Vec<ToolResponse>> {
        Err(ServiceError::NotImplemented("batch_call"))
    }

    async fn list_tools(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn base_agent_defaults() {
        let agent = BaseAgent::new("plain", "0.0.1");
        assert_eq!(agent.name(), "plain");
        assert_eq!(agent.version(), "0.0.1");
        assert!(agent.health_check().await.is_ok());
        assert!(agent.list_models().await.unwrap().is_empty());
        assert_eq!(
            agent.chat(ChatRequest::default()).await.unwrap_err(),
            ServiceError::NotImplemented("chat")
        );
    }

    #[tokio::test]
    async fn initialize_captures_config() {
        let tools = BaseToolService::new("plain-tools", "0.0.1");
        let mut config = ServiceConfig::new();
        config.insert("region".into(), json!("eu"));

        tools.initialize(config).await.unwrap();

        assert_eq!(tools.config_value("region"), Some(json!("eu")));
        assert_eq!(
            tools.call(ToolRequest::default()).await.unwrap_err(),
            ServiceError::NotImplemented("call")
        );
    }
}
