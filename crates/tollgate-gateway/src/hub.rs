//! Gated access to agents and tool services.
//!
//! HTTP handlers and WebSocket handlers both reach services through the
//! [`ServiceHub`]: it resolves the service name (falling back to the
//! configured default), creates the instance on first use with its
//! configured settings, and runs each call through [`Admission`].

use std::future::Future;
use std::sync::Arc;

use tollgate_services::{
    Agent, AgentManager, ChatRequest, ChatResponse, CompletionRequest, CompletionResponse,
    EmbeddingRequest, EmbeddingResponse, ExampleAgent, ExampleToolService, ServiceError,
    ToolManager, ToolRequest, ToolResponse, ToolService,
};

use crate::admission::{agent_key, tool_key, Admission};
use crate::config::ConfigStore;
use crate::error::ApiError;

/// Agents, tool services and the admission gate in front of them.
#[derive(Debug, Clone)]
pub struct ServiceHub {
    config: Arc<ConfigStore>,
    agents: Arc<AgentManager>,
    tools: Arc<ToolManager>,
    admission: Admission,
}

impl ServiceHub {
    /// Create a hub.
    #[must_use]
    pub fn new(
        config: Arc<ConfigStore>,
        agents: Arc<AgentManager>,
        tools: Arc<ToolManager>,
        admission: Admission,
    ) -> Self {
        Self {
            config,
            agents,
            tools,
            admission,
        }
    }

    /// Agent registry.
    #[must_use]
    pub fn agents(&self) -> &Arc<AgentManager> {
        &self.agents
    }

    /// Tool service registry.
    #[must_use]
    pub fn tools(&self) -> &Arc<ToolManager> {
        &self.tools
    }

    /// Register the bundled example agent and tool service.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::FactoryExists` if either name is taken.
    pub async fn register_examples(&self) -> tollgate_services::Result<()> {
        self.agents
            .register_factory(ExampleAgent::NAME, || {
                Ok(Arc::new(ExampleAgent::new()) as Arc<dyn Agent>)
            })
            .await?;
        self.tools
            .register_factory(ExampleToolService::NAME, || {
                Ok(Arc::new(ExampleToolService::new()) as Arc<dyn ToolService>)
            })
            .await
    }

    /// Resolve an agent by name, or the default agent when `requested` is
    /// empty or absent.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` for an unknown agent, or the agent's
    /// initialization error.
    pub async fn agent(&self, requested: Option<&str>) -> Result<(String, Arc<dyn Agent>), ApiError> {
        let config = self.config.current();
        let name = pick(requested, &config.services.default_agent);
        let agent = self
            .agents
            .get_or_create_instance(&name, config.services.config_for(&name))
            .await?;
        Ok((name, agent))
    }

    /// Resolve a tool service by name, or the default tool service.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` for an unknown service, or the service's
    /// initialization error.
    pub async fn tool_service(
        &self,
        requested: Option<&str>,
    ) -> Result<(String, Arc<dyn ToolService>), ApiError> {
        let config = self.config.current();
        let name = pick(requested, &config.services.default_tool_service);
        let service = self
            .tools
            .get_or_create_instance(&name, config.services.config_for(&name))
            .await?;
        Ok((name, service))
    }

    /// Run `call` against an agent under its admission key.
    ///
    /// Unknown names are refused before admission. Instance creation runs
    /// inside the guarded call, so an agent that fails to initialize counts
    /// against its circuit and its rate limit.
    async fn with_agent<T, F, Fut>(&self, requested: Option<&str>, call: F) -> Result<T, ApiError>
    where
        F: FnOnce(Arc<dyn Agent>) -> Fut,
        Fut: Future<Output = tollgate_services::Result<T>>,
    {
        let config = self.config.current();
        let name = pick(requested, &config.services.default_agent);
        if !self.agents.has_factory(&name).await {
            return Err(ServiceError::FactoryNotFound(name).into());
        }
        let settings = config.services.config_for(&name);
        self.admission
            .guard(&agent_key(&name), async {
                let agent = self.agents.get_or_create_instance(&name, settings).await?;
                call(agent).await
            })
            .await
    }

    /// Run a chat request.
    ///
    /// # Errors
    ///
    /// Returns a lookup, admission or agent error.
    pub async fn chat(&self, agent: Option<&str>, request: ChatRequest) -> Result<ChatResponse, ApiError> {
        self.with_agent(agent, |agent| async move { agent.chat(request).await })
            .await
    }

    /// Run a text completion request.
    ///
    /// # Errors
    ///
    /// Returns a lookup, admission or agent error.
    pub async fn completion(
        &self,
        agent: Option<&str>,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ApiError> {
        self.with_agent(agent, |agent| async move { agent.text_completion(request).await })
            .await
    }

    /// Run an embedding request.
    ///
    /// # Errors
    ///
    /// Returns a lookup, admission or agent error.
    pub async fn embedding(
        &self,
        agent: Option<&str>,
        request: EmbeddingRequest,
    ) -> Result<EmbeddingResponse, ApiError> {
        self.with_agent(agent, |agent| async move { agent.embedding(request).await })
            .await
    }

    /// Models offered by an agent. Not rate limited.
    ///
    /// # Errors
    ///
    /// Returns a lookup or agent error.
    pub async fn models(&self, agent: Option<&str>) -> Result<(String, Vec<String>), ApiError> {
        let (name, agent) = self.agent(agent).await?;
        let models = agent.list_models().await?;
        Ok((name, models))
    }

    /// Invoke a tool.
    ///
    /// A tool that reports `success: false` still counts as a successful call
    /// for the circuit breaker; only service failures count against it.
    ///
    /// # Errors
    ///
    /// Returns a lookup, admission or service error.
    pub async fn call_tool(
        &self,
        service: Option<&str>,
        tool: &str,
        params: serde_json::Map<String, serde_json::Value>,
    ) -> Result<ToolResponse, ApiError> {
        if tool.trim().is_empty() {
            return Err(ApiError::BadRequest("command is required".into()));
        }
        let config = self.config.current();
        let name = pick(service, &config.services.default_tool_service);
        if !self.tools.has_factory(&name).await {
            return Err(ServiceError::FactoryNotFound(name).into());
        }
        let settings = config.services.config_for(&name);
        let request = ToolRequest {
            service_name: name.clone(),
            tool_name: tool.to_string(),
            params,
        };
        self.admission
            .guard(&tool_key(&name), async {
                let service = self.tools.get_or_create_instance(&name, settings).await?;
                service.call(request).await
            })
            .await
    }
}

fn pick(requested: Option<&str>, default: &str) -> String {
    requested
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(default)
        .to_string()
}
