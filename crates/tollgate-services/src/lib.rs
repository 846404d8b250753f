//! Pluggable agent and tool services for tollgate.
//!
//! The gateway forwards some requests to in-process services rather than to a
//! network backend. Two capability sets exist:
//!
//! - [`Agent`]: chat, text completion, embeddings and model listing
//! - [`ToolService`]: named tool invocation returning `{success, data | error}`
//!
//! Both extend [`ManagedService`], the lifecycle shared by every service.
//! [`BaseAgent`] and [`BaseToolService`] implement the full capability set
//! with `NotImplemented` defaults; concrete services hold one and delegate the
//! operations they do not provide.
//!
//! Instances are created lazily by a [`ServiceManager`] from registered
//! factories and cached by name.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tollgate_services::{Agent, AgentManager, ExampleAgent, ServiceConfig};
//!
//! # async fn example() -> tollgate_services::Result<()> {
//! let agents = AgentManager::new("agent");
//! agents
//!     .register_factory(ExampleAgent::NAME, || {
//!         Ok(Arc::new(ExampleAgent::new()) as Arc<dyn Agent>)
//!     })
//!     .await?;
//!
//! let agent = agents
//!     .get_or_create_instance(ExampleAgent::NAME, ServiceConfig::new())
//!     .await?;
//! assert_eq!(agent.list_models().await?.len(), 2);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod base;
pub mod error;
pub mod example;
pub mod manager;
pub mod service;
pub mod types;

pub use base::{BaseAgent, BaseToolService};
pub use error::{Result, ServiceError};
pub use example::{ExampleAgent, ExampleToolService};
pub use manager::{AgentManager, ServiceFactory, ServiceManager, ToolManager};
pub use service::{Agent, ManagedService, ToolService};
pub use types::{
    ChatChoice, ChatMessage, ChatRequest, ChatResponse, CompletionChoice, CompletionRequest,
    CompletionResponse, Embedding, EmbeddingRequest, EmbeddingResponse, ServiceConfig,
    ToolError, ToolRequest, ToolResponse, Usage,
};
