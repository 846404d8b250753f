//! Built-in frame handlers.
//!
//! | `type`      | reply                                             |
//! |-------------|---------------------------------------------------|
//! | `ping`      | `{"type":"pong"}`                                 |
//! | `echo`      | `{"type":"echo","data":...}`                      |
//! | `chat`      | `{"type":"chat_response","data":ChatResponse}`    |
//! | `tool_call` | `{"type":"tool_result","data":ToolResponse}`      |
//!
//! Replies carry the inbound `request_id` when one was given.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use tollgate_services::{ChatMessage, ChatRequest};

use super::connection::{Binding, Connection};
use super::manager::{ConnectionManager, Frame, HandlerError, MessageHandler};
use crate::hub::ServiceHub;

/// Register the built-in handlers on `manager`.
pub fn register_default_handlers(manager: &ConnectionManager, hub: &ServiceHub) {
    manager.register_handler("ping", Arc::new(PingHandler));
    manager.register_handler("echo", Arc::new(EchoHandler));
    manager.register_handler("chat", Arc::new(ChatHandler { hub: hub.clone() }));
    manager.register_handler("tool_call", Arc::new(ToolCallHandler { hub: hub.clone() }));
}

fn reply(kind: &str, frame: &Frame, data: Option<Value>) -> Value {
    let mut out = json!({ "type": kind });
    if let Some(data) = data {
        out["data"] = data;
    }
    if let Some(id) = frame.request_id() {
        out["request_id"] = id.clone();
    }
    out
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, HandlerError> {
    serde_json::to_value(value)
        .map_err(|err| HandlerError::Api(crate::error::ApiError::Internal(err.to_string())))
}

/// Answers `ping` with `pong`.
#[derive(Debug)]
pub struct PingHandler;

#[async_trait]
impl MessageHandler for PingHandler {
    async fn handle(&self, conn: &Arc<Connection>, frame: &Frame) -> Result<(), HandlerError> {
        conn.send_json(&reply("pong", frame, None));
        Ok(())
    }
}

/// Sends `data` back. Frames without `data` get no reply.
#[derive(Debug)]
pub struct EchoHandler;

#[async_trait]
impl MessageHandler for EchoHandler {
    async fn handle(&self, conn: &Arc<Connection>, frame: &Frame) -> Result<(), HandlerError> {
        if let Some(data) = frame.get("data") {
            conn.send_json(&reply("echo", frame, Some(data.clone())));
        }
        Ok(())
    }
}

/// Runs a chat request against an agent.
///
/// The agent is the frame's `agent_id`, else the one the connection is bound
/// to, else the configured default. The frame carries either `messages` or a
/// single `content` string.
#[derive(Debug)]
pub struct ChatHandler {
    hub: ServiceHub,
}

#[async_trait]
impl MessageHandler for ChatHandler {
    async fn handle(&self, conn: &Arc<Connection>, frame: &Frame) -> Result<(), HandlerError> {
        let agent = frame.get_str("agent_id").or(match conn.binding() {
            Binding::Agent(name) => Some(name.as_str()),
            _ => None,
        });

        let request = chat_request(frame)?;
        let response = self.hub.chat(agent, request).await?;
        conn.send_json(&reply("chat_response", frame, Some(to_value(&response)?)));
        Ok(())
    }
}

fn chat_request(frame: &Frame) -> Result<ChatRequest, HandlerError> {
    let messages = match (frame.get("messages"), frame.get_str("content")) {
        (Some(messages), _) => serde_json::from_value::<Vec<ChatMessage>>(messages.clone())
            .map_err(|err| HandlerError::InvalidFrame(format!("messages: {err}")))?,
        (None, Some(content)) => vec![ChatMessage::new("user", content)],
        (None, None) => {
            return Err(HandlerError::InvalidFrame(
                "chat requires messages or content".into(),
            ))
        }
    };

    Ok(ChatRequest {
        model: frame.get_str("model").unwrap_or_default().to_string(),
        messages,
        temperature: frame.get("temperature").and_then(Value::as_f64),
        max_tokens: frame
            .get("max_tokens")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok()),
        parameters: Map::new(),
    })
}

/// Invokes a tool.
///
/// The service is the frame's `service_id`, else the one the connection is
/// bound to, else the configured default. The tool name is `tool` (or
/// `command`) and its arguments are `parameters`.
#[derive(Debug)]
pub struct ToolCallHandler {
    hub: ServiceHub,
}

#[async_trait]
impl MessageHandler for ToolCallHandler {
    async fn handle(&self, conn: &Arc<Connection>, frame: &Frame) -> Result<(), HandlerError> {
        let service = frame.get_str("service_id").or(match conn.binding() {
            Binding::Tool(name) => Some(name.as_str()),
            _ => None,
        });
        let tool = frame
            .get_str("tool")
            .or_else(|| frame.get_str("command"))
            .ok_or_else(|| HandlerError::InvalidFrame("tool_call requires tool".into()))?;
        let params = match frame.get("parameters") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(params)) => params.clone(),
            Some(_) => {
                return Err(HandlerError::InvalidFrame(
                    "parameters must be an object".into(),
                ))
            }
        };

        let response = self.hub.call_tool(service, tool, params).await?;
        conn.send_json(&reply("tool_result", frame, Some(to_value(&response)?)));
        Ok(())
    }
}
