//! WebSocket connection management.
//!
//! Every accepted socket becomes a [`Connection`] with a read pump, a write
//! pump and a dispatcher, all tracked by the [`ConnectionManager`]. Inbound
//! frames are JSON objects routed by their `type` field to a
//! [`MessageHandler`].

mod connection;
mod handlers;
mod manager;

pub use connection::{read_pump, write_pump, Binding, Connection, PumpTimings, SendOutcome};
pub use handlers::{
    register_default_handlers, ChatHandler, EchoHandler, PingHandler, ToolCallHandler,
};
pub use manager::{
    error_frame, ConnectionManager, Frame, HandlerError, MessageHandler, WsSettings,
    HEARTBEAT_FRAME,
};
