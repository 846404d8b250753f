//! Registry of live WebSocket connections.
//!
//! The [`ConnectionManager`] owns every connection, routes inbound frames to
//! the [`MessageHandler`] registered for their `type`, and runs the heartbeat
//! sweep that evicts clients whose outbound queue has filled up.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{close_code, CloseFrame, Message};
use futures::{Sink, SinkExt, Stream};
use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use tollgate_core::ConnectionId;

use super::connection::{read_pump, write_pump, Binding, Connection, PumpTimings, SendOutcome};
use crate::config::WebSocketConfig;
use crate::error::ApiError;

/// Frame queued to every connection by the heartbeat sweep.
pub const HEARTBEAT_FRAME: &str = r#"{"type":"heartbeat"}"#;

/// Connection timing and capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WsSettings {
    /// Interval of the liveness sweep.
    pub heartbeat_interval: Duration,
    /// Interval of per-connection protocol pings.
    pub ping_interval: Duration,
    /// Rolling read deadline.
    pub read_timeout: Duration,
    /// Per-frame write deadline.
    pub write_timeout: Duration,
    /// Outbound queue capacity.
    pub send_buffer: usize,
    /// Inbound queue capacity.
    pub recv_buffer: usize,
    /// Maximum live connections.
    pub max_connections: usize,
}

impl WsSettings {
    fn timings(&self) -> PumpTimings {
        PumpTimings {
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
            ping_interval: self.ping_interval,
        }
    }
}

impl Default for WsSettings {
    fn default() -> Self {
        Self::from(&WebSocketConfig::default())
    }
}

// =============================================================================
// Frames and handlers
// =============================================================================

/// A decoded inbound JSON frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    kind: String,
    body: Map<String, Value>,
}

impl Frame {
    /// Decode a text frame. It must be a JSON object with a string `type`.
    ///
    /// # Errors
    ///
    /// Returns a description of what is wrong with the frame.
    pub fn parse(text: &str) -> Result<Self, String> {
        let value: Value = serde_json::from_str(text).map_err(|err| format!("invalid JSON: {err}"))?;
        let Value::Object(body) = value else {
            return Err("frame is not a JSON object".into());
        };
        let kind = match body.get("type") {
            Some(Value::String(kind)) if !kind.is_empty() => kind.clone(),
            _ => return Err("frame has no type".into()),
        };
        Ok(Self { kind, body })
    }

    /// The frame's `type`.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// A field of the frame.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    /// A string field of the frame, if present and a string.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.body.get(key).and_then(Value::as_str)
    }

    /// Caller-chosen correlation ID echoed on replies.
    #[must_use]
    pub fn request_id(&self) -> Option<&Value> {
        self.body.get("request_id")
    }

    /// The whole frame as a JSON object.
    #[must_use]
    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }
}

/// Failure while handling a frame. Reported to the client as an error frame.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The frame is missing fields or has the wrong shape.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// The underlying operation failed.
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl HandlerError {
    /// Error code sent to the client.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidFrame(_) => "invalid_frame",
            Self::Api(err) => err.code(),
        }
    }
}

/// Handles one `type` of inbound frame.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle `frame` received on `conn`. Replies go through `conn.send`.
    ///
    /// # Errors
    ///
    /// An error is reported to the client as an error frame.
    async fn handle(&self, conn: &Arc<Connection>, frame: &Frame) -> Result<(), HandlerError>;
}

/// Build an error frame.
#[must_use]
pub fn error_frame(code: &str, message: &str, request_id: Option<&Value>) -> Value {
    let mut frame = json!({
        "type": "error",
        "code": code,
        "message": message,
    });
    if let Some(id) = request_id {
        frame["request_id"] = id.clone();
    }
    frame
}

// =============================================================================
// Manager
// =============================================================================

/// Registry of live connections and frame handlers.
pub struct ConnectionManager {
    settings: RwLock<WsSettings>,
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
    handlers: RwLock<HashMap<String, Arc<dyn MessageHandler>>>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("settings", &*self.settings.read())
            .field("connections", &self.len())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Create a manager. Connection tasks are spawned on `tracker` and end
    /// when `shutdown` is cancelled.
    #[must_use]
    pub fn new(settings: WsSettings, shutdown: CancellationToken, tracker: TaskTracker) -> Self {
        Self {
            settings: RwLock::new(settings),
            connections: RwLock::new(HashMap::new()),
            handlers: RwLock::new(HashMap::new()),
            shutdown,
            tracker,
        }
    }

    /// Current settings.
    #[must_use]
    pub fn settings(&self) -> WsSettings {
        *self.settings.read()
    }

    /// Replace the settings. Connections opened later use the new values.
    pub fn apply_settings(&self, settings: WsSettings) {
        *self.settings.write() = settings;
    }

    /// Register the handler for frames of type `kind`, replacing any other.
    pub fn register_handler(&self, kind: &str, handler: Arc<dyn MessageHandler>) {
        self.handlers.write().insert(kind.to_string(), handler);
    }

    /// Whether another connection may be accepted.
    #[must_use]
    pub fn has_capacity(&self) -> bool {
        self.len() < self.settings.read().max_connections
    }

    /// Register a connection and start its pumps.
    ///
    /// Three tasks are spawned: the read pump, the write pump, and a
    /// dispatcher that hands inbound frames to [`ConnectionManager::dispatch`].
    /// The connection is removed from the registry when its read pump ends.
    ///
    /// The slot is reserved under the registry lock, so concurrent upgrades
    /// never exceed `max_connections`. When the registry is full the client
    /// gets a close frame with code 1013 and `None` is returned.
    pub fn attach<S, E, K>(
        self: &Arc<Self>,
        stream: S,
        mut sink: K,
        binding: Binding,
    ) -> Option<Arc<Connection>>
    where
        S: Stream<Item = Result<Message, E>> + Send + Unpin + 'static,
        E: fmt::Display + Send + 'static,
        K: Sink<Message> + Send + Unpin + 'static,
        K::Error: fmt::Display,
    {
        let settings = self.settings();
        let (conn, outbound) =
            Connection::new(binding, settings.send_buffer, self.shutdown.child_token());
        if !self.try_add(Arc::clone(&conn), settings.max_connections) {
            tracing::warn!(
                binding = %conn.binding(),
                max = settings.max_connections,
                "WebSocket connection limit reached, closing"
            );
            drop(stream);
            self.tracker.spawn(async move {
                let frame = CloseFrame {
                    code: close_code::AGAIN,
                    reason: "connection limit reached".into(),
                };
                let _ = sink.send(Message::Close(Some(frame))).await;
                let _ = sink.close().await;
            });
            return None;
        }
        let (inbound_tx, mut inbound_rx) = mpsc::channel::<String>(settings.recv_buffer.max(1));

        tracing::info!(
            connection_id = %conn.id(),
            binding = %conn.binding(),
            "WebSocket connection opened"
        );

        let timings = settings.timings();
        self.tracker
            .spawn(write_pump(Arc::clone(&conn), sink, outbound, timings));

        let manager = Arc::clone(self);
        let reader = Arc::clone(&conn);
        self.tracker.spawn(async move {
            read_pump(Arc::clone(&reader), stream, inbound_tx, timings.read_timeout).await;
            manager.remove(reader.id());
            tracing::info!(connection_id = %reader.id(), "WebSocket connection ended");
        });

        let manager = Arc::clone(self);
        let dispatcher = Arc::clone(&conn);
        self.tracker.spawn(async move {
            loop {
                let text = tokio::select! {
                    () = dispatcher.closed() => break,
                    msg = inbound_rx.recv() => match msg {
                        Some(text) => text,
                        None => break,
                    },
                };
                manager.dispatch(&dispatcher, &text).await;
            }
        });

        Some(conn)
    }

    /// Add a connection to the registry.
    pub fn add(&self, conn: Arc<Connection>) {
        self.connections.write().insert(conn.id(), conn);
    }

    /// Add a connection unless `max` are already registered.
    fn try_add(&self, conn: Arc<Connection>, max: usize) -> bool {
        let mut connections = self.connections.write();
        if connections.len() >= max {
            return false;
        }
        connections.insert(conn.id(), conn);
        true
    }

    /// Remove a connection from the registry.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.write().remove(&id)
    }

    /// Look up a connection.
    #[must_use]
    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.read().get(&id).cloned()
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Whether no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Queue `text` on every connection. Returns how many accepted it.
    pub fn broadcast(&self, text: &str) -> usize {
        let targets: Vec<Arc<Connection>> = self.connections.read().values().cloned().collect();
        targets
            .iter()
            .filter(|conn| conn.send(text.to_string()) == SendOutcome::Queued)
            .count()
    }

    /// Route one inbound text frame to its handler.
    ///
    /// Frames that are not JSON objects with a `type` are logged and skipped.
    /// Frames with no registered handler are logged. Handler errors are sent
    /// back to the client as error frames.
    pub async fn dispatch(&self, conn: &Arc<Connection>, text: &str) {
        let frame = match Frame::parse(text) {
            Ok(frame) => frame,
            Err(reason) => {
                tracing::warn!(connection_id = %conn.id(), reason = %reason, "Skipping malformed frame");
                return;
            }
        };

        let handler = self.handlers.read().get(frame.kind()).cloned();
        let Some(handler) = handler else {
            tracing::warn!(connection_id = %conn.id(), kind = %frame.kind(), "Unhandled message type");
            return;
        };

        if let Err(err) = handler.handle(conn, &frame).await {
            tracing::debug!(
                connection_id = %conn.id(),
                kind = %frame.kind(),
                error = %err,
                "Message handler failed"
            );
            conn.send_json(&error_frame(err.code(), &err.to_string(), frame.request_id()));
        }
    }

    /// Queue a heartbeat on every connection and evict the ones that cannot
    /// take it. Returns the number evicted.
    pub fn sweep(&self) -> usize {
        let victims: Vec<Arc<Connection>> = self
            .connections
            .read()
            .values()
            .filter(|conn| conn.send(HEARTBEAT_FRAME.to_string()) != SendOutcome::Queued)
            .cloned()
            .collect();

        for conn in &victims {
            conn.close();
            self.remove(conn.id());
            tracing::info!(connection_id = %conn.id(), "Evicted unresponsive connection");
        }
        victims.len()
    }

    /// Run the heartbeat sweep until shutdown.
    pub async fn run_heartbeat(&self) {
        let period = self.settings().heartbeat_interval;
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let evicted = self.sweep();
                    tracing::debug!(live = self.len(), evicted, "Heartbeat sweep");
                }
            }
        }
    }

    /// Close and remove every connection.
    pub fn close_all(&self) {
        let drained: Vec<Arc<Connection>> = self.connections.write().drain().map(|(_, c)| c).collect();
        for conn in &drained {
            conn.close();
        }
        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "Closed all WebSocket connections");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use parking_lot::Mutex;
    use std::convert::Infallible;

    fn manager() -> Arc<ConnectionManager> {
        Arc::new(ConnectionManager::new(
            WsSettings::default(),
            CancellationToken::new(),
            TaskTracker::new(),
        ))
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MessageHandler for Recorder {
        async fn handle(&self, _conn: &Arc<Connection>, frame: &Frame) -> Result<(), HandlerError> {
            self.seen.lock().push(frame.kind().to_string());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl MessageHandler for Failing {
        async fn handle(&self, _conn: &Arc<Connection>, _frame: &Frame) -> Result<(), HandlerError> {
            Err(HandlerError::InvalidFrame("missing data".into()))
        }
    }

    #[test]
    fn frame_requires_object_with_type() {
        assert_eq!(Frame::parse(r#"{"type":"ping"}"#).unwrap().kind(), "ping");
        assert!(Frame::parse("not json").is_err());
        assert!(Frame::parse("[1,2]").is_err());
        assert!(Frame::parse(r#"{"data":1}"#).is_err());
        assert!(Frame::parse(r#"{"type":""}"#).is_err());
    }

    #[test]
    fn full_queue_is_evicted_by_sweep() {
        let manager = manager();
        let (slow, _slow_rx) = Connection::new(Binding::General, 2, CancellationToken::new());
        let (healthy, mut healthy_rx) = Connection::new(Binding::General, 2, CancellationToken::new());
        manager.add(Arc::clone(&slow));
        manager.add(Arc::clone(&healthy));

        for i in 0..5 {
            slow.send(format!("msg {i}"));
        }
        assert_eq!(manager.sweep(), 1);

        assert!(slow.is_closed());
        assert!(manager.get(slow.id()).is_none());
        assert!(!healthy.is_closed());
        assert_eq!(healthy_rx.try_recv().unwrap(), HEARTBEAT_FRAME);
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn dispatch_routes_by_type() {
        let manager = manager();
        let recorder = Arc::new(Recorder::default());
        manager.register_handler("chat", Arc::clone(&recorder) as Arc<dyn MessageHandler>);
        let (conn, mut rx) = Connection::new(Binding::General, 8, CancellationToken::new());

        manager.dispatch(&conn, r#"{"type":"chat","messages":[]}"#).await;
        manager.dispatch(&conn, r#"{"no_type":true}"#).await;
        manager.dispatch(&conn, r#"{"type":"unknown"}"#).await;

        assert_eq!(*recorder.seen.lock(), vec!["chat"]);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn handler_error_becomes_error_frame() {
        let manager = manager();
        manager.register_handler("echo", Arc::new(Failing));
        let (conn, mut rx) = Connection::new(Binding::General, 8, CancellationToken::new());

        manager
            .dispatch(&conn, r#"{"type":"echo","request_id":"r1"}"#)
            .await;

        let reply: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(reply["type"], "error");
        assert_eq!(reply["code"], "invalid_frame");
        assert_eq!(reply["request_id"], "r1");
    }

    #[tokio::test]
    async fn attach_runs_pumps_until_client_leaves() {
        let manager = manager();
        let recorder = Arc::new(Recorder::default());
        manager.register_handler("ping", Arc::clone(&recorder) as Arc<dyn MessageHandler>);

        let (client_tx, inbound) = futures::channel::mpsc::unbounded::<Result<Message, Infallible>>();
        let (sink, mut outbound) = futures::channel::mpsc::unbounded::<Message>();
        let conn = manager.attach(inbound, sink, Binding::General).unwrap();
        assert_eq!(manager.len(), 1);

        conn.send("hi".into());
        assert_eq!(outbound.next().await.unwrap(), Message::Text("hi".into()));

        client_tx
            .unbounded_send(Ok(Message::Text(r#"{"type":"ping"}"#.into())))
            .unwrap();
        drop(client_tx);

        conn.closed().await;
        // The close frame is the last thing written.
        while let Some(msg) = outbound.next().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
        tokio::task::yield_now().await;
        assert!(conn.is_closed());
    }

    #[test]
    fn broadcast_and_close_all() {
        let manager = manager();
        let (a, mut a_rx) = Connection::new(Binding::General, 4, CancellationToken::new());
        let (b, mut b_rx) = Connection::new(Binding::General, 4, CancellationToken::new());
        manager.add(Arc::clone(&a));
        manager.add(Arc::clone(&b));

        assert_eq!(manager.broadcast("news"), 2);
        assert_eq!(a_rx.try_recv().unwrap(), "news");
        assert_eq!(b_rx.try_recv().unwrap(), "news");

        manager.close_all();
        assert!(manager.is_empty());
        assert!(a.is_closed() && b.is_closed());
        assert_eq!(manager.broadcast("late"), 0);
    }

    #[tokio::test]
    async fn attach_refuses_past_the_limit() {
        let manager = manager();
        manager.apply_settings(WsSettings {
            max_connections: 1,
            ..WsSettings::default()
        });

        let (_first_tx, first_in) = futures::channel::mpsc::unbounded::<Result<Message, Infallible>>();
        let (first_sink, _first_out) = futures::channel::mpsc::unbounded::<Message>();
        assert!(manager.attach(first_in, first_sink, Binding::General).is_some());

        let (_second_tx, second_in) = futures::channel::mpsc::unbounded::<Result<Message, Infallible>>();
        let (second_sink, mut second_out) = futures::channel::mpsc::unbounded::<Message>();
        assert!(manager.attach(second_in, second_sink, Binding::General).is_none());
        assert_eq!(manager.len(), 1);

        match second_out.next().await {
            Some(Message::Close(Some(frame))) => assert_eq!(frame.code, close_code::AGAIN),
            other => panic!("expected close frame, got {other:?}"),
        }
        assert!(second_out.next().await.is_none());
    }

    #[test]
    fn capacity_follows_settings() {
        let manager = manager();
        manager.apply_settings(WsSettings {
            max_connections: 1,
            ..WsSettings::default()
        });
        assert!(manager.has_capacity());
        let (conn, _rx) = Connection::new(Binding::General, 1, CancellationToken::new());
        manager.add(conn);
        assert!(!manager.has_capacity());
    }
}
