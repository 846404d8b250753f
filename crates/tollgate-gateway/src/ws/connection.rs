//! One WebSocket client and its read and write pumps.
//!
//! A [`Connection`] owns a bounded outbound queue. Producers never block:
//! [`Connection::send`] drops the message when the queue is full and the
//! manager's heartbeat sweep later closes the slow client. The pumps are
//! generic over any `Stream`/`Sink` of WebSocket messages so they run the
//! same way against a socket or an in-memory channel.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use tollgate_core::ConnectionId;

/// What a connection was opened for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// General purpose connection (`/ws/connect`).
    General,
    /// Bound to an agent (`/ws/ai-agent`).
    Agent(String),
    /// Bound to a tool service (`/ws/mcp`).
    Tool(String),
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::General => f.write_str("general"),
            Self::Agent(name) => write!(f, "agent:{name}"),
            Self::Tool(name) => write!(f, "tool:{name}"),
        }
    }
}

/// Result of a non-blocking send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The message was queued.
    Queued,
    /// The outbound queue is full; the message was dropped.
    Full,
    /// The connection is closed; the message was dropped.
    Closed,
}

/// A live WebSocket client.
pub struct Connection {
    id: ConnectionId,
    binding: Binding,
    connected_at: DateTime<Utc>,
    outbound: mpsc::Sender<String>,
    closed: AtomicBool,
    close_signal: CancellationToken,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("binding", &self.binding)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Create a connection with an outbound queue of `capacity` messages.
    ///
    /// The connection closes when `close_signal` is cancelled; pass a child
    /// of the server's shutdown token. Returns the receiving end of the
    /// outbound queue for the write pump.
    #[must_use]
    pub fn new(
        binding: Binding,
        capacity: usize,
        close_signal: CancellationToken,
    ) -> (Arc<Self>, mpsc::Receiver<String>) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let conn = Arc::new(Self {
            id: ConnectionId::generate(),
            binding,
            connected_at: Utc::now(),
            outbound,
            closed: AtomicBool::new(false),
            close_signal,
        });
        (conn, rx)
    }

    /// Connection ID.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// What the connection is bound to.
    #[must_use]
    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    /// When the connection was accepted.
    #[must_use]
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Queue a text frame without waiting.
    pub fn send(&self, text: String) -> SendOutcome {
        if self.is_closed() {
            tracing::debug!(connection_id = %self.id, "Dropping message for closed connection");
            return SendOutcome::Closed;
        }
        match self.outbound.try_send(text) {
            Ok(()) => SendOutcome::Queued,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(connection_id = %self.id, "Outbound queue full, dropping message");
                SendOutcome::Full
            }
            Err(TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    /// Serialize `value` and queue it.
    pub fn send_json<T: serde::Serialize>(&self, value: &T) -> SendOutcome {
        match serde_json::to_string(value) {
            Ok(text) => self.send(text),
            Err(err) => {
                tracing::error!(connection_id = %self.id, error = %err, "Failed to encode message");
                SendOutcome::Closed
            }
        }
    }

    /// Close the connection. Calling this more than once has no effect.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.close_signal.cancel();
        tracing::debug!(connection_id = %self.id, "Connection closed");
    }

    /// Whether the connection is closed, either directly or by shutdown.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.close_signal.is_cancelled()
    }

    /// Resolves once the connection is closed.
    pub async fn closed(&self) {
        self.close_signal.cancelled().await;
    }
}

/// Timing for the pumps.
#[derive(Debug, Clone, Copy)]
pub struct PumpTimings {
    /// Rolling read deadline; any inbound frame resets it.
    pub read_timeout: Duration,
    /// Deadline for writing one frame.
    pub write_timeout: Duration,
    /// Interval between protocol pings.
    pub ping_interval: Duration,
}

/// Read frames from `stream` into `inbound` until the client goes away.
///
/// Text frames are forwarded as-is; binary frames are forwarded when they
/// are valid UTF-8. Ping and pong frames only reset the read deadline.
/// The connection is closed when this returns.
pub async fn read_pump<S, E>(
    conn: Arc<Connection>,
    mut stream: S,
    inbound: mpsc::Sender<String>,
    read_timeout: Duration,
) where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    loop {
        let next = tokio::select! {
            () = conn.closed() => break,
            next = tokio::time::timeout(read_timeout, stream.next()) => next,
        };

        let text = match next {
            Err(_) => {
                tracing::debug!(connection_id = %conn.id(), "Read deadline exceeded");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(err))) => {
                tracing::debug!(connection_id = %conn.id(), error = %err, "Read failed");
                break;
            }
            Ok(Some(Ok(Message::Text(text)))) => text,
            Ok(Some(Ok(Message::Binary(data)))) => match String::from_utf8(data) {
                Ok(text) => text,
                Err(_) => {
                    tracing::warn!(connection_id = %conn.id(), "Ignoring non UTF-8 binary frame");
                    continue;
                }
            },
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => continue,
            Ok(Some(Ok(Message::Close(_)))) => {
                tracing::debug!(connection_id = %conn.id(), "Client closed connection");
                break;
            }
        };

        tokio::select! {
            () = conn.closed() => break,
            sent = inbound.send(text) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }

    conn.close();
}

/// Drain `outbound` into `sink`, sending protocol pings on a timer.
///
/// Any write error or timeout ends the pump. On exit a close frame is sent
/// best-effort and the connection is closed.
pub async fn write_pump<K>(
    conn: Arc<Connection>,
    mut sink: K,
    mut outbound: mpsc::Receiver<String>,
    timings: PumpTimings,
) where
    K: Sink<Message> + Unpin,
    K::Error: fmt::Display,
{
    let start = tokio::time::Instant::now() + timings.ping_interval;
    let mut ping = tokio::time::interval_at(start, timings.ping_interval);

    loop {
        let frame = tokio::select! {
            biased;
            () = conn.closed() => break,
            msg = outbound.recv() => match msg {
                Some(text) => Message::Text(text),
                None => break,
            },
            _ = ping.tick() => Message::Ping(Vec::new()),
        };

        match tokio::time::timeout(timings.write_timeout, sink.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::debug!(connection_id = %conn.id(), error = %err, "Write failed");
                break;
            }
            Err(_) => {
                tracing::debug!(connection_id = %conn.id(), "Write deadline exceeded");
                break;
            }
        }
    }

    conn.close();
    let _ = tokio::time::timeout(timings.write_timeout, sink.send(Message::Close(None))).await;
    let _ = tokio::time::timeout(timings.write_timeout, sink.close()).await;
}
