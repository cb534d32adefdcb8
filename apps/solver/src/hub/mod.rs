//! RPC hub — JSON-framed bidirectional invocation protocol.
//!
//! # Lifecycle
//! `Handshaking → Active → Closed`, one dispatch loop per connection.
//!
//! - Handshaking: the first frame must be `{"protocol":"json","version":1}`.
//!   The hub answers `{}` or `{"error":...}` and, on error, closes without
//!   dispatching anything.
//! - Active: every record-separated message is dispatched in arrival order.
//!   Handlers for one connection run strictly one after another.
//! - Closed: peer disconnect, transport failure or an unparseable message.
//!   This is a normal session end, never surfaced to the client.
//!
//! Handler failures are turned into completion errors at the dispatch
//! boundary; nothing a handler does can take the connection down.
//!
//! # Streaming and cancellation
//! While a streaming invocation runs, the hub keeps reading the connection.
//! A `CancelInvocation` for the running stream fires its cancellation token
//! and ends it with an error completion. Anything else that arrives is queued
//! and dispatched after the stream's completion, preserving arrival order.
//! Each stream item is fully sent before the next one is pulled.

pub mod protocol;
pub mod transport;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use serde_json::{json, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use protocol::{
    check_handshake, split_frame, CompletionMessage, HandshakeError, HubMessage,
    InvocationMessage, StreamItemMessage, RECORD_SEPARATOR,
};
use transport::{FrameTransport, TransportError};

pub const CANCELED_ERROR: &str = "Invocation canceled";

#[derive(Debug, Error)]
pub enum HubError {
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error("Invalid message JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

// ────────────────────────────────────────────────────────────────────────────
// Handler traits
// ────────────────────────────────────────────────────────────────────────────

/// Per-invocation context handed to hub methods.
#[derive(Debug, Clone)]
pub struct CallerContext {
    pub connection_id: String,
    pub invocation_id: Option<String>,
    /// Fired when the client cancels the invocation or the connection drops.
    pub cancel: CancellationToken,
}

/// A request/response hub method.
#[async_trait]
pub trait HubMethod: Send + Sync {
    async fn invoke(&self, ctx: &CallerContext, args: Vec<Value>) -> anyhow::Result<Value>;
}

pub type ItemStream = BoxStream<'static, anyhow::Result<Value>>;

/// A server→client streaming hub method. The returned stream is pulled one
/// item at a time, each item sent before the next is requested.
#[async_trait]
pub trait StreamingHubMethod: Send + Sync {
    async fn invoke(&self, ctx: &CallerContext, args: Vec<Value>) -> anyhow::Result<ItemStream>;
}

// ────────────────────────────────────────────────────────────────────────────
// Hub
// ────────────────────────────────────────────────────────────────────────────

/// Method registry plus the process-wide connection counter.
/// Build once at startup, register methods, then share behind an `Arc`.
#[derive(Default)]
pub struct Hub {
    methods: HashMap<String, Arc<dyn HubMethod>>,
    stream_methods: HashMap<String, Arc<dyn StreamingHubMethod>>,
    connection_counter: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Handshaking,
    Active,
    Closed,
}

struct Connection<T> {
    id: String,
    state: ConnectionState,
    transport: T,
    /// Received but not yet dispatched messages.
    pending: VecDeque<String>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a request/response method. Names are case-insensitive.
    pub fn on(&mut self, name: &str, handler: impl HubMethod + 'static) {
        self.methods.insert(name.to_lowercase(), Arc::new(handler));
    }

    /// Registers a streaming method. Names are case-insensitive.
    pub fn on_stream(&mut self, name: &str, handler: impl StreamingHubMethod + 'static) {
        self.stream_methods
            .insert(name.to_lowercase(), Arc::new(handler));
    }

    pub fn next_connection_id(&self) -> String {
        let n = self.connection_counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("conn-{n}")
    }

    /// Runs one connection from handshake to close.
    pub async fn handle_connection<T: FrameTransport>(&self, transport: T) -> ConnectionState {
        let mut conn = Connection {
            id: self.next_connection_id(),
            state: ConnectionState::Handshaking,
            transport,
            pending: VecDeque::new(),
        };

        if let Err(e) = conn.handshake().await {
            warn!(connection_id = %conn.id, error = %e, "Hub handshake failed");
            conn.state = ConnectionState::Closed;
            return conn.state;
        }
        info!("Hub handshake completed: {}", conn.id);

        match self.run(&mut conn).await {
            Ok(()) => debug!("Connection closed: {}", conn.id),
            Err(e) => debug!(connection_id = %conn.id, reason = %e, "Connection closed"),
        }
        conn.state = ConnectionState::Closed;
        conn.state
    }

    async fn run<T: FrameTransport>(&self, conn: &mut Connection<T>) -> Result<(), HubError> {
        while let Some(text) = conn.next_message().await? {
            let message = HubMessage::decode(&text)?;
            self.dispatch(conn, message).await?;
        }
        Ok(())
    }

    async fn dispatch<T: FrameTransport>(
        &self,
        conn: &mut Connection<T>,
        message: HubMessage,
    ) -> Result<(), HubError> {
        match message {
            HubMessage::Ping => conn.send(&HubMessage::Ping).await,
            HubMessage::Invocation(invocation) => self.handle_invocation(conn, invocation).await,
            HubMessage::StreamInvocation(invocation) => {
                self.handle_stream_invocation(conn, invocation).await
            }
            HubMessage::CancelInvocation(cancel) => {
                debug!(
                    connection_id = %conn.id,
                    invocation_id = %cancel.invocation_id,
                    "Cancel for an invocation that is not running"
                );
                Ok(())
            }
            other => {
                warn!("Unknown message type: {:?}", other.message_type());
                Ok(())
            }
        }
    }

    async fn handle_invocation<T: FrameTransport>(
        &self,
        conn: &mut Connection<T>,
        invocation: InvocationMessage,
    ) -> Result<(), HubError> {
        let target = invocation.target.to_lowercase();
        let invocation_id = invocation.invocation_id;

        let Some(handler) = self.methods.get(&target).cloned() else {
            if let Some(id) = invocation_id {
                let error = format!("Unknown method: {target}");
                conn.complete(CompletionMessage::with_error(id, error)).await?;
            }
            return Ok(());
        };

        let ctx = conn.caller(invocation_id.clone(), CancellationToken::new());
        let result = handler.invoke(&ctx, invocation.arguments).await;

        match (invocation_id, result) {
            (Some(id), Ok(value)) => conn.complete(CompletionMessage::with_result(id, value)).await,
            (Some(id), Err(e)) => {
                error!("Error in {}: {:#}", target, e);
                conn.complete(CompletionMessage::with_error(id, format!("{e:#}")))
                    .await
            }
            (None, Err(e)) => {
                error!("Error in {}: {:#}", target, e);
                Ok(())
            }
            (None, Ok(_)) => Ok(()),
        }
    }

    async fn handle_stream_invocation<T: FrameTransport>(
        &self,
        conn: &mut Connection<T>,
        invocation: InvocationMessage,
    ) -> Result<(), HubError> {
        let target = invocation.target.to_lowercase();
        let Some(id) = invocation.invocation_id else {
            warn!(connection_id = %conn.id, "Stream invocation of {} without invocationId dropped", target);
            return Ok(());
        };

        let Some(handler) = self.stream_methods.get(&target).cloned() else {
            let error = format!("Unknown stream method: {target}");
            return conn.complete(CompletionMessage::with_error(id, error)).await;
        };

        let cancel = CancellationToken::new();
        // Fires on every exit path, including a dropped connection.
        let _cancel_on_exit = cancel.clone().drop_guard();

        let ctx = conn.caller(Some(id.clone()), cancel.clone());
        let mut items = match handler.invoke(&ctx, invocation.arguments).await {
            Ok(items) => items,
            Err(e) => {
                error!("Stream error in {}: {:#}", target, e);
                return conn
                    .complete(CompletionMessage::with_error(id, format!("{e:#}")))
                    .await;
            }
        };

        loop {
            tokio::select! {
                biased;

                frame = conn.transport.recv_frame() => match frame {
                    Some(Ok(frame)) => conn.queue_during_stream(&frame, &id, &cancel),
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(TransportError::Closed.into()),
                },

                () = cancel.cancelled() => {
                    info!(connection_id = %conn.id, invocation_id = %id, "Stream {} canceled", target);
                    return conn.complete(CompletionMessage::with_error(id, CANCELED_ERROR)).await;
                }

                item = items.next() => match item {
                    Some(Ok(item)) => {
                        let message = HubMessage::StreamItem(StreamItemMessage {
                            invocation_id: id.clone(),
                            item,
                        });
                        conn.send(&message).await?;
                    }
                    Some(Err(e)) => {
                        error!("Stream error in {}: {:#}", target, e);
                        return conn
                            .complete(CompletionMessage::with_error(id, format!("{e:#}")))
                            .await;
                    }
                    None => return conn.complete(CompletionMessage::empty(id)).await,
                },
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Connection
// ────────────────────────────────────────────────────────────────────────────

impl<T: FrameTransport> Connection<T> {
    async fn handshake(&mut self) -> Result<(), HubError> {
        let frame = match self.transport.recv_frame().await {
            Some(frame) => frame?,
            None => return Err(TransportError::Closed.into()),
        };

        let (head, rest) = frame
            .split_once(RECORD_SEPARATOR)
            .unwrap_or((frame.as_str(), ""));

        if let Err(e) = check_handshake(head) {
            // Best effort: the connection is closing either way.
            let _ = self.send_json(&json!({ "error": e.to_string() })).await;
            return Err(e.into());
        }

        self.send_json(&json!({})).await?;
        self.pending.extend(split_frame(rest).map(str::to_owned));
        self.state = ConnectionState::Active;
        Ok(())
    }

    /// Next undispatched message, reading more frames as needed.
    async fn next_message(&mut self) -> Result<Option<String>, HubError> {
        loop {
            if let Some(text) = self.pending.pop_front() {
                return Ok(Some(text));
            }
            match self.transport.recv_frame().await {
                Some(frame) => {
                    let frame = frame?;
                    self.pending.extend(split_frame(&frame).map(str::to_owned));
                }
                None => return Ok(None),
            }
        }
    }

    /// Handles a frame that arrived while stream `active_id` is running:
    /// a matching cancel fires `cancel`, everything else waits its turn.
    fn queue_during_stream(&mut self, frame: &str, active_id: &str, cancel: &CancellationToken) {
        for part in split_frame(frame) {
            match HubMessage::decode(part) {
                Ok(HubMessage::CancelInvocation(c)) if c.invocation_id == active_id => {
                    cancel.cancel();
                }
                Ok(HubMessage::CancelInvocation(c)) => {
                    debug!(
                        connection_id = %self.id,
                        invocation_id = %c.invocation_id,
                        "Cancel for an invocation that is not running"
                    );
                }
                _ => self.pending.push_back(part.to_owned()),
            }
        }
    }

    fn caller(&self, invocation_id: Option<String>, cancel: CancellationToken) -> CallerContext {
        CallerContext {
            connection_id: self.id.clone(),
            invocation_id,
            cancel,
        }
    }

    async fn send(&mut self, message: &HubMessage) -> Result<(), HubError> {
        let frame = message.encode()?;
        self.transport.send_frame(frame).await?;
        Ok(())
    }

    async fn complete(&mut self, completion: CompletionMessage) -> Result<(), HubError> {
        self.send(&HubMessage::Completion(completion)).await
    }

    async fn send_json(&mut self, value: &Value) -> Result<(), HubError> {
        self.transport.send_frame(protocol::frame(value)).await?;
        Ok(())
    }
}
