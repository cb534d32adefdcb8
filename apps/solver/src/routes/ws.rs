use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use tracing::debug;

use crate::hub::transport::{FrameTransport, TransportError};
use crate::state::AppState;

/// GET /solver
/// Upgrades to a WebSocket and hands the socket to the hub for its lifetime.
pub async fn handle_solver_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| async move {
        let outcome = state
            .hub
            .handle_connection(WebSocketTransport::new(socket))
            .await;
        debug!(?outcome, "Solver socket finished");
    })
}

/// Text frames pass through; binary frames must be UTF-8.
pub struct WebSocketTransport {
    socket: WebSocket,
}

impl WebSocketTransport {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl FrameTransport for WebSocketTransport {
    async fn recv_frame(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            let message = match self.socket.recv().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(TransportError::Io(e.to_string()))),
            };
            match message {
                Message::Text(text) => return Some(Ok(text)),
                Message::Binary(bytes) => {
                    return Some(String::from_utf8(bytes).map_err(|_| TransportError::InvalidUtf8))
                }
                Message::Close(_) => return None,
                // axum answers pings itself
                Message::Ping(_) | Message::Pong(_) => continue,
            }
        }
    }

    async fn send_frame(&mut self, frame: String) -> Result<(), TransportError> {
        self.socket
            .send(Message::Text(frame))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}
