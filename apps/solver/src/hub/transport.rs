use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection closed")]
    Closed,

    #[error("Frame is not valid UTF-8")]
    InvalidUtf8,

    #[error("Transport error: {0}")]
    Io(String),
}

/// A persistent duplex connection carrying text frames.
///
/// `recv_frame` must be cancel-safe: the hub races it against a running
/// stream and drops it when the stream wins.
#[async_trait]
pub trait FrameTransport: Send {
    /// The next inbound frame, or `None` once the peer has gone away.
    async fn recv_frame(&mut self) -> Option<Result<String, TransportError>>;

    async fn send_frame(&mut self, frame: String) -> Result<(), TransportError>;
}

/// In-memory transport for driving a hub connection from tests.
#[cfg(test)]
pub(crate) mod channel {
    use super::*;
    use tokio::sync::mpsc;

    pub(crate) struct ChannelTransport {
        inbound: mpsc::UnboundedReceiver<String>,
        outbound: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl FrameTransport for ChannelTransport {
        async fn recv_frame(&mut self) -> Option<Result<String, TransportError>> {
            self.inbound.recv().await.map(Ok)
        }

        async fn send_frame(&mut self, frame: String) -> Result<(), TransportError> {
            self.outbound.send(frame).map_err(|_| TransportError::Closed)
        }
    }

    /// Returns the server side plus the client's sender and receiver.
    pub(crate) fn pair() -> (
        ChannelTransport,
        mpsc::UnboundedSender<String>,
        mpsc::UnboundedReceiver<String>,
    ) {
        let (client_tx, inbound) = mpsc::unbounded_channel();
        let (outbound, client_rx) = mpsc::unbounded_channel();
        (ChannelTransport { inbound, outbound }, client_tx, client_rx)
    }
}
