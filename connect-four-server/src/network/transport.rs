//! Player Transports
//!
//! A [`Transport`] is one player's connection: send a server message,
//! receive the next client message. The match core only sees this trait.
//!
//! [`WsTransport`] adapts a WebSocket: outbound messages go through an mpsc
//! channel drained by a writer task, and the inbound half sits behind a
//! mutex so exactly one reader pulls from it at a time.

use std::net::SocketAddr;

use async_trait::async_trait;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Mutex, OwnedSemaphorePermit};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error};

use crate::network::protocol::{ClientMessage, ServerMessage};

/// Outbound queue depth per connection.
const OUTBOUND_BUFFER: usize = 64;

/// Transport errors. Any of these on receive means the player is gone.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Peer closed the connection or the writer stopped.
    #[error("connection closed")]
    Closed,

    /// WebSocket protocol or I/O failure.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Message could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One player's connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Queue a message for the player.
    async fn send(&self, message: ServerMessage) -> Result<(), TransportError>;

    /// Wait for the player's next well-formed message.
    async fn receive(&self) -> Result<ClientMessage, TransportError>;
}

// =============================================================================
// WEBSOCKET TRANSPORT
// =============================================================================

/// WebSocket-backed transport.
pub struct WsTransport<S> {
    peer: SocketAddr,
    outbound: mpsc::Sender<ServerMessage>,
    inbound: Mutex<SplitStream<WebSocketStream<S>>>,
    _slot: Option<OwnedSemaphorePermit>,
}

impl<S> WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap an accepted WebSocket and spawn its writer task.
    ///
    /// The writer exits, closing the socket, once the transport is dropped.
    pub fn new(ws: WebSocketStream<S>, peer: SocketAddr) -> Self {
        let (mut sink, stream) = ws.split();
        let (outbound, mut rx) = mpsc::channel::<ServerMessage>(OUTBOUND_BUFFER);

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let text = match msg.to_json() {
                    Ok(t) => t,
                    Err(e) => {
                        error!("Failed to serialize message: {}", e);
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
            debug!(%peer, "writer stopped");
        });

        Self {
            peer,
            outbound,
            inbound: Mutex::new(stream),
            _slot: None,
        }
    }

    /// Keep a connection slot for as long as this transport lives.
    pub fn hold_permit(mut self, permit: OwnedSemaphorePermit) -> Self {
        self._slot = Some(permit);
        self
    }

    /// Remote address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

#[async_trait]
impl<S> Transport for WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&self, message: ServerMessage) -> Result<(), TransportError> {
        self.outbound
            .send(message)
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn receive(&self) -> Result<ClientMessage, TransportError> {
        let mut stream = self.inbound.lock().await;
        loop {
            let parsed = match stream.next().await {
                Some(Ok(Message::Text(text))) => ClientMessage::from_json(&text),
                Some(Ok(Message::Binary(data))) => serde_json::from_slice(&data),
                Some(Ok(Message::Close(_))) | None => return Err(TransportError::Closed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            };
            match parsed {
                Ok(msg) => return Ok(msg),
                Err(e) => debug!(peer = %self.peer, "Invalid message: {}", e),
            }
        }
    }
}

// =============================================================================
// IN-PROCESS TRANSPORT
// =============================================================================
