// # WebSocket Transport
//
// This crate provides the WebSocket `Connector` used by hdns streams.
//
// ## Behavior
//
// - One `WsConnection` per connection attempt; the lifecycle manager in
//   `hdns-core` decides when to reconnect
// - Ping/pong is handled by tungstenite and never surfaced
// - Binary frames are a protocol violation; the hdns API only speaks JSON text
// - A close frame is surfaced with its code so the caller can tell a policy
//   rejection (1008) from a normal shutdown

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use hdns_core::error::TransportError;
use hdns_core::transport::{Connection, Connector, Frame};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};
use url::Url;

/// Default upper bound for the TCP + TLS + upgrade handshake
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Upper bound for sending our close frame
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Opens WebSocket connections
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    /// Create with a custom handshake timeout
    pub fn with_connect_timeout(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &Url) -> Result<Box<dyn Connection>, TransportError> {
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(TransportError::Connect(format!(
                "unsupported scheme '{}' for a WebSocket connection",
                url.scheme()
            )));
        }

        let handshake = tokio_tungstenite::connect_async(url.as_str());
        let (stream, response) = tokio::time::timeout(self.connect_timeout, handshake)
            .await
            .map_err(|_| {
                TransportError::Connect(format!(
                    "handshake with {} timed out after {:?}",
                    url, self.connect_timeout
                ))
            })?
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        debug!(url = %url, status = %response.status(), "WebSocket handshake complete");

        Ok(Box::new(WsConnection {
            stream,
            closed: false,
        }))
    }

    fn transport_name(&self) -> &'static str {
        "websocket"
    }
}

/// A live WebSocket connection
pub struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

#[async_trait]
impl Connection for WsConnection {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return None;
                }
                Err(e) => return Some(Err(TransportError::Io(e.to_string()))),
            };

            match message {
                Message::Text(text) => return Some(Ok(Frame::Text(text))),
                Message::Close(frame) => {
                    let (code, reason) = match frame {
                        Some(frame) => (Some(u16::from(frame.code)), frame.reason.into_owned()),
                        None => (None, String::new()),
                    };
                    return Some(Ok(Frame::Close { code, reason }));
                }
                Message::Binary(data) => {
                    return Some(Err(TransportError::Protocol(format!(
                        "unexpected binary frame ({} bytes)",
                        data.len()
                    ))));
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {
                    trace!("Control frame skipped");
                }
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Ok(Err(e)) = tokio::time::timeout(CLOSE_TIMEOUT, self.stream.close(None)).await {
            debug!(error = %e, "WebSocket close failed");
        }
    }
}
