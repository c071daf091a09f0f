// # Transport Traits
//
// Defines the seam between the connection lifecycle manager and the
// underlying message-framed socket.
//
// ## Implementations
//
// - WebSocket: `hdns-transport-ws` crate
// - In-memory doubles: `tests/common`
//
// ## Usage
//
// ```rust,ignore
// use hdns_core::transport::{Connector, Frame};
//
// let mut conn = connector.connect(&url).await?;
// conn.send_text("{\"type\":\"refresh\"}".to_string()).await?;
// while let Some(frame) = conn.recv().await {
//     match frame? {
//         Frame::Text(text) => println!("{}", text),
//         Frame::Close { .. } => break,
//     }
// }
// ```

use crate::error::TransportError;
use async_trait::async_trait;
use url::Url;

/// Close code a server uses to reject a stream for good
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// One inbound unit delivered by a [`Connection`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete text message
    Text(String),

    /// The peer closed the connection
    Close {
        /// Close code, if the peer sent one
        code: Option<u16>,
        /// Close reason, possibly empty
        reason: String,
    },
}

impl Frame {
    /// Whether this frame tells the client never to reconnect
    pub fn is_fatal_close(&self) -> bool {
        match self {
            Frame::Close { code, .. } => is_fatal_close_code(*code),
            Frame::Text(_) => false,
        }
    }
}

/// Whether a close with `code` ends the stream for good
pub fn is_fatal_close_code(code: Option<u16>) -> bool {
    code == Some(CLOSE_POLICY_VIOLATION)
}

/// A live, bidirectional, message-framed connection
///
/// Exclusively owned by the connection lifecycle manager of one stream.
/// Control frames (ping/pong) are answered inside the implementation and are
/// never surfaced.
#[async_trait]
pub trait Connection: Send {
    /// Send one text message
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Receive the next inbound frame
    ///
    /// Returns `None` once the connection has ended. Must be cancellation
    /// safe: dropping the future before it completes loses no frame.
    async fn recv(&mut self) -> Option<Result<Frame, TransportError>>;

    /// Close the connection (best effort)
    async fn close(&mut self);
}

/// Factory for [`Connection`]s
///
/// Implementations must be thread-safe; one connector is shared by every
/// stream a [`crate::StreamClient`] opens.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new connection to `url`
    async fn connect(&self, url: &Url) -> Result<Box<dyn Connection>, TransportError>;

    /// Short transport name used in logs
    fn transport_name(&self) -> &'static str;
}
