//! Error types for the hdns client
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for hdns operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the hdns client
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Endpoint URL could not be parsed or derived
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Transport-level failure
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Health probe failure
    #[error("Health probe failed: {0}")]
    Probe(String),

    /// Operation timed out
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid URL error
    pub fn invalid_url(msg: impl Into<String>) -> Self {
        Self::InvalidUrl(msg.into())
    }

    /// Create a health probe error
    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

/// Failures reported by a [`crate::transport::Connector`] or
/// [`crate::transport::Connection`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection could not be established
    #[error("connect failed: {0}")]
    Connect(String),

    /// Reading from or writing to a live connection failed
    #[error("i/o failure: {0}")]
    Io(String),

    /// The peer sent something the transport cannot frame
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The peer signalled that the stream must not be retried
    #[error("fatal: {0}")]
    Fatal(String),
}

impl TransportError {
    /// Whether this failure ends the stream instead of triggering a reconnect
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// Terminal error delivered on a message stream.
///
/// Every subscriber observes it exactly once, after which the stream ends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The reconnect budget was used up
    #[error("gave up after {attempts} reconnect attempts: {last_error}")]
    RetriesExhausted {
        /// Reconnect attempts made before giving up
        attempts: u32,
        /// The failure that exhausted the budget
        last_error: String,
    },

    /// The server ended the stream with a fatal signal
    #[error("stream terminated by server: {0}")]
    Fatal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_fatal_transport_errors_end_the_stream() {
        assert!(TransportError::Fatal("policy".into()).is_fatal());
        assert!(!TransportError::Io("reset".into()).is_fatal());
        assert!(!TransportError::Connect("refused".into()).is_fatal());
    }

    #[test]
    fn transport_errors_convert_into_crate_errors() {
        let err: Error = TransportError::Connect("refused".into()).into();
        assert_eq!(err.to_string(), "Transport error: connect failed: refused");
    }
}
