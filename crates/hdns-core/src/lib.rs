// # hdns-core
//
// Core library for the hdns client.
//
// ## Architecture Overview
//
// The library talks to an hdns backend and keeps the caller's view of the
// current address, DNS records and resolution results up to date:
// - **StreamClient / StreamHandle**: reconnecting real-time streams over a
//   persistent socket, with backoff and a retry budget
// - **Connector / Connection**: transport seam implemented by plugin crates
//   (`hdns-transport-ws`) and by in-memory doubles in tests
// - **ConnectionMonitor**: API availability detection through a `HealthProbe`
// - **NotificationCenter**: queued, stacked user notifications
// - **model**: typed payloads decoded at the transport boundary
//
// ## Design Principles
//
// 1. **One owner per socket**: a single lifecycle task owns the live
//    connection and the retry counter of each stream
// 2. **Best-effort delivery**: outgoing messages issued while no socket is
//    live are dropped; callers resend periodically
// 3. **Library-First**: the `hdns-watch` binary is a thin integration layer

pub mod backoff;
pub mod config;
pub mod confirm;
pub mod endpoint;
pub mod error;
pub mod format;
pub mod health;
pub mod model;
pub mod notify;
pub mod stream;
pub mod transport;

// Re-export core types for convenience
pub use backoff::BackoffPolicy;
pub use config::{ClientConfig, HealthConfig, NotifyConfig, StreamConfig};
pub use endpoint::ApiEndpoint;
pub use error::{Error, Result, StreamError, TransportError};
pub use health::{ConnectionMonitor, HealthProbe, HealthState, MonitorEvent};
pub use notify::NotificationCenter;
pub use stream::{
    CloseCause, ConnectionState, MessageStream, StreamClient, StreamEvent, StreamHandle,
};
pub use transport::{Connection, Connector, Frame};
