// # Streams
//
// Reconnecting, multicast real-time streams over a `Connector`.
//
// ## Pieces
//
// - `queue`: outgoing messages, decoupled from the socket lifecycle
// - `lifecycle`: the single task that owns the socket and the retry counter
// - `hub`: fan-out of decoded payloads with latest-value replay
// - `StreamClient` / `StreamHandle`: the caller-facing facade
//
// ## Usage
//
// ```rust,ignore
// let client = StreamClient::new(connector, endpoint, StreamConfig::default())?;
// let (handle, _events) = client.address()?;
// let mut addresses = handle.messages();
// handle.send(&ControlMessage::Refresh);
// while let Some(update) = addresses.next().await {
//     println!("{:?}", update?);
// }
// handle.close();
// ```

mod hub;
mod lifecycle;
mod queue;

pub use hub::MessageStream;

use crate::config::StreamConfig;
use crate::endpoint::{self, ApiEndpoint};
use crate::error::{Error, Result, StreamError};
use crate::model::{Address, ControlMessage, Record, Resolution};
use crate::transport::Connector;
use hub::MessageHub;
use lifecycle::Lifecycle;
use queue::{OutgoingQueue, outgoing_queue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// Why a connection is being torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCause {
    /// Transport error or undecodable payload
    Error,
    /// The peer closed the connection
    RemoteClose,
}

/// Lifecycle state of a stream handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No subscriber, no socket
    Idle,
    /// A connection attempt is in flight
    Connecting,
    /// A socket is live
    Connected,
    /// The socket is gone; a reconnect or termination follows
    Closing(CloseCause),
    /// Terminal; a new handle is required to resume
    Closed,
}

impl ConnectionState {
    /// Whether the state is terminal
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Diagnostic events emitted by a stream's lifecycle manager
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A connection attempt started; `attempt` is 0 for the first one
    ConnectAttempt { attempt: u32 },

    /// A socket is live
    Connected,

    /// An outgoing message was written to the socket
    MessageSent,

    /// An inbound payload was decoded and published
    MessageReceived,

    /// An outgoing message was discarded because no socket was live
    MessageDropped,

    /// The socket failed or was closed by the peer
    Disconnected { reason: String },

    /// A reconnect will be attempted after `delay`
    RetryScheduled { attempt: u32, delay: Duration },

    /// The last subscriber left and the socket was closed
    Idle,

    /// The stream gave up; subscribers received `error`
    TerminalFailure { error: StreamError },

    /// The handle was closed by the caller
    Closed,
}

/// Opens streams against an hdns backend
///
/// One client shares a connector and configuration across every stream it
/// opens. Cloning is cheap.
#[derive(Clone)]
pub struct StreamClient {
    connector: Arc<dyn Connector>,
    endpoint: ApiEndpoint,
    config: StreamConfig,
}

impl StreamClient {
    /// Create a client after validating `config`
    pub fn new(
        connector: Arc<dyn Connector>,
        endpoint: ApiEndpoint,
        config: StreamConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            connector,
            endpoint,
            config,
        })
    }

    pub fn endpoint(&self) -> &ApiEndpoint {
        &self.endpoint
    }

    /// Open a stream for `resource`
    ///
    /// The connection is established lazily, when the first
    /// [`StreamHandle::messages`] subscriber appears. Query pairs with a
    /// `None` value are omitted from the URL.
    ///
    /// # Errors
    ///
    /// Fails when called outside a Tokio runtime or when no stream URL can be
    /// derived for `resource`.
    pub fn open<In, Out>(
        &self,
        resource: &str,
        query: &[(&str, Option<String>)],
    ) -> Result<(StreamHandle<In, Out>, mpsc::Receiver<StreamEvent>)>
    where
        In: DeserializeOwned + Clone + Send + Sync + 'static,
        Out: Serialize,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| Error::config("streams must be opened inside a Tokio runtime"))?;
        let url = self.endpoint.stream_url(resource, query)?;

        let (queue, queue_rx) = outgoing_queue();
        let hub = MessageHub::new(resource, self.config.message_buffer);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let (events_tx, events_rx) = mpsc::channel(self.config.event_channel_capacity);

        let lifecycle = Lifecycle {
            resource: resource.to_string(),
            url,
            connector: Arc::clone(&self.connector),
            backoff: self.config.backoff(),
            max_attempts: self.config.max_attempts,
            queue: queue_rx,
            hub: Arc::clone(&hub),
            demand: hub.demand(),
            state: state_tx,
            events: events_tx,
            retries: 0,
        };
        runtime.spawn(lifecycle.run());

        debug!(resource, "Stream opened");

        let handle = StreamHandle {
            inner: Arc::new(HandleInner {
                resource: resource.to_string(),
                queue,
                hub,
                state: state_rx,
            }),
            _out: PhantomData,
        };
        Ok((handle, events_rx))
    }

    /// Stream of the currently used public address; `None` until one is known
    pub fn address(
        &self,
    ) -> Result<(
        StreamHandle<Option<Address>, ControlMessage>,
        mpsc::Receiver<StreamEvent>,
    )> {
        self.open(endpoint::ADDRESS_STREAM, &[])
    }

    /// Stream of every managed record
    pub fn records(
        &self,
    ) -> Result<(
        StreamHandle<Vec<Record>, ControlMessage>,
        mpsc::Receiver<StreamEvent>,
    )> {
        self.open(endpoint::RECORD_STREAM, &[])
    }

    /// Stream of resolution results for one record
    pub fn resolve(
        &self,
        record_id: u64,
    ) -> Result<(
        StreamHandle<Vec<Resolution>, ControlMessage>,
        mpsc::Receiver<StreamEvent>,
    )> {
        self.open(&endpoint::resolve_stream(record_id), &[])
    }
}

struct HandleInner<In> {
    resource: String,
    queue: OutgoingQueue,
    hub: Arc<MessageHub<In>>,
    state: watch::Receiver<ConnectionState>,
}

impl<In> Drop for HandleInner<In> {
    fn drop(&mut self) {
        if self.queue.close() {
            debug!(resource = %self.resource, "Stream handle dropped, closing");
        }
    }
}

/// Caller-facing handle of one logical stream
///
/// Clones share the same connection. The stream is closed by
/// [`StreamHandle::close`] or when the last clone is dropped.
pub struct StreamHandle<In, Out = serde_json::Value> {
    inner: Arc<HandleInner<In>>,
    _out: PhantomData<fn(Out)>,
}

impl<In, Out> Clone for StreamHandle<In, Out> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _out: PhantomData,
        }
    }
}

impl<In, Out> std::fmt::Debug for StreamHandle<In, Out> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("resource", &self.inner.resource)
            .field("state", &*self.inner.state.borrow())
            .finish()
    }
}

impl<In, Out> StreamHandle<In, Out>
where
    In: Clone + Send + 'static,
    Out: Serialize,
{
    /// Subscribe to decoded payloads
    ///
    /// The first subscriber starts the connection. Dropping the last one
    /// closes the socket; subscribing again reconnects.
    pub fn messages(&self) -> MessageStream<In> {
        self.inner.hub.subscribe()
    }

    /// Enqueue an outgoing message
    ///
    /// Never blocks and never fails. The message is discarded when no socket
    /// is live at the time it is dequeued, or when the handle is closed.
    pub fn send(&self, message: &Out) {
        if self.inner.queue.is_closed() {
            debug!(resource = %self.inner.resource, "Send after close ignored");
            return;
        }

        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                warn!(resource = %self.inner.resource, error = %e, "Failed to encode outgoing message");
                return;
            }
        };

        if self.inner.queue.enqueue(text) {
            debug!(resource = %self.inner.resource, "Message enqueued");
        }
    }

    /// Close the stream permanently
    ///
    /// Idempotent. Subscribers see their streams end; later sends are no-ops.
    pub fn close(&self) {
        if self.inner.queue.close() {
            debug!(resource = %self.inner.resource, "Stream close requested");
        }
    }

    /// Whether [`StreamHandle::close`] was called
    pub fn is_closed(&self) -> bool {
        self.inner.queue.is_closed()
    }

    /// Watch the lifecycle state
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.clone()
    }

    /// Resource path this handle streams
    pub fn resource(&self) -> &str {
        &self.inner.resource
    }

    /// Most recently received payload
    pub fn latest(&self) -> Option<In> {
        self.inner.hub.latest()
    }
}
