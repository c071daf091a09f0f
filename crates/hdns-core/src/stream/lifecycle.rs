//! Connection lifecycle manager
//!
//! One task per [`super::StreamHandle`] owns the live connection and the
//! retry counter. Nothing else touches either.
//!
//! ## State Machine
//!
//! ```text
//!            first subscriber
//!   Idle ───────────────────────▶ Connecting ──────▶ Connected
//!    ▲                               ▲   │               │
//!    │ last subscriber gone          │   │ failure       │ error / remote close
//!    │                               │   ▼               ▼
//!    └───────────────────────────────┴── Closing(cause) ◀┘
//!                     backoff elapsed        │
//!                                            │ budget exhausted / fatal
//!                     close()                ▼
//!   (any state) ───────────────────────▶   Closed
//! ```
//!
//! While no connection is live, outgoing messages are discarded.

use super::hub::MessageHub;
use super::queue::QueueReceiver;
use super::{CloseCause, ConnectionState, StreamEvent};
use crate::backoff::BackoffPolicy;
use crate::error::{StreamError, TransportError};
use crate::transport::{Connection, Connector, Frame, is_fatal_close_code};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use url::Url;

enum ConnectOutcome {
    Connected(Box<dyn Connection>),
    Failed(TransportError),
    Shutdown,
}

enum SessionOutcome {
    /// The handle was closed
    Shutdown,
    /// Every subscriber went away
    Idle,
    /// The connection failed or was closed by the peer
    Failed {
        error: TransportError,
        cause: CloseCause,
    },
}

pub(crate) struct Lifecycle<In> {
    pub(crate) resource: String,
    pub(crate) url: Url,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) backoff: BackoffPolicy,
    pub(crate) max_attempts: Option<u32>,
    pub(crate) queue: QueueReceiver,
    pub(crate) hub: Arc<MessageHub<In>>,
    pub(crate) demand: watch::Receiver<usize>,
    pub(crate) state: watch::Sender<ConnectionState>,
    pub(crate) events: mpsc::Sender<StreamEvent>,
    /// Consecutive reconnect attempts since the last received payload
    pub(crate) retries: u32,
}

impl<In> Lifecycle<In>
where
    In: DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Drive the stream until it is closed or gives up
    pub(crate) async fn run(mut self) {
        'idle: loop {
            if !self.await_demand().await {
                break;
            }

            loop {
                self.set_state(ConnectionState::Connecting);
                self.emit(StreamEvent::ConnectAttempt {
                    attempt: self.retries,
                });
                info!(
                    resource = %self.resource,
                    url = %self.url,
                    attempt = self.retries,
                    transport = self.connector.transport_name(),
                    "Connecting stream"
                );

                let outcome = match self.connect().await {
                    ConnectOutcome::Shutdown => break 'idle,
                    ConnectOutcome::Failed(error) => SessionOutcome::Failed {
                        error,
                        cause: CloseCause::Error,
                    },
                    ConnectOutcome::Connected(conn) => self.run_session(conn).await,
                };

                let (error, cause) = match outcome {
                    SessionOutcome::Shutdown => break 'idle,
                    SessionOutcome::Idle => {
                        self.go_idle();
                        continue 'idle;
                    }
                    SessionOutcome::Failed { error, cause } => (error, cause),
                };

                self.set_state(ConnectionState::Closing(cause));
                self.emit(StreamEvent::Disconnected {
                    reason: error.to_string(),
                });

                if error.is_fatal() {
                    self.terminate(StreamError::Fatal(error.to_string()));
                    return;
                }

                self.retries = self.retries.saturating_add(1);
                if let Some(max) = self.max_attempts
                    && self.retries > max
                {
                    self.terminate(StreamError::RetriesExhausted {
                        attempts: max,
                        last_error: error.to_string(),
                    });
                    return;
                }

                let delay = self.backoff.delay(self.retries);
                warn!(
                    resource = %self.resource,
                    error = %error,
                    attempt = self.retries,
                    delay_ms = delay.as_millis() as u64,
                    "Stream disconnected, reconnect scheduled"
                );
                self.emit(StreamEvent::RetryScheduled {
                    attempt: self.retries,
                    delay,
                });

                if !self.wait_backoff(delay).await {
                    break 'idle;
                }

                if *self.demand.borrow() == 0 {
                    self.go_idle();
                    continue 'idle;
                }
            }
        }

        self.shutdown();
    }

    /// Wait until at least one subscriber exists
    ///
    /// Returns `false` if the handle is closed first.
    async fn await_demand(&mut self) -> bool {
        loop {
            if *self.demand.borrow_and_update() > 0 {
                return true;
            }

            tokio::select! {
                changed = self.demand.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
                message = self.queue.recv() => match message {
                    Some(_) => self.discard_unsent(),
                    None => return false,
                },
            }
        }
    }

    async fn connect(&mut self) -> ConnectOutcome {
        let connector = Arc::clone(&self.connector);
        let url = self.url.clone();
        let attempt = async move { connector.connect(&url).await };
        tokio::pin!(attempt);

        loop {
            tokio::select! {
                result = &mut attempt => {
                    return match result {
                        Ok(conn) => ConnectOutcome::Connected(conn),
                        Err(error) => ConnectOutcome::Failed(error),
                    };
                }
                message = self.queue.recv() => match message {
                    Some(_) => self.discard_unsent(),
                    None => return ConnectOutcome::Shutdown,
                },
            }
        }
    }

    async fn run_session(&mut self, mut conn: Box<dyn Connection>) -> SessionOutcome {
        self.set_state(ConnectionState::Connected);
        self.emit(StreamEvent::Connected);
        info!(resource = %self.resource, "Stream connected");

        loop {
            tokio::select! {
                message = self.queue.recv() => match message {
                    Some(text) => {
                        if let Err(error) = conn.send_text(text).await {
                            conn.close().await;
                            return SessionOutcome::Failed {
                                error,
                                cause: CloseCause::Error,
                            };
                        }
                        debug!(resource = %self.resource, "Message sent");
                        self.emit(StreamEvent::MessageSent);
                    }
                    None => {
                        conn.close().await;
                        return SessionOutcome::Shutdown;
                    }
                },

                changed = self.demand.changed() => {
                    if changed.is_ok() && *self.demand.borrow_and_update() == 0 {
                        info!(resource = %self.resource, "No subscribers left, closing stream socket");
                        conn.close().await;
                        return SessionOutcome::Idle;
                    }
                }

                frame = conn.recv() => match frame {
                    Some(Ok(Frame::Text(text))) => match serde_json::from_str::<In>(&text) {
                        Ok(payload) => {
                            self.retries = 0;
                            debug!(resource = %self.resource, bytes = text.len(), "Message received");
                            self.hub.publish(payload);
                            self.emit(StreamEvent::MessageReceived);
                        }
                        Err(e) => {
                            warn!(resource = %self.resource, error = %e, "Undecodable payload");
                            conn.close().await;
                            return SessionOutcome::Failed {
                                error: TransportError::Protocol(format!("undecodable payload: {}", e)),
                                cause: CloseCause::Error,
                            };
                        }
                    },
                    Some(Ok(Frame::Close { code, reason })) => {
                        let fatal = is_fatal_close_code(code);
                        let description = match code {
                            Some(code) => format!("closed by server (code {}): {}", code, reason),
                            None => format!("closed by server: {}", reason),
                        };
                        let error = if fatal {
                            TransportError::Fatal(description)
                        } else {
                            TransportError::Io(description)
                        };
                        return SessionOutcome::Failed {
                            error,
                            cause: CloseCause::RemoteClose,
                        };
                    }
                    Some(Err(error)) => {
                        conn.close().await;
                        return SessionOutcome::Failed {
                            error,
                            cause: CloseCause::Error,
                        };
                    }
                    None => {
                        return SessionOutcome::Failed {
                            error: TransportError::Io("connection ended".to_string()),
                            cause: CloseCause::RemoteClose,
                        };
                    }
                },
            }
        }
    }

    /// Sleep for `delay` while discarding outgoing messages
    ///
    /// Returns `false` if the handle is closed first.
    async fn wait_backoff(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                message = self.queue.recv() => match message {
                    Some(_) => self.discard_unsent(),
                    None => return false,
                },
            }
        }
    }

    fn go_idle(&mut self) {
        self.retries = 0;
        self.set_state(ConnectionState::Idle);
        self.emit(StreamEvent::Idle);
        info!(resource = %self.resource, "Stream idle");
    }

    fn terminate(&mut self, error: StreamError) {
        error!(resource = %self.resource, error = %error, "Stream terminated");
        self.set_state(ConnectionState::Closed);
        self.emit(StreamEvent::TerminalFailure {
            error: error.clone(),
        });
        self.hub.fail(error);
    }

    fn shutdown(&mut self) {
        self.set_state(ConnectionState::Closed);
        self.hub.complete();
        self.emit(StreamEvent::Closed);
        info!(resource = %self.resource, "Stream closed");
    }

    fn discard_unsent(&self) {
        debug!(resource = %self.resource, "No live connection, message dropped");
        self.emit(StreamEvent::MessageDropped);
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn emit(&self, event: StreamEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    resource = %self.resource,
                    "Event channel full, dropping event. Consider increasing event_channel_capacity."
                );
            }
            // Nobody is listening for diagnostics.
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}
