//! Test doubles and common utilities for stream contract tests
//!
//! The doubles stand in for the network: a connector that follows a script
//! of outcomes, a peer handle that plays the server side of each accepted
//! connection, and a probe with scripted results.

#![allow(dead_code)]

use async_trait::async_trait;
use hdns_core::error::{Error, Result, TransportError};
use hdns_core::transport::{Connection, Connector, Frame};
use hdns_core::{ApiEndpoint, HealthProbe, StreamClient, StreamConfig, StreamEvent};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use url::Url;

/// Upper bound for waiting on a single event (virtual time)
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(600);

/// Outcome of one connection attempt
#[derive(Debug, Clone)]
pub enum Script {
    /// Open a connection and hand its server side to the test
    Accept,
    /// Fail the attempt
    Refuse(TransportError),
    /// Never complete the attempt
    Stall,
}

/// A connector whose attempts follow a script
///
/// Once the script is used up every further attempt is refused.
pub struct ScriptedConnector {
    script: Mutex<VecDeque<Script>>,
    attempts: AtomicUsize,
    urls: Mutex<Vec<Url>>,
    peers: mpsc::UnboundedSender<MockPeer>,
}

impl ScriptedConnector {
    pub fn new(script: impl IntoIterator<Item = Script>) -> (Arc<Self>, mpsc::UnboundedReceiver<MockPeer>) {
        let (peers, peers_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            attempts: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
            peers,
        });
        (connector, peers_rx)
    }

    /// A connector that refuses every attempt
    pub fn refusing() -> Arc<Self> {
        Self::new([]).0
    }

    /// Number of connection attempts made so far
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// URLs of every attempt, in order
    pub fn urls(&self) -> Vec<Url> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, url: &Url) -> std::result::Result<Box<dyn Connection>, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.clone());

        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Script::Accept) => {
                let (conn, peer) = MockConnection::pair();
                let _ = self.peers.send(peer);
                Ok(Box::new(conn))
            }
            Some(Script::Refuse(error)) => Err(error),
            Some(Script::Stall) => std::future::pending().await,
            None => Err(TransportError::Connect("connection refused".to_string())),
        }
    }

    fn transport_name(&self) -> &'static str {
        "scripted"
    }
}

/// Client side of an in-memory connection
pub struct MockConnection {
    sent: mpsc::UnboundedSender<String>,
    frames: mpsc::UnboundedReceiver<std::result::Result<Frame, TransportError>>,
    closed: Arc<AtomicBool>,
}

impl MockConnection {
    pub fn pair() -> (Self, MockPeer) {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        (
            Self {
                sent: sent_tx,
                frames: frames_rx,
                closed: Arc::clone(&closed),
            },
            MockPeer {
                sent: sent_rx,
                frames: frames_tx,
                closed,
            },
        )
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn send_text(&mut self, text: String) -> std::result::Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Io("connection closed".to_string()));
        }
        self.sent
            .send(text)
            .map_err(|_| TransportError::Io("peer gone".to_string()))
    }

    async fn recv(&mut self) -> Option<std::result::Result<Frame, TransportError>> {
        self.frames.recv().await
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Server side of an accepted connection
///
/// Dropping the peer ends the connection from the server side.
pub struct MockPeer {
    pub sent: mpsc::UnboundedReceiver<String>,
    frames: mpsc::UnboundedSender<std::result::Result<Frame, TransportError>>,
    closed: Arc<AtomicBool>,
}

impl MockPeer {
    pub fn push_text(&self, text: &str) {
        let _ = self.frames.send(Ok(Frame::Text(text.to_string())));
    }

    pub fn push_json(&self, value: serde_json::Value) {
        self.push_text(&value.to_string());
    }

    pub fn close_with(&self, code: u16, reason: &str) {
        let _ = self.frames.send(Ok(Frame::Close {
            code: Some(code),
            reason: reason.to_string(),
        }));
    }

    pub fn fail(&self, error: TransportError) {
        let _ = self.frames.send(Err(error));
    }

    /// Whether the client closed its side
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Next message the client wrote
    pub async fn next_sent(&mut self) -> String {
        tokio::time::timeout(EVENT_TIMEOUT, self.sent.recv())
            .await
            .expect("timed out waiting for a client message")
            .expect("connection dropped before the client sent anything")
    }
}

/// Wait for the next accepted connection
pub async fn next_peer(peers: &mut mpsc::UnboundedReceiver<MockPeer>) -> MockPeer {
    tokio::time::timeout(EVENT_TIMEOUT, peers.recv())
        .await
        .expect("timed out waiting for a connection")
        .expect("connector dropped")
}

/// Stream configuration without jitter, so delays are exact
pub fn exact_config(max_attempts: Option<u32>) -> StreamConfig {
    StreamConfig {
        jitter_ms: 0,
        max_attempts,
        ..Default::default()
    }
}

pub fn client(connector: Arc<ScriptedConnector>, config: StreamConfig) -> StreamClient {
    StreamClient::new(
        connector,
        ApiEndpoint::parse("http://hdns.test:8080/api/").unwrap(),
        config,
    )
    .unwrap()
}

pub async fn next_event(events: &mut mpsc::Receiver<StreamEvent>) -> StreamEvent {
    tokio::time::timeout(EVENT_TIMEOUT, events.recv())
        .await
        .expect("timed out waiting for a stream event")
        .expect("event channel closed")
}

/// Skip events until one matches `predicate`
pub async fn wait_for<F>(events: &mut mpsc::Receiver<StreamEvent>, mut predicate: F) -> StreamEvent
where
    F: FnMut(&StreamEvent) -> bool,
{
    loop {
        let event = next_event(events).await;
        if predicate(&event) {
            return event;
        }
    }
}

/// Collect every remaining event until the lifecycle task ends
pub async fn drain(events: &mut mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut collected = Vec::new();
    loop {
        match tokio::time::timeout(EVENT_TIMEOUT, events.recv()).await {
            Ok(Some(event)) => collected.push(event),
            Ok(None) => return collected,
            Err(_) => panic!("lifecycle task did not stop; events so far: {:?}", collected),
        }
    }
}

/// A health probe with scripted results
///
/// Pops one result per call; once the script is used up every call returns
/// `fallback`. A stalled probe never answers.
pub struct ScriptedProbe {
    results: Mutex<VecDeque<bool>>,
    fallback: AtomicBool,
    stall: AtomicBool,
    calls: Mutex<Vec<Instant>>,
}

impl ScriptedProbe {
    pub fn new(results: impl IntoIterator<Item = bool>, fallback: bool) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(results.into_iter().collect()),
            fallback: AtomicBool::new(fallback),
            stall: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn stalled() -> Arc<Self> {
        let probe = Self::new([], true);
        probe.stall.store(true, Ordering::SeqCst);
        probe
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Spacing between consecutive probe calls
    pub fn gaps(&self) -> Vec<Duration> {
        let calls = self.calls.lock().unwrap();
        calls.windows(2).map(|pair| pair[1] - pair[0]).collect()
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn probe(&self) -> Result<()> {
        self.calls.lock().unwrap().push(Instant::now());
        if self.stall.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        let scripted = self.results.lock().unwrap().pop_front();
        if scripted.unwrap_or_else(|| self.fallback.load(Ordering::SeqCst)) {
            Ok(())
        } else {
            Err(Error::probe("api unavailable"))
        }
    }
}
