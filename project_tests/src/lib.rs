//! # Test Fixtures
//!
//! In-memory stand-ins for the network edges of `lib_sensorfeed`, shared by
//! the integration tests under `tests/`.
//!
//! - **`ScriptedConnector`**: a `Connector` whose handshakes follow a script
//!   (accept, refuse, hang). Every accepted connection hands the test a
//!   `Remote` to drive the server side.
//! - **`StubFetcher`**: a `SnapshotFetcher` with a canned answer and an
//!   optional gate that holds the answer back until the test releases it.
//! - **`SilentStore`**: a `PersistentStore` that never answers.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lib_sensorfeed::core::transport::{Connector, Transport, TransportEvent};
use lib_sensorfeed::retrieve::SnapshotFetcher;
use lib_sensorfeed::store::PersistentStore;
use lib_sensorfeed::{CloseEvent, FeedError, Reading, Result};
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use url::Url;

/// Installs a test logger once per process.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Polls `condition` until it holds, panicking after `limit`.
///
/// Works under paused time too: each poll sleeps 1ms, which lets the
/// runtime auto-advance.
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + limit;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within {limit:?}");
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

/// Awaits `fut`, panicking if it takes longer than `limit`.
pub async fn within<F: Future>(limit: Duration, fut: F) -> F::Output {
    tokio::time::timeout(limit, fut)
        .await
        .unwrap_or_else(|_| panic!("timed out after {limit:?}"))
}

/// How one handshake attempt ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    Accept,
    Refuse,
    /// Never completes.
    Hang,
    /// Opens, but every send and close on the link hangs.
    Stall,
}

/// Server side of one accepted mock connection.
#[derive(Clone)]
pub struct Remote {
    events: mpsc::UnboundedSender<TransportEvent>,
    sent: Arc<Mutex<Vec<String>>>,
    closed_with: Arc<Mutex<Option<u16>>>,
}

impl Remote {
    pub fn push_text(&self, text: &str) {
        let _ = self.events.send(TransportEvent::Text(text.to_string()));
    }

    pub fn push_error(&self, detail: &str) {
        let _ = self.events.send(TransportEvent::Error(detail.to_string()));
    }

    /// Closes the connection from the server side.
    pub fn close(&self, code: u16) {
        let _ = self
            .events
            .send(TransportEvent::Closed(CloseEvent::new(code, "closed by remote")));
    }

    /// Texts the client transmitted, in order.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Code the client closed with, if it did.
    pub fn closed_with(&self) -> Option<u16> {
        *self.closed_with.lock().unwrap()
    }
}

struct MockTransport {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    sent: Arc<Mutex<Vec<String>>>,
    closed_with: Arc<Mutex<Option<u16>>>,
    stalled: bool,
}

#[async_trait]
impl Transport for MockTransport {
    async fn next_event(&mut self) -> TransportEvent {
        match self.events.recv().await {
            Some(event) => event,
            None => TransportEvent::Closed(CloseEvent::abnormal("remote vanished")),
        }
    }

    async fn send_text(&mut self, text: String) -> Result<()> {
        if self.stalled {
            std::future::pending::<()>().await;
        }
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn close(&mut self, code: u16, _reason: &str) {
        if self.stalled {
            std::future::pending::<()>().await;
        }
        *self.closed_with.lock().unwrap() = Some(code);
    }
}

/// `Connector` that follows a script. Once the script runs out every further
/// attempt gets `fallback`.
pub struct ScriptedConnector {
    script: Mutex<VecDeque<Handshake>>,
    fallback: Handshake,
    attempts: AtomicUsize,
    connect_times: Mutex<Vec<Instant>>,
    urls: Mutex<Vec<String>>,
    remotes: mpsc::UnboundedSender<Remote>,
}

impl ScriptedConnector {
    /// Returns the connector and the stream of remotes for accepted attempts.
    pub fn new(
        script: impl IntoIterator<Item = Handshake>,
        fallback: Handshake,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Remote>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            attempts: AtomicUsize::new(0),
            connect_times: Mutex::new(Vec::new()),
            urls: Mutex::new(Vec::new()),
            remotes: tx,
        });
        (connector, rx)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// When each handshake started.
    pub fn connect_times(&self) -> Vec<Instant> {
        self.connect_times.lock().unwrap().clone()
    }

    /// Addresses dialled, in order.
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }

    /// Gaps between consecutive handshakes.
    pub fn gaps(&self) -> Vec<Duration> {
        self.connect_times()
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .collect()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, url: &Url) -> Result<Box<dyn Transport>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.connect_times.lock().unwrap().push(Instant::now());
        self.urls.lock().unwrap().push(url.to_string());

        let step = self.script.lock().unwrap().pop_front().unwrap_or(self.fallback);
        match step {
            Handshake::Accept | Handshake::Stall => {
                let (events_tx, events_rx) = mpsc::unbounded_channel();
                let sent = Arc::new(Mutex::new(Vec::new()));
                let closed_with = Arc::new(Mutex::new(None));
                let _ = self.remotes.send(Remote {
                    events: events_tx,
                    sent: sent.clone(),
                    closed_with: closed_with.clone(),
                });
                Ok(Box::new(MockTransport {
                    events: events_rx,
                    sent,
                    closed_with,
                    stalled: step == Handshake::Stall,
                }))
            }
            Handshake::Refuse => Err(FeedError::Transport("connection refused".to_string())),
            Handshake::Hang => std::future::pending::<Result<Box<dyn Transport>>>().await,
        }
    }
}

/// `SnapshotFetcher` with a canned answer.
pub struct StubFetcher {
    answer: std::result::Result<Option<Reading>, String>,
    gate: Option<Arc<Notify>>,
    calls: AtomicUsize,
    finished: AtomicUsize,
}

impl StubFetcher {
    pub fn returning(reading: Option<Reading>) -> Self {
        Self {
            answer: Ok(reading),
            gate: None,
            calls: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        }
    }

    pub fn failing(detail: &str) -> Self {
        Self {
            answer: Err(detail.to_string()),
            ..Self::returning(None)
        }
    }

    /// Holds the answer back until `gate` is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotFetcher for StubFetcher {
    async fn fetch_latest(&self) -> Result<Option<Reading>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.finished.fetch_add(1, Ordering::SeqCst);
        self.answer.clone().map_err(FeedError::Snapshot)
    }
}

/// `PersistentStore` that never answers. Counts the calls it swallowed.
#[derive(Default)]
pub struct SilentStore {
    gets: AtomicUsize,
    puts: AtomicUsize,
}

impl SilentStore {
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PersistentStore for SilentStore {
    async fn get(&self, _key: &str) -> Option<Reading> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }

    async fn put(&self, _key: &str, _reading: &Reading) {
        self.puts.fetch_add(1, Ordering::SeqCst);
        std::future::pending::<()>().await
    }
}

/// The reading used throughout the scenarios.
pub fn sample_reading() -> Reading {
    Reading::new("s1", 25.5, "2024-01-01T00:00:00Z").with_id(1)
}

/// `sample_reading` wrapped the way the backend broadcasts it.
pub const SAMPLE_FRAME: &str = r#"{"data": {"id": 1, "sensor_id": "s1", "value": 25.5, "timestamp": "2024-01-01T00:00:00Z", "metadata": {}}}"#;
