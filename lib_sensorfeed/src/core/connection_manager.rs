//! # Connection Manager
//!
//! Owns exactly one streaming connection and its reconnection policy.
//!
//! ## Shape
//!
//! `ConnectionManager` is a cheap handle. Each `activate` spawns one session
//! task which owns the transport, the `RetryState` and every state
//! transition; nothing else mutates connection state. The handle talks to the
//! task through a `CancellationToken` (teardown) and an unbounded channel
//! (outbound payloads), and observes it through a `watch` channel carrying
//! `ConnectionStatus`.
//!
//! ## Lifecycle
//!
//! ```text
//! Idle -> Connecting -> Open --(1000)--> ClosingNormal -> Idle
//!                        |
//!                        +--(other code)--> ClosedAbnormalPendingRetry --timer--> Connecting
//!                        |                          |
//!                        |                          +--(budget spent)--> ClosedMaxRetriesExceeded
//! any --deactivate()--> ClosedFinal
//! ```
//!
//! A failed handshake counts as an error followed by an abnormal close, so it
//! goes through the same retry accounting as a dropped connection.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::codec::decode_frame;
use crate::core::dispatcher::{CallbackDispatcher, CloseEvent};
use crate::core::endpoint::{resolve_endpoint, Origin};
use crate::core::retry::{CloseDecision, RetryPolicy, RetryState, NORMAL_CLOSURE};
use crate::core::transport::{Connector, Transport, TransportEvent};
use crate::error::FeedError;
use crate::models::Reading;

/// Where the single connection currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    ClosingNormal,
    ClosedAbnormalPendingRetry,
    ClosedMaxRetriesExceeded,
    ClosedFinal,
}

/// Observable snapshot of the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub attempt_count: u32,
    /// Last user-facing error, cleared on every successful open.
    pub error: Option<String>,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Idle,
            attempt_count: 0,
            error: None,
        }
    }
}

impl ConnectionState {
    /// `true` once a session has stopped on its own or been torn down.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            ConnectionState::Idle | ConnectionState::ClosedMaxRetriesExceeded | ConnectionState::ClosedFinal
        )
    }
}

impl ConnectionStatus {
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }
}

/// Something to transmit. Structured values are serialized to JSON text.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundPayload {
    Text(String),
    Json(Value),
}

impl OutboundPayload {
    fn into_text(self) -> Result<String, serde_json::Error> {
        match self {
            OutboundPayload::Text(text) => Ok(text),
            OutboundPayload::Json(value) => serde_json::to_string(&value),
        }
    }
}

impl From<String> for OutboundPayload {
    fn from(text: String) -> Self {
        OutboundPayload::Text(text)
    }
}

impl From<&str> for OutboundPayload {
    fn from(text: &str) -> Self {
        OutboundPayload::Text(text.to_string())
    }
}

impl From<Value> for OutboundPayload {
    fn from(value: Value) -> Self {
        OutboundPayload::Json(value)
    }
}

/// Upper bound on a single write or close on the transport.
pub const TRANSPORT_IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Receives every accepted live reading before the caller's `on_message`.
///
/// This is the internal hook the feed uses for persistence and precedence; it
/// is fixed at construction and unaffected by handler replacement. The session
/// abandons an unfinished call when it is deactivated.
#[async_trait]
pub trait LiveReadingSink: Send + Sync {
    async fn accept_live(&self, reading: &Reading);
}

struct Session {
    url: Url,
    reconnect_enabled: bool,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Handle to the single streaming connection.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    dispatcher: CallbackDispatcher,
    policy: RetryPolicy,
    origin: Origin,
    live_sink: Option<Arc<dyn LiveReadingSink>>,
    status: Arc<watch::Sender<ConnectionStatus>>,
    session: tokio::sync::Mutex<Option<Session>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, dispatcher: CallbackDispatcher) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::default());
        Self {
            connector,
            dispatcher,
            policy: RetryPolicy::default(),
            origin: Origin::default(),
            live_sink: None,
            status: Arc::new(status),
            session: tokio::sync::Mutex::new(None),
            outbound: Mutex::new(None),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_live_sink(mut self, sink: Arc<dyn LiveReadingSink>) -> Self {
        self.live_sink = Some(sink);
        self
    }

    /// The handler cell. Replacing handlers through it never reconnects.
    pub fn dispatcher(&self) -> &CallbackDispatcher {
        &self.dispatcher
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Establishes the connection to `endpoint`.
    ///
    /// If a session for the same resolved address and flag is still running
    /// this is a no-op. Otherwise any previous session is torn down first, so
    /// at most one transport exists at a time. A malformed endpoint leaves the
    /// manager `Idle` with a static error instead of failing the caller.
    pub async fn activate(&self, endpoint: &str, reconnect_enabled: bool) {
        let mut session = self.session.lock().await;

        let url = match resolve_endpoint(endpoint, &self.origin) {
            Ok(url) => url,
            Err(e) => {
                log::error!("Cannot build streaming address from '{}': {:?}", endpoint, e);
                Self::stop_session(session.take()).await;
                self.clear_outbound();
                self.status.send_modify(|status| {
                    status.state = ConnectionState::Idle;
                    status.error = Some(e.to_string());
                });
                return;
            }
        };

        if let Some(current) = session.as_ref() {
            if current.url == url
                && current.reconnect_enabled == reconnect_enabled
                && !current.handle.is_finished()
                && !self.status.borrow().state.is_settled()
            {
                log::debug!("Already active on {}; keeping the current connection.", url);
                return;
            }
        }

        Self::stop_session(session.take()).await;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        *self.outbound.lock().expect("Outbound lock poisoned") = Some(outbound_tx);

        let cancel = CancellationToken::new();
        let runner = SessionRunner {
            connector: self.connector.clone(),
            dispatcher: self.dispatcher.clone(),
            live_sink: self.live_sink.clone(),
            status: self.status.clone(),
            url: url.clone(),
            reconnect_enabled,
            cancel: cancel.clone(),
            outbound_rx,
            retry: RetryState::new(self.policy),
        };

        self.status.send_modify(|status| {
            status.state = ConnectionState::Connecting;
            status.attempt_count = 0;
            status.error = None;
        });

        let handle = tokio::spawn(runner.run());
        *session = Some(Session {
            url,
            reconnect_enabled,
            cancel,
            handle,
        });
    }

    /// Tears the connection down for good.
    ///
    /// Cancels a pending retry timer or in-flight handshake, closes an open
    /// transport with code 1000 and waits for the session task to finish.
    /// Safe to call any number of times, in any state.
    pub async fn deactivate(&self) {
        let session = self.session.lock().await.take();
        Self::stop_session(session).await;
        self.clear_outbound();
        self.status.send_modify(|status| status.state = ConnectionState::ClosedFinal);
    }

    /// Transmits `payload` if the connection is open. Otherwise does nothing.
    pub fn send(&self, payload: impl Into<OutboundPayload>) {
        if !self.status.borrow().is_open() {
            log::trace!("Dropping outbound payload; connection is not open.");
            return;
        }

        let text = match payload.into().into_text() {
            Ok(text) => text,
            Err(e) => {
                log::warn!("Could not serialize outbound payload: {}", e);
                return;
            }
        };

        if let Some(tx) = self.outbound.lock().expect("Outbound lock poisoned").as_ref() {
            let _ = tx.send(text);
        }
    }

    /// Serializes any value and sends it as JSON text.
    pub fn send_json<T: Serialize>(&self, payload: &T) {
        match serde_json::to_value(payload) {
            Ok(value) => self.send(value),
            Err(e) => log::warn!("Could not serialize outbound payload: {}", e),
        }
    }

    async fn stop_session(session: Option<Session>) {
        if let Some(session) = session {
            session.cancel.cancel();
            if let Err(e) = session.handle.await {
                log::warn!("Session task for {} ended abnormally: {}", session.url, e);
            }
        }
    }

    fn clear_outbound(&self) {
        self.outbound.lock().expect("Outbound lock poisoned").take();
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.cancel.cancel();
        }
    }
}

enum PumpEnd {
    Deactivated,
    Closed(CloseEvent),
}

/// State owned by one session task.
struct SessionRunner {
    connector: Arc<dyn Connector>,
    dispatcher: CallbackDispatcher,
    live_sink: Option<Arc<dyn LiveReadingSink>>,
    status: Arc<watch::Sender<ConnectionStatus>>,
    url: Url,
    reconnect_enabled: bool,
    cancel: CancellationToken,
    outbound_rx: mpsc::UnboundedReceiver<String>,
    retry: RetryState,
}

impl SessionRunner {
    async fn run(mut self) {
        loop {
            self.set_state(ConnectionState::Connecting);
            log::info!("Connecting to sensor stream: {}", self.url);

            let attempt = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.finish();
                    return;
                }
                res = self.connector.connect(&self.url) => res,
            };

            let close = match attempt {
                Ok(transport) => {
                    self.opened();
                    match self.pump(transport).await {
                        PumpEnd::Deactivated => {
                            self.finish();
                            return;
                        }
                        PumpEnd::Closed(close) => close,
                    }
                }
                Err(e) => {
                    log::error!("Failed to connect to {}: {:?}", self.url, e);
                    self.report_error(&e);
                    CloseEvent::abnormal("handshake failed")
                }
            };

            self.dispatcher.dispatch_close(&close);

            match self.retry.on_close(close.code, self.reconnect_enabled) {
                CloseDecision::Normal => {
                    log::info!("Stream closed normally ({}).", close.reason);
                    self.set_state(ConnectionState::ClosingNormal);
                    self.set_state(ConnectionState::Idle);
                    return;
                }
                CloseDecision::ReconnectDisabled => {
                    log::warn!("Stream closed with code {}; reconnect is disabled.", close.code);
                    self.set_state(ConnectionState::Idle);
                    return;
                }
                CloseDecision::Exhausted { attempts } => {
                    let err = FeedError::RetriesExhausted(attempts);
                    log::error!("{}", err);
                    self.status.send_modify(|status| {
                        status.state = ConnectionState::ClosedMaxRetriesExceeded;
                        status.error = Some(err.to_string());
                    });
                    return;
                }
                CloseDecision::Retry { attempt, delay } => {
                    log::warn!(
                        "Stream closed with code {}. Reconnecting in {}ms (attempt {}/{}).",
                        close.code,
                        delay.as_millis(),
                        attempt,
                        self.retry.policy().max_attempts
                    );
                    self.status.send_modify(|status| {
                        status.state = ConnectionState::ClosedAbnormalPendingRetry;
                        status.attempt_count = attempt;
                    });

                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => {
                            self.finish();
                            return;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Drives an open transport until it closes or the session is cancelled.
    async fn pump(&mut self, mut transport: Box<dyn Transport>) -> PumpEnd {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return self.close_deactivated(transport).await;
                }
                Some(text) = self.outbound_rx.recv() => {
                    let sent = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => None,
                        res = tokio::time::timeout(TRANSPORT_IO_TIMEOUT, transport.send_text(text)) => Some(res),
                    };
                    match sent {
                        None => return self.close_deactivated(transport).await,
                        Some(Ok(Ok(()))) => {}
                        Some(Ok(Err(e))) => log::warn!("Send failed on {}: {:?}", self.url, e),
                        Some(Err(_)) => log::warn!("Send on {} timed out after {:?}.", self.url, TRANSPORT_IO_TIMEOUT),
                    }
                }
                event = transport.next_event() => match event {
                    TransportEvent::Text(text) => {
                        let cancelled = tokio::select! {
                            biased;
                            _ = self.cancel.cancelled() => true,
                            _ = self.handle_frame(&text) => false,
                        };
                        if cancelled {
                            return self.close_deactivated(transport).await;
                        }
                    }
                    TransportEvent::Binary(bin) => {
                        log::debug!("Ignoring binary frame of {} bytes.", bin.len());
                    }
                    TransportEvent::Error(detail) => {
                        log::error!("Stream error on {}: {}", self.url, detail);
                        self.report_error(&FeedError::Transport(detail));
                    }
                    TransportEvent::Closed(close) => {
                        // Payloads queued for the dead link must not leak into the next one.
                        while self.outbound_rx.try_recv().is_ok() {}
                        return PumpEnd::Closed(close);
                    }
                },
            }
        }
    }

    /// Closes with 1000 on deactivation. A stalled peer cannot hold teardown
    /// past `TRANSPORT_IO_TIMEOUT`.
    async fn close_deactivated(&self, mut transport: Box<dyn Transport>) -> PumpEnd {
        if tokio::time::timeout(TRANSPORT_IO_TIMEOUT, transport.close(NORMAL_CLOSURE, "Feed deactivated"))
            .await
            .is_err()
        {
            log::warn!("Close handshake with {} timed out; dropping the link.", self.url);
        }
        self.dispatcher.dispatch_close(&CloseEvent::normal("Feed deactivated"));
        PumpEnd::Deactivated
    }

    async fn handle_frame(&self, text: &str) {
        match decode_frame(text) {
            Ok(reading) => {
                log::debug!("Received reading from {}: {:?}", reading.sensor_id(), reading);
                if let Some(sink) = &self.live_sink {
                    sink.accept_live(&reading).await;
                }
                self.dispatcher.dispatch_message(&reading);
            }
            Err(e) => log::warn!("Discarding frame: {}", e),
        }
    }

    fn opened(&mut self) {
        self.retry.reset();
        self.status.send_modify(|status| {
            status.state = ConnectionState::Open;
            status.attempt_count = 0;
            status.error = None;
        });
        log::info!("Connected to sensor stream: {}", self.url);
        self.dispatcher.dispatch_open();
    }

    fn report_error(&self, err: &FeedError) {
        let message = err.to_string();
        self.status.send_modify(|status| status.error = Some(message.clone()));
        self.dispatcher.dispatch_error(&message);
    }

    fn set_state(&self, state: ConnectionState) {
        self.status.send_modify(|status| status.state = state);
    }

    fn finish(&self) {
        log::info!("Sensor stream to {} deactivated.", self.url);
        self.set_state(ConnectionState::ClosedFinal);
    }
}
