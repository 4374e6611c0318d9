//! # Streaming Transport
//!
//! The connection manager talks to the network through two small traits:
//! a `Connector` produces one fresh `Transport` per connect attempt, and the
//! `Transport` yields a flat stream of `TransportEvent`s. Handles are never
//! reused: a reconnect always goes back to the connector.
//!
//! The production implementation wraps `tokio-tungstenite`.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::core::dispatcher::CloseEvent;
use crate::core::retry::NO_STATUS_RECEIVED;
use crate::error::{FeedError, Result};

/// Everything a transport can report to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Text(String),
    Binary(Vec<u8>),
    /// Non-fatal on its own; a `Closed` event follows if the link is gone.
    Error(String),
    Closed(CloseEvent),
}

/// One live streaming connection.
#[async_trait]
pub trait Transport: Send {
    /// Waits for the next event. Must be cancel-safe.
    async fn next_event(&mut self) -> TransportEvent;

    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Starts a close handshake with `code`. Errors are swallowed; the
    /// handle is discarded right after.
    async fn close(&mut self, code: u16, reason: &str);
}

/// Factory for transports. Shared by every session of a manager.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Performs the handshake. An `Err` means the attempt failed and is
    /// treated like an abnormal closure.
    async fn connect(&self, url: &Url) -> Result<Box<dyn Transport>>;
}

/// `Connector` backed by `tokio-tungstenite`.
#[derive(Debug, Default, Clone)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &Url) -> Result<Box<dyn Transport>> {
        let (stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))?;
        Ok(Box::new(TungsteniteTransport::new(stream)))
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TungsteniteTransport {
    stream: WsStream,
    // Set after a read error so the next poll reports the closure.
    pending_close: Option<CloseEvent>,
}

impl TungsteniteTransport {
    pub fn new(stream: WsStream) -> Self {
        Self {
            stream,
            pending_close: None,
        }
    }
}

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn next_event(&mut self) -> TransportEvent {
        loop {
            if let Some(close) = self.pending_close.take() {
                return TransportEvent::Closed(close);
            }

            match self.stream.next().await {
                Some(Ok(WsMessage::Text(text))) => return TransportEvent::Text(text.to_string()),
                Some(Ok(WsMessage::Binary(bin))) => return TransportEvent::Binary(bin.to_vec()),
                Some(Ok(WsMessage::Close(frame))) => {
                    let close = match frame {
                        Some(frame) => CloseEvent::new(u16::from(frame.code), frame.reason.to_string()),
                        None => CloseEvent::new(NO_STATUS_RECEIVED, ""),
                    };
                    return TransportEvent::Closed(close);
                }
                // Ping, pong and raw frames are protocol chatter.
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.pending_close = Some(CloseEvent::abnormal(e.to_string()));
                    return TransportEvent::Error(e.to_string());
                }
                None => return TransportEvent::Closed(CloseEvent::abnormal("stream ended")),
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))
    }

    async fn close(&mut self, code: u16, reason: &str) {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_owned().into(),
        };
        if let Err(e) = self.stream.close(Some(frame)).await {
            log::debug!("Close handshake did not complete: {}", e);
        }
    }
}
