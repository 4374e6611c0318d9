//! # Feed Errors
//!
//! One error enum for the whole library. Messages that reach the caller through
//! `ConnectionStatus::error` are static so they can be shown to a user as-is;
//! the underlying detail travels in the variant payload and is logged.

use thiserror::Error;

/// Everything that can go wrong inside the sensor feed.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The streaming endpoint could not be turned into a usable address.
    /// The payload holds the parser detail; the display text is static.
    #[error("Failed to create WebSocket connection")]
    TransportConstruction(String),

    /// The transport reported an error (handshake refused, read failure, ...).
    #[error("WebSocket error occurred")]
    Transport(String),

    /// Reconnection budget is spent. Only an explicit re-activation recovers.
    #[error("Max reconnection attempts ({0}) reached. Re-activate the feed to try again.")]
    RetriesExhausted(u32),

    /// The snapshot endpoint answered, but not with something usable.
    #[error("Snapshot request failed: {0}")]
    Snapshot(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),

    #[cfg(feature = "retrieve")]
    #[error(transparent)]
    Http(#[from] reqwest_middleware::Error),

    #[cfg(feature = "retrieve")]
    #[error(transparent)]
    Request(#[from] reqwest::Error),

    #[cfg(feature = "connections")]
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, FeedError>;
