//! # lib_sensorfeed
//!
//! Client side of a live sensor-reading stream: one self-healing WebSocket
//! connection, a persisted "last known" reading, a one-off snapshot pull, and
//! a single current reading chosen between them.
//!
//! Optional backends are feature gated: `connections` adds the Redis store,
//! `retrieve` adds the HTTP snapshot fetcher.

pub mod codec;
pub mod core;
pub mod error;
pub mod models;
pub mod retrieve;
pub mod store;

pub use crate::core::{
    CallbackDispatcher, CloseEvent, ConnectionManager, ConnectionState, ConnectionStatus, CurrentReading,
    FeedOptions, Handlers, Origin, Provenance, RetryPolicy, SensorFeed,
};
pub use error::{FeedError, Result};
pub use models::Reading;
