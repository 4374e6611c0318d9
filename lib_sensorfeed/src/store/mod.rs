//! # Persistent Store
//!
//! Remembers the last live reading across process restarts. The feed reads
//! the well-known key once at startup and overwrites it on every accepted
//! live message; last write wins and no transactions are involved.
//!
//! Backends never fail the caller. A broken or unreachable store is logged
//! and behaves like an empty one. Every call is async and must not park the
//! runtime thread: blocking I/O goes through `spawn_blocking` or an async
//! client.

use async_trait::async_trait;

use crate::models::Reading;

/// In-process map, for tests and throwaway sessions.
pub mod memory;
/// One JSON file per key in a directory.
pub mod file;
/// Redis string keys.
#[cfg(feature = "connections")]
pub mod redis_cache;

pub use file::FileStore;
pub use memory::MemoryStore;
#[cfg(feature = "connections")]
pub use redis_cache::RedisStore;

/// Key under which the latest reading is kept.
pub const LATEST_READING_KEY: &str = "latestSensorData";

/// Key/value storage for readings.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<Reading>;
    async fn put(&self, key: &str, reading: &Reading);
}
