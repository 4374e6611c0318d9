//! # Redis Store
//!
//! Redis backend built on the synchronous client. Readings are stored as JSON
//! strings under `<prefix><key>`. A fresh connection is taken per call and
//! runs on tokio's blocking pool with connect, read and write timeouts, so a
//! server that accepts but never answers costs at most one timeout.
//! Failures are logged and degrade to "nothing stored".

use std::time::Duration;

use async_trait::async_trait;
use redis::{Client, Commands, Connection, RedisResult};
use tokio::task;

use crate::error::Result;
use crate::models::Reading;
use crate::store::PersistentStore;

/// Applied to connecting and to every read and write on the socket.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(2);

pub struct RedisStore {
    /// The internal Redis client instance.
    pub client: Client,
    prefix: String,
    io_timeout: Duration,
}

impl RedisStore {
    /// Creates a store from a connection string such as `redis://127.0.0.1/`.
    ///
    /// Opening the client does not touch the network; an unreachable server
    /// only shows up on the first `get`/`put`.
    pub fn new(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        Ok(Self {
            client,
            prefix: "sensorfeed:".to_string(),
            io_timeout: DEFAULT_IO_TIMEOUT,
        })
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn connect(client: &Client, timeout: Duration) -> RedisResult<Connection> {
        let conn = client.get_connection_with_timeout(timeout)?;
        conn.set_read_timeout(Some(timeout))?;
        conn.set_write_timeout(Some(timeout))?;
        Ok(conn)
    }

    async fn get_string(&self, key: &str) -> RedisResult<Option<String>> {
        let (client, timeout, full_key) = (self.client.clone(), self.io_timeout, self.full_key(key));
        task::spawn_blocking(move || {
            let mut conn = Self::connect(&client, timeout)?;
            let raw: Option<String> = conn.get(full_key)?;
            Ok(raw)
        })
        .await
        .unwrap_or_else(|e| Err(redis::RedisError::from(std::io::Error::other(e))))
    }

    async fn set_string(&self, key: &str, value: String) -> RedisResult<()> {
        let (client, timeout, full_key) = (self.client.clone(), self.io_timeout, self.full_key(key));
        task::spawn_blocking(move || {
            let mut conn = Self::connect(&client, timeout)?;
            let _: () = conn.set(full_key, value)?;
            Ok(())
        })
        .await
        .unwrap_or_else(|e| Err(redis::RedisError::from(std::io::Error::other(e))))
    }
}

#[async_trait]
impl PersistentStore for RedisStore {
    async fn get(&self, key: &str) -> Option<Reading> {
        let raw = match self.get_string(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                log::error!("Redis read of '{}' failed: {}", self.full_key(key), e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(reading) => Some(reading),
            Err(e) => {
                log::error!("Error parsing stored sensor data under '{}': {}", self.full_key(key), e);
                None
            }
        }
    }

    async fn put(&self, key: &str, reading: &Reading) {
        let payload = match serde_json::to_string(reading) {
            Ok(payload) => payload,
            Err(e) => {
                log::error!("Could not serialize reading for Redis: {}", e);
                return;
            }
        };
        if let Err(e) = self.set_string(key, payload).await {
            log::error!("Redis write of '{}' failed: {}", self.full_key(key), e);
        }
    }
}
