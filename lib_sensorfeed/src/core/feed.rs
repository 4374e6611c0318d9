//! # Sensor Feed
//!
//! Wires the pieces into the thing callers actually use: one connection, one
//! persistent store, an optional snapshot source, and a single published
//! "current reading".
//!
//! Every decoded live reading is first written to the store, then folded into
//! the precedence state, and only then handed to the caller's `on_message`.
//! The resolved `CurrentReading` is published on a `watch` channel and only
//! republished when it actually changes.
//!
//! Store calls are bounded by `STORE_TIMEOUT`. A store that stops answering
//! degrades to "nothing persisted" instead of holding up the feed.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::core::connection_manager::{
    ConnectionManager, ConnectionState, ConnectionStatus, LiveReadingSink, OutboundPayload,
};
use crate::core::dispatcher::CallbackDispatcher;
use crate::core::endpoint::Origin;
use crate::core::precedence::{resolve, CurrentReading, PrecedenceState};
use crate::core::retry::RetryPolicy;
use crate::core::transport::Connector;
use crate::models::Reading;
use crate::retrieve::SnapshotFetcher;
use crate::store::{PersistentStore, LATEST_READING_KEY};

/// Longest the feed waits on one store read or write.
pub const STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Library-level knobs. Every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FeedOptions {
    pub policy: RetryPolicy,
    pub origin: Origin,
    /// Store key holding the last live reading.
    pub store_key: String,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            policy: RetryPolicy::default(),
            origin: Origin::default(),
            store_key: LATEST_READING_KEY.to_string(),
        }
    }
}

/// Precedence state plus the channel the resolved value is published on.
struct PrecedenceCell {
    state: Mutex<PrecedenceState>,
    current: watch::Sender<CurrentReading>,
    store: Arc<dyn PersistentStore>,
    store_key: String,
}

impl PrecedenceCell {
    async fn load(store: Arc<dyn PersistentStore>, store_key: String) -> Self {
        let persisted = match tokio::time::timeout(STORE_TIMEOUT, store.get(&store_key)).await {
            Ok(persisted) => persisted,
            Err(_) => {
                log::warn!("Store did not answer for '{}' within {:?}; starting empty.", store_key, STORE_TIMEOUT);
                None
            }
        };
        if let Some(reading) = &persisted {
            log::info!("Loaded persisted reading for sensor {}.", reading.sensor_id());
        }

        let state = PrecedenceState::new(persisted);
        let (current, _) = watch::channel(resolve(&state));
        Self {
            state: Mutex::new(state),
            current,
            store,
            store_key,
        }
    }

    /// Applies `change` and republishes if the resolved reading moved.
    fn update(&self, change: impl FnOnce(PrecedenceState) -> PrecedenceState) {
        let mut state = self.state.lock().expect("Precedence lock poisoned");
        let next = change(std::mem::take(&mut *state));
        let resolved = resolve(&next);
        *state = next;

        self.current.send_if_modified(|current| {
            if *current == resolved {
                false
            } else {
                *current = resolved;
                true
            }
        });
    }

    /// Marks the snapshot fetch as taken. Returns `false` if it is not allowed.
    fn claim_snapshot(&self) -> bool {
        let mut state = self.state.lock().expect("Precedence lock poisoned");
        if !state.should_fetch_snapshot() {
            return false;
        }
        *state = std::mem::take(&mut *state).with_snapshot_attempted();
        true
    }

    fn apply_snapshot(&self, reading: Option<Reading>) {
        self.update(|state| state.with_snapshot(reading));
    }
}

#[async_trait]
impl LiveReadingSink for PrecedenceCell {
    async fn accept_live(&self, reading: &Reading) {
        if tokio::time::timeout(STORE_TIMEOUT, self.store.put(&self.store_key, reading))
            .await
            .is_err()
        {
            log::warn!("Store write for '{}' timed out after {:?}.", self.store_key, STORE_TIMEOUT);
        }
        self.update(|state| state.with_live(reading.clone()));
    }
}

/// The caller-facing sensor feed.
pub struct SensorFeed {
    manager: ConnectionManager,
    precedence: Arc<PrecedenceCell>,
    fetcher: Option<Arc<dyn SnapshotFetcher>>,
    snapshot_task: Mutex<Option<JoinHandle<()>>>,
}

impl SensorFeed {
    /// Builds an inactive feed. The persisted reading, if any, is loaded here
    /// and is immediately visible through [`SensorFeed::current`].
    pub async fn new(
        connector: Arc<dyn Connector>,
        store: Arc<dyn PersistentStore>,
        fetcher: Option<Arc<dyn SnapshotFetcher>>,
        options: FeedOptions,
    ) -> Self {
        let precedence = Arc::new(PrecedenceCell::load(store, options.store_key).await);
        let manager = ConnectionManager::new(connector, CallbackDispatcher::new())
            .with_policy(options.policy)
            .with_origin(options.origin)
            .with_live_sink(precedence.clone());

        Self {
            manager,
            precedence,
            fetcher,
            snapshot_task: Mutex::new(None),
        }
    }

    /// Kicks off the one-time snapshot fetch (when allowed) and activates the
    /// connection.
    pub async fn start(&self, endpoint: &str, reconnect_enabled: bool) {
        self.spawn_snapshot_fetch();
        self.manager.activate(endpoint, reconnect_enabled).await;
    }

    /// Deactivates the connection and abandons an unfinished snapshot fetch.
    pub async fn stop(&self) {
        if let Some(task) = self.snapshot_task.lock().expect("Snapshot lock poisoned").take() {
            task.abort();
        }
        self.manager.deactivate().await;
    }

    /// The reading callers should display right now.
    pub fn current(&self) -> CurrentReading {
        self.precedence.current.borrow().clone()
    }

    pub fn watch_current(&self) -> watch::Receiver<CurrentReading> {
        self.precedence.current.subscribe()
    }

    /// Handler cell for `on_open` / `on_close` / `on_error` / `on_message`.
    pub fn dispatcher(&self) -> &CallbackDispatcher {
        self.manager.dispatcher()
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn status(&self) -> ConnectionStatus {
        self.manager.status()
    }

    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn send(&self, payload: impl Into<OutboundPayload>) {
        self.manager.send(payload);
    }

    fn spawn_snapshot_fetch(&self) {
        let Some(fetcher) = self.fetcher.clone() else {
            return;
        };
        if !self.precedence.claim_snapshot() {
            return;
        }

        let precedence = self.precedence.clone();
        let task = tokio::spawn(async move {
            let reading = match fetcher.fetch_latest().await {
                Ok(reading) => reading,
                Err(e) => {
                    log::error!("Failed to fetch snapshot reading: {:?}", e);
                    None
                }
            };
            log::debug!("Snapshot fetch finished (reading: {}).", reading.is_some());
            precedence.apply_snapshot(reading);
        });
        *self.snapshot_task.lock().expect("Snapshot lock poisoned") = Some(task);
    }
}

impl Drop for SensorFeed {
    fn drop(&mut self) {
        if let Some(task) = self.snapshot_task.get_mut().ok().and_then(|task| task.take()) {
            task.abort();
        }
    }
}
