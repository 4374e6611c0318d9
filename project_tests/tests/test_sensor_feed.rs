//! # Sensor Feed Integration Tests
//!
//! End-to-end precedence scenarios: live data, the persisted reading, and the
//! one-off snapshot, wired through `SensorFeed` with in-memory edges.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lib_sensorfeed::core::retry::NORMAL_CLOSURE;
use lib_sensorfeed::core::STORE_TIMEOUT;
use lib_sensorfeed::store::{FileStore, MemoryStore, PersistentStore, RedisStore, LATEST_READING_KEY};
use lib_sensorfeed::{ConnectionState, CurrentReading, FeedOptions, Provenance, Reading, SensorFeed};
use project_tests::{
    init_logger, sample_reading, wait_until, within, Handshake, ScriptedConnector, SilentStore, StubFetcher,
    SAMPLE_FRAME,
};
use tokio::sync::{watch, Notify};
use tokio::time::Instant;

const ENDPOINT: &str = "/ws/sensor-readings/";
const LIMIT: Duration = Duration::from_secs(10);

async fn wait_for_provenance(current: &mut watch::Receiver<CurrentReading>, provenance: Provenance) -> CurrentReading {
    let seen = within(LIMIT, current.wait_for(|c| c.provenance == provenance))
        .await
        .expect("feed dropped");
    CurrentReading::clone(&seen)
}

fn persisted_reading() -> Reading {
    Reading::new("s1", 19.0, "2023-12-31T23:00:00Z").with_id(0)
}

#[tokio::test]
async fn live_reading_becomes_current_and_is_persisted() {
    init_logger();
    let (connector, mut remotes) = ScriptedConnector::new([Handshake::Accept], Handshake::Accept);
    let store = Arc::new(MemoryStore::new());
    let feed = SensorFeed::new(connector, store.clone(), None, FeedOptions::default()).await;
    let mut current = feed.watch_current();
    assert_eq!(feed.current(), CurrentReading::none());

    feed.start(ENDPOINT, true).await;
    let remote = within(LIMIT, remotes.recv()).await.unwrap();
    remote.push_text(SAMPLE_FRAME);

    let live = wait_for_provenance(&mut current, Provenance::Live).await;
    let reading = live.reading.unwrap();
    assert_eq!(reading.id(), Some(1));
    assert_eq!(reading.sensor_id(), "s1");
    assert_eq!(reading.value(), 25.5);
    assert_eq!(reading.timestamp(), "2024-01-01T00:00:00Z");
    assert_eq!(store.get(LATEST_READING_KEY).await, Some(sample_reading()));

    feed.stop().await;
    assert_eq!(feed.state(), ConnectionState::ClosedFinal);
}

#[tokio::test]
async fn persisted_reading_is_shown_until_live_data_arrives() {
    init_logger();
    let (connector, mut remotes) = ScriptedConnector::new([Handshake::Accept], Handshake::Accept);
    let store = Arc::new(MemoryStore::seeded(LATEST_READING_KEY, persisted_reading()));
    let fetcher = Arc::new(StubFetcher::returning(Some(Reading::new("s1", 21.0, "2024-01-01T00:00:30Z"))));
    let feed = SensorFeed::new(connector, store.clone(), Some(fetcher.clone()), FeedOptions::default()).await;

    // Visible before any connection exists.
    let before = feed.current();
    assert_eq!(before.provenance, Provenance::Persisted);
    assert_eq!(before.reading, Some(persisted_reading()));

    feed.start(ENDPOINT, true).await;
    let remote = within(LIMIT, remotes.recv()).await.unwrap();
    wait_until(LIMIT, || fetcher.finished() == 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(feed.current().provenance, Provenance::Persisted);

    let mut current = feed.watch_current();
    remote.push_text(SAMPLE_FRAME);
    let live = wait_for_provenance(&mut current, Provenance::Live).await;
    assert_eq!(live.reading, Some(sample_reading()));
    assert_eq!(store.get(LATEST_READING_KEY).await, Some(sample_reading()));

    feed.stop().await;
}

#[tokio::test]
async fn late_snapshot_never_replaces_live_data() {
    init_logger();
    let (connector, mut remotes) = ScriptedConnector::new([Handshake::Accept], Handshake::Accept);
    let gate = Arc::new(Notify::new());
    let fetcher = Arc::new(
        StubFetcher::returning(Some(Reading::new("s9", 99.0, "2023-01-01T00:00:00Z"))).gated(gate.clone()),
    );
    let feed = SensorFeed::new(connector, Arc::new(MemoryStore::new()), Some(fetcher.clone()), FeedOptions::default()).await;
    let mut current = feed.watch_current();

    feed.start(ENDPOINT, true).await;
    let remote = within(LIMIT, remotes.recv()).await.unwrap();
    wait_until(LIMIT, || fetcher.calls() == 1).await;

    remote.push_text(SAMPLE_FRAME);
    let live = wait_for_provenance(&mut current, Provenance::Live).await;

    gate.notify_one();
    wait_until(LIMIT, || fetcher.finished() == 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(feed.current(), live);
    assert!(!current.has_changed().unwrap());

    feed.stop().await;
}

#[tokio::test]
async fn snapshot_fills_in_when_nothing_else_exists() {
    init_logger();
    // The stream never opens, so only the snapshot can supply a value.
    let (connector, _remotes) = ScriptedConnector::new([], Handshake::Hang);
    let snapshot = Reading::new("s1", 21.0, "2024-01-01T00:00:30Z").with_id(7);
    let fetcher = Arc::new(StubFetcher::returning(Some(snapshot.clone())));
    let store = Arc::new(MemoryStore::new());
    let feed = SensorFeed::new(connector, store.clone(), Some(fetcher), FeedOptions::default()).await;
    let mut current = feed.watch_current();

    feed.start(ENDPOINT, true).await;
    let resolved = wait_for_provenance(&mut current, Provenance::Snapshot).await;

    assert_eq!(resolved.reading, Some(snapshot));
    // Only live readings are persisted.
    assert!(store.get(LATEST_READING_KEY).await.is_none());

    feed.stop().await;
}

#[tokio::test]
async fn snapshot_is_fetched_at_most_once() {
    init_logger();
    let (connector, _remotes) = ScriptedConnector::new([], Handshake::Hang);
    let fetcher = Arc::new(StubFetcher::returning(None));
    let feed = SensorFeed::new(connector, Arc::new(MemoryStore::new()), Some(fetcher.clone()), FeedOptions::default()).await;

    feed.start(ENDPOINT, true).await;
    wait_until(LIMIT, || fetcher.finished() == 1).await;
    feed.stop().await;
    feed.start(ENDPOINT, false).await;
    feed.start("ws://elsewhere.test/ws/", true).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(fetcher.calls(), 1);
    feed.stop().await;
}

#[tokio::test]
async fn no_source_means_no_reading() {
    init_logger();
    let (connector, _remotes) = ScriptedConnector::new([], Handshake::Hang);
    let fetcher = Arc::new(StubFetcher::returning(None));
    let feed = SensorFeed::new(connector, Arc::new(MemoryStore::new()), Some(fetcher.clone()), FeedOptions::default()).await;

    feed.start(ENDPOINT, true).await;
    wait_until(LIMIT, || fetcher.finished() == 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(feed.current(), CurrentReading::none());
    feed.stop().await;
}

#[tokio::test]
async fn failed_snapshot_degrades_to_no_reading() {
    init_logger();
    let (connector, _remotes) = ScriptedConnector::new([], Handshake::Hang);
    let fetcher = Arc::new(StubFetcher::failing("HTTP 500"));
    let feed = SensorFeed::new(connector, Arc::new(MemoryStore::new()), Some(fetcher.clone()), FeedOptions::default()).await;

    feed.start(ENDPOINT, true).await;
    wait_until(LIMIT, || fetcher.finished() == 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(feed.current().provenance, Provenance::None);
    assert_eq!(feed.state(), ConnectionState::Connecting);
    feed.stop().await;
}

#[tokio::test]
async fn last_live_reading_survives_a_restart() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();

    {
        let (connector, mut remotes) = ScriptedConnector::new([Handshake::Accept], Handshake::Accept);
        let store = Arc::new(FileStore::new(dir.path()).unwrap());
        let feed = SensorFeed::new(connector, store, None, FeedOptions::default()).await;
        let mut current = feed.watch_current();

        feed.start(ENDPOINT, true).await;
        within(LIMIT, remotes.recv()).await.unwrap().push_text(SAMPLE_FRAME);
        wait_for_provenance(&mut current, Provenance::Live).await;
        feed.stop().await;
    }

    let (connector, _remotes) = ScriptedConnector::new([], Handshake::Hang);
    let store = Arc::new(FileStore::new(dir.path()).unwrap());
    let feed = SensorFeed::new(connector, store, None, FeedOptions::default()).await;

    let restored = feed.current();
    assert_eq!(restored.provenance, Provenance::Persisted);
    assert_eq!(restored.reading, Some(sample_reading()));
}

#[tokio::test]
async fn custom_store_key_is_honoured() {
    init_logger();
    let (connector, mut remotes) = ScriptedConnector::new([Handshake::Accept], Handshake::Accept);
    let store = Arc::new(MemoryStore::new());
    let options = FeedOptions {
        store_key: "greenhouse".to_string(),
        ..FeedOptions::default()
    };
    let feed = SensorFeed::new(connector, store.clone(), None, options).await;
    let mut current = feed.watch_current();

    feed.start(ENDPOINT, true).await;
    within(LIMIT, remotes.recv()).await.unwrap().push_text(SAMPLE_FRAME);
    wait_for_provenance(&mut current, Provenance::Live).await;

    assert!(store.get("greenhouse").await.is_some());
    assert!(store.get(LATEST_READING_KEY).await.is_none());
    feed.stop().await;
}

#[tokio::test(start_paused = true)]
async fn silent_store_never_holds_up_stop() {
    init_logger();
    let (connector, mut remotes) = ScriptedConnector::new([Handshake::Accept], Handshake::Accept);
    let store = Arc::new(SilentStore::default());

    // The startup read gives up after one timeout.
    let began = Instant::now();
    let feed = SensorFeed::new(connector, store.clone(), None, FeedOptions::default()).await;
    assert!(began.elapsed() >= STORE_TIMEOUT);
    assert_eq!(store.gets(), 1);
    assert_eq!(feed.current(), CurrentReading::none());

    let messages = Arc::new(AtomicUsize::new(0));
    let counted = messages.clone();
    feed.dispatcher().set_on_message(move |_| {
        counted.fetch_add(1, Ordering::SeqCst);
    });

    feed.start(ENDPOINT, true).await;
    let remote = within(LIMIT, remotes.recv()).await.unwrap();
    remote.push_text(SAMPLE_FRAME);
    wait_until(LIMIT, || store.puts() == 1).await;

    // The write is still parked; teardown must not wait for it.
    let stopping = Instant::now();
    within(Duration::from_secs(1), feed.stop()).await;
    assert!(stopping.elapsed() < STORE_TIMEOUT);

    assert_eq!(feed.state(), ConnectionState::ClosedFinal);
    assert_eq!(remote.closed_with(), Some(NORMAL_CLOSURE));
    assert_eq!(messages.load(Ordering::SeqCst), 0);
    assert_eq!(feed.current().provenance, Provenance::None);
}

#[tokio::test]
async fn unresponsive_redis_does_not_wedge_the_feed() {
    init_logger();
    // Accepts connections and never answers a command.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let mut held = Vec::new();
        for stream in listener.incoming().flatten() {
            held.push(stream);
        }
    });
    let store = Arc::new(
        RedisStore::new(&format!("redis://{addr}/"))
            .unwrap()
            .with_timeout(Duration::from_millis(300)),
    );

    let (connector, mut remotes) = ScriptedConnector::new([Handshake::Accept], Handshake::Accept);
    let feed = SensorFeed::new(connector, store, None, FeedOptions::default()).await;
    assert_eq!(feed.current().provenance, Provenance::None);

    feed.start(ENDPOINT, true).await;
    let remote = within(LIMIT, remotes.recv()).await.unwrap();
    remote.push_text(SAMPLE_FRAME);
    tokio::time::sleep(Duration::from_millis(50)).await;

    within(Duration::from_secs(2), feed.stop()).await;
    assert_eq!(feed.state(), ConnectionState::ClosedFinal);
    assert_eq!(remote.closed_with(), Some(NORMAL_CLOSURE));
}
