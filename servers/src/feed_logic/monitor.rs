use lib_sensorfeed::SensorFeed;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

/// Logs every change of the current reading and of the connection state.
pub async fn run(feed: Arc<SensorFeed>, mut shutdown: broadcast::Receiver<()>) {
    let mut current = feed.watch_current();
    let mut status = feed.connection().watch_status();

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                log::info!("Monitor received shutdown signal.");
                break;
            }
            changed = current.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = current.borrow_and_update().clone();
                match &snapshot.reading {
                    Some(reading) => log::info!(
                        "Current reading [{:?}]: {} = {} @ {}",
                        snapshot.provenance,
                        reading.sensor_id(),
                        reading.value(),
                        reading.timestamp()
                    ),
                    None => log::info!("No reading available yet."),
                }
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = status.borrow_and_update().clone();
                match &snapshot.error {
                    Some(error) => log::warn!(
                        "Connection {:?} (attempt {}): {}",
                        snapshot.state,
                        snapshot.attempt_count,
                        error
                    ),
                    None => log::info!("Connection {:?}", snapshot.state),
                }
            }
        }
    }
}

/// Forwards stdin lines to the stream. Lines that parse as JSON go out as
/// structured payloads, anything else as raw text.
pub async fn forward_stdin(feed: Arc<SensorFeed>, mut shutdown: broadcast::Receiver<()>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if !feed.status().is_open() {
                        log::warn!("Not connected; dropping input.");
                        continue;
                    }
                    match serde_json::from_str::<Value>(line) {
                        Ok(value) => feed.send(value),
                        Err(_) => feed.send(line),
                    }
                }
                Ok(None) => {
                    log::debug!("stdin closed; no more outbound input.");
                    break;
                }
                Err(e) => {
                    log::warn!("Failed to read stdin: {}", e);
                    break;
                }
            },
        }
    }
}
