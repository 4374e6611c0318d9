use anyhow::{Context, Result};
use lib_sensorfeed::retrieve::{HttpSnapshotFetcher, SnapshotFetcher};
use lib_sensorfeed::store::{FileStore, MemoryStore, PersistentStore, RedisStore};
use lib_sensorfeed::{CloseEvent, Handlers, Reading};
use std::sync::Arc;

use crate::feed_logic::config::{Config, StoreKind};

pub fn build_store(config: &Config) -> Result<Arc<dyn PersistentStore>> {
    let store: Arc<dyn PersistentStore> = match config.store.unwrap_or(StoreKind::File) {
        StoreKind::Memory => Arc::new(MemoryStore::new()),
        StoreKind::File => {
            let dir = config.resolved_store_dir();
            log::info!("Persisting readings under {}", dir.display());
            Arc::new(FileStore::new(&dir).with_context(|| format!("opening store directory {}", dir.display()))?)
        }
        StoreKind::Redis => {
            let url = config.redis_url.as_deref().unwrap_or("redis://127.0.0.1/");
            log::info!("Persisting readings in Redis at {}", url);
            Arc::new(RedisStore::new(url).with_context(|| format!("opening redis client for {url}"))?)
        }
    };
    Ok(store)
}

/// `None` when no API URL is configured.
pub fn build_fetcher(config: &Config) -> Result<Option<Arc<dyn SnapshotFetcher>>> {
    let Some(api_url) = config.api_url.as_deref().filter(|url| !url.trim().is_empty()) else {
        log::info!("No API URL configured; skipping the snapshot reading.");
        return Ok(None);
    };

    let mut fetcher = HttpSnapshotFetcher::new(api_url, config.snapshot_retries.unwrap_or(2))
        .with_context(|| format!("invalid API URL {api_url}"))?;
    if let Some(sensor) = &config.sensor_id {
        fetcher = fetcher.for_sensor(sensor.clone());
    }
    Ok(Some(Arc::new(fetcher)))
}

/// Handlers that narrate the connection into the log.
pub fn logging_handlers() -> Handlers {
    Handlers::default()
        .on_open(|| log::info!("Sensor stream is open."))
        .on_close(|event: &CloseEvent| {
            if event.is_normal() {
                log::info!("Sensor stream closed: {}", event.reason);
            } else {
                log::warn!("Sensor stream dropped with code {} ({}).", event.code, event.reason);
            }
        })
        .on_error(|message: &str| log::error!("Sensor stream error: {}", message))
        .on_message(|reading: &Reading| {
            log::debug!("{} = {} @ {}", reading.sensor_id(), reading.value(), reading.timestamp());
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_store_is_created_in_the_configured_dir() {
        let dir = tempdir().unwrap();
        let config = Config {
            store: Some(StoreKind::File),
            store_dir: Some(dir.path().join("nested")),
            ..Default::default()
        };

        build_store(&config).unwrap();
        assert!(dir.path().join("nested").is_dir());
    }

    #[test]
    fn blank_api_url_disables_the_snapshot() {
        let config = Config {
            api_url: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(build_fetcher(&config).unwrap().is_none());
    }

    #[test]
    fn relative_api_url_is_rejected() {
        let config = Config {
            api_url: Some("/api".to_string()),
            ..Default::default()
        };
        assert!(build_fetcher(&config).is_err());
    }
}
