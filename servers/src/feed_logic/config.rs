use clap::{Parser, ValueEnum};
use lib_sensorfeed::core::retry::{DEFAULT_INTERVAL_MS, DEFAULT_MAX_ATTEMPTS};
use lib_sensorfeed::{FeedOptions, Origin, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Where the last live reading is kept between runs.
#[derive(ValueEnum, Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    File,
    Redis,
}

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Live sensor reading watcher", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "SENSORFEED_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "SENSORFEED_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "SENSORFEED_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "SENSORFEED_WS_URL", help = "Streaming endpoint: a ws(s):// address or a path on the origin.")]
    pub ws_url: Option<String>,

    #[clap(long, env = "SENSORFEED_ORIGIN", help = "Origin that relative streaming paths are resolved against.")]
    pub origin: Option<String>,

    #[clap(long, env = "API_URL", help = "Base URL of the REST API used for the snapshot reading.")]
    pub api_url: Option<String>,

    #[clap(long, env = "SENSORFEED_SENSOR_ID", help = "Restrict the snapshot reading to one sensor.")]
    pub sensor_id: Option<String>,

    #[clap(long, env = "SENSORFEED_RECONNECT", help = "Reconnect after abnormal closures (true/false).")]
    pub reconnect: Option<bool>,

    #[clap(long, env = "SENSORFEED_RECONNECT_INTERVAL_MS", help = "Delay in milliseconds between reconnect attempts.")]
    pub reconnect_interval_ms: Option<u64>,

    #[clap(long, env = "SENSORFEED_MAX_RECONNECT_ATTEMPTS", help = "Consecutive reconnect attempts before giving up.")]
    pub max_reconnect_attempts: Option<u32>,

    #[clap(long, value_enum, env = "SENSORFEED_STORE", help = "Persistent store backend.")]
    pub store: Option<StoreKind>,

    #[clap(long, env = "SENSORFEED_STORE_DIR", help = "Directory for the file store.")]
    pub store_dir: Option<PathBuf>,

    #[clap(long, env = "SENSORFEED_REDIS_URL", help = "Redis URL for the redis store.")]
    pub redis_url: Option<String>,

    #[clap(long, env = "SENSORFEED_SNAPSHOT_RETRIES", help = "Retries for transient snapshot request failures.")]
    pub snapshot_retries: Option<u32>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            ws_url: other.ws_url.or(self.ws_url),
            origin: other.origin.or(self.origin),
            api_url: other.api_url.or(self.api_url),
            sensor_id: other.sensor_id.or(self.sensor_id),
            reconnect: other.reconnect.or(self.reconnect),
            reconnect_interval_ms: other.reconnect_interval_ms.or(self.reconnect_interval_ms),
            max_reconnect_attempts: other.max_reconnect_attempts.or(self.max_reconnect_attempts),
            store: other.store.or(self.store),
            store_dir: other.store_dir.or(self.store_dir),
            redis_url: other.redis_url.or(self.redis_url),
            snapshot_retries: other.snapshot_retries.or(self.snapshot_retries),
        }
    }

    fn defaults() -> Config {
        Config {
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            ws_url: Some("ws://localhost:8000/ws/sensor-readings/".to_string()),
            origin: Some("http://localhost:8000".to_string()),
            api_url: Some("http://localhost:8000".to_string()),
            reconnect: Some(true),
            reconnect_interval_ms: Some(DEFAULT_INTERVAL_MS),
            max_reconnect_attempts: Some(DEFAULT_MAX_ATTEMPTS),
            store: Some(StoreKind::File),
            redis_url: Some("redis://127.0.0.1/".to_string()),
            snapshot_retries: Some(2),
            ..Default::default()
        }
    }

    /// Library options derived from the merged configuration.
    pub fn feed_options(&self) -> anyhow::Result<FeedOptions> {
        let origin = match &self.origin {
            Some(address) => Origin::from_url(address)?,
            None => Origin::default(),
        };
        let policy = RetryPolicy {
            max_attempts: self.max_reconnect_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            interval_ms: self.reconnect_interval_ms.unwrap_or(DEFAULT_INTERVAL_MS),
        };
        Ok(FeedOptions {
            policy,
            origin,
            ..FeedOptions::default()
        })
    }

    /// Directory for the file store; falls back to the user's data dir.
    pub fn resolved_store_dir(&self) -> PathBuf {
        self.store_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("sensorfeed")
        })
    }
}

pub fn load_config() -> Config {
    load_config_from(Config::parse())
}

/// Layers defaults, then the config file, then env/CLI values in `cli`.
pub fn load_config_from(cli: Config) -> Config {
    // 1. Load defaults
    let mut current_config = Config::defaults();

    // 2. Load from config file (sensor_watch.conf) if present.
    //    The CLI may point at a different file.
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("sensor_watch.conf"));

    if let Some(file_config) = read_config_file(&config_file_path) {
        current_config = current_config.merge(file_config);
    }

    // 3. Override with environment variables and CLI arguments
    current_config.merge(cli)
}

fn read_config_file(path: &Path) -> Option<Config> {
    if !path.exists() {
        log::info!("Config file not found at {}. Using defaults and environment/CLI variables.", path.display());
        return None;
    }

    let config_str = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            log::warn!("Failed to read config file {}: {}. Falling back to other sources.", path.display(), e);
            return None;
        }
    };

    match serde_json::from_str::<Config>(&config_str) {
        Ok(file_config) => Some(file_config),
        Err(e) => {
            log::warn!("Failed to parse config file {}: {}. Falling back to other sources.", path.display(), e);
            None
        }
    }
}
