//! Durable store: each key is a `<key>.json` file in one directory. Writes go
//! to a temporary sibling first and are renamed into place, so a crash never
//! leaves a half-written reading behind.
//!
//! The filesystem calls are blocking, so each one runs on tokio's blocking
//! pool.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::task;

use crate::error::Result;
use crate::models::Reading;
use crate::store::PersistentStore;

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens (and creates, if needed) the store directory.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }

    fn read(path: &Path) -> Option<Reading> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                log::error!("Failed to read stored reading {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(reading) => Some(reading),
            Err(e) => {
                log::error!("Error parsing stored sensor data in {}: {}", path.display(), e);
                None
            }
        }
    }

    fn write(path: &Path, reading: &Reading) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(reading)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[async_trait]
impl PersistentStore for FileStore {
    async fn get(&self, key: &str) -> Option<Reading> {
        let path = self.path_for(key);
        match task::spawn_blocking(move || Self::read(&path)).await {
            Ok(reading) => reading,
            Err(e) => {
                log::error!("Store read task for '{}' failed: {}", key, e);
                None
            }
        }
    }

    async fn put(&self, key: &str, reading: &Reading) {
        let path = self.path_for(key);
        let reading = reading.clone();
        match task::spawn_blocking(move || Self::write(&path, &reading)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("Failed to persist reading under '{}': {:?}", key, e),
            Err(e) => log::error!("Store write task for '{}' failed: {}", key, e),
        }
    }
}
