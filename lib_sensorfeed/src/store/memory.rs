use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::models::Reading;
use crate::store::PersistentStore;

/// `PersistentStore` that lives and dies with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Reading>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts out holding `reading` under `key`.
    pub fn seeded(key: &str, reading: Reading) -> Self {
        Self {
            entries: Mutex::new(HashMap::from([(key.to_string(), reading)])),
        }
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn get(&self, key: &str) -> Option<Reading> {
        self.entries.lock().expect("Store lock poisoned").get(key).cloned()
    }

    async fn put(&self, key: &str, reading: &Reading) {
        self.entries
            .lock()
            .expect("Store lock poisoned")
            .insert(key.to_string(), reading.clone());
    }
}
