use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StoreError;

/// Abstraction over the shared key-value store holding presence state.
///
/// Backed by Redis in production and an in-memory map in tests. All writes are
/// last-write-wins; the store itself performs no timestamp comparison.
#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Set `field` in the hash at `key`. Returns `true` when the write changed
    /// the stored state (new field, or a different value).
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<bool, StoreError>;

    /// All fields of the hash at `key`; empty when the key is absent.
    async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation (for tests / single-node runs)
// ---------------------------------------------------------------------------

pub struct MemoryStore {
    hashes: Mutex<HashMap<String, HashMap<String, String>>>,
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            hashes: Mutex::new(HashMap::new()),
            values: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl PresenceStore for MemoryStore {
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<bool, StoreError> {
        let mut hashes = self.hashes.lock().unwrap();
        let hash = hashes.entry(key.to_string()).or_default();
        let previous = hash.insert(field.to_string(), value.to_string());
        Ok(previous.as_deref() != Some(value))
    }

    async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        Ok(self
            .hashes
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }
}
