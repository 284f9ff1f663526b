use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::events::Attachment;

/// A message as written by the persistence role.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    /// Snowflake id assigned at write time; sortable by creation time.
    pub id: i64,
    pub group_id: String,
    pub sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    pub created_at: DateTime<Utc>,
}

/// Durable message storage, owned by the message service. The persistence
/// writer is its only caller inside this repository.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert(&self, message: StoredMessage) -> Result<(), StoreError>;

    async fn delete(&self, message_id: i64) -> Result<(), StoreError>;

    /// Messages of a group, oldest first.
    async fn group_messages(&self, group_id: &str) -> Result<Vec<StoredMessage>, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation (for tests / single-node runs)
// ---------------------------------------------------------------------------

pub struct MemoryMessages {
    inner: Mutex<Vec<StoredMessage>>,
}

impl MemoryMessages {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl MessageStore for MemoryMessages {
    async fn insert(&self, message: StoredMessage) -> Result<(), StoreError> {
        self.inner.lock().unwrap().push(message);
        Ok(())
    }

    async fn delete(&self, message_id: i64) -> Result<(), StoreError> {
        self.inner.lock().unwrap().retain(|m| m.id != message_id);
        Ok(())
    }

    async fn group_messages(&self, group_id: &str) -> Result<Vec<StoredMessage>, StoreError> {
        let mut messages: Vec<StoredMessage> = self
            .inner
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.group_id == group_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.id);
        Ok(messages)
    }
}
