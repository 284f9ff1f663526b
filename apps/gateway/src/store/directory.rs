use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StoreError;

/// Read access to group-membership snapshots, owned by the group service.
/// The membership router is the only caller inside this repository.
#[async_trait]
pub trait GroupDirectory: Send + Sync {
    /// Ids of every member of `group_id`; empty for an unknown group.
    async fn member_ids(&self, group_id: &str) -> Result<Vec<String>, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation (for tests / single-node runs)
// ---------------------------------------------------------------------------

pub struct MemoryDirectory {
    groups: Mutex<HashMap<String, Vec<String>>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self {
            groups: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert_group(&self, group_id: &str, member_ids: &[&str]) {
        self.groups.lock().unwrap().insert(
            group_id.to_string(),
            member_ids.iter().map(|m| m.to_string()).collect(),
        );
    }
}

#[async_trait]
impl GroupDirectory for MemoryDirectory {
    async fn member_ids(&self, group_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .groups
            .lock()
            .unwrap()
            .get(group_id)
            .cloned()
            .unwrap_or_default())
    }
}
