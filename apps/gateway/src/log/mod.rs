//! Durable publish/subscribe log with consumer-group semantics.

pub mod memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;

/// A single record read from the log.
#[derive(Debug, Clone)]
pub struct Record {
    pub topic: String,
    pub value: Value,
}

/// Handle for reading records on behalf of one consumer-group member.
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next record. Returns `None` once the log shuts down.
    async fn next(&mut self) -> Option<Record>;
}

/// A partitioned, multi-consumer-group publish/subscribe log.
///
/// Subscriptions sharing a `group` id split the stream between them (each
/// record handed to exactly one member); distinct groups each observe every
/// record on their topics. The fan-out topics rely on the second property:
/// every gateway instance subscribes under its own group, so all of them see
/// every envelope. Backed by Kafka in production and by
/// [`memory::MemoryLog`] in tests and single-node runs.
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn publish(&self, topic: &str, value: &Value) -> Result<(), StoreError>;

    async fn subscribe(
        &self,
        group: &str,
        topics: &[&str],
    ) -> Result<Box<dyn Subscription>, StoreError>;
}
