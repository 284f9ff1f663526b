//! In-process event log used for tests and single-node runs.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;

use super::{EventLog, Record, Subscription};
use crate::error::StoreError;

/// One consumer group's shared queue. Every subscription created under the
/// same group id pops from this queue, so each record is handed to exactly one
/// of them; separate groups hold separate queues and each see every record.
struct GroupQueue {
    topics: HashSet<String>,
    queue: Mutex<VecDeque<Record>>,
    notify: Notify,
}

/// In-memory [`EventLog`]. Records published before a group subscribes are not
/// replayed to it; subscribe before publishing.
pub struct MemoryLog {
    groups: DashMap<String, Arc<GroupQueue>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self {
            groups: DashMap::new(),
        }
    }
}

#[async_trait]
impl EventLog for MemoryLog {
    async fn publish(&self, topic: &str, value: &Value) -> Result<(), StoreError> {
        for entry in self.groups.iter() {
            let group = entry.value();
            if !group.topics.contains(topic) {
                continue;
            }
            group.queue.lock().push_back(Record {
                topic: topic.to_string(),
                value: value.clone(),
            });
            group.notify.notify_one();
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        group: &str,
        topics: &[&str],
    ) -> Result<Box<dyn Subscription>, StoreError> {
        let queue = self
            .groups
            .entry(group.to_string())
            .or_insert_with(|| {
                Arc::new(GroupQueue {
                    topics: topics.iter().map(|t| t.to_string()).collect(),
                    queue: Mutex::new(VecDeque::new()),
                    notify: Notify::new(),
                })
            })
            .clone();
        Ok(Box::new(MemorySubscription { queue }))
    }
}

struct MemorySubscription {
    queue: Arc<GroupQueue>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next(&mut self) -> Option<Record> {
        loop {
            // The guard must drop before awaiting.
            let record = self.queue.queue.lock().pop_front();
            if let Some(record) = record {
                return Some(record);
            }
            self.queue.notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time;

    const TOPIC: &str = "chat.message.received";

    async fn expect_record(sub: &mut Box<dyn Subscription>) -> Record {
        time::timeout(Duration::from_secs(1), sub.next())
            .await
            .expect("timed out waiting for record")
            .expect("log closed")
    }

    async fn expect_empty(sub: &mut Box<dyn Subscription>) {
        assert!(
            time::timeout(Duration::from_millis(100), sub.next())
                .await
                .is_err(),
            "expected no record"
        );
    }

    #[tokio::test]
    async fn distinct_groups_each_receive_every_record() {
        let log = MemoryLog::new();
        let mut subs = Vec::new();
        for i in 0..3 {
            subs.push(log.subscribe(&format!("gateway-{i}"), &[TOPIC]).await.unwrap());
        }

        log.publish(TOPIC, &serde_json::json!({ "n": 1 })).await.unwrap();

        for sub in subs.iter_mut() {
            let record = expect_record(sub).await;
            assert_eq!(record.topic, TOPIC);
            assert_eq!(record.value["n"], 1);
        }
    }

    #[tokio::test]
    async fn shared_group_hands_each_record_to_one_member() {
        let log = MemoryLog::new();
        let mut a = log.subscribe("writers", &[TOPIC]).await.unwrap();
        let mut b = log.subscribe("writers", &[TOPIC]).await.unwrap();

        log.publish(TOPIC, &serde_json::json!({ "n": 1 })).await.unwrap();
        log.publish(TOPIC, &serde_json::json!({ "n": 2 })).await.unwrap();

        // Demand-driven pops: each member takes one, then the queue is dry.
        let first = expect_record(&mut a).await;
        let second = expect_record(&mut b).await;
        assert_ne!(first.value["n"], second.value["n"]);
        expect_empty(&mut a).await;
        expect_empty(&mut b).await;
    }

    #[tokio::test]
    async fn topics_outside_the_subscription_are_invisible() {
        let log = MemoryLog::new();
        let mut sub = log.subscribe("g", &[TOPIC]).await.unwrap();

        log.publish("group.created", &serde_json::json!({})).await.unwrap();
        expect_empty(&mut sub).await;
    }

    #[tokio::test]
    async fn records_published_before_subscribe_are_dropped() {
        let log = MemoryLog::new();
        log.publish(TOPIC, &serde_json::json!({})).await.unwrap();

        let mut sub = log.subscribe("late", &[TOPIC]).await.unwrap();
        expect_empty(&mut sub).await;
    }

    #[tokio::test]
    async fn waiting_subscriber_wakes_on_publish() {
        let log = Arc::new(MemoryLog::new());
        let mut sub = log.subscribe("g", &[TOPIC]).await.unwrap();

        let publisher = log.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(50)).await;
            publisher.publish(TOPIC, &serde_json::json!({ "late": true })).await.unwrap();
        });

        let record = expect_record(&mut sub).await;
        assert_eq!(record.value["late"], true);
    }
}
