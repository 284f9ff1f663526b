//! Persistence writer: event log → durable message store.

use buzzchat_common::snowflake::snowflake_timestamp_ms;
use chrono::{TimeZone, Utc};
use serde_json::Value;

use crate::error::StoreError;
use crate::events::{topic, ChatEvent};
use crate::log::Subscription;
use crate::store::messages::StoredMessage;
use crate::AppState;

/// Consumer group shared by every persistence-writer instance, so each message
/// is stored exactly once across the fleet.
pub const CONSUMER_GROUP: &str = "message-writer";

pub async fn subscribe(state: &AppState) -> Result<Box<dyn Subscription>, StoreError> {
    let sub = state
        .log
        .subscribe(CONSUMER_GROUP, &[topic::MESSAGE_RECEIVED, topic::MESSAGE_DELETE])
        .await?;
    tracing::info!(group = CONSUMER_GROUP, "persistence writer subscribed");
    Ok(sub)
}

pub async fn drive(state: AppState, mut sub: Box<dyn Subscription>) {
    while let Some(record) = sub.next().await {
        if let Err(err) = apply(&state, record.value).await {
            tracing::warn!(%err, topic = %record.topic, "failed to persist chat event");
        }
    }
}

pub async fn run(state: AppState) {
    match subscribe(&state).await {
        Ok(sub) => drive(state, sub).await,
        Err(err) => tracing::error!(%err, "persistence writer subscription failed"),
    }
}

async fn apply(state: &AppState, value: Value) -> Result<(), StoreError> {
    let event: ChatEvent =
        serde_json::from_value(value).map_err(|e| StoreError::new(format!("bad chat event: {e}")))?;

    match event {
        ChatEvent::MessageSent {
            group_id,
            sender_id,
            content,
            attachment,
        } => {
            let id = state.snowflake.generate();
            let message = StoredMessage {
                id,
                group_id,
                sender_id,
                content,
                attachment,
                // createdAt mirrors the timestamp packed into the id.
                created_at: Utc
                    .timestamp_millis_opt(snowflake_timestamp_ms(id) as i64)
                    .single()
                    .unwrap_or_else(Utc::now),
            };
            state.messages.insert(message).await
        }
        ChatEvent::MessageDeleted { id, .. } => match id.parse::<i64>() {
            Ok(id) => state.messages.delete(id).await,
            Err(_) => {
                tracing::debug!(%id, "delete for a message id not issued by this store");
                Ok(())
            }
        },
        _ => Ok(()),
    }
}
