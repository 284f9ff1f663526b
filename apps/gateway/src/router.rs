//! Membership router: expands group-wide chat events into per-recipient
//! fan-out envelopes.

use serde_json::Value;

use crate::error::StoreError;
use crate::events::{topic, ChatEvent, FanoutEnvelope};
use crate::log::Subscription;
use crate::AppState;

/// Consumer group shared by every router instance, so each chat event is
/// expanded exactly once across the fleet.
pub const CONSUMER_GROUP: &str = "group-router";

pub async fn subscribe(state: &AppState) -> Result<Box<dyn Subscription>, StoreError> {
    let sub = state
        .log
        .subscribe(CONSUMER_GROUP, &[topic::MESSAGE_RECEIVED, topic::MESSAGE_DELETE])
        .await?;
    tracing::info!(group = CONSUMER_GROUP, "membership router subscribed");
    Ok(sub)
}

pub async fn drive(state: AppState, mut sub: Box<dyn Subscription>) {
    while let Some(record) = sub.next().await {
        if let Err(err) = route(&state, record.value).await {
            tracing::warn!(%err, topic = %record.topic, "failed to route chat event");
        }
    }
}

pub async fn run(state: AppState) {
    match subscribe(&state).await {
        Ok(sub) => drive(state, sub).await,
        Err(err) => tracing::error!(%err, "membership router subscription failed"),
    }
}

async fn route(state: &AppState, value: Value) -> Result<(), StoreError> {
    let event: ChatEvent =
        serde_json::from_value(value).map_err(|e| StoreError::new(format!("bad chat event: {e}")))?;

    let (group_id, sender_id) = match &event {
        ChatEvent::MessageSent {
            group_id, sender_id, ..
        } => (group_id, sender_id),
        ChatEvent::MessageDeleted {
            group_id, sender_id, ..
        } => (group_id, sender_id),
        // Seen events are enveloped at the gateway; group-created records
        // travel on their own topic. Neither needs expansion here.
        _ => return Ok(()),
    };

    let members = state.groups.member_ids(group_id).await?;
    for member_id in members {
        if member_id == *sender_id {
            continue;
        }
        let envelope = FanoutEnvelope {
            receiver_id: member_id,
            message: event.clone(),
        };
        let value = serde_json::to_value(&envelope).unwrap();
        state.log.publish(topic::MEMBER_SENT, &value).await?;
    }
    Ok(())
}
