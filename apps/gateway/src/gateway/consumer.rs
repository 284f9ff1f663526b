//! Per-instance fan-out consumer: event log → local connections.

use chrono::{SecondsFormat, Utc};
use serde_json::Value;

use crate::error::StoreError;
use crate::events::{server_event, topic, ChatEvent, FanoutEnvelope, ServerFrame};
use crate::log::Subscription;
use crate::AppState;

/// Subscribe this instance to the fan-out topics.
///
/// The consumer group id embeds the instance id, so every instance receives
/// every record on these topics; which connections a record reaches is then
/// decided solely by the local registry. Sharing a group here would hand each
/// envelope to a single instance — usually the wrong one.
pub async fn subscribe(state: &AppState) -> Result<Box<dyn Subscription>, StoreError> {
    let group = format!("gateway-{}", state.config.instance_id);
    let sub = state
        .log
        .subscribe(&group, &[topic::MEMBER_SENT, topic::GROUP_CREATED])
        .await?;
    tracing::info!(%group, "fan-out consumer subscribed");
    Ok(sub)
}

/// Drive the subscription until the log shuts down.
pub async fn drive(state: AppState, mut sub: Box<dyn Subscription>) {
    while let Some(record) = sub.next().await {
        match record.topic.as_str() {
            topic::MEMBER_SENT => deliver_member_sent(&state, record.value),
            topic::GROUP_CREATED => deliver_group_created(&state, record.value),
            other => tracing::debug!(topic = %other, "ignoring record on unexpected topic"),
        }
    }
}

/// Subscribe and drive; the long-running entry point used by `main`.
pub async fn run(state: AppState) {
    match subscribe(&state).await {
        Ok(sub) => drive(state, sub).await,
        Err(err) => tracing::error!(%err, "fan-out subscription failed"),
    }
}

fn deliver_member_sent(state: &AppState, value: Value) {
    let envelope: FanoutEnvelope = match serde_json::from_value(value) {
        Ok(envelope) => envelope,
        Err(err) => {
            tracing::warn!(%err, "undecodable fan-out envelope");
            return;
        }
    };

    let event_name = match &envelope.message {
        ChatEvent::MessageSent { .. } => server_event::MESSAGE_INCOMING,
        ChatEvent::MessageSeen { .. } => server_event::MESSAGE_SEEN,
        ChatEvent::MessageDeleted { .. } => server_event::MESSAGE_DELETED,
        ChatEvent::GroupCreated { .. } => {
            tracing::warn!("group-created event inside a member envelope");
            return;
        }
    };

    let frame = ServerFrame::new(event_name, envelope.message.client_payload());
    if !state.registry.send_to(&envelope.receiver_id, frame) {
        // Expected steady state: the receiver is connected to another
        // instance (or not at all); that instance's own consumer handles
        // this same record.
        tracing::debug!(receiver_id = %envelope.receiver_id, "receiver not on this instance");
    }
}

fn deliver_group_created(state: &AppState, value: Value) {
    let event: ChatEvent = match serde_json::from_value(value) {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(%err, "undecodable group-created record");
            return;
        }
    };
    let ChatEvent::GroupCreated {
        created_by,
        members,
        ..
    } = &event
    else {
        tracing::warn!("unexpected event kind on group-created topic");
        return;
    };

    let mut payload = event.client_payload();
    if let Value::Object(ref mut map) = payload {
        map.insert(
            "timestamp".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
    }

    for member in members {
        if member.id == *created_by {
            continue;
        }
        let frame = ServerFrame::new(server_event::GROUP_CREATED, payload.clone());
        if !state.registry.send_to(&member.id, frame) {
            tracing::debug!(member_id = %member.id, "member not on this instance");
        }
    }
}
