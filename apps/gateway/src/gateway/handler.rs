//! Inbound operation dispatch for an authenticated connection.

use serde_json::{json, Value};

use crate::events::{
    client_event, server_event, topic, ChatEvent, ClientFrame, DeleteMessagePayload,
    FanoutEnvelope, GroupStatusPayload, HeartbeatPayload, MarkSeenPayload, SendMessagePayload,
    ServerFrame,
};
use crate::AppState;

/// Handle one client frame. Returns the reply frame, if the operation has one.
///
/// The sender identity always comes from the connection, never from the
/// payload. Malformed payloads and downstream failures are logged and the
/// operation dropped; the connection stays open either way.
pub async fn dispatch(state: &AppState, user_id: &str, frame: ClientFrame) -> Option<ServerFrame> {
    match frame.event.as_str() {
        client_event::MESSAGE_SEND => handle_send(state, user_id, frame.data).await,
        client_event::MESSAGE_DELETE => handle_delete(state, user_id, frame.data).await,
        client_event::MESSAGE_SEEN => {
            handle_seen(state, user_id, frame.data).await;
            None
        }
        client_event::HEARTBEAT => handle_heartbeat(state, user_id, frame.data).await,
        client_event::GROUP_STATUS => handle_group_status(state, user_id, frame.data).await,
        other => {
            tracing::debug!(%user_id, event = %other, "unknown client event");
            None
        }
    }
}

fn ack() -> ServerFrame {
    ServerFrame::new(server_event::ACK, json!({ "status": "accepted" }))
}

async fn handle_send(state: &AppState, user_id: &str, data: Value) -> Option<ServerFrame> {
    let payload: SendMessagePayload = match serde_json::from_value(data) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::debug!(%user_id, %err, "invalid send payload");
            return None;
        }
    };
    if !payload.has_body() {
        tracing::debug!(%user_id, "message needs content or an attachment");
        return None;
    }

    let event = ChatEvent::MessageSent {
        group_id: payload.group_id,
        sender_id: user_id.to_string(),
        content: payload
            .content
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty()),
        attachment: payload.attachment,
    };

    let value = serde_json::to_value(&event).unwrap();
    if let Err(err) = state.log.publish(topic::MESSAGE_RECEIVED, &value).await {
        tracing::warn!(%user_id, %err, topic = topic::MESSAGE_RECEIVED, "publish failed");
        return None;
    }
    Some(ack())
}

async fn handle_delete(state: &AppState, user_id: &str, data: Value) -> Option<ServerFrame> {
    let payload: DeleteMessagePayload = match serde_json::from_value(data) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::debug!(%user_id, %err, "invalid delete payload");
            return None;
        }
    };

    let event = ChatEvent::MessageDeleted {
        id: payload.id,
        group_id: payload.group_id,
        sender_id: user_id.to_string(),
    };

    let value = serde_json::to_value(&event).unwrap();
    if let Err(err) = state.log.publish(topic::MESSAGE_DELETE, &value).await {
        tracing::warn!(%user_id, %err, topic = topic::MESSAGE_DELETE, "publish failed");
        return None;
    }
    Some(ack())
}

/// Fire-and-forget: the client gets no reply, and live updates reach the
/// counterpart through the fan-out topic only when the stored state changed.
async fn handle_seen(state: &AppState, user_id: &str, data: Value) {
    let payload: MarkSeenPayload = match serde_json::from_value(data) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::debug!(%user_id, %err, "invalid seen payload");
            return;
        }
    };

    let changed = match state
        .presence
        .record_seen(&payload.group_id, user_id, &payload.last_message_timestamp)
        .await
    {
        Ok(changed) => changed,
        Err(err) => {
            tracing::warn!(%user_id, %err, "seen update failed");
            return;
        }
    };
    if !changed {
        return;
    }

    let envelope = FanoutEnvelope {
        receiver_id: payload.receiver_id.clone(),
        message: ChatEvent::MessageSeen {
            group_id: payload.group_id,
            sender_id: user_id.to_string(),
            receiver_id: payload.receiver_id,
            last_message_timestamp: payload.last_message_timestamp,
        },
    };
    let value = serde_json::to_value(&envelope).unwrap();
    if let Err(err) = state.log.publish(topic::MEMBER_SENT, &value).await {
        tracing::warn!(%user_id, %err, topic = topic::MEMBER_SENT, "publish failed");
    }
}

async fn handle_heartbeat(state: &AppState, user_id: &str, data: Value) -> Option<ServerFrame> {
    let payload: HeartbeatPayload =
        serde_json::from_value(data).unwrap_or(HeartbeatPayload { member_id: None });

    if let Err(err) = state.presence.record_heartbeat(user_id).await {
        tracing::warn!(%user_id, %err, "heartbeat write failed");
        return None;
    }

    // The status query half is optional; clients omit memberId outside
    // direct-message views.
    let member_id = payload.member_id.filter(|m| !m.is_empty())?;
    match state.presence.member_status(&member_id).await {
        Ok(status) => Some(ServerFrame::new(
            server_event::USER_STATUS,
            json!({ "userId": member_id, "status": status.as_wire() }),
        )),
        Err(err) => {
            tracing::warn!(%user_id, %err, "status lookup failed");
            None
        }
    }
}

async fn handle_group_status(state: &AppState, user_id: &str, data: Value) -> Option<ServerFrame> {
    let payload: GroupStatusPayload = match serde_json::from_value(data) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::debug!(%user_id, %err, "invalid group status payload");
            return None;
        }
    };

    match state.presence.group_status(&payload.group_id).await {
        Ok(status) => Some(ServerFrame::new(
            server_event::GROUP_STATUS,
            json!({ "status": status }),
        )),
        Err(err) => {
            tracing::warn!(%user_id, %err, "group status read failed");
            None
        }
    }
}
