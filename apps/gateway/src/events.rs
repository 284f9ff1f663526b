//! Chat events, fan-out envelopes, and client wire frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Event log topics
// ---------------------------------------------------------------------------

pub mod topic {
    /// New messages; consumed by the persistence writer and membership router
    /// under shared groups.
    pub const MESSAGE_RECEIVED: &str = "chat.message.received";
    /// Message deletions; same consumers as [`MESSAGE_RECEIVED`].
    pub const MESSAGE_DELETE: &str = "chat.message.delete";
    /// Per-recipient fan-out envelopes; broadcast to every gateway instance.
    pub const MEMBER_SENT: &str = "group.member.sent";
    /// Group creation notifications; broadcast to every gateway instance.
    pub const GROUP_CREATED: &str = "group.created";
}

// ---------------------------------------------------------------------------
// Client → server event names
// ---------------------------------------------------------------------------

pub mod client_event {
    pub const MESSAGE_SEND: &str = "chat.message.send";
    pub const MESSAGE_DELETE: &str = "chat.message.delete";
    pub const MESSAGE_SEEN: &str = "chat.message.seen";
    pub const HEARTBEAT: &str = "user.heartbeat";
    pub const GROUP_STATUS: &str = "group.lastseen.status";
}

// ---------------------------------------------------------------------------
// Server → client event names
// ---------------------------------------------------------------------------

pub mod server_event {
    pub const ACK: &str = "ack";
    pub const MESSAGE_INCOMING: &str = "chat.message.incoming";
    pub const MESSAGE_SEEN: &str = "chat.message.seen";
    pub const MESSAGE_DELETED: &str = "chat.message.deleted";
    pub const USER_STATUS: &str = "user.status";
    pub const GROUP_STATUS: &str = "group.status";
    pub const USER_GROUPS_STATUS: &str = "user.groups.status";
    pub const GROUP_CREATED: &str = "group.created";
}

// ---------------------------------------------------------------------------
// Chat events
// ---------------------------------------------------------------------------

/// File attachment descriptor carried inside a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Member descriptor carried by group-created notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    #[serde(rename = "_id")]
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
}

/// A single immutable chat action flowing through the event log.
///
/// The `kind` tag is decided where the event is published; consumers switch on
/// it instead of probing which fields happen to be present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ChatEvent {
    #[serde(rename_all = "camelCase")]
    MessageSent {
        group_id: String,
        sender_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attachment: Option<Attachment>,
    },
    #[serde(rename_all = "camelCase")]
    MessageSeen {
        group_id: String,
        sender_id: String,
        receiver_id: String,
        last_message_timestamp: String,
    },
    #[serde(rename_all = "camelCase")]
    MessageDeleted {
        #[serde(rename = "_id")]
        id: String,
        group_id: String,
        sender_id: String,
    },
    #[serde(rename_all = "camelCase")]
    GroupCreated {
        group_id: String,
        name: Option<String>,
        created_by: String,
        members: Vec<GroupMember>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_url: Option<String>,
    },
}

impl ChatEvent {
    /// Client-facing payload: the event body without the routing tag.
    pub fn client_payload(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap();
        if let Value::Object(ref mut map) = value {
            map.remove("kind");
        }
        value
    }
}

/// Routing envelope for per-recipient fan-out. One envelope is published per
/// recipient; each gateway instance delivers it only if the recipient's
/// connection lives in its own registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FanoutEnvelope {
    pub receiver_id: String,
    pub message: ChatEvent,
}

// ---------------------------------------------------------------------------
// Wire frames
// ---------------------------------------------------------------------------

/// A frame received from the client over WebSocket.
#[derive(Debug, Deserialize)]
pub struct ClientFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// A frame sent to the client over WebSocket.
#[derive(Debug, Clone, Serialize)]
pub struct ServerFrame {
    pub event: String,
    pub data: Value,
}

impl ServerFrame {
    pub fn new(event: &str, data: Value) -> Self {
        Self {
            event: event.to_string(),
            data,
        }
    }

    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap()
    }
}

// ---------------------------------------------------------------------------
// Inbound operation payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub group_id: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub attachment: Option<Attachment>,
}

impl SendMessagePayload {
    /// A message must carry non-empty content or an attachment.
    pub fn has_body(&self) -> bool {
        self.content
            .as_deref()
            .map(|c| !c.trim().is_empty())
            .unwrap_or(false)
            || self.attachment.is_some()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteMessagePayload {
    #[serde(rename = "_id")]
    pub id: String,
    pub group_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkSeenPayload {
    pub group_id: String,
    pub receiver_id: String,
    pub last_message_timestamp: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPayload {
    #[serde(default)]
    pub member_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStatusPayload {
    pub group_id: String,
}
