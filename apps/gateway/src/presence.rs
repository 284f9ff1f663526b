//! Presence coordination: heartbeats, online status, and seen-state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

use crate::error::StoreError;
use crate::store::kv::PresenceStore;

/// How recently a heartbeat must have landed for a user to count as online.
/// Clients beat every [`HEARTBEAT_INTERVAL_MS`], so a healthy client can read
/// as away for up to 5 seconds at the end of each cycle.
pub const ONLINE_WINDOW_MS: i64 = 15_000;

/// Interval at which clients send `user.heartbeat` frames.
pub const HEARTBEAT_INTERVAL_MS: i64 = 20_000;

fn group_key(group_id: &str) -> String {
    format!("seen:group:{group_id}")
}

fn user_key(user_id: &str) -> String {
    format!("seen:user:{user_id}")
}

fn heartbeat_key(user_id: &str) -> String {
    format!("hb:{user_id}")
}

/// Computed status for a single user.
#[derive(Debug, Clone, PartialEq)]
pub enum UserStatus {
    Online,
    /// Not online; carries the last heartbeat time.
    LastSeen(DateTime<Utc>),
    /// No heartbeat on record.
    Unknown,
}

impl UserStatus {
    /// Wire rendering: `"online"`, an ISO-8601 timestamp, or `"offline"`.
    pub fn as_wire(&self) -> String {
        match self {
            UserStatus::Online => "online".to_string(),
            UserStatus::LastSeen(at) => at.to_rfc3339_opts(SecondsFormat::Millis, true),
            UserStatus::Unknown => "offline".to_string(),
        }
    }
}

fn status_from(last_heartbeat_ms: i64, now_ms: i64) -> UserStatus {
    if now_ms - last_heartbeat_ms <= ONLINE_WINDOW_MS {
        return UserStatus::Online;
    }
    match Utc.timestamp_millis_opt(last_heartbeat_ms).single() {
        Some(at) => UserStatus::LastSeen(at),
        None => UserStatus::Unknown,
    }
}

/// Translates raw heartbeat timestamps into online/offline semantics and
/// serves the per-group / per-user seen-state reads.
pub struct PresenceCoordinator {
    store: Arc<dyn PresenceStore>,
}

impl PresenceCoordinator {
    pub fn new(store: Arc<dyn PresenceStore>) -> Self {
        Self { store }
    }

    /// Record that `seen_by` has read group messages up to
    /// `last_message_timestamp` (ISO-8601).
    ///
    /// Writes both directions of the seen-map: the group's view of the user
    /// and the user's view of the group. The write is an unconditional
    /// overwrite; the stored value is the latest write, not the maximum
    /// timestamp.
    ///
    /// Returns `true` when the group-map entry changed.
    pub async fn record_seen(
        &self,
        group_id: &str,
        seen_by: &str,
        last_message_timestamp: &str,
    ) -> Result<bool, StoreError> {
        let ts = last_message_timestamp
            .parse::<DateTime<Utc>>()
            .map_err(|_| StoreError::new(format!("invalid timestamp: {last_message_timestamp}")))?;
        let iso = ts.to_rfc3339_opts(SecondsFormat::Millis, true);

        let changed = self.store.hset(&group_key(group_id), seen_by, &iso).await?;
        self.store.hset(&user_key(seen_by), group_id, &iso).await?;
        Ok(changed)
    }

    /// The group's seen-map: `userId → lastSeenTimestamp`.
    pub async fn group_status(&self, group_id: &str) -> Result<HashMap<String, String>, StoreError> {
        self.store.hget_all(&group_key(group_id)).await
    }

    /// The user's per-group seen-map: `groupId → lastSeenTimestamp`. Pushed to
    /// the client as the initial sync on connect.
    pub async fn user_status(&self, user_id: &str) -> Result<HashMap<String, String>, StoreError> {
        self.store.hget_all(&user_key(user_id)).await
    }

    /// Record a heartbeat for `user_id` at the current time.
    pub async fn record_heartbeat(&self, user_id: &str) -> Result<(), StoreError> {
        let now = Utc::now().timestamp_millis();
        self.store.set(&heartbeat_key(user_id), &now.to_string()).await
    }

    /// Compute `member_id`'s status from their last heartbeat.
    pub async fn member_status(&self, member_id: &str) -> Result<UserStatus, StoreError> {
        let Some(raw) = self.store.get(&heartbeat_key(member_id)).await? else {
            return Ok(UserStatus::Unknown);
        };
        let last_ms: i64 = raw
            .parse()
            .map_err(|_| StoreError::new("corrupt heartbeat value"))?;
        Ok(status_from(last_ms, Utc::now().timestamp_millis()))
    }

    /// Whether a message created at `message_ts` has been seen by every one of
    /// the group's `member_count` members.
    pub async fn read_by_all(
        &self,
        group_id: &str,
        message_ts: DateTime<Utc>,
        member_count: usize,
    ) -> Result<bool, StoreError> {
        if member_count == 0 {
            return Ok(false);
        }
        let status = self.group_status(group_id).await?;
        let seen = status
            .values()
            .filter_map(|v| v.parse::<DateTime<Utc>>().ok())
            .filter(|seen_at| *seen_at >= message_ts)
            .count();
        Ok(seen == member_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::kv::MemoryStore;

    fn coordinator() -> PresenceCoordinator {
        PresenceCoordinator::new(Arc::new(MemoryStore::new()))
    }

    const T1: &str = "2026-02-01T10:00:00.000Z";
    const T2: &str = "2026-02-01T10:05:00.000Z";

    #[tokio::test]
    async fn record_seen_updates_both_directions() {
        let presence = coordinator();
        let changed = presence.record_seen("grp_1", "usr_a", T1).await.unwrap();
        assert!(changed);

        let group = presence.group_status("grp_1").await.unwrap();
        assert_eq!(group.get("usr_a").map(String::as_str), Some(T1));

        let user = presence.user_status("usr_a").await.unwrap();
        assert_eq!(user.get("grp_1").map(String::as_str), Some(T1));
    }

    #[tokio::test]
    async fn repeated_seen_with_same_timestamp_reports_no_change() {
        let presence = coordinator();
        assert!(presence.record_seen("grp_1", "usr_a", T1).await.unwrap());
        assert!(!presence.record_seen("grp_1", "usr_a", T1).await.unwrap());
    }

    #[tokio::test]
    async fn seen_overwrite_is_last_write_wins() {
        let presence = coordinator();
        presence.record_seen("grp_1", "usr_a", T1).await.unwrap();
        presence.record_seen("grp_1", "usr_a", T2).await.unwrap();

        let group = presence.group_status("grp_1").await.unwrap();
        assert_eq!(group.get("usr_a").map(String::as_str), Some(T2));

        // An out-of-order write regresses the stored value. Overwrite is
        // unconditional; there is no max() comparison.
        presence.record_seen("grp_1", "usr_a", T1).await.unwrap();
        let group = presence.group_status("grp_1").await.unwrap();
        assert_eq!(group.get("usr_a").map(String::as_str), Some(T1));
    }

    #[tokio::test]
    async fn invalid_seen_timestamp_is_rejected() {
        let presence = coordinator();
        assert!(presence.record_seen("grp_1", "usr_a", "whenever").await.is_err());
    }

    #[test]
    fn online_window_boundary() {
        let t = 1_750_000_000_000i64;
        assert_eq!(status_from(t, t + 14_999), UserStatus::Online);
        // The boundary itself is inclusive.
        assert_eq!(status_from(t, t + 15_000), UserStatus::Online);
        assert!(matches!(
            status_from(t, t + 15_001),
            UserStatus::LastSeen(_)
        ));
    }

    #[tokio::test]
    async fn member_status_reflects_heartbeats() {
        let presence = coordinator();
        assert_eq!(
            presence.member_status("usr_b").await.unwrap(),
            UserStatus::Unknown
        );

        presence.record_heartbeat("usr_b").await.unwrap();
        assert_eq!(
            presence.member_status("usr_b").await.unwrap(),
            UserStatus::Online
        );
    }

    #[tokio::test]
    async fn stale_heartbeat_renders_last_seen_timestamp() {
        let store = Arc::new(MemoryStore::new());
        let presence = PresenceCoordinator::new(store.clone());

        let stale = Utc::now().timestamp_millis() - 60_000;
        store.set("hb:usr_b", &stale.to_string()).await.unwrap();

        let status = presence.member_status("usr_b").await.unwrap();
        match status {
            UserStatus::LastSeen(at) => assert_eq!(at.timestamp_millis(), stale),
            other => panic!("expected LastSeen, got {other:?}"),
        }
        assert!(status.as_wire().ends_with('Z'));
    }

    #[tokio::test]
    async fn read_by_all_requires_every_member() {
        let presence = coordinator();
        let message_ts = T1.parse::<DateTime<Utc>>().unwrap();

        presence.record_seen("grp_1", "usr_a", T2).await.unwrap();
        assert!(!presence.read_by_all("grp_1", message_ts, 2).await.unwrap());

        presence.record_seen("grp_1", "usr_b", T2).await.unwrap();
        assert!(presence.read_by_all("grp_1", message_ts, 2).await.unwrap());

        // A member who saw the group before the message doesn't count.
        presence.record_seen("grp_1", "usr_b", "2026-02-01T09:00:00.000Z").await.unwrap();
        assert!(!presence.read_by_all("grp_1", message_ts, 2).await.unwrap());
    }

    #[test]
    fn wire_rendering() {
        assert_eq!(UserStatus::Online.as_wire(), "online");
        assert_eq!(UserStatus::Unknown.as_wire(), "offline");
    }
}
