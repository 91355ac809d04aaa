use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::events::{PresenceStatus, ServerEvent};

pub type UserId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        ConnectionId(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity established once, at handshake time. Events are not re-verified
/// against it after that.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub id: UserId,
    pub phone_number: String,
}

/// A live connection: identity plus the outbound queue its writer task
/// drains. Sending never blocks; a send to a hung-up connection is dropped
/// and the disconnect path cleans the handle up.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub user: SessionUser,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(user: SessionUser, tx: mpsc::UnboundedSender<ServerEvent>) -> Self {
        ConnectionHandle {
            id: ConnectionId::new(),
            user,
            tx,
        }
    }

    pub fn send(&self, event: ServerEvent) {
        let _ = self.tx.send(event);
    }
}

/// Broadcast targets. Conversation channels are joined and left explicitly;
/// the user channel is maintained by the hub itself and always holds exactly
/// the connection the presence map points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Conversation(i64),
    User(UserId),
}

#[derive(Default)]
struct HubInner {
    connections: HashMap<ConnectionId, ConnectionHandle>,
    presence: HashMap<UserId, ConnectionId>,
    channels: HashMap<Channel, HashSet<ConnectionId>>,
}

impl HubInner {
    fn broadcast_all(&self, event: &ServerEvent) {
        for handle in self.connections.values() {
            handle.send(event.clone());
        }
    }

    fn broadcast_channel(
        &self,
        channel: Channel,
        event: &ServerEvent,
        exclude: Option<ConnectionId>,
    ) {
        let Some(members) = self.channels.get(&channel) else {
            return;
        };
        for conn_id in members {
            if Some(*conn_id) == exclude {
                continue;
            }
            if let Some(handle) = self.connections.get(conn_id) {
                handle.send(event.clone());
            }
        }
    }
}

/// Presence registry and channel router. The one piece of shared mutable
/// state touched from concurrent connection handlers; all sections under the
/// lock are await-free.
pub struct Hub {
    inner: RwLock<HubInner>,
}

impl Hub {
    pub fn new() -> Self {
        Hub {
            inner: RwLock::new(HubInner::default()),
        }
    }

    /// Register an authenticated connection. Replaces any previous mapping
    /// for the user (last connection wins), broadcasts the `online`
    /// transition to every connection, and returns the online-user snapshot
    /// for the `online_users` greeting.
    pub async fn register(&self, handle: ConnectionHandle) -> Vec<UserId> {
        let mut inner = self.inner.write().await;
        let user_id = handle.user.id;

        if let Some(previous) = inner.presence.insert(user_id, handle.id) {
            // Evict the superseded connection from the user channel so
            // notifications follow the newest device only.
            if let Some(members) = inner.channels.get_mut(&Channel::User(user_id)) {
                members.remove(&previous);
            }
        }

        inner
            .channels
            .entry(Channel::User(user_id))
            .or_default()
            .insert(handle.id);
        inner.connections.insert(handle.id, handle);

        let online: Vec<UserId> = inner.presence.keys().copied().collect();

        inner.broadcast_all(&ServerEvent::UserStatus {
            user_id,
            status: PresenceStatus::Online,
            last_seen: None,
        });

        tracing::debug!(user_id, "connection registered");
        online
    }

    /// Drop a connection. The presence mapping is removed only if it still
    /// points at this connection, so a stale disconnect arriving after a
    /// reconnect is a silent no-op. Returns the offline timestamp when the
    /// user actually went offline.
    pub async fn unregister(&self, conn_id: ConnectionId) -> Option<DateTime<Utc>> {
        let mut inner = self.inner.write().await;

        let handle = inner.connections.remove(&conn_id)?;
        for members in inner.channels.values_mut() {
            members.remove(&conn_id);
        }
        inner.channels.retain(|_, members| !members.is_empty());

        if inner.presence.get(&handle.user.id) != Some(&conn_id) {
            return None;
        }

        inner.presence.remove(&handle.user.id);
        let last_seen = Utc::now();
        inner.broadcast_all(&ServerEvent::UserStatus {
            user_id: handle.user.id,
            status: PresenceStatus::Offline,
            last_seen: Some(last_seen),
        });

        tracing::debug!(user_id = handle.user.id, "connection unregistered");
        Some(last_seen)
    }

    /// Join is trusted client intent; participation is not verified here.
    pub async fn join(&self, conn_id: ConnectionId, conversation_id: i64) {
        let mut inner = self.inner.write().await;
        if !inner.connections.contains_key(&conn_id) {
            return;
        }
        inner
            .channels
            .entry(Channel::Conversation(conversation_id))
            .or_default()
            .insert(conn_id);
    }

    pub async fn leave(&self, conn_id: ConnectionId, conversation_id: i64) {
        let mut inner = self.inner.write().await;
        let channel = Channel::Conversation(conversation_id);
        if let Some(members) = inner.channels.get_mut(&channel) {
            members.remove(&conn_id);
            if members.is_empty() {
                inner.channels.remove(&channel);
            }
        }
    }

    pub async fn broadcast_to_conversation(
        &self,
        conversation_id: i64,
        event: ServerEvent,
        exclude: Option<ConnectionId>,
    ) {
        let inner = self.inner.read().await;
        inner.broadcast_channel(Channel::Conversation(conversation_id), &event, exclude);
    }

    /// Out-of-room notification path; a no-op when the user is offline.
    pub async fn notify_user(&self, user_id: UserId, event: ServerEvent) {
        let inner = self.inner.read().await;
        inner.broadcast_channel(Channel::User(user_id), &event, None);
    }

    pub async fn lookup(&self, user_id: UserId) -> Option<ConnectionHandle> {
        let inner = self.inner.read().await;
        let conn_id = inner.presence.get(&user_id)?;
        inner.connections.get(conn_id).cloned()
    }

    pub async fn online_user_ids(&self) -> Vec<UserId> {
        let inner = self.inner.read().await;
        inner.presence.keys().copied().collect()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{drain, test_connection};

    #[tokio::test]
    async fn stale_disconnect_keeps_newer_registration() {
        let hub = Hub::new();
        let (old_conn, _old_rx) = test_connection(1);
        let (new_conn, _new_rx) = test_connection(1);
        let old_id = old_conn.id;
        let new_id = new_conn.id;

        hub.register(old_conn).await;
        hub.register(new_conn).await;

        // The older connection disconnects after the newer one registered.
        assert!(hub.unregister(old_id).await.is_none());
        assert_eq!(hub.lookup(1).await.map(|c| c.id), Some(new_id));
        assert_eq!(hub.online_user_ids().await, vec![1]);

        // The live connection's disconnect actually takes the user offline.
        assert!(hub.unregister(new_id).await.is_some());
        assert!(hub.lookup(1).await.is_none());
    }

    #[tokio::test]
    async fn register_broadcasts_online_and_returns_snapshot() {
        let hub = Hub::new();
        let (first, mut first_rx) = test_connection(1);
        let (second, _second_rx) = test_connection(2);

        let snapshot = hub.register(first).await;
        assert_eq!(snapshot, vec![1]);

        let mut snapshot = hub.register(second).await;
        snapshot.sort_unstable();
        assert_eq!(snapshot, vec![1, 2]);

        let events = drain(&mut first_rx);
        assert!(events.contains(&ServerEvent::UserStatus {
            user_id: 2,
            status: PresenceStatus::Online,
            last_seen: None,
        }));
    }

    #[tokio::test]
    async fn offline_broadcast_carries_last_seen() {
        let hub = Hub::new();
        let (going, _going_rx) = test_connection(1);
        let (watching, mut watching_rx) = test_connection(2);
        let going_id = going.id;

        hub.register(going).await;
        hub.register(watching).await;
        drain(&mut watching_rx);

        let last_seen = hub.unregister(going_id).await.expect("user went offline");

        let events = drain(&mut watching_rx);
        assert_eq!(
            events,
            vec![ServerEvent::UserStatus {
                user_id: 1,
                status: PresenceStatus::Offline,
                last_seen: Some(last_seen),
            }]
        );
    }

    #[tokio::test]
    async fn conversation_broadcast_respects_membership_and_exclusion() {
        let hub = Hub::new();
        let (a, mut a_rx) = test_connection(1);
        let (b, mut b_rx) = test_connection(2);
        let (c, mut c_rx) = test_connection(3);
        let (a_id, b_id) = (a.id, b.id);

        hub.register(a).await;
        hub.register(b).await;
        hub.register(c).await;
        hub.join(a_id, 42).await;
        hub.join(b_id, 42).await;
        drain(&mut a_rx);
        drain(&mut b_rx);
        drain(&mut c_rx);

        hub.broadcast_to_conversation(42, ServerEvent::ConversationCleared, Some(a_id))
            .await;

        assert!(drain(&mut a_rx).is_empty());
        assert_eq!(drain(&mut b_rx), vec![ServerEvent::ConversationCleared]);
        assert!(drain(&mut c_rx).is_empty());

        hub.leave(b_id, 42).await;
        hub.broadcast_to_conversation(42, ServerEvent::ConversationCleared, None)
            .await;
        assert!(drain(&mut b_rx).is_empty());
        assert_eq!(drain(&mut a_rx), vec![ServerEvent::ConversationCleared]);
    }

    #[tokio::test]
    async fn notify_user_reaches_only_latest_connection() {
        let hub = Hub::new();
        let (old_conn, mut old_rx) = test_connection(1);
        let (new_conn, mut new_rx) = test_connection(1);

        hub.register(old_conn).await;
        hub.register(new_conn).await;
        drain(&mut old_rx);
        drain(&mut new_rx);

        hub.notify_user(1, ServerEvent::CallEnded).await;

        assert!(drain(&mut old_rx).is_empty());
        assert_eq!(drain(&mut new_rx), vec![ServerEvent::CallEnded]);
    }

    #[tokio::test]
    async fn notify_offline_user_is_a_noop() {
        let hub = Hub::new();
        hub.notify_user(99, ServerEvent::CallEnded).await;
    }
}
