//! Process-wide registry of client connections.
//!
//! The socket server registers each accepted connection and pumps the returned
//! receiver into the socket; the indexer only ever sees [`RealtimeChannel`].
//! A connection has at most one group context at a time.

use crate::realtime::{PushEvent, PushMessage, RealtimeChannel};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::debug;

pub type ConnectionId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Context {
    group_id: String,
    user_address: Option<String>,
}

#[derive(Debug)]
struct Connection {
    sender: UnboundedSender<PushMessage>,
    context: Option<Context>,
}

#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Connection>,
    by_group: DashMap<String, Vec<ConnectionId>>,
    by_user: DashMap<(String, String), Vec<ConnectionId>>,
    id_counter: AtomicU64,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            by_group: DashMap::new(),
            by_user: DashMap::new(),
            id_counter: AtomicU64::new(1),
        }
    }

    /// Adds a connection with no group context yet.
    pub fn register(&self) -> (ConnectionId, UnboundedReceiver<PushMessage>) {
        let id = self.id_counter.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = unbounded_channel();
        self.connections.insert(
            id,
            Connection {
                sender,
                context: None,
            },
        );
        debug!(connection_id = id, "Registered connection");
        (id, receiver)
    }

    /// Binds the connection to `(user_address, group_id)`, replacing any
    /// previous context. Returns `false` for unknown connections.
    pub fn authenticate(&self, conn: ConnectionId, user_address: &str, group_id: &str) -> bool {
        self.set_context(
            conn,
            Context {
                group_id: group_id.to_string(),
                user_address: Some(user_address.to_string()),
            },
        )
    }

    /// Puts an anonymous connection into a group so it receives broadcasts.
    pub fn join_group(&self, conn: ConnectionId, group_id: &str) -> bool {
        self.set_context(
            conn,
            Context {
                group_id: group_id.to_string(),
                user_address: None,
            },
        )
    }

    /// Removes the connection. Its receiver sees the channel close.
    pub fn unregister(&self, conn: ConnectionId) -> bool {
        match self.connections.remove(&conn) {
            Some((_, connection)) => {
                if let Some(context) = connection.context {
                    self.detach(conn, &context);
                }
                debug!(connection_id = conn, "Unregistered connection");
                true
            }
            None => false,
        }
    }

    /// Connections authenticated as `user_address` in `group_id`.
    pub fn lookup(&self, group_id: &str, user_address: &str) -> Vec<ConnectionId> {
        self.by_user
            .get(&(group_id.to_string(), user_address.to_string()))
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }

    /// Connections in `group_id`, authenticated or not.
    pub fn group_members(&self, group_id: &str) -> Vec<ConnectionId> {
        self.by_group
            .get(group_id)
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn set_context(&self, conn: ConnectionId, context: Context) -> bool {
        let previous = match self.connections.get_mut(&conn) {
            Some(mut connection) => connection.context.replace(context.clone()),
            None => return false,
        };
        if let Some(previous) = previous {
            self.detach(conn, &previous);
        }
        self.attach(conn, &context);
        debug!(
            connection_id = conn,
            group_id = %context.group_id,
            user_address = context.user_address.as_deref().unwrap_or("-"),
            "Connection context set"
        );
        true
    }

    fn attach(&self, conn: ConnectionId, context: &Context) {
        self.by_group
            .entry(context.group_id.clone())
            .or_default()
            .push(conn);
        if let Some(user) = &context.user_address {
            self.by_user
                .entry((context.group_id.clone(), user.clone()))
                .or_default()
                .push(conn);
        }
    }

    fn detach(&self, conn: ConnectionId, context: &Context) {
        if let Some(mut ids) = self.by_group.get_mut(&context.group_id) {
            ids.retain(|id| *id != conn);
        }
        self.by_group
            .remove_if(&context.group_id, |_, ids| ids.is_empty());

        if let Some(user) = &context.user_address {
            let key = (context.group_id.clone(), user.clone());
            if let Some(mut ids) = self.by_user.get_mut(&key) {
                ids.retain(|id| *id != conn);
            }
            self.by_user.remove_if(&key, |_, ids| ids.is_empty());
        }
    }

    /// Sends to each id; evicts connections whose receiver is gone.
    fn deliver(&self, ids: Vec<ConnectionId>, message: PushMessage) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();
        for id in ids {
            let sent = self
                .connections
                .get(&id)
                .map(|connection| connection.sender.send(message.clone()).is_ok());
            match sent {
                Some(true) => delivered += 1,
                Some(false) => dead.push(id),
                None => {}
            }
        }
        for id in dead {
            debug!(connection_id = id, "Evicting closed connection");
            self.unregister(id);
        }
        delivered
    }
}

impl RealtimeChannel for ConnectionRegistry {
    fn send(
        &self,
        group_id: &str,
        user_address: &str,
        event: PushEvent,
        payload: serde_json::Value,
    ) -> usize {
        let ids = self.lookup(group_id, user_address);
        if ids.is_empty() {
            return 0;
        }
        self.deliver(ids, PushMessage { event, payload })
    }

    fn broadcast(&self, group_id: &str, event: PushEvent, payload: serde_json::Value) -> usize {
        let ids = self.group_members(group_id);
        if ids.is_empty() {
            return 0;
        }
        self.deliver(ids, PushMessage { event, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_send_reaches_only_the_authenticated_user() {
        let registry = ConnectionRegistry::new();
        let (alice, mut alice_rx) = registry.register();
        let (bob, mut bob_rx) = registry.register();
        assert!(registry.authenticate(alice, "alice", "g1"));
        assert!(registry.authenticate(bob, "bob", "g1"));

        let n = registry.send("g1", "alice", PushEvent::Notification, json!({"id": 1}));
        assert_eq!(n, 1);
        assert_eq!(alice_rx.try_recv().unwrap().event, PushEvent::Notification);
        assert!(bob_rx.try_recv().is_err());

        assert_eq!(registry.send("g2", "alice", PushEvent::Notification, json!({})), 0);
    }

    #[test]
    fn test_broadcast_includes_anonymous_members() {
        let registry = ConnectionRegistry::new();
        let (a, mut a_rx) = registry.register();
        let (b, mut b_rx) = registry.register();
        let (c, mut c_rx) = registry.register();
        registry.authenticate(a, "alice", "g1");
        registry.join_group(b, "g1");
        registry.join_group(c, "g2");

        assert_eq!(registry.broadcast("g1", PushEvent::Post, json!({"trxId": "p1"})), 2);
        assert!(a_rx.try_recv().is_ok());
        assert!(b_rx.try_recv().is_ok());
        assert!(c_rx.try_recv().is_err());
    }

    #[test]
    fn test_reauthenticating_moves_the_connection() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = registry.register();
        registry.authenticate(conn, "alice", "g1");
        registry.authenticate(conn, "alice", "g2");

        assert!(registry.lookup("g1", "alice").is_empty());
        assert_eq!(registry.lookup("g2", "alice"), vec![conn]);
        assert!(registry.group_members("g1").is_empty());
    }

    #[test]
    fn test_closed_receivers_are_evicted() {
        let registry = ConnectionRegistry::new();
        let (conn, rx) = registry.register();
        registry.authenticate(conn, "alice", "g1");
        drop(rx);

        assert_eq!(registry.send("g1", "alice", PushEvent::Notification, json!({})), 0);
        assert_eq!(registry.connection_count(), 0);
        assert!(registry.lookup("g1", "alice").is_empty());
    }

    #[test]
    fn test_unregister_unknown_connection() {
        let registry = ConnectionRegistry::new();
        assert!(!registry.unregister(42));
        assert!(!registry.authenticate(42, "alice", "g1"));
    }
}
