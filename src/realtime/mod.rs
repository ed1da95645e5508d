//! Real-time delivery to connected clients.

pub mod registry;

use serde::{Deserialize, Serialize};

pub use registry::{ConnectionId, ConnectionRegistry};

/// Event name carried by every pushed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PushEvent {
    Notification,
    Post,
    PostDelete,
    Profile,
    GroupInfo,
    /// The group's feeds have been read to their end.
    GroupLoaded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    pub event: PushEvent,
    pub payload: serde_json::Value,
}

/// Outbound side of the socket layer, as seen by the indexer.
pub trait RealtimeChannel: Send + Sync {
    /// Delivers to every live connection authenticated as `user_address` in
    /// `group_id`. Returns the number of connections reached.
    fn send(
        &self,
        group_id: &str,
        user_address: &str,
        event: PushEvent,
        payload: serde_json::Value,
    ) -> usize;

    /// Delivers to every live connection in `group_id`.
    fn broadcast(&self, group_id: &str, event: PushEvent, payload: serde_json::Value) -> usize;
}
