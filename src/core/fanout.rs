//! Post-commit delivery of handler effects.
//!
//! Effects are queued as their transactions commit and pushed when the queue
//! is flushed. Nothing is queued for a transaction that rolled back.

use crate::core::handlers::Effect;
use crate::realtime::{PushEvent, RealtimeChannel};
use std::sync::Arc;

pub struct FanoutQueue {
    channel: Arc<dyn RealtimeChannel>,
    queue: Vec<Effect>,
}

impl FanoutQueue {
    pub fn new(channel: Arc<dyn RealtimeChannel>) -> Self {
        Self {
            channel,
            queue: Vec::new(),
        }
    }

    /// Queues effects of a committed transaction.
    pub fn push(&mut self, effects: Vec<Effect>) {
        self.queue.extend(effects);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Pushes everything queued, in order. Returns the number of connection
    /// deliveries made.
    pub fn flush(&mut self) -> usize {
        let mut delivered = 0;
        for effect in self.queue.drain(..) {
            match effect {
                Effect::Notify(notification) => match serde_json::to_value(&notification) {
                    Ok(payload) => {
                        delivered += self.channel.send(
                            &notification.group_id,
                            &notification.to,
                            PushEvent::Notification,
                            payload,
                        );
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Could not encode notification for push");
                    }
                },
                Effect::Broadcast {
                    group_id,
                    event,
                    payload,
                } => {
                    delivered += self.channel.broadcast(&group_id, event, payload);
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::ConnectionRegistry;
    use crate::types::models::{Notification, NotificationStatus, NotificationType, ObjectType};
    use serde_json::json;

    fn notify(to: &str) -> Effect {
        Effect::Notify(Notification {
            group_id: "g".into(),
            to: to.into(),
            from: "bob".into(),
            kind: NotificationType::Like,
            object_type: ObjectType::Post,
            object_id: "p1".into(),
            action_object_id: "l1".into(),
            status: NotificationStatus::Unread,
            timestamp: 1,
        })
    }

    #[test]
    fn test_nothing_is_sent_before_flush() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (conn, mut rx) = registry.register();
        registry.authenticate(conn, "alice", "g");

        let mut fanout = FanoutQueue::new(registry.clone());
        fanout.push(vec![
            notify("alice"),
            notify("carol"),
            Effect::broadcast("g", PushEvent::Post, json!({"trxId": "p2"})),
        ]);
        assert_eq!(fanout.len(), 3);
        assert!(rx.try_recv().is_err());

        assert_eq!(fanout.flush(), 2);
        assert!(fanout.is_empty());

        let first = rx.try_recv().unwrap();
        assert_eq!(first.event, PushEvent::Notification);
        assert_eq!(first.payload["to"], "alice");
        assert_eq!(rx.try_recv().unwrap().event, PushEvent::Post);
    }
}
