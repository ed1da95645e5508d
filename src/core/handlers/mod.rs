//! One handler per transaction type.
//!
//! Handlers write the projection through the open [`StoreTransaction`] and
//! return what should happen after commit as [`Effect`]s. A missing referenced
//! entity is reported as [`HandlerOutcome::Deferred`], never as an error.

mod comment;
mod counter;
mod group_info;
mod image;
mod post;
mod post_delete;
mod profile;

pub use comment::CommentHandler;
pub use counter::{CounterEvent, CounterHandler};
pub use group_info::GroupInfoHandler;
pub use image::ImageHandler;
pub use post::PostHandler;
pub use post_delete::PostDeleteHandler;
pub use profile::ProfileHandler;

use crate::config::DeletePolicy;
use crate::realtime::PushEvent;
use crate::storage::StoreTransaction;
use crate::types::content::{ContentItem, CounterKind, Payload};
use crate::types::models::Notification;
use crate::utils::error::Result;
use async_trait::async_trait;

/// The item being applied and the policies that govern it.
#[derive(Debug, Clone, Copy)]
pub struct TrxContext<'a> {
    pub group_id: &'a str,
    pub item: &'a ContentItem,
    pub delete_policy: DeletePolicy,
}

impl<'a> TrxContext<'a> {
    pub fn new(group_id: &'a str, item: &'a ContentItem, delete_policy: DeletePolicy) -> Self {
        Self {
            group_id,
            item,
            delete_policy,
        }
    }

    pub fn trx_id(&self) -> &'a str {
        &self.item.trx_id
    }

    /// The acting user.
    pub fn actor(&self) -> &'a str {
        &self.item.sender_pubkey
    }

    pub fn timestamp(&self) -> i64 {
        self.item.timestamp
    }

    /// Decides whether a change to something `owner` authored may proceed.
    pub(crate) fn permits_change(&self, owner: &str, target: &str) -> bool {
        if owner == self.actor() {
            return true;
        }
        match self.delete_policy {
            DeletePolicy::Permissive => {
                tracing::warn!(
                    group_id = self.group_id,
                    trx_id = self.trx_id(),
                    target,
                    owner,
                    actor = self.actor(),
                    "Change by non-author applied"
                );
                true
            }
            DeletePolicy::AuthorOnly => {
                tracing::warn!(
                    group_id = self.group_id,
                    trx_id = self.trx_id(),
                    target,
                    owner,
                    actor = self.actor(),
                    "Change by non-author dropped"
                );
                false
            }
        }
    }
}

/// Something to deliver once the transaction has committed.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Persisted with the transaction, then pushed to the recipient.
    Notify(Notification),
    /// Pushed to every connection of the group.
    Broadcast {
        group_id: String,
        event: PushEvent,
        payload: serde_json::Value,
    },
}

impl Effect {
    pub fn broadcast(group_id: &str, event: PushEvent, payload: serde_json::Value) -> Self {
        Effect::Broadcast {
            group_id: group_id.to_string(),
            event,
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    Applied(Vec<Effect>),
    /// `missing` names the trx id that has not been indexed yet.
    Deferred { missing: String },
}

impl HandlerOutcome {
    /// Applied with nothing to deliver.
    pub fn applied() -> Self {
        HandlerOutcome::Applied(Vec::new())
    }

    pub fn needs(missing: impl Into<String>) -> Self {
        HandlerOutcome::Deferred {
            missing: missing.into(),
        }
    }
}

#[async_trait]
pub trait ContentHandler<P: Sync>: Send + Sync {
    async fn apply(
        &self,
        payload: &P,
        ctx: &TrxContext<'_>,
        tx: &mut dyn StoreTransaction,
    ) -> Result<HandlerOutcome>;
}

/// Routes a classified payload to its handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct HandlerSet {
    post: PostHandler,
    post_delete: PostDeleteHandler,
    comment: CommentHandler,
    counter: CounterHandler,
    profile: ProfileHandler,
    image: ImageHandler,
    group_info: GroupInfoHandler,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn dispatch(
        &self,
        payload: &Payload,
        ctx: &TrxContext<'_>,
        tx: &mut dyn StoreTransaction,
    ) -> Result<HandlerOutcome> {
        match payload {
            Payload::Post(p) => self.post.apply(p, ctx, tx).await,
            Payload::PostDelete(p) => self.post_delete.apply(p, ctx, tx).await,
            Payload::Comment(p) => self.comment.apply(p, ctx, tx).await,
            Payload::Like(p) => {
                let event = CounterEvent::new(CounterKind::Like, &p.object_id);
                self.counter.apply(&event, ctx, tx).await
            }
            Payload::Dislike(p) => {
                let event = CounterEvent::new(CounterKind::Dislike, &p.object_id);
                self.counter.apply(&event, ctx, tx).await
            }
            Payload::Profile(p) => self.profile.apply(p, ctx, tx).await,
            Payload::Image(p) => self.image.apply(p, ctx, tx).await,
            Payload::GroupInfo(p) => self.group_info.apply(p, ctx, tx).await,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::storage::{MemoryStorage, StorageBackend};

    pub fn item(trx_id: &str, sender: &str, data: serde_json::Value) -> ContentItem {
        ContentItem {
            trx_id: trx_id.to_string(),
            group_id: "g".to_string(),
            sender_pubkey: sender.to_string(),
            data,
            timestamp: 1_000,
        }
    }

    /// Applies one payload in its own committed transaction.
    pub async fn apply(
        storage: &MemoryStorage,
        item: &ContentItem,
        policy: DeletePolicy,
    ) -> HandlerOutcome {
        let payload: Payload = serde_json::from_value(item.data.clone()).unwrap();
        let ctx = TrxContext::new("g", item, policy);
        let mut tx = storage.begin().await.unwrap();
        let outcome = HandlerSet::new()
            .dispatch(&payload, &ctx, tx.as_mut())
            .await
            .unwrap();
        if let HandlerOutcome::Applied(effects) = &outcome {
            let notifications: Vec<_> = effects
                .iter()
                .filter_map(|e| match e {
                    Effect::Notify(n) => Some(n.clone()),
                    Effect::Broadcast { .. } => None,
                })
                .collect();
            tx.insert_notifications(&notifications).await.unwrap();
        }
        tx.commit().await.unwrap();
        outcome
    }

    pub fn notifications(outcome: &HandlerOutcome) -> Vec<Notification> {
        match outcome {
            HandlerOutcome::Applied(effects) => effects
                .iter()
                .filter_map(|e| match e {
                    Effect::Notify(n) => Some(n.clone()),
                    Effect::Broadcast { .. } => None,
                })
                .collect(),
            HandlerOutcome::Deferred { .. } => Vec::new(),
        }
    }
}
