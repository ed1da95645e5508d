use super::{ContentHandler, Effect, HandlerOutcome, TrxContext};
use crate::storage::StoreTransaction;
use crate::types::content::CounterKind;
use crate::types::models::{
    Comment, Counter, Notification, NotificationStatus, NotificationType, ObjectType, Post,
    StackedCounter,
};
use crate::utils::error::Result;
use async_trait::async_trait;

/// A like or dislike on `object_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterEvent {
    pub kind: CounterKind,
    pub object_id: String,
}

impl CounterEvent {
    pub fn new(kind: CounterKind, object_id: impl Into<String>) -> Self {
        Self {
            kind,
            object_id: object_id.into(),
        }
    }
}

/// Applies likes and dislikes.
///
/// Posts keep independent like and dislike counters, each counted at most
/// once per user. On comments only likes count, and a dislike withdraws the
/// user's like if there is one.
#[derive(Debug, Default, Clone, Copy)]
pub struct CounterHandler;

enum Target {
    Post(Post),
    Comment(Comment),
}

#[async_trait]
impl ContentHandler<CounterEvent> for CounterHandler {
    async fn apply(
        &self,
        event: &CounterEvent,
        ctx: &TrxContext<'_>,
        tx: &mut dyn StoreTransaction,
    ) -> Result<HandlerOutcome> {
        let target = if let Some(comment) = tx.get_comment(ctx.group_id, &event.object_id).await? {
            Target::Comment(comment)
        } else if let Some(post) = tx.get_post(ctx.group_id, &event.object_id).await? {
            Target::Post(post)
        } else {
            return Ok(HandlerOutcome::needs(&event.object_id));
        };

        let object_type = match &target {
            Target::Post(_) => ObjectType::Post,
            Target::Comment(_) => ObjectType::Comment,
        };
        tx.insert_counter(&Counter {
            trx_id: ctx.trx_id().to_string(),
            group_id: ctx.group_id.to_string(),
            object_id: event.object_id.clone(),
            object_type,
            user_address: ctx.actor().to_string(),
            kind: event.kind,
            timestamp: ctx.timestamp(),
        })
        .await?;

        let actor = ctx.actor();
        let existing = tx
            .get_stacked_counter(ctx.group_id, &event.object_id, actor, event.kind)
            .await?;

        let owner = match target {
            Target::Post(mut post) => {
                if existing.is_some() {
                    return Ok(HandlerOutcome::applied());
                }
                tx.insert_stacked_counter(&stacked(ctx, event, object_type)).await?;
                match event.kind {
                    CounterKind::Like => post.like_count += 1,
                    CounterKind::Dislike => post.dislike_count += 1,
                }
                post.refresh_hot_score();
                tx.update_post(&post).await?;
                post.author_address
            }
            Target::Comment(mut comment) => match event.kind {
                CounterKind::Like => {
                    if existing.is_some() {
                        return Ok(HandlerOutcome::applied());
                    }
                    tx.insert_stacked_counter(&stacked(ctx, event, object_type)).await?;
                    comment.like_count += 1;
                    tx.update_comment(&comment).await?;
                    comment.author_address
                }
                CounterKind::Dislike => {
                    let like = tx
                        .get_stacked_counter(ctx.group_id, &event.object_id, actor, CounterKind::Like)
                        .await?;
                    if like.is_some() {
                        tx.delete_stacked_counter(
                            ctx.group_id,
                            &event.object_id,
                            actor,
                            CounterKind::Like,
                        )
                        .await?;
                        comment.like_count = (comment.like_count - 1).max(0);
                        tx.update_comment(&comment).await?;
                    }
                    return Ok(HandlerOutcome::applied());
                }
            },
        };

        if event.kind != CounterKind::Like || owner == actor {
            return Ok(HandlerOutcome::applied());
        }
        Ok(HandlerOutcome::Applied(vec![Effect::Notify(Notification {
            group_id: ctx.group_id.to_string(),
            to: owner,
            from: actor.to_string(),
            kind: NotificationType::Like,
            object_type,
            object_id: event.object_id.clone(),
            action_object_id: ctx.trx_id().to_string(),
            status: NotificationStatus::Unread,
            timestamp: ctx.timestamp(),
        })]))
    }
}

fn stacked(ctx: &TrxContext<'_>, event: &CounterEvent, object_type: ObjectType) -> StackedCounter {
    StackedCounter {
        group_id: ctx.group_id.to_string(),
        object_id: event.object_id.clone(),
        object_type,
        user_address: ctx.actor().to_string(),
        kind: event.kind,
        trx_id: ctx.trx_id().to_string(),
    }
}
