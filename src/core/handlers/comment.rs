use super::{ContentHandler, Effect, HandlerOutcome, TrxContext};
use crate::storage::StoreTransaction;
use crate::types::content::{CommentAction, CommentPayload};
use crate::types::models::{
    Comment, Notification, NotificationStatus, NotificationType, ObjectType, Post,
};
use crate::utils::error::Result;
use async_trait::async_trait;

/// Creates, edits and deletes comments.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommentHandler;

#[async_trait]
impl ContentHandler<CommentPayload> for CommentHandler {
    async fn apply(
        &self,
        payload: &CommentPayload,
        ctx: &TrxContext<'_>,
        tx: &mut dyn StoreTransaction,
    ) -> Result<HandlerOutcome> {
        match payload.action() {
            CommentAction::Create => create(payload, ctx, tx).await,
            CommentAction::Update { target } => update(target, &payload.content, ctx, tx).await,
            CommentAction::Delete { target } => delete(target, ctx, tx).await,
        }
    }
}

fn notification(
    ctx: &TrxContext<'_>,
    to: &str,
    object_type: ObjectType,
    object_id: &str,
) -> Effect {
    Effect::Notify(Notification {
        group_id: ctx.group_id.to_string(),
        to: to.to_string(),
        from: ctx.actor().to_string(),
        kind: NotificationType::Comment,
        object_type,
        object_id: object_id.to_string(),
        action_object_id: ctx.trx_id().to_string(),
        status: NotificationStatus::Unread,
        timestamp: ctx.timestamp(),
    })
}

async fn create(
    payload: &CommentPayload,
    ctx: &TrxContext<'_>,
    tx: &mut dyn StoreTransaction,
) -> Result<HandlerOutcome> {
    let Some(mut post) = tx.get_post(ctx.group_id, &payload.object_id).await? else {
        return Ok(HandlerOutcome::needs(&payload.object_id));
    };

    let mut thread = match &payload.thread_id {
        Some(id) => match tx.get_comment(ctx.group_id, id).await? {
            Some(comment) => Some(comment),
            None => return Ok(HandlerOutcome::needs(id)),
        },
        None => None,
    };

    let reply = match &payload.reply_id {
        Some(id) if thread.as_ref().is_some_and(|t| &t.trx_id == id) => thread.clone(),
        Some(id) => match tx.get_comment(ctx.group_id, id).await? {
            Some(comment) => Some(comment),
            None => return Ok(HandlerOutcome::needs(id)),
        },
        None => None,
    };

    // A reply without an explicit thread belongs to the thread of its parent.
    if thread.is_none() {
        if let Some(parent) = &reply {
            let root_id = parent.thread_id.as_deref().unwrap_or(&parent.trx_id);
            match tx.get_comment(ctx.group_id, root_id).await? {
                Some(root) => thread = Some(root),
                None => return Ok(HandlerOutcome::needs(root_id)),
            }
        }
    }

    let comment = Comment {
        trx_id: ctx.trx_id().to_string(),
        group_id: ctx.group_id.to_string(),
        post_id: post.trx_id.clone(),
        thread_id: thread.as_ref().map(|t| t.trx_id.clone()),
        reply_id: reply.as_ref().map(|r| r.trx_id.clone()),
        author_address: ctx.actor().to_string(),
        content: payload.content.clone(),
        timestamp: ctx.timestamp(),
        comment_count: 0,
        like_count: 0,
        dislike_count: 0,
    };
    tx.insert_comment(&comment).await?;

    post.comment_count += 1;
    post.refresh_hot_score();
    tx.update_post(&post).await?;

    if let Some(root) = thread.as_mut() {
        root.comment_count += 1;
        tx.update_comment(root).await?;
    }

    let actor = ctx.actor();
    let mut effects = Vec::new();
    match (&thread, &reply) {
        (None, _) => {
            if post.author_address != actor {
                effects.push(notification(ctx, &post.author_address, ObjectType::Post, &post.trx_id));
            }
        }
        (Some(root), target) => {
            let target = target.as_ref().unwrap_or(root);
            if target.author_address != actor {
                effects.push(notification(
                    ctx,
                    &target.author_address,
                    ObjectType::Comment,
                    &target.trx_id,
                ));
            }
            if target.trx_id != root.trx_id
                && root.author_address != target.author_address
                && root.author_address != actor
            {
                effects.push(notification(
                    ctx,
                    &root.author_address,
                    ObjectType::Comment,
                    &root.trx_id,
                ));
            }
        }
    }

    Ok(HandlerOutcome::Applied(effects))
}

async fn update(
    target: &str,
    content: &str,
    ctx: &TrxContext<'_>,
    tx: &mut dyn StoreTransaction,
) -> Result<HandlerOutcome> {
    let Some(mut comment) = tx.get_comment(ctx.group_id, target).await? else {
        return Ok(HandlerOutcome::needs(target));
    };
    if !ctx.permits_change(&comment.author_address, target) {
        return Ok(HandlerOutcome::applied());
    }

    comment.content = content.to_string();
    tx.update_comment(&comment).await?;
    Ok(HandlerOutcome::applied())
}

async fn delete(
    target: &str,
    ctx: &TrxContext<'_>,
    tx: &mut dyn StoreTransaction,
) -> Result<HandlerOutcome> {
    let Some(comment) = tx.get_comment(ctx.group_id, target).await? else {
        return Ok(HandlerOutcome::needs(target));
    };
    if !ctx.permits_change(&comment.author_address, target) {
        return Ok(HandlerOutcome::applied());
    }

    tx.delete_comment(ctx.group_id, target).await?;
    tx.delete_notifications_for_object(ctx.group_id, target).await?;
    tx.delete_counters_for_object(ctx.group_id, target).await?;

    if let Some(post) = tx.get_post(ctx.group_id, &comment.post_id).await? {
        recount_post(post, tx).await?;
    }
    if let Some(thread_id) = &comment.thread_id {
        if let Some(mut root) = tx.get_comment(ctx.group_id, thread_id).await? {
            root.comment_count = tx.count_thread_comments(ctx.group_id, thread_id).await?;
            tx.update_comment(&root).await?;
        }
    }

    Ok(HandlerOutcome::applied())
}

async fn recount_post(mut post: Post, tx: &mut dyn StoreTransaction) -> Result<()> {
    post.comment_count = tx.count_post_comments(&post.group_id, &post.trx_id).await?;
    post.refresh_hot_score();
    tx.update_post(&post).await
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{apply, item, notifications};
    use super::*;
    use crate::config::DeletePolicy;
    use crate::storage::{MemoryStorage, StorageBackend};
    use serde_json::json;

    const P: DeletePolicy = DeletePolicy::Permissive;

    async fn with_post(author: &str) -> MemoryStorage {
        let storage = MemoryStorage::new();
        let post = item("p1", author, json!({"type": "post", "title": "A", "content": "b"}));
        apply(&storage, &post, P).await;
        storage
    }

    fn comment(trx: &str, from: &str, extra: serde_json::Value) -> crate::types::content::ContentItem {
        let mut data = json!({"type": "comment", "objectId": "p1", "content": "hi"});
        if let (Some(obj), Some(extra)) = (data.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                obj.insert(k.clone(), v.clone());
            }
        }
        item(trx, from, data)
    }

    #[tokio::test]
    async fn test_top_level_comment_counts_and_notifies_post_author() {
        let storage = with_post("alice").await;
        let outcome = apply(&storage, &comment("c1", "bob", json!({})), P).await;

        let sent = notifications(&outcome);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "alice");
        assert_eq!(sent[0].object_type, ObjectType::Post);
        assert_eq!(sent[0].action_object_id, "c1");

        let mut tx = storage.begin().await.unwrap();
        let post = tx.get_post("g", "p1").await.unwrap().unwrap();
        assert_eq!(post.comment_count, 1);
        assert_eq!(post.hot_score, 1);
    }

    #[tokio::test]
    async fn test_no_notification_on_own_post() {
        let storage = with_post("alice").await;
        let outcome = apply(&storage, &comment("c1", "alice", json!({})), P).await;
        assert!(notifications(&outcome).is_empty());
    }

    #[tokio::test]
    async fn test_missing_post_or_thread_defers() {
        let storage = MemoryStorage::new();
        let outcome = apply(&storage, &comment("c1", "bob", json!({})), P).await;
        assert_eq!(outcome, HandlerOutcome::needs("p1"));

        let storage = with_post("alice").await;
        let outcome = apply(&storage, &comment("c2", "bob", json!({"threadId": "c1"})), P).await;
        assert_eq!(outcome, HandlerOutcome::needs("c1"));
    }

    #[tokio::test]
    async fn test_nested_reply_notifies_target_and_thread_root() {
        let storage = with_post("alice").await;
        apply(&storage, &comment("c1", "bob", json!({})), P).await;
        apply(&storage, &comment("c2", "carol", json!({"threadId": "c1"})), P).await;

        let outcome = apply(
            &storage,
            &comment("c3", "dave", json!({"threadId": "c1", "replyId": "c2"})),
            P,
        )
        .await;
        let mut recipients: Vec<_> = notifications(&outcome).into_iter().map(|n| n.to).collect();
        recipients.sort();
        assert_eq!(recipients, vec!["bob", "carol"]);

        let mut tx = storage.begin().await.unwrap();
        assert_eq!(tx.get_comment("g", "c1").await.unwrap().unwrap().comment_count, 2);
        assert_eq!(tx.get_post("g", "p1").await.unwrap().unwrap().comment_count, 3);
        let c3 = tx.get_comment("g", "c3").await.unwrap().unwrap();
        assert_eq!(c3.thread_id.as_deref(), Some("c1"));
        assert_eq!(c3.reply_id.as_deref(), Some("c2"));
    }

    #[tokio::test]
    async fn test_reply_without_thread_joins_parent_thread() {
        let storage = with_post("alice").await;
        apply(&storage, &comment("c1", "bob", json!({})), P).await;
        apply(&storage, &comment("c2", "carol", json!({"replyId": "c1"})), P).await;

        let mut tx = storage.begin().await.unwrap();
        let c2 = tx.get_comment("g", "c2").await.unwrap().unwrap();
        assert_eq!(c2.thread_id.as_deref(), Some("c1"));
        assert_eq!(tx.get_comment("g", "c1").await.unwrap().unwrap().comment_count, 1);
    }

    #[tokio::test]
    async fn test_update_overwrites_content() {
        let storage = with_post("alice").await;
        apply(&storage, &comment("c1", "bob", json!({})), P).await;
        let outcome = apply(
            &storage,
            &comment("u1", "bob", json!({"updatedTrxId": "c1", "content": "edited"})),
            P,
        )
        .await;
        assert_eq!(outcome, HandlerOutcome::applied());

        let mut tx = storage.begin().await.unwrap();
        let c1 = tx.get_comment("g", "c1").await.unwrap().unwrap();
        assert_eq!(c1.content, "edited");
        assert_eq!(tx.get_post("g", "p1").await.unwrap().unwrap().comment_count, 1);
    }

    #[tokio::test]
    async fn test_delete_cascades_and_recounts() {
        let storage = with_post("alice").await;
        apply(&storage, &comment("c1", "bob", json!({})), P).await;
        apply(&storage, &comment("c2", "carol", json!({"threadId": "c1"})), P).await;
        apply(
            &storage,
            &item("l1", "alice", json!({"type": "like", "objectId": "c2"})),
            P,
        )
        .await;

        apply(&storage, &comment("d1", "carol", json!({"deletedTrxId": "c2"})), P).await;

        let state = storage.snapshot().await;
        assert!(!state.comments.contains_key(&("g".to_string(), "c2".to_string())));
        assert!(state.notifications.iter().all(|n| n.object_id != "c2" && n.action_object_id != "c2"));
        assert!(state.counters.iter().all(|c| c.object_id != "c2"));
        assert!(state.stacked_counters.iter().all(|s| s.object_id != "c2"));

        let mut tx = storage.begin().await.unwrap();
        assert_eq!(tx.get_post("g", "p1").await.unwrap().unwrap().comment_count, 1);
        assert_eq!(tx.get_comment("g", "c1").await.unwrap().unwrap().comment_count, 0);
    }

    #[tokio::test]
    async fn test_foreign_delete_dropped_under_author_only() {
        let storage = with_post("alice").await;
        apply(&storage, &comment("c1", "bob", json!({})), P).await;
        apply(
            &storage,
            &comment("d1", "mallory", json!({"deletedTrxId": "c1"})),
            DeletePolicy::AuthorOnly,
        )
        .await;

        let mut tx = storage.begin().await.unwrap();
        assert!(tx.get_comment("g", "c1").await.unwrap().is_some());
    }
}
