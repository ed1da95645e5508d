use super::{ContentHandler, Effect, HandlerOutcome, TrxContext};
use crate::realtime::PushEvent;
use crate::storage::StoreTransaction;
use crate::types::content::PostPayload;
use crate::types::models::Post;
use crate::utils::error::Result;
use async_trait::async_trait;

/// Inserts a new post with zeroed counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostHandler;

#[async_trait]
impl ContentHandler<PostPayload> for PostHandler {
    async fn apply(
        &self,
        payload: &PostPayload,
        ctx: &TrxContext<'_>,
        tx: &mut dyn StoreTransaction,
    ) -> Result<HandlerOutcome> {
        let post = Post {
            trx_id: ctx.trx_id().to_string(),
            group_id: ctx.group_id.to_string(),
            title: payload.title.clone(),
            content: payload.content.clone(),
            author_address: ctx.actor().to_string(),
            timestamp: ctx.timestamp(),
            comment_count: 0,
            like_count: 0,
            dislike_count: 0,
            hot_score: 0,
            deleted: false,
        };
        tx.insert_post(&post).await?;

        Ok(HandlerOutcome::Applied(vec![Effect::broadcast(
            ctx.group_id,
            PushEvent::Post,
            serde_json::to_value(&post)?,
        )]))
    }
}
