use super::{ContentHandler, Effect, HandlerOutcome, TrxContext};
use crate::realtime::PushEvent;
use crate::storage::StoreTransaction;
use crate::types::content::PostDeletePayload;
use crate::utils::error::Result;
use async_trait::async_trait;
use serde_json::json;

/// Soft-deletes a post. The row and its counters stay.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostDeleteHandler;

#[async_trait]
impl ContentHandler<PostDeletePayload> for PostDeleteHandler {
    async fn apply(
        &self,
        payload: &PostDeletePayload,
        ctx: &TrxContext<'_>,
        tx: &mut dyn StoreTransaction,
    ) -> Result<HandlerOutcome> {
        let Some(mut post) = tx.get_post(ctx.group_id, &payload.post_id).await? else {
            return Ok(HandlerOutcome::needs(&payload.post_id));
        };

        if !ctx.permits_change(&post.author_address, &post.trx_id) {
            return Ok(HandlerOutcome::applied());
        }
        if post.deleted {
            return Ok(HandlerOutcome::applied());
        }

        post.deleted = true;
        tx.update_post(&post).await?;

        Ok(HandlerOutcome::Applied(vec![Effect::broadcast(
            ctx.group_id,
            PushEvent::PostDelete,
            json!({ "trxId": post.trx_id, "deletedBy": ctx.actor() }),
        )]))
    }
}
