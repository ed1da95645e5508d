use super::{ContentHandler, Effect, HandlerOutcome, TrxContext};
use crate::realtime::PushEvent;
use crate::storage::StoreTransaction;
use crate::types::content::GroupInfoPayload;
use crate::types::models::GroupInfo;
use crate::utils::error::Result;
use async_trait::async_trait;

/// Keeps the group's name, description and avatar, newest wins.
#[derive(Debug, Default, Clone, Copy)]
pub struct GroupInfoHandler;

#[async_trait]
impl ContentHandler<GroupInfoPayload> for GroupInfoHandler {
    async fn apply(
        &self,
        payload: &GroupInfoPayload,
        ctx: &TrxContext<'_>,
        tx: &mut dyn StoreTransaction,
    ) -> Result<HandlerOutcome> {
        let info = GroupInfo {
            group_id: ctx.group_id.to_string(),
            name: payload.name.clone(),
            desc: payload.desc.clone(),
            avatar: payload.avatar.clone(),
            trx_id: ctx.trx_id().to_string(),
            updated_by: ctx.actor().to_string(),
            timestamp: ctx.timestamp(),
        };
        tx.upsert_group_info(&info).await?;

        let current = tx.group_info(ctx.group_id).await?;
        Ok(HandlerOutcome::Applied(vec![Effect::broadcast(
            ctx.group_id,
            PushEvent::GroupInfo,
            serde_json::to_value(current.as_ref().unwrap_or(&info))?,
        )]))
    }
}
