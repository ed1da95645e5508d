use super::{ContentHandler, Effect, HandlerOutcome, TrxContext};
use crate::realtime::PushEvent;
use crate::storage::StoreTransaction;
use crate::types::content::ProfilePayload;
use crate::types::models::Profile;
use crate::utils::error::Result;
use async_trait::async_trait;

/// Appends a profile version; the newest one is current.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProfileHandler;

#[async_trait]
impl ContentHandler<ProfilePayload> for ProfileHandler {
    async fn apply(
        &self,
        payload: &ProfilePayload,
        ctx: &TrxContext<'_>,
        tx: &mut dyn StoreTransaction,
    ) -> Result<HandlerOutcome> {
        let profile = Profile {
            trx_id: ctx.trx_id().to_string(),
            group_id: ctx.group_id.to_string(),
            user_address: ctx.actor().to_string(),
            name: payload.name.clone(),
            avatar: payload.avatar.clone(),
            timestamp: ctx.timestamp(),
        };
        tx.insert_profile(&profile).await?;

        Ok(HandlerOutcome::Applied(vec![Effect::broadcast(
            ctx.group_id,
            PushEvent::Profile,
            serde_json::to_value(&profile)?,
        )]))
    }
}
