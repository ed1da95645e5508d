//! Per-item transaction boundary.
//!
//! Every item is applied in exactly one storage transaction that covers the
//! ledger check, the handler's writes, notification rows, the ledger record,
//! the cursor move and pending-queue bookkeeping. Either all of it commits or
//! none of it does.

use crate::config::{DeletePolicy, PendingConfig};
use crate::core::classifier::{Classification, classify};
use crate::core::handlers::{Effect, HandlerOutcome, HandlerSet, TrxContext};
use crate::core::metrics::IndexerMetrics;
use crate::storage::{StorageBackend, StoreTransaction};
use crate::types::content::{ContentItem, StreamRole, TrxType};
use crate::types::models::{DeadLetter, DeadLetterReason, Notification, PendingContent, StatusUpdate};
use crate::utils::error::Result;
use std::sync::Arc;

/// What became of one item.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyResult {
    /// Committed; effects are ready for fan-out.
    Applied(Vec<Effect>),
    /// Waiting in the pending queue for `missing`.
    Deferred { missing: String },
    /// Already in the ledger.
    Duplicate,
    /// Dropped by classification.
    Invalid(String),
    /// Moved out of the pending queue into dead letters.
    DeadLettered,
}

pub struct TransactionCoordinator {
    storage: Arc<dyn StorageBackend>,
    handlers: HandlerSet,
    delete_policy: DeletePolicy,
    pending: PendingConfig,
    metrics: Arc<IndexerMetrics>,
}

async fn rollback_quietly(tx: Box<dyn StoreTransaction>) {
    if let Err(e) = tx.rollback().await {
        tracing::warn!(error = %e, "Rollback failed");
    }
}

/// Bulk-inserts the notifications among `effects`.
async fn persist_notifications(tx: &mut dyn StoreTransaction, effects: &[Effect]) -> Result<()> {
    let notifications: Vec<Notification> = effects
        .iter()
        .filter_map(|effect| match effect {
            Effect::Notify(n) => Some(n.clone()),
            Effect::Broadcast { .. } => None,
        })
        .collect();
    tx.insert_notifications(&notifications).await
}

impl TransactionCoordinator {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        delete_policy: DeletePolicy,
        pending: PendingConfig,
        metrics: Arc<IndexerMetrics>,
    ) -> Self {
        Self {
            storage,
            handlers: HandlerSet::new(),
            delete_policy,
            pending,
            metrics,
        }
    }

    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    /// Applies an item freshly read from `role`'s feed and moves that
    /// role's cursor to it.
    pub async fn apply_new(
        &self,
        group_id: &str,
        role: StreamRole,
        item: &ContentItem,
    ) -> Result<ApplyResult> {
        let classification = classify(item);
        let trx_type = match &classification {
            Classification::Valid(c) => Some(c.trx_type),
            Classification::Invalid(_) => None,
        };

        let mut tx = self.storage.begin().await?;
        let result = match self
            .apply_new_in(tx.as_mut(), group_id, role, item, classification)
            .await
        {
            Ok(result) => tx.commit().await.map(|()| result),
            Err(e) => {
                rollback_quietly(tx).await;
                Err(e)
            }
        };

        match (&result, trx_type) {
            (Ok(ApplyResult::Applied(_)), Some(t)) => self.metrics.inc_applied(t),
            (Ok(ApplyResult::Deferred { missing }), Some(t)) => {
                tracing::debug!(group_id, trx_id = %item.trx_id, %role, missing, "Deferred");
                self.metrics.inc_deferred(t);
            }
            (Ok(ApplyResult::Duplicate), _) => self.metrics.inc_duplicate(),
            (Ok(ApplyResult::Invalid(reason)), _) => {
                tracing::warn!(group_id, trx_id = %item.trx_id, %role, reason, "Dropped invalid content");
                self.metrics.inc_invalid();
            }
            (Err(_), Some(t)) => self.metrics.inc_failed(t),
            _ => {}
        }
        result
    }

    async fn apply_new_in(
        &self,
        tx: &mut dyn StoreTransaction,
        group_id: &str,
        role: StreamRole,
        item: &ContentItem,
        classification: Classification,
    ) -> Result<ApplyResult> {
        let cursor = StatusUpdate::cursor(role, &item.trx_id);

        if tx.is_applied(group_id, &item.trx_id).await? {
            tx.update_group_status(group_id, &cursor).await?;
            return Ok(ApplyResult::Duplicate);
        }

        let classified = match classification {
            Classification::Valid(classified) => classified,
            Classification::Invalid(reason) => {
                tx.update_group_status(group_id, &cursor).await?;
                return Ok(ApplyResult::Invalid(reason));
            }
        };

        let ctx = TrxContext::new(group_id, item, self.delete_policy);
        let result = match self.handlers.dispatch(&classified.payload, &ctx, tx).await? {
            HandlerOutcome::Applied(effects) => {
                persist_notifications(tx, &effects).await?;
                tx.record_applied(group_id, &item.trx_id).await?;
                ApplyResult::Applied(effects)
            }
            HandlerOutcome::Deferred { missing } => {
                let raw = serde_json::to_value(item)?;
                tx.enqueue_pending(group_id, &item.trx_id, role, &raw).await?;
                ApplyResult::Deferred { missing }
            }
        };
        tx.update_group_status(group_id, &cursor).await?;
        Ok(result)
    }

    /// Retries a pending item. Cursors are left alone.
    pub async fn apply_pending(&self, pending: &PendingContent) -> Result<ApplyResult> {
        let mut tx = self.storage.begin().await?;
        let result = match self.apply_pending_in(tx.as_mut(), pending).await {
            Ok(result) => tx.commit().await.map(|()| result),
            Err(e) => {
                rollback_quietly(tx).await;
                Err(e)
            }
        };

        match &result {
            Ok((ApplyResult::Applied(_), Some(t))) => {
                self.metrics.inc_applied(*t);
                self.metrics.inc_pending_resolved();
            }
            Ok((ApplyResult::Duplicate, _)) => self.metrics.inc_duplicate(),
            Ok((ApplyResult::Invalid(_), _)) => self.metrics.inc_invalid(),
            Ok((ApplyResult::DeadLettered, _)) => {
                tracing::warn!(
                    group_id = %pending.group_id,
                    trx_id = %pending.trx_id,
                    "Pending content moved to dead letters"
                );
                self.metrics.inc_dead_lettered();
            }
            _ => {}
        }
        result.map(|(result, _)| result)
    }

    async fn apply_pending_in(
        &self,
        tx: &mut dyn StoreTransaction,
        pending: &PendingContent,
    ) -> Result<(ApplyResult, Option<TrxType>)> {
        let group_id = pending.group_id.as_str();

        let item: ContentItem = match serde_json::from_value(pending.raw_content.clone()) {
            Ok(item) => item,
            Err(e) => {
                self.dead_letter(tx, pending, DeadLetterReason::Undecodable, Some(e.to_string()))
                    .await?;
                return Ok((ApplyResult::DeadLettered, None));
            }
        };

        if tx.is_applied(group_id, &item.trx_id).await? {
            tx.remove_pending(pending.id).await?;
            return Ok((ApplyResult::Duplicate, None));
        }

        let classified = match classify(&item) {
            Classification::Valid(classified) => classified,
            Classification::Invalid(reason) => {
                tx.remove_pending(pending.id).await?;
                return Ok((ApplyResult::Invalid(reason), None));
            }
        };
        let trx_type = Some(classified.trx_type);

        let ctx = TrxContext::new(group_id, &item, self.delete_policy);
        match self.handlers.dispatch(&classified.payload, &ctx, tx).await? {
            HandlerOutcome::Applied(effects) => {
                persist_notifications(tx, &effects).await?;
                tx.record_applied(group_id, &item.trx_id).await?;
                tx.remove_pending(pending.id).await?;
                Ok((ApplyResult::Applied(effects), trx_type))
            }
            HandlerOutcome::Deferred { missing } => {
                let attempts = tx.bump_pending_attempts(pending.id).await?;
                let exhausted = self
                    .pending
                    .max_attempts
                    .is_some_and(|max| i64::from(attempts) >= i64::from(max));
                if exhausted {
                    self.dead_letter(
                        tx,
                        pending,
                        DeadLetterReason::DependencyUnresolved,
                        Some(format!("missing {missing} after {attempts} attempts")),
                    )
                    .await?;
                    return Ok((ApplyResult::DeadLettered, trx_type));
                }
                Ok((ApplyResult::Deferred { missing }, trx_type))
            }
        }
    }

    async fn dead_letter(
        &self,
        tx: &mut dyn StoreTransaction,
        pending: &PendingContent,
        reason: DeadLetterReason,
        error: Option<String>,
    ) -> Result<()> {
        tx.insert_dead_letter(&DeadLetter {
            group_id: pending.group_id.clone(),
            trx_id: pending.trx_id.clone(),
            role: pending.role,
            raw_content: pending.raw_content.clone(),
            reason,
            error,
        })
        .await?;
        tx.remove_pending(pending.id).await
    }

    /// Gives up on a new item whose handler keeps failing: records it as a
    /// dead letter and moves the cursor past it. The ledger is not written.
    pub async fn quarantine(
        &self,
        group_id: &str,
        role: StreamRole,
        item: &ContentItem,
        error: &str,
    ) -> Result<()> {
        let raw = serde_json::to_value(item)?;
        let mut tx = self.storage.begin().await?;
        tx.insert_dead_letter(&DeadLetter {
            group_id: group_id.to_string(),
            trx_id: item.trx_id.clone(),
            role,
            raw_content: raw,
            reason: DeadLetterReason::Poison,
            error: Some(error.to_string()),
        })
        .await?;
        tx.update_group_status(group_id, &StatusUpdate::cursor(role, &item.trx_id))
            .await?;
        tx.commit().await?;

        tracing::error!(group_id, trx_id = %item.trx_id, %role, error, "Quarantined poison content");
        self.metrics.inc_quarantined();
        Ok(())
    }

    /// Same as [`quarantine`](Self::quarantine) for an item stuck in the
    /// pending queue.
    pub async fn quarantine_pending(&self, pending: &PendingContent, error: &str) -> Result<()> {
        let mut tx = self.storage.begin().await?;
        self.dead_letter(
            tx.as_mut(),
            pending,
            DeadLetterReason::Poison,
            Some(error.to_string()),
        )
        .await?;
        tx.commit().await?;

        tracing::error!(
            group_id = %pending.group_id,
            trx_id = %pending.trx_id,
            error,
            "Quarantined poison pending content"
        );
        self.metrics.inc_quarantined();
        Ok(())
    }
}
