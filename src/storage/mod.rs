//! Storage for the projection and the indexer's bookkeeping.
//!
//! Every write the pipeline performs goes through a [`StoreTransaction`]
//! obtained from [`StorageBackend::begin`]. Dropping a transaction without
//! calling [`StoreTransaction::commit`] rolls it back.

pub mod memory;
pub mod postgres;

use crate::types::content::{CounterKind, StreamRole};
use crate::types::models::{
    Comment, Counter, DeadLetter, GroupInfo, GroupStatus, Image, Notification, PendingContent,
    Post, Profile, StackedCounter, StatusUpdate,
};
use crate::utils::error::Result;
use async_trait::async_trait;

pub use memory::MemoryStorage;
pub use postgres::PgStorage;

/// Abstract interface for storage backends.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Creates the schema if missing.
    async fn initialize(&self) -> Result<()>;

    /// Opens a transaction with at least read-committed isolation.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;

    /// Pending items of a group in FIFO order.
    async fn list_pending(&self, group_id: &str) -> Result<Vec<PendingContent>> {
        let mut tx = self.begin().await?;
        let pending = tx.list_pending(group_id).await?;
        tx.rollback().await?;
        Ok(pending)
    }

    /// Cursor state of a group, a fresh status if never written.
    async fn group_status(&self, group_id: &str) -> Result<GroupStatus> {
        let mut tx = self.begin().await?;
        let status = tx.group_status(group_id).await?;
        tx.rollback().await?;
        Ok(status.unwrap_or_else(|| GroupStatus::new(group_id)))
    }

    /// Applies a partial status update in its own transaction.
    async fn update_group_status(&self, group_id: &str, update: &StatusUpdate) -> Result<()> {
        let mut tx = self.begin().await?;
        tx.update_group_status(group_id, update).await?;
        tx.commit().await
    }
}

/// One all-or-nothing unit of work.
#[async_trait]
pub trait StoreTransaction: Send {
    // Idempotency ledger
    async fn is_applied(&mut self, group_id: &str, trx_id: &str) -> Result<bool>;
    async fn record_applied(&mut self, group_id: &str, trx_id: &str) -> Result<()>;

    // Pending queue
    /// Returns `false` if the item was already queued.
    async fn enqueue_pending(
        &mut self,
        group_id: &str,
        trx_id: &str,
        role: StreamRole,
        raw_content: &serde_json::Value,
    ) -> Result<bool>;
    async fn list_pending(&mut self, group_id: &str) -> Result<Vec<PendingContent>>;
    async fn remove_pending(&mut self, id: i64) -> Result<()>;
    /// Increments and returns the replay attempt count.
    async fn bump_pending_attempts(&mut self, id: i64) -> Result<i32>;

    // Dead letters
    async fn insert_dead_letter(&mut self, letter: &DeadLetter) -> Result<()>;
    async fn list_dead_letters(&mut self, group_id: &str) -> Result<Vec<DeadLetter>>;

    // Cursor store
    async fn group_status(&mut self, group_id: &str) -> Result<Option<GroupStatus>>;
    /// Upserts the status row, touching only the fields set in `update`.
    async fn update_group_status(&mut self, group_id: &str, update: &StatusUpdate) -> Result<()>;

    // Posts
    async fn insert_post(&mut self, post: &Post) -> Result<()>;
    async fn get_post(&mut self, group_id: &str, trx_id: &str) -> Result<Option<Post>>;
    /// Writes counters, hot score and deleted flag back.
    async fn update_post(&mut self, post: &Post) -> Result<()>;

    // Comments
    async fn insert_comment(&mut self, comment: &Comment) -> Result<()>;
    async fn get_comment(&mut self, group_id: &str, trx_id: &str) -> Result<Option<Comment>>;
    /// Writes content and counters back.
    async fn update_comment(&mut self, comment: &Comment) -> Result<()>;
    async fn delete_comment(&mut self, group_id: &str, trx_id: &str) -> Result<()>;
    async fn count_post_comments(&mut self, group_id: &str, post_id: &str) -> Result<i64>;
    async fn count_thread_comments(&mut self, group_id: &str, thread_id: &str) -> Result<i64>;

    // Counters
    async fn insert_counter(&mut self, counter: &Counter) -> Result<()>;
    async fn get_stacked_counter(
        &mut self,
        group_id: &str,
        object_id: &str,
        user_address: &str,
        kind: CounterKind,
    ) -> Result<Option<StackedCounter>>;
    async fn insert_stacked_counter(&mut self, stacked: &StackedCounter) -> Result<()>;
    async fn delete_stacked_counter(
        &mut self,
        group_id: &str,
        object_id: &str,
        user_address: &str,
        kind: CounterKind,
    ) -> Result<()>;
    /// Removes raw and stacked counters of an object.
    async fn delete_counters_for_object(&mut self, group_id: &str, object_id: &str) -> Result<()>;
    async fn list_stacked_counters(
        &mut self,
        group_id: &str,
        object_id: &str,
    ) -> Result<Vec<StackedCounter>>;

    // Profiles
    async fn insert_profile(&mut self, profile: &Profile) -> Result<()>;
    /// Latest profile by timestamp, then insertion order.
    async fn current_profile(&mut self, group_id: &str, user_address: &str)
    -> Result<Option<Profile>>;

    // Images
    async fn insert_images(&mut self, images: &[Image]) -> Result<()>;
    async fn list_images(&mut self, group_id: &str, trx_id: &str) -> Result<Vec<Image>>;

    // Group info
    /// Keeps whichever row has the newer timestamp.
    async fn upsert_group_info(&mut self, info: &GroupInfo) -> Result<()>;
    async fn group_info(&mut self, group_id: &str) -> Result<Option<GroupInfo>>;

    // Notifications
    async fn insert_notifications(&mut self, notifications: &[Notification]) -> Result<()>;
    async fn list_notifications(&mut self, group_id: &str, to: &str) -> Result<Vec<Notification>>;
    /// Removes notifications whose object or action object is `object_id`.
    async fn delete_notifications_for_object(
        &mut self,
        group_id: &str,
        object_id: &str,
    ) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
    async fn rollback(self: Box<Self>) -> Result<()>;
}
