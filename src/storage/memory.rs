//! In-process storage backend.
//!
//! A transaction takes the store lock for its whole lifetime and works on a
//! copy of the state; commit swaps the copy in, anything else discards it.
//! Transactions are therefore serialized, which matches a single writer.

use crate::storage::{StorageBackend, StoreTransaction};
use crate::types::content::{CounterKind, StreamRole};
use crate::types::models::{
    Comment, Counter, DeadLetter, GroupInfo, GroupStatus, Image, Notification, PendingContent,
    Post, Profile, StackedCounter, StatusUpdate,
};
use crate::utils::error::{Result, RumIndexerError};
use async_trait::async_trait;
use dashmap::DashSet;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};

type Key = (String, String);

fn key(group_id: &str, id: &str) -> Key {
    (group_id.to_string(), id.to_string())
}

/// Full contents of a [`MemoryStorage`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryState {
    pub applied: HashSet<Key>,
    pub pending: BTreeMap<i64, PendingContent>,
    pub next_pending_id: i64,
    pub dead_letters: Vec<DeadLetter>,
    pub statuses: HashMap<String, GroupStatus>,
    pub posts: HashMap<Key, Post>,
    pub comments: HashMap<Key, Comment>,
    pub counters: Vec<Counter>,
    pub stacked_counters: Vec<StackedCounter>,
    pub profiles: Vec<Profile>,
    pub images: Vec<Image>,
    pub group_infos: HashMap<String, GroupInfo>,
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Default)]
struct Faults {
    poisoned: DashSet<String>,
    failing_commits: AtomicU32,
}

/// Transactional in-memory store, used by tests and local dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    state: Arc<Mutex<MemoryState>>,
    faults: Arc<Faults>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone of the committed state.
    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }

    /// Makes every attempt to record `trx_id` as applied fail with a
    /// deterministic handler error, so the surrounding transaction rolls back.
    pub fn poison_trx(&self, trx_id: impl Into<String>) {
        self.faults.poisoned.insert(trx_id.into());
    }

    pub fn heal_trx(&self, trx_id: &str) {
        self.faults.poisoned.remove(trx_id);
    }

    /// Fails the next `n` commits.
    pub fn fail_next_commits(&self, n: u32) {
        self.faults.failing_commits.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            work,
            faults: self.faults.clone(),
        }))
    }
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
    faults: Arc<Faults>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn is_applied(&mut self, group_id: &str, trx_id: &str) -> Result<bool> {
        Ok(self.work.applied.contains(&key(group_id, trx_id)))
    }

    async fn record_applied(&mut self, group_id: &str, trx_id: &str) -> Result<()> {
        if self.faults.poisoned.contains(trx_id) {
            return Err(RumIndexerError::HandlerError(format!(
                "injected failure recording {trx_id}"
            )));
        }
        self.work.applied.insert(key(group_id, trx_id));
        Ok(())
    }

    async fn enqueue_pending(
        &mut self,
        group_id: &str,
        trx_id: &str,
        role: StreamRole,
        raw_content: &serde_json::Value,
    ) -> Result<bool> {
        let queued = self
            .work
            .pending
            .values()
            .any(|p| p.group_id == group_id && p.trx_id == trx_id);
        if queued {
            return Ok(false);
        }
        self.work.next_pending_id += 1;
        let id = self.work.next_pending_id;
        self.work.pending.insert(
            id,
            PendingContent {
                id,
                group_id: group_id.to_string(),
                trx_id: trx_id.to_string(),
                role,
                raw_content: raw_content.clone(),
                attempts: 0,
            },
        );
        Ok(true)
    }

    async fn list_pending(&mut self, group_id: &str) -> Result<Vec<PendingContent>> {
        Ok(self
            .work
            .pending
            .values()
            .filter(|p| p.group_id == group_id)
            .cloned()
            .collect())
    }

    async fn remove_pending(&mut self, id: i64) -> Result<()> {
        self.work.pending.remove(&id);
        Ok(())
    }

    async fn bump_pending_attempts(&mut self, id: i64) -> Result<i32> {
        let entry = self
            .work
            .pending
            .get_mut(&id)
            .ok_or_else(|| RumIndexerError::StorageError(format!("no pending item {id}")))?;
        entry.attempts += 1;
        Ok(entry.attempts)
    }

    async fn insert_dead_letter(&mut self, letter: &DeadLetter) -> Result<()> {
        self.work.dead_letters.push(letter.clone());
        Ok(())
    }

    async fn list_dead_letters(&mut self, group_id: &str) -> Result<Vec<DeadLetter>> {
        Ok(self
            .work
            .dead_letters
            .iter()
            .filter(|d| d.group_id == group_id)
            .cloned()
            .collect())
    }

    async fn group_status(&mut self, group_id: &str) -> Result<Option<GroupStatus>> {
        Ok(self.work.statuses.get(group_id).cloned())
    }

    async fn update_group_status(&mut self, group_id: &str, update: &StatusUpdate) -> Result<()> {
        self.work
            .statuses
            .entry(group_id.to_string())
            .or_insert_with(|| GroupStatus::new(group_id))
            .apply(update);
        Ok(())
    }

    async fn insert_post(&mut self, post: &Post) -> Result<()> {
        let k = key(&post.group_id, &post.trx_id);
        if self.work.posts.contains_key(&k) {
            return Err(RumIndexerError::ConstraintError(format!(
                "duplicate post {}",
                post.trx_id
            )));
        }
        self.work.posts.insert(k, post.clone());
        Ok(())
    }

    async fn get_post(&mut self, group_id: &str, trx_id: &str) -> Result<Option<Post>> {
        Ok(self.work.posts.get(&key(group_id, trx_id)).cloned())
    }

    async fn update_post(&mut self, post: &Post) -> Result<()> {
        match self.work.posts.get_mut(&key(&post.group_id, &post.trx_id)) {
            Some(row) => {
                row.comment_count = post.comment_count;
                row.like_count = post.like_count;
                row.dislike_count = post.dislike_count;
                row.hot_score = post.hot_score;
                row.deleted = post.deleted;
                Ok(())
            }
            None => Err(RumIndexerError::StorageError(format!(
                "no post {} to update",
                post.trx_id
            ))),
        }
    }

    async fn insert_comment(&mut self, comment: &Comment) -> Result<()> {
        let k = key(&comment.group_id, &comment.trx_id);
        if self.work.comments.contains_key(&k) {
            return Err(RumIndexerError::ConstraintError(format!(
                "duplicate comment {}",
                comment.trx_id
            )));
        }
        self.work.comments.insert(k, comment.clone());
        Ok(())
    }

    async fn get_comment(&mut self, group_id: &str, trx_id: &str) -> Result<Option<Comment>> {
        Ok(self.work.comments.get(&key(group_id, trx_id)).cloned())
    }

    async fn update_comment(&mut self, comment: &Comment) -> Result<()> {
        match self
            .work
            .comments
            .get_mut(&key(&comment.group_id, &comment.trx_id))
        {
            Some(row) => {
                row.content = comment.content.clone();
                row.comment_count = comment.comment_count;
                row.like_count = comment.like_count;
                row.dislike_count = comment.dislike_count;
                Ok(())
            }
            None => Err(RumIndexerError::StorageError(format!(
                "no comment {} to update",
                comment.trx_id
            ))),
        }
    }

    async fn delete_comment(&mut self, group_id: &str, trx_id: &str) -> Result<()> {
        self.work.comments.remove(&key(group_id, trx_id));
        Ok(())
    }

    async fn count_post_comments(&mut self, group_id: &str, post_id: &str) -> Result<i64> {
        Ok(self
            .work
            .comments
            .values()
            .filter(|c| c.group_id == group_id && c.post_id == post_id)
            .count() as i64)
    }

    async fn count_thread_comments(&mut self, group_id: &str, thread_id: &str) -> Result<i64> {
        Ok(self
            .work
            .comments
            .values()
            .filter(|c| c.group_id == group_id && c.thread_id.as_deref() == Some(thread_id))
            .count() as i64)
    }

    async fn insert_counter(&mut self, counter: &Counter) -> Result<()> {
        self.work.counters.push(counter.clone());
        Ok(())
    }

    async fn get_stacked_counter(
        &mut self,
        group_id: &str,
        object_id: &str,
        user_address: &str,
        kind: CounterKind,
    ) -> Result<Option<StackedCounter>> {
        Ok(self
            .work
            .stacked_counters
            .iter()
            .find(|s| {
                s.group_id == group_id
                    && s.object_id == object_id
                    && s.user_address == user_address
                    && s.kind == kind
            })
            .cloned())
    }

    async fn insert_stacked_counter(&mut self, stacked: &StackedCounter) -> Result<()> {
        let exists = self.work.stacked_counters.iter().any(|s| {
            s.group_id == stacked.group_id
                && s.object_id == stacked.object_id
                && s.user_address == stacked.user_address
                && s.kind == stacked.kind
        });
        if exists {
            return Err(RumIndexerError::ConstraintError(format!(
                "duplicate stacked {} on {}",
                stacked.kind.as_str(),
                stacked.object_id
            )));
        }
        self.work.stacked_counters.push(stacked.clone());
        Ok(())
    }

    async fn delete_stacked_counter(
        &mut self,
        group_id: &str,
        object_id: &str,
        user_address: &str,
        kind: CounterKind,
    ) -> Result<()> {
        self.work.stacked_counters.retain(|s| {
            !(s.group_id == group_id
                && s.object_id == object_id
                && s.user_address == user_address
                && s.kind == kind)
        });
        Ok(())
    }

    async fn delete_counters_for_object(&mut self, group_id: &str, object_id: &str) -> Result<()> {
        self.work
            .counters
            .retain(|c| !(c.group_id == group_id && c.object_id == object_id));
        self.work
            .stacked_counters
            .retain(|s| !(s.group_id == group_id && s.object_id == object_id));
        Ok(())
    }

    async fn list_stacked_counters(
        &mut self,
        group_id: &str,
        object_id: &str,
    ) -> Result<Vec<StackedCounter>> {
        Ok(self
            .work
            .stacked_counters
            .iter()
            .filter(|s| s.group_id == group_id && s.object_id == object_id)
            .cloned()
            .collect())
    }

    async fn insert_profile(&mut self, profile: &Profile) -> Result<()> {
        self.work.profiles.push(profile.clone());
        Ok(())
    }

    async fn current_profile(
        &mut self,
        group_id: &str,
        user_address: &str,
    ) -> Result<Option<Profile>> {
        Ok(self
            .work
            .profiles
            .iter()
            .enumerate()
            .filter(|(_, p)| p.group_id == group_id && p.user_address == user_address)
            .max_by_key(|(i, p)| (p.timestamp, *i))
            .map(|(_, p)| p.clone()))
    }

    async fn insert_images(&mut self, images: &[Image]) -> Result<()> {
        self.work.images.extend_from_slice(images);
        Ok(())
    }

    async fn list_images(&mut self, group_id: &str, trx_id: &str) -> Result<Vec<Image>> {
        let mut images: Vec<Image> = self
            .work
            .images
            .iter()
            .filter(|i| i.group_id == group_id && i.trx_id == trx_id)
            .cloned()
            .collect();
        images.sort_by_key(|i| i.position);
        Ok(images)
    }

    async fn upsert_group_info(&mut self, info: &GroupInfo) -> Result<()> {
        let newer = self
            .work
            .group_infos
            .get(&info.group_id)
            .is_none_or(|existing| info.timestamp >= existing.timestamp);
        if newer {
            self.work
                .group_infos
                .insert(info.group_id.clone(), info.clone());
        }
        Ok(())
    }

    async fn group_info(&mut self, group_id: &str) -> Result<Option<GroupInfo>> {
        Ok(self.work.group_infos.get(group_id).cloned())
    }

    async fn insert_notifications(&mut self, notifications: &[Notification]) -> Result<()> {
        self.work.notifications.extend_from_slice(notifications);
        Ok(())
    }

    async fn list_notifications(&mut self, group_id: &str, to: &str) -> Result<Vec<Notification>> {
        Ok(self
            .work
            .notifications
            .iter()
            .filter(|n| n.group_id == group_id && n.to == to)
            .cloned()
            .collect())
    }

    async fn delete_notifications_for_object(
        &mut self,
        group_id: &str,
        object_id: &str,
    ) -> Result<()> {
        self.work.notifications.retain(|n| {
            !(n.group_id == group_id
                && (n.object_id == object_id || n.action_object_id == object_id))
        });
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        let failing = this.faults.failing_commits.load(Ordering::SeqCst);
        if failing > 0 {
            this.faults
                .failing_commits
                .store(failing - 1, Ordering::SeqCst);
            return Err(RumIndexerError::StorageError(
                "injected commit failure".to_string(),
            ));
        }
        let mut guard = this.guard;
        *guard = this.work;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
