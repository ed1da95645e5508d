//! PostgreSQL storage backend.

use crate::storage::{StorageBackend, StoreTransaction};
use crate::types::content::{CounterKind, StreamRole};
use crate::types::models::{
    Comment, Counter, DeadLetter, GroupInfo, GroupStatus, Image, Notification, ObjectType,
    PendingContent, Post, Profile, StackedCounter, StatusUpdate,
};
use crate::utils::error::{Result, RumIndexerError};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Row, Transaction};
use std::str::FromStr;
use std::time::Duration;

const SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS _rum_indexer_applied (
        group_id TEXT NOT NULL,
        trx_id TEXT NOT NULL,
        applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (group_id, trx_id)
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS _rum_indexer_pending (
        id BIGSERIAL PRIMARY KEY,
        group_id TEXT NOT NULL,
        trx_id TEXT NOT NULL,
        role TEXT NOT NULL,
        raw_content JSONB NOT NULL,
        attempts INTEGER NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE (group_id, trx_id)
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS _rum_indexer_dead_letters (
        id BIGSERIAL PRIMARY KEY,
        group_id TEXT NOT NULL,
        trx_id TEXT NOT NULL,
        role TEXT NOT NULL,
        raw_content JSONB NOT NULL,
        reason TEXT NOT NULL,
        error TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS group_status (
        group_id TEXT PRIMARY KEY,
        main_start_trx TEXT,
        comment_start_trx TEXT,
        counter_start_trx TEXT,
        profile_start_trx TEXT,
        loaded BOOLEAN NOT NULL DEFAULT FALSE
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS posts (
        group_id TEXT NOT NULL,
        trx_id TEXT NOT NULL,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        author_address TEXT NOT NULL,
        timestamp BIGINT NOT NULL,
        comment_count BIGINT NOT NULL DEFAULT 0,
        like_count BIGINT NOT NULL DEFAULT 0,
        dislike_count BIGINT NOT NULL DEFAULT 0,
        hot_score BIGINT NOT NULL DEFAULT 0,
        deleted BOOLEAN NOT NULL DEFAULT FALSE,
        PRIMARY KEY (group_id, trx_id)
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS comments (
        group_id TEXT NOT NULL,
        trx_id TEXT NOT NULL,
        post_id TEXT NOT NULL,
        thread_id TEXT,
        reply_id TEXT,
        author_address TEXT NOT NULL,
        content TEXT NOT NULL,
        timestamp BIGINT NOT NULL,
        comment_count BIGINT NOT NULL DEFAULT 0,
        like_count BIGINT NOT NULL DEFAULT 0,
        dislike_count BIGINT NOT NULL DEFAULT 0,
        PRIMARY KEY (group_id, trx_id)
    )
    ",
    "CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(group_id, post_id)",
    "CREATE INDEX IF NOT EXISTS idx_comments_thread ON comments(group_id, thread_id)",
    r"
    CREATE TABLE IF NOT EXISTS counters (
        id BIGSERIAL PRIMARY KEY,
        group_id TEXT NOT NULL,
        trx_id TEXT NOT NULL,
        object_id TEXT NOT NULL,
        object_type TEXT NOT NULL,
        user_address TEXT NOT NULL,
        kind TEXT NOT NULL,
        timestamp BIGINT NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS stacked_counters (
        group_id TEXT NOT NULL,
        object_id TEXT NOT NULL,
        object_type TEXT NOT NULL,
        user_address TEXT NOT NULL,
        kind TEXT NOT NULL,
        trx_id TEXT NOT NULL,
        PRIMARY KEY (group_id, object_id, user_address, kind)
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS profiles (
        id BIGSERIAL PRIMARY KEY,
        group_id TEXT NOT NULL,
        trx_id TEXT NOT NULL,
        user_address TEXT NOT NULL,
        name TEXT NOT NULL,
        avatar TEXT,
        timestamp BIGINT NOT NULL
    )
    ",
    "CREATE INDEX IF NOT EXISTS idx_profiles_user ON profiles(group_id, user_address)",
    r"
    CREATE TABLE IF NOT EXISTS images (
        group_id TEXT NOT NULL,
        trx_id TEXT NOT NULL,
        position INTEGER NOT NULL,
        name TEXT,
        media_type TEXT NOT NULL,
        content TEXT NOT NULL,
        user_address TEXT NOT NULL,
        timestamp BIGINT NOT NULL,
        PRIMARY KEY (group_id, trx_id, position)
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS group_infos (
        group_id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT,
        avatar TEXT,
        trx_id TEXT NOT NULL,
        updated_by TEXT NOT NULL,
        timestamp BIGINT NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS notifications (
        id BIGSERIAL PRIMARY KEY,
        group_id TEXT NOT NULL,
        to_address TEXT NOT NULL,
        from_address TEXT NOT NULL,
        kind TEXT NOT NULL,
        object_type TEXT NOT NULL,
        object_id TEXT NOT NULL,
        action_object_id TEXT NOT NULL,
        status TEXT NOT NULL,
        timestamp BIGINT NOT NULL
    )
    ",
    "CREATE INDEX IF NOT EXISTS idx_notifications_to ON notifications(group_id, to_address)",
];

fn parse_text<T: FromStr<Err = String>>(row: &PgRow, column: &str) -> Result<T> {
    let text: String = row.try_get(column)?;
    T::from_str(&text).map_err(RumIndexerError::DecodingError)
}

fn post_from_row(row: &PgRow) -> Result<Post> {
    Ok(Post {
        trx_id: row.try_get("trx_id")?,
        group_id: row.try_get("group_id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        author_address: row.try_get("author_address")?,
        timestamp: row.try_get("timestamp")?,
        comment_count: row.try_get("comment_count")?,
        like_count: row.try_get("like_count")?,
        dislike_count: row.try_get("dislike_count")?,
        hot_score: row.try_get("hot_score")?,
        deleted: row.try_get("deleted")?,
    })
}

fn comment_from_row(row: &PgRow) -> Result<Comment> {
    Ok(Comment {
        trx_id: row.try_get("trx_id")?,
        group_id: row.try_get("group_id")?,
        post_id: row.try_get("post_id")?,
        thread_id: row.try_get("thread_id")?,
        reply_id: row.try_get("reply_id")?,
        author_address: row.try_get("author_address")?,
        content: row.try_get("content")?,
        timestamp: row.try_get("timestamp")?,
        comment_count: row.try_get("comment_count")?,
        like_count: row.try_get("like_count")?,
        dislike_count: row.try_get("dislike_count")?,
    })
}

fn stacked_from_row(row: &PgRow) -> Result<StackedCounter> {
    Ok(StackedCounter {
        group_id: row.try_get("group_id")?,
        object_id: row.try_get("object_id")?,
        object_type: parse_text::<ObjectType>(row, "object_type")?,
        user_address: row.try_get("user_address")?,
        kind: parse_text::<CounterKind>(row, "kind")?,
        trx_id: row.try_get("trx_id")?,
    })
}

fn pending_from_row(row: &PgRow) -> Result<PendingContent> {
    Ok(PendingContent {
        id: row.try_get("id")?,
        group_id: row.try_get("group_id")?,
        trx_id: row.try_get("trx_id")?,
        role: parse_text::<StreamRole>(row, "role")?,
        raw_content: row.try_get("raw_content")?,
        attempts: row.try_get("attempts")?,
    })
}

fn status_from_row(row: &PgRow) -> Result<GroupStatus> {
    Ok(GroupStatus {
        group_id: row.try_get("group_id")?,
        main_start_trx: row.try_get("main_start_trx")?,
        comment_start_trx: row.try_get("comment_start_trx")?,
        counter_start_trx: row.try_get("counter_start_trx")?,
        profile_start_trx: row.try_get("profile_start_trx")?,
        loaded: row.try_get("loaded")?,
    })
}

fn profile_from_row(row: &PgRow) -> Result<Profile> {
    Ok(Profile {
        trx_id: row.try_get("trx_id")?,
        group_id: row.try_get("group_id")?,
        user_address: row.try_get("user_address")?,
        name: row.try_get("name")?,
        avatar: row.try_get("avatar")?,
        timestamp: row.try_get("timestamp")?,
    })
}

/// Database storage for the projection, backed by a `PgPool`.
///
/// # Example
///
/// ```no_run
/// use rum_bbs_indexer::{PgStorage, StorageBackend};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let storage = PgStorage::new("postgresql://localhost/bbs", 5).await?;
/// storage.initialize().await?;
/// # Ok(())
/// # }
/// ```
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    /// Connects a pool of at most `max_connections` connections.
    ///
    /// # Errors
    ///
    /// Returns `RumIndexerError::DatabaseError` if the connection fails.
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Pool shared with read-side consumers.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl StorageBackend for PgStorage {
    async fn initialize(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }
}

pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn is_applied(&mut self, group_id: &str, trx_id: &str) -> Result<bool> {
        let applied = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM _rum_indexer_applied WHERE group_id = $1 AND trx_id = $2)",
        )
        .bind(group_id)
        .bind(trx_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(applied)
    }

    async fn record_applied(&mut self, group_id: &str, trx_id: &str) -> Result<()> {
        sqlx::query("INSERT INTO _rum_indexer_applied (group_id, trx_id) VALUES ($1, $2)")
            .bind(group_id)
            .bind(trx_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn enqueue_pending(
        &mut self,
        group_id: &str,
        trx_id: &str,
        role: StreamRole,
        raw_content: &serde_json::Value,
    ) -> Result<bool> {
        let result = sqlx::query(
            r"
            INSERT INTO _rum_indexer_pending (group_id, trx_id, role, raw_content)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (group_id, trx_id) DO NOTHING
            ",
        )
        .bind(group_id)
        .bind(trx_id)
        .bind(role.as_str())
        .bind(Json(raw_content))
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_pending(&mut self, group_id: &str) -> Result<Vec<PendingContent>> {
        let rows = sqlx::query(
            r"
            SELECT id, group_id, trx_id, role, raw_content, attempts
            FROM _rum_indexer_pending WHERE group_id = $1 ORDER BY id
            ",
        )
        .bind(group_id)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(pending_from_row).collect()
    }

    async fn remove_pending(&mut self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM _rum_indexer_pending WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn bump_pending_attempts(&mut self, id: i64) -> Result<i32> {
        let attempts = sqlx::query_scalar::<_, i32>(
            "UPDATE _rum_indexer_pending SET attempts = attempts + 1 WHERE id = $1 RETURNING attempts",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        attempts.ok_or_else(|| RumIndexerError::StorageError(format!("no pending item {id}")))
    }

    async fn insert_dead_letter(&mut self, letter: &DeadLetter) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO _rum_indexer_dead_letters (group_id, trx_id, role, raw_content, reason, error)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(&letter.group_id)
        .bind(&letter.trx_id)
        .bind(letter.role.as_str())
        .bind(Json(&letter.raw_content))
        .bind(letter.reason.as_str())
        .bind(&letter.error)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn list_dead_letters(&mut self, group_id: &str) -> Result<Vec<DeadLetter>> {
        let rows = sqlx::query(
            r"
            SELECT group_id, trx_id, role, raw_content, reason, error
            FROM _rum_indexer_dead_letters WHERE group_id = $1 ORDER BY id
            ",
        )
        .bind(group_id)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter()
            .map(|row| -> Result<DeadLetter> {
                Ok(DeadLetter {
                    group_id: row.try_get("group_id")?,
                    trx_id: row.try_get("trx_id")?,
                    role: parse_text(row, "role")?,
                    raw_content: row.try_get("raw_content")?,
                    reason: parse_text(row, "reason")?,
                    error: row.try_get("error")?,
                })
            })
            .collect()
    }

    async fn group_status(&mut self, group_id: &str) -> Result<Option<GroupStatus>> {
        let row = sqlx::query("SELECT * FROM group_status WHERE group_id = $1")
            .bind(group_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(status_from_row).transpose()
    }

    async fn update_group_status(&mut self, group_id: &str, update: &StatusUpdate) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO group_status
                (group_id, main_start_trx, comment_start_trx, counter_start_trx, profile_start_trx, loaded)
            VALUES ($1, $2, $3, $4, $5, COALESCE($6, FALSE))
            ON CONFLICT (group_id) DO UPDATE SET
                main_start_trx = COALESCE(EXCLUDED.main_start_trx, group_status.main_start_trx),
                comment_start_trx = COALESCE(EXCLUDED.comment_start_trx, group_status.comment_start_trx),
                counter_start_trx = COALESCE(EXCLUDED.counter_start_trx, group_status.counter_start_trx),
                profile_start_trx = COALESCE(EXCLUDED.profile_start_trx, group_status.profile_start_trx),
                loaded = COALESCE($6, group_status.loaded)
            ",
        )
        .bind(group_id)
        .bind(&update.main_start_trx)
        .bind(&update.comment_start_trx)
        .bind(&update.counter_start_trx)
        .bind(&update.profile_start_trx)
        .bind(update.loaded)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_post(&mut self, post: &Post) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO posts (group_id, trx_id, title, content, author_address, timestamp,
                               comment_count, like_count, dislike_count, hot_score, deleted)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ",
        )
        .bind(&post.group_id)
        .bind(&post.trx_id)
        .bind(&post.title)
        .bind(&post.content)
        .bind(&post.author_address)
        .bind(post.timestamp)
        .bind(post.comment_count)
        .bind(post.like_count)
        .bind(post.dislike_count)
        .bind(post.hot_score)
        .bind(post.deleted)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_post(&mut self, group_id: &str, trx_id: &str) -> Result<Option<Post>> {
        let row = sqlx::query("SELECT * FROM posts WHERE group_id = $1 AND trx_id = $2")
            .bind(group_id)
            .bind(trx_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(post_from_row).transpose()
    }

    async fn update_post(&mut self, post: &Post) -> Result<()> {
        sqlx::query(
            r"
            UPDATE posts SET comment_count = $3, like_count = $4, dislike_count = $5,
                             hot_score = $6, deleted = $7
            WHERE group_id = $1 AND trx_id = $2
            ",
        )
        .bind(&post.group_id)
        .bind(&post.trx_id)
        .bind(post.comment_count)
        .bind(post.like_count)
        .bind(post.dislike_count)
        .bind(post.hot_score)
        .bind(post.deleted)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_comment(&mut self, comment: &Comment) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO comments (group_id, trx_id, post_id, thread_id, reply_id, author_address,
                                  content, timestamp, comment_count, like_count, dislike_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ",
        )
        .bind(&comment.group_id)
        .bind(&comment.trx_id)
        .bind(&comment.post_id)
        .bind(&comment.thread_id)
        .bind(&comment.reply_id)
        .bind(&comment.author_address)
        .bind(&comment.content)
        .bind(comment.timestamp)
        .bind(comment.comment_count)
        .bind(comment.like_count)
        .bind(comment.dislike_count)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_comment(&mut self, group_id: &str, trx_id: &str) -> Result<Option<Comment>> {
        let row = sqlx::query("SELECT * FROM comments WHERE group_id = $1 AND trx_id = $2")
            .bind(group_id)
            .bind(trx_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(comment_from_row).transpose()
    }

    async fn update_comment(&mut self, comment: &Comment) -> Result<()> {
        sqlx::query(
            r"
            UPDATE comments SET content = $3, comment_count = $4, like_count = $5, dislike_count = $6
            WHERE group_id = $1 AND trx_id = $2
            ",
        )
        .bind(&comment.group_id)
        .bind(&comment.trx_id)
        .bind(&comment.content)
        .bind(comment.comment_count)
        .bind(comment.like_count)
        .bind(comment.dislike_count)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_comment(&mut self, group_id: &str, trx_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM comments WHERE group_id = $1 AND trx_id = $2")
            .bind(group_id)
            .bind(trx_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn count_post_comments(&mut self, group_id: &str, post_id: &str) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM comments WHERE group_id = $1 AND post_id = $2",
        )
        .bind(group_id)
        .bind(post_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count)
    }

    async fn count_thread_comments(&mut self, group_id: &str, thread_id: &str) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM comments WHERE group_id = $1 AND thread_id = $2",
        )
        .bind(group_id)
        .bind(thread_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count)
    }

    async fn insert_counter(&mut self, counter: &Counter) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO counters (group_id, trx_id, object_id, object_type, user_address, kind, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(&counter.group_id)
        .bind(&counter.trx_id)
        .bind(&counter.object_id)
        .bind(counter.object_type.as_str())
        .bind(&counter.user_address)
        .bind(counter.kind.as_str())
        .bind(counter.timestamp)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_stacked_counter(
        &mut self,
        group_id: &str,
        object_id: &str,
        user_address: &str,
        kind: CounterKind,
    ) -> Result<Option<StackedCounter>> {
        let row = sqlx::query(
            r"
            SELECT * FROM stacked_counters
            WHERE group_id = $1 AND object_id = $2 AND user_address = $3 AND kind = $4
            ",
        )
        .bind(group_id)
        .bind(object_id)
        .bind(user_address)
        .bind(kind.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(stacked_from_row).transpose()
    }

    async fn insert_stacked_counter(&mut self, stacked: &StackedCounter) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO stacked_counters (group_id, object_id, object_type, user_address, kind, trx_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(&stacked.group_id)
        .bind(&stacked.object_id)
        .bind(stacked.object_type.as_str())
        .bind(&stacked.user_address)
        .bind(stacked.kind.as_str())
        .bind(&stacked.trx_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_stacked_counter(
        &mut self,
        group_id: &str,
        object_id: &str,
        user_address: &str,
        kind: CounterKind,
    ) -> Result<()> {
        sqlx::query(
            r"
            DELETE FROM stacked_counters
            WHERE group_id = $1 AND object_id = $2 AND user_address = $3 AND kind = $4
            ",
        )
        .bind(group_id)
        .bind(object_id)
        .bind(user_address)
        .bind(kind.as_str())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_counters_for_object(&mut self, group_id: &str, object_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM counters WHERE group_id = $1 AND object_id = $2")
            .bind(group_id)
            .bind(object_id)
            .execute(&mut *self.tx)
            .await?;
        sqlx::query("DELETE FROM stacked_counters WHERE group_id = $1 AND object_id = $2")
            .bind(group_id)
            .bind(object_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn list_stacked_counters(
        &mut self,
        group_id: &str,
        object_id: &str,
    ) -> Result<Vec<StackedCounter>> {
        let rows = sqlx::query(
            "SELECT * FROM stacked_counters WHERE group_id = $1 AND object_id = $2 ORDER BY user_address, kind",
        )
        .bind(group_id)
        .bind(object_id)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(stacked_from_row).collect()
    }

    async fn insert_profile(&mut self, profile: &Profile) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO profiles (group_id, trx_id, user_address, name, avatar, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(&profile.group_id)
        .bind(&profile.trx_id)
        .bind(&profile.user_address)
        .bind(&profile.name)
        .bind(&profile.avatar)
        .bind(profile.timestamp)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn current_profile(
        &mut self,
        group_id: &str,
        user_address: &str,
    ) -> Result<Option<Profile>> {
        let row = sqlx::query(
            r"
            SELECT * FROM profiles WHERE group_id = $1 AND user_address = $2
            ORDER BY timestamp DESC, id DESC LIMIT 1
            ",
        )
        .bind(group_id)
        .bind(user_address)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(profile_from_row).transpose()
    }

    async fn insert_images(&mut self, images: &[Image]) -> Result<()> {
        if images.is_empty() {
            return Ok(());
        }
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO images (group_id, trx_id, position, name, media_type, content, user_address, timestamp) ",
        );
        builder.push_values(images, |mut b, image| {
            b.push_bind(&image.group_id)
                .push_bind(&image.trx_id)
                .push_bind(image.position)
                .push_bind(&image.name)
                .push_bind(&image.media_type)
                .push_bind(&image.content)
                .push_bind(&image.user_address)
                .push_bind(image.timestamp);
        });
        builder.build().execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn list_images(&mut self, group_id: &str, trx_id: &str) -> Result<Vec<Image>> {
        let rows = sqlx::query(
            "SELECT * FROM images WHERE group_id = $1 AND trx_id = $2 ORDER BY position",
        )
        .bind(group_id)
        .bind(trx_id)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter()
            .map(|row| -> Result<Image> {
                Ok(Image {
                    trx_id: row.try_get("trx_id")?,
                    group_id: row.try_get("group_id")?,
                    position: row.try_get("position")?,
                    name: row.try_get("name")?,
                    media_type: row.try_get("media_type")?,
                    content: row.try_get("content")?,
                    user_address: row.try_get("user_address")?,
                    timestamp: row.try_get("timestamp")?,
                })
            })
            .collect()
    }

    async fn upsert_group_info(&mut self, info: &GroupInfo) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO group_infos (group_id, name, description, avatar, trx_id, updated_by, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (group_id) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                avatar = EXCLUDED.avatar,
                trx_id = EXCLUDED.trx_id,
                updated_by = EXCLUDED.updated_by,
                timestamp = EXCLUDED.timestamp
            WHERE group_infos.timestamp <= EXCLUDED.timestamp
            ",
        )
        .bind(&info.group_id)
        .bind(&info.name)
        .bind(&info.desc)
        .bind(&info.avatar)
        .bind(&info.trx_id)
        .bind(&info.updated_by)
        .bind(info.timestamp)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn group_info(&mut self, group_id: &str) -> Result<Option<GroupInfo>> {
        let row = sqlx::query("SELECT * FROM group_infos WHERE group_id = $1")
            .bind(group_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref()
            .map(|row| -> Result<GroupInfo> {
                Ok(GroupInfo {
                    group_id: row.try_get("group_id")?,
                    name: row.try_get("name")?,
                    desc: row.try_get("description")?,
                    avatar: row.try_get("avatar")?,
                    trx_id: row.try_get("trx_id")?,
                    updated_by: row.try_get("updated_by")?,
                    timestamp: row.try_get("timestamp")?,
                })
            })
            .transpose()
    }

    async fn insert_notifications(&mut self, notifications: &[Notification]) -> Result<()> {
        if notifications.is_empty() {
            return Ok(());
        }
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO notifications (group_id, to_address, from_address, kind, object_type, \
             object_id, action_object_id, status, timestamp) ",
        );
        builder.push_values(notifications, |mut b, n| {
            b.push_bind(&n.group_id)
                .push_bind(&n.to)
                .push_bind(&n.from)
                .push_bind(n.kind.as_str())
                .push_bind(n.object_type.as_str())
                .push_bind(&n.object_id)
                .push_bind(&n.action_object_id)
                .push_bind(n.status.as_str())
                .push_bind(n.timestamp);
        });
        builder.build().execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn list_notifications(&mut self, group_id: &str, to: &str) -> Result<Vec<Notification>> {
        let rows = sqlx::query(
            "SELECT * FROM notifications WHERE group_id = $1 AND to_address = $2 ORDER BY id",
        )
        .bind(group_id)
        .bind(to)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter()
            .map(|row| -> Result<Notification> {
                Ok(Notification {
                    group_id: row.try_get("group_id")?,
                    to: row.try_get("to_address")?,
                    from: row.try_get("from_address")?,
                    kind: parse_text(row, "kind")?,
                    object_type: parse_text(row, "object_type")?,
                    object_id: row.try_get("object_id")?,
                    action_object_id: row.try_get("action_object_id")?,
                    status: parse_text(row, "status")?,
                    timestamp: row.try_get("timestamp")?,
                })
            })
            .collect()
    }

    async fn delete_notifications_for_object(
        &mut self,
        group_id: &str,
        object_id: &str,
    ) -> Result<()> {
        sqlx::query(
            "DELETE FROM notifications WHERE group_id = $1 AND (object_id = $2 OR action_object_id = $2)",
        )
        .bind(group_id)
        .bind(object_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
