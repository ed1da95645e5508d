//! Rows of the relational projection and the indexer's own bookkeeping tables.

use crate::types::content::{CounterKind, StreamRole};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub trx_id: String,
    pub group_id: String,
    pub title: String,
    pub content: String,
    pub author_address: String,
    pub timestamp: i64,
    pub comment_count: i64,
    pub like_count: i64,
    pub dislike_count: i64,
    pub hot_score: i64,
    pub deleted: bool,
}

impl Post {
    /// `2 * likes + comments - dislikes`
    pub fn compute_hot_score(&self) -> i64 {
        2 * self.like_count + self.comment_count - self.dislike_count
    }

    pub fn refresh_hot_score(&mut self) {
        self.hot_score = self.compute_hot_score();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub trx_id: String,
    pub group_id: String,
    pub post_id: String,
    /// Top-level ancestor, `None` for top-level comments.
    pub thread_id: Option<String>,
    /// Immediate parent, `None` for top-level comments.
    pub reply_id: Option<String>,
    pub author_address: String,
    pub content: String,
    pub timestamp: i64,
    /// Replies in this comment's thread (only meaningful on thread roots).
    pub comment_count: i64,
    pub like_count: i64,
    pub dislike_count: i64,
}

/// Kind of object a counter or notification points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObjectType {
    Post,
    Comment,
}

impl ObjectType {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectType::Post => "post",
            ObjectType::Comment => "comment",
        }
    }
}

impl FromStr for ObjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post" => Ok(ObjectType::Post),
            "comment" => Ok(ObjectType::Comment),
            other => Err(format!("unknown object type '{other}'")),
        }
    }
}

/// Append-only log of like/dislike events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counter {
    pub trx_id: String,
    pub group_id: String,
    pub object_id: String,
    pub object_type: ObjectType,
    pub user_address: String,
    pub kind: CounterKind,
    pub timestamp: i64,
}

/// "User X currently has a like (or dislike) on object Y". Unique per
/// `(group, object, user, kind)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackedCounter {
    pub group_id: String,
    pub object_id: String,
    pub object_type: ObjectType,
    pub user_address: String,
    pub kind: CounterKind,
    pub trx_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub trx_id: String,
    pub group_id: String,
    pub user_address: String,
    pub name: String,
    pub avatar: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    /// The owning transaction.
    pub trx_id: String,
    pub group_id: String,
    /// Index within the owning transaction's image list.
    pub position: i32,
    pub name: Option<String>,
    pub media_type: String,
    pub content: String,
    pub user_address: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    pub group_id: String,
    pub name: String,
    pub desc: Option<String>,
    pub avatar: Option<String>,
    pub trx_id: String,
    pub updated_by: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationType {
    Like,
    Dislike,
    Comment,
}

impl NotificationType {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationType::Like => "like",
            NotificationType::Dislike => "dislike",
            NotificationType::Comment => "comment",
        }
    }
}

impl FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(NotificationType::Like),
            "dislike" => Ok(NotificationType::Dislike),
            "comment" => Ok(NotificationType::Comment),
            other => Err(format!("unknown notification type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationStatus {
    #[default]
    Unread,
    Read,
}

impl NotificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationStatus::Unread => "unread",
            NotificationStatus::Read => "read",
        }
    }
}

impl FromStr for NotificationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unread" => Ok(NotificationStatus::Unread),
            "read" => Ok(NotificationStatus::Read),
            other => Err(format!("unknown notification status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub group_id: String,
    pub to: String,
    pub from: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub object_type: ObjectType,
    /// The post or comment that received the action.
    pub object_id: String,
    /// The transaction that performed the action.
    pub action_object_id: String,
    pub status: NotificationStatus,
    pub timestamp: i64,
}

/// Per-group cursors and catch-up flag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStatus {
    pub group_id: String,
    pub main_start_trx: Option<String>,
    pub comment_start_trx: Option<String>,
    pub counter_start_trx: Option<String>,
    pub profile_start_trx: Option<String>,
    pub loaded: bool,
}

impl GroupStatus {
    pub fn new(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            ..Self::default()
        }
    }

    /// Last committed trx of a role's feed.
    pub fn cursor(&self, role: StreamRole) -> Option<&str> {
        match role {
            StreamRole::Main => self.main_start_trx.as_deref(),
            StreamRole::Comment => self.comment_start_trx.as_deref(),
            StreamRole::Counter => self.counter_start_trx.as_deref(),
            StreamRole::Profile => self.profile_start_trx.as_deref(),
        }
    }

    /// Applies the fields set in `update`.
    pub fn apply(&mut self, update: &StatusUpdate) {
        if let Some(v) = &update.main_start_trx {
            self.main_start_trx = Some(v.clone());
        }
        if let Some(v) = &update.comment_start_trx {
            self.comment_start_trx = Some(v.clone());
        }
        if let Some(v) = &update.counter_start_trx {
            self.counter_start_trx = Some(v.clone());
        }
        if let Some(v) = &update.profile_start_trx {
            self.profile_start_trx = Some(v.clone());
        }
        if let Some(loaded) = update.loaded {
            self.loaded = loaded;
        }
    }
}

/// Partial update of a [`GroupStatus`]; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusUpdate {
    pub main_start_trx: Option<String>,
    pub comment_start_trx: Option<String>,
    pub counter_start_trx: Option<String>,
    pub profile_start_trx: Option<String>,
    pub loaded: Option<bool>,
}

impl StatusUpdate {
    /// Moves one role's cursor.
    pub fn cursor(role: StreamRole, trx_id: impl Into<String>) -> Self {
        let trx_id = Some(trx_id.into());
        match role {
            StreamRole::Main => Self {
                main_start_trx: trx_id,
                ..Self::default()
            },
            StreamRole::Comment => Self {
                comment_start_trx: trx_id,
                ..Self::default()
            },
            StreamRole::Counter => Self {
                counter_start_trx: trx_id,
                ..Self::default()
            },
            StreamRole::Profile => Self {
                profile_start_trx: trx_id,
                ..Self::default()
            },
        }
    }

    pub fn loaded() -> Self {
        Self {
            loaded: Some(true),
            ..Self::default()
        }
    }
}

/// An item that referenced something not indexed yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingContent {
    /// Insertion order; replay is FIFO by id.
    pub id: i64,
    pub group_id: String,
    pub trx_id: String,
    pub role: StreamRole,
    /// The [`ContentItem`](crate::types::content::ContentItem) in wire shape.
    pub raw_content: serde_json::Value,
    pub attempts: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeadLetterReason {
    /// Stayed pending for too many replays.
    #[serde(rename = "dependency-unresolved")]
    DependencyUnresolved,
    /// Its handler failed deterministically.
    #[serde(rename = "poison")]
    Poison,
    /// Stored raw content could not be decoded anymore.
    #[serde(rename = "undecodable")]
    Undecodable,
}

impl DeadLetterReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DeadLetterReason::DependencyUnresolved => "dependency-unresolved",
            DeadLetterReason::Poison => "poison",
            DeadLetterReason::Undecodable => "undecodable",
        }
    }
}

impl fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeadLetterReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dependency-unresolved" => Ok(DeadLetterReason::DependencyUnresolved),
            "poison" => Ok(DeadLetterReason::Poison),
            "undecodable" => Ok(DeadLetterReason::Undecodable),
            other => Err(format!("unknown dead letter reason '{other}'")),
        }
    }
}

/// An item the indexer gave up on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub group_id: String,
    pub trx_id: String,
    pub role: StreamRole,
    pub raw_content: serde_json::Value,
    pub reason: DeadLetterReason,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hot_score() {
        let mut post = Post {
            trx_id: "p".into(),
            group_id: "g".into(),
            title: "t".into(),
            content: "c".into(),
            author_address: "a".into(),
            timestamp: 0,
            comment_count: 3,
            like_count: 2,
            dislike_count: 1,
            hot_score: 0,
            deleted: false,
        };
        post.refresh_hot_score();
        assert_eq!(post.hot_score, 6);
    }

    #[test]
    fn test_status_update_touches_only_its_role() {
        let mut status = GroupStatus::new("g");
        status.apply(&StatusUpdate::cursor(StreamRole::Main, "t1"));
        status.apply(&StatusUpdate::cursor(StreamRole::Counter, "c1"));
        status.apply(&StatusUpdate::cursor(StreamRole::Main, "t2"));

        assert_eq!(status.cursor(StreamRole::Main), Some("t2"));
        assert_eq!(status.cursor(StreamRole::Counter), Some("c1"));
        assert_eq!(status.cursor(StreamRole::Comment), None);
        assert!(!status.loaded);

        status.apply(&StatusUpdate::loaded());
        assert!(status.loaded);
        assert_eq!(status.cursor(StreamRole::Main), Some("t2"));
    }

    #[test]
    fn test_notification_wire_shape() {
        let n = Notification {
            group_id: "g".into(),
            to: "alice".into(),
            from: "bob".into(),
            kind: NotificationType::Comment,
            object_type: ObjectType::Post,
            object_id: "p1".into(),
            action_object_id: "c1".into(),
            status: NotificationStatus::Unread,
            timestamp: 1,
        };
        let v = serde_json::to_value(&n).unwrap();
        assert_eq!(v["type"], "comment");
        assert_eq!(v["objectType"], "post");
        assert_eq!(v["actionObjectId"], "c1");
        assert_eq!(v["status"], "unread");
    }

    #[test]
    fn test_dead_letter_reason_round_trips_text() {
        for reason in [
            DeadLetterReason::DependencyUnresolved,
            DeadLetterReason::Poison,
            DeadLetterReason::Undecodable,
        ] {
            assert_eq!(reason.as_str().parse::<DeadLetterReason>(), Ok(reason));
        }
    }
}
