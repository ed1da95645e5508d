//! Chain content items and the payloads they carry.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One immutable item of a group's chain feed, as returned by the node.
///
/// `data` stays undecoded until classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContentItem {
    pub trx_id: String,
    #[serde(default)]
    pub group_id: String,
    /// Author identity of every projection row derived from this item.
    pub sender_pubkey: String,
    pub data: serde_json::Value,
    /// Nanoseconds since the epoch.
    #[serde(rename = "TimeStamp", with = "timestamp_ns")]
    pub timestamp: i64,
}

/// The node reports timestamps as decimal strings; older nodes used numbers.
mod timestamp_ns {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        struct TimestampVisitor;

        impl Visitor<'_> for TimestampVisitor {
            type Value = i64;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a nanosecond timestamp as integer or string")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
                Ok(v)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
                i64::try_from(v).map_err(|_| E::custom("timestamp out of range"))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<i64, E> {
                // i64::MAX as f64 rounds up to 2^63, which is already out of range.
                if v.is_finite() && v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 {
                    Ok(v as i64)
                } else {
                    Err(E::custom(format!("timestamp {v} is not a whole nanosecond count")))
                }
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<i64, E> {
                v.trim()
                    .parse::<i64>()
                    .map_err(|e| E::custom(format!("invalid timestamp '{v}': {e}")))
            }
        }

        deserializer.deserialize_any(TimestampVisitor)
    }
}

/// The sub-feed of a group an item was read from.
///
/// Each role has its own cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StreamRole {
    Main,
    Comment,
    Counter,
    Profile,
}

impl StreamRole {
    pub const ALL: [StreamRole; 4] = [
        StreamRole::Main,
        StreamRole::Comment,
        StreamRole::Counter,
        StreamRole::Profile,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StreamRole::Main => "main",
            StreamRole::Comment => "comment",
            StreamRole::Counter => "counter",
            StreamRole::Profile => "profile",
        }
    }
}

impl fmt::Display for StreamRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" => Ok(StreamRole::Main),
            "comment" => Ok(StreamRole::Comment),
            "counter" => Ok(StreamRole::Counter),
            "profile" => Ok(StreamRole::Profile),
            other => Err(format!("unknown stream role '{other}'")),
        }
    }
}

/// Kind of transaction, used for dispatch, logging and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrxType {
    Post,
    PostDelete,
    Comment,
    Counter,
    Profile,
    Image,
    GroupInfo,
}

impl TrxType {
    pub const ALL: [TrxType; 7] = [
        TrxType::Post,
        TrxType::PostDelete,
        TrxType::Comment,
        TrxType::Counter,
        TrxType::Profile,
        TrxType::Image,
        TrxType::GroupInfo,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TrxType::Post => "post",
            TrxType::PostDelete => "postDelete",
            TrxType::Comment => "comment",
            TrxType::Counter => "counter",
            TrxType::Profile => "profile",
            TrxType::Image => "image",
            TrxType::GroupInfo => "groupInfo",
        }
    }

    /// Position in [`TrxType::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for TrxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Like or dislike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CounterKind {
    Like,
    Dislike,
}

impl CounterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CounterKind::Like => "like",
            CounterKind::Dislike => "dislike",
        }
    }
}

impl FromStr for CounterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(CounterKind::Like),
            "dislike" => Ok(CounterKind::Dislike),
            other => Err(format!("unknown counter kind '{other}'")),
        }
    }
}

/// Decoded item payload, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Payload {
    Post(PostPayload),
    PostDelete(PostDeletePayload),
    Comment(CommentPayload),
    Like(CounterPayload),
    Dislike(CounterPayload),
    Profile(ProfilePayload),
    Image(ImagePayload),
    GroupInfo(GroupInfoPayload),
}

impl Payload {
    pub fn trx_type(&self) -> TrxType {
        match self {
            Payload::Post(_) => TrxType::Post,
            Payload::PostDelete(_) => TrxType::PostDelete,
            Payload::Comment(_) => TrxType::Comment,
            Payload::Like(_) | Payload::Dislike(_) => TrxType::Counter,
            Payload::Profile(_) => TrxType::Profile,
            Payload::Image(_) => TrxType::Image,
            Payload::GroupInfo(_) => TrxType::GroupInfo,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostPayload {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDeletePayload {
    pub post_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentPayload {
    /// The post the comment belongs to.
    pub object_id: String,
    #[serde(default)]
    pub content: String,
    /// Top-level comment of the thread, if this is a nested reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Immediate parent comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_trx_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_trx_id: Option<String>,
}

/// What a comment payload asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentAction<'a> {
    Create,
    Update { target: &'a str },
    Delete { target: &'a str },
}

impl CommentPayload {
    /// Resolves the sub-case. Classification guarantees at most one reference is set.
    pub fn action(&self) -> CommentAction<'_> {
        match (&self.updated_trx_id, &self.deleted_trx_id) {
            (Some(target), _) => CommentAction::Update { target },
            (None, Some(target)) => CommentAction::Delete { target },
            (None, None) => CommentAction::Create,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterPayload {
    /// Post or comment being liked or disliked.
    pub object_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilePayload {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePayload {
    pub images: Vec<ImageData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub media_type: String,
    /// Base64 text, stored as received.
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupInfoPayload {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}
