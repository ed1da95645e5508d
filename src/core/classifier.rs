//! Content classification.
//!
//! Decodes an item's `data` once, resolves its [`TrxType`] from the `type`
//! discriminant and validates the fields handlers rely on. Anything that does
//! not pass is [`Classification::Invalid`]: dropped, never retried.

use crate::types::content::{
    CommentPayload, ContentItem, ImagePayload, Payload, TrxType,
};
use serde_json::Value;

/// A payload that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedContent {
    pub trx_type: TrxType,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Valid(ClassifiedContent),
    /// Carries the rejection reason for the log.
    Invalid(String),
}

impl Classification {
    pub fn is_valid(&self) -> bool {
        matches!(self, Classification::Valid(_))
    }
}

/// Classifies one item.
pub fn classify(item: &ContentItem) -> Classification {
    if item.trx_id.is_empty() {
        return Classification::Invalid("missing trx id".to_string());
    }
    if item.sender_pubkey.is_empty() {
        return Classification::Invalid("missing sender".to_string());
    }

    let data = match decode_data(&item.data) {
        Ok(data) => data,
        Err(reason) => return Classification::Invalid(reason),
    };

    let payload: Payload = match serde_json::from_value(data) {
        Ok(payload) => payload,
        Err(e) => return Classification::Invalid(format!("unrecognized payload: {e}")),
    };

    match validate(&payload) {
        Ok(()) => Classification::Valid(ClassifiedContent {
            trx_type: payload.trx_type(),
            payload,
        }),
        Err(reason) => Classification::Invalid(reason),
    }
}

/// `data` arrives either as an object or as a string holding one.
fn decode_data(data: &Value) -> Result<Value, String> {
    let value = match data {
        Value::Object(_) => data.clone(),
        Value::String(text) => {
            serde_json::from_str::<Value>(text).map_err(|e| format!("data is not JSON: {e}"))?
        }
        other => return Err(format!("data must be an object, got {}", kind_of(other))),
    };
    match value.get("type") {
        Some(Value::String(_)) => Ok(value),
        Some(_) => Err("payload type must be a string".to_string()),
        None if value.is_object() => Err("payload has no type".to_string()),
        None => Err("data must be an object".to_string()),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn require(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{field} must not be empty"))
    } else {
        Ok(())
    }
}

fn require_opt(field: &str, value: &Option<String>) -> Result<(), String> {
    match value {
        Some(v) => require(field, v),
        None => Ok(()),
    }
}

fn validate(payload: &Payload) -> Result<(), String> {
    match payload {
        Payload::Post(p) => {
            require("title", &p.title)?;
            require("content", &p.content)
        }
        Payload::PostDelete(p) => require("postId", &p.post_id),
        Payload::Comment(c) => validate_comment(c),
        Payload::Like(c) | Payload::Dislike(c) => require("objectId", &c.object_id),
        Payload::Profile(p) => require("name", &p.name),
        Payload::Image(i) => validate_images(i),
        Payload::GroupInfo(g) => require("name", &g.name),
    }
}

fn validate_comment(c: &CommentPayload) -> Result<(), String> {
    require("objectId", &c.object_id)?;
    require_opt("threadId", &c.thread_id)?;
    require_opt("replyId", &c.reply_id)?;
    require_opt("updatedTrxId", &c.updated_trx_id)?;
    require_opt("deletedTrxId", &c.deleted_trx_id)?;

    match (&c.updated_trx_id, &c.deleted_trx_id) {
        (Some(_), Some(_)) => Err("updatedTrxId and deletedTrxId are exclusive".to_string()),
        (None, Some(_)) => Ok(()),
        _ => require("content", &c.content),
    }
}

fn validate_images(i: &ImagePayload) -> Result<(), String> {
    if i.images.is_empty() {
        return Err("images must not be empty".to_string());
    }
    for image in &i.images {
        require("mediaType", &image.media_type)?;
        require("image content", &image.content)?;
    }
    Ok(())
}
