//! The crate-wide error type.
//!
//! "The referenced object has not been indexed yet" is not an error here:
//! handlers report it as [`crate::HandlerOutcome::Deferred`] and the
//! coordinator parks the item in the pending queue.

use thiserror::Error;

/// Everything that can go wrong while indexing.
#[derive(Debug, Error)]
pub enum RumIndexerError {
    /// A query or connection failure in the PostgreSQL backend.
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// A failure reported by a storage backend that is not SQL based.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// The content source failed for a reason other than an HTTP status.
    #[error("Content source error: {0}")]
    SourceError(String),

    /// Connection refused, timeout or TLS failure talking to the node.
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// A content list, stored row or pending entry that could not be decoded.
    #[error("Decoding error: {0}")]
    DecodingError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Invalid or missing settings, raised by the config builder and the binary.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Environment variable error: {0}")]
    EnvVarError(#[from] std::env::VarError),

    #[error("Internal error: {0}")]
    InternalError(String),

    /// A handler cannot process this content, and will fail the same way on
    /// every retry.
    #[error("Handler error: {0}")]
    HandlerError(String),

    /// A write broke a uniqueness rule of a non-SQL store.
    #[error("Constraint violation: {0}")]
    ConstraintError(String),

    /// The chain node answered a content listing with a non-success status.
    #[error("Node returned {status}: {message}")]
    NodeStatus { status: u16, message: String },

    /// The retrying source gave up on a transient error.
    #[error("Retry exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted {
        /// Calls made, the first one included.
        attempts: u32,
        last_error: String,
    },
}

impl RumIndexerError {
    /// True when applying the same item again will fail the same way.
    ///
    /// Only these failures count towards quarantine. Connection loss, pool
    /// timeouts and failed commits are outages: the item is retried from the
    /// same cursor until the store recovers.
    pub fn is_poison(&self) -> bool {
        match self {
            Self::HandlerError(_)
            | Self::ConstraintError(_)
            | Self::DecodingError(_)
            | Self::SerializationError(_) => true,
            Self::DatabaseError(e) => is_deterministic_sql(e),
            _ => false,
        }
    }
}

fn is_deterministic_sql(err: &sqlx::Error) -> bool {
    match err {
        // SQLSTATE class 22 is data exceptions, class 23 constraint violations.
        sqlx::Error::Database(db) => db
            .code()
            .is_some_and(|code| code.starts_with("22") || code.starts_with("23")),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::TypeNotFound { .. } => {
            true
        }
        _ => false,
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RumIndexerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outages_are_not_poison() {
        assert!(!RumIndexerError::StorageError("commit failed".into()).is_poison());
        assert!(!RumIndexerError::DatabaseError(sqlx::Error::PoolTimedOut).is_poison());
        assert!(!RumIndexerError::DatabaseError(sqlx::Error::Io(std::io::Error::other("reset")))
            .is_poison());
        assert!(!RumIndexerError::InternalError("join".into()).is_poison());
    }

    #[test]
    fn test_deterministic_failures_are_poison() {
        assert!(RumIndexerError::HandlerError("bad".into()).is_poison());
        assert!(RumIndexerError::DecodingError("row".into()).is_poison());
        assert!(RumIndexerError::ConstraintError("duplicate post p1".into()).is_poison());
        let json = serde_json::from_str::<u8>("x").unwrap_err();
        assert!(RumIndexerError::from(json).is_poison());
    }
}
