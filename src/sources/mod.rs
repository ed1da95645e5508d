//! Where chain content comes from.
//!
//! The pipeline only depends on [`ContentSource`]; [`QuorumClient`] is the
//! HTTP implementation against a Quorum node, and tests script their own.

pub mod quorum;

use crate::types::content::ContentItem;
use crate::utils::error::Result;
use async_trait::async_trait;

pub use quorum::QuorumClient;

#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Returns up to `count` items of `group_id`'s feed that follow
    /// `start_trx` (or the feed start when `None`), oldest first.
    ///
    /// Fewer than `count` items means the feed is exhausted for now.
    async fn list_contents(
        &self,
        group_id: &str,
        start_trx: Option<&str>,
        count: usize,
    ) -> Result<Vec<ContentItem>>;
}
