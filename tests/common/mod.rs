#![allow(dead_code)]

use async_trait::async_trait;
use rum_bbs_indexer::{
    ContentItem, ContentSource, CycleReport, GroupConfig, MemoryStorage, Poller, Result,
    RumIndexer, RumIndexerConfigBuilder, RumIndexerError,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

/// Scripted in-memory chain node: one append-only feed per chain group id.
#[derive(Default)]
pub struct MockSource {
    feeds: Mutex<HashMap<String, Vec<ContentItem>>>,
    clock: AtomicI64,
    pub calls: AtomicUsize,
}

impl MockSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Appends an item authored by `sender` to `chain_id`'s feed.
    pub fn publish(&self, chain_id: &str, trx_id: &str, sender: &str, data: Value) -> ContentItem {
        let timestamp = 1_700_000_000_000_000_000 + self.clock.fetch_add(1, Ordering::SeqCst);
        self.publish_at(chain_id, trx_id, sender, data, timestamp)
    }

    pub fn publish_at(
        &self,
        chain_id: &str,
        trx_id: &str,
        sender: &str,
        data: Value,
        timestamp: i64,
    ) -> ContentItem {
        let item = ContentItem {
            trx_id: trx_id.to_string(),
            group_id: chain_id.to_string(),
            sender_pubkey: sender.to_string(),
            data,
            timestamp,
        };
        self.feeds
            .lock()
            .unwrap()
            .entry(chain_id.to_string())
            .or_default()
            .push(item.clone());
        item
    }
}

#[async_trait]
impl ContentSource for MockSource {
    async fn list_contents(
        &self,
        group_id: &str,
        start_trx: Option<&str>,
        count: usize,
    ) -> Result<Vec<ContentItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let feeds = self
            .feeds
            .lock()
            .map_err(|e| RumIndexerError::InternalError(e.to_string()))?;
        let Some(feed) = feeds.get(group_id) else {
            return Ok(Vec::new());
        };
        let from = match start_trx {
            Some(trx) => feed
                .iter()
                .position(|i| i.trx_id == trx)
                .map_or(0, |p| p + 1),
            None => 0,
        };
        Ok(feed.iter().skip(from).take(count).cloned().collect())
    }
}

pub struct Harness {
    pub storage: MemoryStorage,
    pub source: Arc<MockSource>,
    pub indexer: RumIndexer,
    pub poller: Poller,
}

impl Harness {
    pub fn new(group_id: &str) -> Self {
        Self::with_builder(RumIndexerConfigBuilder::new().group(group_id))
    }

    pub fn with_group(group: GroupConfig) -> Self {
        Self::with_builder(RumIndexerConfigBuilder::new().with_group(group))
    }

    /// Fills in the URLs and a short poll interval on top of `builder`.
    pub fn with_builder(builder: RumIndexerConfigBuilder) -> Self {
        let config = builder
            .with_quorum("http://127.0.0.1:8002")
            .with_database("postgresql://localhost/rum_test")
            .with_poll_interval_ms(10)
            .build()
            .unwrap();
        let storage = MemoryStorage::new();
        let source = MockSource::new();
        let indexer =
            RumIndexer::new_with_components(config, Arc::new(storage.clone()), source.clone());
        let poller = indexer.poller();
        Self {
            storage,
            source,
            indexer,
            poller,
        }
    }

    pub async fn cycle(&mut self) -> CycleReport {
        self.poller.run_cycle().await
    }

    pub async fn cycles(&mut self, n: usize) {
        for _ in 0..n {
            self.poller.run_cycle().await;
        }
    }
}

pub fn post(title: &str) -> Value {
    json!({"type": "post", "title": title, "content": format!("{title} body")})
}

pub fn comment(object_id: &str, content: &str) -> Value {
    json!({"type": "comment", "objectId": object_id, "content": content})
}

pub fn reply(object_id: &str, thread_id: &str, reply_id: Option<&str>, content: &str) -> Value {
    let mut data = json!({
        "type": "comment",
        "objectId": object_id,
        "threadId": thread_id,
        "content": content,
    });
    if let Some(reply_id) = reply_id {
        data["replyId"] = json!(reply_id);
    }
    data
}

pub fn like(object_id: &str) -> Value {
    json!({"type": "like", "objectId": object_id})
}

pub fn dislike(object_id: &str) -> Value {
    json!({"type": "dislike", "objectId": object_id})
}
