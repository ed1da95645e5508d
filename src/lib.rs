//! `rum-bbs-indexer` - chain-content indexer for a Quorum/RUM backed forum.
//!
//! The indexer polls each group's append-only content feeds on a Quorum node,
//! classifies every item into a typed payload and applies it to a relational
//! projection (posts, comments, counters, profiles, images, group info and
//! notifications). Each item is applied in exactly one database transaction
//! together with its idempotency-ledger record and cursor move, so restarts
//! and redeliveries never double-apply anything.
//!
//! # Quick Start
//!
//! ```no_run
//! use rum_bbs_indexer::{RumIndexer, RumIndexerConfigBuilder, TelemetryConfig, init_telemetry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     dotenvy::dotenv().ok();
//!     let _guard = init_telemetry(TelemetryConfig::default());
//!
//!     let config = RumIndexerConfigBuilder::new()
//!         .with_quorum(std::env::var("QUORUM_URL")?)
//!         .with_database(std::env::var("DATABASE_URL")?)
//!         .group("3bb7a3be-d145-44af-94cf-e64b992ff8f0")
//!         .build()?;
//!
//!     let indexer = RumIndexer::new(config).await?;
//!     indexer.start().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! 1. **`ContentSource`** - lists a feed from a cursor (`QuorumClient` over HTTP)
//! 2. **Classifier** - decodes `Data` into a [`Payload`] or rejects it
//! 3. **Handlers** - one per payload type; report `Deferred` when a referenced
//!    object has not been indexed yet
//! 4. **`TransactionCoordinator`** - ledger check, handler, notifications,
//!    ledger record and cursor move in one transaction; parks deferred items
//!    in the pending queue
//! 5. **`FanoutQueue`** - pushes notifications and broadcasts after commit
//! 6. **`Poller`** - replays pending items, then fetches new ones, per group
//! 7. **`ConnectionRegistry`** - routes pushes to live client connections

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

// Public API exports
pub use config::{
    DeletePolicy, GroupConfig, GroupStreams, PendingConfig, PoisonConfig, RetryConfig,
    RumIndexerConfig, RumIndexerConfigBuilder,
};
pub use core::{
    ApplyResult, Classification, ClassifiedContent, CycleReport, Effect, HandlerOutcome,
    IndexerMetrics, MetricsSnapshot, Poller, RumIndexer, TransactionCoordinator, classify,
};
pub use realtime::{ConnectionId, ConnectionRegistry, PushEvent, PushMessage, RealtimeChannel};
pub use sources::{ContentSource, QuorumClient};
pub use storage::{MemoryStorage, PgStorage, StorageBackend, StoreTransaction};
pub use telemetry::{TelemetryConfig, TelemetryGuard, init_telemetry};
pub use types::content::{ContentItem, CounterKind, Payload, StreamRole, TrxType};
pub use types::models::{
    Comment, Counter, DeadLetter, DeadLetterReason, GroupInfo, GroupStatus, Image, Notification,
    NotificationStatus, NotificationType, ObjectType, PendingContent, Post, Profile,
    StackedCounter, StatusUpdate,
};
pub use utils::error::{Result, RumIndexerError};
pub use utils::retry::RetryingContentSource;

// Module declarations
pub mod config;
pub mod core;
pub mod realtime;
pub mod sources;
pub mod storage;
pub mod telemetry;
pub mod types;
pub mod utils;
