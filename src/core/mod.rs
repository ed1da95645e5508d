pub mod classifier;
pub mod coordinator;
pub mod fanout;
pub mod handlers;
pub mod indexer;
pub mod metrics;
pub mod poller;

pub use classifier::{Classification, ClassifiedContent, classify};
pub use coordinator::{ApplyResult, TransactionCoordinator};
pub use fanout::FanoutQueue;
pub use handlers::{ContentHandler, Effect, HandlerOutcome, HandlerSet, TrxContext};
pub use indexer::RumIndexer;
pub use metrics::{IndexerMetrics, MetricsSnapshot};
pub use poller::{CycleReport, PollPhase, Poller};
