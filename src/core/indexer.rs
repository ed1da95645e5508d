//! Main indexer orchestrator that wires all components together.
//!
//! `RumIndexer` owns the storage backend, the content source, the connection
//! registry and the shutdown token, and drives the [`Poller`] until shutdown.

use crate::{
    config::RumIndexerConfig,
    core::{coordinator::TransactionCoordinator, metrics::IndexerMetrics, poller::Poller},
    realtime::ConnectionRegistry,
    sources::{ContentSource, QuorumClient},
    storage::{PgStorage, StorageBackend},
    utils::{error::Result, logging, retry::RetryingContentSource},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Main indexer that runs the polling pipeline.
///
/// # Example
///
/// ```no_run
/// use rum_bbs_indexer::{RumIndexer, RumIndexerConfigBuilder};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = RumIndexerConfigBuilder::new()
///     .with_quorum("http://127.0.0.1:8002")
///     .with_database("postgresql://localhost/rum")
///     .group("3bb7a3be-d145-44af-94cf-e64b992ff8f0")
///     .build()?;
///
/// let indexer = RumIndexer::new(config).await?;
/// let registry = indexer.connection_registry();
/// // hand `registry` to the websocket layer, then:
/// indexer.start().await?;
/// # Ok(())
/// # }
/// ```
pub struct RumIndexer {
    config: RumIndexerConfig,
    storage: Arc<dyn StorageBackend>,
    source: Arc<dyn ContentSource>,
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<IndexerMetrics>,
    cancellation_token: CancellationToken,
}

impl RumIndexer {
    /// Connects to PostgreSQL, creates the schema and sets up the node client.
    ///
    /// # Errors
    ///
    /// Returns error if the database connection or schema creation fails.
    pub async fn new(config: RumIndexerConfig) -> Result<Self> {
        let storage = PgStorage::new(&config.database_url, config.db_max_connections).await?;
        storage.initialize().await?;

        let client = QuorumClient::new(config.quorum_url.clone(), config.jwt.clone());
        let source = RetryingContentSource::new(client, config.retry.clone());

        Ok(Self::new_with_components(
            config,
            Arc::new(storage),
            Arc::new(source),
        ))
    }

    /// Creates an indexer over caller-provided storage and source.
    ///
    /// This is useful for testing with [`crate::MemoryStorage`] and a
    /// scripted source.
    pub fn new_with_components(
        config: RumIndexerConfig,
        storage: Arc<dyn StorageBackend>,
        source: Arc<dyn ContentSource>,
    ) -> Self {
        Self {
            config,
            storage,
            source,
            registry: Arc::new(ConnectionRegistry::new()),
            metrics: Arc::new(IndexerMetrics::new()),
            cancellation_token: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RumIndexerConfig {
        &self.config
    }

    /// Returns a reference to the storage backend.
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    /// Registry the websocket layer registers live connections in.
    #[must_use]
    pub fn connection_registry(&self) -> Arc<ConnectionRegistry> {
        self.registry.clone()
    }

    #[must_use]
    pub fn metrics(&self) -> Arc<IndexerMetrics> {
        self.metrics.clone()
    }

    /// Token that stops the poller when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Builds a poller sharing this indexer's components.
    pub fn poller(&self) -> Poller {
        let coordinator = TransactionCoordinator::new(
            self.storage.clone(),
            self.config.delete_policy,
            self.config.pending,
            self.metrics.clone(),
        );
        Poller::new(
            &self.config,
            self.source.clone(),
            coordinator,
            self.registry.clone(),
            self.metrics.clone(),
            self.cancellation_token.clone(),
        )
    }

    /// Runs until Ctrl+C or [`shutdown`](Self::shutdown).
    ///
    /// # Errors
    ///
    /// Returns error if the poller fails to start.
    pub async fn start(self) -> Result<()> {
        let token = self.cancellation_token.clone();
        let ctrl_c_token = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        logging::log_error("Failed to listen for Ctrl+C", &e.to_string());
                        return;
                    }
                    tracing::info!("Shutdown signal received");
                    ctrl_c_token.cancel();
                }
                () = ctrl_c_token.cancelled() => {}
            }
        });

        let group_ids: Vec<String> = self
            .config
            .groups
            .iter()
            .map(|g| g.group_id.clone())
            .collect();
        logging::log_startup(
            &self.config.quorum_url,
            &group_ids,
            self.config.poll_interval_ms,
        );

        let mut poller = self.poller();
        let result = poller.run().await;
        token.cancel();
        logging::log_section("Indexer stopped");
        result
    }

    /// Stops the poller after the item in flight.
    pub fn shutdown(&self) {
        self.cancellation_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RumIndexerConfigBuilder;
    use crate::storage::MemoryStorage;
    use crate::types::content::ContentItem;
    use async_trait::async_trait;

    struct EmptySource;

    #[async_trait]
    impl ContentSource for EmptySource {
        async fn list_contents(
            &self,
            _group_id: &str,
            _start_trx: Option<&str>,
            _count: usize,
        ) -> Result<Vec<ContentItem>> {
            Ok(Vec::new())
        }
    }

    fn indexer(storage: &MemoryStorage) -> RumIndexer {
        let config = RumIndexerConfigBuilder::new()
            .with_quorum("http://127.0.0.1:8002")
            .with_database("postgresql://localhost/rum")
            .group("g1")
            .with_poll_interval_ms(10)
            .build()
            .unwrap();
        RumIndexer::new_with_components(config, Arc::new(storage.clone()), Arc::new(EmptySource))
    }

    #[tokio::test]
    async fn test_shutdown_stops_start() {
        let storage = MemoryStorage::new();
        let indexer = indexer(&storage);
        let token = indexer.cancellation_token();

        let handle = tokio::spawn(indexer.start());
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        token.cancel();

        let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert!(storage.group_status("g1").await.unwrap().loaded);
    }

    #[tokio::test]
    async fn test_components_are_shared() {
        let storage = MemoryStorage::new();
        let indexer = indexer(&storage);
        assert!(Arc::ptr_eq(
            &indexer.connection_registry(),
            &indexer.connection_registry()
        ));
        indexer.shutdown();
        assert!(indexer.cancellation_token().is_cancelled());
    }
}
