//! Retries for chain node listings.
//!
//! Nodes restart, sit behind rate limiting proxies and time out under load,
//! so a single failed listing should not abort a group's cycle. Only failures
//! that can clear up on their own are retried: 429, 5xx, timeouts and dropped
//! connections. Any other 4xx means the request itself is wrong and is
//! returned at once.

use crate::config::RetryConfig;
use crate::sources::ContentSource;
use crate::types::content::ContentItem;
use crate::utils::error::{Result, RumIndexerError};
use async_trait::async_trait;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::sleep;

/// Delay before retry number `retry` (1-based): `initial_backoff_ms` grown by
/// `backoff_multiplier` per retry and capped at `max_backoff_ms`.
#[must_use]
pub fn backoff(cfg: &RetryConfig, retry: u32) -> Duration {
    let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
    let grown = cfg.initial_backoff_ms as f64 * cfg.backoff_multiplier.powi(exponent);
    let mut ms = grown.min(cfg.max_backoff_ms as f64);
    if cfg.jitter {
        ms *= jitter_factor();
    }
    Duration::from_millis(ms as u64)
}

/// Somewhere in `[0.75, 1.25]`, so groups polled together spread their retries.
fn jitter_factor() -> f64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    0.75 + f64::from(nanos % 1_000_000) / 1_000_000.0 * 0.5
}

fn is_retryable_status(status: u16) -> bool {
    status == 429 || status >= 500
}

/// Whether the same listing request can succeed if sent again.
#[must_use]
pub fn is_retryable(err: &RumIndexerError) -> bool {
    match err {
        RumIndexerError::NodeStatus { status, .. } => is_retryable_status(*status),
        RumIndexerError::HttpError(e) => match e.status() {
            Some(status) => is_retryable_status(status.as_u16()),
            None => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
        },
        // Sources other than the HTTP client report outages this way.
        RumIndexerError::SourceError(_) => true,
        _ => false,
    }
}

/// Wraps a [`ContentSource`] and retries failed listings with backoff.
///
/// After `max_retries` retries the last error is returned as
/// [`RumIndexerError::RetryExhausted`], and the poller aborts the group's
/// cycle with its cursor unchanged.
///
/// # Example
///
/// ```no_run
/// use rum_bbs_indexer::{ContentSource, QuorumClient, RetryConfig, RetryingContentSource};
/// use std::sync::Arc;
///
/// let node = QuorumClient::new("http://127.0.0.1:8002", None);
/// let source: Arc<dyn ContentSource> =
///     Arc::new(RetryingContentSource::new(node, RetryConfig::default()));
/// ```
pub struct RetryingContentSource<S> {
    inner: S,
    config: RetryConfig,
}

impl<S: ContentSource> RetryingContentSource<S> {
    pub fn new(inner: S, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl<S: ContentSource> ContentSource for RetryingContentSource<S> {
    async fn list_contents(
        &self,
        group_id: &str,
        start_trx: Option<&str>,
        count: usize,
    ) -> Result<Vec<ContentItem>> {
        let cursor = start_trx.unwrap_or("-");
        let mut retries = 0u32;

        loop {
            let err = match self.inner.list_contents(group_id, start_trx, count).await {
                Ok(items) => {
                    if retries > 0 {
                        tracing::info!(group_id, start_trx = cursor, retries, "Listing recovered");
                    }
                    return Ok(items);
                }
                Err(err) if !is_retryable(&err) => return Err(err),
                Err(err) => err,
            };

            if retries >= self.config.max_retries {
                tracing::error!(
                    group_id,
                    start_trx = cursor,
                    attempts = retries + 1,
                    error = %err,
                    "Giving up on listing"
                );
                return Err(RumIndexerError::RetryExhausted {
                    attempts: retries + 1,
                    last_error: err.to_string(),
                });
            }

            retries += 1;
            let delay = backoff(&self.config, retries);
            tracing::warn!(
                group_id,
                start_trx = cursor,
                retry = retries,
                max_retries = self.config.max_retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "Listing failed, retrying"
            );
            sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tracing::field::{Field, Visit};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 4,
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    fn node(status: u16) -> RumIndexerError {
        RumIndexerError::NodeStatus {
            status,
            message: "listing contents of group g".into(),
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let cfg = fast();
        assert_eq!(backoff(&cfg, 1), Duration::from_millis(1));
        assert_eq!(backoff(&cfg, 2), Duration::from_millis(2));
        assert_eq!(backoff(&cfg, 3), Duration::from_millis(4));
        assert_eq!(backoff(&cfg, 40), Duration::from_millis(4));
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let cfg = RetryConfig {
            initial_backoff_ms: 1000,
            max_backoff_ms: 1000,
            jitter: true,
            ..fast()
        };
        let delay = backoff(&cfg, 1).as_millis();
        assert!((750..=1250).contains(&delay));
    }

    #[test]
    fn test_only_recoverable_node_failures_are_retried() {
        assert!(is_retryable(&node(429)));
        assert!(is_retryable(&node(500)));
        assert!(is_retryable(&node(503)));
        assert!(!is_retryable(&node(400)));
        assert!(!is_retryable(&node(401)));
        assert!(!is_retryable(&node(404)));
        assert!(is_retryable(&RumIndexerError::SourceError("reset".into())));
        assert!(!is_retryable(&RumIndexerError::DecodingError("bad".into())));
        assert!(!is_retryable(&RumIndexerError::StorageError("x".into())));
    }

    struct FlakySource {
        calls: Arc<AtomicU32>,
        failures: u32,
        error: fn() -> RumIndexerError,
    }

    impl FlakySource {
        fn new(failures: u32, error: fn() -> RumIndexerError) -> (Self, Arc<AtomicU32>) {
            let calls = Arc::new(AtomicU32::new(0));
            let source = Self {
                calls: calls.clone(),
                failures,
                error,
            };
            (source, calls)
        }
    }

    #[async_trait]
    impl ContentSource for FlakySource {
        async fn list_contents(
            &self,
            _group_id: &str,
            _start_trx: Option<&str>,
            _count: usize,
        ) -> Result<Vec<ContentItem>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err((self.error)())
            } else {
                Ok(Vec::new())
            }
        }
    }

    #[tokio::test]
    async fn test_rate_limited_listing_is_retried() {
        let (inner, calls) = FlakySource::new(2, || node(429));
        let source = RetryingContentSource::new(inner, fast());
        let items = source.list_contents("g", Some("t9"), 10).await.unwrap();
        assert!(items.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_error_is_returned_at_once() {
        let (inner, calls) = FlakySource::new(5, || node(404));
        let source = RetryingContentSource::new(inner, fast());
        let err = source.list_contents("g", None, 10).await.unwrap_err();
        assert!(matches!(err, RumIndexerError::NodeStatus { status: 404, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_attempts() {
        let (inner, calls) = FlakySource::new(u32::MAX, || node(502));
        let source = RetryingContentSource::new(inner, fast());
        match source.list_contents("g", None, 10).await {
            Err(RumIndexerError::RetryExhausted {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 4);
                assert!(last_error.contains("502"));
            }
            other => panic!("expected RetryExhausted, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    /// Message and `start_trx` field of every event.
    #[derive(Clone, Default)]
    struct EventLog {
        events: Arc<Mutex<Vec<(String, String)>>>,
    }

    #[derive(Default)]
    struct Fields {
        message: String,
        start_trx: String,
    }

    impl Visit for Fields {
        fn record_str(&mut self, field: &Field, value: &str) {
            if field.name() == "start_trx" {
                self.start_trx = value.to_string();
            }
        }

        fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
            if field.name() == "message" {
                self.message = format!("{value:?}");
            }
        }
    }

    impl<S: tracing::Subscriber> Layer<S> for EventLog {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            let mut fields = Fields::default();
            event.record(&mut fields);
            self.events
                .lock()
                .unwrap()
                .push((fields.message, fields.start_trx));
        }
    }

    #[tokio::test]
    async fn test_last_failure_logs_give_up_not_retry() {
        let log = EventLog::default();
        let _guard =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(log.clone()));
        let (inner, _) = FlakySource::new(u32::MAX, || node(503));
        let source = RetryingContentSource::new(
            inner,
            RetryConfig {
                max_retries: 1,
                ..fast()
            },
        );

        assert!(source.list_contents("g", Some("t7"), 10).await.is_err());

        let events = log.events.lock().unwrap();
        let messages: Vec<&str> = events.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(messages, vec!["Listing failed, retrying", "Giving up on listing"]);
        assert!(events.iter().all(|(_, cursor)| cursor == "t7"));
    }
}
