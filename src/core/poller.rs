//! Polling loop over every configured group.
//!
//! One cycle per group is `FetchPending -> ApplyPending* -> FetchNew ->
//! ApplyNew*`; after all groups the loop sleeps, longer when the whole cycle
//! found nothing new. Cancellation is observed between items and while
//! sleeping, never inside an open transaction.

use crate::config::{GroupConfig, PoisonConfig, RumIndexerConfig};
use crate::core::coordinator::{ApplyResult, TransactionCoordinator};
use crate::core::fanout::FanoutQueue;
use crate::core::handlers::Effect;
use crate::core::metrics::IndexerMetrics;
use crate::realtime::{PushEvent, RealtimeChannel};
use crate::sources::ContentSource;
use crate::types::content::StreamRole;
use crate::types::models::StatusUpdate;
use crate::utils::error::{Result, RumIndexerError};
use crate::utils::logging;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Where a group cycle was when it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    FetchPending,
    ApplyPending,
    FetchNew,
    ApplyNew,
}

impl fmt::Display for PollPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FetchPending => "fetch-pending",
            Self::ApplyPending => "apply-pending",
            Self::FetchNew => "fetch-new",
            Self::ApplyNew => "apply-new",
        })
    }
}

/// Totals for one pass over all groups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub applied: usize,
    pub deferred: usize,
    pub invalid: usize,
    pub pending_resolved: usize,
    pub aborted_groups: Vec<String>,
}

impl CycleReport {
    pub fn is_idle(&self) -> bool {
        self.fetched == 0
    }
}

pub struct Poller {
    source: Arc<dyn ContentSource>,
    coordinator: TransactionCoordinator,
    fanout: FanoutQueue,
    groups: Vec<GroupConfig>,
    batch_size: usize,
    poll_interval: Duration,
    idle_backoff_factor: u32,
    poison: PoisonConfig,
    /// Consecutive failures per `(group, trx)`.
    failures: HashMap<(String, String), u32>,
    span: tracing::Span,
    cancellation_token: CancellationToken,
    metrics: Arc<IndexerMetrics>,
}

impl Poller {
    pub fn new(
        config: &RumIndexerConfig,
        source: Arc<dyn ContentSource>,
        coordinator: TransactionCoordinator,
        channel: Arc<dyn RealtimeChannel>,
        metrics: Arc<IndexerMetrics>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            source,
            coordinator,
            fanout: FanoutQueue::new(channel),
            groups: config.groups.clone(),
            batch_size: config.batch_size,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            idle_backoff_factor: config.idle_backoff_factor,
            poison: config.poison,
            failures: HashMap::new(),
            span: config.log_span.clone(),
            cancellation_token,
            metrics,
        }
    }

    /// Runs every cycle inside `span` instead of the configured one.
    #[must_use]
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    /// Sleep before the next cycle.
    pub fn next_delay(&self, report: &CycleReport) -> Duration {
        if report.is_idle() {
            self.poll_interval * self.idle_backoff_factor
        } else {
            self.poll_interval
        }
    }

    /// Loops until the cancellation token fires.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            if self.cancellation_token.is_cancelled() {
                break;
            }

            let started = Instant::now();
            let report = self.run_cycle().await;

            if !report.is_idle() || report.pending_resolved > 0 {
                let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                logging::log_cycle(
                    report.fetched,
                    report.applied,
                    report.pending_resolved,
                    duration_ms,
                );
                self.metrics.report();
            }

            let delay = self.next_delay(&report);
            tokio::select! {
                () = self.cancellation_token.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!("Poller stopped");
        Ok(())
    }

    /// One pass over all groups, inside the poller's span. Errors never
    /// escape: a failing group is logged and retried next cycle.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let span = self.span.clone();
        self.cycle_all_groups().instrument(span).await
    }

    async fn cycle_all_groups(&mut self) -> CycleReport {
        let mut report = CycleReport::default();
        let groups = self.groups.clone();

        for group in &groups {
            if self.cancellation_token.is_cancelled() {
                break;
            }
            if let Err((phase, e)) = self.poll_group(group, &mut report).await {
                logging::log_error(
                    &format!("group {} aborted during {phase}", group.group_id),
                    &e.to_string(),
                );
                report.aborted_groups.push(group.group_id.clone());
            }
            let pushed = self.fanout.flush();
            self.metrics.add_pushed(pushed);
        }
        report
    }

    async fn poll_group(
        &mut self,
        group: &GroupConfig,
        report: &mut CycleReport,
    ) -> std::result::Result<(), (PollPhase, RumIndexerError)> {
        let group_id = group.group_id.as_str();
        let storage = self.coordinator.storage().clone();

        // Pending replay, oldest first.
        let pending = storage
            .list_pending(group_id)
            .await
            .map_err(|e| (PollPhase::FetchPending, e))?;
        for entry in &pending {
            if self.cancellation_token.is_cancelled() {
                return Ok(());
            }
            let key = (entry.group_id.clone(), entry.trx_id.clone());
            match self.coordinator.apply_pending(entry).await {
                Ok(result) => {
                    self.failures.remove(&key);
                    if let ApplyResult::Applied(effects) = result {
                        report.pending_resolved += 1;
                        report.applied += 1;
                        self.fanout.push(effects);
                    }
                }
                Err(e) => {
                    if e.is_poison() && self.record_failure(key) {
                        self.coordinator
                            .quarantine_pending(entry, &e.to_string())
                            .await
                            .map_err(|e| (PollPhase::ApplyPending, e))?;
                        continue;
                    }
                    return Err((PollPhase::ApplyPending, e));
                }
            }
        }

        let status = storage
            .group_status(group_id)
            .await
            .map_err(|e| (PollPhase::FetchNew, e))?;

        let mut fetched = 0;
        for (role, chain_id) in group.streams() {
            if self.cancellation_token.is_cancelled() {
                return Ok(());
            }
            let items = self
                .source
                .list_contents(chain_id, status.cursor(role), self.batch_size)
                .await
                .map_err(|e| (PollPhase::FetchNew, e))?;
            fetched += items.len();
            report.fetched += items.len();

            for item in &items {
                if self.cancellation_token.is_cancelled() {
                    return Ok(());
                }
                let key = (group_id.to_string(), item.trx_id.clone());
                match self.coordinator.apply_new(group_id, role, item).await {
                    Ok(result) => {
                        self.failures.remove(&key);
                        match result {
                            ApplyResult::Applied(effects) => {
                                report.applied += 1;
                                self.fanout.push(effects);
                            }
                            ApplyResult::Deferred { .. } => report.deferred += 1,
                            ApplyResult::Invalid(_) => report.invalid += 1,
                            ApplyResult::Duplicate | ApplyResult::DeadLettered => {}
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            group_id,
                            trx_id = %item.trx_id,
                            role = %role,
                            error = %e,
                            "Failed to apply content"
                        );
                        if e.is_poison() && self.record_failure(key) {
                            self.coordinator
                                .quarantine(group_id, role, item, &e.to_string())
                                .await
                                .map_err(|e| (PollPhase::ApplyNew, e))?;
                            continue;
                        }
                        return Err((PollPhase::ApplyNew, e));
                    }
                }
            }
        }

        if fetched == 0 && !status.loaded {
            storage
                .update_group_status(group_id, &StatusUpdate::loaded())
                .await
                .map_err(|e| (PollPhase::FetchNew, e))?;
            tracing::info!(group_id, "Group caught up");
            self.fanout.push(vec![Effect::broadcast(
                group_id,
                PushEvent::GroupLoaded,
                serde_json::json!({ "groupId": group_id }),
            )]);
        }
        Ok(())
    }

    /// Counts a deterministic failure; true once the item should be
    /// quarantined. Outages never reach this.
    fn record_failure(&mut self, key: (String, String)) -> bool {
        let Some(max) = self.poison.max_failures else {
            return false;
        };
        let count = self.failures.entry(key.clone()).or_insert(0);
        *count += 1;
        if *count >= max {
            self.failures.remove(&key);
            true
        } else {
            false
        }
    }
}
