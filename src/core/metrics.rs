//! Runtime counters for the indexing pipeline.
//!
//! Counts what happened to every item, per transaction type where the type is
//! known, and reports the totals to the log.

use crate::types::content::TrxType;
use std::sync::atomic::{AtomicU64, Ordering};

const TYPES: usize = TrxType::ALL.len();

fn zeroed() -> [AtomicU64; TYPES] {
    std::array::from_fn(|_| AtomicU64::new(0))
}

#[derive(Debug)]
pub struct IndexerMetrics {
    applied: [AtomicU64; TYPES],
    deferred: [AtomicU64; TYPES],
    failed: [AtomicU64; TYPES],
    invalid: AtomicU64,
    duplicate: AtomicU64,
    pending_resolved: AtomicU64,
    dead_lettered: AtomicU64,
    quarantined: AtomicU64,
    pushed: AtomicU64,
}

/// Point-in-time copy of [`IndexerMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub applied: [u64; TYPES],
    pub deferred: [u64; TYPES],
    pub failed: [u64; TYPES],
    pub invalid: u64,
    pub duplicate: u64,
    pub pending_resolved: u64,
    pub dead_lettered: u64,
    pub quarantined: u64,
    pub pushed: u64,
}

impl MetricsSnapshot {
    pub fn applied_of(&self, trx_type: TrxType) -> u64 {
        self.applied[trx_type.index()]
    }

    pub fn total_applied(&self) -> u64 {
        self.applied.iter().sum()
    }
}

impl Default for IndexerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexerMetrics {
    pub fn new() -> Self {
        Self {
            applied: zeroed(),
            deferred: zeroed(),
            failed: zeroed(),
            invalid: AtomicU64::new(0),
            duplicate: AtomicU64::new(0),
            pending_resolved: AtomicU64::new(0),
            dead_lettered: AtomicU64::new(0),
            quarantined: AtomicU64::new(0),
            pushed: AtomicU64::new(0),
        }
    }

    pub fn inc_applied(&self, trx_type: TrxType) {
        self.applied[trx_type.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_deferred(&self, trx_type: TrxType) {
        self.deferred[trx_type.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed(&self, trx_type: TrxType) {
        self.failed[trx_type.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_invalid(&self) {
        self.invalid.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_duplicate(&self) {
        self.duplicate.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_pending_resolved(&self) {
        self.pending_resolved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dead_lettered(&self) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_quarantined(&self) {
        self.quarantined.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_pushed(&self, n: usize) {
        self.pushed.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |arr: &[AtomicU64; TYPES]| -> [u64; TYPES] {
            std::array::from_fn(|i| arr[i].load(Ordering::Relaxed))
        };
        MetricsSnapshot {
            applied: load(&self.applied),
            deferred: load(&self.deferred),
            failed: load(&self.failed),
            invalid: self.invalid.load(Ordering::Relaxed),
            duplicate: self.duplicate.load(Ordering::Relaxed),
            pending_resolved: self.pending_resolved.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            quarantined: self.quarantined.load(Ordering::Relaxed),
            pushed: self.pushed.load(Ordering::Relaxed),
        }
    }

    /// Reports current totals to the log.
    pub fn report(&self) {
        let s = self.snapshot();
        let per_type = TrxType::ALL
            .iter()
            .filter(|t| s.applied[t.index()] + s.deferred[t.index()] + s.failed[t.index()] > 0)
            .map(|t| {
                format!(
                    "{}={}/{}/{}",
                    t.as_str(),
                    s.applied[t.index()],
                    s.deferred[t.index()],
                    s.failed[t.index()]
                )
            })
            .collect::<Vec<_>>()
            .join(" ");

        tracing::info!(
            applied = s.total_applied(),
            invalid = s.invalid,
            duplicate = s.duplicate,
            pending_resolved = s.pending_resolved,
            dead_lettered = s.dead_lettered,
            quarantined = s.quarantined,
            pushed = s.pushed,
            "Indexer stats (applied/deferred/failed): {}",
            if per_type.is_empty() { "-" } else { per_type.as_str() }
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_per_type() {
        let metrics = IndexerMetrics::new();
        metrics.inc_applied(TrxType::Post);
        metrics.inc_applied(TrxType::Post);
        metrics.inc_applied(TrxType::Counter);
        metrics.inc_deferred(TrxType::Comment);
        metrics.inc_invalid();
        metrics.add_pushed(3);

        let s = metrics.snapshot();
        assert_eq!(s.applied_of(TrxType::Post), 2);
        assert_eq!(s.applied_of(TrxType::Counter), 1);
        assert_eq!(s.total_applied(), 3);
        assert_eq!(s.deferred[TrxType::Comment.index()], 1);
        assert_eq!(s.invalid, 1);
        assert_eq!(s.pushed, 3);
        metrics.report();
    }
}
