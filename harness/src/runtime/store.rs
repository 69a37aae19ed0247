//! Batch Store
//!
//! Append-only, arrival-ordered list of decoded batches shared between the
//! sink handlers (producers) and the test flow (single consumer).

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{Protocol, TelemetryBatch};
use uuid::Uuid;

/// A batch as stored by a sink
#[derive(Debug, Clone)]
pub struct CapturedBatch {
    pub batch: Arc<TelemetryBatch>,
    /// Position in the store since the last reset
    pub arrival: usize,
    pub protocol: Protocol,
    pub received_at: DateTime<Utc>,
    pub batch_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct StoreStats {
    pub total_batches: usize,
    pub total_records: usize,
    pub total_points: usize,
    pub oldest_batch: Option<DateTime<Utc>>,
    pub newest_batch: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct BatchStore {
    batches: Arc<RwLock<Vec<CapturedBatch>>>,
}

impl BatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a decoded batch and return its arrival index
    pub fn append(&self, protocol: Protocol, batch: TelemetryBatch) -> usize {
        let mut batches = self.batches.write().unwrap_or_else(PoisonError::into_inner);
        let arrival = batches.len();
        batches.push(CapturedBatch {
            batch: Arc::new(batch),
            arrival,
            protocol,
            received_at: Utc::now(),
            batch_id: Uuid::new_v4(),
        });
        arrival
    }

    /// Point-in-time snapshot; later appends are not visible in it
    pub fn all_batches(&self) -> Vec<CapturedBatch> {
        let batches = self.batches.read().unwrap_or_else(PoisonError::into_inner);
        batches.clone()
    }

    pub fn count(&self) -> usize {
        let batches = self.batches.read().unwrap_or_else(PoisonError::into_inner);
        batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Most recently appended batch
    pub fn latest(&self) -> Option<CapturedBatch> {
        let batches = self.batches.read().unwrap_or_else(PoisonError::into_inner);
        batches.last().cloned()
    }

    /// Drop every stored batch in one step
    pub fn reset(&self) {
        let previous = {
            let mut batches = self.batches.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *batches)
        };
        tracing::info!("🗑️ Batch store reset, dropped {} batches", previous.len());
    }

    pub fn stats(&self) -> StoreStats {
        let batches = self.batches.read().unwrap_or_else(PoisonError::into_inner);

        StoreStats {
            total_batches: batches.len(),
            total_records: batches.iter().map(|b| b.batch.record_count()).sum(),
            total_points: batches.iter().map(|b| b.batch.point_count()).sum(),
            oldest_batch: batches.iter().map(|b| b.received_at).min(),
            newest_batch: batches.iter().map(|b| b.received_at).max(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{DataPoint, Entry, EntryKind, ResourceGroup, ScopeGroup, SignalKind};

    fn log_batch(line: &str) -> TelemetryBatch {
        TelemetryBatch::new(SignalKind::Logs).with_resource(
            ResourceGroup::new().with_scope(
                ScopeGroup::new("filelog")
                    .with_entry(Entry::new("line", EntryKind::Log).with_point(DataPoint::new(line))),
            ),
        )
    }

    #[test]
    fn test_append_assigns_arrival_order() {
        let store = BatchStore::new();
        assert_eq!(store.append(Protocol::HecLogs, log_batch("a")), 0);
        assert_eq!(store.append(Protocol::HecLogs, log_batch("b")), 1);

        let batches = store.all_batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].arrival, 0);
        assert_eq!(batches[1].arrival, 1);
        assert_ne!(batches[0].batch_id, batches[1].batch_id);
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_appends() {
        let store = BatchStore::new();
        store.append(Protocol::HecLogs, log_batch("a"));

        let snapshot = store.all_batches();
        store.append(Protocol::HecLogs, log_batch("b"));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.count(), 2);
    }

    #[test]
    fn test_reset_clears_and_restarts_arrival() {
        let store = BatchStore::new();
        store.append(Protocol::HecLogs, log_batch("a"));
        store.append(Protocol::HecLogs, log_batch("b"));
        let before = store.all_batches();

        store.reset();

        assert!(store.is_empty());
        assert_eq!(before.len(), 2, "earlier snapshots survive a reset");
        assert_eq!(store.append(Protocol::HecLogs, log_batch("c")), 0);
    }

    #[test]
    fn test_clones_share_the_same_list() {
        let store = BatchStore::new();
        let handle = store.clone();
        handle.append(Protocol::HecLogs, log_batch("a"));
        assert_eq!(store.count(), 1);
        assert_eq!(store.latest().unwrap().arrival, 0);
    }

    #[test]
    fn test_concurrent_appends_keep_every_batch() {
        let store = BatchStore::new();
        let threads: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        store.append(Protocol::HecLogs, log_batch(&format!("{t}-{i}")));
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        let batches = store.all_batches();
        assert_eq!(batches.len(), 400);
        for (i, captured) in batches.iter().enumerate() {
            assert_eq!(captured.arrival, i);
            assert_eq!(captured.batch.record_count(), 1);
        }
    }

    #[test]
    fn test_stats() {
        let store = BatchStore::new();
        assert!(store.stats().oldest_batch.is_none());

        store.append(Protocol::HecLogs, log_batch("a"));
        store.append(Protocol::HecLogs, log_batch("b"));

        let stats = store.stats();
        assert_eq!(stats.total_batches, 2);
        assert_eq!(stats.total_records, 2);
        assert_eq!(stats.total_points, 2);
        assert!(stats.oldest_batch <= stats.newest_batch);
    }
}
