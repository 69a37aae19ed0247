//! Selector
//!
//! Picks the captured batch to compare against a reference. Batches are
//! scanned newest-first; the first one carrying the marker entry (and, when
//! shape matching is on, the same resource and record counts as the
//! reference) wins. This is a heuristic, not an identification.

use shared::{EntryKind, TelemetryBatch};

use crate::error::HarnessResult;
use crate::runtime::{BatchStore, CapturedBatch, Probe, WaitPolicy, Waiter};

/// Entry that identifies the batches of interest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub name: String,
    pub kind: Option<EntryKind>,
}

impl Marker {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: None,
        }
    }

    pub fn kind(mut self, kind: EntryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn is_in(&self, batch: &TelemetryBatch) -> bool {
        batch.contains_entry(&self.name, self.kind)
    }
}

#[derive(Debug, Clone)]
pub struct Selector {
    marker: Marker,
    match_shape: bool,
}

impl Selector {
    /// Selector that also requires matching shape
    pub fn new(marker: Marker) -> Self {
        Self {
            marker,
            match_shape: true,
        }
    }

    pub fn match_shape(mut self, enabled: bool) -> Self {
        self.match_shape = enabled;
        self
    }

    pub fn marker(&self) -> &Marker {
        &self.marker
    }

    pub fn matches(&self, expected: &TelemetryBatch, candidate: &TelemetryBatch) -> bool {
        if !self.marker.is_in(candidate) {
            return false;
        }
        !self.match_shape
            || (candidate.resource_count() == expected.resource_count()
                && candidate.record_count() == expected.record_count())
    }

    /// Most recent batch compatible with `expected`
    pub fn select(&self, expected: &TelemetryBatch, batches: &[CapturedBatch]) -> Option<CapturedBatch> {
        batches
            .iter()
            .rev()
            .find(|captured| self.matches(expected, &captured.batch))
            .cloned()
    }

    /// Re-poll `store` until a compatible batch shows up
    pub async fn select_with_timeout(
        &self,
        waiter: &Waiter,
        store: &BatchStore,
        expected: &TelemetryBatch,
        policy: WaitPolicy,
    ) -> HarnessResult<CapturedBatch> {
        let what = format!("a batch with marker '{}'", self.marker.name);
        let selected = waiter
            .wait_for(&what, policy, || {
                let batches = store.all_batches();
                match self.select(expected, &batches) {
                    Some(captured) => Probe::Ready(captured),
                    None => Probe::Pending {
                        observed: batches.len(),
                    },
                }
            })
            .await?;

        tracing::info!(
            "🎯 Selected batch #{} ({} resources, {} records) for marker '{}'",
            selected.arrival,
            selected.batch.resource_count(),
            selected.batch.record_count(),
            self.marker.name
        );
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{DataPoint, Entry, Protocol, ResourceGroup, ScopeGroup, SignalKind};
    use std::time::Duration;

    fn metrics(names: &[&str], resources: usize) -> TelemetryBatch {
        let scope = names.iter().fold(ScopeGroup::new("receiver"), |scope, name| {
            scope.with_entry(Entry::new(name, EntryKind::Gauge).with_point(DataPoint::new(1i64)))
        });
        let mut batch = TelemetryBatch::new(SignalKind::Metrics).with_resource(ResourceGroup::new().with_scope(scope));
        for _ in 1..resources {
            batch = batch.with_resource(ResourceGroup::new());
        }
        batch
    }

    fn store_with(batches: Vec<TelemetryBatch>) -> BatchStore {
        let store = BatchStore::new();
        for batch in batches {
            store.append(Protocol::HecMetrics, batch);
        }
        store
    }

    #[test]
    fn test_only_marker_batch_with_matching_shape_is_selected() {
        let expected = metrics(&["k8s.pod.phase", "k8s.node.ready"], 1);
        let store = store_with(vec![
            metrics(&["noise"], 1),
            metrics(&["k8s.pod.phase"], 1),
            metrics(&["k8s.pod.phase", "k8s.node.ready", "extra"], 1),
            metrics(&["noise", "other"], 1),
            metrics(&["k8s.pod.phase", "k8s.node.ready"], 1),
        ]);

        let selected = Selector::new(Marker::new("k8s.pod.phase"))
            .select(&expected, &store.all_batches())
            .unwrap();
        assert_eq!(selected.arrival, 4);
    }

    #[test]
    fn test_newest_compatible_batch_wins() {
        let expected = metrics(&["up"], 1);
        let store = store_with(vec![metrics(&["up"], 1), metrics(&["up"], 1), metrics(&["down"], 1)]);

        let selected = Selector::new(Marker::new("up")).select(&expected, &store.all_batches()).unwrap();
        assert_eq!(selected.arrival, 1);
    }

    #[test]
    fn test_resource_count_is_part_of_the_shape() {
        let expected = metrics(&["up"], 2);
        let batches = store_with(vec![metrics(&["up"], 1)]).all_batches();

        let selector = Selector::new(Marker::new("up"));
        assert!(selector.select(&expected, &batches).is_none());
        assert!(selector.match_shape(false).select(&expected, &batches).is_some());
    }

    #[test]
    fn test_marker_kind_is_respected() {
        let expected = metrics(&["up"], 1);
        let batches = store_with(vec![metrics(&["up"], 1)]).all_batches();

        let wrong_kind = Selector::new(Marker::new("up").kind(EntryKind::Sum));
        assert!(wrong_kind.select(&expected, &batches).is_none());
        let right_kind = Selector::new(Marker::new("up").kind(EntryKind::Gauge));
        assert!(right_kind.select(&expected, &batches).is_some());
    }

    #[tokio::test]
    async fn test_select_with_timeout_waits_for_late_batch() {
        let store = BatchStore::new();
        let expected = metrics(&["up"], 1);
        let producer = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            producer.append(Protocol::HecMetrics, metrics(&["noise"], 1));
            producer.append(Protocol::HecMetrics, metrics(&["up"], 1));
        });

        let policy = WaitPolicy::new(Duration::from_secs(2), Duration::from_millis(20));
        let selected = Selector::new(Marker::new("up"))
            .select_with_timeout(&Waiter::new(), &store, &expected, policy)
            .await
            .unwrap();
        assert_eq!(selected.arrival, 1);
    }

    #[tokio::test]
    async fn test_select_with_timeout_reports_batches_seen() {
        let store = store_with(vec![metrics(&["noise"], 1)]);
        let policy = WaitPolicy::new(Duration::from_millis(100), Duration::from_millis(20));

        let err = Selector::new(Marker::new("up"))
            .select_with_timeout(&Waiter::new(), &store, &metrics(&["up"], 1), policy)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::HarnessError::Timeout { observed: 1, .. }));
    }
}
