//! Scrubber / Reducer
//!
//! Normalization applied before comparison and before writing golden files:
//! drops entries known to be flaky and caps the number of points per series.

use std::collections::BTreeSet;

use shared::TelemetryBatch;

#[derive(Debug, Clone, Default)]
pub struct Scrubber {
    flaky: BTreeSet<String>,
    max_points: Option<usize>,
}

impl Scrubber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries to remove wherever they appear
    pub fn flaky<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flaky.extend(names.into_iter().map(Into::into));
        self
    }

    /// Keep at most `max` points per series
    pub fn max_points(mut self, max: usize) -> Self {
        self.max_points = Some(max);
        self
    }

    /// Scrubbed copy; the input is left untouched
    pub fn scrub(&self, batch: &TelemetryBatch) -> TelemetryBatch {
        let mut copy = batch.clone();
        self.scrub_in_place(&mut copy);
        copy
    }

    pub fn scrub_in_place(&self, batch: &mut TelemetryBatch) {
        let removed = remove_flaky_entries(batch, &self.flaky);
        let dropped = self.max_points.map_or(0, |max| reduce_points(batch, max));
        if removed > 0 || dropped > 0 {
            tracing::debug!("🧽 Scrubbed {} flaky entries and {} surplus points", removed, dropped);
        }
    }
}

/// Remove entries named in `flaky`; returns how many were removed
pub fn remove_flaky_entries(batch: &mut TelemetryBatch, flaky: &BTreeSet<String>) -> usize {
    if flaky.is_empty() {
        return 0;
    }
    let mut removed = 0;
    for resource in &mut batch.resources {
        for scope in &mut resource.scopes {
            let before = scope.entries.len();
            scope.entries.retain(|entry| !flaky.contains(&entry.name));
            removed += before - scope.entries.len();
        }
    }
    removed
}

/// Keep the first `max` points of every series; returns how many were dropped
pub fn reduce_points(batch: &mut TelemetryBatch, max: usize) -> usize {
    batch
        .entries_mut()
        .map(|entry| {
            let surplus = entry.points.len().saturating_sub(max);
            entry.points.truncate(max);
            surplus
        })
        .sum()
}

/// Unique entry names of a batch, sorted
pub fn entry_names(batch: &TelemetryBatch) -> Vec<String> {
    batch.entry_names().into_iter().collect()
}
