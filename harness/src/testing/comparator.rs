//! Comparator
//!
//! Structural diff of two record hierarchies under a [`ComparisonRuleSet`].
//! Both sides are normalized on private copies first, then walked
//! resource → scope → entry → point. The outcome is the first differing path
//! with both values, never a bare boolean.

use std::cmp::Reverse;
use std::fmt;

use shared::{AttrValue, Attributes, DataPoint, Entry, ResourceGroup, ScopeGroup, TelemetryBatch};

use crate::error::HarnessResult;
use crate::testing::rules::{ComparisonRuleSet, Level};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchReason {
    ValueDiffers,
    /// Present in the expected side only
    Missing,
    /// Present in the actual side only
    Unexpected,
    LengthDiffers,
    NoCounterpart,
}

impl fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MismatchReason::ValueDiffers => "value differs",
            MismatchReason::Missing => "missing",
            MismatchReason::Unexpected => "unexpected",
            MismatchReason::LengthDiffers => "length differs",
            MismatchReason::NoCounterpart => "no counterpart",
        };
        write!(f, "{label}")
    }
}

/// First difference found between actual and expected
#[derive(Debug, Clone, PartialEq)]
pub struct Mismatch {
    pub path: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
    pub reason: MismatchReason,
}

impl Mismatch {
    fn differs(path: &str, expected: impl fmt::Display, actual: impl fmt::Display) -> Self {
        Self {
            path: path.to_string(),
            expected: Some(expected.to_string()),
            actual: Some(actual.to_string()),
            reason: MismatchReason::ValueDiffers,
        }
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): expected {}, actual {}",
            self.path,
            self.reason,
            self.expected.as_deref().unwrap_or("<absent>"),
            self.actual.as_deref().unwrap_or("<absent>")
        )
    }
}

/// Compares two optional scalars; absence on one side is a reportable difference
fn compare_optional<T: PartialEq + fmt::Display>(path: &str, actual: Option<&T>, expected: Option<&T>) -> Option<Mismatch> {
    let reason = match (expected, actual) {
        (None, None) => return None,
        (Some(e), Some(a)) if e == a => return None,
        (Some(_), Some(_)) => MismatchReason::ValueDiffers,
        (Some(_), None) => MismatchReason::Missing,
        (None, Some(_)) => MismatchReason::Unexpected,
    };
    Some(Mismatch {
        path: path.to_string(),
        expected: expected.map(ToString::to_string),
        actual: actual.map(ToString::to_string),
        reason,
    })
}

fn compare_attributes(path: &str, actual: &Attributes, expected: &Attributes) -> Option<Mismatch> {
    let mut keys: Vec<&String> = expected.keys().chain(actual.keys()).collect();
    keys.sort();
    keys.dedup();

    keys.into_iter().find_map(|key| {
        compare_optional(&format!("{path}[{key:?}]"), actual.get(key), expected.get(key))
    })
}

fn attribute_overlap(a: &Attributes, b: &Attributes) -> usize {
    a.iter().filter(|(key, value)| b.get(*key) == Some(value)).count()
}

fn resource_similarity(actual: &ResourceGroup, expected: &ResourceGroup) -> usize {
    attribute_overlap(&actual.attributes, &expected.attributes) * 2
        + usize::from(actual.scopes.len() == expected.scopes.len())
}

fn scope_similarity(actual: &ScopeGroup, expected: &ScopeGroup) -> usize {
    usize::from(actual.name == expected.name) * 100 + attribute_overlap(&actual.attributes, &expected.attributes)
}

fn entry_similarity(actual: &Entry, expected: &Entry) -> usize {
    usize::from(actual.name == expected.name) * 100
        + usize::from(actual.kind == expected.kind) * 10
        + attribute_overlap(&actual.attributes, &expected.attributes)
}

fn point_similarity(actual: &DataPoint, expected: &DataPoint) -> usize {
    attribute_overlap(&actual.attributes, &expected.attributes) * 2 + usize::from(actual.value == expected.value)
}

type ItemCompare<T> = fn(&Comparator, &str, &T, &T) -> Option<Mismatch>;
type Similarity<T> = fn(&T, &T) -> usize;

#[derive(Debug, Clone, Default)]
pub struct Comparator {
    rules: ComparisonRuleSet,
}

impl Comparator {
    pub fn new(rules: ComparisonRuleSet) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &ComparisonRuleSet {
        &self.rules
    }

    /// First difference between `actual` and `expected`, or `None` when equal
    pub fn compare(&self, actual: &TelemetryBatch, expected: &TelemetryBatch) -> Option<Mismatch> {
        let actual = self.normalize(actual);
        let expected = self.normalize(expected);

        if actual.signal != expected.signal {
            return Some(Mismatch::differs("signal", expected.signal, actual.signal));
        }

        self.compare_list(
            "resources",
            &actual.resources,
            &expected.resources,
            Level::Resource,
            Comparator::compare_resource,
            resource_similarity,
        )
    }

    /// Like [`compare`](Self::compare), as an error
    pub fn ensure_equal(&self, actual: &TelemetryBatch, expected: &TelemetryBatch) -> HarnessResult<()> {
        match self.compare(actual, expected) {
            Some(mismatch) => {
                tracing::warn!("❌ Telemetry mismatch at {}", mismatch);
                Err(mismatch.into())
            }
            None => Ok(()),
        }
    }

    /// Copy of `batch` with every rule applied
    pub fn normalize(&self, batch: &TelemetryBatch) -> TelemetryBatch {
        let mut batch = batch.clone();
        for resource in &mut batch.resources {
            self.normalize_attributes(&mut resource.attributes, Level::Resource);
            for scope in &mut resource.scopes {
                if self.rules.ignores_scope_version() {
                    scope.version = None;
                }
                self.normalize_attributes(&mut scope.attributes, Level::Scope);
                for entry in &mut scope.entries {
                    self.normalize_entry(entry);
                }
            }
        }
        batch
    }

    fn normalize_entry(&self, entry: &mut Entry) {
        self.normalize_attributes(&mut entry.attributes, Level::Entry);
        if self.rules.collapses(&entry.name) {
            entry.points.truncate(1);
        }
        for point in &mut entry.points {
            if self.rules.ignores_timestamps() {
                point.start_time_unix_nano = None;
                point.time_unix_nano = None;
            }
            if self.rules.ignores_point_values() {
                point.value = AttrValue::Empty;
            }
            self.normalize_attributes(&mut point.attributes, Level::Point);
        }
    }

    fn normalize_attributes(&self, attributes: &mut Attributes, level: Level) {
        attributes.retain(|key, _| !self.rules.strips(key));

        for (key, value) in attributes.iter_mut() {
            if let AttrValue::String(text) = value {
                let transformed = self
                    .rules
                    .transforms_for(key, level)
                    .fold(text.clone(), |current, transform| transform.apply(&current));
                *text = transformed;
            }
            // Keep the key so presence is still compared
            if self.rules.ignores_value(key, level) {
                *value = AttrValue::Empty;
            }
        }
    }

    /// Positional comparison, or best pairing when order is ignored at `level`
    ///
    /// Paths use the expected side's index.
    fn compare_list<T>(
        &self,
        path: &str,
        actual: &[T],
        expected: &[T],
        level: Level,
        compare_item: ItemCompare<T>,
        similarity: Similarity<T>,
    ) -> Option<Mismatch> {
        if actual.len() != expected.len() {
            return Some(Mismatch {
                path: path.to_string(),
                expected: Some(format!("{} items", expected.len())),
                actual: Some(format!("{} items", actual.len())),
                reason: MismatchReason::LengthDiffers,
            });
        }

        if !self.rules.ignores_order(level) {
            return expected
                .iter()
                .zip(actual)
                .enumerate()
                .find_map(|(i, (e, a))| compare_item(self, &format!("{path}[{i}]"), a, e));
        }

        // Exact matches first, so a near miss cannot steal an item that has an exact twin
        let mut used = vec![false; actual.len()];
        let mut unmatched = Vec::new();
        for (i, e) in expected.iter().enumerate() {
            let item_path = format!("{path}[{i}]");
            let found = (0..actual.len()).find(|&j| !used[j] && compare_item(self, &item_path, &actual[j], e).is_none());
            match found {
                Some(j) => used[j] = true,
                None => unmatched.push(i),
            }
        }

        for i in unmatched {
            let e = &expected[i];
            let item_path = format!("{path}[{i}]");
            let best = (0..actual.len())
                .filter(|&j| !used[j])
                .max_by_key(|&j| (similarity(&actual[j], e), Reverse(j)));

            let Some(j) = best else {
                return Some(Mismatch {
                    path: item_path,
                    expected: Some("matching item".to_string()),
                    actual: None,
                    reason: MismatchReason::NoCounterpart,
                });
            };
            used[j] = true;
            if let Some(mismatch) = compare_item(self, &item_path, &actual[j], e) {
                return Some(mismatch);
            }
        }

        None
    }

    fn compare_resource(&self, path: &str, actual: &ResourceGroup, expected: &ResourceGroup) -> Option<Mismatch> {
        compare_attributes(&format!("{path}.attributes"), &actual.attributes, &expected.attributes).or_else(|| {
            self.compare_list(
                &format!("{path}.scopes"),
                &actual.scopes,
                &expected.scopes,
                Level::Scope,
                Comparator::compare_scope,
                scope_similarity,
            )
        })
    }

    fn compare_scope(&self, path: &str, actual: &ScopeGroup, expected: &ScopeGroup) -> Option<Mismatch> {
        compare_optional(&format!("{path}.name"), Some(&actual.name), Some(&expected.name))
            .or_else(|| {
                compare_optional(
                    &format!("{path}.version"),
                    actual.version.as_ref(),
                    expected.version.as_ref(),
                )
            })
            .or_else(|| compare_attributes(&format!("{path}.attributes"), &actual.attributes, &expected.attributes))
            .or_else(|| {
                self.compare_list(
                    &format!("{path}.entries"),
                    &actual.entries,
                    &expected.entries,
                    Level::Entry,
                    Comparator::compare_entry,
                    entry_similarity,
                )
            })
    }

    fn compare_entry(&self, path: &str, actual: &Entry, expected: &Entry) -> Option<Mismatch> {
        compare_optional(&format!("{path}.name"), Some(&actual.name), Some(&expected.name))
            .or_else(|| compare_optional(&format!("{path}.kind"), Some(&actual.kind), Some(&expected.kind)))
            .or_else(|| compare_optional(&format!("{path}.unit"), actual.unit.as_ref(), expected.unit.as_ref()))
            .or_else(|| compare_attributes(&format!("{path}.attributes"), &actual.attributes, &expected.attributes))
            .or_else(|| {
                self.compare_list(
                    &format!("{path}.points"),
                    &actual.points,
                    &expected.points,
                    Level::Point,
                    Comparator::compare_point,
                    point_similarity,
                )
            })
    }

    fn compare_point(&self, path: &str, actual: &DataPoint, expected: &DataPoint) -> Option<Mismatch> {
        compare_optional(&format!("{path}.value"), Some(&actual.value), Some(&expected.value))
            .or_else(|| {
                compare_optional(
                    &format!("{path}.start_time_unix_nano"),
                    actual.start_time_unix_nano.as_ref(),
                    expected.start_time_unix_nano.as_ref(),
                )
            })
            .or_else(|| {
                compare_optional(
                    &format!("{path}.time_unix_nano"),
                    actual.time_unix_nano.as_ref(),
                    expected.time_unix_nano.as_ref(),
                )
            })
            .or_else(|| compare_attributes(&format!("{path}.attributes"), &actual.attributes, &expected.attributes))
    }
}
