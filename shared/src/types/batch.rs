//! Canonical record hierarchy
//!
//! Every ingestion protocol decodes into the same tree:
//! batch → resource groups → scope groups → entries → data points.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::value::{AttrValue, Attributes};

/// Telemetry signal carried by a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Metrics,
    Logs,
    Traces,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalKind::Metrics => write!(f, "metrics"),
            SignalKind::Logs => write!(f, "logs"),
            SignalKind::Traces => write!(f, "traces"),
        }
    }
}

/// Kind of a named series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Gauge,
    Sum,
    Histogram,
    Summary,
    Log,
    Span,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EntryKind::Gauge => "gauge",
            EntryKind::Sum => "sum",
            EntryKind::Histogram => "histogram",
            EntryKind::Summary => "summary",
            EntryKind::Log => "log",
            EntryKind::Span => "span",
        };
        write!(f, "{label}")
    }
}

impl std::str::FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gauge" => Ok(EntryKind::Gauge),
            "sum" => Ok(EntryKind::Sum),
            "histogram" => Ok(EntryKind::Histogram),
            "summary" => Ok(EntryKind::Summary),
            "log" => Ok(EntryKind::Log),
            "span" => Ok(EntryKind::Span),
            other => Err(format!("unknown entry kind '{other}'")),
        }
    }
}

/// One immutable delivery unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryBatch {
    pub signal: SignalKind,
    #[serde(default)]
    pub resources: Vec<ResourceGroup>,
}

/// Attribute-bearing group describing the emitting resource
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceGroup {
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub scopes: Vec<ScopeGroup>,
}

/// Instrumentation scope within a resource
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScopeGroup {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub entries: Vec<Entry>,
}

/// Named series: a metric, a log record or a span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub name: String,
    pub kind: EntryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub points: Vec<DataPoint>,
}

/// Single observation of a series
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataPoint {
    #[serde(default)]
    pub value: AttrValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time_unix_nano: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_unix_nano: Option<u64>,
    #[serde(default)]
    pub attributes: Attributes,
}

impl TelemetryBatch {
    pub fn new(signal: SignalKind) -> Self {
        Self {
            signal,
            resources: Vec::new(),
        }
    }

    pub fn with_resource(mut self, resource: ResourceGroup) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Total number of entries across all resources and scopes
    pub fn record_count(&self) -> usize {
        self.entries().count()
    }

    /// Total number of data points across all entries
    pub fn point_count(&self) -> usize {
        self.entries().map(|entry| entry.points.len()).sum()
    }

    /// Iterate every entry in tree order
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.resources
            .iter()
            .flat_map(|resource| resource.scopes.iter())
            .flat_map(|scope| scope.entries.iter())
    }

    /// Iterate every entry mutably in tree order
    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut Entry> {
        self.resources
            .iter_mut()
            .flat_map(|resource| resource.scopes.iter_mut())
            .flat_map(|scope| scope.entries.iter_mut())
    }

    /// True if any entry carries `name`, optionally restricted to `kind`
    pub fn contains_entry(&self, name: &str, kind: Option<EntryKind>) -> bool {
        self.entries()
            .any(|entry| entry.name == name && kind.is_none_or(|k| entry.kind == k))
    }

    /// Unique entry names, sorted
    pub fn entry_names(&self) -> BTreeSet<String> {
        self.entries().map(|entry| entry.name.clone()).collect()
    }
}

impl ResourceGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attr(mut self, key: &str, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn with_scope(mut self, scope: ScopeGroup) -> Self {
        self.scopes.push(scope);
        self
    }
}

impl ScopeGroup {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    pub fn attr(mut self, key: &str, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn with_entry(mut self, entry: Entry) -> Self {
        self.entries.push(entry);
        self
    }
}

impl Entry {
    pub fn new(name: &str, kind: EntryKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            unit: None,
            attributes: Attributes::new(),
            points: Vec::new(),
        }
    }

    pub fn unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    pub fn attr(mut self, key: &str, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn with_point(mut self, point: DataPoint) -> Self {
        self.points.push(point);
        self
    }
}

impl DataPoint {
    pub fn new(value: impl Into<AttrValue>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn at(mut self, time_unix_nano: u64) -> Self {
        self.time_unix_nano = Some(time_unix_nano);
        self
    }

    pub fn attr(mut self, key: &str, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }
}
