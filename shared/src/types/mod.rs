//! Core types shared by every harness component

pub mod batch;
pub mod value;

pub use batch::{DataPoint, Entry, EntryKind, ResourceGroup, ScopeGroup, SignalKind, TelemetryBatch};
pub use value::{AttrValue, Attributes};
