//! Verification
//!
//! Selection of a candidate batch, rule-driven comparison, golden files,
//! normalization and ad-hoc assertions.

pub mod assertions;
pub mod comparator;
pub mod golden;
pub mod rules;
pub mod scrubber;
pub mod selector;

// Re-export main types
pub use assertions::{AssertionResult, assert_attributes_match, assert_contains_entries, assert_no_batches};
pub use comparator::{Comparator, Mismatch, MismatchReason};
pub use golden::{GoldenSnapshot, GoldenStore, canonical_form};
pub use rules::{ComparisonRuleSet, FieldScope, Level, Rule, ValueTransform};
pub use scrubber::{Scrubber, entry_names, reduce_points, remove_flaky_entries};
pub use selector::{Marker, Selector};
