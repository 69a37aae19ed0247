//! Telemetry Assertions
//!
//! Lightweight checks over captured data that do not need a golden file.

use regex::Regex;
use shared::{Attributes, TelemetryBatch};

use crate::error::{HarnessError, HarnessResult};
use crate::runtime::BatchStore;

#[derive(Debug, Clone, PartialEq)]
pub struct AssertionResult {
    pub success: bool,
    pub message: String,
    pub details: Option<String>,
}

impl AssertionResult {
    pub fn success(message: String) -> Self {
        Self {
            success: true,
            message,
            details: None,
        }
    }

    pub fn failure(message: String, details: Option<String>) -> Self {
        Self {
            success: false,
            message,
            details,
        }
    }

    /// Turn a failed assertion into [`HarnessError::AssertionFailed`]
    pub fn into_result(self) -> HarnessResult<()> {
        if self.success {
            return Ok(());
        }
        let message = match self.details {
            Some(details) => format!("{} - {}", self.message, details),
            None => self.message,
        };
        Err(HarnessError::AssertionFailed { message })
    }
}

/// Every pattern key must be present with a value fully matching its regex
///
/// String values are matched as-is, other values by their display form.
pub fn assert_attributes_match(attributes: &Attributes, patterns: &[(&str, &str)]) -> AssertionResult {
    let mut problems = Vec::new();

    for (key, pattern) in patterns {
        let anchored = match Regex::new(&format!("^(?:{pattern})$")) {
            Ok(regex) => regex,
            Err(e) => {
                problems.push(format!("{key}: invalid pattern '{pattern}': {e}"));
                continue;
            }
        };

        match attributes.get(*key) {
            None => problems.push(format!("{key}: missing")),
            Some(value) => {
                let text = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
                if !anchored.is_match(&text) {
                    problems.push(format!("{key}: '{text}' does not match '{pattern}'"));
                }
            }
        }
    }

    if problems.is_empty() {
        AssertionResult::success(format!("All {} attribute patterns matched", patterns.len()))
    } else {
        AssertionResult::failure(
            format!("{} of {} attribute patterns failed", problems.len(), patterns.len()),
            Some(problems.join("; ")),
        )
    }
}

/// Nothing may have been captured
pub fn assert_no_batches(store: &BatchStore) -> AssertionResult {
    let count = store.count();
    if count == 0 {
        AssertionResult::success("No batches captured".to_string())
    } else {
        let entries = store
            .latest()
            .map(|latest| latest.batch.entry_names().into_iter().collect::<Vec<_>>().join(", "))
            .unwrap_or_default();
        AssertionResult::failure(
            format!("Expected no batches, captured {count}"),
            Some(format!("Latest batch entries: [{entries}]")),
        )
    }
}

/// Every entry name of `expected` must appear in `actual`
pub fn assert_contains_entries(expected: &TelemetryBatch, actual: &TelemetryBatch) -> AssertionResult {
    let present = actual.entry_names();
    let missing: Vec<String> = expected
        .entry_names()
        .into_iter()
        .filter(|name| !present.contains(name))
        .collect();

    if missing.is_empty() {
        AssertionResult::success(format!("All {} expected entries present", expected.entry_names().len()))
    } else {
        AssertionResult::failure(
            format!("{} expected entries missing", missing.len()),
            Some(format!("Missing: [{}]", missing.join(", "))),
        )
    }
}

/// Log an [`AssertionResult`] and return early with an error when it failed
#[macro_export]
macro_rules! check {
    ($assertion_result:expr) => {{
        let result: $crate::testing::AssertionResult = $assertion_result;
        if result.success {
            tracing::info!("✅ {}", result.message);
        } else {
            let details = result.details.as_deref().unwrap_or("No additional details");
            tracing::error!("❌ {} - {}", result.message, details);
        }
        result.into_result()?
    }};
}
