//! Telemetry Capture & Verification Harness
//!
//! Captures the telemetry a pipeline under test emits and checks it against
//! reviewed reference snapshots, tolerating reordering, duplicates and
//! volatile fields.
//!
//! ## Main Interface
//!
//! A run is described by a [`HarnessConfig`] and executed by a
//! [`ScenarioRunner`], which builds the [`RunContext`] (sinks, waiter, golden
//! store, optional lease) and drives a [`Scenario`] through setup, verify and
//! teardown.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use harness::*;
//! use shared::Protocol;
//!
//! # async fn run() -> HarnessResult<()> {
//! let config = HarnessConfig::builder()
//!     .default_sink(Protocol::HecMetrics)
//!     .golden_root("testdata")
//!     .build()?;
//!
//! let scenario = GoldenScenario::new(
//!     "cluster receiver",
//!     Protocol::HecMetrics,
//!     "expected_cluster_receiver.yaml",
//!     Marker::new("k8s.node.condition_ready"),
//! )
//! .rules(ComparisonRuleSet::unordered().ignore_field_value("k8s.pod.uid", FieldScope::Any));
//!
//! ScenarioRunner::new(config).run(&scenario).await
//! # }
//! ```

// Core modules
pub mod config;
pub mod error;
pub mod runtime;
pub mod scenarios;
pub mod testing;

// Main interfaces - re-exported at crate root for convenience
pub use config::{HarnessConfig, HarnessConfigBuilder, HarnessSwitches, SinkConfig};
pub use error::{HarnessError, HarnessResult, LeaseError, LeaseResult};
pub use runtime::{BatchStore, CapturedBatch, RunContext, WaitPolicy, Waiter};
pub use scenarios::{GoldenScenario, Scenario, ScenarioRunner};

// Supporting types
pub use runtime::{ApiStubHandle, LeaseConfig, LeaseCoordinator, LeaseState, SinkHandle, SinkSet};
pub use testing::{AssertionResult, Comparator, ComparisonRuleSet, FieldScope, GoldenStore, Level, Marker, Mismatch};
pub use testing::{Scrubber, Selector, ValueTransform};
