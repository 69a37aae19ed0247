//! Runtime
//!
//! Capture side of the harness: protocol sinks feeding batch stores, the
//! waiter that blocks the test flow on them, the lease guarding the shared
//! environment, and the per-run context tying them together.

pub mod context;
pub mod endpoint;
pub mod lease;
pub mod lease_backend;
pub mod sink;
pub mod store;
pub mod waiter;

// Re-export main types
pub use context::RunContext;
pub use endpoint::{host_endpoint, host_port, host_port_http};
pub use lease::{LeaseConfig, LeaseCoordinator, LeaseEvent, LeaseState, holder_identity};
pub use lease_backend::{FileLeaseBackend, InMemoryLeaseBackend, LeaseBackend, LeaseRecord, MockLeaseBackend};
pub use sink::{ApiStubHandle, SinkHandle, SinkSet};
pub use store::{BatchStore, CapturedBatch, StoreStats};
pub use waiter::{Probe, WaitPolicy, Waiter};
