//! Configuration Management
//!
//! Harness configuration, its builder and the environment switches.

pub mod builder;
pub mod harness;
pub mod switches;

// Re-export main types
pub use builder::HarnessConfigBuilder;
pub use harness::{HarnessConfig, SIGNALFX_API_PORT, SinkConfig};
pub use switches::HarnessSwitches;
