//! Shared types for the telemetry capture harness
//!
//! Contains the canonical record hierarchy every sink decodes into, the
//! payload decoder seam, shared errors and tracing setup.

pub mod codec;
pub mod errors;
pub mod logging;
pub mod types;

pub use codec::{JsonBatchDecoder, PayloadDecoder, Protocol};
pub use logging::{log_error, log_shutdown, log_startup};
pub use errors::*;
pub use types::*;
