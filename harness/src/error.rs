//! Harness error types
//!
//! Only decode failures are recovered locally (inside the sinks). Everything
//! here propagates to the test driver.

use std::path::PathBuf;
use std::time::Duration;

use shared::SharedError;
use thiserror::Error;

use crate::testing::comparator::Mismatch;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Payload dropped: {0}")]
    Decode(#[from] SharedError),

    #[error("Timed out after {waited:?} waiting for {what} (last observed: {observed})")]
    Timeout {
        what: String,
        observed: usize,
        waited: Duration,
    },

    #[error("Telemetry mismatch: {0}")]
    Mismatch(Box<Mismatch>),

    #[error("Lease error: {0}")]
    Lease(#[from] LeaseError),

    #[error("Golden file {path} was regenerated; review it and rerun without regeneration")]
    RegenerationForced { path: PathBuf },

    #[error("Golden file not found: {path}")]
    GoldenMissing { path: PathBuf },

    #[error("Sink for {protocol} failed to start on {addr}: {source}")]
    SinkStartup {
        protocol: String,
        addr: String,
        source: std::io::Error,
    },

    #[error("No sink configured for {protocol}")]
    SinkNotConfigured { protocol: String },

    #[error("Command `{command}` failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("Assertion failed: {message}")]
    AssertionFailed { message: String },

    #[error("Configuration error: {field}: {reason}")]
    Configuration { field: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl From<Mismatch> for HarnessError {
    fn from(mismatch: Mismatch) -> Self {
        HarnessError::Mismatch(Box::new(mismatch))
    }
}

/// Lease coordination failures; all of them are fatal to the dependent run
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LeaseError {
    #[error("Timed out acquiring lease '{key}' after {waited:?} (held by {holder:?})")]
    AcquireTimeout {
        key: String,
        holder: Option<String>,
        waited: Duration,
    },

    #[error("Leadership of lease '{key}' lost: {reason}")]
    LeadershipLost { key: String, reason: String },

    #[error("Lease '{key}' is not in a state that allows {operation} (state: {state})")]
    InvalidState {
        key: String,
        operation: String,
        state: String,
    },

    #[error("Lease '{key}' still held by {holder} after release")]
    ReleaseUnconfirmed { key: String, holder: String },

    #[error("Invalid lease configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Lease backend error: {message}")]
    Backend { message: String },
}

impl From<std::io::Error> for LeaseError {
    fn from(e: std::io::Error) -> Self {
        LeaseError::Backend {
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for LeaseError {
    fn from(e: serde_json::Error) -> Self {
        LeaseError::Backend {
            message: format!("corrupt lease record: {e}"),
        }
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;
pub type LeaseResult<T> = Result<T, LeaseError>;
