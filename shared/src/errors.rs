//! Shared error types for the capture harness

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Payload decode failed for {protocol}: {message}")]
    DecodeError { protocol: String, message: String },

    #[error("Signal mismatch on {protocol}: expected {expected}, got {actual}")]
    SignalMismatch {
        protocol: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfig { field: String, value: String },
}

pub type SharedResult<T> = Result<T, SharedError>;
