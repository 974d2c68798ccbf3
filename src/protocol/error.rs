//! simlink error types

use std::time::Duration;

use thiserror::Error;

/// simlink errors
#[derive(Error, Debug)]
pub enum Error {
    /// Frame written by a peer built against another protocol version
    #[error("protocol version mismatch: expected {expected}, got {found}")]
    VersionMismatch {
        /// Compiled protocol version
        expected: u16,
        /// Version found in the header
        found: u16,
    },

    /// Body exceeds the maximum message size
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Body size
        size: usize,
        /// Maximum allowed
        max: usize,
    },

    /// Buffer too small
    #[error("buffer too small: need {needed} bytes, got {got}")]
    BufferTooSmall {
        /// Needed size
        needed: usize,
        /// Actual size
        got: usize,
    },

    /// Body serialization failed
    #[error("failed to encode body: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Body deserialization failed
    #[error("failed to decode body: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation did not finish before its deadline
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// What was being attempted
        operation: &'static str,
        /// Deadline that elapsed
        after: Duration,
    },

    /// Address kind not available on this platform
    #[error("unsupported transport: {0}")]
    UnsupportedTransport(String),

    /// Address string could not be parsed
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Subscriber gave up after repeated dial failures
    #[error("gave up reconnecting after {attempts} failed attempts")]
    ReconnectExhausted {
        /// Consecutive failed dials
        attempts: u32,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
