//! Loader Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! [`ErrorKind`] is `Clone` on purpose: a single failed fetch is handed to
//! every caller that was waiting on it.

use derive_more::{Display, Error};

/// A loader error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for loader operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connection failed, was reset, or the body could not be read.
    #[display("transport error: {_0}")]
    Transport(#[error(not(source))] String),
    /// The connect or overall request timeout elapsed.
    #[display("request timed out")]
    Timeout,
    /// The server answered with a non-success status code.
    #[display("unexpected response status: {_0}")]
    Status(#[error(not(source))] u16),
    /// The response body could not be decoded into the expected payload.
    #[display("could not decode response payload: {_0}")]
    Decode(#[error(not(source))] String),
    /// The shared fetch task was cancelled or panicked before finishing.
    #[display("fetch task aborted")]
    Aborted,
    /// Reading, writing or (de)serializing a persistent cache entry failed.
    #[display("persistent cache error")]
    Cache,
    /// The request could not be built (e.g. unparseable URL).
    #[display("invalid request: {_0}")]
    InvalidRequest(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout | Self::Aborted => true,
            Self::Status(code) => *code == 429 || (500..600).contains(code),
            Self::Decode(_) | Self::Cache | Self::InvalidRequest(_) => false,
        }
    }
}
