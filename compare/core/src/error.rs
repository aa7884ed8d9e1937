//! Error Types
//!
//! Two error classes reject a whole comparison before any worker starts
//! ([`CompareError`]). Everything that can go wrong with a single backend is
//! an [`UpstreamError`], which workers downgrade into an `error` record.

use thiserror::Error;

/// Errors that reject an entire comparison
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompareError {
    /// Bad or missing input
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Missing upstream credential
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Errors scoped to one upstream backend
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The request could not be sent
    #[error("{0}")]
    Connect(String),

    /// The upstream answered with a non-success status
    #[error("{body}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body text, or the status reason when empty
        body: String,
    },

    /// The upstream accepted the request but sent no stream
    #[error("upstream returned no response body")]
    MissingBody,

    /// The body stream failed while reading
    #[error("{0}")]
    Stream(String),
}

impl UpstreamError {
    /// Wrap a reqwest error raised before the response arrived
    pub fn connect(err: &reqwest::Error) -> Self {
        Self::Connect(err.to_string())
    }

    /// Wrap a reqwest error raised while reading the body
    pub fn stream(err: &reqwest::Error) -> Self {
        Self::Stream(err.to_string())
    }
}

/// Errors from the output sink
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SinkError {
    /// The sink was closed or its consumer went away
    #[error("output sink is closed")]
    Closed,
}
