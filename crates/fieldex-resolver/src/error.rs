//! Error types for the resolver layer.

use thiserror::Error;

/// Errors that can occur while asking a backend to resolve fields.
#[derive(Error, Debug)]
pub enum ResolverError {
    /// The request could not be sent or the connection failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with a non-success HTTP status.
    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The backend did not answer in time.
    #[error("request timed out")]
    Timeout,

    /// The reply did not have the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The reply was not valid JSON.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Backend-specific failure.
    #[error("backend error: {0}")]
    Backend(String),
}
