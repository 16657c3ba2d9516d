//! Error types for exam generation and the external capabilities.
//!
//! `ProviderError` lives in the core crate so the assembler and scorer can
//! branch on provider failures as ordinary values instead of catching them.

use thiserror::Error;

/// Errors that can occur when calling an external text-generation service.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),

    /// The service answered, but not with the expected JSON shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    /// Short, stable name of the failure kind, used in fallback traces.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::RateLimited { .. } => "rate_limited",
            ProviderError::AuthenticationFailed(_) => "authentication_failed",
            ProviderError::ApiError { .. } => "api_error",
            ProviderError::Timeout(_) => "timeout",
            ProviderError::NetworkError(_) => "network_error",
            ProviderError::MalformedResponse(_) => "malformed_response",
        }
    }
}

/// Errors returned to callers of the exam assembler.
#[derive(Debug, Error)]
pub enum ExamError {
    /// The request itself cannot be served (e.g. zero questions asked for).
    #[error("invalid exam request: {0}")]
    InvalidRequest(String),
}
