//! Error taxonomy shared by every orchestration boundary.
//!
//! Store collaborators return `anyhow::Result`; services convert those
//! failures into [`Error`] so the HTTP layer can map each variant to a
//! status code without string matching.

use crate::vector::VectorError;

/// Result alias for operations that surface the [`Error`] taxonomy.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error returned by core services.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Document or user is absent, or not owned by the caller.
    #[error("not found")]
    NotFound,

    /// Invalid or expired credential, or ownership mismatch.
    #[error("unauthorized")]
    Unauthorized,

    /// Article extraction or embedding provider failed or timed out.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Malformed input: bad id, invalid email, oversized document.
    #[error("validation error: {0}")]
    Validation(String),

    /// Persistence failure. Details are logged, never shown to users.
    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }
}

/// Failure talking to an external provider (embedding or extraction).
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out")]
    Timeout,

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider returned no embedding")]
    EmptyResponse,

    #[error("embedding has {actual} dimensions, expected {expected}")]
    Dimension { expected: usize, actual: usize },

    #[error("embedding has zero norm")]
    Degenerate,

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("provider is disabled")]
    Disabled,
}

impl From<VectorError> for ProviderError {
    fn from(err: VectorError) -> Self {
        match err {
            VectorError::ZeroNorm => ProviderError::Degenerate,
            VectorError::DimensionMismatch { expected, actual } => {
                ProviderError::Dimension { expected, actual }
            }
            other => ProviderError::InvalidResponse(other.to_string()),
        }
    }
}
