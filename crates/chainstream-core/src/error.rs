//! Error types for the chainstream pipeline.

use thiserror::Error;

/// Status codes reported by the remote stream service.
///
/// Mirrors the subset of gRPC status codes the engine distinguishes; the
/// rest are carried through as [`RemoteCode::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCode {
    Cancelled,
    InvalidArgument,
    DeadlineExceeded,
    Unauthenticated,
    Unavailable,
    Internal,
    Unknown,
    Other(i32),
}

impl std::fmt::Display for RemoteCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "cancelled"),
            Self::InvalidArgument => write!(f, "invalid-argument"),
            Self::DeadlineExceeded => write!(f, "deadline-exceeded"),
            Self::Unauthenticated => write!(f, "unauthenticated"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::Internal => write!(f, "internal"),
            Self::Unknown => write!(f, "unknown"),
            Self::Other(code) => write!(f, "code-{code}"),
        }
    }
}

/// Errors raised by a block source or its connection handle.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    /// The remote service terminated the stream with a status.
    #[error("remote error ({code}): {details}")]
    Remote { code: RemoteCode, details: String },

    /// The transport could not be opened.
    #[error("connect failed: {0}")]
    Connect(String),

    /// No authorization token could be obtained.
    #[error("authorization failed: {0}")]
    Auth(String),

    /// A resource release step failed during exit.
    #[error("release failed: {0}")]
    Release(String),

    #[error("invalid block range: start {start} > stop {stop}")]
    InvalidRange { start: u64, stop: u64 },
}

impl StreamError {
    /// Shorthand for a remote status error.
    pub fn remote(code: RemoteCode, details: impl Into<String>) -> Self {
        Self::Remote {
            code,
            details: details.into(),
        }
    }

    /// Free-text details used by the marker-based classification fallback.
    pub fn details(&self) -> String {
        match self {
            Self::Remote { details, .. } => details.clone(),
            other => other.to_string(),
        }
    }
}

/// Errors produced while turning a typed payload into a [`crate::Block`].
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload type mismatch: expected {expected}, got {got:?}")]
    SchemaMismatch { expected: String, got: String },

    #[error("malformed block payload: {0}")]
    Malformed(#[from] prost::DecodeError),
}
