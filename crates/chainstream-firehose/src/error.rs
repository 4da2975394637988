//! Error types for the firehose services.

use thiserror::Error;

/// Startup configuration errors. Raised before any stream is opened.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("[{0}] is required")]
    Missing(&'static str),

    #[error("[{key}] is invalid ({value:?}): {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Errors issuing an API token.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token request failed: {0}")]
    Http(String),

    #[error("token endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected token response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Http(e.to_string())
        }
    }
}

/// Errors resolving dates to block numbers.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("lookup request failed: {0}")]
    Http(String),

    #[error("lookup returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected lookup response: {0}")]
    Decode(String),

    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),

    #[error("start block {start} is after stop block {stop}")]
    InvalidRange { start: u64, stop: u64 },
}

impl From<reqwest::Error> for LookupError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Http(e.to_string())
        }
    }
}
