//! Error types for the Online Labs API client.
//!
//! # Design
//! Callers need to tell apart four failure classes: arguments rejected before
//! any I/O (`Validation`), network failures (`Transport`), bodies that are not
//! JSON (`InvalidJson`), and errors the remote service reported itself (`Api`,
//! `Http`). Nothing is retried; every variant reaches the caller as-is.

use thiserror::Error;

/// Errors returned by `OlClient` operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A caller-supplied argument failed a local check. No request was sent.
    #[error("{0}")]
    Validation(String),

    /// Connection refused, DNS failure, timeout or a broken response stream.
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The response body could not be decoded as JSON.
    #[error("The API server doesn't respond with a valid json")]
    InvalidJson(#[source] serde_json::Error),

    /// The service reported an error through `error_message` or `message`.
    #[error("{0}")]
    Api(String),

    /// Error status without a structured message in the body.
    #[error("HTTP error status {status}")]
    Http { status: u16 },

    /// The envelope did not contain the field the operation unwraps.
    #[error("response is missing the `{0}` field")]
    MissingField(&'static str),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),
}

impl ApiError {
    pub fn transport<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ApiError::Transport(Box::new(err))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ApiError::Validation(_))
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Transport(_))
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, ApiError::InvalidJson(_))
    }

    /// True for errors signalled by the remote service, structured or not.
    pub fn is_api(&self) -> bool {
        matches!(self, ApiError::Api(_) | ApiError::Http { .. })
    }

    /// HTTP status carried by the error, when one is known.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status } => Some(*status),
            _ => None,
        }
    }
}
