//! Error types for the WASP client.

use reqwest::StatusCode;
use thiserror::Error;
use wasp_core::CoreError;

/// Errors that can occur when using the WASP client.
#[derive(Debug, Error)]
pub enum Error {
    /// Network failure (connection refused, DNS, timeout, ...) on every configured URL.
    #[error("transport error: {0}")]
    Transport(String),

    /// HTTP error with a status code that has no more specific meaning.
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// Collection, record, view, file or tag does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The record is malformed or lacks mandatory tags.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The record collides with an existing one on its key tags.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An update was attempted on a sealed record.
    #[error("record is immutable: {0}")]
    ImmutableRecord(String),

    /// A metadata update used a key that is not a metadata key.
    #[error("invalid metadata key: {0}")]
    InvalidMetadataKey(String),

    /// The tag is not declared in the collection schema.
    #[error("tag not found: {0}")]
    TagNotFound(String),

    /// A server-side action terminated unsuccessfully.
    #[error("action '{action}' failed with HTTP {status}: {message}")]
    Action {
        /// Action name.
        action: String,
        /// HTTP status code returned for the run.
        status: u16,
        /// Response body.
        message: String,
    },

    /// The operation needs configuration the client or value does not have.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Response deserialization error.
    #[error("failed to deserialize response: {0}")]
    Deserialization(String),

    /// Local file system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a request was doing, used to give status codes their meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorContext {
    Read,
    Create,
    Update,
    Metadata,
    File,
}

impl Error {
    /// Returns `true` if this error is retryable.
    ///
    /// Transport errors and HTTP 5xx errors return `true`.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns the HTTP status code carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } | Self::Action { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Map an unsuccessful, non-5xx response to an error.
    pub(crate) fn from_status(status: StatusCode, message: String, context: ErrorContext) -> Self {
        let message = if message.trim().is_empty() {
            status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string()
        } else {
            message.trim().to_string()
        };

        match (status.as_u16(), context) {
            (404, _) => Self::NotFound(message),
            (400 | 422, ErrorContext::Metadata) => Self::InvalidMetadataKey(message),
            (400 | 422, _) => Self::Validation(message),
            (403 | 409 | 423, ErrorContext::Update) => Self::ImmutableRecord(message),
            (409, _) => Self::Conflict(message),
            (status, _) => Self::Http { status, message },
        }
    }
}

impl From<CoreError> for Error {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::TagNotFound(tag) => Self::TagNotFound(tag),
            CoreError::MissingMandatory(_) => Self::Validation(err.to_string()),
            CoreError::Malformed(message) => Self::Deserialization(message),
        }
    }
}
