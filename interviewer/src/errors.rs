use std::fmt;

use thiserror::Error;

/// Failure categories reported by a completion provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorKind {
    Connection,
    RateLimit,
    ServiceUnavailable,
    Timeout,
    TryAgain,
    Authentication,
    InvalidRequest,
    Api,
    Decode,
}

impl ProviderErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderErrorKind::Connection => "connection",
            ProviderErrorKind::RateLimit => "rate_limit",
            ProviderErrorKind::ServiceUnavailable => "service_unavailable",
            ProviderErrorKind::Timeout => "timeout",
            ProviderErrorKind::TryAgain => "try_again",
            ProviderErrorKind::Authentication => "authentication",
            ProviderErrorKind::InvalidRequest => "invalid_request",
            ProviderErrorKind::Api => "api",
            ProviderErrorKind::Decode => "decode",
        }
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed call to the remote completion API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
    pub status: Option<u16>,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("prompt must contain exactly 1 instance of '{marker}' token, found {found}")]
    Validation { marker: &'static str, found: usize },

    #[error("completion failed after {attempts} attempt(s): {source}")]
    Transient {
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    #[error("completion rejected by provider: {0}")]
    Permanent(#[source] ProviderError),

    #[error("malformed completion response: {0}")]
    InvalidResponse(String),
}

impl CompletionError {
    /// The provider failure behind this error, if the remote API was reached.
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            CompletionError::Transient { source, .. } => Some(source),
            CompletionError::Permanent(source) => Some(source),
            _ => None,
        }
    }
}
