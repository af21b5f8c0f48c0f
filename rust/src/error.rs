//! Error taxonomy for the sync core.

use thiserror::Error;

/// Errors produced by transports, stores and the event dispatcher.
///
/// `Network` and `Timeout` come from the request channel and are the only retryable kinds;
/// retry is always a fresh user action. `StaleResponseDiscarded` and `MalformedEvent` are
/// internal signals that get logged and dropped. `InvalidArgument` means a caller bug.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("network error ({status}): {body}")]
    Network { status: u16, body: String },

    #[error("request timed out")]
    Timeout,

    #[error("stale response discarded: {context}")]
    StaleResponseDiscarded { context: String },

    #[error("malformed {kind} event: {reason}")]
    MalformedEvent { kind: String, reason: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl ChatError {
    pub fn network(status: u16, body: impl Into<String>) -> Self {
        Self::Network {
            status,
            body: body.into(),
        }
    }

    pub fn malformed(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedEvent {
            kind: kind.into(),
            reason: reason.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout)
    }
}
