//! Crate-level error type and grepable error codes.
//!
//! ERROR HANDLING
//! ==============
//! Backend and transport failures never escape a store as panics. They are
//! converted into [`SyncError`] values (or an error-tagged cache slot) and
//! reported through the notifier with the code from [`ErrorCode`].

use crate::backend::BackendError;
use crate::realtime::transport::TransportError;

/// Structured error code attached to every reported failure.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A mutating operation was attempted without a session.
    #[error("not authenticated")]
    Unauthenticated,
    /// An operation needs an organisation scope but none has been entered.
    #[error("no organisation selected")]
    NoScope,
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl SyncError {
    pub(crate) fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { what, id: id.into() }
    }
}

impl ErrorCode for SyncError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "E_UNAUTHENTICATED",
            Self::NoScope => "E_NO_SCOPE",
            Self::NotFound { .. } => "E_NOT_FOUND",
            Self::Backend(e) => e.error_code(),
            Self::Transport(e) => e.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Backend(e) => e.retryable(),
            Self::Transport(e) => e.retryable(),
            _ => false,
        }
    }
}
