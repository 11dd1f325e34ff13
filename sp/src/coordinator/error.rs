//! Coordinator error types

use std::time::Duration;
use thiserror::Error;

/// Why a caller's work context ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("context cancelled")]
    Cancelled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Errors returned to the immediate caller of the Coordinator API
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("matching agent not found for {target:?}: {reason}")]
    NoMatchingAgent { target: String, reason: ContextError },

    #[error("scrape cancelled while awaiting result")]
    Cancelled,

    #[error("scrape deadline exceeded while awaiting result")]
    DeadlineExceeded,

    #[error("no caller waiting for scrape {id} after {waited:?}")]
    DeliveryTimeout { id: String, waited: Duration },

    #[error("scrape result has no Id header")]
    MissingId,

    #[error("coordinator is shutting down")]
    ShuttingDown,
}

impl CoordinatorError {
    /// Check if the caller may reasonably retry
    pub fn is_retryable(&self) -> bool {
        match self {
            CoordinatorError::NoMatchingAgent { .. } => true,
            CoordinatorError::Cancelled => false,
            CoordinatorError::DeadlineExceeded => true,
            CoordinatorError::DeliveryTimeout { .. } => false,
            CoordinatorError::MissingId => false,
            CoordinatorError::ShuttingDown => false,
        }
    }
}

impl From<ContextError> for CoordinatorError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::Cancelled => CoordinatorError::Cancelled,
            ContextError::DeadlineExceeded => CoordinatorError::DeadlineExceeded,
        }
    }
}
