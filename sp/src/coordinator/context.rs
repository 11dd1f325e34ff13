//! Work context - the caller's cancellation and deadline signal

use std::time::Duration;

use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use super::error::ContextError;

/// Roughly 30 years, used when a timeout would overflow `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Cancellation + deadline signal carried by a scrape from its caller
///
/// Clones share the same cancellation token, so cancelling any clone ends
/// the context everywhere (including inside a queued work request).
#[derive(Debug, Clone)]
pub struct WorkContext {
    deadline: Instant,
    token: CancellationToken,
}

impl WorkContext {
    /// Create a context that expires `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        let now = Instant::now();
        let deadline = now.checked_add(timeout).unwrap_or(now + FAR_FUTURE);
        Self::with_deadline(deadline)
    }

    /// Create a context that expires at `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline,
            token: CancellationToken::new(),
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline, zero once it has passed
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Cancel the context (and every clone of it)
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Why the context has ended, or `None` while it is still live
    pub fn error(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
            Some(ContextError::Cancelled)
        } else if Instant::now() >= self.deadline {
            Some(ContextError::DeadlineExceeded)
        } else {
            None
        }
    }

    pub fn is_done(&self) -> bool {
        self.error().is_some()
    }

    /// Wait until the context is cancelled or its deadline passes
    pub async fn done(&self) -> ContextError {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => ContextError::Cancelled,
            _ = sleep_until(self.deadline) => {
                if self.token.is_cancelled() {
                    ContextError::Cancelled
                } else {
                    ContextError::DeadlineExceeded
                }
            }
        }
    }
}
