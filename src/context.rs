//! Cancellation signal for [`query_context`](crate::DruidConnection::query_context).
//!
//! A context may carry an explicit cancel token, a deadline, both, or
//! neither. A context with neither never fires and routes the query through
//! the plain, non-cancellable path.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::DruidError;

#[derive(Debug, Clone, Default)]
pub struct Context {
    token: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    /// Fires once `timeout` has elapsed from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: None,
            deadline: Some(deadline),
        }
    }

    /// Fires when the returned token is cancelled.
    pub fn with_cancel() -> (Self, CancellationToken) {
        let token = CancellationToken::new();
        (Self::from_token(token.clone()), token)
    }

    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token: Some(token),
            deadline: None,
        }
    }

    /// Add a deadline to this context, keeping the earlier one.
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Whether this context can ever fire.
    pub fn is_cancellable(&self) -> bool {
        self.token.is_some() || self.deadline.is_some()
    }

    /// Time left before the deadline, if there is one.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// The cancellation error if this context has already fired.
    pub fn err(&self) -> Option<DruidError> {
        if self.token.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Some(DruidError::Cancelled);
        }
        if self.deadline.is_some_and(|d| d <= Instant::now()) {
            return Some(DruidError::DeadlineExceeded);
        }
        None
    }

    /// Resolves with the cancellation error once the context fires.
    ///
    /// Never resolves for a background context.
    pub async fn done(&self) -> DruidError {
        let cancelled = async {
            match &self.token {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = cancelled => DruidError::Cancelled,
            _ = expired => DruidError::DeadlineExceeded,
        }
    }
}
