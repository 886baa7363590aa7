use crate::errors::FunctionError;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Context for one model/function chain that can be cancelled.
///
/// Every executor step goes through [`CallContext::checkpoint`] or
/// [`CallContext::sleep`], so a cancelled chain stops at the next await point
/// and never issues further input.
#[derive(Clone, Debug)]
pub struct CallContext {
    pub request_id: String,
    pub cancellation_token: CancellationToken,
    pub started_at: Instant,
}

impl CallContext {
    pub fn new(request_id: String) -> Self {
        Self::with_token(request_id, CancellationToken::new())
    }

    pub fn with_token(request_id: String, cancellation_token: CancellationToken) -> Self {
        Self {
            request_id,
            cancellation_token,
            started_at: Instant::now(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    pub fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Create a child token that will be cancelled when parent is cancelled
    pub fn child_token(&self) -> CancellationToken {
        self.cancellation_token.child_token()
    }

    pub fn checkpoint(&self) -> Result<(), FunctionError> {
        if self.is_cancelled() {
            debug!("Request {} cancelled after {:?}", self.request_id, self.elapsed());
            return Err(FunctionError::Cancelled);
        }
        Ok(())
    }

    /// Sleeps for `duration` unless cancelled first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), FunctionError> {
        self.checkpoint()?;
        if duration.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = self.cancellation_token.cancelled() => Err(FunctionError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
