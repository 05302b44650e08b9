//! Per-run context threaded through every reconciliation call
//!
//! Carries the tracking id that ties log lines of one run together, the
//! cancellation token and deadline that bound every mesh store round trip, and
//! the retry budget for optimistic-concurrency conflicts.

use std::future::Future;
use std::time::Duration;

use lattice_common::retry::RetryConfig;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Context for one traffic shift invocation
#[derive(Clone, Debug)]
pub struct ShiftContext {
    /// Identifier attached to every log line of this run
    pub tracking_id: String,
    /// Cancelling this token aborts the in-flight mesh store call
    pub cancel: CancellationToken,
    /// Point in time after which store calls fail with `Cancelled`
    pub deadline: Option<Instant>,
    /// Backoff applied when the mesh store reports a stale resourceVersion
    pub retry: RetryConfig,
}

impl ShiftContext {
    /// Create a context with no deadline and the default conflict retry budget
    pub fn new(tracking_id: impl Into<String>) -> Self {
        Self {
            tracking_id: tracking_id.into(),
            cancel: CancellationToken::new(),
            deadline: None,
            retry: RetryConfig::default(),
        }
    }

    /// Fail store calls that have not finished `timeout` from now
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Use the given cancellation token
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Use the given conflict retry budget
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Run a mesh store call, aborting it on cancellation or deadline.
    pub async fn guard<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(Error::cancelled(format!("{operation}: run was cancelled")));
        }

        let bounded = async {
            match self.deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    match tokio::time::timeout(remaining, call).await {
                        Ok(result) => result,
                        Err(_) => Err(Error::cancelled(format!("{operation}: deadline elapsed"))),
                    }
                }
                None => call.await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                Err(Error::cancelled(format!("{operation}: run was cancelled")))
            }
            result = bounded => result,
        }
    }
}
