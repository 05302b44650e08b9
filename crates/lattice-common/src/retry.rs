//! Retry with exponential backoff and jitter for selectively retryable errors.
//!
//! Writes against the mesh control plane are whole-object replacements guarded
//! by `resourceVersion`. A lost race surfaces as a conflict that is safe to
//! retry after re-reading; anything else should fail immediately. Callers pass
//! a predicate that picks out the retryable failures.
//!
//! # Example
//!
//! ```ignore
//! use lattice_common::retry::{retry_with_backoff_if, RetryConfig};
//!
//! let updated = retry_with_backoff_if(
//!     &RetryConfig::default(),
//!     "update virtualservice",
//!     |e: &Error| e.is_retryable(),
//!     || async { reapply_and_replace().await },
//! ).await?;
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

/// Backoff settings for retryable operations.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts including the first one (must be >= 1)
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a config with a maximum number of attempts
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts.max(1),
            ..Default::default()
        }
    }
}

/// Execute an async operation, retrying only the errors `should_retry` accepts.
///
/// Non-retryable errors are returned on first occurrence. Retryable errors are
/// retried with exponential backoff and 0.5x-1.5x jitter until `max_attempts`
/// is reached, after which the last error is returned.
pub async fn retry_with_backoff_if<F, Fut, T, E, P>(
    config: &RetryConfig,
    operation_name: &str,
    should_retry: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        let e = match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        if !should_retry(&e) {
            return Err(e);
        }

        if attempt >= config.max_attempts {
            error!(
                operation = %operation_name,
                attempt = attempt,
                error = %e,
                "Operation failed after max retries"
            );
            return Err(e);
        }

        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        let jittered_delay = Duration::from_secs_f64(delay.as_secs_f64() * jitter);

        warn!(
            operation = %operation_name,
            attempt = attempt,
            error = %e,
            delay_ms = jittered_delay.as_millis(),
            "Operation failed, retrying"
        );

        tokio::time::sleep(jittered_delay).await;

        delay = Duration::from_secs_f64(
            (delay.as_secs_f64() * config.backoff_multiplier).min(config.max_delay.as_secs_f64()),
        );
    }
}
