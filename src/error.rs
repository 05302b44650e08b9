//! Error types for traffic shift reconciliation

use thiserror::Error;

/// Main error type for traffic shift operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The shift itself is malformed (both routing modes set, empty selector, ...)
    #[error("validation error: {0}")]
    Validation(String),

    /// No mesh resource matched the label selector
    #[error("not found: {0}")]
    NotFound(String),

    /// A subset already exists, or the resource changed since it was read
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the conflict
        message: String,
        /// True when the mesh store rejected a stale `resourceVersion`
        stale_version: bool,
    },

    /// Applying the operation would break a mesh invariant (e.g., zero HTTP routes)
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The caller cancelled the run or its deadline elapsed
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Kubernetes API transport/server error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// A fetched object could not be (de)serialized into the mesh types
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Error raised by shared utilities (client construction, telemetry)
    #[error(transparent)]
    Common(#[from] lattice_common::Error),
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not-found error with the given message
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a logical conflict error (never retried)
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict {
            message: msg.into(),
            stale_version: false,
        }
    }

    /// Create an optimistic-concurrency conflict reported by the mesh store
    pub fn stale_version(msg: impl Into<String>) -> Self {
        Self::Conflict {
            message: msg.into(),
            stale_version: true,
        }
    }

    /// Create an invariant violation error with the given message
    pub fn invariant_violation(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    /// Create a cancellation error with the given message
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Whether re-reading and re-applying the operation may succeed.
    ///
    /// Only stale-version conflicts qualify; a duplicate subset will still be a
    /// duplicate on the next attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Conflict {
                stale_version: true,
                ..
            }
        )
    }
}
