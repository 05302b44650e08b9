//! Error types for the shared utilities
//!
//! These cover failures that happen before any routing logic runs: loading a
//! kubeconfig, building a client, installing the tracing subscriber.

use thiserror::Error;

/// Errors raised by lattice-common helpers
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes client construction or API failure
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Invalid configuration supplied by the caller
    #[error("configuration error: {message}")]
    Config {
        /// Description of what's invalid
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "create_client", "telemetry")
        context: String,
    },
}

impl Error {
    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an internal error with the context it happened in
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kube_errors_convert_into_kube_variant() {
        let api = kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "virtualservices is forbidden".to_string(),
            reason: "Forbidden".to_string(),
            code: 403,
        };
        let err: Error = kube::Error::Api(api).into();
        assert!(matches!(err, Error::Kube { .. }));
        assert!(err.to_string().contains("forbidden"));
    }

    #[test]
    fn internal_error_carries_context() {
        let err = Error::internal_with_context("create_client", "failed to infer config");
        let msg = err.to_string();
        assert!(msg.contains("[create_client]"));
        assert!(msg.contains("failed to infer config"));
    }

    #[test]
    fn config_error_accepts_owned_and_borrowed() {
        let err = Error::config(format!("kubeconfig {} missing", "/tmp/kc"));
        assert!(err.to_string().contains("/tmp/kc"));

        match Error::config("static") {
            Error::Config { message } => assert_eq!(message, "static"),
            _ => panic!("Expected Config variant"),
        }
    }
}
