//! Common utilities for lattice-traffic: kube client construction, Istio API
//! resource resolution, conflict-aware retry, and tracing setup.

#![deny(missing_docs)]

pub mod error;
pub mod kube_utils;
pub mod retry;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager / user agent reported to the API server
pub const FIELD_MANAGER: &str = "lattice-traffic";
