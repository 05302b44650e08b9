//! Lattice Traffic - canary and blue/green traffic shifting for Istio
//!
//! Shifts traffic between builds of a service by reconciling two Istio
//! resource kinds selected by labels:
//!
//! - DestinationRules carry one subset per build, keyed by pod labels
//! - VirtualServices carry HTTP routes toward those subsets, either by
//!   percentage weight or by exact request-header match
//!
//! # Modules
//!
//! - [`shift`] - Shift request model (target build, traffic descriptor)
//! - [`selector`] - Canonical label selector strings
//! - [`crd`] - Istio VirtualService / DestinationRule types
//! - [`store`] - Mesh resource store (list + versioned replace)
//! - [`router`] - Per-resource-kind reconciliation (create, validate, update, clear, list)
//! - [`operator`] - Ordered Get/Update/Clear across both routers
//! - [`context`] - Tracking id, cancellation and deadline for a call
//! - [`error`] - Error types for the crate

#![deny(missing_docs)]

pub mod context;
pub mod crd;
pub mod error;
pub mod operator;
pub mod router;
pub mod selector;
pub mod shift;
pub mod store;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
