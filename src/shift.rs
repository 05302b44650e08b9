//! Traffic shift request model
//!
//! A [`Shift`] says which mesh resources to touch (the label selector), which
//! build the traffic goes to (the [`RolloutTarget`]), and how it gets there
//! (the [`Traffic`] descriptor: a percentage weight or an exact header match).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::router::subset_name;
use crate::{Error, Result};

/// Highest weight a single destination can carry
pub const MAX_WEIGHT: i32 = 100;

/// The service build that receives the shifted traffic
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RolloutTarget {
    /// Service name (first component of the subset name)
    pub service: String,
    /// Namespace the mesh resources live in
    pub namespace: String,
    /// Build identifier of the release being rolled out
    pub build: u32,
}

impl RolloutTarget {
    /// Create a new rollout target
    pub fn new(service: impl Into<String>, namespace: impl Into<String>, build: u32) -> Self {
        Self {
            service: service.into(),
            namespace: namespace.into(),
            build,
        }
    }

    /// Deterministic subset name for this service/build/namespace
    pub fn subset_name(&self) -> String {
        subset_name(&self.service, self.build, &self.namespace)
    }
}

/// How traffic is steered to the new subset
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Traffic {
    /// Pod labels that define the subset
    #[serde(default)]
    pub pod_selector: BTreeMap<String, String>,
    /// Exact-match request headers (header mode)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub request_headers: BTreeMap<String, String>,
    /// Percentage of traffic, 0 meaning unset (weight mode when non-zero)
    #[serde(default)]
    pub weight: i32,
}

impl Traffic {
    /// Weight-based shift with the given percentage
    pub fn weighted(pod_selector: BTreeMap<String, String>, weight: i32) -> Self {
        Self {
            pod_selector,
            request_headers: BTreeMap::new(),
            weight,
        }
    }

    /// Header-based shift matching the given headers exactly
    pub fn header_matched(
        pod_selector: BTreeMap<String, String>,
        request_headers: BTreeMap<String, String>,
    ) -> Self {
        Self {
            pod_selector,
            request_headers,
            weight: 0,
        }
    }

    /// A shift without a weight is routed by headers.
    ///
    /// Weight-mode shifts revisit the same subset on every rollout step, so the
    /// duplicate-subset check only applies when this is true.
    pub fn is_header_mode(&self) -> bool {
        self.weight == 0
    }

    /// Reject traffic that sets both routing modes, neither, or an impossible weight
    pub fn validate(&self) -> Result<()> {
        if self.weight != 0 && !self.request_headers.is_empty() {
            return Err(Error::validation(
                "a route needs to be served with a 'weight' or 'request headers', not both",
            ));
        }
        if self.weight == 0 && self.request_headers.is_empty() {
            return Err(Error::validation(
                "a route needs to be served with a 'weight' or 'request headers'",
            ));
        }
        if !(0..=MAX_WEIGHT).contains(&self.weight) {
            return Err(Error::validation(format!(
                "weight must be between 0 and {}, got {}",
                MAX_WEIGHT, self.weight
            )));
        }
        Ok(())
    }
}

/// A single traffic shift request
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Shift {
    /// Service build the traffic is shifted to
    pub target: RolloutTarget,
    /// Destination host written into routes (e.g., "api.domain.io")
    pub hostname: String,
    /// Destination port written into routes
    pub port: u16,
    /// Labels identifying the VirtualServices/DestinationRules to mutate
    pub selector: BTreeMap<String, String>,
    /// How traffic is steered
    pub traffic: Traffic,
}

impl Shift {
    /// Subset name both routers use for this shift
    pub fn subset_name(&self) -> String {
        self.target.subset_name()
    }

    /// Namespace of the resources this shift mutates
    pub fn namespace(&self) -> &str {
        &self.target.namespace
    }
}
