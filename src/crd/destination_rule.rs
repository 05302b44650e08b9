//! Istio DestinationRule (subset definitions)

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use lattice_common::kube_utils::HasApiResource;
use serde::{Deserialize, Serialize};

use super::Extra;

/// Istio DestinationRule
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DestinationRule {
    /// API version
    #[serde(default = "DestinationRule::api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "DestinationRule::kind")]
    pub kind: String,
    /// Metadata (carries the resourceVersion used for compare-and-swap)
    pub metadata: ObjectMeta,
    /// Spec
    #[serde(default)]
    pub spec: DestinationRuleSpec,
}

impl HasApiResource for DestinationRule {
    const API_VERSION: &'static str = "networking.istio.io/v1beta1";
    const KIND: &'static str = "DestinationRule";
}

impl DestinationRule {
    fn api_version() -> String {
        <Self as HasApiResource>::API_VERSION.to_string()
    }
    fn kind() -> String {
        <Self as HasApiResource>::KIND.to_string()
    }

    /// Create a new DestinationRule
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, spec: DestinationRuleSpec) -> Self {
        Self {
            api_version: Self::api_version(),
            kind: Self::kind(),
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some(namespace.into()),
                ..Default::default()
            },
            spec,
        }
    }

    /// Resource name, empty if the server omitted it
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// Look up a subset by name
    pub fn subset(&self, name: &str) -> Option<&Subset> {
        self.spec.subsets.iter().find(|s| s.name == name)
    }
}

/// DestinationRule spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DestinationRuleSpec {
    /// Service host the rule applies to
    #[serde(default)]
    pub host: String,
    /// Named subsets, unique by name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subsets: Vec<Subset>,
    /// Fields not modelled here (trafficPolicy, exportTo, ...)
    #[serde(flatten)]
    pub extra: Extra,
}

/// A named group of endpoints selected by labels
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Subset {
    /// Subset name referenced by VirtualService destinations
    pub name: String,
    /// Pod labels selecting the subset's endpoints
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Fields not modelled here (trafficPolicy)
    #[serde(flatten)]
    pub extra: Extra,
}

impl Subset {
    /// Create a subset with no traffic policy
    pub fn new(name: impl Into<String>, labels: BTreeMap<String, String>) -> Self {
        Self {
            name: name.into(),
            labels,
            extra: Extra::new(),
        }
    }
}
