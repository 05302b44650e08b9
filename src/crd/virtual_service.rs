//! Istio VirtualService (HTTP routing)

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use lattice_common::kube_utils::HasApiResource;
use serde::{Deserialize, Serialize};

use super::{is_zero, Extra};

/// Istio VirtualService
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualService {
    /// API version
    #[serde(default = "VirtualService::api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "VirtualService::kind")]
    pub kind: String,
    /// Metadata (carries the resourceVersion used for compare-and-swap)
    pub metadata: ObjectMeta,
    /// Spec
    #[serde(default)]
    pub spec: VirtualServiceSpec,
}

impl HasApiResource for VirtualService {
    const API_VERSION: &'static str = "networking.istio.io/v1beta1";
    const KIND: &'static str = "VirtualService";
}

impl VirtualService {
    fn api_version() -> String {
        <Self as HasApiResource>::API_VERSION.to_string()
    }
    fn kind() -> String {
        <Self as HasApiResource>::KIND.to_string()
    }

    /// Create a new VirtualService
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, spec: VirtualServiceSpec) -> Self {
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

    /// All route destinations across every HTTP rule
    pub fn destinations(&self) -> impl Iterator<Item = &HttpRouteDestination> {
        self.spec.http.iter().flat_map(|rule| rule.route.iter())
    }

    /// Whether any HTTP rule routes to the named subset
    pub fn references_subset(&self, subset: &str) -> bool {
        self.destinations()
            .any(|dest| dest.destination.subset == subset)
    }
}

/// VirtualService spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServiceSpec {
    /// Hosts the routing rules apply to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,
    /// Gateways and sidecars the rules apply to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gateways: Vec<String>,
    /// Ordered HTTP routing rules; the first match wins
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http: Vec<HttpRoute>,
    /// Fields not modelled here (tcp, tls, exportTo, ...)
    #[serde(flatten)]
    pub extra: Extra,
}

/// One HTTP routing rule: match conditions plus weighted destinations
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRoute {
    /// Optional rule name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Match conditions (OR-ed); empty means match everything
    #[serde(rename = "match", default, skip_serializing_if = "Vec::is_empty")]
    pub match_: Vec<HttpMatchRequest>,
    /// Destinations receiving the matched traffic
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub route: Vec<HttpRouteDestination>,
    /// Fields not modelled here (rewrite, retries, timeout, ...)
    #[serde(flatten)]
    pub extra: Extra,
}

impl HttpRoute {
    /// Whether the rule only applies to requests meeting match conditions
    pub fn is_matched(&self) -> bool {
        !self.match_.is_empty()
    }
}

/// Request match conditions
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpMatchRequest {
    /// Header name to value matcher
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, StringMatch>,
    /// Fields not modelled here (uri, method, queryParams, ...)
    #[serde(flatten)]
    pub extra: Extra,
}

/// String matcher, serialized as `{"exact": "v2"}` and friends
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StringMatch {
    /// Exact string match
    Exact(String),
    /// Prefix match
    Prefix(String),
    /// RE2 regular expression match
    Regex(String),
}

/// A weighted destination of an HTTP rule
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteDestination {
    /// Where the traffic goes
    pub destination: Destination,
    /// Share of the rule's traffic; 0 means unset
    #[serde(default, skip_serializing_if = "is_zero")]
    pub weight: i32,
    /// Fields not modelled here (headers, ...)
    #[serde(flatten)]
    pub extra: Extra,
}

/// Destination service, subset, and port
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    /// Service host in the registry
    pub host: String,
    /// Subset name defined in a DestinationRule for `host`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subset: String,
    /// Port on the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<PortSelector>,
}

/// Port selector
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortSelector {
    /// Port number
    pub number: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unmodelled_fields_survive_round_trip() {
        let raw = json!({
            "apiVersion": "networking.istio.io/v1beta1",
            "kind": "VirtualService",
            "metadata": {"name": "api", "namespace": "default", "resourceVersion": "42"},
            "spec": {
                "hosts": ["api.domain.io"],
                "exportTo": ["."],
                "tcp": [{"route": [{"destination": {"host": "db"}}]}],
                "http": [{
                    "match": [{"uri": {"prefix": "/v2"}}],
                    "route": [{"destination": {"host": "api", "subset": "api-1-default"}}],
                    "timeout": "5s"
                }]
            }
        });

        let vs: VirtualService = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(vs.name(), "api");
        assert_eq!(vs.metadata.resource_version.as_deref(), Some("42"));
        assert!(vs.spec.extra.contains_key("tcp"));
        assert!(vs.spec.http[0].extra.contains_key("timeout"));
        assert!(vs.spec.http[0].match_[0].extra.contains_key("uri"));
        assert!(vs.spec.http[0].is_matched());

        assert_eq!(serde_json::to_value(&vs).unwrap(), raw);
    }

    #[test]
    fn header_match_serializes_as_exact() {
        let m = HttpMatchRequest {
            headers: BTreeMap::from([(
                "x-version".to_string(),
                StringMatch::Exact("v2".to_string()),
            )]),
            extra: Extra::new(),
        };
        assert_eq!(
            serde_json::to_value(&m).unwrap(),
            json!({"headers": {"x-version": {"exact": "v2"}}})
        );
    }

    #[test]
    fn zero_weight_is_omitted() {
        let dest = HttpRouteDestination {
            destination: Destination {
                host: "api.domain.io".to_string(),
                subset: "api-2-default".to_string(),
                port: Some(PortSelector { number: 5000 }),
            },
            weight: 0,
            extra: Extra::new(),
        };
        let value = serde_json::to_value(&dest).unwrap();
        assert!(value.get("weight").is_none());
        assert_eq!(value["destination"]["port"]["number"], 5000);
    }

    #[test]
    fn references_subset_checks_subset_field() {
        let mut vs = VirtualService::new("api", "default", VirtualServiceSpec::default());
        vs.spec.http.push(HttpRoute {
            route: vec![HttpRouteDestination {
                destination: Destination {
                    host: "api-2-default".to_string(),
                    subset: "other".to_string(),
                    port: None,
                },
                weight: 10,
                extra: Extra::new(),
            }],
            ..Default::default()
        });
        assert!(vs.references_subset("other"));
        assert!(!vs.references_subset("api-2-default"));
    }
}
