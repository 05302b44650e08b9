//! Istio networking resources read and replaced by the routers
//!
//! Only the fields the routers reason about are modelled. Every struct keeps a
//! flattened catch-all map so fields owned by other tools (`tcp`, `tls`,
//! `trafficPolicy`, `retries`, ...) survive a whole-object replace untouched.

mod destination_rule;
mod virtual_service;

use kube::api::DynamicObject;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub use destination_rule::{DestinationRule, DestinationRuleSpec, Subset};
pub use virtual_service::{
    Destination, HttpMatchRequest, HttpRoute, HttpRouteDestination, PortSelector, StringMatch,
    VirtualService, VirtualServiceSpec,
};

use crate::{Error, Result};

/// Unmodelled fields preserved across a read-modify-replace cycle
pub type Extra = std::collections::BTreeMap<String, serde_json::Value>;

/// Convert a `DynamicObject` returned by the API server into a typed resource
pub fn from_dynamic<T: DeserializeOwned>(obj: DynamicObject, kind: &str) -> Result<T> {
    let value = serde_json::to_value(obj)
        .map_err(|e| Error::serialization(format!("encode {kind}: {e}")))?;
    serde_json::from_value(value).map_err(|e| Error::serialization(format!("decode {kind}: {e}")))
}

/// Convert a typed resource into a `DynamicObject` for the API server
pub fn to_dynamic<T: Serialize>(resource: &T, kind: &str) -> Result<DynamicObject> {
    let value = serde_json::to_value(resource)
        .map_err(|e| Error::serialization(format!("encode {kind}: {e}")))?;
    serde_json::from_value(value).map_err(|e| Error::serialization(format!("decode {kind}: {e}")))
}

fn is_zero(weight: &i32) -> bool {
    *weight == 0
}
