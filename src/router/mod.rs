//! Routers: per-resource-kind reconciliation of a traffic shift
//!
//! Both routers follow the same lifecycle over their resource kind:
//!
//! - [`Router::create`] builds the rule for a shift without touching the store
//! - [`Router::validate`] rejects shifts that would conflict with current state
//! - [`Router::update`] merges the rule into every matching resource
//! - [`Router::clear`] removes rules that no longer carry traffic
//! - [`Router::list`] fetches matching resources, failing when there are none
//!
//! [`DestinationRuleRouter`] owns subset definitions and [`VirtualServiceRouter`]
//! owns HTTP routes. Both derive subset names from [`subset_name`], so a route
//! always points at the subset the other router wrote.

mod destination_rule;
mod virtual_service;

use async_trait::async_trait;
use lattice_common::retry::retry_with_backoff_if;

pub use destination_rule::DestinationRuleRouter;
pub use virtual_service::VirtualServiceRouter;

use crate::context::ShiftContext;
use crate::shift::Shift;
use crate::{Error, Result};

/// Deterministic subset name for a service build in a namespace.
///
/// ```
/// use lattice_traffic::router::subset_name;
///
/// assert_eq!(subset_name("api", 2, "default"), "api-2-default");
/// ```
pub fn subset_name(service: &str, build: u32, namespace: &str) -> String {
    format!("{}-{}-{}", service, build, namespace)
}

/// Whether `name` is a subset [`subset_name`] produces for `service` in `namespace`
fn is_build_subset(name: &str, service: &str, namespace: &str) -> bool {
    name.strip_prefix(service)
        .and_then(|rest| rest.strip_prefix('-'))
        .and_then(|rest| rest.strip_suffix(namespace))
        .and_then(|rest| rest.strip_suffix('-'))
        .is_some_and(|build| build.parse::<u32>().is_ok())
}

/// Reconciliation operations over one mesh resource kind
#[async_trait]
pub trait Router: Send + Sync {
    /// The rule this router contributes to a resource (an HTTP route, a subset)
    type Rule: Send;
    /// The mesh resource this router mutates
    type Resource: Send;

    /// Build the rule for a shift. Pure: no store calls.
    fn create(&self, shift: &Shift) -> Self::Rule;

    /// Reject the shift if applying it would conflict with current state
    async fn validate(&self, ctx: &ShiftContext, shift: &Shift) -> Result<()>;

    /// Merge the shift's rule into every matching resource and persist
    async fn update(&self, ctx: &ShiftContext, shift: &Shift) -> Result<()>;

    /// Remove rules that no longer carry traffic from every matching resource
    async fn clear(&self, ctx: &ShiftContext, shift: &Shift) -> Result<()>;

    /// Fetch resources matching `selector`, failing with `NotFound` when empty
    async fn list(
        &self,
        ctx: &ShiftContext,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<Self::Resource>>;
}

/// Fail with `NotFound` when a selector matched nothing
fn require_matches<T>(items: Vec<T>, kind: &str, selector: &str) -> Result<Vec<T>> {
    if items.is_empty() {
        return Err(Error::not_found(format!(
            "could not find any {kind} which matched label-selector '{selector}'"
        )));
    }
    Ok(items)
}

/// Re-run a read-modify-replace cycle while the store reports stale versions
async fn with_conflict_retry<F, Fut>(ctx: &ShiftContext, operation: &str, cycle: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    retry_with_backoff_if(&ctx.retry, operation, Error::is_retryable, cycle).await
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subset_name_is_service_build_namespace() {
        assert_eq!(subset_name("api", 2, "default"), "api-2-default");
        assert_eq!(subset_name("api-xpto", 0, "prod"), "api-xpto-0-prod");
    }

    #[test]
    fn subset_name_is_stable() {
        let first = subset_name("payments", 4_294_967_295, "team-a");
        let second = subset_name("payments", 4_294_967_295, "team-a");
        assert_eq!(first, second);
        assert_eq!(first, "payments-4294967295-team-a");
    }

    #[test]
    fn build_subsets_are_recognised_per_service() {
        assert!(is_build_subset("api-2-default", "api", "default"));
        assert!(is_build_subset(&subset_name("api-xpto", 7, "prod"), "api-xpto", "prod"));
        assert!(!is_build_subset("api-xpto-0-prod", "api", "prod"));
        assert!(!is_build_subset("api-2-staging", "api", "default"));
        assert!(!is_build_subset("api-canary-default", "api", "default"));
        assert!(!is_build_subset("legacy", "api", "default"));
    }

    #[test]
    fn empty_match_set_is_not_found() {
        let err = require_matches(Vec::<()>::new(), "virtualservices", "app=api").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(err.to_string().contains("app=api"));
    }
}
