//! VirtualService router: HTTP routes toward a build's subset

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{require_matches, with_conflict_retry, Router};
use crate::context::ShiftContext;
use crate::crd::{
    Destination, Extra, HttpMatchRequest, HttpRoute, HttpRouteDestination, PortSelector,
    StringMatch, VirtualService,
};
use crate::selector::label_selector;
use crate::shift::Shift;
use crate::store::MeshStore;
use crate::{Error, Result};

/// Router managing HTTP rules in VirtualServices
pub struct VirtualServiceRouter {
    store: Arc<dyn MeshStore>,
}

impl VirtualServiceRouter {
    /// Create a router backed by the given store
    pub fn new(store: Arc<dyn MeshStore>) -> Self {
        Self { store }
    }

    async fn matching(&self, ctx: &ShiftContext, shift: &Shift) -> Result<Vec<VirtualService>> {
        let selector = label_selector(&shift.selector)?;
        self.list(ctx, shift.namespace(), &selector).await
    }

    async fn persist(&self, ctx: &ShiftContext, namespace: &str, vs: &VirtualService) -> Result<()> {
        info!(virtual_service = %vs.name(), "updating routes for virtualservice");
        ctx.guard(
            "replace virtualservice",
            self.store.replace_virtual_service(namespace, vs),
        )
        .await?;
        Ok(())
    }

    /// Point the shift's subset at its requested weight, appending a new rule
    /// when no unmatched rule references the subset yet. Header-matched rules
    /// are never re-weighted. Returns whether `vs` changed.
    fn upsert_route(&self, vs: &mut VirtualService, shift: &Shift) -> bool {
        let subset = shift.subset_name();

        if shift.traffic.is_header_mode() {
            if vs.references_subset(&subset) {
                debug!(subset = %subset, virtual_service = %vs.name(), "subset already routed");
                return false;
            }
            vs.spec.http.push(self.create(shift));
            return true;
        }

        let weight = shift.traffic.weight;
        let mut referenced = false;
        let mut changed = false;

        for dest in vs
            .spec
            .http
            .iter_mut()
            .filter(|rule| !rule.is_matched())
            .flat_map(|rule| rule.route.iter_mut())
            .filter(|dest| dest.destination.subset == subset)
        {
            referenced = true;
            if dest.weight != weight {
                info!(subset = %subset, from = dest.weight, to = weight, "re-weighting existing subset");
                dest.weight = weight;
                changed = true;
            }
        }

        if !referenced {
            vs.spec.http.push(self.create(shift));
            changed = true;
        }

        changed
    }
}

/// Drop everything that carries no traffic. Matched rules stay whole;
/// unmatched rules keep only destinations with positive weight and disappear
/// when none remain. Returns the subsets of the dropped destinations.
fn prune_inactive(rules: &mut Vec<HttpRoute>) -> Vec<String> {
    let mut dropped = Vec::new();
    rules.retain_mut(|rule| {
        if rule.is_matched() {
            return true;
        }
        rule.route.retain(|dest| {
            let live = dest.weight > 0;
            if !live {
                dropped.push(dest.destination.subset.clone());
            }
            live
        });
        !rule.route.is_empty()
    });
    dropped
}

#[async_trait]
impl Router for VirtualServiceRouter {
    type Rule = HttpRoute;
    type Resource = VirtualService;

    fn create(&self, shift: &Shift) -> HttpRoute {
        let subset = shift.subset_name();
        let traffic = &shift.traffic;
        info!(subset = %subset, "creating new http route");

        let mut rule = HttpRoute::default();

        if !traffic.request_headers.is_empty() {
            info!(subset = %subset, headers = ?traffic.request_headers, "setting request header match rule");
            rule.match_.push(HttpMatchRequest {
                headers: traffic
                    .request_headers
                    .iter()
                    .map(|(key, value)| (key.clone(), StringMatch::Exact(value.clone())))
                    .collect(),
                extra: Extra::new(),
            });
        }

        let mut destination = HttpRouteDestination {
            destination: Destination {
                host: shift.hostname.clone(),
                subset: subset.clone(),
                port: Some(PortSelector {
                    number: u32::from(shift.port),
                }),
            },
            weight: 0,
            extra: Extra::new(),
        };

        if traffic.weight != 0 {
            info!(subset = %subset, weight = traffic.weight, "setting route weight");
            destination.weight = traffic.weight;
        }

        rule.route.push(destination);
        rule
    }

    async fn validate(&self, ctx: &ShiftContext, shift: &Shift) -> Result<()> {
        shift.traffic.validate()?;
        let subset = shift.subset_name();

        for vs in self.matching(ctx, shift).await? {
            info!(virtual_service = %vs.name(), "validating virtualservice");
            if shift.traffic.is_header_mode() && vs.references_subset(&subset) {
                return Err(Error::conflict(format!(
                    "subset '{}' already exists in virtualservice '{}'",
                    subset,
                    vs.name()
                )));
            }
        }

        Ok(())
    }

    async fn update(&self, ctx: &ShiftContext, shift: &Shift) -> Result<()> {
        shift.traffic.validate()?;

        with_conflict_retry(ctx, "update virtualservices", || async move {
            for mut vs in self.matching(ctx, shift).await? {
                if self.upsert_route(&mut vs, shift) {
                    self.persist(ctx, shift.namespace(), &vs).await?;
                } else {
                    debug!(virtual_service = %vs.name(), "routes already up to date");
                }
            }
            Ok::<(), Error>(())
        })
        .await
    }

    async fn clear(&self, ctx: &ShiftContext, shift: &Shift) -> Result<()> {
        with_conflict_retry(ctx, "clear virtualservices", || async move {
            let mut cleared = Vec::new();

            // Check every resource before persisting any of them
            for mut vs in self.matching(ctx, shift).await? {
                if vs.spec.http.is_empty() {
                    return Err(Error::invariant_violation(format!(
                        "virtualservice '{}' has no http rules to clear",
                        vs.name()
                    )));
                }

                let rules_before = vs.spec.http.len();
                let dropped = prune_inactive(&mut vs.spec.http);
                for subset in &dropped {
                    info!(
                        subset = %subset,
                        virtual_service = %vs.name(),
                        "subset will be removed due to a non-active weight rule"
                    );
                }

                if vs.spec.http.is_empty() {
                    return Err(Error::invariant_violation(format!(
                        "clearing would leave virtualservice '{}' without any rules, which istio rejects",
                        vs.name()
                    )));
                }

                if !dropped.is_empty() || vs.spec.http.len() != rules_before {
                    cleared.push(vs);
                }
            }

            for vs in &cleared {
                info!(virtual_service = %vs.name(), "clearing routes except matched or weighted ones");
                self.persist(ctx, shift.namespace(), vs).await?;
            }
            Ok::<(), Error>(())
        })
        .await
    }

    async fn list(
        &self,
        ctx: &ShiftContext,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<VirtualService>> {
        let items = ctx
            .guard(
                "list virtualservices",
                self.store.list_virtual_services(namespace, selector),
            )
            .await?;
        require_matches(items, "virtualservices", selector)
    }
}
