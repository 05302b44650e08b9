//! DestinationRule router: subset definitions for each build

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{is_build_subset, require_matches, with_conflict_retry, Router};
use crate::context::ShiftContext;
use crate::crd::{DestinationRule, Subset};
use crate::selector::label_selector;
use crate::shift::Shift;
use crate::store::MeshStore;
use crate::{Error, Result};

/// Router managing subsets in DestinationRules
pub struct DestinationRuleRouter {
    store: Arc<dyn MeshStore>,
}

impl DestinationRuleRouter {
    /// Create a router backed by the given store
    pub fn new(store: Arc<dyn MeshStore>) -> Self {
        Self { store }
    }

    async fn matching(&self, ctx: &ShiftContext, shift: &Shift) -> Result<Vec<DestinationRule>> {
        let selector = label_selector(&shift.selector)?;
        self.list(ctx, shift.namespace(), &selector).await
    }

    async fn persist(&self, ctx: &ShiftContext, namespace: &str, dr: &DestinationRule) -> Result<()> {
        info!(destination_rule = %dr.name(), "updating subsets for destinationrule");
        ctx.guard(
            "replace destinationrule",
            self.store.replace_destination_rule(namespace, dr),
        )
        .await?;
        Ok(())
    }

    /// Subset names any VirtualService selected by the shift still routes to
    async fn referenced_subsets(&self, ctx: &ShiftContext, shift: &Shift) -> Result<BTreeSet<String>> {
        let selector = label_selector(&shift.selector)?;
        let routes = ctx
            .guard(
                "list virtualservices",
                self.store.list_virtual_services(shift.namespace(), &selector),
            )
            .await?;
        let routes = require_matches(routes, "virtualservices", &selector)?;

        Ok(routes
            .iter()
            .flat_map(|vs| vs.destinations())
            .map(|dest| dest.destination.subset.clone())
            .filter(|subset| !subset.is_empty())
            .collect())
    }

    /// Insert the shift's subset or replace its labels. Returns whether `dr` changed.
    fn upsert_subset(&self, dr: &mut DestinationRule, shift: &Shift) -> bool {
        let desired = self.create(shift);
        match dr.spec.subsets.iter_mut().find(|s| s.name == desired.name) {
            Some(existing) if existing.labels == desired.labels => false,
            Some(existing) => {
                info!(subset = %desired.name, labels = ?desired.labels, "replacing subset labels");
                existing.labels = desired.labels;
                true
            }
            None => {
                info!(subset = %desired.name, destination_rule = %dr.name(), "adding subset");
                dr.spec.subsets.push(desired);
                true
            }
        }
    }
}

#[async_trait]
impl Router for DestinationRuleRouter {
    type Rule = Subset;
    type Resource = DestinationRule;

    fn create(&self, shift: &Shift) -> Subset {
        Subset::new(shift.subset_name(), shift.traffic.pod_selector.clone())
    }

    async fn validate(&self, ctx: &ShiftContext, shift: &Shift) -> Result<()> {
        shift.traffic.validate()?;
        if shift.traffic.pod_selector.is_empty() {
            return Err(Error::validation(
                "pod selector must contain at least one label to define a subset",
            ));
        }

        let desired = self.create(shift);
        for dr in self.matching(ctx, shift).await? {
            info!(destination_rule = %dr.name(), "validating destinationrule");
            if let Some(existing) = dr.subset(&desired.name) {
                if existing.labels != desired.labels {
                    return Err(Error::conflict(format!(
                        "subset '{}' already exists in destinationrule '{}' with labels {:?}",
                        desired.name,
                        dr.name(),
                        existing.labels
                    )));
                }
            }
        }

        Ok(())
    }

    async fn update(&self, ctx: &ShiftContext, shift: &Shift) -> Result<()> {
        shift.traffic.validate()?;

        with_conflict_retry(ctx, "update destinationrules", || async move {
            for mut dr in self.matching(ctx, shift).await? {
                if self.upsert_subset(&mut dr, shift) {
                    self.persist(ctx, shift.namespace(), &dr).await?;
                } else {
                    debug!(destination_rule = %dr.name(), "subsets already up to date");
                }
            }
            Ok::<(), Error>(())
        })
        .await
    }

    /// Remove the service's build subsets that no selected VirtualService
    /// routes to. Subsets with other names are left alone, since routes in
    /// VirtualServices outside the selector may still point at them.
    async fn clear(&self, ctx: &ShiftContext, shift: &Shift) -> Result<()> {
        with_conflict_retry(ctx, "clear destinationrules", || async move {
            let referenced = self.referenced_subsets(ctx, shift).await?;

            for mut dr in self.matching(ctx, shift).await? {
                let before = dr.spec.subsets.len();
                let service = &shift.target.service;
                dr.spec.subsets.retain(|subset| {
                    let keep = referenced.contains(&subset.name)
                        || !is_build_subset(&subset.name, service, shift.namespace());
                    if !keep {
                        info!(subset = %subset.name, "removing subset no route references");
                    }
                    keep
                });

                if dr.spec.subsets.len() != before {
                    self.persist(ctx, shift.namespace(), &dr).await?;
                }
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
    ) -> Result<Vec<DestinationRule>> {
        let items = ctx
            .guard(
                "list destinationrules",
                self.store.list_destination_rules(namespace, selector),
            )
            .await?;
        require_matches(items, "destinationrules", selector)
    }
}
