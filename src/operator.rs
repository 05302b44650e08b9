//! Traffic operator: ordered multi-resource reconciliation of a shift
//!
//! Orders the two routers so every intermediate state is loadable by the mesh:
//!
//! - **update**: subsets first, then routes. A failure in between leaves an
//!   unreferenced subset, which is inert.
//! - **clear**: routes first, then subsets. Routes stop pointing at a subset
//!   before the subset disappears.
//!
//! The two resource kinds are not updated transactionally; a failed call
//! leaves each resource in its last successfully persisted state.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::context::ShiftContext;
use crate::crd::{DestinationRule, VirtualService};
use crate::router::{DestinationRuleRouter, Router, VirtualServiceRouter};
use crate::selector::label_selector;
use crate::shift::Shift;
use crate::store::MeshStore;
use crate::Result;

/// Composes a subset router and a route router into Get/Update/Clear
pub struct TrafficOperator<D, V> {
    subsets: D,
    routes: V,
}

impl TrafficOperator<DestinationRuleRouter, VirtualServiceRouter> {
    /// Operator over Istio DestinationRules and VirtualServices in one store
    pub fn istio(store: Arc<dyn MeshStore>) -> Self {
        Self::new(
            DestinationRuleRouter::new(store.clone()),
            VirtualServiceRouter::new(store),
        )
    }
}

impl<D, V> TrafficOperator<D, V>
where
    D: Router<Resource = DestinationRule>,
    V: Router<Resource = VirtualService>,
{
    /// Create an operator from its two routers
    pub fn new(subsets: D, routes: V) -> Self {
        Self { subsets, routes }
    }

    /// Current VirtualServices selected by the shift. Read-only.
    #[instrument(skip_all, fields(tracking_id = %ctx.tracking_id))]
    pub async fn get(&self, ctx: &ShiftContext, shift: &Shift) -> Result<Vec<VirtualService>> {
        let selector = label_selector(&shift.selector)?;
        self.routes.list(ctx, shift.namespace(), &selector).await
    }

    /// Validate, then reconcile subsets, then reconcile routes.
    #[instrument(
        skip_all,
        fields(tracking_id = %ctx.tracking_id, subset = %shift.subset_name())
    )]
    pub async fn update(&self, ctx: &ShiftContext, shift: &Shift) -> Result<()> {
        shift.traffic.validate()?;

        self.subsets.validate(ctx, shift).await?;
        self.routes.validate(ctx, shift).await?;
        info!("shift validated");

        self.subsets.update(ctx, shift).await?;
        info!("subsets reconciled");

        self.routes.update(ctx, shift).await?;
        info!("routes reconciled");

        Ok(())
    }

    /// Drop inactive routes, then the subsets they no longer reference.
    #[instrument(skip_all, fields(tracking_id = %ctx.tracking_id))]
    pub async fn clear(&self, ctx: &ShiftContext, shift: &Shift) -> Result<()> {
        self.routes.clear(ctx, shift).await?;
        info!("routes cleared");

        self.subsets.clear(ctx, shift).await?;
        info!("subsets cleared");

        Ok(())
    }
}
