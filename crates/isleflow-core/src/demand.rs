//! Demand ledger.
//!
//! A [`Demand`] is one consumer's requirement on one product. Its amount is
//! a derived cell `base × scaling`, registered as a term of the product's
//! total-demand sum cell. Export trade routes are registered as terms too.

use crate::cell::{CellGraph, RateCell};
use crate::fixed::{Fixed64, mul_sat};
use crate::id::{FactoryId, ProductId};

/// Who owns a demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DemandOwner {
    /// An input or workforce requirement of a factory.
    Factory(FactoryId),
    /// A need added from outside the engine (residences, construction).
    External,
}

/// One requirement on one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Demand {
    pub owner: DemandOwner,
    pub product: ProductId,
    /// Rate before scaling.
    pub base: RateCell,
    /// Share of the base rate that lands on this product.
    pub scaling: RateCell,
    /// `base × scaling`.
    pub amount: RateCell,
}

impl Demand {
    /// Create a demand over existing base and scaling cells.
    pub fn new(
        graph: &mut CellGraph,
        owner: DemandOwner,
        product: ProductId,
        base: RateCell,
        scaling: RateCell,
    ) -> Self {
        let amount = graph.derived_rate("demand_amount", move |r| {
            mul_sat(r.rate(base), r.rate(scaling)).max(Fixed64::ZERO)
        });
        Self {
            owner,
            product,
            base,
            scaling,
            amount,
        }
    }

    /// Create an external demand with its own source cells.
    pub fn external(graph: &mut CellGraph, product: ProductId, rate: Fixed64) -> Self {
        let base = graph.source_rate("external_demand", rate);
        let scaling = graph.source_rate("external_scaling", Fixed64::ONE);
        Self::new(graph, DemandOwner::External, product, base, scaling)
    }

    /// Add this demand to a product's total.
    pub fn register(&self, graph: &mut CellGraph, total: RateCell) {
        graph.add_term(total, self.amount);
    }

    /// Remove this demand from a product's total and free the cells it owns.
    /// Base and scaling cells of factory demands are shared and kept.
    pub fn unregister(&self, graph: &mut CellGraph, total: RateCell) {
        graph.remove_term(total, self.amount);
        graph.remove(self.amount.id());
        if self.owner == DemandOwner::External {
            graph.remove(self.base.id());
            graph.remove(self.scaling.id());
        }
    }
}
