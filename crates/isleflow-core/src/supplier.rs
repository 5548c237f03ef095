//! The closed set of supplier variants and the cells every variant shares.
//!
//! Each supplier owns a [`SupplierCells`] bundle, so baseline production,
//! current production, demand target and the default flag are read and
//! written the same way for every variant. Only `can_supply` differs and is
//! dispatched by `match` in the resolver.

use serde::{Deserialize, Serialize};

use crate::cell::{CellGraph, FlagCell, RateCell};
use crate::fixed::Fixed64;
use crate::id::{FactoryId, TradeRouteId};

/// A supplier of one product on one island.
///
/// `PassiveImport` and `Byproduct` are unique per product, so they carry no
/// id of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Supplier {
    Factory(FactoryId),
    TradeRoute(TradeRouteId),
    PassiveImport,
    Byproduct,
}

impl Supplier {
    /// Persisted type tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Supplier::Factory(_) => "factory",
            Supplier::TradeRoute(_) => "trade_route",
            Supplier::PassiveImport => "passive_trade",
            Supplier::Byproduct => "extra_good",
        }
    }
}

/// Cells shared by every supplier variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupplierCells {
    /// What the supplier produces regardless of being default.
    pub baseline: RateCell,
    /// Written by the resolver when this supplier is default.
    pub target: RateCell,
    /// Written by the resolver only.
    pub is_default: FlagCell,
    /// `max(target, baseline)` while default, `baseline` otherwise.
    pub production: RateCell,
}

impl SupplierCells {
    /// Cells for a supplier that can raise its output up to a demand target.
    pub fn adjustable(graph: &mut CellGraph, baseline: RateCell) -> Self {
        let target = graph.source_rate("demand_target", Fixed64::ZERO);
        let is_default = graph.source_flag("is_default", false);
        let production = graph.derived_rate("production", move |r| {
            let baseline = r.rate(baseline);
            if r.flag(is_default) {
                r.rate(target).max(baseline)
            } else {
                baseline
            }
        });
        Self {
            baseline,
            target,
            is_default,
            production,
        }
    }

    /// Cells for a supplier whose output is fixed by something else
    /// (byproducts). Demand targets are recorded but ignored.
    pub fn fixed_output(graph: &mut CellGraph, baseline: RateCell) -> Self {
        let target = graph.source_rate("demand_target", Fixed64::ZERO);
        let is_default = graph.source_flag("is_default", false);
        let production = graph.derived_rate("production", move |r| r.rate(baseline));
        Self {
            baseline,
            target,
            is_default,
            production,
        }
    }

    pub fn baseline_production(&self, graph: &mut CellGraph) -> Fixed64 {
        graph.rate(self.baseline)
    }

    pub fn current_production(&self, graph: &mut CellGraph) -> Fixed64 {
        graph.rate(self.production)
    }

    pub fn is_default(&self, graph: &mut CellGraph) -> bool {
        graph.flag(self.is_default)
    }

    /// Returns `true` if the target changed.
    pub fn set_demand_target(&self, graph: &mut CellGraph, rate: Fixed64) -> bool {
        graph.set_rate(self.target, rate.max(Fixed64::ZERO))
    }

    pub fn mark_default(&self, graph: &mut CellGraph) {
        graph.set_flag(self.is_default, true);
    }

    /// Reset to baseline behaviour: clear the flag and the target.
    pub fn mark_unset_as_default(&self, graph: &mut CellGraph) {
        graph.set_flag(self.is_default, false);
        graph.set_rate(self.target, Fixed64::ZERO);
    }

    /// Free every cell except the baseline, which the owner may share.
    pub fn remove(&self, graph: &mut CellGraph) {
        graph.remove(self.production.id());
        graph.remove(self.target.id());
        graph.remove(self.is_default.id());
    }
}

/// Unconstrained external source: a user-set floor plus gap filling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassiveImport {
    pub user_amount: RateCell,
    pub cells: SupplierCells,
}

impl PassiveImport {
    pub fn new(graph: &mut CellGraph) -> Self {
        let user_amount = graph.source_rate("passive_import", Fixed64::ZERO);
        let cells = SupplierCells::adjustable(graph, user_amount);
        Self { user_amount, cells }
    }
}

/// Aggregates byproduct production entries for one product on one island.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByproductSupplier {
    /// Sum of the damped entry rates.
    pub total: RateCell,
    pub cells: SupplierCells,
    /// `(factory, index into that factory's byproduct entries)`.
    pub entries: Vec<(FactoryId, usize)>,
}

impl ByproductSupplier {
    pub fn new(graph: &mut CellGraph) -> Self {
        let total = graph.sum("byproduct_total", Vec::new());
        let cells = SupplierCells::fixed_output(graph, total);
        Self {
            total,
            cells,
            entries: Vec::new(),
        }
    }

    pub fn attach(&mut self, graph: &mut CellGraph, factory: FactoryId, index: usize, rate: RateCell) {
        graph.add_term(self.total, rate);
        self.entries.push((factory, index));
    }

    pub fn has_entries(&self) -> bool {
        !self.entries.is_empty()
    }
}
