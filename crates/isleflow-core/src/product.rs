//! Per-island product state: demand and supply aggregates plus the
//! supplier set the resolver chooses from.

use crate::cell::{CellGraph, RateCell};
use crate::fixed::Fixed64;
use crate::id::{FactoryId, ProductId, TradeRouteId};
use crate::supplier::{ByproductSupplier, PassiveImport, Supplier, SupplierCells};

/// One product on one island.
#[derive(Debug, Clone)]
pub struct Product {
    pub id: ProductId,
    pub is_abstract: bool,
    pub is_construction_material: bool,
    /// Σ demand amounts + Σ export route production.
    pub total_demand: RateCell,
    /// Σ baseline production of every registered supplier.
    pub baseline_sum: RateCell,
    /// Σ current production of every registered supplier.
    pub production_sum: RateCell,
    /// `max(0, baseline_sum - total_demand)`.
    pub excess: RateCell,
    /// Written by the resolver only.
    pub default_supplier: Option<Supplier>,
    /// Factories on this island producing this product, ascending.
    pub factories: Vec<FactoryId>,
    pub passive: PassiveImport,
    pub byproduct: ByproductSupplier,
    pub imports: Vec<TradeRouteId>,
    pub exports: Vec<TradeRouteId>,
}

impl Product {
    pub fn new(
        graph: &mut CellGraph,
        id: ProductId,
        is_abstract: bool,
        is_construction_material: bool,
    ) -> Self {
        let total_demand = graph.sum("total_demand", Vec::new());
        let baseline_sum = graph.sum("baseline_sum", Vec::new());
        let production_sum = graph.sum("production_sum", Vec::new());
        let excess = graph.derived_rate("excess", move |r| {
            r.rate(baseline_sum)
                .saturating_sub(r.rate(total_demand))
                .max(Fixed64::ZERO)
        });
        let passive = PassiveImport::new(graph);
        let byproduct = ByproductSupplier::new(graph);
        let mut product = Self {
            id,
            is_abstract,
            is_construction_material,
            total_demand,
            baseline_sum,
            production_sum,
            excess,
            default_supplier: None,
            factories: Vec::new(),
            passive,
            byproduct,
            imports: Vec::new(),
            exports: Vec::new(),
        };
        let byproduct_cells = product.byproduct.cells;
        product.register_supply(graph, &passive.cells);
        product.register_supply(graph, &byproduct_cells);
        product
    }

    /// Hook a supplier's baseline and production into the sums.
    pub fn register_supply(&mut self, graph: &mut CellGraph, cells: &SupplierCells) {
        graph.add_term(self.baseline_sum, cells.baseline);
        graph.add_term(self.production_sum, cells.production);
    }

    pub fn unregister_supply(&mut self, graph: &mut CellGraph, cells: &SupplierCells) {
        graph.remove_term(self.baseline_sum, cells.baseline);
        graph.remove_term(self.production_sum, cells.production);
    }

    pub fn add_factory(&mut self, graph: &mut CellGraph, id: FactoryId, cells: &SupplierCells) {
        self.register_supply(graph, cells);
        if let Err(pos) = self.factories.binary_search(&id) {
            self.factories.insert(pos, id);
        }
    }

    pub fn add_import(&mut self, graph: &mut CellGraph, id: TradeRouteId, cells: &SupplierCells) {
        self.register_supply(graph, cells);
        self.imports.push(id);
    }

    pub fn remove_import(&mut self, graph: &mut CellGraph, id: TradeRouteId, cells: &SupplierCells) {
        self.unregister_supply(graph, cells);
        self.imports.retain(|r| *r != id);
    }

    /// An export's production is demand on this product.
    pub fn add_export(&mut self, graph: &mut CellGraph, id: TradeRouteId, cells: &SupplierCells) {
        graph.add_term(self.total_demand, cells.production);
        self.exports.push(id);
    }

    pub fn remove_export(&mut self, graph: &mut CellGraph, id: TradeRouteId, cells: &SupplierCells) {
        graph.remove_term(self.total_demand, cells.production);
        self.exports.retain(|r| *r != id);
    }

    /// Every supplier of this product, factories first.
    pub fn suppliers(&self) -> Vec<Supplier> {
        let mut out: Vec<Supplier> = self.factories.iter().map(|f| Supplier::Factory(*f)).collect();
        out.extend(self.imports.iter().map(|r| Supplier::TradeRoute(*r)));
        out.push(Supplier::PassiveImport);
        if self.byproduct.has_entries() {
            out.push(Supplier::Byproduct);
        }
        out
    }
}
