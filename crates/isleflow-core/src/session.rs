//! The session: explicit context owning the cell graph, catalog, islands,
//! trade routes and clock.
//!
//! Every mutation goes through a `Session` method and settles the engine
//! before returning, unless called inside a batch, in which case the
//! outermost [`Session::end_batch`] settles once. Reads take `&mut self`
//! because derived cells recompute lazily.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::buff::clamp_scaling;
use crate::catalog::{Catalog, CatalogError};
use crate::cell::CellGraph;
use crate::config::EngineConfig;
use crate::damping::{Clock, SystemClock};
use crate::demand::Demand;
use crate::factory::Factory;
use crate::fixed::Fixed64;
use crate::id::{BuffId, DemandId, FactoryId, IslandId, ProductId, RegionId, TradeRouteId};
use crate::island::Island;
use crate::product::Product;
use crate::supplier::{Supplier, SupplierCells};
use crate::trade::{ChainWalk, TradeManager, TradeRoute};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors returned by session operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("unknown island {0:?}")]
    UnknownIsland(IslandId),
    #[error("island {0:?} already exists")]
    DuplicateIsland(IslandId),
    #[error("unknown product {product:?} on island {island:?}")]
    UnknownProduct { island: IslandId, product: ProductId },
    #[error("unknown factory {factory:?} on island {island:?}")]
    UnknownFactory { island: IslandId, factory: FactoryId },
    #[error("factory {factory:?} cannot receive buff {buff:?}")]
    UnknownBuff { factory: FactoryId, buff: BuffId },
    #[error("unknown trade route {0:?}")]
    UnknownRoute(TradeRouteId),
    #[error("unknown demand {0:?}")]
    UnknownDemand(DemandId),
    #[error("{supplier:?} does not supply {product:?} on island {island:?}")]
    ForeignSupplier {
        island: IslandId,
        product: ProductId,
        supplier: Supplier,
    },
    #[error("trade route chain is cyclic or longer than the bound ({hops} hops)")]
    Cycle { hops: u32 },
    #[error("{0:?} cannot supply")]
    CannotSupply(Supplier),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Outcome of [`Session::settle`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettleReport {
    /// Resolver + damping passes run, including the final quiet one.
    pub passes: u32,
    /// `false` if the pass bound was hit while values still changed.
    pub converged: bool,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Owns all mutable engine state.
pub struct Session {
    pub(crate) catalog: Arc<Catalog>,
    pub(crate) config: EngineConfig,
    pub(crate) graph: CellGraph,
    pub(crate) islands: BTreeMap<IslandId, Island>,
    pub(crate) trade: TradeManager,
    pub(crate) clock: Box<dyn Clock>,
    batch_depth: u32,
    last_settle: SettleReport,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("islands", &self.islands.len())
            .field("trade_routes", &self.trade.len())
            .field("cells", &self.graph.len())
            .field("batch_depth", &self.batch_depth)
            .finish()
    }
}

impl Session {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self::with_config(catalog, EngineConfig::default())
    }

    pub fn with_config(catalog: Arc<Catalog>, config: EngineConfig) -> Self {
        Self {
            catalog,
            config,
            graph: CellGraph::new(),
            islands: BTreeMap::new(),
            trade: TradeManager::new(),
            clock: Box::new(SystemClock::default()),
            batch_depth: 0,
            last_settle: SettleReport::default(),
        }
    }

    /// Replace the clock used by the damping filter.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The underlying cell graph, for instrumentation.
    pub fn graph(&self) -> &CellGraph {
        &self.graph
    }

    pub fn last_settle(&self) -> SettleReport {
        self.last_settle
    }

    pub fn island_ids(&self) -> impl Iterator<Item = IslandId> + '_ {
        self.islands.keys().copied()
    }

    pub fn island(&self, id: IslandId) -> Result<&Island, EngineError> {
        self.islands.get(&id).ok_or(EngineError::UnknownIsland(id))
    }

    pub fn routes(&self) -> impl Iterator<Item = (TradeRouteId, &TradeRoute)> {
        self.trade.iter()
    }

    pub fn route(&self, id: TradeRouteId) -> Result<&TradeRoute, EngineError> {
        self.trade.get(id).ok_or(EngineError::UnknownRoute(id))
    }

    /// Create an island with every catalog product and factory.
    pub fn add_island(&mut self, id: IslandId, region: RegionId) -> Result<(), EngineError> {
        if self.islands.contains_key(&id) {
            return Err(EngineError::DuplicateIsland(id));
        }
        let island = Island::build(
            &mut self.graph,
            &self.catalog,
            id,
            region,
            self.config.boost_floor(),
        )?;
        debug!(island = ?id, region = ?region, "island added");
        self.islands.insert(id, island);
        self.after_mutation();
        Ok(())
    }

    // -- lookups ------------------------------------------------------------

    pub(crate) fn product_ref(&self, island: IslandId, product: ProductId) -> Result<&Product, EngineError> {
        self.island(island)?
            .products
            .get(&product)
            .ok_or(EngineError::UnknownProduct { island, product })
    }

    pub(crate) fn product_mut(
        &mut self,
        island: IslandId,
        product: ProductId,
    ) -> Result<&mut Product, EngineError> {
        self.islands
            .get_mut(&island)
            .ok_or(EngineError::UnknownIsland(island))?
            .products
            .get_mut(&product)
            .ok_or(EngineError::UnknownProduct { island, product })
    }

    pub(crate) fn factory_ref(&self, island: IslandId, factory: FactoryId) -> Result<&Factory, EngineError> {
        self.island(island)?
            .factories
            .get(&factory)
            .ok_or(EngineError::UnknownFactory { island, factory })
    }

    /// The shared cells of `supplier` as a supplier of `product` on
    /// `island`.
    pub(crate) fn supplier_cells(
        &self,
        island: IslandId,
        product: ProductId,
        supplier: Supplier,
    ) -> Result<SupplierCells, EngineError> {
        let foreign = EngineError::ForeignSupplier {
            island,
            product,
            supplier,
        };
        let p = self.product_ref(island, product)?;
        match supplier {
            Supplier::Factory(f) => {
                let factory = self.factory_ref(island, f)?;
                if factory.output != product {
                    return Err(foreign);
                }
                Ok(factory.cells)
            }
            Supplier::TradeRoute(r) => {
                let route = self.route(r)?;
                if route.to != island || route.product != product {
                    return Err(foreign);
                }
                Ok(route.cells)
            }
            Supplier::PassiveImport => Ok(p.passive.cells),
            Supplier::Byproduct => Ok(p.byproduct.cells),
        }
    }

    // -- product reads ------------------------------------------------------

    pub fn total_demand(&mut self, island: IslandId, product: ProductId) -> Result<Fixed64, EngineError> {
        let cell = self.product_ref(island, product)?.total_demand;
        Ok(self.graph.rate(cell))
    }

    pub fn total_production(&mut self, island: IslandId, product: ProductId) -> Result<Fixed64, EngineError> {
        let cell = self.product_ref(island, product)?.production_sum;
        Ok(self.graph.rate(cell))
    }

    pub fn excess_production(&mut self, island: IslandId, product: ProductId) -> Result<Fixed64, EngineError> {
        let cell = self.product_ref(island, product)?.excess;
        Ok(self.graph.rate(cell))
    }

    pub fn default_supplier(&self, island: IslandId, product: ProductId) -> Result<Option<Supplier>, EngineError> {
        Ok(self.product_ref(island, product)?.default_supplier)
    }

    pub fn suppliers(&self, island: IslandId, product: ProductId) -> Result<Vec<Supplier>, EngineError> {
        Ok(self.product_ref(island, product)?.suppliers())
    }

    /// Reads the supplier's own flag, not the product's pointer.
    pub fn is_default_supplier(
        &mut self,
        island: IslandId,
        product: ProductId,
        supplier: Supplier,
    ) -> Result<bool, EngineError> {
        let cells = self.supplier_cells(island, product, supplier)?;
        Ok(cells.is_default(&mut self.graph))
    }

    pub fn supplier_baseline(
        &mut self,
        island: IslandId,
        product: ProductId,
        supplier: Supplier,
    ) -> Result<Fixed64, EngineError> {
        let cells = self.supplier_cells(island, product, supplier)?;
        Ok(cells.baseline_production(&mut self.graph))
    }

    pub fn supplier_production(
        &mut self,
        island: IslandId,
        product: ProductId,
        supplier: Supplier,
    ) -> Result<Fixed64, EngineError> {
        let cells = self.supplier_cells(island, product, supplier)?;
        Ok(cells.current_production(&mut self.graph))
    }

    /// True when the default supplier is a factory whose required building
    /// count exceeds the constructed count by more than the accuracy.
    /// Abstract products are never highlighted.
    pub fn is_highlighted_as_missing(&mut self, island: IslandId, product: ProductId) -> Result<bool, EngineError> {
        let p = self.product_ref(island, product)?;
        if p.is_abstract {
            return Ok(false);
        }
        let Some(Supplier::Factory(f)) = p.default_supplier else {
            return Ok(false);
        };
        let factory = self.factory_ref(island, f)?;
        let (required, constructed) = (factory.required, factory.constructed);
        let missing = self.graph.rate(required).saturating_sub(self.graph.rate(constructed));
        Ok(missing > self.config.accuracy())
    }

    // -- factory reads ------------------------------------------------------

    /// Current production of the factory's primary output per minute.
    pub fn output_amount(&mut self, island: IslandId, factory: FactoryId) -> Result<Fixed64, EngineError> {
        let cell = self.factory_ref(island, factory)?.cells.production;
        Ok(self.graph.rate(cell))
    }

    pub fn boost(&mut self, island: IslandId, factory: FactoryId) -> Result<Fixed64, EngineError> {
        let cell = self.factory_ref(island, factory)?.boost;
        Ok(self.graph.rate(cell))
    }

    pub fn required_buildings(&mut self, island: IslandId, factory: FactoryId) -> Result<Fixed64, EngineError> {
        let cell = self.factory_ref(island, factory)?.required;
        Ok(self.graph.rate(cell))
    }

    pub fn constructed_buildings(&mut self, island: IslandId, factory: FactoryId) -> Result<Fixed64, EngineError> {
        let cell = self.factory_ref(island, factory)?.constructed;
        Ok(self.graph.rate(cell))
    }

    pub fn planned_buildings(&self, island: IslandId, factory: FactoryId) -> Result<Fixed64, EngineError> {
        Ok(self.factory_ref(island, factory)?.planned)
    }

    pub fn fully_utilize(&mut self, island: IslandId, factory: FactoryId) -> Result<bool, EngineError> {
        let cell = self.factory_ref(island, factory)?.fully_utilize;
        Ok(self.graph.flag(cell))
    }

    pub fn demand_target(&mut self, island: IslandId, factory: FactoryId) -> Result<Fixed64, EngineError> {
        let cell = self.factory_ref(island, factory)?.cells.target;
        Ok(self.graph.rate(cell))
    }

    /// Damped byproduct output of `product` by this factory.
    pub fn extra_output_amount(
        &mut self,
        island: IslandId,
        factory: FactoryId,
        product: ProductId,
    ) -> Result<Fixed64, EngineError> {
        let f = self
            .islands
            .get(&island)
            .ok_or(EngineError::UnknownIsland(island))?
            .factories
            .get(&factory)
            .ok_or(EngineError::UnknownFactory { island, factory })?;
        Ok(f.extra_output(&mut self.graph, product))
    }

    pub fn applied_buff_scaling(
        &mut self,
        island: IslandId,
        factory: FactoryId,
        buff: BuffId,
    ) -> Result<Fixed64, EngineError> {
        let applied = self
            .factory_ref(island, factory)?
            .buffs
            .get(&buff)
            .copied()
            .ok_or(EngineError::UnknownBuff { factory, buff })?;
        Ok(self.graph.rate(applied.scaling))
    }

    // -- trade route reads --------------------------------------------------

    pub fn route_production(&mut self, route: TradeRouteId) -> Result<Fixed64, EngineError> {
        let cell = self.route(route)?.cells.production;
        Ok(self.graph.rate(cell))
    }

    pub fn route_can_supply(&self, route: TradeRouteId) -> Result<bool, EngineError> {
        let r = self.route(route)?;
        Ok(self.can_supply(r.to, r.product, Supplier::TradeRoute(route)))
    }

    // -- demand mutations ---------------------------------------------------

    /// Add an external demand on `product`.
    pub fn add_demand(
        &mut self,
        island: IslandId,
        product: ProductId,
        rate: Fixed64,
    ) -> Result<DemandId, EngineError> {
        let total = self.product_ref(island, product)?.total_demand;
        let demand = Demand::external(&mut self.graph, product, rate.max(Fixed64::ZERO));
        demand.register(&mut self.graph, total);
        let id = self
            .islands
            .get_mut(&island)
            .ok_or(EngineError::UnknownIsland(island))?
            .demands
            .insert(demand);
        self.after_mutation();
        Ok(id)
    }

    pub fn set_demand_rate(&mut self, island: IslandId, demand: DemandId, rate: Fixed64) -> Result<(), EngineError> {
        let base = self
            .island(island)?
            .demands
            .get(demand)
            .ok_or(EngineError::UnknownDemand(demand))?
            .base;
        self.graph.write_deferred_rate(base, rate.max(Fixed64::ZERO));
        self.after_mutation();
        Ok(())
    }

    pub fn remove_demand(&mut self, island: IslandId, demand: DemandId) -> Result<(), EngineError> {
        let removed = self
            .islands
            .get_mut(&island)
            .ok_or(EngineError::UnknownIsland(island))?
            .demands
            .remove(demand)
            .ok_or(EngineError::UnknownDemand(demand))?;
        let total = self.product_ref(island, removed.product)?.total_demand;
        removed.unregister(&mut self.graph, total);
        self.after_mutation();
        Ok(())
    }

    // -- factory mutations --------------------------------------------------

    /// Set the constructed building count. Coalesced inside a batch.
    pub fn set_building_count(
        &mut self,
        island: IslandId,
        factory: FactoryId,
        constructed: Fixed64,
    ) -> Result<(), EngineError> {
        let cell = self.factory_ref(island, factory)?.constructed;
        self.graph.write_deferred_rate(cell, constructed.max(Fixed64::ZERO));
        self.after_mutation();
        Ok(())
    }

    pub fn set_fully_utilize(&mut self, island: IslandId, factory: FactoryId, value: bool) -> Result<(), EngineError> {
        let cell = self.factory_ref(island, factory)?.fully_utilize;
        self.graph.set_flag(cell, value);
        self.after_mutation();
        Ok(())
    }

    /// Record the planned building count. Planning does not affect supply.
    pub fn set_planned_buildings(
        &mut self,
        island: IslandId,
        factory: FactoryId,
        planned: Fixed64,
    ) -> Result<(), EngineError> {
        let f = self
            .islands
            .get_mut(&island)
            .ok_or(EngineError::UnknownIsland(island))?
            .factories
            .get_mut(&factory)
            .ok_or(EngineError::UnknownFactory { island, factory })?;
        f.planned = planned.max(Fixed64::ZERO);
        Ok(())
    }

    /// Set how much of a buff is active on a factory, clamped to `[0, 1]`.
    pub fn set_applied_buff_scaling(
        &mut self,
        island: IslandId,
        factory: FactoryId,
        buff: BuffId,
        scaling: Fixed64,
    ) -> Result<(), EngineError> {
        let applied = self
            .factory_ref(island, factory)?
            .buffs
            .get(&buff)
            .copied()
            .ok_or(EngineError::UnknownBuff { factory, buff })?;
        self.graph.write_deferred_rate(applied.scaling, clamp_scaling(scaling));
        self.after_mutation();
        Ok(())
    }

    pub fn set_passive_import(
        &mut self,
        island: IslandId,
        product: ProductId,
        amount: Fixed64,
    ) -> Result<(), EngineError> {
        let cell = self.product_ref(island, product)?.passive.user_amount;
        self.graph.write_deferred_rate(cell, amount.max(Fixed64::ZERO));
        self.after_mutation();
        Ok(())
    }

    // -- trade mutations ----------------------------------------------------

    /// Create a route importing `product` from `from` into `to` with a user
    /// floor of `amount`. The route becomes the destination's default
    /// supplier if the destination has no usable one and the route can
    /// supply.
    pub fn create_trade_route(
        &mut self,
        product: ProductId,
        from: IslandId,
        to: IslandId,
        amount: Fixed64,
    ) -> Result<TradeRouteId, EngineError> {
        self.product_ref(from, product)?;
        self.product_ref(to, product)?;
        match self.walk_upstream(from, to, product) {
            ChainWalk::Clear { .. } => {}
            ChainWalk::Cycle { hops: 0 } => return Err(EngineError::Cycle { hops: 0 }),
            ChainWalk::Cycle { hops } => {
                debug!(?product, ?from, ?to, hops, "route would close a cycle; created without supply");
            }
            ChainWalk::TooLong { hops } => return Err(EngineError::Cycle { hops }),
        }
        let id = self.trade.insert(&mut self.graph, product, from, to, amount);
        self.attach_route(id)?;
        debug!(route = ?id, ?product, ?from, ?to, "trade route created");
        self.adopt_route_if_needed(id);
        self.after_mutation();
        Ok(id)
    }

    /// Hook a stored route into both products.
    pub(crate) fn attach_route(&mut self, id: TradeRouteId) -> Result<(), EngineError> {
        let route = self.route(id)?.clone();
        let graph = &mut self.graph;
        self.islands
            .get_mut(&route.to)
            .and_then(|i| i.products.get_mut(&route.product))
            .ok_or(EngineError::UnknownProduct {
                island: route.to,
                product: route.product,
            })?
            .add_import(graph, id, &route.cells);
        self.islands
            .get_mut(&route.from)
            .and_then(|i| i.products.get_mut(&route.product))
            .ok_or(EngineError::UnknownProduct {
                island: route.from,
                product: route.product,
            })?
            .add_export(graph, id, &route.cells);
        Ok(())
    }

    /// Make a fresh route the default if its destination lacks a usable one.
    pub(crate) fn adopt_route_if_needed(&mut self, id: TradeRouteId) {
        let Some(route) = self.trade.get(id) else {
            return;
        };
        let (to, product) = (route.to, route.product);
        let current = self
            .product_ref(to, product)
            .ok()
            .and_then(|p| p.default_supplier);
        let usable = current.is_some_and(|s| self.can_supply(to, product, s));
        let candidate = Supplier::TradeRoute(id);
        if !usable && self.can_supply(to, product, candidate) {
            self.switch_default(to, product, Some(candidate));
        }
    }

    pub fn delete_trade_route(&mut self, id: TradeRouteId) -> Result<(), EngineError> {
        self.route(id)?;
        self.detach_and_remove_route(id);
        self.after_mutation();
        Ok(())
    }

    /// Unhook a route from both products and free it. Clears the
    /// destination's default pointer if it pointed here.
    pub(crate) fn detach_and_remove_route(&mut self, id: TradeRouteId) {
        let Some(route) = self.trade.get(id).cloned() else {
            return;
        };
        let graph = &mut self.graph;
        if let Some(dest) = self
            .islands
            .get_mut(&route.to)
            .and_then(|i| i.products.get_mut(&route.product))
        {
            if dest.default_supplier == Some(Supplier::TradeRoute(id)) {
                dest.default_supplier = None;
            }
            dest.remove_import(graph, id, &route.cells);
        }
        if let Some(src) = self
            .islands
            .get_mut(&route.from)
            .and_then(|i| i.products.get_mut(&route.product))
        {
            src.remove_export(graph, id, &route.cells);
        }
        self.trade.remove(graph, id);
        debug!(route = ?id, serial = route.serial, "trade route deleted");
    }

    pub fn set_trade_route_amount(&mut self, id: TradeRouteId, amount: Fixed64) -> Result<(), EngineError> {
        let cell = self.route(id)?.user_amount;
        self.graph.write_deferred_rate(cell, amount.max(Fixed64::ZERO));
        self.after_mutation();
        Ok(())
    }

    // -- default supplier ---------------------------------------------------

    /// Choose the default supplier of `product` on `island`. `None` hands
    /// the choice back to the resolver. Setting the current default again
    /// is a no-op.
    pub fn update_default_supplier(
        &mut self,
        island: IslandId,
        product: ProductId,
        supplier: Option<Supplier>,
    ) -> Result<(), EngineError> {
        let current = self.product_ref(island, product)?.default_supplier;
        if let Some(s) = supplier {
            self.supplier_cells(island, product, s)?;
            if !self.can_supply(island, product, s) {
                return Err(EngineError::CannotSupply(s));
            }
        }
        if current == supplier {
            return Ok(());
        }
        self.switch_default(island, product, supplier);
        self.after_mutation();
        Ok(())
    }

    // -- batching -----------------------------------------------------------

    /// Start a batch. Deferred writes and settling wait for the outermost
    /// [`end_batch`](Self::end_batch).
    pub fn begin_batch(&mut self) {
        self.batch_depth += 1;
        self.graph.begin_batch();
    }

    /// End a batch. The outermost end flushes deferred writes and settles.
    pub fn end_batch(&mut self) -> Option<SettleReport> {
        self.graph.end_batch();
        self.batch_depth = self.batch_depth.saturating_sub(1);
        if self.batch_depth == 0 {
            Some(self.settle())
        } else {
            None
        }
    }

    pub fn in_batch(&self) -> bool {
        self.batch_depth > 0
    }

    /// Run `f` inside a batch.
    pub fn batch<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut Self) -> R,
    {
        self.begin_batch();
        let out = f(self);
        self.end_batch();
        out
    }

    fn after_mutation(&mut self) {
        if self.batch_depth == 0 {
            self.settle();
        }
    }

    pub(crate) fn record_settle(&mut self, report: SettleReport) {
        self.last_settle = report;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn duplicate_island_rejected() {
        let (mut s, _) = single_island(island_catalog(), IslandId(1));
        assert_eq!(
            s.add_island(IslandId(1), OLD_WORLD),
            Err(EngineError::DuplicateIsland(IslandId(1)))
        );
    }

    #[test]
    fn unknown_references_fail_fast() {
        let (mut s, _) = single_island(island_catalog(), IslandId(1));
        assert_eq!(
            s.total_demand(IslandId(9), WOOD),
            Err(EngineError::UnknownIsland(IslandId(9)))
        );
        assert_eq!(
            s.total_demand(IslandId(1), ProductId(999)),
            Err(EngineError::UnknownProduct {
                island: IslandId(1),
                product: ProductId(999)
            })
        );
        assert!(matches!(
            s.set_applied_buff_scaling(IslandId(1), LUMBERJACK, FERTILISER, fixed(1.0)),
            Err(EngineError::UnknownBuff { .. })
        ));
    }

    #[test]
    fn demand_lifecycle() {
        let (mut s, _) = single_island(island_catalog(), IslandId(1));
        let d = s.add_demand(IslandId(1), TIMBER, fixed(4.0)).expect("demand");
        assert_rate_eq(s.total_demand(IslandId(1), TIMBER).expect("read"), fixed(4.0));
        // Sawmill covers timber and in turn demands wood.
        assert_rate_eq(s.total_demand(IslandId(1), WOOD).expect("read"), fixed(4.0));

        s.set_demand_rate(IslandId(1), d, fixed(2.0)).expect("set");
        assert_rate_eq(s.total_demand(IslandId(1), WOOD).expect("read"), fixed(2.0));

        s.remove_demand(IslandId(1), d).expect("remove");
        assert_rate_eq(s.total_demand(IslandId(1), TIMBER).expect("read"), fixed(0.0));
        assert_rate_eq(s.total_demand(IslandId(1), WOOD).expect("read"), fixed(0.0));
        assert_eq!(
            s.remove_demand(IslandId(1), d),
            Err(EngineError::UnknownDemand(d))
        );
    }

    #[test]
    fn batch_coalesces_building_counts() {
        let (mut s, _) = single_island(island_catalog(), IslandId(1));
        let island = IslandId(1);
        s.begin_batch();
        for n in 1..=5 {
            s.set_building_count(island, LUMBERJACK, fixed(n as f64)).expect("set");
        }
        assert_rate_eq(s.constructed_buildings(island, LUMBERJACK).expect("read"), fixed(0.0));
        let report = s.end_batch().expect("outermost batch settles");
        assert!(report.converged);
        assert_rate_eq(s.constructed_buildings(island, LUMBERJACK).expect("read"), fixed(5.0));
    }

    #[test]
    fn planned_buildings_do_not_affect_supply() {
        let (mut s, _) = single_island(island_catalog(), IslandId(1));
        s.set_planned_buildings(IslandId(1), SAWMILL, fixed(3.0)).expect("plan");
        assert_rate_eq(s.planned_buildings(IslandId(1), SAWMILL).expect("read"), fixed(3.0));
        assert_rate_eq(s.total_production(IslandId(1), TIMBER).expect("read"), fixed(0.0));
    }

    #[test]
    fn workforce_replacement_removes_workforce_demand() {
        let (mut s, _) = single_island(island_catalog(), IslandId(1));
        let island = IslandId(1);
        s.add_demand(island, TIMBER, fixed(4.0)).expect("demand");
        // Sawmill: 4 timber/min = 1 building, 10 farmers. Lumberjack: 4
        // wood/min = 1 building, 5 farmers.
        assert_rate_eq(s.total_demand(island, FARMERS).expect("read"), fixed(15.0));
        s.set_applied_buff_scaling(island, SAWMILL, STEAM_SAW, fixed(1.0))
            .expect("buff");
        assert_rate_eq(s.total_demand(island, FARMERS).expect("read"), fixed(5.0));
    }

    #[test]
    fn abstract_products_never_highlighted() {
        let (mut s, _) = single_island(island_catalog(), IslandId(1));
        let island = IslandId(1);
        s.add_demand(island, TIMBER, fixed(4.0)).expect("demand");
        assert!(s.is_highlighted_as_missing(island, TIMBER).expect("read"));
        s.set_building_count(island, SAWMILL, fixed(1.0)).expect("set");
        assert!(!s.is_highlighted_as_missing(island, TIMBER).expect("read"));
        assert!(!s.is_highlighted_as_missing(island, FARMERS).expect("read"));
    }
}
