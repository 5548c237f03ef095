//! Trade routes between islands.
//!
//! A route moves one product from a source island to a destination island.
//! On the destination it is a supplier; on the source its current production
//! is registered as export demand. Routes live in the session's
//! [`TradeManager`] arena and are referenced by [`TradeRouteId`] from both
//! ends.

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::cell::{CellGraph, RateCell};
use crate::fixed::Fixed64;
use crate::id::{IslandId, ProductId, TradeRouteId};
use crate::supplier::SupplierCells;

/// One import of `product` from `from` into `to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeRoute {
    /// Stable number used in persisted data. Slot keys are not stable
    /// across sessions.
    pub serial: u64,
    pub product: ProductId,
    pub from: IslandId,
    pub to: IslandId,
    /// User-set floor; also the baseline production.
    pub user_amount: RateCell,
    pub cells: SupplierCells,
}

/// Persisted form of a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRouteRecord {
    pub id: u64,
    pub product_id: ProductId,
    pub from_island: IslandId,
    pub to_island: IslandId,
    pub user_set_amount: f64,
    pub is_default_supplier: bool,
}

/// Owns every trade route in a session.
#[derive(Debug, Default)]
pub struct TradeManager {
    routes: SlotMap<TradeRouteId, TradeRoute>,
    next_serial: u64,
}

impl TradeManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate cells for a new route and store it.
    pub fn insert(
        &mut self,
        graph: &mut CellGraph,
        product: ProductId,
        from: IslandId,
        to: IslandId,
        amount: Fixed64,
    ) -> TradeRouteId {
        let serial = self.next_serial;
        self.next_serial += 1;
        self.insert_with_serial(graph, serial, product, from, to, amount)
    }

    /// Insert a route with a known serial (used when loading).
    pub fn insert_with_serial(
        &mut self,
        graph: &mut CellGraph,
        serial: u64,
        product: ProductId,
        from: IslandId,
        to: IslandId,
        amount: Fixed64,
    ) -> TradeRouteId {
        self.next_serial = self.next_serial.max(serial + 1);
        let user_amount = graph.source_rate("route_amount", amount.max(Fixed64::ZERO));
        let cells = SupplierCells::adjustable(graph, user_amount);
        self.routes.insert(TradeRoute {
            serial,
            product,
            from,
            to,
            user_amount,
            cells,
        })
    }

    /// Remove a route and free its cells. The caller unhooks it from the
    /// product sums first.
    pub fn remove(&mut self, graph: &mut CellGraph, id: TradeRouteId) -> Option<TradeRoute> {
        let route = self.routes.remove(id)?;
        route.cells.remove(graph);
        graph.remove(route.user_amount.id());
        Some(route)
    }

    pub fn get(&self, id: TradeRouteId) -> Option<&TradeRoute> {
        self.routes.get(id)
    }

    pub fn contains(&self, id: TradeRouteId) -> bool {
        self.routes.contains_key(id)
    }

    pub fn by_serial(&self, serial: u64) -> Option<TradeRouteId> {
        self.routes
            .iter()
            .find(|(_, r)| r.serial == serial)
            .map(|(id, _)| id)
    }

    /// Routes ordered by serial.
    pub fn iter(&self) -> impl Iterator<Item = (TradeRouteId, &TradeRoute)> {
        let mut routes: Vec<(TradeRouteId, &TradeRoute)> = self.routes.iter().collect();
        routes.sort_by_key(|(_, r)| r.serial);
        routes.into_iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Cycle walk
// ---------------------------------------------------------------------------

/// Result of walking the default-supplier chain upstream of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainWalk {
    /// The chain ends without reaching the destination.
    Clear { hops: u32 },
    /// The destination island was reached.
    Cycle { hops: u32 },
    /// The hop bound was exceeded.
    TooLong { hops: u32 },
}

/// Walk from `from` towards the origin of `product`. `upstream` returns the
/// source island of the default trade route on an island, if its default
/// supplier for `product` is a route.
pub fn walk_chain<F>(from: IslandId, to: IslandId, max_hops: u32, mut upstream: F) -> ChainWalk
where
    F: FnMut(IslandId) -> Option<IslandId>,
{
    let mut current = from;
    let mut hops = 0;
    loop {
        if current == to {
            return ChainWalk::Cycle { hops };
        }
        let Some(next) = upstream(current) else {
            return ChainWalk::Clear { hops };
        };
        hops += 1;
        if hops > max_hops {
            return ChainWalk::TooLong { hops };
        }
        current = next;
    }
}
