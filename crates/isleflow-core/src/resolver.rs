//! Default-supplier resolution and the settle loop.
//!
//! The resolver is the only writer of default-supplier pointers and demand
//! targets. For each product it keeps a usable default supplier and sets
//! that supplier's target so that total production covers total demand:
//!
//! - `non_default = Σ baseline` of every registered supplier
//! - `target = 0` if `non_default >= total_demand`
//! - `target = total_demand - non_default + default.baseline` otherwise
//!
//! Each resolver pass visits products consumers first, so the demand a
//! default supplier passes upstream (factory inputs, trade route exports) is
//! in place before its suppliers are resolved. A plain supply chain settles
//! in one pass however deep it is.
//!
//! [`Session::settle`] alternates resolver passes and the byproduct damping
//! pass until a pass writes nothing.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::{debug, error, trace, warn};

use crate::fixed::Fixed64;
use crate::id::{FactoryId, IslandId, ProductId};
use crate::session::{Session, SettleReport};
use crate::supplier::Supplier;
use crate::trade::{ChainWalk, walk_chain};

impl Session {
    // -----------------------------------------------------------------------
    // Supply checks
    // -----------------------------------------------------------------------

    /// Whether `supplier` may serve as default supplier of `product` on
    /// `island`. Never fails: unknown suppliers cannot supply.
    pub fn can_supply(&self, island: IslandId, product: ProductId, supplier: Supplier) -> bool {
        let Ok(isle) = self.island(island) else {
            return false;
        };
        match supplier {
            Supplier::Factory(f) => isle.factory_can_supply(f, product),
            Supplier::TradeRoute(r) => {
                let Some(route) = self.trade.get(r) else {
                    return false;
                };
                if route.to != island || route.product != product {
                    return false;
                }
                match self.walk_upstream(route.from, route.to, product) {
                    ChainWalk::Clear { .. } => true,
                    ChainWalk::Cycle { .. } => false,
                    ChainWalk::TooLong { hops } => {
                        error!(route = ?r, hops, "trade route chain exceeds bound; treating as cycle");
                        false
                    }
                }
            }
            Supplier::PassiveImport => isle.products.contains_key(&product),
            Supplier::Byproduct => isle
                .products
                .get(&product)
                .is_some_and(|p| p.byproduct.has_entries()),
        }
    }

    /// Follow default trade routes upstream from `from`, looking for `to`.
    pub(crate) fn walk_upstream(&self, from: IslandId, to: IslandId, product: ProductId) -> ChainWalk {
        walk_chain(from, to, self.config.max_trade_chain, |island| {
            let p = self.islands.get(&island)?.products.get(&product)?;
            match p.default_supplier? {
                Supplier::TradeRoute(r) => self.trade.get(r).map(|route| route.from),
                _ => None,
            }
        })
    }

    /// The catalog's forced factory if it can supply, else the first
    /// factory in ascending id order that can.
    fn pick_factory(&self, island: IslandId, product: ProductId) -> Option<Supplier> {
        let isle = self.island(island).ok()?;
        if let Some(forced) = self.catalog.forced_supplier(product, isle.region)
            && isle.factory_can_supply(forced, product)
        {
            return Some(Supplier::Factory(forced));
        }
        let p = isle.products.get(&product)?;
        p.factories
            .iter()
            .copied()
            .find(|f: &FactoryId| isle.factory_can_supply(*f, product))
            .map(Supplier::Factory)
    }

    // -----------------------------------------------------------------------
    // Switching
    // -----------------------------------------------------------------------

    /// Move the default pointer. The old supplier is unset first. Returns
    /// `true` if the pointer changed.
    pub(crate) fn switch_default(
        &mut self,
        island: IslandId,
        product: ProductId,
        next: Option<Supplier>,
    ) -> bool {
        let Ok(p) = self.product_ref(island, product) else {
            return false;
        };
        let previous = p.default_supplier;
        if previous == next {
            return false;
        }
        if let Some(old) = previous {
            self.unset_default(island, product, old);
        }
        if let Ok(p) = self.product_mut(island, product) {
            p.default_supplier = next;
        }
        if let Some(new) = next
            && let Ok(cells) = self.supplier_cells(island, product, new)
        {
            cells.mark_default(&mut self.graph);
        }
        debug!(?island, ?product, ?previous, ?next, "default supplier switched");
        true
    }

    /// Reset a supplier to baseline behaviour. A trade route without a user
    /// floor has no reason to exist and is deleted.
    fn unset_default(&mut self, island: IslandId, product: ProductId, supplier: Supplier) {
        let Ok(cells) = self.supplier_cells(island, product, supplier) else {
            return;
        };
        cells.mark_unset_as_default(&mut self.graph);
        if let Supplier::TradeRoute(r) = supplier
            && let Some(route) = self.trade.get(r)
        {
            let floor = route.user_amount;
            if self.graph.rate(floor) == Fixed64::ZERO {
                debug!(route = ?r, "deleting trade route without user amount");
                self.detach_and_remove_route(r);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    /// One resolver step for one product. Returns `true` if anything was
    /// written.
    pub(crate) fn resolve_product(&mut self, island: IslandId, product: ProductId) -> bool {
        let Ok(p) = self.product_ref(island, product) else {
            return false;
        };
        let current = p.default_supplier;
        let mut changed = false;

        let usable = current.is_some_and(|s| self.can_supply(island, product, s));
        if !usable {
            let pick = self.pick_factory(island, product);
            changed |= self.switch_default(island, product, pick);
        }

        let Ok(p) = self.product_ref(island, product) else {
            return changed;
        };
        let (total_cell, baseline_cell) = (p.total_demand, p.baseline_sum);
        let Some(default) = p.default_supplier else {
            return changed;
        };
        let Ok(cells) = self.supplier_cells(island, product, default) else {
            return changed;
        };

        let total = self.graph.rate(total_cell);
        let non_default = self.graph.rate(baseline_cell);
        let target = if non_default >= total {
            Fixed64::ZERO
        } else {
            total
                .saturating_sub(non_default)
                .saturating_add(cells.baseline_production(&mut self.graph))
        };
        changed |= cells.set_demand_target(&mut self.graph, target);
        changed
    }

    /// Products ordered so that each comes before every product its
    /// suppliers draw on: factory inputs and workforce on the same island,
    /// and the source side of default trade routes. Kahn's algorithm; products
    /// left on a cycle are appended in id order.
    pub(crate) fn resolution_order(&self) -> Vec<(IslandId, ProductId)> {
        let mut edges: BTreeMap<(IslandId, ProductId), BTreeSet<(IslandId, ProductId)>> = BTreeMap::new();
        let mut in_degree: BTreeMap<(IslandId, ProductId), usize> = BTreeMap::new();

        for (island, isle) in &self.islands {
            for product in isle.products.keys() {
                in_degree.insert((*island, *product), 0);
            }
            for factory in isle.factories.values() {
                if !factory.available_in(isle.region) {
                    continue;
                }
                let from = (*island, factory.output);
                for demand in &factory.demands {
                    let to = (*island, demand.product);
                    if to != from {
                        edges.entry(from).or_default().insert(to);
                    }
                }
            }
        }
        // Only a default route's production follows its target; any other
        // route exports a constant floor.
        for (id, route) in self.trade.iter() {
            let is_default = self
                .islands
                .get(&route.to)
                .and_then(|i| i.products.get(&route.product))
                .is_some_and(|p| p.default_supplier == Some(Supplier::TradeRoute(id)));
            if is_default {
                edges
                    .entry((route.to, route.product))
                    .or_default()
                    .insert((route.from, route.product));
            }
        }

        for targets in edges.values() {
            for target in targets {
                if let Some(deg) = in_degree.get_mut(target) {
                    *deg += 1;
                }
            }
        }
        let mut queue: VecDeque<(IslandId, ProductId)> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(key, _)| *key)
            .collect();
        let mut order = Vec::with_capacity(in_degree.len());
        while let Some(key) = queue.pop_front() {
            order.push(key);
            let Some(targets) = edges.get(&key) else {
                continue;
            };
            for target in targets {
                if let Some(deg) = in_degree.get_mut(target) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(*target);
                    }
                }
            }
        }

        if order.len() < in_degree.len() {
            let placed: BTreeSet<(IslandId, ProductId)> = order.iter().copied().collect();
            let cyclic: Vec<(IslandId, ProductId)> = in_degree
                .keys()
                .filter(|key| !placed.contains(*key))
                .copied()
                .collect();
            trace!(count = cyclic.len(), "products on a supply cycle resolved in id order");
            order.extend(cyclic);
        }
        order
    }

    /// Resolve every product on every island, consumers first.
    fn resolve_all(&mut self) -> bool {
        let mut changed = false;
        for (island, product) in self.resolution_order() {
            changed |= self.resolve_product(island, product);
        }
        changed
    }

    /// Pass every byproduct candidate through its damping filter and publish
    /// the rate it settles on.
    fn damp_byproducts(&mut self) -> bool {
        let now = self.clock.now_ms();
        let accuracy = self.config.accuracy();
        let window = self.config.damping_window_ms;
        let mut changed = false;
        for isle in self.islands.values_mut() {
            for factory in isle.factories.values_mut() {
                for entry in &mut factory.byproducts {
                    let candidate = self.graph.rate(entry.candidate);
                    let outcome = entry.filter.apply(candidate, now, accuracy, window);
                    changed |= self.graph.set_rate(entry.rate, outcome.rate());
                }
            }
        }
        changed
    }

    /// Run resolver and damping passes until nothing changes or the pass
    /// bound is reached.
    pub fn settle(&mut self) -> SettleReport {
        let max = self.config.max_settle_passes.max(1);
        let mut report = SettleReport::default();
        while report.passes < max {
            report.passes += 1;
            let mut changed = self.resolve_all();
            changed |= self.damp_byproducts();
            if !changed {
                report.converged = true;
                break;
            }
        }
        if !report.converged {
            warn!(passes = report.passes, "settle did not converge");
        }
        self.record_settle(report);
        report
    }
}
