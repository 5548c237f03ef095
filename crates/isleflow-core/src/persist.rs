//! Persistence through a string-valued key-value store.
//!
//! Per island, keyed by catalog guid:
//!
//! - `<product>.defaultSupplier.type` / `<product>.defaultSupplier.id`
//! - `<product>.passiveTrade.amount`
//! - `<factory>.buildings.constructed|required|planned`
//! - `<factory>.fullyUtilizeConstructed`
//! - `<factory>.buff.<buff>.scaling`
//!
//! Trade routes are stored globally under `tradeRoutes` as a JSON array.
//! Loading never fails on stale references: a default supplier that no
//! longer resolves is left to the resolver. Malformed numbers load as zero.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::fixed::{Fixed64, f64_to_fixed64_lossy, fixed64_to_f64};
use crate::id::{FactoryId, IslandId, ProductId};
use crate::session::{EngineError, Session};
use crate::supplier::Supplier;
use crate::trade::TradeRouteRecord;

/// Global key holding every trade route.
pub const TRADE_ROUTES_KEY: &str = "tradeRoutes";

/// Errors raised while saving or loading.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("trade route data: {0}")]
    TradeRoutes(#[from] serde_json::Error),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// A string-valued key-value store.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String);
    fn remove(&mut self, key: &str);
    fn keys(&self) -> Vec<String>;
}

/// In-memory store, ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.entries.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

/// Key prefix used by [`Session::save`] for one island's entries.
pub fn island_prefix(island: IslandId) -> String {
    format!("island.{}.", island.0)
}

fn parse_rate(key: &str, raw: &str) -> Fixed64 {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => f64_to_fixed64_lossy(v).max(Fixed64::ZERO),
        _ => {
            warn!(key, value = raw, "malformed persisted number, using 0");
            Fixed64::ZERO
        }
    }
}

fn format_rate(v: Fixed64) -> String {
    fixed64_to_f64(v).to_string()
}

impl Session {
    // -----------------------------------------------------------------------
    // Save
    // -----------------------------------------------------------------------

    /// Save every island under its prefix plus the trade routes.
    pub fn save(&mut self, store: &mut dyn KeyValueStore) -> Result<(), PersistError> {
        let islands: Vec<IslandId> = self.island_ids().collect();
        for island in islands {
            self.save_island_with_prefix(island, store, &island_prefix(island))?;
        }
        self.save_trade_routes(store)
    }

    /// Save one island with unprefixed keys.
    pub fn save_island(&mut self, island: IslandId, store: &mut dyn KeyValueStore) -> Result<(), PersistError> {
        self.save_island_with_prefix(island, store, "")
    }

    fn save_island_with_prefix(
        &mut self,
        island: IslandId,
        store: &mut dyn KeyValueStore,
        prefix: &str,
    ) -> Result<(), PersistError> {
        let isle = self.island(island)?;
        let mut products = Vec::new();
        for p in isle.products.values() {
            products.push((p.id, p.default_supplier, p.passive.user_amount));
        }
        let mut factories = Vec::new();
        for f in isle.factories.values() {
            let buffs: Vec<_> = f.buffs.values().map(|a| (a.buff, a.scaling)).collect();
            factories.push((f.id, f.constructed, f.required, f.planned, f.fully_utilize, buffs));
        }

        for (id, default, passive) in products {
            let (kind, ref_id) = match default {
                None => ("null", String::new()),
                Some(Supplier::Factory(f)) => ("factory", f.0.to_string()),
                Some(Supplier::TradeRoute(r)) => (
                    "trade_route",
                    self.trade.get(r).map(|route| route.serial.to_string()).unwrap_or_default(),
                ),
                Some(Supplier::PassiveImport) => ("passive_trade", id.0.to_string()),
                Some(Supplier::Byproduct) => ("extra_good", id.0.to_string()),
            };
            store.set(&format!("{prefix}{}.defaultSupplier.type", id.0), kind.to_string());
            store.set(&format!("{prefix}{}.defaultSupplier.id", id.0), ref_id);
            let amount = self.graph.rate(passive);
            store.set(&format!("{prefix}{}.passiveTrade.amount", id.0), format_rate(amount));
        }

        for (id, constructed, required, planned, fully_utilize, buffs) in factories {
            let constructed = self.graph.rate(constructed);
            let required = self.graph.rate(required);
            let fully_utilize = self.graph.flag(fully_utilize);
            store.set(&format!("{prefix}{}.buildings.constructed", id.0), format_rate(constructed));
            store.set(&format!("{prefix}{}.buildings.required", id.0), format_rate(required));
            store.set(&format!("{prefix}{}.buildings.planned", id.0), format_rate(planned));
            store.set(&format!("{prefix}{}.fullyUtilizeConstructed", id.0), fully_utilize.to_string());
            for (buff, scaling) in buffs {
                let scaling = self.graph.rate(scaling);
                store.set(&format!("{prefix}{}.buff.{}.scaling", id.0, buff.0), format_rate(scaling));
            }
        }
        Ok(())
    }

    /// Write every route to the global `tradeRoutes` key.
    pub fn save_trade_routes(&mut self, store: &mut dyn KeyValueStore) -> Result<(), PersistError> {
        let routes: Vec<_> = self
            .trade
            .iter()
            .map(|(id, r)| (id, r.serial, r.product, r.from, r.to, r.user_amount))
            .collect();
        let mut records = Vec::with_capacity(routes.len());
        for (id, serial, product, from, to, amount) in routes {
            let is_default = self
                .product_ref(to, product)
                .is_ok_and(|p| p.default_supplier == Some(Supplier::TradeRoute(id)));
            records.push(TradeRouteRecord {
                id: serial,
                product_id: product,
                from_island: from,
                to_island: to,
                user_set_amount: fixed64_to_f64(self.graph.rate(amount)),
                is_default_supplier: is_default,
            });
        }
        store.set(TRADE_ROUTES_KEY, serde_json::to_string(&records)?);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Load
    // -----------------------------------------------------------------------

    /// Load every existing island from its prefix, then trade routes, then
    /// default suppliers. Islands must already have been added.
    pub fn load(&mut self, store: &dyn KeyValueStore) -> Result<(), PersistError> {
        let islands: Vec<IslandId> = self.island_ids().collect();
        self.begin_batch();
        let result = self.load_all(store, &islands);
        self.end_batch();
        result
    }

    fn load_all(&mut self, store: &dyn KeyValueStore, islands: &[IslandId]) -> Result<(), PersistError> {
        for island in islands {
            self.load_island_values(*island, store, &island_prefix(*island))?;
        }
        self.load_trade_routes_inner(store)?;
        for island in islands {
            self.load_island_defaults(*island, store, &island_prefix(*island))?;
        }
        Ok(())
    }

    /// Load one island from unprefixed keys. Trade routes are not touched.
    pub fn load_island(&mut self, island: IslandId, store: &dyn KeyValueStore) -> Result<(), PersistError> {
        self.begin_batch();
        let result = self
            .load_island_values(island, store, "")
            .and_then(|()| self.load_island_defaults(island, store, ""));
        self.end_batch();
        result
    }

    /// Recreate trade routes from the global key.
    pub fn load_trade_routes(&mut self, store: &dyn KeyValueStore) -> Result<(), PersistError> {
        self.begin_batch();
        let result = self.load_trade_routes_inner(store);
        self.end_batch();
        result
    }

    fn load_island_values(
        &mut self,
        island: IslandId,
        store: &dyn KeyValueStore,
        prefix: &str,
    ) -> Result<(), PersistError> {
        let isle = self.island(island)?;
        let products: Vec<ProductId> = isle.products.keys().copied().collect();
        let factories: Vec<(FactoryId, Vec<_>)> = isle
            .factories
            .values()
            .map(|f| (f.id, f.buffs.keys().copied().collect()))
            .collect();

        for product in products {
            let key = format!("{prefix}{}.passiveTrade.amount", product.0);
            if let Some(raw) = store.get(&key) {
                self.set_passive_import(island, product, parse_rate(&key, &raw))?;
            }
        }
        for (factory, buffs) in factories {
            let key = format!("{prefix}{}.buildings.constructed", factory.0);
            if let Some(raw) = store.get(&key) {
                self.set_building_count(island, factory, parse_rate(&key, &raw))?;
            }
            let key = format!("{prefix}{}.buildings.planned", factory.0);
            if let Some(raw) = store.get(&key) {
                self.set_planned_buildings(island, factory, parse_rate(&key, &raw))?;
            }
            let key = format!("{prefix}{}.fullyUtilizeConstructed", factory.0);
            if let Some(raw) = store.get(&key) {
                self.set_fully_utilize(island, factory, raw.trim() == "true")?;
            }
            for buff in buffs {
                let key = format!("{prefix}{}.buff.{}.scaling", factory.0, buff.0);
                if let Some(raw) = store.get(&key) {
                    self.set_applied_buff_scaling(island, factory, buff, parse_rate(&key, &raw))?;
                }
            }
        }
        Ok(())
    }

    fn load_trade_routes_inner(&mut self, store: &dyn KeyValueStore) -> Result<(), PersistError> {
        let Some(raw) = store.get(TRADE_ROUTES_KEY) else {
            return Ok(());
        };
        let records: Vec<TradeRouteRecord> = serde_json::from_str(&raw)?;
        for record in records {
            if self.trade.by_serial(record.id).is_some() {
                debug!(serial = record.id, "trade route already present, skipping");
                continue;
            }
            if self.product_ref(record.from_island, record.product_id).is_err()
                || self.product_ref(record.to_island, record.product_id).is_err()
                || record.from_island == record.to_island
            {
                debug!(serial = record.id, "trade route references missing island or product, skipping");
                continue;
            }
            let amount = if record.user_set_amount.is_finite() {
                f64_to_fixed64_lossy(record.user_set_amount).max(Fixed64::ZERO)
            } else {
                warn!(serial = record.id, "malformed trade route amount, using 0");
                Fixed64::ZERO
            };
            let id = self.trade.insert_with_serial(
                &mut self.graph,
                record.id,
                record.product_id,
                record.from_island,
                record.to_island,
                amount,
            );
            self.attach_route(id)?;
            let supplier = Supplier::TradeRoute(id);
            if record.is_default_supplier && self.can_supply(record.to_island, record.product_id, supplier) {
                self.switch_default(record.to_island, record.product_id, Some(supplier));
            }
        }
        Ok(())
    }

    fn load_island_defaults(
        &mut self,
        island: IslandId,
        store: &dyn KeyValueStore,
        prefix: &str,
    ) -> Result<(), PersistError> {
        let products: Vec<ProductId> = self.island(island)?.products.keys().copied().collect();
        for product in products {
            let Some(kind) = store.get(&format!("{prefix}{}.defaultSupplier.type", product.0)) else {
                continue;
            };
            let id = store
                .get(&format!("{prefix}{}.defaultSupplier.id", product.0))
                .unwrap_or_default();
            let supplier = match kind.as_str() {
                "null" => continue,
                "factory" => id.trim().parse::<u32>().ok().map(|f| Supplier::Factory(FactoryId(f))),
                "trade_route" => id
                    .trim()
                    .parse::<u64>()
                    .ok()
                    .and_then(|serial| self.trade.by_serial(serial))
                    .map(Supplier::TradeRoute),
                "passive_trade" => Some(Supplier::PassiveImport),
                "extra_good" => Some(Supplier::Byproduct),
                _ => None,
            };
            let resolved = supplier.filter(|s| {
                self.supplier_cells(island, product, *s).is_ok() && self.can_supply(island, product, *s)
            });
            match resolved {
                Some(s) => {
                    self.switch_default(island, product, Some(s));
                }
                None => {
                    debug!(?island, ?product, kind = kind.as_str(), id = id.as_str(), "persisted default supplier no longer resolves");
                }
            }
        }
        Ok(())
    }
}
