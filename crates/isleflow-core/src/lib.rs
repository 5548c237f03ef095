//! Isleflow Core -- the supply-resolution engine for island economies.
//!
//! This crate decides, for every product on every island, who supplies how
//! much: factories, trade routes between islands, passive imports and
//! byproducts of buffed factories. Supply, demand and productivity are
//! mutually dependent; the engine keeps them consistent incrementally as
//! building counts, buffs and trade volumes change.
//!
//! # Settle Loop
//!
//! Every mutation on a [`session::Session`] ends with a settle:
//!
//! 1. **Resolve** -- for each island and product (ascending ids) ensure a
//!    usable default supplier exists and set its demand target to close the
//!    gap between total demand and baseline production.
//! 2. **Damp** -- pass each byproduct's freshly computed rate through its
//!    [`damping::DampingFilter`] and publish the filtered rate.
//! 3. **Repeat** until a pass writes nothing, bounded by
//!    [`config::EngineConfig::max_settle_passes`].
//!
//! Everything else is derived: writes mark dependent cells dirty, and reads
//! recompute them lazily, each at most once per change.
//!
//! # Batching
//!
//! Bulk edits are wrapped in a batch so deferred writes coalesce and the
//! engine settles once:
//!
//! ```rust,ignore
//! session.batch(|s| {
//!     s.set_building_count(island, sawmill, fixed(4.0))?;
//!     s.set_fully_utilize(island, sawmill, true)
//! })?;
//! ```
//!
//! # Key Types
//!
//! - [`session::Session`] -- Owns the cell graph, catalog, islands, trade
//!   routes and clock; exposes the read and mutation API.
//! - [`cell::CellGraph`] -- Dependency-tracked source and derived cells with
//!   batching and a per-cell reentrancy guard.
//! - [`catalog::Catalog`] -- Immutable products, factories and buffs, frozen
//!   at build time.
//! - [`supplier::Supplier`] -- Closed set of supplier variants.
//! - [`trade::TradeManager`] -- Arena of trade routes and the cycle walk.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type for deterministic rates.
//! - [`persist`] -- Key-value persistence contract and in-memory store.

pub mod buff;
pub mod catalog;
pub mod cell;
pub mod config;
pub mod damping;
#[cfg(feature = "data-loader")]
pub mod data_loader;
pub mod demand;
pub mod factory;
pub mod fixed;
pub mod id;
pub mod island;
pub mod persist;
pub mod product;
pub mod resolver;
pub mod session;
pub mod supplier;
pub mod trade;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
