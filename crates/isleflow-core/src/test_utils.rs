//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use std::sync::Arc;

use crate::catalog::{BuffDef, Catalog, CatalogBuilder, FactoryDef, OutputDef, ProductDef};
use crate::damping::ManualClock;
use crate::fixed::Fixed64;
use crate::id::*;
use crate::session::Session;

// ===========================================================================
// Fixed-point helpers
// ===========================================================================

pub fn fixed(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

/// Tolerance used by [`assert_rate_eq`]. Fixed-point division leaves a few
/// ulps of error on non-dyadic results.
pub const RATE_EPSILON: f64 = 1e-6;

/// Assert two rates are equal up to [`RATE_EPSILON`].
#[track_caller]
pub fn assert_rate_eq(actual: Fixed64, expected: Fixed64) {
    let diff = (actual.to_num::<f64>() - expected.to_num::<f64>()).abs();
    assert!(
        diff < RATE_EPSILON,
        "rate mismatch: actual {actual}, expected {expected}"
    );
}

// ===========================================================================
// Regions
// ===========================================================================

pub const OLD_WORLD: RegionId = RegionId(1);
pub const NEW_WORLD: RegionId = RegionId(2);

// ===========================================================================
// Island catalog: a small production chain with workforce and buffs
// ===========================================================================

pub const WOOD: ProductId = ProductId(1);
pub const TIMBER: ProductId = ProductId(2);
pub const POTATO: ProductId = ProductId(3);
pub const SCHNAPPS: ProductId = ProductId(4);
pub const FARMERS: ProductId = ProductId(5);
pub const BRICKS: ProductId = ProductId(6);
pub const CLAY: ProductId = ProductId(7);

pub const LUMBERJACK: FactoryId = FactoryId(10);
pub const SAWMILL: FactoryId = FactoryId(11);
pub const POTATO_FARM: FactoryId = FactoryId(12);
pub const SCHNAPPS_DISTILLERY: FactoryId = FactoryId(13);
pub const CLAY_PIT: FactoryId = FactoryId(14);
pub const BRICKWORKS: FactoryId = FactoryId(15);

pub const FERTILISER: BuffId = BuffId(20);
pub const STEAM_SAW: BuffId = BuffId(21);
pub const PLANK_OFFCUTS: BuffId = BuffId(22);

/// Old-world production chain: wood -> timber, potato -> schnapps,
/// clay -> bricks. Every building needs farmers.
pub fn island_catalog() -> Catalog {
    let mut b = CatalogBuilder::new();
    b.add_product(ProductDef::new(WOOD, "Wood")).expect("wood");
    b.add_product(ProductDef::new(TIMBER, "Timber").construction_material())
        .expect("timber");
    b.add_product(ProductDef::new(POTATO, "Potatoes")).expect("potato");
    b.add_product(ProductDef::new(SCHNAPPS, "Schnapps")).expect("schnapps");
    b.add_product(ProductDef::new(FARMERS, "Farmer Workforce").abstract_product())
        .expect("farmers");
    b.add_product(ProductDef::new(BRICKS, "Bricks").construction_material())
        .expect("bricks");
    b.add_product(ProductDef::new(CLAY, "Clay")).expect("clay");

    b.add_buff(BuffDef::new(FERTILISER, "Fertiliser").productivity(fixed(50.0)))
        .expect("fertiliser");
    b.add_buff(BuffDef::new(STEAM_SAW, "Steam Saw").replace_workforce(FARMERS, None))
        .expect("steam saw");
    b.add_buff(BuffDef::new(PLANK_OFFCUTS, "Plank Offcuts").extra_output(WOOD, fixed(1.0), 4))
        .expect("offcuts");

    b.add_factory(
        FactoryDef::new(LUMBERJACK, "Lumberjack's Hut", fixed(15.0), out(WOOD, 1.0))
            .with_workforce(FARMERS, fixed(5.0)),
    )
    .expect("lumberjack");
    b.add_factory(
        FactoryDef::new(SAWMILL, "Sawmill", fixed(15.0), out(TIMBER, 1.0))
            .with_input(WOOD, fixed(1.0))
            .with_workforce(FARMERS, fixed(10.0))
            .with_buff(STEAM_SAW)
            .with_buff(PLANK_OFFCUTS),
    )
    .expect("sawmill");
    b.add_factory(
        FactoryDef::new(POTATO_FARM, "Potato Farm", fixed(30.0), out(POTATO, 1.0))
            .with_workforce(FARMERS, fixed(20.0))
            .in_regions(vec![OLD_WORLD])
            .with_buff(FERTILISER),
    )
    .expect("potato farm");
    b.add_factory(
        FactoryDef::new(SCHNAPPS_DISTILLERY, "Schnapps Distillery", fixed(30.0), out(SCHNAPPS, 1.0))
            .with_input(POTATO, fixed(1.0))
            .with_workforce(FARMERS, fixed(50.0))
            .in_regions(vec![OLD_WORLD]),
    )
    .expect("distillery");
    b.add_factory(
        FactoryDef::new(CLAY_PIT, "Clay Pit", fixed(30.0), out(CLAY, 1.0))
            .with_workforce(FARMERS, fixed(50.0)),
    )
    .expect("clay pit");
    b.add_factory(
        FactoryDef::new(BRICKWORKS, "Brick Factory", fixed(60.0), out(BRICKS, 1.0))
            .with_input(CLAY, fixed(2.0))
            .with_workforce(FARMERS, fixed(50.0)),
    )
    .expect("brickworks");
    b.build().expect("island catalog")
}

fn out(product: ProductId, amount: f64) -> OutputDef {
    OutputDef {
        product,
        amount: fixed(amount),
    }
}

// ===========================================================================
// Scenario catalog: one product, two factories, one productivity buff
// ===========================================================================

pub const GOODS: ProductId = ProductId(100);
/// Cycle 60 s, 10 per cycle.
pub const FACTORY_F: FactoryId = FactoryId(200);
/// Cycle 60 s, 4 per cycle.
pub const FACTORY_F2: FactoryId = FactoryId(201);
pub const BOOST_50: BuffId = BuffId(300);

/// `FACTORY_F` is only available in the old world.
pub fn scenario_catalog() -> Catalog {
    let mut b = CatalogBuilder::new();
    b.add_product(ProductDef::new(GOODS, "Goods")).expect("goods");
    b.add_buff(BuffDef::new(BOOST_50, "Productivity +50%").productivity(fixed(50.0)))
        .expect("boost");
    b.add_factory(
        FactoryDef::new(FACTORY_F, "F", fixed(60.0), out(GOODS, 10.0))
            .in_regions(vec![OLD_WORLD])
            .with_buff(BOOST_50),
    )
    .expect("F");
    b.add_factory(
        FactoryDef::new(FACTORY_F2, "F2", fixed(60.0), out(GOODS, 4.0)).in_regions(vec![OLD_WORLD]),
    )
    .expect("F2");
    b.build().expect("scenario catalog")
}

// ===========================================================================
// Self-feedback catalog
// ===========================================================================

pub const RUM: ProductId = ProductId(400);
/// Cycle 60 s, 1 per cycle.
pub const DISTILLERY: FactoryId = FactoryId(410);
/// One extra rum every 10 cycles.
pub const SPARE_BARREL: BuffId = BuffId(420);

/// A factory whose buff yields 10% extra of its own output.
pub fn self_feedback_catalog() -> Catalog {
    let mut b = CatalogBuilder::new();
    b.add_product(ProductDef::new(RUM, "Rum")).expect("rum");
    b.add_buff(BuffDef::new(SPARE_BARREL, "Spare Barrel").extra_output(RUM, fixed(1.0), 10))
        .expect("barrel");
    b.add_factory(
        FactoryDef::new(DISTILLERY, "Rum Distillery", fixed(60.0), out(RUM, 1.0))
            .with_buff(SPARE_BARREL),
    )
    .expect("distillery");
    b.build().expect("self-feedback catalog")
}

// ===========================================================================
// Chain catalog for benchmarks
// ===========================================================================

/// `length` products where each factory consumes the previous product.
pub fn chain_catalog(length: u32) -> Catalog {
    let mut b = CatalogBuilder::new();
    for i in 0..length {
        b.add_product(ProductDef::new(ProductId(1000 + i), &format!("tier {i}")))
            .expect("product");
    }
    for i in 0..length {
        let mut def = FactoryDef::new(
            FactoryId(2000 + i),
            &format!("factory {i}"),
            fixed(30.0),
            out(ProductId(1000 + i), 1.0),
        );
        if i > 0 {
            def = def.with_input(ProductId(1000 + i - 1), fixed(1.0));
        }
        b.add_factory(def).expect("factory");
    }
    b.build().expect("chain catalog")
}

// ===========================================================================
// Sessions
// ===========================================================================

/// Session over `catalog` driven by a manual clock.
pub fn session_with(catalog: Catalog) -> (Session, ManualClock) {
    let clock = ManualClock::new();
    let session = Session::new(Arc::new(catalog)).with_clock(clock.clone());
    (session, clock)
}

/// Session with one old-world island.
pub fn single_island(catalog: Catalog, island: IslandId) -> (Session, ManualClock) {
    let (mut session, clock) = session_with(catalog);
    session.add_island(island, OLD_WORLD).expect("island");
    (session, clock)
}
