//! Property-based tests over random mutation sequences.
//!
//! Three islands share the island catalog: two in the old world and one in
//! the new world, where the potato farm and schnapps distillery are not
//! available. After every mutation the session must hold:
//!
//! - conservation: production equals demand plus excess whenever a default
//!   supplier exists, and excess is never negative
//! - at most one supplier per product is flagged default, and it is the one
//!   the product points at
//! - following default trade routes upstream never revisits an island

use std::collections::BTreeSet;

use isleflow_core::id::*;
use isleflow_core::session::Session;
use isleflow_core::supplier::Supplier;
use isleflow_core::test_utils::*;
use proptest::prelude::*;

const ISLANDS: [IslandId; 3] = [IslandId(1), IslandId(2), IslandId(3)];
const PRODUCTS: [ProductId; 7] = [WOOD, TIMBER, POTATO, SCHNAPPS, FARMERS, BRICKS, CLAY];
const FACTORIES: [FactoryId; 6] = [
    LUMBERJACK,
    SAWMILL,
    POTATO_FARM,
    SCHNAPPS_DISTILLERY,
    CLAY_PIT,
    BRICKWORKS,
];
const BUFFS: [(FactoryId, BuffId); 3] = [
    (POTATO_FARM, FERTILISER),
    (SAWMILL, STEAM_SAW),
    (SAWMILL, PLANK_OFFCUTS),
];

// ===========================================================================
// Generators
// ===========================================================================

#[derive(Debug, Clone)]
enum Op {
    AddDemand(usize, usize, u32),
    SetBuildings(usize, usize, u32),
    FullyUtilize(usize, usize, bool),
    BuffScaling(usize, usize, u32),
    PassiveImport(usize, usize, u32),
    CreateRoute(usize, usize, usize, u32),
    DeleteRoute(usize),
    RouteAmount(usize, u32),
    SetDefault(usize, usize, usize),
    ClearDefault(usize, usize),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..3usize, 0..7usize, 0..40u32).prop_map(|(i, p, r)| Op::AddDemand(i, p, r)),
        (0..3usize, 0..6usize, 0..8u32).prop_map(|(i, f, n)| Op::SetBuildings(i, f, n)),
        (0..3usize, 0..6usize, any::<bool>()).prop_map(|(i, f, b)| Op::FullyUtilize(i, f, b)),
        (0..3usize, 0..3usize, 0..=4u32).prop_map(|(i, b, q)| Op::BuffScaling(i, b, q)),
        (0..3usize, 0..7usize, 0..10u32).prop_map(|(i, p, a)| Op::PassiveImport(i, p, a)),
        (0..3usize, 0..3usize, 0..7usize, 0..5u32)
            .prop_map(|(a, b, p, amt)| Op::CreateRoute(a, b, p, amt)),
        (0..8usize).prop_map(Op::DeleteRoute),
        (0..8usize, 0..5u32).prop_map(|(r, a)| Op::RouteAmount(r, a)),
        (0..3usize, 0..7usize, 0..6usize).prop_map(|(i, p, s)| Op::SetDefault(i, p, s)),
        (0..3usize, 0..7usize).prop_map(|(i, p)| Op::ClearDefault(i, p)),
    ]
}

/// Value edits only. Without routes, default changes or byproducts the
/// settled state depends only on the final values, not on the order of
/// settles.
fn arb_edit() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..3usize, 0..7usize, 0..40u32).prop_map(|(i, p, r)| Op::AddDemand(i, p, r)),
        (0..3usize, 0..6usize, 0..8u32).prop_map(|(i, f, n)| Op::SetBuildings(i, f, n)),
        (0..3usize, 0..6usize, any::<bool>()).prop_map(|(i, f, b)| Op::FullyUtilize(i, f, b)),
        (0..3usize, 0..2usize, 0..=4u32).prop_map(|(i, b, q)| Op::BuffScaling(i, b, q)),
        (0..3usize, 0..7usize, 0..10u32).prop_map(|(i, p, a)| Op::PassiveImport(i, p, a)),
    ]
}

fn build_session() -> Session {
    let (mut s, _clock) = session_with(island_catalog());
    s.add_island(ISLANDS[0], OLD_WORLD).unwrap();
    s.add_island(ISLANDS[1], OLD_WORLD).unwrap();
    s.add_island(ISLANDS[2], NEW_WORLD).unwrap();
    s
}

/// Apply one operation. Refused operations are part of the domain and are
/// ignored.
fn apply(s: &mut Session, op: &Op) {
    let _ = match *op {
        Op::AddDemand(i, p, r) => s
            .add_demand(ISLANDS[i], PRODUCTS[p], fixed(f64::from(r) / 4.0))
            .map(|_| ()),
        Op::SetBuildings(i, f, n) => s.set_building_count(ISLANDS[i], FACTORIES[f], fixed(f64::from(n))),
        Op::FullyUtilize(i, f, b) => s.set_fully_utilize(ISLANDS[i], FACTORIES[f], b),
        Op::BuffScaling(i, b, q) => {
            let (factory, buff) = BUFFS[b];
            s.set_applied_buff_scaling(ISLANDS[i], factory, buff, fixed(f64::from(q) / 4.0))
        }
        Op::PassiveImport(i, p, a) => s.set_passive_import(ISLANDS[i], PRODUCTS[p], fixed(f64::from(a))),
        Op::CreateRoute(a, b, p, amt) => s
            .create_trade_route(PRODUCTS[p], ISLANDS[a], ISLANDS[b], fixed(f64::from(amt)))
            .map(|_| ()),
        Op::DeleteRoute(r) => {
            let route = s.routes().map(|(id, _)| id).nth(r);
            match route {
                Some(id) => s.delete_trade_route(id),
                None => Ok(()),
            }
        }
        Op::RouteAmount(r, a) => {
            let route = s.routes().map(|(id, _)| id).nth(r);
            match route {
                Some(id) => s.set_trade_route_amount(id, fixed(f64::from(a))),
                None => Ok(()),
            }
        }
        Op::SetDefault(i, p, k) => {
            let suppliers = s.suppliers(ISLANDS[i], PRODUCTS[p]).unwrap_or_default();
            match suppliers.get(k) {
                Some(supplier) => s.update_default_supplier(ISLANDS[i], PRODUCTS[p], Some(*supplier)),
                None => Ok(()),
            }
        }
        Op::ClearDefault(i, p) => s.update_default_supplier(ISLANDS[i], PRODUCTS[p], None),
    };
}

// ===========================================================================
// Invariant checks
// ===========================================================================

fn check_conservation(s: &mut Session) -> Result<(), TestCaseError> {
    for island in ISLANDS {
        for product in PRODUCTS {
            let excess = s.excess_production(island, product).unwrap();
            prop_assert!(excess >= fixed(0.0), "negative excess on {island:?}/{product:?}");

            let default = s.default_supplier(island, product).unwrap();
            if matches!(default, None | Some(Supplier::Byproduct)) {
                continue;
            }
            let production = s.total_production(island, product).unwrap();
            let demand = s.total_demand(island, product).unwrap();
            let diff = (production - (demand + excess)).to_num::<f64>().abs();
            prop_assert!(
                diff < RATE_EPSILON,
                "{island:?}/{product:?}: production {production}, demand {demand}, excess {excess}"
            );
        }
    }
    Ok(())
}

fn check_single_default(s: &mut Session) -> Result<(), TestCaseError> {
    for island in ISLANDS {
        for product in PRODUCTS {
            let pointer = s.default_supplier(island, product).unwrap();
            let flagged: Vec<Supplier> = s
                .suppliers(island, product)
                .unwrap()
                .into_iter()
                .filter(|sup| s.is_default_supplier(island, product, *sup).unwrap())
                .collect();
            prop_assert!(flagged.len() <= 1, "{island:?}/{product:?}: {flagged:?}");
            prop_assert_eq!(flagged.first().copied(), pointer);
        }
    }
    Ok(())
}

fn check_no_cycles(s: &Session) -> Result<(), TestCaseError> {
    for start in ISLANDS {
        for product in PRODUCTS {
            let mut visited = BTreeSet::from([start]);
            let mut current = start;
            while let Some(Supplier::TradeRoute(r)) = s.default_supplier(current, product).unwrap() {
                current = s.route(r).unwrap().from;
                prop_assert!(
                    visited.insert(current),
                    "default routes for {product:?} loop back to {current:?}"
                );
            }
        }
    }
    Ok(())
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn invariants_hold_after_every_mutation(ops in proptest::collection::vec(arb_op(), 1..40)) {
        let mut s = build_session();
        for op in &ops {
            apply(&mut s, op);
            prop_assert!(s.last_settle().converged, "settle did not converge after {op:?}");
            check_conservation(&mut s)?;
            check_single_default(&mut s)?;
            check_no_cycles(&s)?;
        }
    }

    #[test]
    fn batched_edits_match_sequential(ops in proptest::collection::vec(arb_edit(), 1..20)) {
        let mut sequential = build_session();
        for op in &ops {
            apply(&mut sequential, op);
        }
        let mut batched = build_session();
        batched.batch(|s| {
            for op in &ops {
                apply(s, op);
            }
        });

        for island in ISLANDS {
            for product in PRODUCTS {
                let a = sequential.total_production(island, product).unwrap();
                let b = batched.total_production(island, product).unwrap();
                prop_assert_eq!(a, b, "total production differs on {:?}/{:?}", island, product);
            }
        }
    }
}
