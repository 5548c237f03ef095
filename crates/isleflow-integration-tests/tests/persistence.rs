//! Save a two-island session with a trade route, load it into a fresh
//! session and compare every observable value.

use isleflow_core::id::*;
use isleflow_core::persist::{KeyValueStore, MemoryStore, TRADE_ROUTES_KEY};
use isleflow_core::session::Session;
use isleflow_core::supplier::Supplier;
use isleflow_core::test_utils::*;
use isleflow_data::FileStore;

const A: IslandId = IslandId(1);
const B: IslandId = IslandId(2);

fn empty_archipelago() -> Session {
    let (mut s, _clock) = session_with(island_catalog());
    s.add_island(A, OLD_WORLD).unwrap();
    s.add_island(B, NEW_WORLD).unwrap();
    s
}

/// Old-world island A ships schnapps to new-world island B, which cannot
/// distil its own.
fn populated_archipelago() -> Session {
    let mut s = empty_archipelago();
    s.batch(|s| {
        s.add_demand(B, SCHNAPPS, fixed(6.0))?;
        s.add_demand(A, TIMBER, fixed(3.0))?;
        s.set_building_count(A, SAWMILL, fixed(2.0))?;
        s.set_fully_utilize(A, SAWMILL, true)?;
        s.set_applied_buff_scaling(A, SAWMILL, STEAM_SAW, fixed(0.5))?;
        s.set_applied_buff_scaling(A, POTATO_FARM, FERTILISER, fixed(1.0))?;
        s.set_passive_import(A, CLAY, fixed(1.5))?;
        s.set_planned_buildings(A, BRICKWORKS, fixed(3.0))
    })
    .unwrap();
    s.create_trade_route(SCHNAPPS, A, B, fixed(1.0)).unwrap();
    s
}

fn route_serial(s: &Session, island: IslandId, product: ProductId) -> Option<u64> {
    match s.default_supplier(island, product).unwrap() {
        Some(Supplier::TradeRoute(r)) => Some(s.route(r).unwrap().serial),
        _ => None,
    }
}

fn route_serials(s: &Session) -> Vec<u64> {
    s.routes().map(|(_, r)| r.serial).collect()
}

/// Compare everything a caller can observe, with routes matched by serial.
fn assert_same_state(a: &mut Session, b: &mut Session) {
    for island in [A, B] {
        for product in [WOOD, TIMBER, POTATO, SCHNAPPS, FARMERS, BRICKS, CLAY] {
            assert_eq!(
                a.total_demand(island, product).unwrap(),
                b.total_demand(island, product).unwrap(),
                "total demand of {product:?} on {island:?}"
            );
            assert_eq!(
                a.total_production(island, product).unwrap(),
                b.total_production(island, product).unwrap(),
                "total production of {product:?} on {island:?}"
            );
            assert_eq!(route_serial(a, island, product), route_serial(b, island, product));
            if route_serial(a, island, product).is_none() {
                assert_eq!(
                    a.default_supplier(island, product).unwrap(),
                    b.default_supplier(island, product).unwrap()
                );
            }
        }
        for factory in [LUMBERJACK, SAWMILL, POTATO_FARM, SCHNAPPS_DISTILLERY, CLAY_PIT, BRICKWORKS] {
            assert_eq!(
                a.constructed_buildings(island, factory).unwrap(),
                b.constructed_buildings(island, factory).unwrap()
            );
            assert_eq!(
                a.planned_buildings(island, factory).unwrap(),
                b.planned_buildings(island, factory).unwrap()
            );
            assert_eq!(
                a.fully_utilize(island, factory).unwrap(),
                b.fully_utilize(island, factory).unwrap()
            );
            assert_eq!(a.boost(island, factory).unwrap(), b.boost(island, factory).unwrap());
        }
    }
    assert_eq!(route_serials(a), route_serials(b));
}

#[test]
fn memory_store_round_trip() {
    let mut original = populated_archipelago();
    let mut store = MemoryStore::new();
    original.save(&mut store).unwrap();

    assert!(store.get(TRADE_ROUTES_KEY).is_some());
    assert_eq!(
        store.get("island.1.11.buildings.constructed").as_deref(),
        Some("2")
    );
    assert_eq!(
        store.get("island.2.4.defaultSupplier.type").as_deref(),
        Some("trade_route")
    );

    let mut restored = empty_archipelago();
    restored.load(&store).unwrap();

    assert_same_state(&mut original, &mut restored);
    assert_rate_eq(
        restored.applied_buff_scaling(A, SAWMILL, STEAM_SAW).unwrap(),
        fixed(0.5),
    );
}

#[test]
fn file_store_round_trip() {
    let dir = std::env::temp_dir().join(format!("isleflow_persist_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("session.json");

    let mut original = populated_archipelago();
    let mut store = FileStore::open(&path).unwrap();
    original.save(&mut store).unwrap();
    store.flush().unwrap();

    let reopened = FileStore::open(&path).unwrap();
    let mut restored = empty_archipelago();
    restored.load(&reopened).unwrap();
    assert_same_state(&mut original, &mut restored);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn new_routes_after_load_get_fresh_serials() {
    let original = {
        let mut s = populated_archipelago();
        let mut store = MemoryStore::new();
        s.save(&mut store).unwrap();
        store
    };
    let mut restored = empty_archipelago();
    restored.load(&original).unwrap();

    let loaded: Vec<u64> = restored.routes().map(|(_, r)| r.serial).collect();
    let fresh = restored
        .create_trade_route(WOOD, A, B, fixed(1.0))
        .unwrap();
    let serial = restored.route(fresh).unwrap().serial;
    assert!(loaded.iter().all(|s| *s < serial));
}

#[test]
fn loading_twice_does_not_duplicate_routes() {
    let mut original = populated_archipelago();
    let mut store = MemoryStore::new();
    original.save(&mut store).unwrap();

    let mut restored = empty_archipelago();
    restored.load(&store).unwrap();
    restored.load(&store).unwrap();
    assert_eq!(restored.routes().count(), 1);
}
