//! Trade and persistence example: two islands share goods, then the
//! session is saved to a key-value store and restored.
//!
//! Run with: `cargo run -p isleflow-core --example trade_and_save`

use isleflow_core::id::*;
use isleflow_core::persist::{KeyValueStore, MemoryStore};
use isleflow_core::supplier::Supplier;
use isleflow_core::test_utils::*;

const HOME: IslandId = IslandId(1);
const COLONY: IslandId = IslandId(2);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // FACTORY_F only builds in the old world, so the colony must import.
    let (mut session, _clock) = session_with(scenario_catalog());
    session.add_island(HOME, OLD_WORLD)?;
    session.add_island(COLONY, NEW_WORLD)?;
    session.add_demand(COLONY, GOODS, fixed(12.0))?;
    println!(
        "colony default before trade: {:?}",
        session.default_supplier(COLONY, GOODS)?
    );

    let route = session.create_trade_route(GOODS, HOME, COLONY, fixed(0.0))?;
    println!(
        "route ships {}/min, home factory target {}/min",
        session.route_production(route)?,
        session.demand_target(HOME, FACTORY_F)?,
    );

    // Closing the loop is refused.
    let back = session.create_trade_route(GOODS, COLONY, HOME, fixed(0.0))?;
    let refused = session.update_default_supplier(HOME, GOODS, Some(Supplier::TradeRoute(back)));
    println!("return route as home default: {refused:?}");
    session.delete_trade_route(back)?;

    // --- Save and restore ---

    let mut store = MemoryStore::new();
    session.save(&mut store)?;
    for key in store.keys().iter().filter(|k| k.contains(".defaultSupplier.")) {
        println!("  {key} = {}", store.get(key).unwrap_or_default());
    }

    let (mut restored, _clock) = session_with(scenario_catalog());
    restored.add_island(HOME, OLD_WORLD)?;
    restored.add_island(COLONY, NEW_WORLD)?;
    restored.load(&store)?;
    println!(
        "restored: {} route(s), colony production {}/min",
        restored.routes().count(),
        restored.total_production(COLONY, GOODS)?,
    );
    Ok(())
}
