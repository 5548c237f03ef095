//! Island economy example: a timber chain on one island.
//!
//! Builds a small catalog (lumberjack -> sawmill, both needing farmers),
//! asks for timber, then builds sawmills and applies a buff that removes
//! their farmer workforce. Prints the supply picture after each step.
//!
//! Run with: `cargo run -p isleflow-core --example island_economy`

use std::sync::Arc;

use isleflow_core::catalog::{BuffDef, CatalogBuilder, FactoryDef, OutputDef, ProductDef};
use isleflow_core::fixed::Fixed64;
use isleflow_core::id::*;
use isleflow_core::session::{EngineError, Session};

const WOOD: ProductId = ProductId(120008);
const TIMBER: ProductId = ProductId(1010196);
const FARMERS: ProductId = ProductId(1010052);
const LUMBERJACK: FactoryId = FactoryId(1010266);
const SAWMILL: FactoryId = FactoryId(1010269);
const STEAM_SAW: BuffId = BuffId(190001);
const OLD_WORLD: RegionId = RegionId(5000000);
const HOME: IslandId = IslandId(1);

fn rate(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

fn print_state(session: &mut Session, label: &str) -> Result<(), EngineError> {
    println!("--- {label} ---");
    for (name, product) in [("wood", WOOD), ("timber", TIMBER), ("farmers", FARMERS)] {
        println!(
            "  {name:8} demand {:>7.3}/min  production {:>7.3}/min  default {:?}",
            session.total_demand(HOME, product)?.to_num::<f64>(),
            session.total_production(HOME, product)?.to_num::<f64>(),
            session.default_supplier(HOME, product)?,
        );
    }
    for (name, factory, output) in [("lumberjack", LUMBERJACK, WOOD), ("sawmill", SAWMILL, TIMBER)] {
        println!(
            "  {name:10} required {:>6.3}  constructed {}  missing {}",
            session.required_buildings(HOME, factory)?.to_num::<f64>(),
            session.constructed_buildings(HOME, factory)?,
            session.is_highlighted_as_missing(HOME, output)?,
        );
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // --- Step 1: Catalog ---

    let mut builder = CatalogBuilder::new();
    builder.add_product(ProductDef::new(WOOD, "Wood"))?;
    builder.add_product(ProductDef::new(TIMBER, "Timber").construction_material())?;
    builder.add_product(ProductDef::new(FARMERS, "Farmer Workforce").abstract_product())?;
    builder.add_buff(BuffDef::new(STEAM_SAW, "Steam Saw").replace_workforce(FARMERS, None))?;
    builder.add_factory(
        FactoryDef::new(
            LUMBERJACK,
            "Lumberjack's Hut",
            rate(15.0),
            OutputDef {
                product: WOOD,
                amount: rate(1.0),
            },
        )
        .with_workforce(FARMERS, rate(5.0)),
    )?;
    builder.add_factory(
        FactoryDef::new(
            SAWMILL,
            "Sawmill",
            rate(15.0),
            OutputDef {
                product: TIMBER,
                amount: rate(1.0),
            },
        )
        .with_input(WOOD, rate(1.0))
        .with_workforce(FARMERS, rate(10.0))
        .with_buff(STEAM_SAW),
    )?;
    let catalog = Arc::new(builder.build()?);

    // --- Step 2: One island, some timber demand ---

    let mut session = Session::new(catalog);
    session.add_island(HOME, OLD_WORLD)?;
    session.add_demand(HOME, TIMBER, rate(8.0))?;
    print_state(&mut session, "8 timber/min requested")?;

    // --- Step 3: Build the sawmills and lumberjacks in one batch ---

    session.batch(|s| {
        s.set_building_count(HOME, SAWMILL, rate(2.0))?;
        s.set_building_count(HOME, LUMBERJACK, rate(1.0))
    })?;
    print_state(&mut session, "2 sawmills, 1 lumberjack built")?;

    // --- Step 4: Steam saws on half the sawmills ---

    session.set_applied_buff_scaling(HOME, SAWMILL, STEAM_SAW, rate(0.5))?;
    print_state(&mut session, "steam saw at 50%")?;

    let report = session.last_settle();
    println!("last settle: {} passes, converged {}", report.passes, report.converged);
    Ok(())
}
