#![no_main]
use arbitrary::Arbitrary;
use isleflow_core::id::*;
use isleflow_core::supplier::Supplier;
use isleflow_core::test_utils::*;
use libfuzzer_sys::fuzz_target;

/// A structured mutation operation for fuzzing.
#[derive(Arbitrary, Debug)]
enum FuzzOp {
    AddDemand { island: u8, product: u8, rate: u16 },
    RemoveDemand { index: u8 },
    SetBuildings { island: u8, factory: u8, count: u8 },
    FullyUtilize { island: u8, factory: u8, value: bool },
    BuffScaling { island: u8, buff: u8, scaling: u8 },
    CreateRoute { from: u8, to: u8, product: u8, amount: u8 },
    DeleteRoute { index: u8 },
    SetDefault { island: u8, product: u8, pick: u8 },
    BeginBatch,
    EndBatch,
}

/// Top-level fuzz input: a sequence of operations.
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    ops: Vec<FuzzOp>,
}

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

fn island(i: u8) -> IslandId {
    IslandId(u32::from(i % 3) + 1)
}

fn product(p: u8) -> ProductId {
    PRODUCTS[usize::from(p) % PRODUCTS.len()]
}

fn factory(f: u8) -> FactoryId {
    FACTORIES[usize::from(f) % FACTORIES.len()]
}

fuzz_target!(|input: FuzzInput| {
    let (mut session, clock) = session_with(island_catalog());
    let _ = session.add_island(IslandId(1), OLD_WORLD);
    let _ = session.add_island(IslandId(2), OLD_WORLD);
    let _ = session.add_island(IslandId(3), NEW_WORLD);
    let mut demands: Vec<(IslandId, DemandId)> = Vec::new();

    // Limit operations to prevent timeouts.
    let max_ops = input.ops.len().min(200);

    for op in &input.ops[..max_ops] {
        clock.advance(50);
        match *op {
            FuzzOp::AddDemand { island: i, product: p, rate } => {
                let rate = fixed(f64::from(rate) / 100.0);
                if let Ok(id) = session.add_demand(island(i), product(p), rate) {
                    demands.push((island(i), id));
                }
            }
            FuzzOp::RemoveDemand { index } => {
                if !demands.is_empty() {
                    let (i, id) = demands.remove(usize::from(index) % demands.len());
                    let _ = session.remove_demand(i, id);
                }
            }
            FuzzOp::SetBuildings { island: i, factory: f, count } => {
                let _ = session.set_building_count(island(i), factory(f), fixed(f64::from(count)));
            }
            FuzzOp::FullyUtilize { island: i, factory: f, value } => {
                let _ = session.set_fully_utilize(island(i), factory(f), value);
            }
            FuzzOp::BuffScaling { island: i, buff, scaling } => {
                let (f, b) = BUFFS[usize::from(buff) % BUFFS.len()];
                let _ = session.set_applied_buff_scaling(island(i), f, b, fixed(f64::from(scaling) / 100.0));
            }
            FuzzOp::CreateRoute { from, to, product: p, amount } => {
                let _ = session.create_trade_route(product(p), island(from), island(to), fixed(f64::from(amount)));
            }
            FuzzOp::DeleteRoute { index } => {
                let ids: Vec<TradeRouteId> = session.routes().map(|(id, _)| id).collect();
                if !ids.is_empty() {
                    let _ = session.delete_trade_route(ids[usize::from(index) % ids.len()]);
                }
            }
            FuzzOp::SetDefault { island: i, product: p, pick } => {
                let suppliers: Vec<Supplier> = session.suppliers(island(i), product(p)).unwrap_or_default();
                if !suppliers.is_empty() {
                    let s = suppliers[usize::from(pick) % suppliers.len()];
                    let _ = session.update_default_supplier(island(i), product(p), Some(s));
                }
            }
            FuzzOp::BeginBatch => session.begin_batch(),
            FuzzOp::EndBatch => {
                if session.in_batch() {
                    session.end_batch();
                }
            }
        }
    }
    while session.in_batch() {
        session.end_batch();
    }
});
