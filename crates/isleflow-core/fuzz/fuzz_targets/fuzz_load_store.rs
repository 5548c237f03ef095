#![no_main]
use arbitrary::Arbitrary;
use isleflow_core::id::*;
use isleflow_core::persist::{KeyValueStore, MemoryStore, island_prefix};
use isleflow_core::test_utils::*;
use libfuzzer_sys::fuzz_target;

/// Store entries with keys biased towards ones the loader reads.
#[derive(Arbitrary, Debug)]
struct Entry {
    island: u8,
    guid: u8,
    suffix: u8,
    value: String,
}

const SUFFIXES: [&str; 8] = [
    "defaultSupplier.type",
    "defaultSupplier.id",
    "passiveTrade.amount",
    "buildings.constructed",
    "buildings.planned",
    "fullyUtilizeConstructed",
    "buff.21.scaling",
    "buff.20.scaling",
];

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    entries: Vec<Entry>,
    trade_routes: Option<String>,
}

fuzz_target!(|input: FuzzInput| {
    let (mut session, _clock) = session_with(island_catalog());
    let _ = session.add_island(IslandId(1), OLD_WORLD);
    let _ = session.add_island(IslandId(2), NEW_WORLD);

    let mut store = MemoryStore::new();
    for entry in input.entries.iter().take(64) {
        let island = IslandId(u32::from(entry.island % 3));
        let suffix = SUFFIXES[usize::from(entry.suffix) % SUFFIXES.len()];
        let key = format!("{}{}.{suffix}", island_prefix(island), entry.guid % 24);
        store.set(&key, entry.value.clone());
    }
    if let Some(routes) = input.trade_routes {
        store.set("tradeRoutes", routes);
    }

    // Stale or malformed data must never panic; a malformed route blob is
    // the only error.
    let _ = session.load(&store);
});
