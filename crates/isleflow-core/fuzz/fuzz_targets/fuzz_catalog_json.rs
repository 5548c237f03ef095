#![no_main]
use isleflow_core::data_loader::load_catalog_json_bytes;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must parse or fail cleanly, and a parsed catalog must
    // build or fail cleanly.
    if let Ok(builder) = load_catalog_json_bytes(data) {
        let _ = builder.build();
    }
});
