//! Data-driven catalog loading from JSON.
//!
//! Feature-gated behind `data-loader`. Deserializes a single JSON document
//! with numeric guids into a [`CatalogBuilder`]. Name-referenced data in
//! RON/TOML/JSON files is handled by `isleflow-data`.

use crate::catalog::{BuffDef, CatalogBuilder, CatalogError, FactoryDef, OutputDef, ProductDef};
use crate::fixed::{Fixed64, f64_to_fixed64};
use crate::id::{BuffId, FactoryId, ProductId, RegionId};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

// ---------------------------------------------------------------------------
// JSON data structures
// ---------------------------------------------------------------------------

/// Top-level catalog document.
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogData {
    #[serde(default)]
    pub products: Vec<ProductData>,
    #[serde(default)]
    pub factories: Vec<FactoryData>,
    #[serde(default)]
    pub buffs: Vec<BuffData>,
    #[serde(default)]
    pub forced_suppliers: Vec<ForcedSupplierData>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductData {
    pub guid: u32,
    pub name: String,
    #[serde(default)]
    pub is_abstract: bool,
    #[serde(default)]
    pub is_construction_material: bool,
}

/// Product and amount pair used for inputs, outputs and workforce.
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmountData {
    pub product: u32,
    pub amount: f64,
    #[serde(default)]
    pub fuel: bool,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactoryData {
    pub guid: u32,
    pub name: String,
    pub cycle_time: f64,
    #[serde(default)]
    pub inputs: Vec<AmountData>,
    pub output: AmountData,
    #[serde(default)]
    pub workforce: Option<AmountData>,
    #[serde(default)]
    pub regions: Vec<u32>,
    #[serde(default)]
    pub buffs: Vec<u32>,
}

#[derive(Debug, serde::Deserialize)]
pub struct ReplacementData {
    pub from: u32,
    #[serde(default)]
    pub to: Option<u32>,
}

#[derive(Debug, serde::Deserialize)]
pub struct ExtraOutputData {
    pub product: u32,
    pub amount: f64,
    pub cycle: u32,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuffData {
    pub guid: u32,
    pub name: String,
    #[serde(default)]
    pub productivity_upgrade: f64,
    #[serde(default)]
    pub input_replacements: Vec<ReplacementData>,
    #[serde(default)]
    pub fuel_duration_percent: f64,
    #[serde(default)]
    pub extra_outputs: Vec<ExtraOutputData>,
    #[serde(default)]
    pub workforce_replacement: Option<ReplacementData>,
    #[serde(default)]
    pub byproduct_multiplier_percent: f64,
}

#[derive(Debug, serde::Deserialize)]
pub struct ForcedSupplierData {
    pub product: u32,
    pub region: u32,
    pub factory: u32,
}

// ---------------------------------------------------------------------------
// Loading functions
// ---------------------------------------------------------------------------

/// Load a catalog builder from a JSON string.
pub fn load_catalog_json(json: &str) -> Result<CatalogBuilder, DataLoadError> {
    let data: CatalogData = serde_json::from_str(json)?;
    build_catalog(data)
}

/// Load a catalog builder from JSON bytes.
pub fn load_catalog_json_bytes(bytes: &[u8]) -> Result<CatalogBuilder, DataLoadError> {
    let data: CatalogData = serde_json::from_slice(bytes)?;
    build_catalog(data)
}

fn buff_def(buff: &BuffData) -> BuffDef {
    let mut def = BuffDef::new(BuffId(buff.guid), &buff.name)
        .productivity(f64_to_fixed64(buff.productivity_upgrade))
        .fuel_duration(f64_to_fixed64(buff.fuel_duration_percent))
        .byproduct_multiplier(f64_to_fixed64(buff.byproduct_multiplier_percent));
    for r in &buff.input_replacements {
        def = def.replace_input(ProductId(r.from), r.to.map(ProductId));
    }
    for e in &buff.extra_outputs {
        def = def.extra_output(ProductId(e.product), f64_to_fixed64(e.amount), e.cycle);
    }
    if let Some(r) = &buff.workforce_replacement {
        def = def.replace_workforce(ProductId(r.from), r.to.map(ProductId));
    }
    def
}

fn factory_def(factory: &FactoryData) -> FactoryDef {
    let output = OutputDef {
        product: ProductId(factory.output.product),
        amount: f64_to_fixed64(factory.output.amount),
    };
    let mut def = FactoryDef::new(
        FactoryId(factory.guid),
        &factory.name,
        f64_to_fixed64(factory.cycle_time),
        output,
    );
    for input in &factory.inputs {
        let amount: Fixed64 = f64_to_fixed64(input.amount);
        def = if input.fuel {
            def.with_fuel(ProductId(input.product), amount)
        } else {
            def.with_input(ProductId(input.product), amount)
        };
    }
    if let Some(w) = &factory.workforce {
        def = def.with_workforce(ProductId(w.product), f64_to_fixed64(w.amount));
    }
    def = def.in_regions(factory.regions.iter().copied().map(RegionId).collect());
    for buff in &factory.buffs {
        def = def.with_buff(BuffId(*buff));
    }
    def
}

fn build_catalog(data: CatalogData) -> Result<CatalogBuilder, DataLoadError> {
    let mut builder = CatalogBuilder::new();

    // Phase 1: products
    for p in &data.products {
        let mut def = ProductDef::new(ProductId(p.guid), &p.name);
        def.is_abstract = p.is_abstract;
        def.is_construction_material = p.is_construction_material;
        builder.add_product(def)?;
    }

    // Phase 2: buffs and factories (cross references checked at build)
    for b in &data.buffs {
        builder.add_buff(buff_def(b))?;
    }
    for f in &data.factories {
        builder.add_factory(factory_def(f))?;
    }

    // Phase 3: forced suppliers
    for forced in &data.forced_suppliers {
        builder.force_supplier(
            ProductId(forced.product),
            RegionId(forced.region),
            FactoryId(forced.factory),
        );
    }

    Ok(builder)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_empty_json() {
        let builder = load_catalog_json("{}").unwrap();
        let cat = builder.build().unwrap();
        assert_eq!(cat.product_count(), 0);
        assert_eq!(cat.factory_count(), 0);
        assert_eq!(cat.buff_count(), 0);
    }

    #[test]
    fn load_full_catalog() {
        let json = r#"{
            "products": [
                {"guid": 120008, "name": "Wood"},
                {"guid": 1010196, "name": "Timber", "isConstructionMaterial": true},
                {"guid": 1010052, "name": "Farmer Workforce", "isAbstract": true}
            ],
            "buffs": [
                {"guid": 190001, "name": "Fertiliser", "productivityUpgrade": 50},
                {"guid": 190002, "name": "Offcuts",
                 "extraOutputs": [{"product": 120008, "amount": 1, "cycle": 4}],
                 "workforceReplacement": {"from": 1010052}}
            ],
            "factories": [
                {"guid": 1010266, "name": "Lumberjack", "cycleTime": 15,
                 "output": {"product": 120008, "amount": 1},
                 "workforce": {"product": 1010052, "amount": 5},
                 "buffs": [190001]},
                {"guid": 1010269, "name": "Sawmill", "cycleTime": 15,
                 "inputs": [{"product": 120008, "amount": 1}],
                 "output": {"product": 1010196, "amount": 1},
                 "regions": [5000000],
                 "buffs": [190002]}
            ],
            "forcedSuppliers": [{"product": 1010196, "region": 5000000, "factory": 1010269}]
        }"#;
        let cat = load_catalog_json(json).unwrap().build().unwrap();
        assert_eq!(cat.product_count(), 3);
        assert_eq!(cat.factory_count(), 2);
        assert!(cat.product(ProductId(1010052)).unwrap().is_abstract);
        assert!(cat.product(ProductId(1010196)).unwrap().is_construction_material);
        assert_eq!(
            cat.forced_supplier(ProductId(1010196), RegionId(5000000)),
            Some(FactoryId(1010269))
        );
        let offcuts = cat.buff(BuffId(190002)).unwrap();
        assert_eq!(offcuts.extra_outputs.len(), 1);
        assert_eq!(offcuts.workforce_replacement.unwrap().to, None);
        let sawmill = cat.factory(FactoryId(1010269)).unwrap();
        assert_eq!(sawmill.regions, vec![RegionId(5000000)]);
    }

    #[test]
    fn unknown_product_reference_fails_at_build() {
        let json = r#"{
            "products": [{"guid": 1, "name": "a"}],
            "factories": [{"guid": 2, "name": "f", "cycleTime": 10,
                           "output": {"product": 99, "amount": 1}}]
        }"#;
        let builder = load_catalog_json(json).unwrap();
        assert!(matches!(
            builder.build(),
            Err(CatalogError::FactoryProductRef { .. })
        ));
    }

    #[test]
    fn duplicate_guid_fails() {
        let json = r#"{"products": [{"guid": 1, "name": "a"}, {"guid": 1, "name": "b"}]}"#;
        assert!(matches!(
            load_catalog_json(json),
            Err(DataLoadError::Catalog(CatalogError::DuplicateProduct(_)))
        ));
    }

    #[test]
    fn load_invalid_json_fails() {
        let result = load_catalog_json("not valid json {{{");
        assert!(matches!(result.unwrap_err(), DataLoadError::JsonParse(_)));
    }

    #[test]
    fn load_from_bytes() {
        let bytes = br#"{"products": [{"guid": 7, "name": "Fish"}]}"#;
        let cat = load_catalog_json_bytes(bytes).unwrap().build().unwrap();
        assert_eq!(cat.product(ProductId(7)).unwrap().name, "Fish");
    }
}
