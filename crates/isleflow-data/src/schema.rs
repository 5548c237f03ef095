//! Serde data file structs for catalog definitions.
//!
//! These structs define the on-disk format for products, factories, buffs
//! and forced suppliers. Cross references use product, factory and buff
//! names; the loader resolves them to catalog guids.

use serde::Deserialize;

// ===========================================================================
// Products
// ===========================================================================

/// A product definition in a data file.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductData {
    pub name: String,
    pub guid: u32,
    /// Workforce and other products that are never shipped.
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default)]
    pub construction_material: bool,
}

// ===========================================================================
// Factories
// ===========================================================================

/// A product amount entry, supporting both the short tuple form and the
/// full form with an optional `fuel` flag.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AmountData {
    /// Short form: `("wood", 1.0)`.
    Short(String, f64),
    /// Full form with explicit fields.
    Full {
        product: String,
        amount: f64,
        #[serde(default)]
        fuel: bool,
    },
}

impl AmountData {
    pub fn product(&self) -> &str {
        match self {
            AmountData::Short(p, _) => p,
            AmountData::Full { product, .. } => product,
        }
    }

    pub fn amount(&self) -> f64 {
        match self {
            AmountData::Short(_, a) => *a,
            AmountData::Full { amount, .. } => *amount,
        }
    }

    pub fn is_fuel(&self) -> bool {
        matches!(self, AmountData::Full { fuel: true, .. })
    }
}

/// A factory definition in a data file.
#[derive(Debug, Clone, Deserialize)]
pub struct FactoryData {
    pub name: String,
    pub guid: u32,
    /// Seconds per production cycle.
    pub cycle_time: f64,
    pub output: AmountData,
    #[serde(default)]
    pub inputs: Vec<AmountData>,
    #[serde(default)]
    pub workforce: Option<AmountData>,
    /// Region guids. Empty means every region.
    #[serde(default)]
    pub regions: Vec<u32>,
    /// Names of the buffs that can be applied.
    #[serde(default)]
    pub buffs: Vec<String>,
}

// ===========================================================================
// Buffs
// ===========================================================================

/// Replace `from` with `to`; a missing `to` removes the need.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplacementData {
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
}

/// One extra `amount` of `product` every `cycle` production cycles.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtraOutputData {
    pub product: String,
    pub amount: f64,
    pub cycle: u32,
}

/// A buff definition in a data file. Percentages are whole numbers.
#[derive(Debug, Clone, Deserialize)]
pub struct BuffData {
    pub name: String,
    pub guid: u32,
    #[serde(default)]
    pub productivity: f64,
    #[serde(default)]
    pub input_replacements: Vec<ReplacementData>,
    #[serde(default)]
    pub fuel_duration: f64,
    #[serde(default)]
    pub extra_outputs: Vec<ExtraOutputData>,
    #[serde(default)]
    pub workforce_replacement: Option<ReplacementData>,
    #[serde(default)]
    pub byproduct_multiplier: f64,
}

// ===========================================================================
// Forced suppliers
// ===========================================================================

/// Region-specific factory that must be preferred for a product.
#[derive(Debug, Clone, Deserialize)]
pub struct ForcedSupplierData {
    pub product: String,
    pub region: u32,
    pub factory: String,
}

// ===========================================================================
// TOML wrappers
// ===========================================================================

/// TOML files need a top-level table; lists live under a named key.
#[derive(Debug, Clone, Deserialize)]
pub struct TomlProducts {
    pub products: Vec<ProductData>,
}
