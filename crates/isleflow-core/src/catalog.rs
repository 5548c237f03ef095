//! Read-only catalog of products, factories and buffs.
//!
//! Built once through [`CatalogBuilder`], validated at [`CatalogBuilder::build`],
//! then shared immutably (behind an `Arc`) by every session. Every lookup by
//! identifier fails fast with a [`CatalogError`]; nothing is substituted.

use std::collections::BTreeMap;

use crate::fixed::Fixed64;
use crate::id::{BuffId, FactoryId, ProductId, RegionId};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while building or querying the catalog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("unknown product {0:?}")]
    UnknownProduct(ProductId),
    #[error("unknown factory {0:?}")]
    UnknownFactory(FactoryId),
    #[error("unknown buff {0:?}")]
    UnknownBuff(BuffId),
    #[error("duplicate product {0:?}")]
    DuplicateProduct(ProductId),
    #[error("duplicate factory {0:?}")]
    DuplicateFactory(FactoryId),
    #[error("duplicate buff {0:?}")]
    DuplicateBuff(BuffId),
    #[error("factory {factory:?} references unknown product {product:?}")]
    FactoryProductRef {
        factory: FactoryId,
        product: ProductId,
    },
    #[error("factory {factory:?} references unknown buff {buff:?}")]
    FactoryBuffRef { factory: FactoryId, buff: BuffId },
    #[error("buff {buff:?} references unknown product {product:?}")]
    BuffProductRef { buff: BuffId, product: ProductId },
    #[error("factory {0:?} has a non-positive cycle time")]
    InvalidCycleTime(FactoryId),
    #[error("forced supplier {factory:?} does not produce {product:?}")]
    ForcedSupplierMismatch {
        product: ProductId,
        factory: FactoryId,
    },
}

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// A product (good, workforce, or other abstract quantity).
#[derive(Debug, Clone, PartialEq)]
pub struct ProductDef {
    pub id: ProductId,
    pub name: String,
    /// Abstract products (workforce, electricity) are tracked but never
    /// highlighted as missing.
    pub is_abstract: bool,
    pub is_construction_material: bool,
}

impl ProductDef {
    pub fn new(id: ProductId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            is_abstract: false,
            is_construction_material: false,
        }
    }

    pub fn abstract_product(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn construction_material(mut self) -> Self {
        self.is_construction_material = true;
        self
    }
}

/// An input consumed per production cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct InputDef {
    pub product: ProductId,
    pub amount: Fixed64,
    /// Fuel inputs last longer under fuel-duration buffs.
    pub fuel: bool,
}

/// The product and amount emitted per production cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputDef {
    pub product: ProductId,
    pub amount: Fixed64,
}

/// Workforce needed per running building.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkforceDef {
    pub product: ProductId,
    pub amount: Fixed64,
}

/// A factory template.
#[derive(Debug, Clone, PartialEq)]
pub struct FactoryDef {
    pub id: FactoryId,
    pub name: String,
    /// Seconds per production cycle at boost 1.
    pub cycle_time: Fixed64,
    pub inputs: Vec<InputDef>,
    pub output: OutputDef,
    pub workforce: Option<WorkforceDef>,
    /// Regions the factory can be built in. Empty means every region.
    pub regions: Vec<RegionId>,
    /// Buffs that can be applied to this factory.
    pub buffs: Vec<BuffId>,
}

impl FactoryDef {
    pub fn new(id: FactoryId, name: &str, cycle_time: Fixed64, output: OutputDef) -> Self {
        Self {
            id,
            name: name.to_string(),
            cycle_time,
            inputs: Vec::new(),
            output,
            workforce: None,
            regions: Vec::new(),
            buffs: Vec::new(),
        }
    }

    pub fn with_input(mut self, product: ProductId, amount: Fixed64) -> Self {
        self.inputs.push(InputDef {
            product,
            amount,
            fuel: false,
        });
        self
    }

    pub fn with_fuel(mut self, product: ProductId, amount: Fixed64) -> Self {
        self.inputs.push(InputDef {
            product,
            amount,
            fuel: true,
        });
        self
    }

    pub fn with_workforce(mut self, product: ProductId, amount: Fixed64) -> Self {
        self.workforce = Some(WorkforceDef { product, amount });
        self
    }

    pub fn in_regions(mut self, regions: Vec<RegionId>) -> Self {
        self.regions = regions;
        self
    }

    pub fn with_buff(mut self, buff: BuffId) -> Self {
        self.buffs.push(buff);
        self
    }

    pub fn available_in(&self, region: RegionId) -> bool {
        self.regions.is_empty() || self.regions.contains(&region)
    }
}

/// Substitutes one required product for another. `to: None` removes the
/// requirement entirely.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Replacement {
    pub from: ProductId,
    pub to: Option<ProductId>,
}

/// Extra output emitted every `cycle` production cycles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtraOutput {
    pub product: ProductId,
    pub amount: Fixed64,
    pub cycle: u32,
}

/// A static modifier definition.
#[derive(Debug, Clone, PartialEq)]
pub struct BuffDef {
    pub id: BuffId,
    pub name: String,
    /// Productivity bonus in percent (50 = +50%).
    pub productivity_upgrade: Fixed64,
    /// Applied in declaration order, after every buff with a lower id.
    pub input_replacements: Vec<Replacement>,
    pub fuel_duration_percent: Fixed64,
    pub extra_outputs: Vec<ExtraOutput>,
    pub workforce_replacement: Option<Replacement>,
    /// Multiplies self-effecting extra outputs (percent).
    pub byproduct_multiplier_percent: Fixed64,
}

impl BuffDef {
    pub fn new(id: BuffId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            productivity_upgrade: Fixed64::ZERO,
            input_replacements: Vec::new(),
            fuel_duration_percent: Fixed64::ZERO,
            extra_outputs: Vec::new(),
            workforce_replacement: None,
            byproduct_multiplier_percent: Fixed64::ZERO,
        }
    }

    pub fn productivity(mut self, percent: Fixed64) -> Self {
        self.productivity_upgrade = percent;
        self
    }

    pub fn replace_input(mut self, from: ProductId, to: Option<ProductId>) -> Self {
        self.input_replacements.push(Replacement { from, to });
        self
    }

    pub fn fuel_duration(mut self, percent: Fixed64) -> Self {
        self.fuel_duration_percent = percent;
        self
    }

    pub fn extra_output(mut self, product: ProductId, amount: Fixed64, cycle: u32) -> Self {
        self.extra_outputs.push(ExtraOutput {
            product,
            amount,
            cycle: cycle.max(1),
        });
        self
    }

    pub fn replace_workforce(mut self, from: ProductId, to: Option<ProductId>) -> Self {
        self.workforce_replacement = Some(Replacement { from, to });
        self
    }

    pub fn byproduct_multiplier(mut self, percent: Fixed64) -> Self {
        self.byproduct_multiplier_percent = percent;
        self
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for constructing an immutable [`Catalog`].
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    products: BTreeMap<ProductId, ProductDef>,
    factories: BTreeMap<FactoryId, FactoryDef>,
    buffs: BTreeMap<BuffId, BuffDef>,
    forced: BTreeMap<(ProductId, RegionId), FactoryId>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_product(&mut self, def: ProductDef) -> Result<ProductId, CatalogError> {
        let id = def.id;
        if self.products.contains_key(&id) {
            return Err(CatalogError::DuplicateProduct(id));
        }
        self.products.insert(id, def);
        Ok(id)
    }

    pub fn add_factory(&mut self, def: FactoryDef) -> Result<FactoryId, CatalogError> {
        let id = def.id;
        if self.factories.contains_key(&id) {
            return Err(CatalogError::DuplicateFactory(id));
        }
        self.factories.insert(id, def);
        Ok(id)
    }

    pub fn add_buff(&mut self, def: BuffDef) -> Result<BuffId, CatalogError> {
        let id = def.id;
        if self.buffs.contains_key(&id) {
            return Err(CatalogError::DuplicateBuff(id));
        }
        self.buffs.insert(id, def);
        Ok(id)
    }

    /// Declare the factory that must be preferred as default supplier for
    /// `product` on islands in `region`.
    pub fn force_supplier(&mut self, product: ProductId, region: RegionId, factory: FactoryId) {
        self.forced.insert((product, region), factory);
    }

    /// Mutate an existing factory in place.
    pub fn mutate_factory<F>(&mut self, id: FactoryId, f: F) -> Result<(), CatalogError>
    where
        F: FnOnce(&mut FactoryDef),
    {
        let def = self
            .factories
            .get_mut(&id)
            .ok_or(CatalogError::UnknownFactory(id))?;
        f(def);
        Ok(())
    }

    pub fn contains_product(&self, id: ProductId) -> bool {
        self.products.contains_key(&id)
    }

    /// Validate every cross reference and freeze the catalog.
    pub fn build(self) -> Result<Catalog, CatalogError> {
        for factory in self.factories.values() {
            if factory.cycle_time <= Fixed64::ZERO {
                return Err(CatalogError::InvalidCycleTime(factory.id));
            }
            let products = factory
                .inputs
                .iter()
                .map(|i| i.product)
                .chain(std::iter::once(factory.output.product))
                .chain(factory.workforce.iter().map(|w| w.product));
            for product in products {
                if !self.products.contains_key(&product) {
                    return Err(CatalogError::FactoryProductRef {
                        factory: factory.id,
                        product,
                    });
                }
            }
            for buff in &factory.buffs {
                if !self.buffs.contains_key(buff) {
                    return Err(CatalogError::FactoryBuffRef {
                        factory: factory.id,
                        buff: *buff,
                    });
                }
            }
        }

        for buff in self.buffs.values() {
            let replacements = buff
                .input_replacements
                .iter()
                .chain(buff.workforce_replacement.iter());
            let products = replacements
                .flat_map(|r| std::iter::once(r.from).chain(r.to))
                .chain(buff.extra_outputs.iter().map(|e| e.product));
            for product in products {
                if !self.products.contains_key(&product) {
                    return Err(CatalogError::BuffProductRef {
                        buff: buff.id,
                        product,
                    });
                }
            }
        }

        for (&(product, _region), &factory) in &self.forced {
            let def = self
                .factories
                .get(&factory)
                .ok_or(CatalogError::UnknownFactory(factory))?;
            if def.output.product != product {
                return Err(CatalogError::ForcedSupplierMismatch { product, factory });
            }
        }

        let mut producers: BTreeMap<ProductId, Vec<FactoryId>> = BTreeMap::new();
        for factory in self.factories.values() {
            producers
                .entry(factory.output.product)
                .or_default()
                .push(factory.id);
        }

        Ok(Catalog {
            products: self.products,
            factories: self.factories,
            buffs: self.buffs,
            forced: self.forced,
            producers,
        })
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Immutable catalog. Frozen after build().
#[derive(Debug, Clone)]
pub struct Catalog {
    products: BTreeMap<ProductId, ProductDef>,
    factories: BTreeMap<FactoryId, FactoryDef>,
    buffs: BTreeMap<BuffId, BuffDef>,
    forced: BTreeMap<(ProductId, RegionId), FactoryId>,
    producers: BTreeMap<ProductId, Vec<FactoryId>>,
}

impl Catalog {
    pub fn product(&self, id: ProductId) -> Result<&ProductDef, CatalogError> {
        self.products.get(&id).ok_or(CatalogError::UnknownProduct(id))
    }

    pub fn factory(&self, id: FactoryId) -> Result<&FactoryDef, CatalogError> {
        self.factories.get(&id).ok_or(CatalogError::UnknownFactory(id))
    }

    pub fn buff(&self, id: BuffId) -> Result<&BuffDef, CatalogError> {
        self.buffs.get(&id).ok_or(CatalogError::UnknownBuff(id))
    }

    /// Products in ascending id order.
    pub fn products(&self) -> impl Iterator<Item = &ProductDef> {
        self.products.values()
    }

    /// Factories in ascending id order.
    pub fn factories(&self) -> impl Iterator<Item = &FactoryDef> {
        self.factories.values()
    }

    pub fn buffs(&self) -> impl Iterator<Item = &BuffDef> {
        self.buffs.values()
    }

    /// Factories whose output is `product`, ascending by id.
    pub fn producers_of(&self, product: ProductId) -> &[FactoryId] {
        self.producers
            .get(&product)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn forced_supplier(&self, product: ProductId, region: RegionId) -> Option<FactoryId> {
        self.forced.get(&(product, region)).copied()
    }

    pub fn product_count(&self) -> usize {
        self.products.len()
    }

    pub fn factory_count(&self) -> usize {
        self.factories.len()
    }

    pub fn buff_count(&self) -> usize {
        self.buffs.len()
    }
}
