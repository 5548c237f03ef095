//! Resolution pipeline: reads data files, resolves name references, builds
//! the catalog.
//!
//! A data directory holds `products`, `factories`, and optionally `buffs`,
//! `forced_suppliers` and `engine`, each as one of `.ron`, `.json` or
//! `.toml`. Products are loaded first, then buffs, then factories, so every
//! reference points backwards.

use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use isleflow_core::catalog::{
    BuffDef, Catalog, CatalogBuilder, CatalogError, FactoryDef, OutputDef, ProductDef,
};
use isleflow_core::config::EngineConfig;
use isleflow_core::fixed::f64_to_fixed64_lossy;
use isleflow_core::id::{BuffId, FactoryId, ProductId, RegionId};
use tracing::debug;

use crate::schema::*;

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// A required data file was not found in the given directory.
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: String, dir: PathBuf },

    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A name reference could not be resolved.
    #[error("unresolved {expected_kind} reference '{name}' in {file}")]
    UnresolvedRef {
        file: PathBuf,
        name: String,
        expected_kind: &'static str,
    },

    /// A duplicate name was found.
    #[error("duplicate name '{name}' in {file}")]
    DuplicateName { file: PathBuf, name: String },

    /// The resolved definitions were rejected by the catalog.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Scan a directory for a data file with the given base name.
///
/// Returns `Ok(None)` if no file is found, or `Err(ConflictingFormats)` if
/// more than one format exists for the same base name.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found: Option<PathBuf> = None;
    for ext in ["ron", "toml", "json"] {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if !candidate.exists() {
            continue;
        }
        if let Some(existing) = found {
            return Err(DataLoadError::ConflictingFormats {
                a: existing,
                b: candidate,
            });
        }
        found = Some(candidate);
    }
    Ok(found)
}

/// Like [`find_data_file`], but a missing file is an error.
pub fn require_data_file(dir: &Path, base_name: &str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, base_name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base_name.to_string(),
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Deserialization
// ===========================================================================

fn parse_error(path: &Path, detail: impl ToString) -> DataLoadError {
    DataLoadError::Parse {
        file: path.to_path_buf(),
        detail: detail.to_string(),
    }
}

/// Read a file and deserialize it according to its format.
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Toml => toml::from_str(&content).map_err(|e| parse_error(path, e)),
    }
}

/// Deserialize a list from a file. TOML files hold the array under
/// `toml_key` in a top-level table; RON and JSON hold a bare list.
pub fn deserialize_list<T: DeserializeOwned>(
    path: &Path,
    toml_key: &str,
) -> Result<Vec<T>, DataLoadError> {
    if detect_format(path)? != Format::Toml {
        return deserialize_file(path);
    }
    let content = std::fs::read_to_string(path)?;
    let mut table: toml::Table = toml::from_str(&content).map_err(|e| parse_error(path, e))?;
    let array = table
        .remove(toml_key)
        .ok_or_else(|| parse_error(path, format!("missing key '{toml_key}' in TOML file")))?;
    array
        .try_into()
        .map_err(|e: toml::de::Error| parse_error(path, e))
}

// ===========================================================================
// Name resolution helpers
// ===========================================================================

/// Look up a name, returning an `UnresolvedRef` error if not found.
pub fn resolve_name<V: Copy>(
    map: &HashMap<String, V>,
    name: &str,
    file: &Path,
    expected_kind: &'static str,
) -> Result<V, DataLoadError> {
    map.get(name)
        .copied()
        .ok_or_else(|| DataLoadError::UnresolvedRef {
            file: file.to_path_buf(),
            name: name.to_string(),
            expected_kind,
        })
}

/// Fail with `DuplicateName` if `name` is already registered.
pub fn check_duplicate<V>(
    map: &HashMap<String, V>,
    name: &str,
    file: &Path,
) -> Result<(), DataLoadError> {
    if map.contains_key(name) {
        Err(DataLoadError::DuplicateName {
            file: file.to_path_buf(),
            name: name.to_string(),
        })
    } else {
        Ok(())
    }
}

// ===========================================================================
// Catalog pipeline
// ===========================================================================

/// Everything loaded from one data directory.
#[derive(Debug)]
pub struct IsleData {
    pub catalog: Catalog,
    pub config: EngineConfig,
}

/// Load the catalog and engine configuration from `dir`.
pub fn load_isle_data(dir: &Path) -> Result<IsleData, DataLoadError> {
    Ok(IsleData {
        catalog: load_catalog(dir)?,
        config: load_config(dir)?,
    })
}

/// Load engine configuration from the optional `engine` file. Missing
/// fields and a missing file fall back to defaults.
pub fn load_config(dir: &Path) -> Result<EngineConfig, DataLoadError> {
    match find_data_file(dir, "engine")? {
        Some(path) => deserialize_file(&path),
        None => Ok(EngineConfig::default()),
    }
}

/// Load and resolve a catalog from `dir`.
pub fn load_catalog(dir: &Path) -> Result<Catalog, DataLoadError> {
    let mut builder = CatalogBuilder::new();

    // Phase 1: products
    let products_path = require_data_file(dir, "products")?;
    let products: Vec<ProductData> = deserialize_list(&products_path, "products")?;
    let mut product_names: HashMap<String, ProductId> = HashMap::new();
    for p in &products {
        check_duplicate(&product_names, &p.name, &products_path)?;
        let mut def = ProductDef::new(ProductId(p.guid), &p.name);
        def.is_abstract = p.is_abstract;
        def.is_construction_material = p.construction_material;
        builder.add_product(def)?;
        product_names.insert(p.name.clone(), ProductId(p.guid));
    }

    // Phase 2: buffs
    let mut buff_names: HashMap<String, BuffId> = HashMap::new();
    if let Some(path) = find_data_file(dir, "buffs")? {
        let buffs: Vec<BuffData> = deserialize_list(&path, "buffs")?;
        for b in &buffs {
            check_duplicate(&buff_names, &b.name, &path)?;
            builder.add_buff(resolve_buff(b, &product_names, &path)?)?;
            buff_names.insert(b.name.clone(), BuffId(b.guid));
        }
    }

    // Phase 3: factories
    let factories_path = require_data_file(dir, "factories")?;
    let factories: Vec<FactoryData> = deserialize_list(&factories_path, "factories")?;
    let mut factory_names: HashMap<String, FactoryId> = HashMap::new();
    for f in &factories {
        check_duplicate(&factory_names, &f.name, &factories_path)?;
        let def = resolve_factory(f, &product_names, &buff_names, &factories_path)?;
        builder.add_factory(def)?;
        factory_names.insert(f.name.clone(), FactoryId(f.guid));
    }

    // Phase 4: forced suppliers
    if let Some(path) = find_data_file(dir, "forced_suppliers")? {
        let forced: Vec<ForcedSupplierData> = deserialize_list(&path, "forced_suppliers")?;
        for entry in &forced {
            let product = resolve_name(&product_names, &entry.product, &path, "product")?;
            let factory = resolve_name(&factory_names, &entry.factory, &path, "factory")?;
            builder.force_supplier(product, RegionId(entry.region), factory);
        }
    }

    let catalog = builder.build()?;
    debug!(
        dir = %dir.display(),
        products = catalog.product_count(),
        factories = catalog.factory_count(),
        buffs = catalog.buff_count(),
        "catalog loaded"
    );
    Ok(catalog)
}

fn resolve_replacement(
    r: &ReplacementData,
    products: &HashMap<String, ProductId>,
    path: &Path,
) -> Result<(ProductId, Option<ProductId>), DataLoadError> {
    let from = resolve_name(products, &r.from, path, "product")?;
    let to = r
        .to
        .as_deref()
        .map(|name| resolve_name(products, name, path, "product"))
        .transpose()?;
    Ok((from, to))
}

fn resolve_buff(
    b: &BuffData,
    products: &HashMap<String, ProductId>,
    path: &Path,
) -> Result<BuffDef, DataLoadError> {
    let mut def = BuffDef::new(BuffId(b.guid), &b.name)
        .productivity(f64_to_fixed64_lossy(b.productivity))
        .fuel_duration(f64_to_fixed64_lossy(b.fuel_duration))
        .byproduct_multiplier(f64_to_fixed64_lossy(b.byproduct_multiplier));
    for r in &b.input_replacements {
        let (from, to) = resolve_replacement(r, products, path)?;
        def = def.replace_input(from, to);
    }
    for e in &b.extra_outputs {
        let product = resolve_name(products, &e.product, path, "product")?;
        def = def.extra_output(product, f64_to_fixed64_lossy(e.amount), e.cycle);
    }
    if let Some(r) = &b.workforce_replacement {
        let (from, to) = resolve_replacement(r, products, path)?;
        def = def.replace_workforce(from, to);
    }
    Ok(def)
}

fn resolve_factory(
    f: &FactoryData,
    products: &HashMap<String, ProductId>,
    buffs: &HashMap<String, BuffId>,
    path: &Path,
) -> Result<FactoryDef, DataLoadError> {
    let output = OutputDef {
        product: resolve_name(products, f.output.product(), path, "product")?,
        amount: f64_to_fixed64_lossy(f.output.amount()),
    };
    let mut def = FactoryDef::new(
        FactoryId(f.guid),
        &f.name,
        f64_to_fixed64_lossy(f.cycle_time),
        output,
    );
    for input in &f.inputs {
        let product = resolve_name(products, input.product(), path, "product")?;
        let amount = f64_to_fixed64_lossy(input.amount());
        def = if input.is_fuel() {
            def.with_fuel(product, amount)
        } else {
            def.with_input(product, amount)
        };
    }
    if let Some(w) = &f.workforce {
        let product = resolve_name(products, w.product(), path, "product")?;
        def = def.with_workforce(product, f64_to_fixed64_lossy(w.amount()));
    }
    def = def.in_regions(f.regions.iter().copied().map(RegionId).collect());
    for name in &f.buffs {
        def = def.with_buff(resolve_name(buffs, name, path, "buff")?);
    }
    Ok(def)
}

// ===========================================================================
// Tests
// ===========================================================================
