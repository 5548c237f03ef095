//! Isleflow Data -- loads catalogs and engine configuration from RON, JSON
//! or TOML data files, and provides a JSON file-backed key-value store for
//! session persistence.

pub mod loader;
pub mod schema;
pub mod store;

pub use loader::{DataLoadError, IsleData, load_catalog, load_config, load_isle_data};
pub use store::{FileStore, StoreError};
