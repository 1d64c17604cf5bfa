// src/config/mod.rs

//! Build description loading and validation.
//!
//! - `model.rs` defines the TOML-backed data model.
//! - `loader.rs` reads a description from disk.
//! - `validate.rs` turns a `RawConfigFile` into a validated `ConfigFile`.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{config_root_dir, default_config_path, load_and_validate, load_from_path};
pub use model::{
    ConfigFile, ConfigSection, NodeConfig, NodeKindConfig, RawConfigFile, ScannerConfig,
};
pub use validate::{topological_order, validate_raw_config};
