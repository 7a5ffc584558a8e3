// src/config/mod.rs

//! Configuration loading and validation for warden.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Parse durations and check value ranges (`validate.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{load_and_validate, load_from_path, load_or_default};
pub use model::{
    CatalogConfig, ConfigFile, DownloadConfig, LaunchConfig, RawConfigFile, ServersConfig,
    SupervisorConfig,
};
