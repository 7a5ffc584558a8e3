// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** parse durations
/// or check value ranges. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and run validation.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Load the config the CLI asked for.
///
/// An explicitly given path must exist. The default path is optional: when
/// `Warden.toml` is absent, built-in defaults are used.
pub fn load_or_default(path: Option<&Path>) -> Result<ConfigFile> {
    match path {
        Some(p) => load_and_validate(p),
        None => {
            let default = default_config_path();
            if default.is_file() {
                load_and_validate(&default)
            } else {
                debug!(path = ?default, "no config file found; using defaults");
                ConfigFile::try_from(RawConfigFile::default())
            }
        }
    }
}

/// Default config location: `Warden.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Warden.toml")
}
