// src/server/metadata.rs

use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::Result;
use crate::fs::FileSystem;
use crate::types::ServerKind;

/// File written next to a provisioned core.
pub const METADATA_FILE: &str = "warden.json";

const CREATED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Description of a provisioned server directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMetadata {
    pub server_name: String,
    pub server_type: ServerKind,
    pub server_version: String,
    /// File name of the core inside the server directory.
    pub core_file: String,
    /// Local time, `YYYY-MM-DD HH:MM:SS`.
    pub created_time: String,
    pub path: PathBuf,
}

impl ServerMetadata {
    pub fn new(
        server_name: impl Into<String>,
        server_type: ServerKind,
        server_version: impl Into<String>,
        core_file: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            server_type,
            server_version: server_version.into(),
            core_file: core_file.into(),
            created_time: Local::now().format(CREATED_FORMAT).to_string(),
            path: path.into(),
        }
    }

    pub fn file_path(dir: &Path) -> PathBuf {
        dir.join(METADATA_FILE)
    }

    /// Write `warden.json` into `dir`, replacing any existing one atomically.
    pub fn write(&self, fs: &dyn FileSystem, dir: &Path) -> Result<()> {
        let path = Self::file_path(dir);
        let json = serde_json::to_string_pretty(self)?;
        fs.write_atomic(&path, json.as_bytes())?;
        debug!(path = ?path, "wrote server metadata");
        Ok(())
    }

    pub fn read(fs: &dyn FileSystem, dir: &Path) -> Result<Self> {
        let contents = fs.read_to_string(&Self::file_path(dir))?;
        Ok(serde_json::from_str(&contents)?)
    }
}
