// src/server/list.rs

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::Result;
use crate::fs::FileSystem;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ServerListFile {
    #[serde(default)]
    server: Vec<ServerEntry>,
}

/// Persisted list of managed server directories.
///
/// Stored as TOML (`[[server]]` tables) and always rewritten through a
/// temporary file and rename.
#[derive(Debug, Clone)]
pub struct ServerList {
    path: PathBuf,
    entries: Vec<ServerEntry>,
}

impl ServerList {
    /// Load the list at `path`; a missing file is an empty list.
    pub fn load(fs: &dyn FileSystem, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !fs.exists(&path) {
            debug!(path = ?path, "no server list yet");
            return Ok(Self {
                path,
                entries: Vec::new(),
            });
        }

        let contents = fs.read_to_string(&path)?;
        let file: ServerListFile = toml::from_str(&contents)?;
        Ok(Self {
            path,
            entries: file.server,
        })
    }

    pub fn save(&self, fs: &dyn FileSystem) -> Result<()> {
        let file = ServerListFile {
            server: self.entries.clone(),
        };
        let contents = toml::to_string(&file)?;
        fs.write_atomic(&self.path, contents.as_bytes())?;
        info!(path = ?self.path, count = self.entries.len(), "saved server list");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[ServerEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&ServerEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Add an entry. Returns false if the name is already taken.
    pub fn add(&mut self, entry: ServerEntry) -> bool {
        if self.get(&entry.name).is_some() {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn remove(&mut self, name: &str) -> Option<ServerEntry> {
        let idx = self.entries.iter().position(|e| e.name == name)?;
        Some(self.entries.remove(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::RealFileSystem;
    use crate::fs::mock::MockFileSystem;

    fn entry(name: &str) -> ServerEntry {
        ServerEntry {
            name: name.to_string(),
            path: PathBuf::from(format!("/srv/{}", name)),
        }
    }

    #[test]
    fn missing_file_is_empty_list() {
        let fs = MockFileSystem::new();
        let list = ServerList::load(&fs, "/etc/warden/servers.toml").unwrap();
        assert!(list.entries().is_empty());
    }

    #[test]
    fn names_are_unique() {
        let fs = MockFileSystem::new();
        let mut list = ServerList::load(&fs, "servers.toml").unwrap();
        assert!(list.add(entry("lobby")));
        assert!(!list.add(entry("lobby")));
        assert_eq!(list.entries().len(), 1);
        assert_eq!(list.remove("lobby"), Some(entry("lobby")));
        assert_eq!(list.remove("lobby"), None);
    }

    #[test]
    fn saves_and_reloads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servers.toml");
        let fs = RealFileSystem;

        let mut list = ServerList::load(&fs, &path).unwrap();
        list.add(entry("lobby"));
        list.add(entry("survival"));
        list.save(&fs).unwrap();

        let reloaded = ServerList::load(&fs, &path).unwrap();
        assert_eq!(reloaded.entries(), &[entry("lobby"), entry("survival")]);
        assert!(!crate::fs::tmp_sibling(&path).exists());
    }
}
