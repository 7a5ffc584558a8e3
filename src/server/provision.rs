// src/server/provision.rs

//! Creating a new server directory: resolve, download, verify, describe.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::LaunchConfig;
use crate::download::{DownloadManager, DownloadProgress, accept_core_file};
use crate::errors::{Result, WardenError};
use crate::fs::FileSystem;
use crate::server::catalog::{CoreCatalog, file_name_from_url};
use crate::server::metadata::ServerMetadata;
use crate::types::ServerKind;

/// Placeholder replaced with the core file name in start script templates.
pub const CORE_NAME_PLACEHOLDER: &str = "{core_name}";

#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub name: String,
    pub kind: ServerKind,
    pub version: String,
    /// The server directory is `<parent_dir>/<name>`.
    pub parent_dir: PathBuf,
    /// Optional start script body; `{core_name}` is substituted.
    pub start_script: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProvisionedServer {
    pub dir: PathBuf,
    pub core_path: PathBuf,
    pub script_path: Option<PathBuf>,
    pub metadata: ServerMetadata,
}

/// Runs the provisioning sequence against the given collaborators.
#[derive(Debug)]
pub struct Provisioner<'a> {
    pub catalog: &'a CoreCatalog,
    pub downloads: &'a DownloadManager,
    pub fs: &'a dyn FileSystem,
    pub launch: &'a LaunchConfig,
}

impl Provisioner<'_> {
    pub async fn provision<P>(&self, request: &ProvisionRequest, on_progress: P) -> Result<ProvisionedServer>
    where
        P: Fn(DownloadProgress) + Send + Sync + 'static,
    {
        let dir = request.parent_dir.join(&request.name);
        let url = self.catalog.resolve(request.kind, &request.version).await?;
        let core_name = file_name_from_url(&url).ok_or_else(|| {
            WardenError::ConfigError(format!("cannot derive a file name from {}", url))
        })?;
        let core_path = dir.join(&core_name);

        info!(server = %request.name, url = %url, dest = ?core_path, "provisioning server");
        self.downloads.download(&url, &core_path, on_progress).await?;
        accept_core_file(self.fs, &core_path)?;

        // A core without its metadata is not a provisioned server.
        let (script_path, metadata) = match self.write_server_files(request, &dir, &core_name) {
            Ok(files) => files,
            Err(err) => {
                warn!(server = %request.name, error = %err, "discarding downloaded core");
                if let Err(e) = self.fs.remove_file(&core_path) {
                    warn!(path = ?core_path, error = %e, "failed to remove core");
                }
                return Err(err);
            }
        };

        info!(server = %request.name, dir = ?dir, "server provisioned");
        Ok(ProvisionedServer {
            dir,
            core_path,
            script_path,
            metadata,
        })
    }

    /// Start script (if requested) then `warden.json`. A script written
    /// before a metadata failure is removed again.
    fn write_server_files(
        &self,
        request: &ProvisionRequest,
        dir: &Path,
        core_name: &str,
    ) -> Result<(Option<PathBuf>, ServerMetadata)> {
        let script_path = match &request.start_script {
            Some(template) => Some(self.write_start_script(dir, template, core_name)?),
            None => None,
        };

        let metadata = ServerMetadata::new(
            &request.name,
            request.kind,
            &request.version,
            core_name,
            dir,
        );
        if let Err(err) = metadata.write(self.fs, dir) {
            if let Some(script) = &script_path {
                let _ = self.fs.remove_file(script);
            }
            return Err(err);
        }
        Ok((script_path, metadata))
    }

    fn write_start_script(&self, dir: &Path, template: &str, core_name: &str) -> Result<PathBuf> {
        let script_name = self.launch.start_scripts.first().ok_or_else(|| {
            WardenError::ConfigError("[launch].start_scripts is empty; cannot write a start script".to_string())
        })?;
        let path = dir.join(script_name);
        let body = render_start_script(template, core_name);
        self.fs.write(&path, body.as_bytes())?;
        Ok(path)
    }
}

/// Substitute the core file name into a start script template.
pub fn render_start_script(template: &str, core_name: &str) -> String {
    let mut body = template.replace(CORE_NAME_PLACEHOLDER, core_name);
    if !body.ends_with('\n') {
        body.push('\n');
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_gets_core_name() {
        let body = render_start_script("java -Xmx2G -jar {core_name} nogui", "paper-1.20.1-196.jar");
        assert_eq!(body, "java -Xmx2G -jar paper-1.20.1-196.jar nogui\n");
    }
}
