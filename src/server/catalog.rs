// src/server/catalog.rs

//! Where to download a given server core from.

use anyhow::Context;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::config::{CatalogConfig, DownloadConfig};
use crate::errors::{CatalogError, Result};
use crate::types::ServerKind;

/// Versions offered when listing vanilla releases.
const VANILLA_LISTED: usize = 20;
/// Versions offered when listing paper releases.
const PAPER_LISTED: usize = 10;
/// getbukkit has no index API; these are the builds it is known to host.
const SPIGOT_VERSIONS: &[&str] = &[
    "1.20.1", "1.19.4", "1.18.2", "1.17.1", "1.16.5", "1.15.2", "1.14.4",
];

#[derive(Debug, Deserialize)]
struct VersionManifest {
    versions: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct VersionDetail {
    downloads: VersionDownloads,
}

#[derive(Debug, Deserialize)]
struct VersionDownloads {
    server: Option<DownloadRef>,
}

#[derive(Debug, Deserialize)]
struct DownloadRef {
    url: String,
}

#[derive(Debug, Deserialize)]
struct PaperProject {
    versions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PaperBuilds {
    builds: Vec<PaperBuild>,
}

#[derive(Debug, Deserialize)]
struct PaperBuild {
    build: u64,
}

/// Resolves core download URLs against the Mojang, PaperMC and getbukkit
/// endpoints configured in `[catalog]`.
#[derive(Debug, Clone)]
pub struct CoreCatalog {
    client: Client,
    config: CatalogConfig,
}

impl CoreCatalog {
    pub fn new(config: CatalogConfig, download: &DownloadConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(download.connect_timeout)
            .timeout(download.read_timeout)
            .user_agent(download.user_agent.clone())
            .build()
            .context("building catalog HTTP client")?;
        Ok(Self { client, config })
    }

    /// Download URL of the `kind` core for `version`.
    pub async fn resolve(&self, kind: ServerKind, version: &str) -> std::result::Result<String, CatalogError> {
        let url = match kind {
            ServerKind::Vanilla => self.vanilla_url(version).await?,
            ServerKind::Paper => self.paper_url(version).await?,
            ServerKind::Spigot => self.spigot_url(version),
        };
        info!(kind = %kind, version, url = %url, "resolved core URL");
        Ok(url)
    }

    /// Recent versions of `kind`, oldest first.
    pub async fn list_versions(&self, kind: ServerKind) -> std::result::Result<Vec<String>, CatalogError> {
        match kind {
            ServerKind::Vanilla => {
                let manifest: VersionManifest = self.get_json(&self.config.vanilla_manifest_url).await?;
                let mut releases: Vec<String> = manifest
                    .versions
                    .into_iter()
                    .filter(|v| v.kind == "release")
                    .take(VANILLA_LISTED)
                    .map(|v| v.id)
                    .collect();
                // The manifest lists newest first.
                releases.reverse();
                Ok(releases)
            }
            ServerKind::Paper => {
                let url = format!("{}/projects/paper", self.paper_base());
                let project: PaperProject = self.get_json(&url).await?;
                let skip = project.versions.len().saturating_sub(PAPER_LISTED);
                Ok(project.versions.into_iter().skip(skip).collect())
            }
            ServerKind::Spigot => {
                let mut versions: Vec<String> =
                    SPIGOT_VERSIONS.iter().map(|v| v.to_string()).collect();
                versions.reverse();
                Ok(versions)
            }
        }
    }

    async fn vanilla_url(&self, version: &str) -> std::result::Result<String, CatalogError> {
        let manifest: VersionManifest = self.get_json(&self.config.vanilla_manifest_url).await?;
        let entry = manifest
            .versions
            .into_iter()
            .find(|v| v.id == version)
            .ok_or_else(|| unknown(ServerKind::Vanilla, version))?;

        let detail: VersionDetail = self.get_json(&entry.url).await?;
        detail
            .downloads
            .server
            .map(|s| s.url)
            .ok_or_else(|| unknown(ServerKind::Vanilla, version))
    }

    async fn paper_url(&self, version: &str) -> std::result::Result<String, CatalogError> {
        let base = self.paper_base();
        let builds_url = format!("{}/projects/paper/versions/{}/builds", base, version);
        let builds: PaperBuilds = match self.get_json(&builds_url).await {
            Ok(builds) => builds,
            Err(CatalogError::Status { status: 404, .. }) => {
                return Err(unknown(ServerKind::Paper, version));
            }
            Err(e) => return Err(e),
        };
        let latest = builds
            .builds
            .last()
            .ok_or_else(|| unknown(ServerKind::Paper, version))?;

        Ok(format!(
            "{base}/projects/paper/versions/{version}/builds/{build}/downloads/paper-{version}-{build}.jar",
            build = latest.build
        ))
    }

    fn spigot_url(&self, version: &str) -> String {
        format!(
            "{}/spigot-{}.jar",
            self.config.spigot_base.trim_end_matches('/'),
            version
        )
    }

    fn paper_base(&self) -> &str {
        self.config.paper_api_base.trim_end_matches('/')
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> std::result::Result<T, CatalogError> {
        debug!(url, "catalog request");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| CatalogError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.json::<T>().await.map_err(|source| CatalogError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

fn unknown(kind: ServerKind, version: &str) -> CatalogError {
    CatalogError::UnknownVersion {
        kind,
        version: version.to_string(),
    }
}

/// Last path segment of `url`, used as the core's file name on disk.
pub fn file_name_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .next_back()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_ignores_query_and_trailing_slash() {
        assert_eq!(
            file_name_from_url("https://x.test/v1/objects/abc/server.jar?sig=1").as_deref(),
            Some("server.jar")
        );
        assert_eq!(
            file_name_from_url("https://x.test/spigot-1.20.1.jar/").as_deref(),
            Some("spigot-1.20.1.jar")
        );
        assert_eq!(file_name_from_url("https://x.test/"), None);
        assert_eq!(file_name_from_url("not a url"), None);
    }

    #[test]
    fn spigot_url_is_built_from_base() {
        let download = DownloadConfig::default();
        let catalog = CoreCatalog::new(
            CatalogConfig {
                spigot_base: "https://cdn.test/spigot/".to_string(),
                ..CatalogConfig::default()
            },
            &download,
        )
        .unwrap();
        assert_eq!(catalog.spigot_url("1.20.1"), "https://cdn.test/spigot/spigot-1.20.1.jar");
    }
}
