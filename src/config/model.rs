// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [supervisor]
/// grace_timeout = "10s"
/// stop_command = "stop"
///
/// [launch]
/// java = "/usr/lib/jvm/java-21/bin/java"
/// jvm_args = ["-Xmx4G"]
/// server_args = ["nogui"]
///
/// [download]
/// read_timeout = "30s"
/// ```
///
/// All sections are optional and have reasonable defaults. Durations are
/// strings understood by [`super::duration::parse_duration`].
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub supervisor: RawSupervisorSection,

    #[serde(default)]
    pub launch: LaunchConfig,

    #[serde(default)]
    pub download: RawDownloadSection,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub servers: ServersConfig,
}

/// `[supervisor]` section, before duration parsing.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSupervisorSection {
    #[serde(default = "default_grace_timeout")]
    pub grace_timeout: String,
    #[serde(default = "default_terminate_timeout")]
    pub terminate_timeout: String,
    #[serde(default = "default_kill_timeout")]
    pub kill_timeout: String,
    #[serde(default = "default_restart_settle")]
    pub restart_settle: String,
    /// In-band command written to stdin to request a graceful shutdown.
    #[serde(default = "default_stop_command")]
    pub stop_command: String,
    /// Capacity of the broadcast channel carrying process events.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_grace_timeout() -> String {
    "10s".to_string()
}

fn default_terminate_timeout() -> String {
    "5s".to_string()
}

fn default_kill_timeout() -> String {
    "5s".to_string()
}

fn default_restart_settle() -> String {
    "2s".to_string()
}

fn default_stop_command() -> String {
    "stop".to_string()
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for RawSupervisorSection {
    fn default() -> Self {
        Self {
            grace_timeout: default_grace_timeout(),
            terminate_timeout: default_terminate_timeout(),
            kill_timeout: default_kill_timeout(),
            restart_settle: default_restart_settle(),
            stop_command: default_stop_command(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// `[launch]` section: how a server directory turns into a command line.
#[derive(Debug, Clone, Deserialize)]
pub struct LaunchConfig {
    /// Java runtime used for core binaries.
    #[serde(default = "default_java")]
    pub java: String,
    /// Arguments placed before `-jar`.
    #[serde(default)]
    pub jvm_args: Vec<String>,
    /// Arguments placed after the core file.
    #[serde(default)]
    pub server_args: Vec<String>,
    /// Glob (relative to the server directory) selecting core binaries.
    #[serde(default = "default_core_glob")]
    pub core_glob: String,
    /// Start script names, checked in order, that take priority over a core.
    #[serde(default = "default_start_scripts")]
    pub start_scripts: Vec<String>,
}

fn default_java() -> String {
    "java".to_string()
}

fn default_core_glob() -> String {
    "*.jar".to_string()
}

fn default_start_scripts() -> Vec<String> {
    if cfg!(windows) {
        vec!["start.bat".to_string(), "start.cmd".to_string()]
    } else {
        vec!["start.sh".to_string()]
    }
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            java: default_java(),
            jvm_args: Vec::new(),
            server_args: Vec::new(),
            core_glob: default_core_glob(),
            start_scripts: default_start_scripts(),
        }
    }
}

/// `[download]` section, before duration parsing.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDownloadSection {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: String,
    #[serde(default = "default_read_timeout")]
    pub read_timeout: String,
    #[serde(default = "default_head_attempts")]
    pub head_attempts: u32,
    #[serde(default = "default_get_attempts")]
    pub get_attempts: u32,
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay: String,
    /// Lower bound of the progress throttle; the effective interval is
    /// `max(total / 100, this)`.
    #[serde(default = "default_min_progress_interval")]
    pub min_progress_interval: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_chunk_size() -> usize {
    8 * 1024
}

fn default_connect_timeout() -> String {
    "10s".to_string()
}

fn default_read_timeout() -> String {
    "30s".to_string()
}

fn default_head_attempts() -> u32 {
    2
}

fn default_get_attempts() -> u32 {
    3
}

fn default_retry_base_delay() -> String {
    "1s".to_string()
}

fn default_min_progress_interval() -> u64 {
    1024 * 1024
}

fn default_user_agent() -> String {
    concat!("warden/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for RawDownloadSection {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            connect_timeout: default_connect_timeout(),
            read_timeout: default_read_timeout(),
            head_attempts: default_head_attempts(),
            get_attempts: default_get_attempts(),
            retry_base_delay: default_retry_base_delay(),
            min_progress_interval: default_min_progress_interval(),
            user_agent: default_user_agent(),
        }
    }
}

/// `[catalog]` section: where core download URLs are resolved from.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_vanilla_manifest_url")]
    pub vanilla_manifest_url: String,
    #[serde(default = "default_paper_api_base")]
    pub paper_api_base: String,
    #[serde(default = "default_spigot_base")]
    pub spigot_base: String,
}

fn default_vanilla_manifest_url() -> String {
    "https://launchermeta.mojang.com/mc/game/version_manifest.json".to_string()
}

fn default_paper_api_base() -> String {
    "https://api.papermc.io/v2".to_string()
}

fn default_spigot_base() -> String {
    "https://download.cdn.getbukkit.org/spigot".to_string()
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            vanilla_manifest_url: default_vanilla_manifest_url(),
            paper_api_base: default_paper_api_base(),
            spigot_base: default_spigot_base(),
        }
    }
}

/// `[servers]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServersConfig {
    /// File holding the persisted list of managed server directories.
    #[serde(default = "default_list_path")]
    pub list_path: PathBuf,
}

fn default_list_path() -> PathBuf {
    PathBuf::from("warden-servers.toml")
}

impl Default for ServersConfig {
    fn default() -> Self {
        Self {
            list_path: default_list_path(),
        }
    }
}

/// Validated `[supervisor]` settings.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub grace_timeout: Duration,
    pub terminate_timeout: Duration,
    pub kill_timeout: Duration,
    pub restart_settle: Duration,
    pub stop_command: String,
    pub event_capacity: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            grace_timeout: Duration::from_secs(10),
            terminate_timeout: Duration::from_secs(5),
            kill_timeout: Duration::from_secs(5),
            restart_settle: Duration::from_secs(2),
            stop_command: default_stop_command(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// Validated `[download]` settings.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    pub chunk_size: usize,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub head_attempts: u32,
    pub get_attempts: u32,
    pub retry_base_delay: Duration,
    pub min_progress_interval: u64,
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            head_attempts: default_head_attempts(),
            get_attempts: default_get_attempts(),
            retry_base_delay: Duration::from_secs(1),
            min_progress_interval: default_min_progress_interval(),
            user_agent: default_user_agent(),
        }
    }
}

/// Validated configuration used by the rest of the crate.
///
/// Only obtainable through `TryFrom<RawConfigFile>` (see `validate.rs`) or
/// `Default`.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub supervisor: SupervisorConfig,
    pub launch: LaunchConfig,
    pub download: DownloadConfig,
    pub catalog: CatalogConfig,
    pub servers: ServersConfig,
}
