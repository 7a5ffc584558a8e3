#![allow(dead_code)]

use warden::config::{ConfigFile, RawConfigFile};

/// Builder for `ConfigFile` to simplify test setup.
///
/// Values go through the same raw -> validated conversion as a real
/// `Warden.toml`, so durations are written as strings (`"200ms"`).
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    /// Short stop/settle timeouts suitable for tests that spawn processes.
    pub fn fast_supervisor() -> Self {
        Self::new()
            .grace_timeout("2s")
            .terminate_timeout("1s")
            .kill_timeout("2s")
            .restart_settle("50ms")
    }

    pub fn grace_timeout(mut self, val: &str) -> Self {
        self.config.supervisor.grace_timeout = val.to_string();
        self
    }

    pub fn terminate_timeout(mut self, val: &str) -> Self {
        self.config.supervisor.terminate_timeout = val.to_string();
        self
    }

    pub fn kill_timeout(mut self, val: &str) -> Self {
        self.config.supervisor.kill_timeout = val.to_string();
        self
    }

    pub fn restart_settle(mut self, val: &str) -> Self {
        self.config.supervisor.restart_settle = val.to_string();
        self
    }

    pub fn java(mut self, program: &str) -> Self {
        self.config.launch.java = program.to_string();
        self
    }

    pub fn server_arg(mut self, arg: &str) -> Self {
        self.config.launch.server_args.push(arg.to_string());
        self
    }

    pub fn start_scripts(mut self, names: &[&str]) -> Self {
        self.config.launch.start_scripts = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn read_timeout(mut self, val: &str) -> Self {
        self.config.download.read_timeout = val.to_string();
        self
    }

    pub fn retry_base_delay(mut self, val: &str) -> Self {
        self.config.download.retry_base_delay = val.to_string();
        self
    }

    pub fn get_attempts(mut self, n: u32) -> Self {
        self.config.download.get_attempts = n;
        self
    }

    pub fn min_progress_interval(mut self, bytes: u64) -> Self {
        self.config.download.min_progress_interval = bytes;
        self
    }

    /// Point every catalog endpoint at a mock server.
    pub fn catalog_base(mut self, base: &str) -> Self {
        self.config.catalog.vanilla_manifest_url = format!("{}/mc/game/version_manifest.json", base);
        self.config.catalog.paper_api_base = format!("{}/v2", base);
        self.config.catalog.spigot_base = format!("{}/spigot", base);
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
