// src/config/validate.rs

use std::time::Duration;

use globset::Glob;

use crate::config::duration::parse_duration;
use crate::config::model::{
    ConfigFile, DownloadConfig, RawConfigFile, RawDownloadSection, RawSupervisorSection,
    SupervisorConfig,
};
use crate::errors::{Result, WardenError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::WardenError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let supervisor = validate_supervisor(&raw.supervisor)?;
        let download = validate_download(&raw.download)?;
        validate_launch(&raw)?;
        validate_catalog(&raw)?;

        Ok(ConfigFile {
            supervisor,
            launch: raw.launch,
            download,
            catalog: raw.catalog,
            servers: raw.servers,
        })
    }
}

fn duration_field(section: &str, key: &str, value: &str) -> Result<Duration> {
    parse_duration(value)
        .map_err(|e| WardenError::ConfigError(format!("[{}].{}: {}", section, key, e)))
}

fn positive_duration(section: &str, key: &str, value: &str) -> Result<Duration> {
    let d = duration_field(section, key, value)?;
    if d.is_zero() {
        return Err(WardenError::ConfigError(format!(
            "[{}].{} must be greater than zero (got {:?})",
            section, key, value
        )));
    }
    Ok(d)
}

fn validate_supervisor(raw: &RawSupervisorSection) -> Result<SupervisorConfig> {
    if raw.stop_command.trim().is_empty() {
        return Err(WardenError::ConfigError(
            "[supervisor].stop_command must not be empty".to_string(),
        ));
    }
    if raw.event_capacity == 0 {
        return Err(WardenError::ConfigError(
            "[supervisor].event_capacity must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(SupervisorConfig {
        grace_timeout: positive_duration("supervisor", "grace_timeout", &raw.grace_timeout)?,
        terminate_timeout: positive_duration(
            "supervisor",
            "terminate_timeout",
            &raw.terminate_timeout,
        )?,
        kill_timeout: positive_duration("supervisor", "kill_timeout", &raw.kill_timeout)?,
        // A zero settle delay is allowed.
        restart_settle: duration_field("supervisor", "restart_settle", &raw.restart_settle)?,
        stop_command: raw.stop_command.trim().to_string(),
        event_capacity: raw.event_capacity,
    })
}

fn validate_download(raw: &RawDownloadSection) -> Result<DownloadConfig> {
    if raw.chunk_size == 0 {
        return Err(WardenError::ConfigError(
            "[download].chunk_size must be >= 1 (got 0)".to_string(),
        ));
    }
    if raw.head_attempts == 0 || raw.get_attempts == 0 {
        return Err(WardenError::ConfigError(format!(
            "[download] attempts must be >= 1 (head_attempts = {}, get_attempts = {})",
            raw.head_attempts, raw.get_attempts
        )));
    }

    Ok(DownloadConfig {
        chunk_size: raw.chunk_size,
        connect_timeout: positive_duration("download", "connect_timeout", &raw.connect_timeout)?,
        read_timeout: positive_duration("download", "read_timeout", &raw.read_timeout)?,
        head_attempts: raw.head_attempts,
        get_attempts: raw.get_attempts,
        retry_base_delay: duration_field("download", "retry_base_delay", &raw.retry_base_delay)?,
        min_progress_interval: raw.min_progress_interval.max(1),
        user_agent: raw.user_agent.clone(),
    })
}

fn validate_launch(raw: &RawConfigFile) -> Result<()> {
    if raw.launch.java.trim().is_empty() {
        return Err(WardenError::ConfigError(
            "[launch].java must not be empty".to_string(),
        ));
    }
    Glob::new(&raw.launch.core_glob).map_err(|e| {
        WardenError::ConfigError(format!(
            "[launch].core_glob '{}' is not a valid glob: {}",
            raw.launch.core_glob, e
        ))
    })?;
    for script in raw.launch.start_scripts.iter() {
        if script.contains('/') || script.contains('\\') {
            return Err(WardenError::ConfigError(format!(
                "[launch].start_scripts entry '{}' must be a bare file name",
                script
            )));
        }
    }
    Ok(())
}

fn validate_catalog(raw: &RawConfigFile) -> Result<()> {
    let urls = [
        ("vanilla_manifest_url", &raw.catalog.vanilla_manifest_url),
        ("paper_api_base", &raw.catalog.paper_api_base),
        ("spigot_base", &raw.catalog.spigot_base),
    ];
    for (key, url) in urls {
        if reqwest::Url::parse(url).is_err() {
            return Err(WardenError::ConfigError(format!(
                "[catalog].{} is not a valid URL: '{}'",
                key, url
            )));
        }
    }
    Ok(())
}
