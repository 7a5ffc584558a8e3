// src/logging.rs

//! Logging setup for `warden` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `WARDEN_LOG` environment variable: a level ("info", "debug") or a full
//!    filter directive ("warden::download=debug,info")
//! 3. default to `info`
//!
//! Logs are sent to STDERR so that stdout carries only server console output.

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

pub const LOG_ENV: &str = "WARDEN_LOG";

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = match cli_level {
        Some(lvl) => EnvFilter::new(directive(level_from_log_level(lvl))),
        None => filter_from_env(std::env::var(LOG_ENV).ok().as_deref()),
    };

    // Send logs to stderr; keep stdout free for server output.
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

fn filter_from_env(value: Option<&str>) -> EnvFilter {
    let default = || EnvFilter::new(directive(tracing::Level::INFO));
    match value {
        None => default(),
        Some(s) => match parse_level_str(s) {
            Some(level) => EnvFilter::new(directive(level)),
            None => EnvFilter::try_new(s.trim()).unwrap_or_else(|_| default()),
        },
    }
}

fn directive(level: tracing::Level) -> String {
    level.as_str().to_lowercase()
}

fn level_from_log_level(lvl: LogLevel) -> tracing::Level {
    match lvl {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
    }
}

fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_are_case_insensitive() {
        assert_eq!(parse_level_str(" WARNING "), Some(tracing::Level::WARN));
        assert_eq!(parse_level_str("Debug"), Some(tracing::Level::DEBUG));
        assert_eq!(parse_level_str("loud"), None);
    }

    #[test]
    fn cli_levels_become_lowercase_directives() {
        assert_eq!(directive(level_from_log_level(LogLevel::Trace)), "trace");
        assert_eq!(directive(tracing::Level::INFO), "info");
    }
}
