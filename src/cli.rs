// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::types::ServerKind;

/// Command-line arguments for `warden`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "warden",
    version,
    about = "Download, verify and supervise game server processes.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Warden.toml` in the current working directory, if present.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `WARDEN_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Download a file with resume and retry. Ctrl-C cancels.
    Download {
        url: String,
        /// Destination file path.
        dest: PathBuf,
    },

    /// Check that a file looks like a server core (zip, >= 1 KiB).
    Check {
        file: PathBuf,
        /// Delete the file if it is rejected.
        #[arg(long)]
        discard: bool,
    },

    /// Print the download URL of a server core.
    CoreUrl {
        #[arg(value_enum)]
        kind: ServerKind,
        version: String,
    },

    /// List recent versions of a server core.
    Versions {
        #[arg(value_enum)]
        kind: ServerKind,
    },

    /// Create a server directory: download and verify the core, write
    /// `warden.json`, optionally write a start script.
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, value_enum, default_value_t = ServerKind::Paper)]
        kind: ServerKind,
        #[arg(long)]
        version: String,
        /// Directory the server directory is created in.
        #[arg(long, value_name = "DIR", default_value = ".")]
        parent_dir: PathBuf,
        /// Start script template; `{core_name}` is replaced with the core file.
        #[arg(long, value_name = "TEMPLATE", conflicts_with = "script_file")]
        script: Option<String>,
        /// Read the start script template from a file.
        #[arg(long, value_name = "PATH")]
        script_file: Option<PathBuf>,
        /// Do not add the new server to the server list.
        #[arg(long)]
        no_register: bool,
    },

    /// Run a server in the foreground. Lines typed on stdin are sent as
    /// console commands; Ctrl-C stops the server gracefully.
    Run {
        /// Server directory, or the name of an entry in the server list.
        server: String,
        /// Print CPU and memory usage of the server every SECS seconds.
        #[arg(long, value_name = "SECS")]
        stats: Option<u64>,
    },

    /// Manage the server list.
    Servers {
        #[command(subcommand)]
        action: ServersAction,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum ServersAction {
    List,
    Add { name: String, path: PathBuf },
    Remove { name: String },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
