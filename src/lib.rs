// src/lib.rs

pub mod cli;
pub mod config;
pub mod download;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod process;
pub mod retry;
pub mod server;
pub mod types;

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::{CliArgs, Command, ServersAction};
use crate::config::{ConfigFile, LaunchConfig};
use crate::download::{DownloadManager, DownloadProgress, accept_core_file, validate_core_file};
use crate::fs::{FileSystem, RealFileSystem};
use crate::process::{ProcessEvent, ProcessSupervisor, resolve_launch};
use crate::server::{CoreCatalog, ProvisionRequest, Provisioner, ServerEntry, ServerList};
use crate::types::ServerKind;

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = config::load_or_default(args.config.as_deref())?;
    debug!(command = ?args.command, "dispatching");

    match args.command {
        Command::Download { url, dest } => download(&cfg, &url, &dest).await,
        Command::Check { file, discard } => check(&file, discard),
        Command::CoreUrl { kind, version } => core_url(&cfg, kind, &version).await,
        Command::Versions { kind } => versions(&cfg, kind).await,
        Command::Create {
            name,
            kind,
            version,
            parent_dir,
            script,
            script_file,
            no_register,
        } => {
            let start_script = match (script, script_file) {
                (Some(s), _) => Some(s),
                (None, Some(path)) => Some(
                    std::fs::read_to_string(&path)
                        .with_context(|| format!("reading script template {:?}", path))?,
                ),
                (None, None) => None,
            };
            let request = ProvisionRequest {
                name,
                kind,
                version,
                parent_dir,
                start_script,
            };
            create(&cfg, request, !no_register).await
        }
        Command::Run { server, stats } => {
            let stats = stats.map(|secs| Duration::from_secs(secs.max(1)));
            run_server(&cfg, &server, stats).await
        }
        Command::Servers { action } => servers(&cfg, action),
    }
}

fn print_progress(progress: DownloadProgress) {
    let mib = |b: u64| b as f64 / (1024.0 * 1024.0);
    match progress.percent() {
        Some(pct) => println!(
            "  {:.1} MiB / {:.1} MiB ({:.1}%)",
            mib(progress.bytes_downloaded),
            mib(progress.bytes_total),
            pct
        ),
        None => println!("  {:.1} MiB", mib(progress.bytes_downloaded)),
    }
}

/// Cancel `url` on Ctrl-C.
fn cancel_on_ctrl_c(manager: &DownloadManager, url: &str) {
    let manager = manager.clone();
    let url = url.to_string();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(url = %url, "Ctrl-C received; cancelling download");
            manager.cancel_download(&url);
        }
    });
}

async fn download(cfg: &ConfigFile, url: &str, dest: &Path) -> Result<()> {
    let manager = DownloadManager::new(cfg.download.clone())?;
    cancel_on_ctrl_c(&manager, url);

    let path = manager.download(url, dest, print_progress).await?;
    println!("saved {}", path.display());
    Ok(())
}

fn check(file: &Path, discard: bool) -> Result<()> {
    let fs = RealFileSystem;
    if discard {
        accept_core_file(&fs, file)?;
    } else {
        validate_core_file(&fs, file)?;
    }
    println!("{} looks like a valid server core", file.display());
    Ok(())
}

async fn core_url(cfg: &ConfigFile, kind: ServerKind, version: &str) -> Result<()> {
    let catalog = CoreCatalog::new(cfg.catalog.clone(), &cfg.download)?;
    println!("{}", catalog.resolve(kind, version).await?);
    Ok(())
}

async fn versions(cfg: &ConfigFile, kind: ServerKind) -> Result<()> {
    let catalog = CoreCatalog::new(cfg.catalog.clone(), &cfg.download)?;
    for version in catalog.list_versions(kind).await? {
        println!("{version}");
    }
    Ok(())
}

async fn create(cfg: &ConfigFile, request: ProvisionRequest, register: bool) -> Result<()> {
    let fs = RealFileSystem;
    let catalog = CoreCatalog::new(cfg.catalog.clone(), &cfg.download)?;
    let downloads = DownloadManager::new(cfg.download.clone())?;

    let provisioner = Provisioner {
        catalog: &catalog,
        downloads: &downloads,
        fs: &fs,
        launch: &cfg.launch,
    };
    let server = provisioner.provision(&request, print_progress).await?;

    println!("created {} ({} {})", request.name, request.kind, request.version);
    println!("  dir:  {}", server.dir.display());
    println!("  core: {}", server.core_path.display());
    if let Some(script) = &server.script_path {
        println!("  script: {}", script.display());
    }

    if register {
        let mut list = ServerList::load(&fs, &cfg.servers.list_path)?;
        let entry = ServerEntry {
            name: request.name.clone(),
            path: server.dir.clone(),
        };
        if list.add(entry) {
            list.save(&fs)?;
        } else {
            warn!(server = %request.name, "a server with this name is already listed; list unchanged");
        }
    }
    Ok(())
}

fn servers(cfg: &ConfigFile, action: ServersAction) -> Result<()> {
    let fs = RealFileSystem;
    let mut list = ServerList::load(&fs, &cfg.servers.list_path)?;

    match action {
        ServersAction::List => {
            if list.entries().is_empty() {
                println!("no servers in {}", list.path().display());
            }
            for entry in list.entries() {
                println!("{}\t{}", entry.name, entry.path.display());
            }
        }
        ServersAction::Add { name, path } => {
            add_server(&fs, &mut list, &cfg.launch, name, path)?;
            list.save(&fs)?;
        }
        ServersAction::Remove { name } => {
            if list.remove(&name).is_none() {
                bail!("no server named '{}' in {}", name, list.path().display());
            }
            list.save(&fs)?;
        }
    }
    Ok(())
}

/// Add a directory to the list if it holds something `run` can launch.
fn add_server(
    fs: &dyn FileSystem,
    list: &mut ServerList,
    launch: &LaunchConfig,
    name: String,
    path: PathBuf,
) -> Result<()> {
    if !fs.is_dir(&path) {
        bail!("{} is not a directory", path.display());
    }
    let plan = resolve_launch(fs, &path, launch)?;
    debug!(server = %name, launch = %plan.describe(), "server is launchable");
    if !list.add(ServerEntry {
        name: name.clone(),
        path,
    }) {
        bail!("a server named '{}' is already listed", name);
    }
    Ok(())
}

/// A server argument is a name from the server list, or else a directory.
fn resolve_server_dir(cfg: &ConfigFile, server: &str) -> Result<PathBuf> {
    let list = ServerList::load(&RealFileSystem, &cfg.servers.list_path)?;
    if let Some(entry) = list.get(server) {
        return Ok(entry.path.clone());
    }
    let dir = PathBuf::from(server);
    if dir.is_dir() {
        Ok(dir)
    } else {
        Err(anyhow!(
            "'{}' is neither a listed server nor a directory",
            server
        ))
    }
}

/// Forward stdin lines on a dedicated thread; a blocked read must not hold
/// up runtime shutdown.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Next stats tick; pending forever when stats are off.
async fn next_stats_tick(ticker: &mut Option<tokio::time::Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn run_server(cfg: &ConfigFile, server: &str, stats: Option<Duration>) -> Result<()> {
    let dir = resolve_server_dir(cfg, server)?;
    let supervisor = ProcessSupervisor::new(cfg.supervisor.clone(), cfg.launch.clone());
    let id = supervisor.register(&dir);
    let mut events = supervisor.subscribe();
    supervisor.start(id).await?;

    let mut commands = spawn_stdin_reader();
    let mut stdin_open = true;
    let mut stats_ticker = stats.map(|period| {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker
    });

    let (code, requested) = loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(ProcessEvent::Output { line, .. }) => println!("{line}"),
                Ok(ProcessEvent::Exited { code, requested, .. }) => break (code, requested),
                Ok(ProcessEvent::StopEscalated { step, .. }) => {
                    info!(?step, "stop escalated");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "console fell behind; events dropped");
                }
                Err(RecvError::Closed) => bail!("event channel closed"),
            },
            command = commands.recv(), if stdin_open => match command {
                Some(command) => {
                    let command = command.trim();
                    if command.is_empty() {
                        continue;
                    }
                    if let Err(e) = supervisor.send_command(id, command).await {
                        warn!(error = %e, "command not sent");
                    }
                }
                None => stdin_open = false,
            },
            _ = next_stats_tick(&mut stats_ticker) => {
                if let Some(usage) = supervisor.resource_usage(id).await? {
                    println!("[warden] {usage}");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received; stopping server");
                let report = supervisor.stop(id).await?;
                info!(outcome = ?report.outcome, code = ?report.exit_code, "server stopped");
            }
        }
    };

    if requested || code == 0 {
        println!("server exited with code {code}");
        Ok(())
    } else {
        Err(anyhow!("server in {} exited with code {code}", dir.display()))
    }
}
