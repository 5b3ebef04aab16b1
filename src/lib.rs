// src/lib.rs

pub mod cli;
pub mod config;
pub mod decode;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod library;
pub mod logging;
pub mod mux;
pub mod types;
pub mod watch;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::debug;

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::{ConfigFile, FolderConfig};
use crate::engine::Notification;
use crate::library::{EpisodeMatcher, LibraryTracker, LibraryUpdate};

pub use crate::engine::{ActionFilter, Controller, ControllerOptions};
pub use crate::types::{ChangeAction, ChangeRecord};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading (plus `--folder` additions)
/// - the library tracker that interprets change batches
/// - the controller and its worker
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = resolve_config(&config_path, &args)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    monitor(cfg).await
}

/// Config file (if present) plus the folders given on the command line.
fn resolve_config(config_path: &Path, args: &CliArgs) -> Result<ConfigFile> {
    let mut cfg = if config_path.exists() {
        load_and_validate(config_path)
            .with_context(|| format!("loading config {}", config_path.display()))?
    } else if !args.folders.is_empty() {
        debug!(path = %config_path.display(), "no config file; using defaults");
        ConfigFile::default()
    } else {
        bail!(
            "config file {} not found and no --folder given",
            config_path.display()
        );
    };

    for path in &args.folders {
        cfg.folder.push(FolderConfig {
            path: path.clone(),
            subtree: args.subtree,
        });
    }
    Ok(cfg)
}

#[cfg(any(target_os = "linux", windows))]
async fn monitor(cfg: ConfigFile) -> Result<()> {
    use std::sync::Arc;

    use tracing::{info, warn};

    use crate::errors::RegistryError;
    use crate::fs::{FileSystem, RealFileSystem};
    use crate::library::PatternMatcher;
    use crate::types::EngineState;
    use crate::watch::canonical_path;

    let options = cfg.controller_options();
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let matcher = PatternMatcher::new(&cfg.library.patterns)?;
    let mut tracker = LibraryTracker::new(matcher, fs, options.actionable.clone());

    for folder in &cfg.folder {
        let path = canonical_path(&folder.path);
        if let Err(err) = tracker.prime(&path, folder.subtree) {
            debug!(folder = %path.display(), error = %err, "cannot list folder");
        }
    }

    let mut controller = Controller::new(options, move |n| report(&mut tracker, n));
    for folder in &cfg.folder {
        match controller.add_folder(&folder.path, folder.subtree) {
            Ok(_) => {}
            Err(RegistryError::AlreadyWatched(path)) => {
                warn!(folder = %path.display(), "folder given twice; ignoring duplicate");
            }
            Err(err) => return Err(err.into()),
        }
    }

    controller.start().context("starting folder monitor")?;
    if controller.state() == EngineState::Stopped {
        println!("[foldermon] no folders to watch");
        return Ok(());
    }
    info!("monitoring; press Ctrl-C to stop");

    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    warn!("failed to listen for Ctrl+C: {e}");
                }
                break;
            }
            delivered = controller.wait_and_pump() => {
                if delivered.is_none() {
                    warn!("worker exited unexpectedly");
                    break;
                }
            }
        }
    }

    controller.stop();
    Ok(())
}

#[cfg(not(any(target_os = "linux", windows)))]
async fn monitor(_cfg: ConfigFile) -> Result<()> {
    bail!("folder monitoring is not supported on this platform")
}

/// Consumer callback: feed a notification to the tracker and print what it
/// concludes.
fn report<M: EpisodeMatcher>(tracker: &mut LibraryTracker<M>, notification: Notification) {
    match notification {
        Notification::Changed { folder, records } => {
            for update in tracker.process(&folder, &records) {
                print_update(&update);
            }
        }
        Notification::WatchError { folder, error } => {
            println!("[foldermon] {}: {error}", folder.display());
        }
    }
}

fn print_update(update: &LibraryUpdate) {
    match update {
        LibraryUpdate::EpisodeAvailability {
            entry,
            path,
            available,
        } => {
            let mark = if *available { '+' } else { '-' };
            println!("[foldermon] {mark} {} ({})", entry.title, path.display());
        }
        LibraryUpdate::FolderMoved { entry, folder } => match folder {
            Some(folder) => println!("[foldermon] folder of {}: {}", entry.title, folder.display()),
            None => println!("[foldermon] folder of {} is gone", entry.title),
        },
        LibraryUpdate::RescanRequested { folder } => {
            println!("[foldermon] changes lost in {}; rescan needed", folder.display());
        }
    }
}

/// Simple dry-run output: print the resolved monitor settings and folders.
fn print_dry_run(cfg: &ConfigFile) {
    println!("foldermon dry-run");
    println!("  monitor.buffer_size = {}", cfg.monitor.buffer_size);
    println!("  monitor.require_folders = {}", cfg.monitor.require_folders);
    println!(
        "  monitor.notify_modifications = {}",
        cfg.monitor.notify_modifications
    );
    let actionable: Vec<&str> = cfg.monitor.actionable.iter().map(|a| a.as_str()).collect();
    println!("  monitor.actionable = {:?}", actionable);
    println!("  library.patterns = {:?}", cfg.library.patterns);
    println!();

    println!("folders ({}):", cfg.folder.len());
    for folder in &cfg.folder {
        let subtree = if folder.subtree { " (subtree)" } else { "" };
        println!("  - {}{subtree}", folder.path.display());
    }

    debug!("dry-run complete (nothing watched)");
}
