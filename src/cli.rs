// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `foldermon`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "foldermon",
    version,
    about = "Watch media folders and report newly arrived episode files.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// A missing file is fine when at least one `--folder` is given.
    #[arg(long, value_name = "PATH", default_value = "Foldermon.toml")]
    pub config: String,

    /// Extra folder to watch, in addition to the config file's `[[folder]]`s.
    #[arg(long = "folder", value_name = "PATH")]
    pub folders: Vec<PathBuf>,

    /// Watch the subtree of every `--folder` given on the command line.
    #[arg(long)]
    pub subtree: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `FOLDERMON_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Load + validate the config, print the resolved folder list, and exit.
    #[arg(long)]
    pub dry_run: bool,
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
