// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `assetdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "assetdag",
    version,
    about = "Build front-end assets through dependency-ordered pipelines, optionally re-running on file changes.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// The directory holding it is the project root all patterns are
    /// relative to.
    #[arg(long, global = true, value_name = "PATH", default_value = "Assetdag.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `ASSETDAG_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the given tasks and their prerequisites once.
    Run {
        #[arg(required = true, value_name = "TASK")]
        tasks: Vec<String>,
    },
    /// Run a task once, then re-run affected tasks whenever their sources
    /// change, until interrupted.
    Watch {
        #[arg(value_name = "TASK")]
        task: String,
    },
    /// Delete the configured output paths.
    Clean,
    /// Print groups, tasks and clean paths without executing anything.
    List,
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
