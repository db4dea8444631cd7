// src/lib.rs

pub mod clean;
pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod pipeline;
pub mod registry;
pub mod transform;
pub mod types;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::{CliArgs, Command};
use crate::config::{load_and_validate, ConfigFile};
use crate::dag::{RunSummary, Scheduler};
use crate::engine::{CoreRuntime, Runtime, RuntimeEvent, RuntimeOptions, TaskName};
use crate::exec::PipelineBackend;
use crate::fs::RealFileSystem;
use crate::pipeline::{LogNotifier, PipelineExecutor};
use crate::registry::Registry;
use crate::watch::{build_bindings, spawn_watcher, WatchCoordinator};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and validation
/// - registry / scheduler / runtime
/// - the pipeline executor
/// - (for `watch`) the file watcher
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;
    let root = config_root_dir(&config_path);
    debug!(root = ?root, "project root");

    match args.command {
        Command::List => {
            print_list(&cfg);
            Ok(())
        }
        Command::Clean => {
            let removed = clean::clean(&RealFileSystem, &root, cfg.clean_paths())?;
            println!("[assetdag] removed {} path(s)", removed.len());
            Ok(())
        }
        Command::Run { tasks } => {
            let summary = run_tasks(&cfg, &root, tasks).await?;
            summary.into_result()?;
            Ok(())
        }
        Command::Watch { task } => {
            if let Some(summary) = watch_task(&cfg, &root, task).await? {
                summary.into_result()?;
            }
            Ok(())
        }
    }
}

/// Run `targets` and their prerequisites once.
///
/// Structural problems (unknown task, cycle) are returned as errors before
/// anything executes; task failures are reported in the summary.
pub async fn run_tasks(cfg: &ConfigFile, root: &Path, targets: Vec<TaskName>) -> Result<RunSummary> {
    let registry = Arc::new(Registry::from_config(cfg)?);
    let scheduler = Scheduler::new(Arc::clone(&registry), cfg.config().max_parallel_tasks);
    for target in &targets {
        scheduler.plan(target)?;
    }

    let core = CoreRuntime::new(
        scheduler,
        WatchCoordinator::empty(),
        RuntimeOptions {
            exit_when_idle: true,
        },
    );

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);
    let backend = PipelineBackend::new(pipeline_executor(cfg, root, &registry), rt_tx.clone());
    spawn_ctrl_c_handler(rt_tx.clone());

    rt_tx.send(RuntimeEvent::RunRequested { targets }).await?;

    let runtime = Runtime::new(core, rt_rx, backend);
    runtime
        .run()
        .await?
        .context("runtime stopped before the run finished")
}

/// Run `target` once, then keep re-running its re-runnable tasks whenever
/// their sources change, until Ctrl-C.
///
/// Returns the summary of the last run that finished, if any.
pub async fn watch_task(cfg: &ConfigFile, root: &Path, target: TaskName) -> Result<Option<RunSummary>> {
    let registry = Arc::new(Registry::from_config(cfg)?);
    let scheduler = Scheduler::new(Arc::clone(&registry), cfg.config().max_parallel_tasks);
    let closure = scheduler.plan(&target)?;

    let bindings = build_bindings(&registry, &closure)?;
    if bindings.is_empty() {
        warn!(task = %target, "no re-runnable tasks to watch");
    }
    for binding in &bindings {
        info!(task = %binding.task(), patterns = ?binding.patterns(), "watching");
    }
    let coordinator = WatchCoordinator::new(Arc::from(bindings), cfg.debounce());

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);
    let _watcher_handle = spawn_watcher(root, Arc::clone(coordinator.bindings()), rt_tx.clone())?;
    let backend = PipelineBackend::new(pipeline_executor(cfg, root, &registry), rt_tx.clone());
    spawn_ctrl_c_handler(rt_tx.clone());

    rt_tx
        .send(RuntimeEvent::RunRequested {
            targets: vec![target],
        })
        .await?;

    let core = CoreRuntime::new(
        scheduler,
        coordinator,
        RuntimeOptions {
            exit_when_idle: false,
        },
    );
    let runtime = Runtime::new(core, rt_rx, backend);
    Ok(runtime.run().await?)
}

fn pipeline_executor(cfg: &ConfigFile, root: &Path, registry: &Registry) -> Arc<PipelineExecutor> {
    let settings = cfg.config();
    Arc::new(PipelineExecutor::new(
        Arc::new(RealFileSystem),
        root,
        &settings.cache_dir,
        settings.max_parallel_files,
        Arc::new(LogNotifier::from_registry(registry)),
    ))
}

/// Ctrl-C → graceful shutdown; a second Ctrl-C stops without waiting.
fn spawn_ctrl_c_handler(tx: mpsc::Sender<RuntimeEvent>) {
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            if tx.send(RuntimeEvent::ShutdownRequested).await.is_err() {
                return;
            }
        }
    });
}

/// Figure out the project root.
///
/// - If the config path has a non-empty parent (e.g. "web/Assetdag.toml"),
///   we use that directory.
/// - If it's just a bare filename like "Assetdag.toml" (parent = ""),
///   we fall back to the current working directory "."
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Dry listing: print groups, tasks and clean paths.
fn print_list(cfg: &ConfigFile) {
    let settings = cfg.config();
    println!("assetdag list");
    println!("  config.debounce = {}", settings.debounce);
    println!("  config.max_parallel_tasks = {}", settings.max_parallel_tasks);
    println!("  config.max_parallel_files = {}", settings.max_parallel_files);
    println!("  config.cache_dir = {}", settings.cache_dir);
    println!();

    if !cfg.groups().is_empty() {
        println!("groups ({}):", cfg.groups().len());
        for (name, group) in cfg.groups() {
            println!("  - {name}");
            println!("      src: {:?}", group.src);
            if let Some(dest) = &group.dest {
                println!("      dest: {dest}");
            }
        }
        println!();
    }

    println!("tasks ({}):", cfg.tasks().len());
    for (name, task) in cfg.tasks() {
        println!("  - {name} ({:?})", task.kind);
        if !task.after.is_empty() {
            println!("      after: {:?}", task.after);
        }
        let sources = cfg.effective_sources(task);
        if !sources.is_empty() {
            println!("      src: {sources:?}");
        }
        if let Some(dest) = cfg.effective_dest(task) {
            println!("      dest: {dest}");
        }
        for step in &task.steps {
            println!("      step: {step}");
        }
        if !task.watch.is_empty() {
            println!("      watch: {:?}", task.watch);
        }
        if let Some(message) = &task.notify {
            println!("      notify: {message}");
        }
    }

    if !cfg.clean_paths().is_empty() {
        println!();
        println!("clean: {:?}", cfg.clean_paths());
    }

    debug!("list complete (no execution)");
}
