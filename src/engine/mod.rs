// src/engine/mod.rs

//! Orchestration: one scheduler run at a time, fed by run requests, watch
//! triggers, task completions and shutdown requests.
//!
//! [`core::CoreRuntime`] makes every decision and is driven with explicit
//! timestamps. [`runtime::Runtime`] is the thin async loop around it.

use crate::pipeline::TaskReport;
use crate::watch::BindingId;

/// Canonical task name type used throughout the engine.
pub type TaskName = String;

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// If true, exit the runtime once no run is active and nothing is
    /// waiting to start (used by `run`).
    pub exit_when_idle: bool,
}

/// Events flowing into the runtime from the CLI, watcher and executor.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// Run these tasks (and their prerequisites) once.
    RunRequested { targets: Vec<TaskName> },
    /// A watched path changed.
    WatchTriggered {
        bindings: Vec<BindingId>,
        path: String,
    },
    /// A task finished executing.
    TaskCompleted { report: TaskReport },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod core;
pub mod event_handlers;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use runtime::Runtime;
