// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use std::time::Instant;

use tracing::{debug, warn};

use crate::dag::{RunFailure, RunSummary, ScheduledTask, Scheduler};
use crate::engine::TaskName;
use crate::pipeline::TaskReport;
use crate::watch::{BindingId, WatchCoordinator};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these tasks to the executor.
    DispatchTasks(Vec<ScheduledTask>),
    /// A scheduler run started.
    RunStarted { run_id: u64, targets: Vec<TaskName> },
    /// A scheduler run finished (successfully or not).
    RunFinished(RunSummary),
    /// Request that the process exits.
    RequestExit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    pub fn continue_with(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }

    pub fn exit_with(mut commands: Vec<CoreCommand>) -> Self {
        commands.push(CoreCommand::RequestExit);
        Self {
            commands,
            keep_running: false,
        }
    }
}

/// Queue an explicit run request.
///
/// Requests never interrupt the active run; they start with the next one.
pub fn handle_run_request(pending: &mut Vec<TaskName>, targets: Vec<TaskName>) {
    for target in targets {
        if !pending.contains(&target) {
            pending.push(target);
        }
    }
}

/// Feed a watch trigger into the coordinator.
pub fn handle_watch_trigger(
    coordinator: &mut WatchCoordinator,
    bindings: &[BindingId],
    path: &str,
    now: Instant,
) {
    debug!(path = %path, bindings = ?bindings, "watched path changed");
    for id in bindings {
        coordinator.on_change(*id, now);
    }
}

/// Forward a task report to the scheduler.
///
/// Returns the commands for newly ready tasks, plus the run summary if this
/// report finished the run.
pub fn handle_task_completion(
    scheduler: &mut Scheduler,
    coordinator: &mut WatchCoordinator,
    report: TaskReport,
) -> (Vec<CoreCommand>, Option<RunSummary>) {
    let mut commands = Vec::new();

    let step = scheduler.handle_completion(report);
    if !step.newly_skipped.is_empty() {
        debug!(skipped = ?step.newly_skipped, "tasks skipped");
    }
    if !step.newly_scheduled.is_empty() {
        commands.push(CoreCommand::DispatchTasks(step.newly_scheduled));
    }

    if let Some(summary) = &step.finished {
        coordinator.on_run_finished();
        commands.push(CoreCommand::RunFinished(summary.clone()));
    }

    (commands, step.finished)
}

/// If the scheduler is idle, start one run covering every pending request
/// and every due watch binding.
///
/// A run that cannot be planned finishes immediately with a structural
/// failure instead of stopping the runtime.
pub fn maybe_start_run(
    scheduler: &mut Scheduler,
    coordinator: &mut WatchCoordinator,
    pending: &mut Vec<TaskName>,
) -> (Vec<CoreCommand>, Option<RunSummary>) {
    let mut commands = Vec::new();

    if !scheduler.is_idle() {
        return (commands, None);
    }

    let mut targets: Vec<TaskName> = std::mem::take(pending);
    for task in coordinator.take_due() {
        if !targets.contains(&task) {
            targets.push(task);
        }
    }
    if targets.is_empty() {
        return (commands, None);
    }

    match scheduler.start_run(&targets) {
        Ok(step) => {
            let run_id = scheduler.current_run_id().unwrap_or_default();
            commands.push(CoreCommand::RunStarted {
                run_id,
                targets: targets.clone(),
            });
            if !step.newly_scheduled.is_empty() {
                commands.push(CoreCommand::DispatchTasks(step.newly_scheduled));
            }
            (commands, None)
        }
        Err(err) => {
            warn!(targets = ?targets, error = %err, "could not start run");
            coordinator.on_run_finished();
            let summary = RunSummary {
                run_id: 0,
                targets,
                reports: Vec::new(),
                skipped: Vec::new(),
                failure: Some(RunFailure::Structural(err.to_string())),
            };
            commands.push(CoreCommand::RunFinished(summary.clone()));
            (commands, Some(summary))
        }
    }
}
