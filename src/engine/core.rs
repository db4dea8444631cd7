// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - waking up at debounce deadlines
//! - sending `ScheduledTask`s to the executor
//!
//! Time is an explicit argument, so the core is unit tested without any
//! Tokio, channels, filesystem or processes.

use std::time::Instant;

use tracing::info;

use crate::dag::{RunSummary, Scheduler};
use crate::engine::event_handlers::{
    handle_run_request, handle_task_completion, handle_watch_trigger, maybe_start_run,
    CoreCommand, CoreStep,
};
use crate::engine::{RuntimeEvent, RuntimeOptions, TaskName};
use crate::watch::WatchCoordinator;

/// Pure core runtime state.
///
/// This owns:
/// - the DAG scheduler
/// - the watch coordinator
/// - explicit run requests waiting for the active run to finish
/// - runtime options (e.g. `exit_when_idle`)
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    coordinator: WatchCoordinator,
    options: RuntimeOptions,
    pending: Vec<TaskName>,
    last_summary: Option<RunSummary>,
    shutting_down: bool,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler, coordinator: WatchCoordinator, options: RuntimeOptions) -> Self {
        Self {
            scheduler,
            coordinator,
            options,
            pending: Vec::new(),
            last_summary: None,
            shutting_down: false,
        }
    }

    /// Expose whether the scheduler is idle (for tests).
    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn coordinator(&self) -> &WatchCoordinator {
        &self.coordinator
    }

    /// Summary of the most recently finished run.
    pub fn last_summary(&self) -> Option<&RunSummary> {
        self.last_summary.as_ref()
    }

    pub fn take_last_summary(&mut self) -> Option<RunSummary> {
        self.last_summary.take()
    }

    /// When the shell must call [`tick`](Self::tick) next.
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.shutting_down {
            return None;
        }
        self.coordinator.next_deadline()
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent, now: Instant) -> CoreStep {
        let mut commands = Vec::new();

        match event {
            RuntimeEvent::RunRequested { targets } => {
                handle_run_request(&mut self.pending, targets);
            }
            RuntimeEvent::WatchTriggered { bindings, path } => {
                if !self.shutting_down {
                    handle_watch_trigger(&mut self.coordinator, &bindings, &path, now);
                }
            }
            RuntimeEvent::TaskCompleted { report } => {
                let (mut cmds, finished) =
                    handle_task_completion(&mut self.scheduler, &mut self.coordinator, report);
                commands.append(&mut cmds);
                if finished.is_some() {
                    self.last_summary = finished;
                }
            }
            RuntimeEvent::ShutdownRequested => {
                if self.shutting_down || self.scheduler.is_idle() {
                    info!("shutdown requested; exiting");
                    return CoreStep::exit_with(commands);
                }
                info!("shutdown requested; waiting for the active run to finish");
                self.shutting_down = true;
                return CoreStep::continue_with(commands);
            }
        }

        self.advance(commands)
    }

    /// Expire debounce timers that are due at `now` and start a run if
    /// anything became due.
    pub fn tick(&mut self, now: Instant) -> CoreStep {
        if !self.shutting_down {
            let due = self.coordinator.expire(now);
            if !due.is_empty() {
                info!(bindings = ?due, "debounce expired");
            }
        }
        self.advance(Vec::new())
    }

    /// Start the next run if possible, then decide whether to keep going.
    fn advance(&mut self, mut commands: Vec<CoreCommand>) -> CoreStep {
        if self.shutting_down {
            if self.scheduler.is_idle() {
                return CoreStep::exit_with(commands);
            }
            return CoreStep::continue_with(commands);
        }

        let (mut cmds, finished) =
            maybe_start_run(&mut self.scheduler, &mut self.coordinator, &mut self.pending);
        commands.append(&mut cmds);
        if finished.is_some() {
            self.last_summary = finished;
        }

        if self.options.exit_when_idle
            && self.scheduler.is_idle()
            && self.pending.is_empty()
            && self.coordinator.is_quiet()
        {
            return CoreStep::exit_with(commands);
        }

        CoreStep::continue_with(commands)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::pipeline::{PipelineSpec, TaskReport};
    use crate::registry::{Registry, Task};
    use crate::watch::{BindingState, WatchBinding};

    fn registry() -> Arc<Registry> {
        let mut registry = Registry::new();
        registry
            .register(Task::new("css").with_pipeline(PipelineSpec::new(["src/scss/*.scss"], "build/css")))
            .unwrap();
        registry
            .register(Task::new("js").with_pipeline(PipelineSpec::new(["src/js/*.js"], "build/js")))
            .unwrap();
        Arc::new(registry)
    }

    fn watch_core() -> CoreRuntime {
        let registry = registry();
        let bindings = vec![
            WatchBinding::new(0, "css", ["src/scss/*.scss"]).unwrap(),
            WatchBinding::new(1, "js", ["src/js/*.js"]).unwrap(),
        ];
        CoreRuntime::new(
            Scheduler::new(registry, 4),
            WatchCoordinator::new(Arc::from(bindings), Duration::from_millis(100)),
            RuntimeOptions {
                exit_when_idle: false,
            },
        )
    }

    fn dispatched(step: &CoreStep) -> Vec<String> {
        step.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::DispatchTasks(tasks) => Some(tasks.iter().map(|t| t.name.clone())),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn completed(task: &str) -> RuntimeEvent {
        RuntimeEvent::TaskCompleted {
            report: TaskReport::succeeded(task, 1, Duration::ZERO),
        }
    }

    fn trigger(id: usize) -> RuntimeEvent {
        RuntimeEvent::WatchTriggered {
            bindings: vec![id],
            path: "x".into(),
        }
    }

    #[test]
    fn run_request_exits_when_idle() {
        let mut core = CoreRuntime::new(
            Scheduler::new(registry(), 4),
            WatchCoordinator::empty(),
            RuntimeOptions {
                exit_when_idle: true,
            },
        );
        let t0 = Instant::now();

        let step = core.step(
            RuntimeEvent::RunRequested {
                targets: vec!["css".into()],
            },
            t0,
        );
        assert_eq!(dispatched(&step), vec!["css"]);
        assert!(step.keep_running);

        let step = core.step(completed("css"), t0);
        assert!(!step.keep_running);
        assert!(matches!(step.commands.last(), Some(CoreCommand::RequestExit)));
        assert!(core.last_summary().unwrap().is_success());
    }

    #[test]
    fn bursts_within_debounce_produce_one_run() {
        let mut core = watch_core();
        let t0 = Instant::now();

        for ms in [0, 30, 60] {
            let step = core.step(trigger(0), t0 + Duration::from_millis(ms));
            assert!(dispatched(&step).is_empty());
        }

        assert!(dispatched(&core.tick(t0 + Duration::from_millis(100))).is_empty());
        let step = core.tick(t0 + Duration::from_millis(160));
        assert_eq!(dispatched(&step), vec!["css"]);

        core.step(completed("css"), t0 + Duration::from_millis(200));
        assert_eq!(core.coordinator().state_of(0), Some(BindingState::Idle));
        assert_eq!(core.next_deadline(), None);
    }

    #[test]
    fn changes_during_a_run_collapse_into_one_rerun() {
        let mut core = watch_core();
        let t0 = Instant::now();

        core.step(trigger(0), t0);
        core.tick(t0 + Duration::from_millis(100));

        for ms in [110, 120, 130] {
            core.step(trigger(0), t0 + Duration::from_millis(ms));
        }

        let step = core.step(completed("css"), t0 + Duration::from_millis(150));
        assert_eq!(dispatched(&step), vec!["css"]);

        let step = core.step(completed("css"), t0 + Duration::from_millis(200));
        assert!(dispatched(&step).is_empty());
        assert!(core.is_idle());
        assert_eq!(core.coordinator().state_of(0), Some(BindingState::Idle));
    }

    #[test]
    fn binding_due_during_another_run_joins_the_next_run() {
        let mut core = watch_core();
        let t0 = Instant::now();

        core.step(trigger(0), t0);
        core.tick(t0 + Duration::from_millis(100));
        core.step(trigger(1), t0 + Duration::from_millis(110));
        let step = core.tick(t0 + Duration::from_millis(210));
        assert!(dispatched(&step).is_empty());

        let step = core.step(completed("css"), t0 + Duration::from_millis(220));
        assert_eq!(dispatched(&step), vec!["js"]);
    }

    #[test]
    fn first_shutdown_waits_for_active_run() {
        let mut core = watch_core();
        let t0 = Instant::now();

        core.step(trigger(0), t0);
        core.tick(t0 + Duration::from_millis(100));

        let step = core.step(RuntimeEvent::ShutdownRequested, t0);
        assert!(step.keep_running);

        let step = core.step(completed("css"), t0);
        assert!(!step.keep_running);
    }

    #[test]
    fn unknown_target_finishes_with_structural_failure() {
        let mut core = CoreRuntime::new(
            Scheduler::new(registry(), 4),
            WatchCoordinator::empty(),
            RuntimeOptions {
                exit_when_idle: true,
            },
        );

        let step = core.step(
            RuntimeEvent::RunRequested {
                targets: vec!["nope".into()],
            },
            Instant::now(),
        );
        assert!(!step.keep_running);
        assert!(dispatched(&step).is_empty());
        assert!(!core.last_summary().unwrap().is_success());
    }
}
