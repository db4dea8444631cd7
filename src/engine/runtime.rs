// src/engine/runtime.rs

use std::fmt;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::time::Instant as TokioInstant;
use tracing::{debug, info, warn};

use crate::dag::{RunSummary, ScheduledTask};
use crate::errors::Result;
use crate::exec::ExecutorBackend;

use super::core::CoreRuntime;
use super::event_handlers::CoreStep;
use super::{CoreCommand, RuntimeEvent};

/// Async shell around [`CoreRuntime`].
///
/// Waits for the next `RuntimeEvent` or the next debounce deadline,
/// whichever comes first, feeds it to the core, and carries out the
/// commands it returns. All decisions live in the core.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(core: CoreRuntime, event_rx: mpsc::Receiver<RuntimeEvent>, executor: E) -> Self {
        Self {
            core,
            event_rx,
            executor,
        }
    }

    /// Run until the core asks to exit or every event sender is gone.
    ///
    /// Returns the summary of the last run that finished, if any.
    pub async fn run(mut self) -> Result<Option<RunSummary>> {
        info!(watching = self.core.coordinator().bindings().len(), "runtime started");

        while let Some(step) = self.next_step().await {
            for command in step.commands {
                self.apply(command).await?;
            }
            if !step.keep_running {
                debug!("core requested exit");
                break;
            }
        }

        info!("runtime stopped");
        Ok(self.core.take_last_summary())
    }

    /// `None` once the event channel is closed.
    async fn next_step(&mut self) -> Option<CoreStep> {
        let deadline = self.core.next_deadline();
        let quiet_period_over = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(TokioInstant::from_std(at)).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            event = self.event_rx.recv() => {
                let Some(event) = event else {
                    info!("all event senders dropped");
                    return None;
                };
                debug!(?event, "runtime event");
                Some(self.core.step(event, Instant::now()))
            }
            () = quiet_period_over => Some(self.core.tick(Instant::now())),
        }
    }

    async fn apply(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::DispatchTasks(tasks) => self.dispatch(tasks).await?,
            CoreCommand::RunStarted { run_id, targets } => {
                info!(run_id, targets = ?targets, "run started");
            }
            CoreCommand::RunFinished(summary) => log_summary(&summary),
            CoreCommand::RequestExit => {}
        }
        Ok(())
    }

    async fn dispatch(&mut self, tasks: Vec<ScheduledTask>) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }
        debug!(
            tasks = ?tasks.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            "dispatching ready tasks"
        );
        self.executor.dispatch(tasks).await
    }
}

fn log_summary(summary: &RunSummary) {
    let files: usize = summary.reports.iter().map(|r| r.files_succeeded).sum();
    match &summary.failure {
        None => info!(
            run_id = summary.run_id,
            tasks = ?summary.executed(),
            files,
            "run succeeded"
        ),
        Some(failure) => warn!(
            run_id = summary.run_id,
            tasks = ?summary.executed(),
            skipped = ?summary.skipped,
            failure = ?failure,
            "run failed"
        ),
    }
}
