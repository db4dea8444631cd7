// src/exec/backend.rs

//! The seam between the runtime and whatever actually runs tasks.
//!
//! [`PipelineBackend`] pushes each task through the shared
//! [`PipelineExecutor`] on its own Tokio task. Tests swap in backends from
//! `assetdag-test-utils` that complete tasks without touching the disk.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::dag::ScheduledTask;
use crate::engine::{RuntimeEvent, TaskName};
use crate::errors::Result;
use crate::pipeline::PipelineExecutor;

use super::task_runner::run_task;

pub type DispatchFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

pub trait ExecutorBackend: Send {
    /// Start executing `tasks`.
    ///
    /// Must not wait for the tasks to finish. Each dispatched task later
    /// produces exactly one `RuntimeEvent::TaskCompleted`.
    fn dispatch(&mut self, tasks: Vec<ScheduledTask>) -> DispatchFuture<'_>;
}

/// Runs scheduled tasks through a [`PipelineExecutor`].
pub struct PipelineBackend {
    executor: Arc<PipelineExecutor>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    active: HashMap<TaskName, JoinHandle<()>>,
}

impl PipelineBackend {
    pub fn new(executor: Arc<PipelineExecutor>, runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            executor,
            runtime_tx,
            active: HashMap::new(),
        }
    }

    fn start(&mut self, task: ScheduledTask) {
        self.active.retain(|_, handle| !handle.is_finished());
        if self.active.contains_key(&task.name) {
            // The scheduler never dispatches a task twice within a run.
            warn!(
                task = %task.name,
                run_id = task.run_id,
                "task dispatched while a previous execution is still running"
            );
        }

        debug!(task = %task.name, run_id = task.run_id, "dispatching task");
        let name = task.name.clone();
        let handle = tokio::spawn(run_task(
            Arc::clone(&self.executor),
            task,
            self.runtime_tx.clone(),
        ));
        self.active.insert(name, handle);
    }
}

impl ExecutorBackend for PipelineBackend {
    fn dispatch(&mut self, tasks: Vec<ScheduledTask>) -> DispatchFuture<'_> {
        for task in tasks {
            self.start(task);
        }
        Box::pin(async { Ok(()) })
    }
}
