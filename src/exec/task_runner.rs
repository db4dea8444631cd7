// src/exec/task_runner.rs

//! Individual task runner.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::dag::ScheduledTask;
use crate::engine::RuntimeEvent;
use crate::pipeline::{PipelineExecutor, TaskReport};

/// Run a single scheduled task through the pipeline executor and emit its
/// `TaskCompleted` event.
///
/// The pipeline runs in its own Tokio task so a panic inside a transform is
/// turned into a failed report instead of leaving the scheduler waiting.
pub async fn run_task(
    executor: Arc<PipelineExecutor>,
    task: ScheduledTask,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) {
    let started = Instant::now();
    let name = task.name.clone();
    let run_id = task.run_id;

    let job = {
        let executor = Arc::clone(&executor);
        let task = Arc::clone(&task.task);
        tokio::spawn(async move { executor.execute(&task).await })
    };

    let report = match job.await {
        Ok(report) => report,
        Err(err) => {
            error!(task = %name, run_id, error = %err, "task execution panicked");
            TaskReport::failed(&name, format!("execution panicked: {err}"), started.elapsed())
        }
    };

    debug!(task = %name, run_id, status = ?report.status, "task finished");

    if let Err(err) = runtime_tx.send(RuntimeEvent::TaskCompleted { report }).await {
        error!(task = %name, run_id, "failed to send TaskCompleted: {err}");
    }
}
