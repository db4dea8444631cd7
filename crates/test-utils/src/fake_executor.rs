use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, Notify};

use assetdag::dag::ScheduledTask;
use assetdag::engine::RuntimeEvent;
use assetdag::errors::AssetdagError;
use assetdag::exec::{DispatchFuture, ExecutorBackend};
use assetdag::pipeline::{Notifier, TaskReport};

/// A fake executor that:
/// - records which tasks were "run", in dispatch order
/// - immediately reports a `TaskCompleted` for each scheduled task, failing
///   the ones listed in `failing`.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<String>>>,
    failing: HashSet<String>,
}

impl FakeExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, executed: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            runtime_tx,
            executed,
            failing: HashSet::new(),
        }
    }

    pub fn failing(mut self, task: &str) -> Self {
        self.failing.insert(task.to_string());
        self
    }
}

impl ExecutorBackend for FakeExecutor {
    fn dispatch(&mut self, tasks: Vec<ScheduledTask>) -> DispatchFuture<'_> {
        let tx = self.runtime_tx.clone();
        let executed = Arc::clone(&self.executed);
        let failing = self.failing.clone();

        Box::pin(async move {
            for t in tasks {
                executed.lock().unwrap().push(t.name.clone());

                let report = if failing.contains(&t.name) {
                    TaskReport::failed(&t.name, "configured to fail", Duration::ZERO)
                } else {
                    TaskReport::succeeded(&t.name, 1, Duration::ZERO)
                };

                tx.send(RuntimeEvent::TaskCompleted { report })
                    .await
                    .map_err(anyhow::Error::from)?;
            }
            Ok::<(), AssetdagError>(())
        })
    }
}

/// A fake executor whose tasks only complete when the test says so.
///
/// Every dispatched task waits on `gate` before reporting success, which
/// lets a test inject watch events while a run is in flight.
pub struct GatedExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<String>>>,
    gate: Arc<Notify>,
}

impl GatedExecutor {
    pub fn new(
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        executed: Arc<Mutex<Vec<String>>>,
        gate: Arc<Notify>,
    ) -> Self {
        Self {
            runtime_tx,
            executed,
            gate,
        }
    }
}

impl ExecutorBackend for GatedExecutor {
    fn dispatch(&mut self, tasks: Vec<ScheduledTask>) -> DispatchFuture<'_> {
        for t in tasks {
            self.executed.lock().unwrap().push(t.name.clone());

            let tx = self.runtime_tx.clone();
            let gate = Arc::clone(&self.gate);
            tokio::spawn(async move {
                gate.notified().await;
                let report = TaskReport::succeeded(&t.name, 1, Duration::ZERO);
                let _ = tx.send(RuntimeEvent::TaskCompleted { report }).await;
            });
        }
        Box::pin(async { Ok(()) })
    }
}

/// Notifier that remembers every report it was handed.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    reports: Mutex<HashMap<String, TaskReport>>,
    order: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report_for(&self, task: &str) -> Option<TaskReport> {
        self.reports.lock().unwrap().get(task).cloned()
    }

    /// Task names in notification order.
    pub fn notified(&self) -> Vec<String> {
        self.order.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, task: &str, report: &TaskReport) {
        self.reports
            .lock()
            .unwrap()
            .insert(task.to_string(), report.clone());
        self.order.lock().unwrap().push(task.to_string());
    }
}
