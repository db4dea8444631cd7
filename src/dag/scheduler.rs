// src/dag/scheduler.rs

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dag::graph::DagGraph;
use crate::dag::scheduler_step::{RunFailure, RunSummary, SchedulerStep};
use crate::dag::state_manager::{ReadOnlyStateManager, StateManager};
use crate::dag::task_info::{RunState, TaskInfo, TaskRunState};
use crate::engine::TaskName;
use crate::errors::{AssetdagError, Result};
use crate::pipeline::TaskReport;
use crate::registry::Registry;

/// Bookkeeping for the run in progress.
#[derive(Debug)]
struct ActiveRun {
    run_id: u64,
    targets: Vec<TaskName>,
    /// Prerequisite closure of each target, in execution order.
    plans: Vec<(TaskName, Vec<TaskName>)>,
    /// Union of all plans, in execution order.
    order: Vec<TaskName>,
    reports: Vec<TaskReport>,
    skipped: Vec<TaskName>,
    /// First task that did not succeed, with its reason.
    first_failure: Option<(TaskName, String)>,
}

/// Scheduler holds the immutable task graph plus mutable per-run state.
///
/// It is responsible for:
/// - planning a run (prerequisite closure in dependency order, cycle
///   detection)
/// - deciding when a task is ready (prerequisites succeeded, a free slot,
///   no destination conflict)
/// - failing the run fast when a task does not succeed
/// - summarizing the run once every task is terminal
///
/// It performs no IO; the engine feeds it reports and dispatches what it
/// returns.
#[derive(Debug)]
pub struct Scheduler {
    registry: Arc<Registry>,
    graph: DagGraph,
    tasks: HashMap<TaskName, TaskInfo>,
    max_parallel: usize,
    /// Monotonically increasing run ID.
    run_counter: u64,
    current: Option<ActiveRun>,
}

impl Scheduler {
    pub fn new(registry: Arc<Registry>, max_parallel: usize) -> Self {
        let graph = DagGraph::from_registry(&registry);
        let tasks = registry
            .tasks()
            .map(|task| (task.name.clone(), TaskInfo::new(task.clone())))
            .collect();

        Self {
            registry,
            graph,
            tasks,
            max_parallel: max_parallel.max(1),
            run_counter: 0,
            current: None,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn graph(&self) -> &DagGraph {
        &self.graph
    }

    /// Returns `true` if there is currently no active run.
    pub fn is_idle(&self) -> bool {
        self.current.is_none()
    }

    /// Current run ID, if any.
    pub fn current_run_id(&self) -> Option<u64> {
        self.current.as_ref().map(|run| run.run_id)
    }

    /// Read-only view of the given task's run state.
    ///
    /// After a run finishes, tasks keep their terminal state until the next
    /// run starts.
    pub fn run_state_of(&self, task: &str) -> Option<TaskRunState> {
        let info = self.tasks.get(task)?;
        Some(info.run_state.into())
    }

    /// Whether the prerequisites of `task` all succeeded in the current run.
    ///
    /// Returns `None` if the task is unknown.
    pub fn deps_satisfied(&self, task: &str) -> Option<bool> {
        let info = self.tasks.get(task)?;
        let mgr = ReadOnlyStateManager::new(&self.graph, &self.tasks);
        Some(mgr.deps_satisfied_for_info(info))
    }

    /// Compute the execution order for `target`: its transitive
    /// prerequisites, depth first, each before its dependents, ending with
    /// `target` itself.
    pub fn plan(&self, target: &str) -> Result<Vec<TaskName>> {
        self.graph.execution_order(target)
    }

    /// Start a run for `targets` and their prerequisites.
    ///
    /// Every target is planned before any state changes, so a structural
    /// error leaves the scheduler idle with nothing scheduled.
    pub fn start_run(&mut self, targets: &[TaskName]) -> Result<SchedulerStep> {
        if let Some(run) = &self.current {
            return Err(AssetdagError::Other(anyhow::anyhow!(
                "run {} is still active",
                run.run_id
            )));
        }
        if targets.is_empty() {
            return Err(AssetdagError::ConfigError(
                "no tasks requested".to_string(),
            ));
        }

        let mut plans = Vec::with_capacity(targets.len());
        for target in targets {
            plans.push((target.clone(), self.plan(target)?));
        }

        let mut order = Vec::new();
        let mut seen = HashSet::new();
        for (_, plan) in &plans {
            for name in plan {
                if seen.insert(name.clone()) {
                    order.push(name.clone());
                }
            }
        }

        self.run_counter += 1;
        let run_id = self.run_counter;
        for info in self.tasks.values_mut() {
            info.run_state = None;
        }

        info!(run_id, targets = ?targets, tasks = order.len(), "scheduler: starting run");

        let mut manager = StateManager::new(&self.graph, &mut self.tasks, Some(run_id));
        manager.mark_pending(&order);
        let newly_scheduled = manager.collect_new_ready_tasks(&order, self.max_parallel);

        self.current = Some(ActiveRun {
            run_id,
            targets: targets.to_vec(),
            plans,
            order,
            reports: Vec::new(),
            skipped: Vec::new(),
            first_failure: None,
        });

        Ok(SchedulerStep {
            newly_scheduled,
            newly_skipped: Vec::new(),
            finished: None,
        })
    }

    /// Record the report of a running task and advance the run.
    pub fn handle_completion(&mut self, report: TaskReport) -> SchedulerStep {
        let Some(run) = self.current.as_mut() else {
            warn!(task = %report.task, "completion with no active run; ignoring");
            return SchedulerStep::default();
        };
        let run_id = run.run_id;

        let Some(info) = self.tasks.get_mut(&report.task) else {
            warn!(task = %report.task, "completion for unknown task; ignoring");
            return SchedulerStep::default();
        };
        if info.run_state != Some(RunState::Running) {
            warn!(
                task = %report.task,
                state = ?info.run_state,
                "completion for a task that is not running; ignoring"
            );
            return SchedulerStep::default();
        }

        let mut step = SchedulerStep::default();

        info.finish(run_id, report.is_success());
        if report.is_success() {
            debug!(task = %info.name, run_id, "task completed successfully");
        } else {
            let reason = report
                .failure_reason()
                .unwrap_or_else(|| "did not succeed".to_string());
            warn!(
                task = %info.name,
                run_id,
                reason = %reason,
                "task did not succeed; skipping remaining tasks in this run"
            );
            if run.first_failure.is_none() {
                run.first_failure = Some((info.name.clone(), reason));
            }

            let mut manager = StateManager::new(&self.graph, &mut self.tasks, Some(run_id));
            step.newly_skipped = manager.skip_pending(&run.order);
            run.skipped.extend(step.newly_skipped.iter().cloned());
        }
        run.reports.push(report);

        let mut manager = StateManager::new(&self.graph, &mut self.tasks, Some(run_id));
        if run.first_failure.is_none() {
            step.newly_scheduled = manager.collect_new_ready_tasks(&run.order, self.max_parallel);
        }

        if manager.all_tasks_terminal() {
            step.finished = self.finish_run();
        }

        step
    }

    fn finish_run(&mut self) -> Option<RunSummary> {
        let run = self.current.take()?;
        let failure = self.run_failure(&run);

        match &failure {
            None => info!(run_id = run.run_id, "scheduler: run succeeded"),
            Some(f) => warn!(run_id = run.run_id, failure = ?f, "scheduler: run failed"),
        }

        Some(RunSummary {
            run_id: run.run_id,
            targets: run.targets,
            reports: run.reports,
            skipped: run.skipped,
            failure,
        })
    }

    /// Attribute the run's failure to the first target that did not succeed.
    fn run_failure(&self, run: &ActiveRun) -> Option<RunFailure> {
        let (failed_task, reason) = run.first_failure.as_ref()?;

        for (target, plan) in &run.plans {
            let state = self.tasks.get(target).and_then(|i| i.run_state);
            match state {
                Some(RunState::DoneSuccess) => continue,
                Some(RunState::DoneFailed) => {
                    let reason = run
                        .reports
                        .iter()
                        .find(|r| &r.task == target)
                        .and_then(TaskReport::failure_reason)
                        .unwrap_or_else(|| reason.clone());
                    return Some(RunFailure::TaskFailed {
                        task: target.clone(),
                        reason,
                    });
                }
                _ => {
                    let prerequisite = plan
                        .iter()
                        .find(|name| {
                            self.tasks.get(name.as_str()).and_then(|i| i.run_state)
                                == Some(RunState::DoneFailed)
                        })
                        .cloned();
                    return Some(match prerequisite {
                        Some(prerequisite) => RunFailure::PrerequisiteFailed {
                            task: target.clone(),
                            prerequisite,
                        },
                        None => RunFailure::TaskFailed {
                            task: target.clone(),
                            reason: format!("skipped after '{failed_task}' failed"),
                        },
                    });
                }
            }
        }

        // Every target succeeded but something else in the run did not.
        Some(RunFailure::TaskFailed {
            task: failed_task.clone(),
            reason: reason.clone(),
        })
    }
}
