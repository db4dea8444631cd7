// src/dag/state_manager.rs

//! Per-run state management for tasks in the scheduler.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, warn};

use crate::dag::DagGraph;
use crate::dag::task_info::{RunState, ScheduledTask, TaskInfo};
use crate::engine::TaskName;

/// Manages per-run state transitions for tasks.
pub struct StateManager<'a> {
    graph: &'a DagGraph,
    tasks: &'a mut HashMap<TaskName, TaskInfo>,
    current_run_id: Option<u64>,
}

impl<'a> StateManager<'a> {
    pub fn new(
        graph: &'a DagGraph,
        tasks: &'a mut HashMap<TaskName, TaskInfo>,
        current_run_id: Option<u64>,
    ) -> Self {
        Self {
            graph,
            tasks,
            current_run_id,
        }
    }

    /// Mark every task in `names` as `Pending` for this run.
    pub fn mark_pending(&mut self, names: &[TaskName]) {
        for name in names {
            if let Some(info) = self.tasks.get_mut(name) {
                info.run_state = Some(RunState::Pending);
                debug!(task = %info.name, "marked Pending for this run");
            } else {
                warn!(task = %name, "planned task missing from tasks map");
            }
        }
    }

    /// Mark every still-pending task of the run as `Skipped`.
    ///
    /// Returns the skipped names in `order`.
    pub fn skip_pending(&mut self, order: &[TaskName]) -> Vec<TaskName> {
        let mut skipped = Vec::new();
        for name in order {
            if let Some(info) = self.tasks.get_mut(name) {
                if info.run_state == Some(RunState::Pending) {
                    info.run_state = Some(RunState::Skipped);
                    debug!(task = %info.name, "skipping task after failure in this run");
                    skipped.push(info.name.clone());
                }
            }
        }
        skipped
    }

    pub fn deps_satisfied_for_info(&self, info: &TaskInfo) -> bool {
        ReadOnlyStateManager::new(self.graph, &*self.tasks).deps_satisfied_for_info(info)
    }

    /// Collect `Pending` tasks whose prerequisites all succeeded, mark them
    /// `Running` and return them as `ScheduledTask`s.
    ///
    /// Candidates are considered in `order`. A task is held back while the
    /// number of running tasks is at `max_parallel`, or while another running
    /// (or just picked) task writes to the same destination, an ancestor of
    /// it, or a descendant of it.
    pub fn collect_new_ready_tasks(
        &mut self,
        order: &[TaskName],
        max_parallel: usize,
    ) -> Vec<ScheduledTask> {
        let mut running = self.running_count();

        // Decide first, then mutate to avoid borrowing issues.
        let mut picked: Vec<TaskName> = Vec::new();
        {
            let ro = ReadOnlyStateManager::new(self.graph, &*self.tasks);
            let mut busy_dests: Vec<&Path> = self
                .tasks
                .values()
                .filter(|info| info.run_state == Some(RunState::Running))
                .filter_map(TaskInfo::dest)
                .collect();

            for name in order {
                if running >= max_parallel {
                    break;
                }
                let Some(info) = self.tasks.get(name) else {
                    continue;
                };
                if info.run_state != Some(RunState::Pending) || !ro.deps_satisfied_for_info(info) {
                    continue;
                }
                if let Some(dest) = info.dest() {
                    if let Some(conflict) = busy_dests.iter().find(|d| dests_overlap(d, dest)) {
                        debug!(
                            task = %info.name,
                            dest = ?dest,
                            busy = ?conflict,
                            "destination in use; holding task back"
                        );
                        continue;
                    }
                    busy_dests.push(dest);
                }
                picked.push(name.clone());
                running += 1;
            }
        }

        let mut ready = Vec::with_capacity(picked.len());
        for name in picked {
            if let Some(info) = self.tasks.get_mut(&name) {
                if info.has_executed() {
                    info!(
                        task = %info.name,
                        run_id = self.current_run_id,
                        "scheduling task for re-run"
                    );
                } else {
                    info!(
                        task = %info.name,
                        run_id = self.current_run_id,
                        "scheduling task for first run"
                    );
                }

                info.run_state = Some(RunState::Running);
                ready.push(ScheduledTask::new(info, self.current_run_id.unwrap_or(0)));
            }
        }

        ready
    }

    pub fn running_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|info| info.run_state == Some(RunState::Running))
            .count()
    }

    /// Check if all tasks participating in the run are in a terminal state.
    pub fn all_tasks_terminal(&self) -> bool {
        self.tasks
            .values()
            .filter_map(|info| info.run_state)
            .all(RunState::is_terminal)
    }
}

/// Two destinations conflict if one contains the other.
///
/// `.` components are ignored, so `"./"` (the project root) contains every
/// other destination.
pub fn dests_overlap(a: &Path, b: &Path) -> bool {
    let (a, b) = (without_cur_dir(a), without_cur_dir(b));
    a.starts_with(&b) || b.starts_with(&a)
}

fn without_cur_dir(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// A read-only view of the state manager for checking dependency satisfaction.
pub struct ReadOnlyStateManager<'a> {
    graph: &'a DagGraph,
    tasks: &'a HashMap<TaskName, TaskInfo>,
}

impl<'a> ReadOnlyStateManager<'a> {
    pub fn new(graph: &'a DagGraph, tasks: &'a HashMap<TaskName, TaskInfo>) -> Self {
        Self { graph, tasks }
    }

    /// All prerequisites of `info` succeeded in the current run.
    pub fn deps_satisfied_for_info(&self, info: &TaskInfo) -> bool {
        self.graph.dependencies_of(&info.name).iter().all(|dep_name| {
            match self.tasks.get(dep_name) {
                Some(dep) => dep.run_state == Some(RunState::DoneSuccess),
                None => {
                    warn!(
                        task = %info.name,
                        dep = %dep_name,
                        "dependency missing from tasks map"
                    );
                    false
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_destinations_overlap() {
        assert!(dests_overlap(Path::new("build"), Path::new("build/css")));
        assert!(dests_overlap(Path::new("build/css"), Path::new("build/css")));
        assert!(!dests_overlap(Path::new("build/css"), Path::new("build/js")));
        assert!(!dests_overlap(Path::new("build/css"), Path::new("build/css-old")));
        assert!(dests_overlap(Path::new("./"), Path::new("build/js")));
        assert!(dests_overlap(Path::new("./build"), Path::new("build/js")));
    }
}
