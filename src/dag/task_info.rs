// src/dag/task_info.rs

use std::path::Path;
use std::sync::Arc;

use crate::engine::TaskName;
use crate::registry::Task;

/// Where a task stands within the active (or most recent) run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Waiting on prerequisites, a free slot or its destination.
    Pending,
    Running,
    DoneSuccess,
    /// Failed outright or completed with file errors.
    DoneFailed,
    /// Never started because the run had already failed.
    Skipped,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::DoneSuccess | RunState::DoneFailed | RunState::Skipped
        )
    }
}

/// Public view of a task's state, including "not part of the run".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRunState {
    NotInRun,
    Pending,
    Running,
    DoneSuccess,
    DoneFailed,
    Skipped,
}

impl From<Option<RunState>> for TaskRunState {
    fn from(state: Option<RunState>) -> Self {
        match state {
            None => TaskRunState::NotInRun,
            Some(RunState::Pending) => TaskRunState::Pending,
            Some(RunState::Running) => TaskRunState::Running,
            Some(RunState::DoneSuccess) => TaskRunState::DoneSuccess,
            Some(RunState::DoneFailed) => TaskRunState::DoneFailed,
            Some(RunState::Skipped) => TaskRunState::Skipped,
        }
    }
}

/// Outcome of the last run a task executed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastExecution {
    pub run_id: u64,
    pub succeeded: bool,
}

/// Scheduler bookkeeping for one registered task.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub name: TaskName,
    pub task: Arc<Task>,
    /// `None` while the task is not part of the current run.
    pub run_state: Option<RunState>,
    pub last_execution: Option<LastExecution>,
}

impl TaskInfo {
    pub fn new(task: Arc<Task>) -> Self {
        Self {
            name: task.name.clone(),
            task,
            run_state: None,
            last_execution: None,
        }
    }

    /// Whether this task already executed in an earlier run.
    pub fn has_executed(&self) -> bool {
        self.last_execution.is_some()
    }

    /// Record the task's result for `run_id` and move it to its terminal
    /// state.
    pub fn finish(&mut self, run_id: u64, succeeded: bool) {
        self.run_state = Some(if succeeded {
            RunState::DoneSuccess
        } else {
            RunState::DoneFailed
        });
        self.last_execution = Some(LastExecution { run_id, succeeded });
    }

    pub fn dest(&self) -> Option<&Path> {
        self.task.dest()
    }
}

/// A task handed to the executor for one run.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub name: TaskName,
    pub task: Arc<Task>,
    pub run_id: u64,
}

impl ScheduledTask {
    pub fn new(info: &TaskInfo, run_id: u64) -> Self {
        Self {
            name: info.name.clone(),
            task: Arc::clone(&info.task),
            run_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_records_outcome_and_terminal_state() {
        let mut info = TaskInfo::new(Arc::new(Task::new("css")));
        assert!(!info.has_executed());

        info.run_state = Some(RunState::Running);
        info.finish(3, false);

        assert_eq!(info.run_state, Some(RunState::DoneFailed));
        assert!(info.run_state.is_some_and(RunState::is_terminal));
        assert_eq!(
            info.last_execution,
            Some(LastExecution {
                run_id: 3,
                succeeded: false
            })
        );
    }
}
