// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::dag::task_info::ScheduledTask;
use crate::engine::TaskName;
use crate::errors::AssetdagError;
use crate::pipeline::TaskReport;

/// Structured result of a single scheduler "step".
///
/// Tests can drive the scheduler by hand and make assertions about what
/// changed after each step.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Tasks that became ready to run as a result of this step.
    pub newly_scheduled: Vec<ScheduledTask>,
    /// Tasks that will not run in this run because it already failed.
    pub newly_skipped: Vec<TaskName>,
    /// Set when this step finished the run.
    pub finished: Option<RunSummary>,
}

/// Why a run did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunFailure {
    /// `task` never ran because `prerequisite` (somewhere in its closure)
    /// did not succeed.
    PrerequisiteFailed {
        task: TaskName,
        prerequisite: TaskName,
    },
    /// A requested task itself failed or completed with errors.
    TaskFailed { task: TaskName, reason: String },
    /// The run could not be planned (unknown task, cycle).
    Structural(String),
}

impl From<RunFailure> for AssetdagError {
    fn from(failure: RunFailure) -> Self {
        match failure {
            RunFailure::PrerequisiteFailed { task, prerequisite } => {
                AssetdagError::PrerequisiteFailed { task, prerequisite }
            }
            RunFailure::TaskFailed { task, reason } => AssetdagError::TaskFailed { task, reason },
            RunFailure::Structural(reason) => AssetdagError::ConfigError(reason),
        }
    }
}

/// Everything that happened in one scheduler run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: u64,
    /// Tasks requested for this run (not including their prerequisites).
    pub targets: Vec<TaskName>,
    /// Reports in completion order.
    pub reports: Vec<TaskReport>,
    /// Tasks that never started.
    pub skipped: Vec<TaskName>,
    pub failure: Option<RunFailure>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn report_for(&self, task: &str) -> Option<&TaskReport> {
        self.reports.iter().find(|r| r.task == task)
    }

    /// Names of the tasks that ran, in completion order.
    pub fn executed(&self) -> Vec<&str> {
        self.reports.iter().map(|r| r.task.as_str()).collect()
    }

    pub fn into_result(self) -> crate::errors::Result<RunSummary> {
        match self.failure.clone() {
            Some(failure) => Err(failure.into()),
            None => Ok(self),
        }
    }
}
