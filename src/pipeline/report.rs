// src/pipeline/report.rs

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};

use crate::engine::TaskName;
use crate::registry::Registry;

/// Overall outcome of one task execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// Every selected file made it to the destination.
    Succeeded,
    /// At least one file failed a step; the others were written.
    CompletedWithErrors,
    /// The task could not run at all (bad step configuration, missing
    /// source directory, ...).
    Failed(String),
}

/// A single file that dropped out of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    /// Source path (relative to the project root) of the failing file.
    pub path: PathBuf,
    /// Position of the failing step in the task's step list, or `None` for
    /// reading and writing.
    pub step_index: Option<usize>,
    pub step: String,
    pub error: String,
}

impl fmt::Display for FileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.step_index {
            Some(i) => write!(
                f,
                "{} failed at step {} ({}): {}",
                self.path.display(),
                i,
                self.step,
                self.error
            ),
            None => write!(f, "{} failed to {}: {}", self.path.display(), self.step, self.error),
        }
    }
}

/// Per-task execution result. Created each time a task runs; not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub task: TaskName,
    pub status: TaskStatus,
    /// Number of output files written.
    pub files_succeeded: usize,
    pub failures: Vec<FileFailure>,
    pub duration: Duration,
}

impl TaskReport {
    pub fn succeeded(task: impl Into<TaskName>, files: usize, duration: Duration) -> Self {
        Self {
            task: task.into(),
            status: TaskStatus::Succeeded,
            files_succeeded: files,
            failures: Vec::new(),
            duration,
        }
    }

    pub fn failed(task: impl Into<TaskName>, reason: impl Into<String>, duration: Duration) -> Self {
        Self {
            task: task.into(),
            status: TaskStatus::Failed(reason.into()),
            files_succeeded: 0,
            failures: Vec::new(),
            duration,
        }
    }

    /// Build a report from per-file results.
    pub fn from_files(
        task: impl Into<TaskName>,
        files_succeeded: usize,
        failures: Vec<FileFailure>,
        duration: Duration,
    ) -> Self {
        let status = if failures.is_empty() {
            TaskStatus::Succeeded
        } else {
            TaskStatus::CompletedWithErrors
        };
        Self {
            task: task.into(),
            status,
            files_succeeded,
            failures,
            duration,
        }
    }

    /// Only a clean success lets dependents start.
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Succeeded
    }

    pub fn files_failed(&self) -> usize {
        self.failures.len()
    }

    /// Human-readable reason when the report is not a success.
    pub fn failure_reason(&self) -> Option<String> {
        match &self.status {
            TaskStatus::Succeeded => None,
            TaskStatus::Failed(reason) => Some(reason.clone()),
            TaskStatus::CompletedWithErrors => {
                let first = self
                    .failures
                    .first()
                    .map(|f| format!("; first: {f}"))
                    .unwrap_or_default();
                Some(format!("{} file(s) failed{first}", self.failures.len()))
            }
        }
    }
}

impl fmt::Display for TaskReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match &self.status {
            TaskStatus::Succeeded => "ok",
            TaskStatus::CompletedWithErrors => "completed with errors",
            TaskStatus::Failed(_) => "failed",
        };
        write!(
            f,
            "{}: {} ({} ok, {} failed, {:.2?})",
            self.task,
            status,
            self.files_succeeded,
            self.failures.len(),
            self.duration
        )
    }
}

/// Observer invoked once per task execution.
pub trait Notifier: Send + Sync + fmt::Debug {
    fn notify(&self, task: &str, report: &TaskReport);
}

/// Production notifier: logs the outcome and prints a one-line summary
/// (prefixed with the task's configured message, if any) to stdout.
#[derive(Debug, Default)]
pub struct LogNotifier {
    messages: HashMap<TaskName, String>,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_registry(registry: &Registry) -> Self {
        let messages = registry
            .tasks()
            .filter_map(|t| t.notify.clone().map(|m| (t.name.clone(), m)))
            .collect();
        Self { messages }
    }

    pub fn message_for(&self, task: &str) -> Option<&str> {
        self.messages.get(task).map(String::as_str)
    }
}

impl Notifier for LogNotifier {
    fn notify(&self, task: &str, report: &TaskReport) {
        match &report.status {
            TaskStatus::Succeeded => info!(
                task = %task,
                files = report.files_succeeded,
                duration = ?report.duration,
                "task succeeded"
            ),
            TaskStatus::CompletedWithErrors => {
                for failure in &report.failures {
                    warn!(task = %task, "{failure}");
                }
                warn!(
                    task = %task,
                    files = report.files_succeeded,
                    failed = report.failures.len(),
                    duration = ?report.duration,
                    "task completed with errors"
                );
            }
            TaskStatus::Failed(reason) => warn!(
                task = %task,
                reason = %reason,
                duration = ?report.duration,
                "task failed"
            ),
        }

        match self.message_for(task) {
            Some(message) if report.is_success() => println!("{message} ({report})"),
            _ => println!("{report}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_with_errors_is_not_success() {
        let report = TaskReport::from_files(
            "scripts",
            1,
            vec![FileFailure {
                path: PathBuf::from("src/js/a.js"),
                step_index: Some(0),
                step: "minify-js".into(),
                error: "boom".into(),
            }],
            Duration::from_millis(3),
        );

        assert_eq!(report.status, TaskStatus::CompletedWithErrors);
        assert!(!report.is_success());
        let reason = report.failure_reason().unwrap();
        assert!(reason.starts_with("1 file(s) failed"));
        assert!(reason.contains("step 0 (minify-js)"));
    }

    #[test]
    fn empty_failure_list_is_success() {
        let report = TaskReport::from_files("css", 2, Vec::new(), Duration::ZERO);
        assert!(report.is_success());
        assert_eq!(report.failure_reason(), None);
    }
}
