// src/pipeline/mod.rs

//! Pipeline execution for a single task.
//!
//! - [`step`] holds the step descriptors deserialized from the config.
//! - [`source`] resolves a task's source patterns to concrete files.
//! - [`executor`] streams every file through the step chain and writes the
//!   results to the destination.
//! - [`report`] defines the per-task outcome and the completion observer.

use std::path::PathBuf;

pub mod executor;
pub mod report;
pub mod source;
pub mod step;

pub use executor::PipelineExecutor;
pub use report::{FileFailure, LogNotifier, Notifier, TaskReport, TaskStatus};
pub use source::{SourceFile, select_sources};
pub use step::{StepKind, StepSpec};

/// The file-processing part of a task: where inputs come from, what happens
/// to them and where they end up.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSpec {
    /// Source glob patterns, relative to the project root.
    pub sources: Vec<String>,
    /// Destination directory, relative to the project root.
    pub dest: PathBuf,
    pub steps: Vec<StepSpec>,
    /// Extra patterns that re-trigger the task in watch mode, on top of
    /// `sources`.
    pub watch: Vec<String>,
}

impl PipelineSpec {
    pub fn new<S: Into<String>>(
        sources: impl IntoIterator<Item = S>,
        dest: impl Into<PathBuf>,
    ) -> Self {
        Self {
            sources: sources.into_iter().map(Into::into).collect(),
            dest: dest.into(),
            steps: Vec::new(),
            watch: Vec::new(),
        }
    }

    pub fn with_steps(mut self, steps: impl IntoIterator<Item = StepSpec>) -> Self {
        self.steps = steps.into_iter().collect();
        self
    }

    pub fn with_watch<S: Into<String>>(mut self, patterns: impl IntoIterator<Item = S>) -> Self {
        self.watch = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// All patterns that should re-trigger this pipeline in watch mode.
    pub fn watch_patterns(&self) -> impl Iterator<Item = &str> {
        self.sources
            .iter()
            .chain(self.watch.iter())
            .map(String::as_str)
    }
}
