// src/errors.rs

//! Crate-wide error types.
//!
//! Structural errors (duplicate/unknown tasks, cycles) abort a run before any
//! transform executes. [`TransformError`] is per file and never aborts a task
//! on its own; [`CleanupError`] collects every path that could not be removed.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssetdagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task already registered: {0}")]
    DuplicateTask(String),

    #[error("Task not found: {0}")]
    UnknownTask(String),

    #[error("Task '{task}' has unknown prerequisite '{prerequisite}'")]
    UnknownPrerequisite { task: String, prerequisite: String },

    #[error("Cycle detected in task graph: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    #[error("Task '{task}' not run: prerequisite '{prerequisite}' did not succeed")]
    PrerequisiteFailed { task: String, prerequisite: String },

    #[error("Task '{task}' failed: {reason}")]
    TaskFailed { task: String, reason: String },

    #[error(transparent)]
    Cleanup(#[from] CleanupError),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failure of a single transform step on a single file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("step '{step}' failed: {message}")]
pub struct TransformError {
    pub step: String,
    pub message: String,
}

impl TransformError {
    pub fn new(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            message: message.into(),
        }
    }
}

/// Paths that `clean` could not remove.
#[derive(Error, Debug)]
pub struct CleanupError {
    pub failures: Vec<(PathBuf, String)>,
}

impl fmt::Display for CleanupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to remove {} path(s):", self.failures.len())?;
        for (path, reason) in &self.failures {
            write!(f, " {} ({reason});", path.display())?;
        }
        Ok(())
    }
}

impl CleanupError {
    /// Whether `path` is one of the paths that failed.
    pub fn names(&self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        self.failures.iter().any(|(p, _)| *p == path)
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, AssetdagError>;
