// src/registry.rs

//! Task registry.
//!
//! The registry owns every [`Task`] for the lifetime of the process. It is
//! built once (usually from the config via [`Registry::from_config`]) and
//! then shared read-only behind an `Arc`.
//!
//! Two ways of filling it are supported:
//!
//! - [`Registry::register`] is strict: every prerequisite must already be
//!   registered.
//! - [`Registry::declare`] accepts forward references; call
//!   [`Registry::resolve_prerequisites`] once everything is declared.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::config::ConfigFile;
use crate::engine::TaskName;
use crate::errors::{AssetdagError, Result};
use crate::pipeline::PipelineSpec;
use crate::types::TaskKind;

/// A named, invokable unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub name: TaskName,
    pub kind: TaskKind,
    /// Tasks that must succeed before this one may start.
    pub prerequisites: Vec<TaskName>,
    /// `None` for aggregate tasks that only group prerequisites.
    pub pipeline: Option<PipelineSpec>,
    /// Message shown on completion.
    pub notify: Option<String>,
}

impl Task {
    pub fn new(name: impl Into<TaskName>) -> Self {
        Self {
            name: name.into(),
            kind: TaskKind::default(),
            prerequisites: Vec::new(),
            pipeline: None,
            notify: None,
        }
    }

    pub fn with_kind(mut self, kind: TaskKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_prerequisites<S: Into<TaskName>>(mut self, prereqs: impl IntoIterator<Item = S>) -> Self {
        self.prerequisites = prereqs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_pipeline(mut self, pipeline: PipelineSpec) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn with_notify(mut self, message: impl Into<String>) -> Self {
        self.notify = Some(message.into());
        self
    }

    pub fn is_aggregate(&self) -> bool {
        self.pipeline.is_none()
    }

    /// Destination directory, if the task writes anything.
    pub fn dest(&self) -> Option<&Path> {
        self.pipeline.as_ref().map(|p| p.dest.as_path())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    tasks: BTreeMap<TaskName, Arc<Task>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a validated config.
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        let mut registry = Self::new();

        for (name, tc) in cfg.tasks() {
            let sources = cfg.effective_sources(tc);
            let pipeline = if sources.is_empty() {
                None
            } else {
                let dest = cfg.effective_dest(tc).ok_or_else(|| {
                    AssetdagError::ConfigError(format!("task '{name}' has sources but no `dest`"))
                })?;
                Some(
                    PipelineSpec::new(sources, dest)
                        .with_steps(tc.steps.iter().cloned())
                        .with_watch(tc.watch.iter().cloned()),
                )
            };

            registry.declare(Task {
                name: name.clone(),
                kind: tc.kind,
                prerequisites: tc.after.clone(),
                pipeline,
                notify: tc.notify.clone(),
            })?;
        }

        registry.resolve_prerequisites()?;
        Ok(registry)
    }

    /// Add a task whose prerequisites are all registered already.
    ///
    /// On error the registry is left unchanged.
    pub fn register(&mut self, task: Task) -> Result<()> {
        if self.tasks.contains_key(&task.name) {
            return Err(AssetdagError::DuplicateTask(task.name));
        }
        if let Some(missing) = task
            .prerequisites
            .iter()
            .find(|p| !self.tasks.contains_key(p.as_str()))
        {
            return Err(AssetdagError::UnknownPrerequisite {
                task: task.name.clone(),
                prerequisite: missing.clone(),
            });
        }

        debug!(task = %task.name, "registered task");
        self.tasks.insert(task.name.clone(), Arc::new(task));
        Ok(())
    }

    /// Add a task without checking its prerequisites yet.
    pub fn declare(&mut self, task: Task) -> Result<()> {
        if self.tasks.contains_key(&task.name) {
            return Err(AssetdagError::DuplicateTask(task.name));
        }
        self.tasks.insert(task.name.clone(), Arc::new(task));
        Ok(())
    }

    /// Check that every declared prerequisite names a known task.
    pub fn resolve_prerequisites(&self) -> Result<()> {
        for task in self.tasks.values() {
            for prereq in &task.prerequisites {
                if !self.tasks.contains_key(prereq) {
                    return Err(AssetdagError::UnknownPrerequisite {
                        task: task.name.clone(),
                        prerequisite: prereq.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<Task>> {
        self.get(name)
            .ok_or_else(|| AssetdagError::UnknownTask(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<Arc<Task>> {
        self.tasks.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Tasks in name order.
    pub fn tasks(&self) -> impl Iterator<Item = &Arc<Task>> {
        self.tasks.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
