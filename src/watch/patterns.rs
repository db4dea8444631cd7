// src/watch/patterns.rs

use std::fmt;

use anyhow::{Context, Result};
use globset::{GlobSet, GlobSetBuilder};

use crate::engine::TaskName;
use crate::pipeline::source::{glob_for, normalize_pattern};
use crate::registry::Registry;
use crate::types::TaskKind;

/// Index of a binding in the coordinator's binding list.
pub type BindingId = usize;

/// Compiled path patterns bound to one task.
///
/// Created at startup, lives for the watch session, never mutated. The
/// patterns are relative to the project root; the watcher passes relative
/// paths (e.g. `"src/scss/site.scss"`) into [`matches`](Self::matches).
#[derive(Clone)]
pub struct WatchBinding {
    id: BindingId,
    task: TaskName,
    patterns: Vec<String>,
    set: GlobSet,
}

impl fmt::Debug for WatchBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchBinding")
            .field("id", &self.id)
            .field("task", &self.task)
            .field("patterns", &self.patterns)
            .finish_non_exhaustive()
    }
}

impl WatchBinding {
    pub fn new<S: Into<String>>(
        id: BindingId,
        task: impl Into<TaskName>,
        patterns: impl IntoIterator<Item = S>,
    ) -> Result<Self> {
        let task = task.into();
        let patterns: Vec<String> = patterns
            .into_iter()
            .map(|p| normalize_pattern(&p.into()).to_string())
            .collect();
        let set = build_globset(&patterns)
            .with_context(|| format!("building watch globset for task {task}"))?;

        Ok(Self {
            id,
            task,
            patterns,
            set,
        })
    }

    pub fn id(&self) -> BindingId {
        self.id
    }

    /// Name of the task this binding re-runs.
    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Returns true if the given root-relative path re-triggers this binding.
    pub fn matches(&self, rel_path: &str) -> bool {
        self.set.is_match(rel_path)
    }
}

/// Build a GlobSet from simple string patterns.
fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        builder.add(glob_for(pat)?);
    }
    Ok(builder.build()?)
}

/// One binding per re-runnable pipeline task among `tasks`, watching the
/// task's sources plus its extra `watch` patterns.
///
/// `Build` tasks and aggregates (no pipeline) are never bound.
pub fn build_bindings(registry: &Registry, tasks: &[TaskName]) -> Result<Vec<WatchBinding>> {
    let mut bindings = Vec::new();

    for name in tasks {
        let Some(task) = registry.get(name) else {
            continue;
        };
        if task.kind == TaskKind::Build {
            continue;
        }
        let Some(pipeline) = &task.pipeline else {
            continue;
        };

        let id = bindings.len();
        bindings.push(WatchBinding::new(id, name.clone(), pipeline.watch_patterns())?);
    }

    Ok(bindings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineSpec;
    use crate::registry::Task;

    #[test]
    fn binding_matches_sources_and_extra_watch_patterns() {
        let binding = WatchBinding::new(0, "css", ["./src/scss/*.scss", "src/scss/partials/**"]).unwrap();

        assert!(binding.matches("src/scss/site.scss"));
        assert!(binding.matches("src/scss/partials/_vars.scss"));
        assert!(!binding.matches("src/scss/nested/site.scss"));
        assert!(!binding.matches("src/js/app.js"));
    }

    #[test]
    fn only_rerunnable_pipeline_tasks_are_bound() {
        let mut registry = Registry::new();
        registry
            .register(Task::new("css").with_pipeline(PipelineSpec::new(["src/scss/*.scss"], "build/css")))
            .unwrap();
        registry
            .register(
                Task::new("html")
                    .with_kind(TaskKind::Build)
                    .with_pipeline(PipelineSpec::new(["index_uncompressed.html"], ".")),
            )
            .unwrap();
        registry
            .register(Task::new("all").with_prerequisites(["css", "html"]))
            .unwrap();

        let names: Vec<TaskName> = vec!["css".into(), "html".into(), "all".into()];
        let bindings = build_bindings(&registry, &names).unwrap();

        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].task(), "css");
        assert_eq!(bindings[0].id(), 0);
    }
}
