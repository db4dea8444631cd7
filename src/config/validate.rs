// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile, effective_dest, effective_sources};
use crate::errors::{AssetdagError, Result};
use crate::pipeline::source::glob_for;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = AssetdagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

pub fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_global_config(cfg)?;
    validate_groups(cfg)?;
    validate_task_dependencies(cfg)?;
    validate_dag(cfg)?;
    validate_pipelines(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(AssetdagError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    let section = &cfg.config;

    if section.max_parallel_tasks == 0 {
        return Err(AssetdagError::ConfigError(
            "[config].max_parallel_tasks must be >= 1 (got 0)".to_string(),
        ));
    }
    if section.max_parallel_files == 0 {
        return Err(AssetdagError::ConfigError(
            "[config].max_parallel_files must be >= 1 (got 0)".to_string(),
        ));
    }
    section
        .debounce_duration()
        .map_err(|e| AssetdagError::ConfigError(format!("[config].debounce: {e}")))?;
    if section.cache_dir.trim().is_empty() {
        return Err(AssetdagError::ConfigError(
            "[config].cache_dir must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_groups(cfg: &RawConfigFile) -> Result<()> {
    for (name, group) in cfg.group.iter() {
        if group.src.is_empty() {
            return Err(AssetdagError::ConfigError(format!(
                "group '{name}' has no `src` patterns"
            )));
        }
        check_globs(&format!("group '{name}'"), &group.src)?;
    }
    Ok(())
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if dep == name {
                return Err(AssetdagError::CyclicDependency(vec![name.clone(), name.clone()]));
            }
            if !cfg.task.contains_key(dep) {
                return Err(AssetdagError::UnknownPrerequisite {
                    task: name.clone(),
                    prerequisite: dep.clone(),
                });
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: task -> prerequisite. For
    //   [task.B]
    //   after = ["A"]
    // we add edge B -> A.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.task.keys() {
        graph.add_node(name.as_str());
    }

    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            graph.add_edge(name.as_str(), dep.as_str(), ());
        }
    }

    // A topological sort will fail if there is a cycle.
    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(AssetdagError::CyclicDependency(cycle_through(
            &graph,
            cycle.node_id(),
        ))),
    }
}

/// Recover a concrete cycle passing through `start` (which toposort reported
/// as part of one), e.g. `["a", "b", "a"]`.
fn cycle_through<'a>(graph: &DiGraphMap<&'a str, ()>, start: &'a str) -> Vec<String> {
    let mut path = vec![start];
    let mut visited = std::collections::HashSet::new();

    fn dfs<'a>(
        graph: &DiGraphMap<&'a str, ()>,
        start: &'a str,
        node: &'a str,
        path: &mut Vec<&'a str>,
        visited: &mut std::collections::HashSet<&'a str>,
    ) -> bool {
        for next in graph.neighbors(node) {
            if next == start {
                path.push(next);
                return true;
            }
            if visited.insert(next) {
                path.push(next);
                if dfs(graph, start, next, path, visited) {
                    return true;
                }
                path.pop();
            }
        }
        false
    }

    if !dfs(graph, start, start, &mut path, &mut visited) {
        path.push(start);
    }
    path.into_iter().map(str::to_string).collect()
}

fn validate_pipelines(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        if let Some(group) = &task.group {
            if !cfg.group.contains_key(group) {
                return Err(AssetdagError::ConfigError(format!(
                    "task '{name}' references unknown group '{group}'"
                )));
            }
        }

        let sources = effective_sources(&cfg.group, task);
        if sources.is_empty() {
            if !task.steps.is_empty() {
                return Err(AssetdagError::ConfigError(format!(
                    "task '{name}' has steps but no sources (set `src` or `group`)"
                )));
            }
        } else if effective_dest(&cfg.group, task).is_none() {
            return Err(AssetdagError::ConfigError(format!(
                "task '{name}' has sources but no `dest`"
            )));
        }

        check_globs(&format!("task '{name}'"), &sources)?;
        check_globs(&format!("task '{name}' watch"), &task.watch)?;

        for (i, step) in task.steps.iter().enumerate() {
            step.validate().map_err(|e| {
                AssetdagError::ConfigError(format!(
                    "task '{name}' step {i} ({}): {e}",
                    step.name()
                ))
            })?;
        }
    }
    Ok(())
}

fn check_globs(owner: &str, patterns: &[String]) -> Result<()> {
    for pattern in patterns {
        glob_for(pattern).map_err(|e| AssetdagError::ConfigError(format!("{owner}: {e:#}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::TaskConfig;

    fn task_after(deps: &[&str]) -> TaskConfig {
        TaskConfig {
            after: deps.iter().map(|d| d.to_string()).collect(),
            ..TaskConfig::default()
        }
    }

    #[test]
    fn cycle_is_reported_as_a_path() {
        let mut raw = RawConfigFile::default();
        raw.task.insert("a".into(), task_after(&["b"]));
        raw.task.insert("b".into(), task_after(&["c"]));
        raw.task.insert("c".into(), task_after(&["a"]));

        match ConfigFile::try_from(raw) {
            Err(AssetdagError::CyclicDependency(path)) => {
                assert_eq!(path.len(), 4);
                assert_eq!(path.first(), path.last());
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut raw = RawConfigFile::default();
        raw.task.insert("a".into(), task_after(&["a"]));
        assert!(matches!(
            ConfigFile::try_from(raw),
            Err(AssetdagError::CyclicDependency(_))
        ));
    }
}
