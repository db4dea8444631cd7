// src/dag/graph.rs

use std::collections::{HashMap, HashSet};

use crate::engine::TaskName;
use crate::errors::{AssetdagError, Result};
use crate::registry::Registry;

/// Prerequisite edges of every registered task, keyed by task name.
///
/// Built without assuming acyclicity; [`execution_order`](Self::execution_order)
/// reports a cycle when it meets one.
#[derive(Debug, Clone)]
pub struct DagGraph {
    prerequisites: HashMap<TaskName, Vec<TaskName>>,
}

impl DagGraph {
    pub fn from_registry(registry: &Registry) -> Self {
        let prerequisites = registry
            .tasks()
            .map(|task| (task.name.clone(), task.prerequisites.clone()))
            .collect();
        Self { prerequisites }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.prerequisites.contains_key(name)
    }

    /// Direct prerequisites of `name`, in declaration order.
    pub fn dependencies_of(&self, name: &str) -> &[TaskName] {
        self.prerequisites
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// `target` and its transitive prerequisites, each after all of its own
    /// prerequisites, ending with `target`.
    ///
    /// Prerequisites are visited depth first in declaration order, so the
    /// result is deterministic.
    pub fn execution_order(&self, target: &str) -> Result<Vec<TaskName>> {
        if !self.contains(target) {
            return Err(AssetdagError::UnknownTask(target.to_string()));
        }

        let mut walk = Walk::default();
        walk.visit(self, target)?;
        Ok(walk.order)
    }
}

#[derive(Default)]
struct Walk {
    order: Vec<TaskName>,
    done: HashSet<TaskName>,
    /// Current DFS path, used to report the cycle itself.
    path: Vec<TaskName>,
}

impl Walk {
    fn visit(&mut self, graph: &DagGraph, name: &str) -> Result<()> {
        if self.done.contains(name) {
            return Ok(());
        }
        if let Some(pos) = self.path.iter().position(|n| n == name) {
            let mut cycle = self.path[pos..].to_vec();
            cycle.push(name.to_string());
            return Err(AssetdagError::CyclicDependency(cycle));
        }

        self.path.push(name.to_string());
        for prereq in graph.dependencies_of(name) {
            if !graph.contains(prereq) {
                return Err(AssetdagError::UnknownPrerequisite {
                    task: name.to_string(),
                    prerequisite: prereq.clone(),
                });
            }
            self.visit(graph, prereq)?;
        }
        self.path.pop();

        self.done.insert(name.to_string());
        self.order.push(name.to_string());
        Ok(())
    }
}
