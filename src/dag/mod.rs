// src/dag/mod.rs

//! Planning and running the task graph.
//!
//! [`Scheduler`] plans a run from its targets' prerequisite closure and
//! releases tasks as their prerequisites succeed, within the parallelism
//! cap and without two tasks writing into overlapping destinations.

pub mod graph;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod task_info;

pub use graph::DagGraph;
pub use scheduler::Scheduler;
pub use scheduler_step::{RunFailure, RunSummary, SchedulerStep};
pub use task_info::{ScheduledTask, TaskRunState};
