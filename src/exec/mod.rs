// src/exec/mod.rs

//! Task execution.
//!
//! [`backend::PipelineBackend`] starts one Tokio task per scheduled task;
//! [`task_runner::run_task`] runs it through the pipeline executor and
//! reports back with `RuntimeEvent::TaskCompleted`.

pub mod backend;
pub mod task_runner;

pub use backend::{DispatchFuture, ExecutorBackend, PipelineBackend};
