// src/watch/mod.rs

//! File watching and change debouncing.
//!
//! This module is responsible for:
//! - Compiling each re-runnable task's source/watch globs into a binding.
//! - Wiring up a cross-platform filesystem watcher (`notify`).
//! - The per-binding debounce/re-run state machine used by the engine.
//!
//! It does **not** know about the DAG; it only turns filesystem changes into
//! binding-level triggers.

pub mod coordinator;
pub mod event_handler;
pub mod path_utils;
pub mod patterns;
pub mod watcher;

pub use coordinator::{BindingState, WatchCoordinator};
pub use patterns::{build_bindings, BindingId, WatchBinding};
pub use watcher::{spawn_watcher, WatcherHandle};
