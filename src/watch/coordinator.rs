// src/watch/coordinator.rs

//! Debounce/re-run state machine for watch bindings.
//!
//! Each binding moves through `Idle -> Debouncing -> Running -> Idle`:
//!
//! - A change while `Idle` starts the debounce timer; further changes while
//!   `Debouncing` restart it without adding runs.
//! - When the timer expires the binding becomes `Running` but not yet in
//!   flight. The engine starts one run for every such binding as soon as
//!   no other run is active.
//! - A change while the binding's run is in flight sets a single pending
//!   re-run flag. When the run finishes the binding either becomes due
//!   again (flag set) or returns to `Idle`.
//!
//! Time is passed in explicitly, so the coordinator is fully deterministic.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::engine::TaskName;

use super::patterns::{BindingId, WatchBinding};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    Idle,
    Debouncing {
        deadline: Instant,
    },
    Running {
        /// The scheduler is executing this binding's task right now.
        in_flight: bool,
        /// A change arrived while in flight.
        rerun_pending: bool,
    },
}

#[derive(Debug)]
pub struct WatchCoordinator {
    bindings: Arc<[WatchBinding]>,
    states: Vec<BindingState>,
    debounce: Duration,
}

impl WatchCoordinator {
    pub fn new(bindings: Arc<[WatchBinding]>, debounce: Duration) -> Self {
        let states = vec![BindingState::Idle; bindings.len()];
        Self {
            bindings,
            states,
            debounce,
        }
    }

    /// A coordinator with nothing to watch.
    pub fn empty() -> Self {
        Self::new(Arc::from(Vec::new()), Duration::ZERO)
    }

    pub fn bindings(&self) -> &Arc<[WatchBinding]> {
        &self.bindings
    }

    pub fn state_of(&self, id: BindingId) -> Option<BindingState> {
        self.states.get(id).copied()
    }

    /// Record a change event for a binding.
    pub fn on_change(&mut self, id: BindingId, now: Instant) {
        let Some(state) = self.states.get_mut(id) else {
            return;
        };

        *state = match *state {
            BindingState::Idle | BindingState::Debouncing { .. } => BindingState::Debouncing {
                deadline: now + self.debounce,
            },
            BindingState::Running {
                in_flight: true, ..
            } => BindingState::Running {
                in_flight: true,
                rerun_pending: true,
            },
            // Already due; the next run will pick this change up.
            due @ BindingState::Running {
                in_flight: false, ..
            } => due,
        };
        debug!(binding = id, state = ?state, "watch change recorded");
    }

    /// Earliest pending debounce deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.states
            .iter()
            .filter_map(|s| match s {
                BindingState::Debouncing { deadline } => Some(*deadline),
                _ => None,
            })
            .min()
    }

    /// Move every binding whose quiet period has elapsed to `Running` (due).
    ///
    /// Returns the bindings that became due.
    pub fn expire(&mut self, now: Instant) -> Vec<BindingId> {
        let mut due = Vec::new();
        for (id, state) in self.states.iter_mut().enumerate() {
            if let BindingState::Debouncing { deadline } = *state {
                if deadline <= now {
                    *state = BindingState::Running {
                        in_flight: false,
                        rerun_pending: false,
                    };
                    due.push(id);
                }
            }
        }
        due
    }

    /// Whether any binding is waiting for a run to start.
    pub fn has_due(&self) -> bool {
        self.states.iter().any(|s| {
            matches!(
                s,
                BindingState::Running {
                    in_flight: false,
                    ..
                }
            )
        })
    }

    /// Mark every due binding as in flight and return their tasks.
    pub fn take_due(&mut self) -> Vec<TaskName> {
        let mut tasks: Vec<TaskName> = Vec::new();
        for (id, state) in self.states.iter_mut().enumerate() {
            if let BindingState::Running {
                in_flight: false, ..
            } = *state
            {
                *state = BindingState::Running {
                    in_flight: true,
                    rerun_pending: false,
                };
                let task = self.bindings[id].task();
                if !tasks.iter().any(|t| t == task) {
                    tasks.push(task.to_string());
                }
            }
        }
        tasks
    }

    /// The run started by [`take_due`](Self::take_due) finished, whatever
    /// its outcome.
    pub fn on_run_finished(&mut self) {
        for state in self.states.iter_mut() {
            if let BindingState::Running {
                in_flight: true,
                rerun_pending,
            } = *state
            {
                *state = if rerun_pending {
                    BindingState::Running {
                        in_flight: false,
                        rerun_pending: false,
                    }
                } else {
                    BindingState::Idle
                };
            }
        }
    }

    pub fn is_quiet(&self) -> bool {
        self.states.iter().all(|s| *s == BindingState::Idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator() -> WatchCoordinator {
        let bindings = vec![
            WatchBinding::new(0, "css", ["src/scss/*.scss"]).unwrap(),
            WatchBinding::new(1, "js", ["src/js/*.js"]).unwrap(),
        ];
        WatchCoordinator::new(Arc::from(bindings), Duration::from_millis(100))
    }

    #[test]
    fn change_during_debounce_restarts_timer() {
        let mut c = coordinator();
        let t0 = Instant::now();

        c.on_change(0, t0);
        c.on_change(0, t0 + Duration::from_millis(60));

        assert!(c.expire(t0 + Duration::from_millis(120)).is_empty());
        assert_eq!(c.next_deadline(), Some(t0 + Duration::from_millis(160)));
        assert_eq!(c.expire(t0 + Duration::from_millis(160)), vec![0]);
        assert_eq!(c.take_due(), vec!["css".to_string()]);
    }

    #[test]
    fn completion_without_pending_change_returns_to_idle() {
        let mut c = coordinator();
        let t0 = Instant::now();

        c.on_change(1, t0);
        c.expire(t0 + Duration::from_millis(100));
        c.take_due();
        c.on_run_finished();

        assert_eq!(c.state_of(1), Some(BindingState::Idle));
        assert!(c.is_quiet());
    }

    #[test]
    fn due_binding_ignores_further_changes() {
        let mut c = coordinator();
        let t0 = Instant::now();

        c.on_change(0, t0);
        c.expire(t0 + Duration::from_millis(100));
        c.on_change(0, t0 + Duration::from_millis(150));

        assert_eq!(
            c.state_of(0),
            Some(BindingState::Running {
                in_flight: false,
                rerun_pending: false
            })
        );
        assert_eq!(c.next_deadline(), None);
    }
}
