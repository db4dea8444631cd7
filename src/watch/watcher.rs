// src/watch/watcher.rs

//! `notify` integration.
//!
//! The watcher only forwards matching paths to the runtime; debounce timers
//! live in the [`WatchCoordinator`](super::WatchCoordinator).

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::RuntimeEvent;
use crate::watch::event_handler::process_file_change;
use crate::watch::patterns::WatchBinding;

/// Keeps the OS watcher alive. Watching stops when this is dropped.
pub struct WatcherHandle {
    root: PathBuf,
    _watcher: RecommendedWatcher,
}

impl WatcherHandle {
    /// The canonical directory being watched.
    pub fn root(&self) -> &PathBuf {
        &self.root
    }
}

impl fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherHandle")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

/// Whether an event kind can change what a pipeline would read.
pub fn is_content_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any
    )
}

/// Watch `root` recursively and send `RuntimeEvent::WatchTriggered` for
/// every changed path matching at least one binding.
///
/// The forwarding task ends once the runtime drops its receiver.
pub fn spawn_watcher(
    root: impl Into<PathBuf>,
    bindings: Arc<[WatchBinding]>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> Result<WatcherHandle> {
    let root = root.into();
    let root = root.canonicalize().unwrap_or(root);

    // notify calls back on its own thread; hop onto the runtime via a channel.
    let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<Event>();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if raw_tx.send(event).is_err() {
                    debug!("watch event dropped; forwarder is gone");
                }
            }
            Err(err) => warn!(error = %err, "file watch error"),
        },
        Config::default(),
    )
    .context("creating file watcher")?;

    watcher
        .watch(&root, RecursiveMode::Recursive)
        .with_context(|| format!("watching {}", root.display()))?;
    info!(root = %root.display(), bindings = bindings.len(), "file watcher started");

    let forward_root = root.clone();
    tokio::spawn(async move {
        'events: while let Some(event) = raw_rx.recv().await {
            if !is_content_change(&event.kind) {
                continue;
            }
            debug!(kind = ?event.kind, paths = ?event.paths, "filesystem change");

            for path in &event.paths {
                if !process_file_change(&forward_root, path, &bindings, &runtime_tx).await {
                    break 'events;
                }
            }
        }
        debug!("watch forwarder stopped");
    });

    Ok(WatcherHandle {
        root,
        _watcher: watcher,
    })
}
