// src/watch/event_handler.rs

//! Event processing logic for file system changes.

use std::path::Path;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::engine::RuntimeEvent;
use crate::watch::path_utils::relative_str;
use crate::watch::patterns::{BindingId, WatchBinding};

/// Ids of every binding whose patterns match the root-relative path.
pub fn matching_bindings(bindings: &[WatchBinding], rel_path: &str) -> Vec<BindingId> {
    bindings
        .iter()
        .filter(|b| b.matches(rel_path))
        .map(WatchBinding::id)
        .collect()
}

/// Process a single file change event.
///
/// Relativizes the path against `root`, finds the bindings it touches and
/// forwards one `WatchTriggered` event to the runtime. Paths that match
/// nothing are dropped here so the runtime only sees relevant changes.
///
/// Returns `false` once the runtime channel is closed.
pub async fn process_file_change(
    root: &Path,
    path: &Path,
    bindings: &[WatchBinding],
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
) -> bool {
    let rel_str = match relative_str(root, path) {
        Some(s) => s,
        None => {
            warn!(
                "could not relativize path {:?} against root {:?}",
                path, root
            );
            return true;
        }
    };

    let ids = matching_bindings(bindings, &rel_str);
    if ids.is_empty() {
        return true;
    }

    debug!(rel = %rel_str, bindings = ?ids, "watch match");

    if let Err(err) = runtime_tx
        .send(RuntimeEvent::WatchTriggered {
            bindings: ids,
            path: rel_str,
        })
        .await
    {
        warn!("failed to send RuntimeEvent::WatchTriggered: {err}");
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn bindings() -> Vec<WatchBinding> {
        vec![
            WatchBinding::new(0, "css", ["src/scss/*.scss"]).unwrap(),
            WatchBinding::new(1, "js", ["src/js/*.js"]).unwrap(),
            WatchBinding::new(2, "lint", ["src/**/*"]).unwrap(),
        ]
    }

    #[test]
    fn a_path_can_match_several_bindings() {
        let b = bindings();
        assert_eq!(matching_bindings(&b, "src/js/app.js"), vec![1, 2]);
        assert!(matching_bindings(&b, "README.md").is_empty());
    }

    #[tokio::test]
    async fn only_matching_paths_reach_the_runtime() {
        let (tx, mut rx) = mpsc::channel(8);
        let root = PathBuf::from("/project");
        let b = bindings();

        assert!(process_file_change(&root, Path::new("/project/README.md"), &b, &tx).await);
        assert!(process_file_change(&root, Path::new("/project/src/scss/site.scss"), &b, &tx).await);
        drop(tx);

        match rx.recv().await {
            Some(RuntimeEvent::WatchTriggered { bindings, path }) => {
                assert_eq!(bindings, vec![0, 2]);
                assert_eq!(path, "src/scss/site.scss");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(rx.recv().await.is_none());
    }
}
