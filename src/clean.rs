// src/clean.rs

//! Removal of configured output paths.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::errors::CleanupError;
use crate::fs::FileSystem;

/// Remove every path in `paths` (relative to `root`).
///
/// Missing paths are skipped. A path that cannot be removed is recorded and
/// the remaining paths are still attempted; the collected failures are
/// returned together as a [`CleanupError`].
///
/// On success, returns the paths that were actually removed.
pub fn clean<S: AsRef<str>>(
    fs: &dyn FileSystem,
    root: &Path,
    paths: &[S],
) -> Result<Vec<PathBuf>, CleanupError> {
    let mut removed = Vec::new();
    let mut failures = Vec::new();

    for rel in paths {
        let rel = rel.as_ref();
        let path = root.join(rel);

        if !fs.exists(&path) {
            debug!(path = ?path, "nothing to clean");
            continue;
        }

        match fs.remove(&path) {
            Ok(()) => {
                info!(path = ?path, "removed");
                removed.push(path);
            }
            Err(err) => {
                warn!(path = ?path, error = %format!("{err:#}"), "could not remove");
                failures.push((path, format!("{err:#}")));
            }
        }
    }

    if failures.is_empty() {
        Ok(removed)
    } else {
        Err(CleanupError { failures })
    }
}
