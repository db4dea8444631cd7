// src/watch/path_utils.rs

//! Root-relative, forward-slash path strings.
//!
//! Both the source expander and the watcher match globs against these, so a
//! pattern like `src/scss/*.scss` means the same thing in `run` and `watch`.

use std::path::{Component, Path};

/// `path` relative to `root`, joined with `/`, with `.` components dropped.
///
/// Purely lexical; never touches the filesystem. Returns `None` if `path`
/// is not under `root`.
pub fn lexical_relative(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect();
    Some(parts.join("/"))
}

/// Like [`lexical_relative`], but retries on canonicalized paths.
///
/// Watcher events may carry a different absolute prefix than the root we
/// were given (symlinked temp dirs, `/private/var` on macOS). The retry only
/// works for paths that still exist.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    if let Some(rel) = lexical_relative(root, path) {
        return Some(rel);
    }

    let root = root.canonicalize().ok()?;
    let path = path.canonicalize().ok()?;
    lexical_relative(&root, &path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_components_with_forward_slashes() {
        let rel = lexical_relative(Path::new("/proj"), Path::new("/proj/src/scss/site.scss"));
        assert_eq!(rel.as_deref(), Some("src/scss/site.scss"));
    }

    #[test]
    fn drops_cur_dir_components() {
        let rel = lexical_relative(Path::new("."), Path::new("./src/./js/app.js"));
        assert_eq!(rel.as_deref(), Some("src/js/app.js"));
    }

    #[test]
    fn paths_outside_root_are_rejected() {
        assert_eq!(lexical_relative(Path::new("/proj"), Path::new("/other/a.js")), None);
        assert_eq!(relative_str(Path::new("/proj-does-not-exist"), Path::new("/nope/a.js")), None);
    }
}
