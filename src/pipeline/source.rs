// src/pipeline/source.rs

//! Source selection: resolve a task's glob patterns to concrete files.
//!
//! Every pattern has a *base*: its literal directory prefix before the first
//! component containing a glob metacharacter. Selected files keep their path
//! relative to that base, which is also where they land under the
//! destination directory. `src/js/**/*.js` has base `src/js`, so
//! `src/js/ui/menu.js` is written as `<dest>/ui/menu.js`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use globset::{Glob, GlobBuilder, GlobMatcher};

use crate::fs::FileSystem;
use crate::watch::path_utils::lexical_relative;

const GLOB_META: &[char] = &['*', '?', '[', '{'];

/// A file selected by a task's source patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Location on disk (root-joined).
    pub path: PathBuf,
    /// Path relative to the pattern's base directory.
    pub rel_path: PathBuf,
}

/// Strip a leading `./` so patterns compare equal to root-relative paths.
pub fn normalize_pattern(pattern: &str) -> &str {
    let mut p = pattern;
    while let Some(rest) = p.strip_prefix("./") {
        p = rest;
    }
    p
}

/// Compile a pattern the way both source selection and the watcher
/// interpret it: `*` never crosses a `/`, `**` does.
pub fn glob_for(pattern: &str) -> Result<Glob> {
    GlobBuilder::new(normalize_pattern(pattern))
        .literal_separator(true)
        .build()
        .with_context(|| format!("invalid glob pattern: {pattern}"))
}

fn is_glob(component: &str) -> bool {
    component.contains(GLOB_META)
}

/// Literal directory prefix of a pattern, and whether the pattern names a
/// single literal file.
pub fn pattern_base(pattern: &str) -> (PathBuf, bool) {
    let pattern = normalize_pattern(pattern);
    let components: Vec<&str> = pattern.split('/').filter(|c| !c.is_empty()).collect();

    match components.iter().position(|c| is_glob(c)) {
        Some(first_glob) => (components[..first_glob].iter().collect(), false),
        None => {
            let parent = components
                .split_last()
                .map(|(_, dirs)| dirs.iter().collect())
                .unwrap_or_default();
            (parent, true)
        }
    }
}

fn join_base(root: &Path, base: &Path) -> PathBuf {
    if base.as_os_str().is_empty() {
        root.to_path_buf()
    } else {
        root.join(base)
    }
}

/// Resolve `patterns` against `root`.
///
/// Files are returned in pattern order, then sorted by path within each
/// pattern; a file matched by several patterns is kept only the first time.
///
/// A pattern whose base directory does not exist, or a literal file pattern
/// naming a missing file, is an error.
pub fn select_sources(
    fs: &dyn FileSystem,
    root: &Path,
    patterns: &[String],
) -> Result<Vec<SourceFile>> {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut selected = Vec::new();

    for pattern in patterns {
        let (base, literal) = pattern_base(pattern);
        let base_dir = join_base(root, &base);

        let mut matched = if literal {
            let path = root.join(normalize_pattern(pattern));
            if !fs.is_file(&path) {
                return Err(anyhow!("source file '{pattern}' does not exist"));
            }
            vec![path]
        } else {
            if !fs.is_dir(&base_dir) {
                return Err(anyhow!(
                    "source directory '{}' for pattern '{pattern}' does not exist",
                    base.display()
                ));
            }
            let matcher = glob_for(pattern)?.compile_matcher();
            walk_matching(fs, root, &base_dir, &matcher)?
        };

        matched.sort();
        for path in matched {
            if !seen.insert(path.clone()) {
                continue;
            }
            let rel_path = path
                .strip_prefix(&base_dir)
                .map(Path::to_path_buf)
                .with_context(|| format!("{path:?} is outside base {base_dir:?}"))?;
            selected.push(SourceFile { path, rel_path });
        }
    }

    Ok(selected)
}

fn walk_matching(
    fs: &dyn FileSystem,
    root: &Path,
    base_dir: &Path,
    matcher: &GlobMatcher,
) -> Result<Vec<PathBuf>> {
    let files = fs
        .walk_files(base_dir)?
        .into_iter()
        .filter(|path| {
            lexical_relative(root, path).is_some_and(|rel| matcher.is_match(&rel))
        })
        .collect();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    fn rels(files: &[SourceFile]) -> Vec<String> {
        files
            .iter()
            .map(|f| f.rel_path.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn base_is_literal_prefix() {
        assert_eq!(pattern_base("src/js/**/*.js"), (PathBuf::from("src/js"), false));
        assert_eq!(pattern_base("./src/scss/*.scss"), (PathBuf::from("src/scss"), false));
        assert_eq!(pattern_base("*.html"), (PathBuf::new(), false));
        assert_eq!(
            pattern_base("index_uncompressed.html"),
            (PathBuf::new(), true)
        );
        assert_eq!(pattern_base("src/img/logo.png"), (PathBuf::from("src/img"), true));
    }

    #[test]
    fn star_does_not_cross_directories() {
        let fs = MockFileSystem::new();
        fs.add_file("./src/scss/site.scss", b"a".to_vec());
        fs.add_file("./src/scss/partials/_x.scss", b"b".to_vec());

        let files = select_sources(&fs, Path::new("."), &["src/scss/*.scss".to_string()]).unwrap();
        assert_eq!(rels(&files), vec!["site.scss"]);

        let files = select_sources(&fs, Path::new("."), &["src/scss/**/*.scss".to_string()]).unwrap();
        assert_eq!(rels(&files), vec!["partials/_x.scss", "site.scss"]);
    }

    #[test]
    fn pattern_order_then_sorted_paths_without_duplicates() {
        let fs = MockFileSystem::new();
        fs.add_file("./src/js/vendor/jquery.js", b"".to_vec());
        fs.add_file("./src/js/b.js", b"".to_vec());
        fs.add_file("./src/js/a.js", b"".to_vec());

        let patterns = vec![
            "src/js/vendor/*.js".to_string(),
            "src/js/**/*.js".to_string(),
        ];
        let files = select_sources(&fs, Path::new("."), &patterns).unwrap();
        assert_eq!(rels(&files), vec!["jquery.js", "a.js", "b.js"]);
    }

    #[test]
    fn missing_base_directory_is_an_error() {
        let fs = MockFileSystem::new();
        let err = select_sources(&fs, Path::new("."), &["src/img/*".to_string()]).unwrap_err();
        assert!(err.to_string().contains("src/img"));
    }

    #[test]
    fn literal_file_pattern() {
        let fs = MockFileSystem::new();
        fs.add_file("./index_uncompressed.html", b"<p>".to_vec());

        let files = select_sources(&fs, Path::new("."), &["index_uncompressed.html".to_string()]).unwrap();
        assert_eq!(rels(&files), vec!["index_uncompressed.html"]);

        assert!(select_sources(&fs, Path::new("."), &["missing.html".to_string()]).is_err());
    }
}
