use super::FileSystem;
use anyhow::{Result, anyhow};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File(Vec<u8>),
    Dir(Vec<String>), // List of child names
}

#[derive(Debug, Default)]
struct MockState {
    entries: HashMap<PathBuf, MockEntry>,
    /// Paths whose removal fails, e.g. to simulate permission errors.
    locked: HashSet<PathBuf>,
}

/// In-memory filesystem for deterministic tests.
///
/// Paths are compared verbatim, so tests should use the same prefix style
/// throughout (e.g. root `"."` with files added as `"./src/a.scss"`).
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    state: Arc<Mutex<MockState>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        let mut state = MockState::default();
        // Ensure root exists
        state
            .entries
            .insert(PathBuf::from("."), MockEntry::Dir(Vec::new()));

        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = path.as_ref().to_path_buf();
        let mut state = self.lock();
        state
            .entries
            .insert(path.clone(), MockEntry::File(content.into()));
        link_into_parent(&mut state.entries, &path);
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        let mut state = self.lock();
        ensure_dir_entry(&mut state.entries, &path);
    }

    /// Make every future removal of `path` fail.
    pub fn lock_path(&self, path: impl AsRef<Path>) {
        self.lock().locked.insert(path.as_ref().to_path_buf());
    }

    /// Contents of a file, if present.
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        match self.lock().entries.get(path.as_ref()) {
            Some(MockEntry::File(content)) => Some(content.clone()),
            _ => None,
        }
    }

    fn remove_entry(&self, path: &Path, recursive: bool) -> Result<()> {
        let mut state = self.lock();
        if state.locked.contains(path) {
            return Err(anyhow!("Permission denied: {:?}", path));
        }
        match state.entries.get(path) {
            None => return Err(anyhow!("File not found: {:?}", path)),
            Some(MockEntry::Dir(_)) if !recursive => {
                return Err(anyhow!("Is a directory: {:?}", path));
            }
            _ => {}
        }

        let doomed: Vec<PathBuf> = state
            .entries
            .keys()
            .filter(|p| p.starts_with(path))
            .cloned()
            .collect();
        for p in doomed {
            state.entries.remove(&p);
        }

        if let (Some(parent), Some(name)) = (parent_of(path), path.file_name()) {
            if let Some(MockEntry::Dir(children)) = state.entries.get_mut(&parent) {
                let name = name.to_string_lossy();
                children.retain(|c| *c != name);
            }
        }
        Ok(())
    }
}

fn parent_of(path: &Path) -> Option<PathBuf> {
    let parent = path.parent()?;
    if parent.as_os_str().is_empty() {
        Some(PathBuf::from("."))
    } else {
        Some(parent.to_path_buf())
    }
}

fn link_into_parent(entries: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
    let Some(parent) = parent_of(path) else {
        return;
    };
    if parent == path {
        return;
    }
    ensure_dir_entry(entries, &parent);
    if let Some(MockEntry::Dir(children)) = entries.get_mut(&parent) {
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if !children.iter().any(|c| c == name) {
                children.push(name.to_string());
            }
        }
    }
}

fn ensure_dir_entry(entries: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
    if !entries.contains_key(path) {
        entries.insert(path.to_path_buf(), MockEntry::Dir(Vec::new()));
        link_into_parent(entries, path);
    }
}

impl FileSystem for MockFileSystem {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        match self.lock().entries.get(path) {
            Some(MockEntry::File(content)) => Ok(content.clone()),
            Some(MockEntry::Dir(_)) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.add_file(path, contents);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.lock().entries.contains_key(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(self.lock().entries.get(path), Some(MockEntry::File(_)))
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.lock().entries.get(path), Some(MockEntry::Dir(_)))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        match self.lock().entries.get(path) {
            Some(MockEntry::Dir(children)) => {
                Ok(children.iter().map(|name| path.join(name)).collect())
            }
            _ => Err(anyhow!("Not a directory or not found: {:?}", path)),
        }
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.remove_entry(path, false)
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        self.remove_entry(path, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_files_create_parent_dirs() {
        let fs = MockFileSystem::new();
        fs.add_file("./build/css/a.css", b"a".to_vec());

        assert!(fs.is_dir(Path::new("./build")));
        assert!(fs.is_dir(Path::new("./build/css")));
        assert_eq!(
            fs.read_dir(Path::new(".")).unwrap(),
            vec![PathBuf::from("./build")]
        );
    }

    #[test]
    fn remove_dir_all_drops_children_and_unlinks() {
        let fs = MockFileSystem::new();
        fs.add_file("./build/css/a.css", b"a".to_vec());
        fs.add_file("./build/js/b.js", b"b".to_vec());

        fs.remove_dir_all(Path::new("./build/css")).unwrap();

        assert!(!fs.exists(Path::new("./build/css/a.css")));
        assert!(fs.exists(Path::new("./build/js/b.js")));
        assert_eq!(
            fs.read_dir(Path::new("./build")).unwrap(),
            vec![PathBuf::from("./build/js")]
        );
    }

    #[test]
    fn locked_paths_refuse_removal() {
        let fs = MockFileSystem::new();
        fs.add_file("./index.html", b"<p>".to_vec());
        fs.lock_path("./index.html");

        assert!(fs.remove_file(Path::new("./index.html")).is_err());
        assert!(fs.exists(Path::new("./index.html")));
    }

    #[test]
    fn walk_files_lists_nested_files_sorted() {
        let fs = MockFileSystem::new();
        fs.add_file("./src/js/ui/b.js", b"b".to_vec());
        fs.add_file("./src/js/app.js", b"a".to_vec());
        fs.add_dir("./src/js/empty");

        assert_eq!(
            fs.walk_files(Path::new("./src/js")).unwrap(),
            vec![PathBuf::from("./src/js/app.js"), PathBuf::from("./src/js/ui/b.js")]
        );
    }
}
