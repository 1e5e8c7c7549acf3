//! Workspace file-access abstraction.
//!
//! The indexing pipeline consumes a workspace as an external
//! collaborator: enumerate files, read contents. The filesystem
//! implementation walks with gitignore support and skips dependency
//! caches, build output and VCS internals before anything reaches the
//! extractor.

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::IndexerConfig;

/// File enumeration and read access for one repository snapshot.
pub trait Workspace: Send + Sync {
    /// All candidate file paths, relative to the workspace root.
    fn list_files(&self) -> Vec<PathBuf>;

    /// Read one file's content as UTF-8.
    fn read_file(&self, path: &Path) -> Result<String>;
}

/// Filesystem workspace rooted at a directory.
pub struct FsWorkspace {
    root: PathBuf,
    deny_dirs: Vec<String>,
    deny_extensions: Vec<String>,
}

impl FsWorkspace {
    pub fn new(root: PathBuf, config: &IndexerConfig) -> Self {
        Self {
            root,
            deny_dirs: config.deny_dirs.clone(),
            deny_extensions: config.deny_extensions.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_denied(&self, path: &Path) -> bool {
        for component in path.components() {
            let name = component.as_os_str().to_string_lossy();
            if self.deny_dirs.iter().any(|d| d == name.as_ref()) {
                return true;
            }
        }
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            let ext = ext.to_ascii_lowercase();
            if self.deny_extensions.iter().any(|d| d == &ext) {
                return true;
            }
        }
        false
    }
}

impl Workspace for FsWorkspace {
    fn list_files(&self) -> Vec<PathBuf> {
        let mut builder = WalkBuilder::new(&self.root);
        builder.git_ignore(true);
        builder.git_global(true);
        builder.git_exclude(true);
        builder.hidden(true);

        let mut files: Vec<PathBuf> = builder
            .build()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|ft| ft.is_file()).unwrap_or(false))
            .filter_map(|entry| {
                entry
                    .path()
                    .strip_prefix(&self.root)
                    .ok()
                    .map(|p| p.to_path_buf())
            })
            .filter(|path| !self.is_denied(path))
            .collect();

        files.sort();
        files
    }

    fn read_file(&self, path: &Path) -> Result<String> {
        let full = self.root.join(path);
        std::fs::read_to_string(&full)
            .with_context(|| format!("Failed to read file {:?}", full))
    }
}

/// In-memory workspace over `(path, content)` pairs.
///
/// Used by tests and by library callers that already hold file
/// contents (e.g. a snapshot fetched from elsewhere).
#[derive(Debug, Default, Clone)]
pub struct MemoryWorkspace {
    files: BTreeMap<PathBuf, String>,
}

impl MemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.files.insert(path.into(), content.into());
    }
}

impl Workspace for MemoryWorkspace {
    fn list_files(&self) -> Vec<PathBuf> {
        self.files.keys().cloned().collect()
    }

    fn read_file(&self, path: &Path) -> Result<String> {
        self.files
            .get(path)
            .cloned()
            .with_context(|| format!("No such file in workspace: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_fs_workspace_lists_files() {
        let dir = tempdir().unwrap();
        let src_dir = dir.path().join("src");
        fs::create_dir_all(&src_dir).unwrap();

        fs::write(src_dir.join("main.rs"), "fn main() {}").unwrap();
        fs::write(dir.path().join("readme.md"), "# Readme").unwrap();

        let ws = FsWorkspace::new(dir.path().to_path_buf(), &IndexerConfig::default());
        let files = ws.list_files();

        assert!(files.contains(&PathBuf::from("src/main.rs")));
        assert!(files.contains(&PathBuf::from("readme.md")));
    }

    #[test]
    fn test_fs_workspace_denies_dirs_and_extensions() {
        let dir = tempdir().unwrap();
        let node_modules = dir.path().join("node_modules");
        fs::create_dir_all(&node_modules).unwrap();

        fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();
        fs::write(node_modules.join("pkg.js"), "module.exports = {}").unwrap();
        fs::write(dir.path().join("logo.png"), [0u8, 1, 2]).unwrap();

        let ws = FsWorkspace::new(dir.path().to_path_buf(), &IndexerConfig::default());
        let files = ws.list_files();

        assert_eq!(files, vec![PathBuf::from("main.rs")]);
    }

    #[test]
    fn test_memory_workspace_roundtrip() {
        let mut ws = MemoryWorkspace::new();
        ws.insert("a.rs", "fn a() {}");

        assert_eq!(ws.list_files(), vec![PathBuf::from("a.rs")]);
        assert_eq!(ws.read_file(Path::new("a.rs")).unwrap(), "fn a() {}");
        assert!(ws.read_file(Path::new("missing.rs")).is_err());
    }
}
