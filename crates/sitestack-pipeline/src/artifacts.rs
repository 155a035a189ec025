//! Named artifact directories for one pipeline run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use walkdir::WalkDir;

use crate::error::{PipelineError, Result};

/// Artifacts live under one run directory, one subdirectory each.
#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
    produced: Mutex<BTreeMap<String, PathBuf>>,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            produced: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fresh scratch directory for an action.
    pub fn scratch(&self, name: &str) -> Result<PathBuf> {
        let dir = self.root.join("work").join(name);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Record `dir` as the content of artifact `name`.
    pub fn register(&self, name: &str, dir: PathBuf) {
        self.lock().insert(name.to_string(), dir);
    }

    pub fn get(&self, name: &str) -> Result<PathBuf> {
        self.lock()
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::ArtifactMissing(name.to_string()))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, PathBuf>> {
        self.produced
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Copy every file under `src` into `dst`, keeping relative paths. Entries
/// whose first component is in `skip` are left out.
pub fn copy_tree(src: &Path, dst: &Path, skip: &[&str]) -> Result<usize> {
    let mut copied = 0;
    let walker = WalkDir::new(src).into_iter().filter_entry(|entry| {
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        match rel.components().next() {
            Some(first) => !skip.iter().any(|s| first.as_os_str() == *s),
            None => true,
        }
    });
    for entry in walker {
        let entry = entry.map_err(|e| PipelineError::Io(e.into()))?;
        let rel = match entry.path().strip_prefix(src) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel,
            _ => continue,
        };
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}
