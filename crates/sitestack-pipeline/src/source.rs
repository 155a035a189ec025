//! Source repositories the pipeline fetches from.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sitestack_core::content::{collect_objects, digest_objects};

use crate::artifacts::copy_tree;
use crate::error::{PipelineError, Result};

/// What a fetch produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRevision {
    /// Content digest of the fetched tree
    pub revision: String,
    pub files: usize,
}

/// A repository branch that can be materialised into a directory.
#[async_trait]
pub trait SourceRepository: Send + Sync {
    async fn fetch(&self, owner: &str, repo: &str, branch: &str, dest: &Path)
        -> Result<SourceRevision>;
}

/// Serves checkouts from a local directory.
///
/// `root/<owner>/<repo>` is used when it exists, otherwise `root` itself.
/// The branch is not interpreted.
#[derive(Debug, Clone)]
pub struct LocalSource {
    root: PathBuf,
}

impl LocalSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn checkout_dir(&self, owner: &str, repo: &str) -> PathBuf {
        let nested = self.root.join(owner).join(repo);
        if nested.is_dir() {
            nested
        } else {
            self.root.clone()
        }
    }
}

#[async_trait]
impl SourceRepository for LocalSource {
    async fn fetch(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        dest: &Path,
    ) -> Result<SourceRevision> {
        let checkout = self.checkout_dir(owner, repo);
        if !checkout.is_dir() {
            return Err(PipelineError::Source {
                owner: owner.to_string(),
                repo: repo.to_string(),
                branch: branch.to_string(),
                reason: format!("{} is not a directory", checkout.display()),
            });
        }

        let (checkout, dest) = (checkout, dest.to_path_buf());
        tokio::task::spawn_blocking(move || -> Result<SourceRevision> {
            let files = copy_tree(&checkout, &dest, &[".git"])?;
            let objects = collect_objects(&dest)
                .map_err(|e| PipelineError::Io(std::io::Error::other(e.to_string())))?;
            Ok(SourceRevision {
                revision: digest_objects(&objects).short().to_string(),
                files,
            })
        })
        .await
        .map_err(|e| PipelineError::Io(std::io::Error::other(e.to_string())))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_fetch_prefers_owner_repo_layout() {
        let root = tempdir().unwrap();
        let repo = root.path().join("octo/blog");
        std::fs::create_dir_all(&repo).unwrap();
        std::fs::write(repo.join("package.json"), "{}").unwrap();
        std::fs::write(root.path().join("stray.txt"), "x").unwrap();

        let dest = tempdir().unwrap();
        let rev = LocalSource::new(root.path())
            .fetch("octo", "blog", "main", dest.path())
            .await
            .unwrap();
        assert_eq!(rev.files, 1);
        assert!(dest.path().join("package.json").exists());
        assert!(!dest.path().join("stray.txt").exists());
    }

    #[tokio::test]
    async fn test_fetch_missing_root_fails() {
        let root = tempdir().unwrap();
        let dest = tempdir().unwrap();
        let err = LocalSource::new(root.path().join("missing"))
            .fetch("octo", "blog", "main", dest.path())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Source { .. }));
    }

    #[tokio::test]
    async fn test_revision_tracks_content() {
        let root = tempdir().unwrap();
        std::fs::write(root.path().join("index.md"), "one").unwrap();
        let source = LocalSource::new(root.path());

        let first = source
            .fetch("o", "r", "main", tempdir().unwrap().path())
            .await
            .unwrap();
        std::fs::write(root.path().join("index.md"), "two").unwrap();
        let second = source
            .fetch("o", "r", "main", tempdir().unwrap().path())
            .await
            .unwrap();
        assert_ne!(first.revision, second.revision);
    }
}
