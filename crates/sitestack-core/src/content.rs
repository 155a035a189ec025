//! Local site content collected for upload.

use std::collections::HashSet;
use std::path::Path;

use sitestack_provider::{CloudProvider, ContentDigest, ProviderResult, StoredObject};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Result, SiteError};

/// Every regular file under `root`, keyed by its `/`-separated relative
/// path, sorted by key.
///
/// A missing `root` yields no objects.
pub fn collect_objects(root: &Path) -> Result<Vec<StoredObject>> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut objects = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| SiteError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| SiteError::Config(e.to_string()))?;
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        objects.push(StoredObject {
            key,
            body: std::fs::read(entry.path())?,
        });
    }
    objects.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(objects)
}

/// Digest over keys and bodies. Equal trees give equal digests.
pub fn digest_objects(objects: &[StoredObject]) -> ContentDigest {
    let mut buf = Vec::new();
    for object in objects {
        buf.extend_from_slice(object.key.as_bytes());
        buf.push(0);
        buf.extend_from_slice(ContentDigest::from_bytes(&object.body).as_str().as_bytes());
        buf.push(b'\n');
    }
    ContentDigest::from_bytes(&buf)
}

/// What [`sync_bucket`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub uploaded: usize,
    pub pruned: usize,
}

/// Make `bucket_name` hold exactly `objects`.
///
/// Everything is uploaded first; keys the tree no longer has are deleted
/// afterwards, so a page is never missing while the sync runs.
pub async fn sync_bucket(
    provider: &dyn CloudProvider,
    bucket_name: &str,
    objects: Vec<StoredObject>,
) -> ProviderResult<SyncSummary> {
    let wanted: HashSet<String> = objects.iter().map(|o| o.key.clone()).collect();
    let uploaded = provider.put_objects(bucket_name, objects).await?;

    let stale: Vec<String> = provider
        .list_objects(bucket_name)
        .await?
        .into_iter()
        .filter(|key| !wanted.contains(key))
        .collect();
    let pruned = if stale.is_empty() {
        0
    } else {
        provider.delete_objects(bucket_name, &stale).await?
    };
    debug!(bucket = %bucket_name, uploaded = uploaded, pruned = pruned, "bucket synced");
    Ok(SyncSummary { uploaded, pruned })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sitestack_provider::{MemoryProvider, ResourceKind, ResourceSpec};
    use tempfile::tempdir;

    #[test]
    fn test_collect_nested_files() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("css")).unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>hi</h1>").unwrap();
        std::fs::write(dir.path().join("css/site.css"), "body{}").unwrap();

        let objects = collect_objects(dir.path()).unwrap();
        let keys: Vec<_> = objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["css/site.css", "index.html"]);
    }

    #[test]
    fn test_missing_root_is_empty() {
        let dir = tempdir().unwrap();
        let objects = collect_objects(&dir.path().join("nope")).unwrap();
        assert!(objects.is_empty());
    }

    #[test]
    fn test_digest_tracks_content() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "v1").unwrap();
        let first = digest_objects(&collect_objects(dir.path()).unwrap());
        assert_eq!(first, digest_objects(&collect_objects(dir.path()).unwrap()));

        std::fs::write(dir.path().join("index.html"), "v2").unwrap();
        let second = digest_objects(&collect_objects(dir.path()).unwrap());
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_sync_prunes_removed_files() {
        let provider = MemoryProvider::new();
        provider
            .provision(&ResourceSpec::new(
                "SiteBucket",
                ResourceKind::Bucket,
                json!({ "bucketName": "site" }),
            ))
            .await
            .unwrap();

        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "home").unwrap();
        std::fs::write(dir.path().join("old.html"), "gone soon").unwrap();
        let first = sync_bucket(&provider, "site", collect_objects(dir.path()).unwrap())
            .await
            .unwrap();
        assert_eq!(first, SyncSummary { uploaded: 2, pruned: 0 });

        std::fs::remove_file(dir.path().join("old.html")).unwrap();
        let second = sync_bucket(&provider, "site", collect_objects(dir.path()).unwrap())
            .await
            .unwrap();
        assert_eq!(second, SyncSummary { uploaded: 1, pruned: 1 });
        assert_eq!(provider.list_objects("site").await.unwrap(), vec!["index.html"]);
    }
}
