//! Local state file: the in-memory provider persisted as JSON between runs.

use std::path::Path;

use anyhow::{Context, Result};
use sitestack_provider::{MemoryProvider, ProviderSnapshot};

/// Load provider state from `path`. A missing file is an empty account.
pub fn load_provider(path: &Path) -> Result<MemoryProvider> {
    if !path.exists() {
        return Ok(MemoryProvider::new());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read state file: {:?}", path))?;
    let snapshot: ProviderSnapshot = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid state file: {:?}", path))?;
    Ok(MemoryProvider::from_snapshot(snapshot))
}

pub fn save_provider(path: &Path, provider: &MemoryProvider) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create state directory: {:?}", parent))?;
    }
    let raw = serde_json::to_string_pretty(&provider.snapshot())?;
    std::fs::write(path, raw).with_context(|| format!("Failed to write state file: {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitestack_provider::{CloudProvider, ResourceKind, ResourceSpec};

    #[test]
    fn test_missing_state_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let provider = load_provider(&dir.path().join("state.json")).unwrap();
        assert_eq!(provider.resource_count(), 0);
    }

    #[tokio::test]
    async fn test_state_survives_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state.json");

        let provider = MemoryProvider::new().with_zone("example.com");
        provider
            .provision(&ResourceSpec::new(
                "SiteBucket",
                ResourceKind::Bucket,
                serde_json::json!({ "bucketName": "www.example.com-static-site" }),
            ))
            .await
            .unwrap();
        save_provider(&path, &provider).unwrap();

        let restored = load_provider(&path).unwrap();
        assert_eq!(restored.resource_count(), 1);
        assert_eq!(
            restored.lookup_zone("example.com").await.unwrap().zone_name,
            "example.com"
        );
    }

    #[test]
    fn test_corrupt_state_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "not json").unwrap();
        let err = load_provider(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid state file"));
    }
}
