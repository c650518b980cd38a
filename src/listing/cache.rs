//! Per-profile listing cache
//!
//! A transient pre-paint hint, never a correctness-bearing store: reads
//! tolerate missing or corrupt files by discarding them, writes are
//! best-effort, and every failure is logged as a cache error and
//! swallowed.

use crate::config::Settings;
use crate::error::{PrismError, Result};
use crate::store::ObjectEntry;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ListingCache {
    root: PathBuf,
}

impl ListingCache {
    /// Open the cache in the default cache directory
    pub fn open_default() -> Result<Self> {
        Ok(Self { root: Settings::cache_dir()?.join("listings") })
    }

    /// Open the cache rooted at an explicit directory
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    fn path_for(&self, profile_id: &str) -> PathBuf {
        // profile ids are opaque; keep the file name filesystem-safe
        let safe: String = profile_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
            .collect();
        self.root.join(format!("{safe}.json"))
    }

    /// Read the cached entry set for a profile, discarding anything
    /// unreadable
    pub async fn read(&self, profile_id: &str) -> Option<Vec<ObjectEntry>> {
        match self.try_read(profile_id).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!(profile_id, "{}", PrismError::cache(e.to_string()));
                None
            }
        }
    }

    async fn try_read(&self, profile_id: &str) -> Result<Option<Vec<ObjectEntry>>> {
        let path = self.path_for(profile_id);
        if !path.exists() {
            return Ok(None);
        }
        let contents = tokio::fs::read_to_string(&path).await?;
        let entries = serde_json::from_str::<Vec<ObjectEntry>>(&contents)?;
        Ok(Some(entries))
    }

    /// Write the full entry set for a profile, best-effort
    pub async fn write(&self, profile_id: &str, entries: &[ObjectEntry]) {
        if let Err(e) = self.try_write(profile_id, entries).await {
            debug!(profile_id, "{}", PrismError::cache(e.to_string()));
        }
    }

    async fn try_write(&self, profile_id: &str, entries: &[ObjectEntry]) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let contents = serde_json::to_string(entries)?;
        tokio::fs::write(self.path_for(profile_id), contents).await?;
        Ok(())
    }

    /// Drop the cached entry set for a profile, best-effort
    pub async fn invalidate(&self, profile_id: &str) {
        let _ = tokio::fs::remove_file(self.path_for(profile_id)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(key: &str, size: u64) -> ObjectEntry {
        ObjectEntry { key: key.to_string(), size, last_modified: None }
    }

    #[tokio::test]
    async fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let cache = ListingCache::with_root(dir.path().to_path_buf());

        let entries = vec![entry("a/b.png", 10), entry("c.txt", 3)];
        cache.write("p1", &entries).await;
        assert_eq!(cache.read("p1").await, Some(entries));
    }

    #[tokio::test]
    async fn test_missing_cache_reads_none() {
        let dir = TempDir::new().unwrap();
        let cache = ListingCache::with_root(dir.path().to_path_buf());
        assert_eq!(cache.read("nobody").await, None);
    }

    #[tokio::test]
    async fn test_corrupt_cache_is_discarded() {
        let dir = TempDir::new().unwrap();
        let cache = ListingCache::with_root(dir.path().to_path_buf());

        cache.write("p1", &[entry("a", 1)]).await;
        let path = dir.path().join("p1.json");
        tokio::fs::write(&path, "{not json").await.unwrap();
        assert_eq!(cache.read("p1").await, None);
    }

    #[tokio::test]
    async fn test_profiles_do_not_interfere() {
        let dir = TempDir::new().unwrap();
        let cache = ListingCache::with_root(dir.path().to_path_buf());

        cache.write("p1", &[entry("one", 1)]).await;
        cache.write("p2", &[entry("two", 2)]).await;
        cache.invalidate("p1").await;
        assert_eq!(cache.read("p1").await, None);
        assert_eq!(cache.read("p2").await, Some(vec![entry("two", 2)]));
    }
}
