//! Listing engine: snapshot assembly and directory reconstruction
//!
//! Owns the merged listing snapshot for the profile currently bound to
//! the connection manager. Pages are requested strictly sequentially;
//! pages that come back tagged with a different profile id than the
//! manager's current one are discarded rather than merged.

use crate::error::{PrismError, Result};
use crate::listing::cache::ListingCache;
use crate::listing::view::SelectionState;
use crate::store::{ListingSnapshot, ObjectEntry, StoreManager};
use std::collections::BTreeSet;
use tracing::debug;

/// Every proper `/`-prefix of every key, deduplicated and
/// lexicographically sorted
///
/// Folders are never literal entries in the store; this is the only
/// source of the directory tree.
pub fn derive_directories(entries: &[ObjectEntry]) -> Vec<String> {
    let mut directories = BTreeSet::new();
    for entry in entries {
        let key = entry.key.as_str();
        let mut pos = 0;
        while let Some(found) = key[pos..].find('/') {
            let end = pos + found;
            if end > 0 {
                directories.insert(key[..end].to_string());
            }
            pos = end + 1;
        }
    }
    directories.into_iter().collect()
}

/// Assembles cumulative listing snapshots out of remote pages and the
/// per-profile cache
#[derive(Debug)]
pub struct ListingEngine {
    cache: ListingCache,
    remote_page_size: i32,
    snapshot: Option<ListingSnapshot>,
    selection: SelectionState,
}

impl ListingEngine {
    pub fn new(cache: ListingCache, remote_page_size: i32) -> Self {
        Self { cache, remote_page_size, snapshot: None, selection: SelectionState::new() }
    }

    pub fn snapshot(&self) -> Option<&ListingSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    /// Toggle a key in the selection; only keys present in the current
    /// entry set can be selected
    pub fn toggle_selected(&mut self, key: &str) {
        let present = self
            .snapshot
            .as_ref()
            .map_or(false, |s| s.entries.iter().any(|e| e.key == key));
        if present || self.selection.contains(key) {
            self.selection.toggle(key);
        }
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Drop selected keys that the entry set no longer contains; runs
    /// after every entry-set change
    fn reconcile_selection(&mut self) {
        match self.snapshot.as_ref() {
            Some(s) => self.selection.reconcile(&s.entries),
            None => self.selection.clear(),
        }
    }

    /// True when the last page carried a continuation cursor
    pub fn has_more(&self) -> bool {
        self.snapshot
            .as_ref()
            .map_or(false, |s| !s.from_cache && s.cursor.is_some())
    }

    pub fn directories(&self) -> Vec<String> {
        self.snapshot
            .as_ref()
            .map(|s| derive_directories(&s.entries))
            .unwrap_or_default()
    }

    /// Populate the snapshot from the cache for instant display
    ///
    /// Best-effort: a missing or corrupt cache leaves the snapshot
    /// empty. The cursor is never cached, so a cache-sourced snapshot
    /// cannot be paged further until refreshed.
    pub async fn prime_from_cache(&mut self, profile_id: &str) -> Option<&ListingSnapshot> {
        let entries = self.cache.read(profile_id).await?;
        debug!(profile_id, entries = entries.len(), "listing primed from cache");
        self.snapshot = Some(ListingSnapshot {
            profile_id: profile_id.to_string(),
            entries,
            cursor: None,
            from_cache: true,
        });
        self.reconcile_selection();
        self.snapshot.as_ref()
    }

    /// Fetch the first page fresh from the store, replacing whatever
    /// the snapshot held (cache-sourced or otherwise)
    pub async fn refresh(&mut self, manager: &StoreManager) -> Result<&ListingSnapshot> {
        let page = manager
            .list_objects("", true, self.remote_page_size, None)
            .await?;

        let current = manager.profile_id().await.ok_or(PrismError::NotInitialized)?;
        if page.profile_id != current {
            debug!(
                stale = %page.profile_id,
                current = %current,
                "discarding listing page from a replaced connection"
            );
            return self
                .snapshot
                .as_ref()
                .ok_or_else(|| PrismError::remote("listing superseded by a connection switch"));
        }

        self.cache.write(&page.profile_id, &page.entries).await;
        self.snapshot = Some(ListingSnapshot {
            profile_id: page.profile_id,
            entries: page.entries,
            cursor: page.cursor,
            from_cache: false,
        });
        self.reconcile_selection();
        Ok(self.snapshot.as_ref().unwrap())
    }

    /// Cache prime followed by a fresh first page
    pub async fn load_initial(&mut self, manager: &StoreManager) -> Result<&ListingSnapshot> {
        if let Some(profile_id) = manager.profile_id().await {
            self.prime_from_cache(&profile_id).await;
        }
        self.refresh(manager).await
    }

    /// Fetch the next page using the cursor from the previous one and
    /// append its entries
    ///
    /// Calling without a cursor from a prior fresh page is a programmer
    /// error and issues no request.
    pub async fn load_more(&mut self, manager: &StoreManager) -> Result<&ListingSnapshot> {
        let cursor = match self.snapshot.as_ref() {
            Some(s) if !s.from_cache => s.cursor.clone(),
            _ => None,
        }
        .ok_or_else(|| {
            PrismError::invalid_argument("load_more called without a continuation cursor")
        })?;

        let page = manager
            .list_objects("", true, self.remote_page_size, Some(cursor))
            .await?;

        let current = manager.profile_id().await.ok_or(PrismError::NotInitialized)?;
        let snapshot_profile = self
            .snapshot
            .as_ref()
            .map(|s| s.profile_id.clone())
            .expect("cursor implies a snapshot");
        if page.profile_id != current || page.profile_id != snapshot_profile {
            debug!(
                stale = %page.profile_id,
                current = %current,
                "discarding listing page from a replaced connection"
            );
            return Ok(self.snapshot.as_ref().unwrap());
        }

        // the store owns uniqueness; appended pages are not deduplicated
        {
            let snapshot = self.snapshot.as_mut().unwrap();
            snapshot.entries.extend(page.entries);
            snapshot.cursor = page.cursor;
        }
        self.reconcile_selection();
        let entries = &self.snapshot.as_ref().unwrap().entries;
        self.cache.write(&snapshot_profile, entries).await;
        Ok(self.snapshot.as_ref().unwrap())
    }

    /// Drop local state for a profile (used after its profile is
    /// deleted)
    pub async fn forget(&mut self, profile_id: &str) {
        if self.snapshot.as_ref().map_or(false, |s| s.profile_id == profile_id) {
            self.snapshot = None;
            self.selection.clear();
        }
        self.cache.invalidate(profile_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::cache::ListingCache;
    use tempfile::TempDir;

    fn entry(key: &str) -> ObjectEntry {
        ObjectEntry { key: key.to_string(), size: 1, last_modified: None }
    }

    #[test]
    fn test_derive_directories_simple() {
        let entries = vec![entry("a/b.png"), entry("a/c.png"), entry("d.txt")];
        assert_eq!(derive_directories(&entries), vec!["a".to_string()]);
    }

    #[test]
    fn test_derive_directories_nested() {
        let entries = vec![entry("a/b/c/d.txt"), entry("a/x.txt")];
        assert_eq!(
            derive_directories(&entries),
            vec!["a".to_string(), "a/b".to_string(), "a/b/c".to_string()]
        );
    }

    #[test]
    fn test_derive_directories_no_slash_no_dirs() {
        assert!(derive_directories(&[entry("plain.txt")]).is_empty());
    }

    #[test]
    fn test_derive_directories_ignores_leading_slash() {
        // a leading separator yields no empty-named directory
        let dirs = derive_directories(&[entry("/rooted.txt")]);
        assert!(dirs.is_empty());
    }

    #[tokio::test]
    async fn test_load_more_without_cursor_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut engine =
            ListingEngine::new(ListingCache::with_root(dir.path().to_path_buf()), 1000);
        let manager = StoreManager::new();

        let err = engine.load_more(&manager).await.unwrap_err();
        assert!(matches!(err, PrismError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_selection_follows_entry_set() {
        let dir = TempDir::new().unwrap();
        let cache = ListingCache::with_root(dir.path().to_path_buf());
        cache.write("p1", &[entry("a/b.png"), entry("c.txt")]).await;

        let mut engine = ListingEngine::new(cache, 1000);
        engine.prime_from_cache("p1").await;
        engine.toggle_selected("a/b.png");
        engine.toggle_selected("c.txt");
        engine.toggle_selected("not-listed");
        assert_eq!(engine.selection().len(), 2);

        // the entry set shrinks on the next prime; selection follows
        let cache = ListingCache::with_root(dir.path().to_path_buf());
        cache.write("p1", &[entry("c.txt")]).await;
        engine.prime_from_cache("p1").await;
        assert!(!engine.selection().contains("a/b.png"));
        assert!(engine.selection().contains("c.txt"));

        engine.forget("p1").await;
        assert!(engine.selection().is_empty());
    }

    #[tokio::test]
    async fn test_cache_primed_snapshot_cannot_page() {
        let dir = TempDir::new().unwrap();
        let cache = ListingCache::with_root(dir.path().to_path_buf());
        cache.write("p1", &[entry("a/b.png")]).await;

        let mut engine = ListingEngine::new(cache, 1000);
        engine.prime_from_cache("p1").await;
        assert!(engine.snapshot().unwrap().from_cache);
        assert!(!engine.has_more());

        let manager = StoreManager::new();
        assert!(engine.load_more(&manager).await.is_err());
    }
}
