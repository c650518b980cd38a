//! Integration tests for the listing engine and its views
//!
//! Directory reconstruction, filtering, local pagination, selection
//! reconciliation and the cache/pagination preconditions.

use prism::error::PrismError;
use prism::listing::{
    build_view, derive_directories, ListingCache, ListingEngine, SelectionState, SortKey,
    SortOrder, ViewQuery, ROOT,
};
use prism::store::{ObjectEntry, StoreManager};
use tempfile::TempDir;

fn entry(key: &str) -> ObjectEntry {
    ObjectEntry { key: key.to_string(), size: 1, last_modified: None }
}

#[test]
fn test_directory_set_is_exactly_the_strict_prefixes() {
    let entries = vec![
        entry("a/b.png"),
        entry("a/c/d.png"),
        entry("e.txt"),
        entry("a/c/deep/f.txt"),
    ];
    let dirs = derive_directories(&entries);
    assert_eq!(dirs, vec!["a", "a/c", "a/c/deep"]);

    // nothing that is not derivable from a key
    for dir in &dirs {
        assert!(entries.iter().any(|e| e.key.starts_with(&format!("{dir}/"))));
    }
}

#[test]
fn test_directory_filter_matches_prefix_exactly() {
    let entries = vec![entry("docs/a.pdf"), entry("docs-old/b.pdf"), entry("docs")];

    let query = ViewQuery {
        directory: Some("docs".to_string()),
        sort_key: SortKey::Name,
        sort_order: SortOrder::Asc,
        ..Default::default()
    };
    let view = build_view(&entries, &query);
    assert_eq!(view.entries.len(), 1);
    assert_eq!(view.entries[0].key, "docs/a.pdf");

    let root_query = ViewQuery { directory: Some(ROOT.to_string()), ..Default::default() };
    assert_eq!(build_view(&entries, &root_query).total_matching, 3);
}

#[test]
fn test_local_pagination_is_independent_of_fetching() {
    let entries: Vec<ObjectEntry> =
        (0..53).map(|i| entry(&format!("k{i:02}"))).collect();
    let query = ViewQuery {
        sort_key: SortKey::Name,
        sort_order: SortOrder::Asc,
        page: 2,
        ..Default::default()
    };
    let view = build_view(&entries, &query);
    assert_eq!(view.total_pages, 3);
    assert_eq!(view.entries.len(), 20);
    assert_eq!(view.entries[0].key, "k20");
}

#[test]
fn test_selection_never_keeps_absent_keys() {
    let mut entries = vec![entry("a"), entry("b"), entry("c")];
    let mut selection = SelectionState::new();
    selection.toggle("a");
    selection.toggle("b");
    selection.toggle("c");

    // arbitrary mutation sequence: shrink, grow, shrink again
    entries.retain(|e| e.key != "b");
    selection.reconcile(&entries);
    assert_eq!(selection.len(), 2);
    assert!(!selection.contains("b"));

    entries.push(entry("d"));
    selection.reconcile(&entries);
    assert_eq!(selection.len(), 2);

    entries.clear();
    selection.reconcile(&entries);
    assert!(selection.is_empty());

    let all: Vec<String> = vec!["x".into(), "y".into()];
    selection.select_all(all.iter().map(String::as_str));
    selection.reconcile(&[entry("x")]);
    assert!(selection.contains("x"));
    assert!(!selection.contains("y"));
}

#[tokio::test]
async fn test_load_more_requires_a_cursor() {
    let dir = TempDir::new().unwrap();
    let mut engine = ListingEngine::new(ListingCache::with_root(dir.path().to_path_buf()), 1000);
    let manager = StoreManager::new();

    // no snapshot at all
    assert!(matches!(
        engine.load_more(&manager).await,
        Err(PrismError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn test_cache_prime_shows_entries_but_cannot_page() {
    let dir = TempDir::new().unwrap();
    let cache = ListingCache::with_root(dir.path().to_path_buf());
    cache.write("p1", &[entry("a/b.png"), entry("c.txt")]).await;

    let mut engine = ListingEngine::new(cache, 1000);
    let snapshot = engine.prime_from_cache("p1").await.unwrap();
    assert!(snapshot.from_cache);
    assert_eq!(snapshot.entries.len(), 2);
    assert_eq!(engine.directories(), vec!["a"]);
    assert!(!engine.has_more());

    let manager = StoreManager::new();
    assert!(matches!(
        engine.load_more(&manager).await,
        Err(PrismError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn test_forget_drops_snapshot_and_cache() {
    let dir = TempDir::new().unwrap();
    let cache = ListingCache::with_root(dir.path().to_path_buf());
    cache.write("p1", &[entry("a")]).await;

    let mut engine = ListingEngine::new(cache, 1000);
    engine.prime_from_cache("p1").await;
    assert!(engine.snapshot().is_some());

    engine.forget("p1").await;
    assert!(engine.snapshot().is_none());
    assert!(engine.prime_from_cache("p1").await.is_none());
}

#[test]
fn test_flat_listing_end_to_end() {
    let entries = vec![entry("a/b.png"), entry("a/c.png"), entry("d.txt")];

    assert_eq!(derive_directories(&entries), vec!["a"]);

    let query = ViewQuery {
        directory: Some("a".to_string()),
        sort_key: SortKey::Name,
        sort_order: SortOrder::Asc,
        ..Default::default()
    };
    let view = build_view(&entries, &query);
    assert_eq!(
        view.entries.iter().map(|e| e.key.as_str()).collect::<Vec<_>>(),
        vec!["a/b.png", "a/c.png"]
    );
    assert_eq!(
        view.entries.iter().map(|e| e.name()).collect::<Vec<_>>(),
        vec!["b.png", "c.png"]
    );
}
