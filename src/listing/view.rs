//! Local views over the listing snapshot
//!
//! Filtering, sorting and fixed-size local pagination over the already
//! fetched entry set, independent of the remote continuation cursor,
//! plus the selection state and its reconciliation rule.

use crate::store::ObjectEntry;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// Sentinel directory selection meaning "no filter"
pub const ROOT: &str = "ROOT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SortKey {
    Name,
    Date,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// One view request over the snapshot
#[derive(Debug, Clone)]
pub struct ViewQuery {
    /// `None` (or the [`ROOT`] sentinel) disables directory filtering
    pub directory: Option<String>,
    pub search: Option<String>,
    pub sort_key: SortKey,
    pub sort_order: SortOrder,
    /// 1-based local page index
    pub page: usize,
    pub page_size: usize,
}

impl Default for ViewQuery {
    fn default() -> Self {
        Self {
            directory: None,
            search: None,
            sort_key: SortKey::Date,
            sort_order: SortOrder::Desc,
            page: 1,
            page_size: 20,
        }
    }
}

/// One local page of the filtered and sorted sequence
#[derive(Debug, Clone)]
pub struct ViewPage {
    pub entries: Vec<ObjectEntry>,
    pub page: usize,
    pub total_pages: usize,
    pub total_matching: usize,
}

fn directory_filter(directory: Option<&str>) -> Option<String> {
    directory
        .map(str::trim)
        .filter(|d| !d.is_empty() && *d != ROOT)
        .map(|d| format!("{}/", d.trim_end_matches('/')))
}

/// Entries under the selected directory whose basename contains the
/// search term; both filters are ANDed
pub fn filter_entries<'a>(
    entries: &'a [ObjectEntry],
    directory: Option<&str>,
    search: Option<&str>,
) -> Vec<&'a ObjectEntry> {
    let dir_prefix = directory_filter(directory);
    let needle = search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);

    entries
        .iter()
        .filter(|entry| {
            let dir_match = dir_prefix
                .as_deref()
                .map_or(true, |prefix| entry.key.starts_with(prefix));
            let search_match = needle
                .as_deref()
                .map_or(true, |term| entry.name().to_lowercase().contains(term));
            dir_match && search_match
        })
        .collect()
}

/// Sort by basename (case-insensitive) or by last-modified; entries
/// without a timestamp sort as earliest
pub fn sort_entries(entries: &mut [&ObjectEntry], key: SortKey, order: SortOrder) {
    entries.sort_by(|a, b| {
        let ordering = match key {
            SortKey::Name => a.name().to_lowercase().cmp(&b.name().to_lowercase()),
            SortKey::Date => {
                let a_ts = a.last_modified.unwrap_or(DateTime::<Utc>::MIN_UTC);
                let b_ts = b.last_modified.unwrap_or(DateTime::<Utc>::MIN_UTC);
                a_ts.cmp(&b_ts)
            }
        };
        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
}

/// Filter, sort and slice the snapshot into one local page
pub fn build_view(entries: &[ObjectEntry], query: &ViewQuery) -> ViewPage {
    let mut matching =
        filter_entries(entries, query.directory.as_deref(), query.search.as_deref());
    sort_entries(&mut matching, query.sort_key, query.sort_order);

    let total_matching = matching.len();
    let page_size = query.page_size.max(1);
    let total_pages = total_matching.div_ceil(page_size);
    let page = query.page.max(1).min(total_pages.max(1));

    let start = (page - 1) * page_size;
    let entries = matching
        .into_iter()
        .skip(start)
        .take(page_size)
        .cloned()
        .collect();

    ViewPage { entries, page, total_pages, total_matching }
}

/// Selected keys, kept consistent with the backing entry set
#[derive(Debug, Clone, Default)]
pub struct SelectionState {
    keys: BTreeSet<String>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle(&mut self, key: &str) {
        if !self.keys.remove(key) {
            self.keys.insert(key.to_string());
        }
    }

    pub fn select_all<'a>(&mut self, keys: impl IntoIterator<Item = &'a str>) {
        self.keys.extend(keys.into_iter().map(str::to_string));
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    /// Drop any selected key no longer present in the entry set
    ///
    /// Called after every entry-set change (refresh, load-more,
    /// deletes).
    pub fn reconcile(&mut self, entries: &[ObjectEntry]) {
        if self.keys.is_empty() {
            return;
        }
        let present: BTreeSet<&str> = entries.iter().map(|e| e.key.as_str()).collect();
        self.keys.retain(|k| present.contains(k.as_str()));
    }
}
