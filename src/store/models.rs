//! Data models for store operations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One listed object
///
/// `key` is the identity: the full slash-delimited path within the
/// bucket. Folders are never literal entries; they are derived from keys
/// by the listing engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

impl ObjectEntry {
    /// Basename: the segment after the last `/`
    pub fn name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    /// Lower-cased extension, if the basename has one
    pub fn extension(&self) -> Option<String> {
        let name = self.name();
        name.rsplit_once('.')
            .filter(|(stem, ext)| !stem.is_empty() && !ext.is_empty())
            .map(|(_, ext)| ext.to_lowercase())
    }
}

/// One page of a listing response
///
/// Tagged with the profile id it was issued against so callers can
/// discard pages that arrive after a connection switch. `directories`
/// carries common-prefix groupings and is only populated for
/// non-recursive listings.
#[derive(Debug, Clone)]
pub struct ListingPage {
    pub profile_id: String,
    pub entries: Vec<ObjectEntry>,
    pub directories: Vec<String>,
    pub cursor: Option<String>,
}

/// Merged, cumulative listing state for one profile
#[derive(Debug, Clone)]
pub struct ListingSnapshot {
    pub profile_id: String,
    pub entries: Vec<ObjectEntry>,
    pub cursor: Option<String>,
    /// True while the snapshot is a cache pre-paint, before the first
    /// fresh page replaced it
    pub from_cache: bool,
}

impl ListingSnapshot {
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }
}

/// Upload life cycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Pending,
    Uploading,
    Completed,
    Error,
}

/// Progress and terminal events emitted by an upload task
#[derive(Debug, Clone)]
pub enum UploadEvent {
    Started {
        key: String,
        total_bytes: u64,
    },
    Progress {
        /// 0-100, monotonically non-decreasing per task
        percent: u8,
        bytes_per_sec: f64,
    },
    Completed {
        key: String,
        /// Set when the pre-upload transform re-encoded the source
        processed_name: Option<String>,
    },
    Failed {
        message: String,
    },
}

/// Request for uploading one file
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub source: PathBuf,
    /// Profile-relative destination directory; `None` uses the
    /// configured default
    pub directory: Option<String>,
    pub content_type: Option<String>,
}

/// Result of a finished upload
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub key: String,
    pub etag: Option<String>,
    pub bytes: u64,
    pub processed_name: Option<String>,
}
