use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File name of the per-folder collection sentinel. Never synced.
pub const SENTINEL_FILE: &str = "book.md";

/// Identity value meaning "not yet created remotely" in persisted headers.
pub const UNSYNCED_ID: i64 = -1;

/// Tolerance between file modification time and `last_synced` before a
/// document counts as dirty; also the gap past which a freshly created file
/// carrying a sync timestamp is reclassified as a copy.
pub const SYNC_EPSILON_MS: i64 = 1000;

/// Visibility flag mirrored from the remote side (`Y` = open, `N` = locked).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OpenFlag {
    #[default]
    #[serde(rename = "Y")]
    Open,
    #[serde(rename = "N")]
    Locked,
}

impl OpenFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            OpenFlag::Open => "Y",
            OpenFlag::Locked => "N",
        }
    }

    /// Anything that is not an explicit `N` counts as open.
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "N" | "n" => OpenFlag::Locked,
            _ => OpenFlag::Open,
        }
    }
}

/// Decoded metadata header of a synchronizable document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocHeader {
    /// Remote identity; [`UNSYNCED_ID`] until the first successful push.
    pub id: i64,

    /// Title as last known to the sync layer. The on-disk file name is the
    /// authoritative current title; a mismatch marks the document dirty.
    pub subject: String,

    /// Root collection this document belongs to.
    pub book_id: i64,

    /// Remote parent page, derived from the folder hierarchy.
    pub parent_id: i64,

    pub open_yn: OpenFlag,

    /// Time of the last pull/push that touched this document. `None` means
    /// never synced and forces a push.
    pub last_synced: Option<DateTime<Utc>>,
}

impl DocHeader {
    /// Header for a document that has never been pushed.
    pub fn new_unsynced(subject: String, book_id: Option<i64>, parent_id: Option<i64>) -> Self {
        Self {
            id: UNSYNCED_ID,
            subject,
            book_id: book_id.unwrap_or(UNSYNCED_ID),
            parent_id: parent_id.unwrap_or(UNSYNCED_ID),
            open_yn: OpenFlag::Open,
            last_synced: None,
        }
    }

    pub fn is_unsynced(&self) -> bool {
        self.id == UNSYNCED_ID
    }
}

/// Identity of a collection ("book"), as stored in a folder's sentinel file.
#[derive(Debug, Clone, PartialEq)]
pub struct BookRef {
    pub id: i64,
    pub title: String,
}

/// Classification of a folder, determined once and cached rather than
/// re-probed on every event.
#[derive(Debug, Clone, PartialEq)]
pub enum FolderKind {
    /// Folder is a collection root (it carries a sentinel file).
    Book(BookRef),
    /// Plain folder with no collection identity of its own.
    Untracked,
}
