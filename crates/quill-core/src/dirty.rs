use crate::header::sanitize_title;
use crate::models::{DocHeader, SYNC_EPSILON_MS};
use crate::store;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::path::Path;

/// Decide whether a document must be pushed.
///
/// Dirty when it has never been synced, when the file was modified more than
/// the epsilon after the last sync, or when the on-disk title no longer
/// matches the stored subject. A rename always wins over timestamps.
pub fn needs_sync(header: &DocHeader, modified: DateTime<Utc>, current_title: &str) -> bool {
    let last_synced = match header.last_synced {
        Some(t) => t,
        None => return true,
    };
    if modified - last_synced > Duration::milliseconds(SYNC_EPSILON_MS) {
        return true;
    }
    sanitize_title(&header.subject) != sanitize_title(current_title)
}

/// True if any non-sentinel document under `folder` is dirty. A file whose
/// header cannot be decoded counts as dirty.
pub fn folder_needs_sync(folder: &Path) -> Result<bool> {
    for path in store::list_markdown_files(folder)? {
        if store::is_sentinel(&path) {
            continue;
        }
        let doc = match store::read_document(&path) {
            Ok(doc) => doc,
            Err(_) => return Ok(true),
        };
        let modified = store::modified_at(&path)?;
        if needs_sync(&doc.header, modified, &store::current_title(&path)) {
            return Ok(true);
        }
    }
    Ok(false)
}
