use crate::header;
use crate::models::{DocHeader, SYNC_EPSILON_MS, UNSYNCED_ID};
use crate::resolve::{self, FolderKinds};
use crate::store;
use crate::sync::SyncGate;
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use std::fs;
use std::path::{Path, PathBuf};

/// File-store events the reconciler reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Created(PathBuf),
    Renamed(PathBuf),
    Opened(PathBuf),
}

/// What reconciling one event did, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// A header was stamped onto the file, or missing fields were filled in.
    Stamped,
    /// The file was a copy of an already-synced document; its identity was
    /// reset so the next push creates a fresh remote page.
    DuplicateReset,
    /// Folder renames never propagate; the user is warned instead.
    FolderRenameIgnored,
    /// Nothing to do.
    Skipped,
}

/// Reacts to creation and rename events, deciding whether a file is
/// genuinely new or a duplicate of a previously synced document.
///
/// Two gates guard the handler: events are dropped until the startup layout
/// has settled, and while the shared [`SyncGate`] reports a pull or push in
/// flight (files materialized by a pull would otherwise be re-stamped).
pub struct Reconciler {
    root: PathBuf,
    gate: SyncGate,
    kinds: FolderKinds,
    settled: bool,
}

impl Reconciler {
    pub fn new(root: PathBuf, gate: SyncGate) -> Self {
        Self {
            root,
            gate,
            kinds: FolderKinds::new(),
            settled: false,
        }
    }

    /// Mark the startup layout as settled; events count from here on.
    pub fn settle(&mut self) {
        self.settled = true;
    }

    pub fn is_settled(&self) -> bool {
        self.settled
    }

    pub fn handle(&mut self, event: &SyncEvent) -> Result<Reconciled> {
        if !self.settled || self.gate.in_progress() {
            return Ok(Reconciled::Skipped);
        }
        match event {
            SyncEvent::Created(path) => self.reconcile_file(path),
            SyncEvent::Renamed(path) => {
                // Remote identity is id-based, not path-based; a folder
                // rename therefore has nothing to propagate.
                if path.is_dir() {
                    self.kinds.invalidate(path);
                    return Ok(Reconciled::FolderRenameIgnored);
                }
                self.reconcile_file(path)
            }
            SyncEvent::Opened(_) => Ok(Reconciled::Skipped),
        }
    }

    fn reconcile_file(&mut self, path: &Path) -> Result<Reconciled> {
        if store::is_sentinel(path) {
            // A new or moved sentinel changes its folder's classification.
            if let Some(folder) = path.parent() {
                self.kinds.invalidate(folder);
            }
            return Ok(Reconciled::Skipped);
        }
        if !is_document(path) {
            return Ok(Reconciled::Skipped);
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read created file: {}", path.display()))?;

        if content.trim().is_empty() {
            self.stamp_new(path, "")?;
            return Ok(Reconciled::Stamped);
        }

        let (header_text, _) = match header::split_document(&content) {
            // A user-authored file without a header gets one wrapped around
            // its body.
            None => {
                self.stamp_new(path, &content)?;
                return Ok(Reconciled::Stamped);
            }
            Some(parts) => parts,
        };
        let decoded = match header::decode_header(header_text) {
            Ok(decoded) => decoded,
            // A broken header is not ours to repair.
            Err(_) => return Ok(Reconciled::Skipped),
        };

        if let Some(last_synced) = decoded.last_synced {
            // A just-created file whose header says it synced in the past
            // can only be a copy of an existing document: a true creation
            // event shows a near-zero gap.
            if Utc::now() - last_synced > Duration::milliseconds(SYNC_EPSILON_MS) {
                store::rewrite_header(path, |h| {
                    h.id = UNSYNCED_ID;
                    h.last_synced = None;
                })?;
                return Ok(Reconciled::DuplicateReset);
            }
        }

        // Fill in identity fields the header is missing.
        let book_id = self.nearest_book_id(path);
        let parent_id = resolve::resolve_parent_id(path, &self.root);
        let fill_book = decoded.book_id == UNSYNCED_ID && book_id.is_some();
        let fill_parent = decoded.parent_id == UNSYNCED_ID && parent_id.is_some();
        if fill_book || fill_parent {
            store::rewrite_header(path, |h| {
                if fill_book {
                    h.book_id = book_id.unwrap_or(UNSYNCED_ID);
                }
                if fill_parent {
                    h.parent_id = parent_id.unwrap_or(UNSYNCED_ID);
                }
            })?;
            return Ok(Reconciled::Stamped);
        }

        Ok(Reconciled::Skipped)
    }

    fn stamp_new(&mut self, path: &Path, body: &str) -> Result<()> {
        let book_id = self.nearest_book_id(path);
        let parent_id = resolve::resolve_parent_id(path, &self.root);
        let header = DocHeader::new_unsynced(store::current_title(path), book_id, parent_id);
        store::write_document(path, &header, body)
    }

    fn nearest_book_id(&mut self, path: &Path) -> Option<i64> {
        self.kinds
            .nearest_book(path, &self.root)
            .map(|(book, _)| book.id)
    }
}

fn is_document(path: &Path) -> bool {
    path.is_file()
        && !store::is_sentinel(path)
        && path.extension().map_or(false, |ext| ext == "md")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BookRef;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        root: PathBuf,
        guide: PathBuf,
        reconciler: Reconciler,
        gate: SyncGate,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        let guide = root.join("Guide");
        store::write_book(
            &guide,
            &BookRef {
                id: 7,
                title: "Guide".to_string(),
            },
        )
        .unwrap();

        let gate = SyncGate::new();
        let mut reconciler = Reconciler::new(root.clone(), gate.clone());
        reconciler.settle();

        Fixture {
            _dir: dir,
            root,
            guide,
            reconciler,
            gate,
        }
    }

    #[test]
    fn empty_created_file_is_stamped_fresh() {
        let mut fx = fixture();
        let path = fx.guide.join("Draft.md");
        fs::write(&path, "").unwrap();

        let outcome = fx
            .reconciler
            .handle(&SyncEvent::Created(path.clone()))
            .unwrap();
        assert_eq!(outcome, Reconciled::Stamped);

        let doc = store::read_document(&path).unwrap();
        assert_eq!(doc.header.id, UNSYNCED_ID);
        assert_eq!(doc.header.subject, "Draft");
        assert_eq!(doc.header.book_id, 7);
        assert_eq!(doc.header.parent_id, UNSYNCED_ID);
        assert_eq!(doc.header.last_synced, None);
    }

    #[test]
    fn headerless_body_is_wrapped() {
        let mut fx = fixture();
        let path = fx.guide.join("Notes.md");
        fs::write(&path, "existing text\n").unwrap();

        let outcome = fx
            .reconciler
            .handle(&SyncEvent::Created(path.clone()))
            .unwrap();
        assert_eq!(outcome, Reconciled::Stamped);

        let doc = store::read_document(&path).unwrap();
        assert_eq!(doc.header.id, UNSYNCED_ID);
        assert_eq!(doc.body, "existing text\n");
    }

    #[test]
    fn stale_sync_timestamp_marks_a_duplicate() {
        let mut fx = fixture();
        let path = fx.guide.join("Copy of Intro.md");
        let mut header = DocHeader::new_unsynced("Intro".to_string(), Some(7), None);
        header.id = 12;
        header.last_synced = Some(Utc::now() - Duration::seconds(2));
        store::write_document(&path, &header, "Hello\n").unwrap();

        let outcome = fx
            .reconciler
            .handle(&SyncEvent::Created(path.clone()))
            .unwrap();
        assert_eq!(outcome, Reconciled::DuplicateReset);

        let doc = store::read_document(&path).unwrap();
        assert_eq!(doc.header.id, UNSYNCED_ID);
        assert_eq!(doc.header.last_synced, None);
        assert_eq!(doc.body, "Hello\n");
    }

    #[test]
    fn near_zero_gap_is_left_untouched() {
        let mut fx = fixture();
        let path = fx.guide.join("Intro.md");
        let mut header = DocHeader::new_unsynced("Intro".to_string(), Some(7), None);
        header.id = 12;
        header.last_synced = Some(Utc::now() - Duration::milliseconds(500));
        store::write_document(&path, &header, "Hello\n").unwrap();

        let outcome = fx
            .reconciler
            .handle(&SyncEvent::Created(path.clone()))
            .unwrap();
        assert_eq!(outcome, Reconciled::Skipped);

        let doc = store::read_document(&path).unwrap();
        assert_eq!(doc.header.id, 12);
        assert!(doc.header.last_synced.is_some());
    }

    #[test]
    fn rename_restamps_missing_identity_fields() {
        let mut fx = fixture();
        let path = fx.guide.join("Moved.md");
        let header = DocHeader::new_unsynced("Moved".to_string(), None, None);
        store::write_document(&path, &header, "").unwrap();

        let outcome = fx
            .reconciler
            .handle(&SyncEvent::Renamed(path.clone()))
            .unwrap();
        assert_eq!(outcome, Reconciled::Stamped);

        let doc = store::read_document(&path).unwrap();
        assert_eq!(doc.header.book_id, 7);
    }

    #[test]
    fn folder_renames_are_never_propagated() {
        let mut fx = fixture();
        let folder = fx.guide.join("Chapter");
        fs::create_dir_all(&folder).unwrap();

        let outcome = fx.reconciler.handle(&SyncEvent::Renamed(folder)).unwrap();
        assert_eq!(outcome, Reconciled::FolderRenameIgnored);
    }

    #[test]
    fn events_are_dropped_before_settling() {
        let fx = fixture();
        let mut unsettled = Reconciler::new(fx.root.clone(), fx.gate.clone());
        let path = fx.guide.join("Early.md");
        fs::write(&path, "").unwrap();

        let outcome = unsettled.handle(&SyncEvent::Created(path.clone())).unwrap();
        assert_eq!(outcome, Reconciled::Skipped);
        // Still headerless: nothing was stamped.
        assert!(store::read_document(&path).is_err());
    }

    #[test]
    fn events_are_dropped_while_a_sync_holds_the_gate() {
        let mut fx = fixture();
        let path = fx.guide.join("Pulled.md");
        fs::write(&path, "").unwrap();

        let _guard = fx.gate.enter();
        let outcome = fx
            .reconciler
            .handle(&SyncEvent::Created(path.clone()))
            .unwrap();
        assert_eq!(outcome, Reconciled::Skipped);
        assert!(store::read_document(&path).is_err());
    }

    #[test]
    fn sentinel_and_foreign_files_are_ignored() {
        let mut fx = fixture();
        let sentinel = store::sentinel_path(&fx.guide);
        assert_eq!(
            fx.reconciler.handle(&SyncEvent::Created(sentinel)).unwrap(),
            Reconciled::Skipped
        );

        let txt = fx.guide.join("scratch.txt");
        fs::write(&txt, "x").unwrap();
        assert_eq!(
            fx.reconciler.handle(&SyncEvent::Created(txt)).unwrap(),
            Reconciled::Skipped
        );
    }

    #[test]
    fn opened_events_are_inert() {
        let mut fx = fixture();
        let path = fx.guide.join("Intro.md");
        fs::write(&path, "").unwrap();
        assert_eq!(
            fx.reconciler.handle(&SyncEvent::Opened(path)).unwrap(),
            Reconciled::Skipped
        );
    }
}
