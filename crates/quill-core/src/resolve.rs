use crate::header::sanitize_title;
use crate::models::{BookRef, FolderKind, UNSYNCED_ID};
use crate::store;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Compute the remote parent id for the document at `path`.
///
/// A folder expresses containment by mirroring a sibling document's title:
/// the parent of a document is the document in the grandparent folder whose
/// sanitized subject equals the immediate parent folder's name. Documents
/// directly under the content root, or whose parent folder has no match,
/// have no parent. Absence is `None` here; `-1` exists only in the header.
pub fn resolve_parent_id(path: &Path, root: &Path) -> Option<i64> {
    let folder = path.parent()?;
    if folder == root {
        return None;
    }
    let grandparent = folder.parent()?;
    if !grandparent.starts_with(root) {
        return None;
    }
    let folder_name = folder.file_name()?.to_string_lossy().to_string();

    let entries = fs::read_dir(grandparent).ok()?;
    for entry in entries.flatten() {
        let candidate = entry.path();
        if !candidate.is_file()
            || store::is_sentinel(&candidate)
            || candidate.extension().map_or(true, |ext| ext != "md")
        {
            continue;
        }
        let doc = match store::read_document(&candidate) {
            Ok(doc) => doc,
            Err(_) => continue,
        };
        if sanitize_title(&doc.header.subject) == folder_name && doc.header.id != UNSYNCED_ID {
            return Some(doc.header.id);
        }
    }

    None
}

/// Folder classification, computed once per folder and cached rather than
/// re-probed on every event.
#[derive(Debug, Default)]
pub struct FolderKinds {
    cache: HashMap<PathBuf, FolderKind>,
}

impl FolderKinds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `folder`, consulting the cache first.
    pub fn classify(&mut self, folder: &Path) -> &FolderKind {
        if !self.cache.contains_key(folder) {
            let kind = match store::read_book(folder) {
                Some(book) => FolderKind::Book(book),
                None => FolderKind::Untracked,
            };
            self.cache.insert(folder.to_path_buf(), kind);
        }
        &self.cache[folder]
    }

    /// Walk upward from `start` to the nearest folder classified as a
    /// collection root. The walk is bounded by the content root; absence is
    /// a `None`, not an error.
    pub fn nearest_book(&mut self, start: &Path, root: &Path) -> Option<(BookRef, PathBuf)> {
        let mut folder = if start.is_dir() { start } else { start.parent()? };
        loop {
            if !folder.starts_with(root) {
                return None;
            }
            if let FolderKind::Book(book) = self.classify(folder) {
                return Some((book.clone(), folder.to_path_buf()));
            }
            if folder == root {
                return None;
            }
            folder = folder.parent()?;
        }
    }

    /// Drop a cached entry, e.g. after a sentinel was created or the folder
    /// renamed.
    pub fn invalidate(&mut self, folder: &Path) {
        self.cache.remove(folder);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocHeader;
    use tempfile::TempDir;

    fn write_doc(path: &Path, id: i64, subject: &str) {
        let mut header = DocHeader::new_unsynced(subject.to_string(), Some(7), None);
        header.id = id;
        store::write_document(path, &header, "").unwrap();
    }

    fn book_folder(root: &Path, name: &str, id: i64) -> PathBuf {
        let folder = root.join(name);
        store::write_book(
            &folder,
            &BookRef {
                id,
                title: name.to_string(),
            },
        )
        .unwrap();
        folder
    }

    #[test]
    fn parent_resolves_through_mirrored_folder_name() {
        let dir = TempDir::new().unwrap();
        let guide = book_folder(dir.path(), "Guide", 7);
        write_doc(&guide.join("Chapter.md"), 5, "Chapter");
        fs::create_dir_all(guide.join("Chapter")).unwrap();
        let leaf = guide.join("Chapter").join("Leaf.md");
        write_doc(&leaf, 9, "Leaf");

        assert_eq!(resolve_parent_id(&leaf, dir.path()), Some(5));
    }

    #[test]
    fn collection_root_documents_have_no_parent() {
        let dir = TempDir::new().unwrap();
        let guide = book_folder(dir.path(), "Guide", 7);
        let doc = guide.join("Intro.md");
        write_doc(&doc, 1, "Intro");

        assert_eq!(resolve_parent_id(&doc, dir.path()), None);
    }

    #[test]
    fn unsynced_sibling_does_not_become_a_parent() {
        let dir = TempDir::new().unwrap();
        let guide = book_folder(dir.path(), "Guide", 7);
        write_doc(&guide.join("Chapter.md"), UNSYNCED_ID, "Chapter");
        let leaf = guide.join("Chapter").join("Leaf.md");
        write_doc(&leaf, UNSYNCED_ID, "Leaf");

        assert_eq!(resolve_parent_id(&leaf, dir.path()), None);
    }

    #[test]
    fn nearest_book_walks_up_to_the_sentinel() {
        let dir = TempDir::new().unwrap();
        let guide = book_folder(dir.path(), "Guide", 7);
        let nested = guide.join("Chapter").join("Section");
        fs::create_dir_all(&nested).unwrap();

        let mut kinds = FolderKinds::new();
        let (book, folder) = kinds
            .nearest_book(&nested.join("Leaf.md"), dir.path())
            .unwrap();
        assert_eq!(book.id, 7);
        assert_eq!(folder, guide);
    }

    #[test]
    fn nearest_book_stops_at_the_content_root() {
        let dir = TempDir::new().unwrap();
        let plain = dir.path().join("loose");
        fs::create_dir_all(&plain).unwrap();

        let mut kinds = FolderKinds::new();
        assert!(kinds
            .nearest_book(&plain.join("note.md"), dir.path())
            .is_none());
    }

    #[test]
    fn classification_is_cached_until_invalidated() {
        let dir = TempDir::new().unwrap();
        let guide = book_folder(dir.path(), "Guide", 7);
        let mut kinds = FolderKinds::new();

        assert!(matches!(kinds.classify(&guide), FolderKind::Book(_)));

        // Removing the sentinel does not change the cached answer.
        fs::remove_file(store::sentinel_path(&guide)).unwrap();
        assert!(matches!(kinds.classify(&guide), FolderKind::Book(_)));

        kinds.invalidate(&guide);
        assert!(matches!(kinds.classify(&guide), FolderKind::Untracked));
    }
}
