use crate::error::SyncError;
use crate::header;
use crate::models::{BookRef, DocHeader, SENTINEL_FILE};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

/// A document on disk: decoded header plus raw body.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub path: PathBuf,
    pub header: DocHeader,
    pub body: String,
}

/// Read and decode a document file.
pub fn read_document(path: &Path) -> Result<StoredDocument> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read document: {}", path.display()))?;
    let (header_text, body) = header::split_document(&content).ok_or_else(|| {
        SyncError::MalformedHeader(format!("no header block in {}", path.display()))
    })?;
    let decoded = header::decode_header(header_text)
        .with_context(|| format!("Failed to decode header of {}", path.display()))?;

    Ok(StoredDocument {
        path: path.to_path_buf(),
        header: decoded,
        body: body.to_string(),
    })
}

/// Write a document file from header and body, creating parent folders as
/// needed.
pub fn write_document(path: &Path, header: &DocHeader, body: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let content = format!("{}{}", header::encode_header(header), body);
    fs::write(path, content)
        .with_context(|| format!("Failed to write document: {}", path.display()))?;
    Ok(())
}

/// Rewrite only the header of an existing document, preserving the body.
pub fn rewrite_header(path: &Path, mutate: impl FnOnce(&mut DocHeader)) -> Result<()> {
    let mut doc = read_document(path)?;
    mutate(&mut doc.header);
    write_document(path, &doc.header, &doc.body)
}

/// Recursively list all markdown files under a folder, skipping hidden
/// directories. Sorted so batch operations process files in a stable order.
pub fn list_markdown_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    list_markdown_files_impl(dir, &mut files)?;
    files.sort();
    Ok(files)
}

fn list_markdown_files_impl(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read directory: {}", dir.display()))?;

    for entry in entries {
        let entry = entry?;
        let path = entry.path();

        if path.is_file() && path.extension().map_or(false, |ext| ext == "md") {
            files.push(path);
        } else if path.is_dir() {
            if let Some(dir_name) = path.file_name() {
                if !dir_name.to_string_lossy().starts_with('.') {
                    list_markdown_files_impl(&path, files)?;
                }
            }
        }
    }

    Ok(())
}

/// Path of the sentinel file inside a folder.
pub fn sentinel_path(folder: &Path) -> PathBuf {
    folder.join(SENTINEL_FILE)
}

pub fn is_sentinel(path: &Path) -> bool {
    path.file_name().map_or(false, |name| name == SENTINEL_FILE)
}

/// Read the collection sentinel of a folder, if present and parseable.
pub fn read_book(folder: &Path) -> Option<BookRef> {
    let content = fs::read_to_string(sentinel_path(folder)).ok()?;
    header::decode_book(&content).ok()
}

/// Write (or overwrite) the collection sentinel of a folder.
pub fn write_book(folder: &Path, book: &BookRef) -> Result<()> {
    fs::create_dir_all(folder)
        .with_context(|| format!("Failed to create directory: {}", folder.display()))?;
    let path = sentinel_path(folder);
    fs::write(&path, header::encode_book(book))
        .with_context(|| format!("Failed to write sentinel: {}", path.display()))?;
    Ok(())
}

/// Modification time of a file as a UTC timestamp.
pub fn modified_at(path: &Path) -> Result<DateTime<Utc>> {
    let metadata = fs::metadata(path)
        .with_context(|| format!("Failed to stat file: {}", path.display()))?;
    let mtime = metadata
        .modified()
        .with_context(|| format!("No modification time for: {}", path.display()))?;
    Ok(DateTime::<Utc>::from(mtime))
}

/// The file stem, interpreted as the document's current title.
pub fn current_title(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OpenFlag;
    use tempfile::TempDir;

    #[test]
    fn document_round_trip_through_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Intro.md");
        let header = DocHeader::new_unsynced("Intro".to_string(), Some(7), None);

        write_document(&path, &header, "Hello\n").unwrap();
        let doc = read_document(&path).unwrap();

        assert_eq!(doc.header, header);
        assert_eq!(doc.body, "Hello\n");
    }

    #[test]
    fn rewrite_header_preserves_body() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Doc.md");
        let header = DocHeader::new_unsynced("Doc".to_string(), Some(1), None);
        write_document(&path, &header, "body stays\n").unwrap();

        rewrite_header(&path, |h| {
            h.id = 99;
            h.open_yn = OpenFlag::Locked;
        })
        .unwrap();

        let doc = read_document(&path).unwrap();
        assert_eq!(doc.header.id, 99);
        assert_eq!(doc.header.open_yn, OpenFlag::Locked);
        assert_eq!(doc.body, "body stays\n");
    }

    #[test]
    fn listing_skips_hidden_dirs_and_sorts() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::create_dir_all(dir.path().join(".hidden")).unwrap();
        fs::write(dir.path().join("b.md"), "").unwrap();
        fs::write(dir.path().join("a.md"), "").unwrap();
        fs::write(dir.path().join("sub/c.md"), "").unwrap();
        fs::write(dir.path().join(".hidden/d.md"), "").unwrap();
        fs::write(dir.path().join("not-markdown.txt"), "").unwrap();

        let files = list_markdown_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.md", "b.md", "sub/c.md"]);
    }

    #[test]
    fn sentinel_read_write() {
        let dir = TempDir::new().unwrap();
        let book = BookRef {
            id: 7,
            title: "Guide".to_string(),
        };
        write_book(dir.path(), &book).unwrap();
        assert!(is_sentinel(&sentinel_path(dir.path())));
        assert_eq!(read_book(dir.path()), Some(book));
    }
}
