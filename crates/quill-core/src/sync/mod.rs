use crate::api::{BookSummary, PageUpdate, RemotePage, Transport};
use crate::dirty;
use crate::error::SyncError;
use crate::header::sanitize_title;
use crate::images;
use crate::models::{DocHeader, UNSYNCED_ID};
use crate::store;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared "sync in progress" token.
///
/// The reconciler skips creation events while a guard is alive so files
/// materialized by a pull are not mistaken for user-authored documents.
/// Scoped per engine instance rather than process-global; the count makes
/// nested operations (push refreshing via pull) safe.
#[derive(Debug, Clone, Default)]
pub struct SyncGate {
    active: Arc<AtomicUsize>,
}

impl SyncGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a pull or push holds a guard.
    pub fn in_progress(&self) -> bool {
        self.active.load(Ordering::SeqCst) > 0
    }

    pub(crate) fn enter(&self) -> SyncGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        SyncGuard {
            active: Arc::clone(&self.active),
        }
    }
}

/// RAII guard for [`SyncGate`]; released on every exit path.
pub struct SyncGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for SyncGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Result of a pull.
#[derive(Debug, Clone, PartialEq)]
pub struct PullOutcome {
    pub book_id: i64,
    pub pages_written: usize,
}

/// Result of a push over a folder.
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    /// Every dirty document pushed cleanly; the refresh pull ran.
    Pushed {
        pushed: usize,
        refreshed: PullOutcome,
    },
    /// At least one document failed; the refresh pull was suppressed.
    Partial { pushed: usize, errors: usize },
    /// No document needed a push.
    NothingChanged,
}

/// Orchestrates full-subtree pull and push between a local folder tree and
/// the remote service.
pub struct SyncEngine<T: Transport> {
    transport: T,
    media_dir: Option<PathBuf>,
    gate: SyncGate,
}

impl<T: Transport> SyncEngine<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            media_dir: None,
            gate: SyncGate::new(),
        }
    }

    /// Fallback directory for embedded image lookups.
    pub fn with_media_dir(mut self, media_dir: Option<PathBuf>) -> Self {
        self.media_dir = media_dir;
        self
    }

    /// Handle to the in-progress gate, for event consumers.
    pub fn gate(&self) -> SyncGate {
        self.gate.clone()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Remote collections available for linking.
    pub async fn list_books(&self) -> Result<Vec<BookSummary>> {
        Ok(self.transport.list_books().await?)
    }

    /// Pull the collection linked to `folder` from the remote side.
    ///
    /// Destructive: every non-sentinel entry under `folder` is removed
    /// before the remote tree is materialized. Callers warn the user first.
    pub async fn pull(&self, folder: &Path) -> Result<PullOutcome> {
        let _guard = self.gate.enter();
        self.pull_inner(folder).await
    }

    async fn pull_inner(&self, folder: &Path) -> Result<PullOutcome> {
        let book = store::read_book(folder)
            .ok_or_else(|| SyncError::MissingCollectionId(folder.to_path_buf()))?;
        let remote = self.transport.fetch_book(book.id).await?;

        purge_folder(folder)?;

        let stamp = Utc::now();
        let mut written = 0;
        for page in &remote.pages {
            write_page_tree(folder, remote.id, page, stamp, &mut written)?;
        }

        Ok(PullOutcome {
            book_id: remote.id,
            pages_written: written,
        })
    }

    /// Push every dirty document under `folder`, sequentially.
    ///
    /// Per-document failures are logged and counted but do not stop the
    /// batch; any failure suppresses the trailing refresh pull. When at
    /// least one document went out and none failed, the folder is re-pulled
    /// so server-assigned ids and timestamps land back in local headers.
    pub async fn push(&self, folder: &Path) -> Result<PushOutcome> {
        let _guard = self.gate.enter();

        let mut pushed = 0usize;
        let mut errors = 0usize;

        for path in store::list_markdown_files(folder)? {
            if store::is_sentinel(&path) {
                continue;
            }
            match self.push_document(&path).await {
                Ok(true) => pushed += 1,
                Ok(false) => {}
                Err(e) => {
                    errors += 1;
                    eprintln!("quill: failed to push {}: {e:#}", path.display());
                }
            }
        }

        if pushed > 0 && errors == 0 {
            let refreshed = self.pull_inner(folder).await?;
            return Ok(PushOutcome::Pushed { pushed, refreshed });
        }
        if pushed == 0 && errors == 0 {
            return Ok(PushOutcome::NothingChanged);
        }
        Ok(PushOutcome::Partial { pushed, errors })
    }

    /// Push a single document if it is dirty. Returns whether it went out.
    async fn push_document(&self, path: &Path) -> Result<bool> {
        let doc = store::read_document(path)?;
        let current_title = store::current_title(path);
        let modified = store::modified_at(path)?;

        if !dirty::needs_sync(&doc.header, modified, &current_title) {
            return Ok(false);
        }

        let folder = path
            .parent()
            .context("document has no parent folder")?
            .to_path_buf();
        // The subject sent is always the current on-disk title; this is how
        // renames reach the remote side.
        let subject = sanitize_title(&current_title);

        if doc.header.is_unsynced() {
            // Two-phase create: the first round-trip exists only to obtain
            // the id the image upload needs.
            let create = PageUpdate {
                id: UNSYNCED_ID,
                book_id: doc.header.book_id,
                parent_id: doc.header.parent_id,
                subject: subject.clone(),
                content: doc.body.clone(),
                open_yn: doc.header.open_yn,
            };
            let new_id = self.transport.push_page(&create).await?;
            // Persist the assigned id before anything that depends on it.
            store::rewrite_header(path, |h| h.id = new_id)?;

            let content = self.upload_images(new_id, &folder, &doc.body).await?;
            let fill = PageUpdate {
                id: new_id,
                content,
                ..create
            };
            self.transport.push_page(&fill).await?;
            store::rewrite_header(path, |h| h.last_synced = Some(Utc::now()))?;
        } else {
            let content = self.upload_images(doc.header.id, &folder, &doc.body).await?;
            let update = PageUpdate {
                id: doc.header.id,
                book_id: doc.header.book_id,
                parent_id: doc.header.parent_id,
                subject,
                content,
                open_yn: doc.header.open_yn,
            };
            self.transport.push_page(&update).await?;
            store::rewrite_header(path, |h| h.last_synced = Some(Utc::now()))?;
        }

        Ok(true)
    }

    /// Upload the local images embedded in `body`, tagged with `page_id`,
    /// and substitute the returned URLs into the outgoing content. The local
    /// file keeps its original embeds; the refresh pull settles the rest.
    async fn upload_images(&self, page_id: i64, folder: &Path, body: &str) -> Result<String> {
        let refs = images::extract_image_refs(body);
        if refs.is_empty() {
            return Ok(body.to_string());
        }

        let mut content = body.to_string();
        for image in refs {
            let local = match images::resolve_image(&image.target, folder, self.media_dir.as_deref())
            {
                Some(local) => local,
                // Embeds pointing nowhere are pushed as written.
                None => continue,
            };
            let bytes = fs::read(&local)
                .with_context(|| format!("Failed to read image: {}", local.display()))?;
            let name = local
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| image.target.clone());
            let url = self
                .transport
                .upload_image(page_id, &name, bytes)
                .await
                .map_err(|e| SyncError::ImageUpload {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            content = content.replace(&image.embed, &format!("![{name}]({url})"));
        }

        Ok(content)
    }
}

/// Remove every non-sentinel entry under `folder`. Not atomic; a concurrent
/// external write during this window can be lost.
fn purge_folder(folder: &Path) -> Result<()> {
    let entries = fs::read_dir(folder)
        .with_context(|| format!("Failed to read folder: {}", folder.display()))?;
    for entry in entries {
        let path = entry?.path();
        if store::is_sentinel(&path) {
            continue;
        }
        if path.is_dir() {
            fs::remove_dir_all(&path)
                .with_context(|| format!("Failed to remove folder: {}", path.display()))?;
        } else {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove file: {}", path.display()))?;
        }
    }
    Ok(())
}

/// Materialize one remote page as a file, then recurse into its children
/// through a folder named after the page.
fn write_page_tree(
    folder: &Path,
    book_id: i64,
    page: &RemotePage,
    stamp: DateTime<Utc>,
    written: &mut usize,
) -> Result<()> {
    let title = sanitize_title(&page.subject);
    let header = DocHeader {
        id: page.id,
        subject: page.subject.clone(),
        book_id,
        parent_id: page.parent_id,
        open_yn: page.open_yn,
        last_synced: Some(stamp),
    };
    store::write_document(&folder.join(format!("{title}.md")), &header, &page.content)?;
    *written += 1;

    if !page.children.is_empty() {
        let child_folder = folder.join(&title);
        fs::create_dir_all(&child_folder)
            .with_context(|| format!("Failed to create folder: {}", child_folder.display()))?;
        for child in &page.children {
            write_page_tree(&child_folder, book_id, child, stamp, written)?;
        }
    }

    Ok(())
}
