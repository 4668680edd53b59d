use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the sync layer.
///
/// Per-document errors (`MalformedHeader`, `ImageUpload`) abort the single
/// document they concern, never the surrounding batch; the batch policy
/// lives in the engine.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Header block missing required fields or not parseable at all.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// The folder carries no readable collection sentinel.
    #[error("no collection id found under {}", .0.display())]
    MissingCollectionId(PathBuf),

    /// Non-success HTTP response from the remote service. Not retried.
    #[error("remote request failed with status {status}: {url}")]
    RemoteFetch { status: u16, url: String },

    /// An embedded image could not be uploaded; the owning document's push
    /// is abandoned since its content may reference the missing image.
    #[error("image upload failed for {name}: {reason}")]
    ImageUpload { name: String, reason: String },

    /// No API token configured. Checked before any network attempt.
    #[error("no API token configured; run `quill setup --token <token>`")]
    MissingToken,

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
