use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};

lazy_static! {
    // ![alt](target) and ![[target]] embeds
    static ref MD_IMAGE_RE: Regex = Regex::new(r"!\[[^\]]*\]\(([^)]+)\)").unwrap();
    static ref WIKI_IMAGE_RE: Regex = Regex::new(r"!\[\[([^\]]+)\]\]").unwrap();
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg", "bmp"];

/// A local image embed found in a document body.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRef {
    /// The embed exactly as written in the body.
    pub embed: String,
    /// The referenced file, as written.
    pub target: String,
}

/// Extract local image references from a document body. Remote URLs stay
/// untouched; only targets with a known image extension count. Repeated
/// embeds of the same target collapse into one reference.
pub fn extract_image_refs(body: &str) -> Vec<ImageRef> {
    let mut refs = Vec::new();
    for caps in MD_IMAGE_RE.captures_iter(body) {
        push_ref(&mut refs, &caps[0], &caps[1]);
    }
    for caps in WIKI_IMAGE_RE.captures_iter(body) {
        push_ref(&mut refs, &caps[0], &caps[1]);
    }
    refs
}

fn push_ref(refs: &mut Vec<ImageRef>, embed: &str, target: &str) {
    let target = target.trim();
    if target.starts_with("http://") || target.starts_with("https://") {
        return;
    }
    if !has_image_extension(target) {
        return;
    }
    if refs.iter().any(|r| r.target == target) {
        return;
    }
    refs.push(ImageRef {
        embed: embed.to_string(),
        target: target.to_string(),
    });
}

fn has_image_extension(target: &str) -> bool {
    Path::new(target)
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| {
            IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Resolve an image target against the document's folder, falling back to
/// the configured media directory.
pub fn resolve_image(target: &str, doc_folder: &Path, media_dir: Option<&Path>) -> Option<PathBuf> {
    let local = doc_folder.join(target);
    if local.is_file() {
        return Some(local);
    }
    if let Some(media) = media_dir {
        let fallback = media.join(target);
        if fallback.is_file() {
            return Some(fallback);
        }
    }
    None
}
