use crate::error::SyncError;
use crate::models::{BookRef, DocHeader, OpenFlag, UNSYNCED_ID};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde_yaml::Value;

/// Split a document into its header block and body, if a fenced header is
/// present at the very start.
pub fn split_document(content: &str) -> Option<(&str, &str)> {
    let parts: Vec<&str> = content.splitn(3, "---").collect();
    if parts.len() < 3 || !parts[0].trim().is_empty() {
        return None;
    }
    let body = parts[2].strip_prefix('\n').unwrap_or(parts[2]);
    Some((parts[1], body))
}

/// Body of a document with the header block removed. Content without a
/// header passes through unchanged.
pub fn strip_header(content: &str) -> &str {
    match split_document(content) {
        Some((_, body)) => body,
        None => content,
    }
}

/// Decode a header block into a [`DocHeader`].
///
/// Numeric-looking values are coerced to integers, quoted values are
/// unquoted first, and `null` (in either spelling) collapses to the `-1`
/// absence sentinel. Missing `id` or `subject` is a hard failure.
pub fn decode_header(header: &str) -> Result<DocHeader, SyncError> {
    let value: Value = serde_yaml::from_str(header)
        .map_err(|e| SyncError::MalformedHeader(e.to_string()))?;
    let map = match value.as_mapping() {
        Some(map) => map,
        None => {
            return Err(SyncError::MalformedHeader(
                "header is not a key/value block".to_string(),
            ))
        }
    };

    let id = int_field(map, "id")?
        .ok_or_else(|| SyncError::MalformedHeader("missing `id` field".to_string()))?;
    let subject = string_field(map, "subject")
        .ok_or_else(|| SyncError::MalformedHeader("missing `subject` field".to_string()))?;
    let book_id = int_field(map, "book_id")?.unwrap_or(UNSYNCED_ID);
    let parent_id = int_field(map, "parent_id")?.unwrap_or(UNSYNCED_ID);
    let open_yn = string_field(map, "open_yn")
        .map(|v| OpenFlag::parse(&v))
        .unwrap_or_default();
    let last_synced = string_field(map, "last_synced").and_then(|v| parse_timestamp(&v));

    Ok(DocHeader {
        id,
        subject,
        book_id,
        parent_id,
        open_yn,
        last_synced,
    })
}

/// Encode a [`DocHeader`] as a fenced header block.
///
/// Field order is fixed so encoded headers are byte-stable: id, subject,
/// book_id, parent_id, open_yn, last_synced.
pub fn encode_header(header: &DocHeader) -> String {
    let last_synced = header
        .last_synced
        .map(|t| t.to_rfc3339())
        .unwrap_or_default();
    format!(
        "---\nid: {}\nsubject: {}\nbook_id: {}\nparent_id: {}\nopen_yn: {}\nlast_synced: {}\n---\n",
        header.id,
        quote_if_needed(&header.subject),
        header.book_id,
        header.parent_id,
        header.open_yn.as_str(),
        last_synced,
    )
}

/// Decode a collection sentinel file (`id` + `title` block only).
pub fn decode_book(content: &str) -> Result<BookRef, SyncError> {
    let (header, _) = split_document(content)
        .ok_or_else(|| SyncError::MalformedHeader("sentinel has no header block".to_string()))?;
    let value: Value = serde_yaml::from_str(header)
        .map_err(|e| SyncError::MalformedHeader(e.to_string()))?;
    let map = match value.as_mapping() {
        Some(map) => map,
        None => {
            return Err(SyncError::MalformedHeader(
                "sentinel is not a key/value block".to_string(),
            ))
        }
    };

    let id = int_field(map, "id")?
        .ok_or_else(|| SyncError::MalformedHeader("sentinel missing `id` field".to_string()))?;
    let title = string_field(map, "title")
        .ok_or_else(|| SyncError::MalformedHeader("sentinel missing `title` field".to_string()))?;

    Ok(BookRef { id, title })
}

/// Encode a collection sentinel file.
pub fn encode_book(book: &BookRef) -> String {
    format!(
        "---\nid: {}\ntitle: {}\n---\n",
        book.id,
        quote_if_needed(&book.title)
    )
}

lazy_static! {
    // Characters that cannot appear in file or folder names.
    static ref UNSAFE_CHARS: Regex = Regex::new(r#"[\\/:*?"<>|]"#).unwrap();
}

/// Reduce a title to the form used for file and folder names. Title
/// comparisons always go through this so the header subject and the on-disk
/// name stay comparable.
pub fn sanitize_title(title: &str) -> String {
    UNSAFE_CHARS.replace_all(title, "").trim().to_string()
}

fn field<'a>(map: &'a serde_yaml::Mapping, key: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| k.as_str() == Some(key))
        .map(|(_, v)| v)
}

fn int_field(map: &serde_yaml::Mapping, key: &str) -> Result<Option<i64>, SyncError> {
    let value = match field(map, key) {
        Some(value) => value,
        None => return Ok(None),
    };
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n.as_i64().map(Some).ok_or_else(|| {
            SyncError::MalformedHeader(format!("field `{key}` is not an integer: {n}"))
        }),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
                Ok(None)
            } else {
                trimmed.parse::<i64>().map(Some).map_err(|_| {
                    SyncError::MalformedHeader(format!("field `{key}` is not an integer: {s}"))
                })
            }
        }
        other => Err(SyncError::MalformedHeader(format!(
            "field `{key}` has unexpected type: {other:?}"
        ))),
    }
}

fn string_field(map: &serde_yaml::Mapping, key: &str) -> Option<String> {
    match field(map, key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    // An unparseable timestamp is treated as "never synced" so the document
    // is pushed again rather than silently skipped.
    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn quote_if_needed(text: &str) -> String {
    let needs_quotes = text.is_empty()
        || text != text.trim()
        || text.contains(':')
        || text.contains('#')
        || text.starts_with(['-', '"', '\'', '[', '{', '&', '*', '!', '|', '>', '%', '@']);
    if needs_quotes {
        format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_header() -> DocHeader {
        DocHeader {
            id: 42,
            subject: "Getting Started".to_string(),
            book_id: 7,
            parent_id: 3,
            open_yn: OpenFlag::Locked,
            last_synced: Some(Utc::now()),
        }
    }

    #[test]
    fn round_trip_preserves_all_fields() {
        let header = sample_header();
        let decoded = decode_header(strip_fences(&encode_header(&header))).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn round_trip_unsynced_header() {
        let header = DocHeader::new_unsynced("Draft".to_string(), Some(7), None);
        let decoded = decode_header(strip_fences(&encode_header(&header))).unwrap();
        assert_eq!(decoded, header);
        assert!(decoded.is_unsynced());
        assert_eq!(decoded.parent_id, UNSYNCED_ID);
    }

    #[test]
    fn subject_with_header_syntax_is_quoted() {
        let mut header = sample_header();
        header.subject = "#1 Priorities: a list".to_string();
        let encoded = encode_header(&header);
        assert!(encoded.contains("subject: \"#1 Priorities: a list\""));
        let decoded = decode_header(strip_fences(&encoded)).unwrap();
        assert_eq!(decoded.subject, header.subject);
    }

    #[test]
    fn missing_id_is_malformed() {
        let err = decode_header("subject: No Identity\n").unwrap_err();
        assert!(matches!(err, SyncError::MalformedHeader(_)));
    }

    #[test]
    fn missing_subject_is_malformed() {
        let err = decode_header("id: 9\n").unwrap_err();
        assert!(matches!(err, SyncError::MalformedHeader(_)));
    }

    #[test]
    fn quoted_parent_id_is_unquoted_and_parsed() {
        let decoded = decode_header("id: 1\nsubject: A\nparent_id: \"34\"\n").unwrap();
        assert_eq!(decoded.parent_id, 34);
    }

    #[test]
    fn null_parent_id_collapses_to_absence() {
        let decoded = decode_header("id: 1\nsubject: A\nparent_id: null\n").unwrap();
        assert_eq!(decoded.parent_id, UNSYNCED_ID);
        let decoded = decode_header("id: 1\nsubject: A\nparent_id: \"null\"\n").unwrap();
        assert_eq!(decoded.parent_id, UNSYNCED_ID);
    }

    #[test]
    fn empty_last_synced_means_never() {
        let decoded = decode_header("id: 1\nsubject: A\nlast_synced: \n").unwrap();
        assert_eq!(decoded.last_synced, None);
    }

    #[test]
    fn defaults_for_optional_fields() {
        let decoded = decode_header("id: 1\nsubject: A\n").unwrap();
        assert_eq!(decoded.book_id, UNSYNCED_ID);
        assert_eq!(decoded.parent_id, UNSYNCED_ID);
        assert_eq!(decoded.open_yn, OpenFlag::Open);
        assert_eq!(decoded.last_synced, None);
    }

    #[test]
    fn split_requires_leading_fence() {
        assert!(split_document("no header here").is_none());
        assert!(split_document("text\n---\nid: 1\n---\n").is_none());
        let (header, body) = split_document("---\nid: 1\n---\nBody\n").unwrap();
        assert_eq!(header.trim(), "id: 1");
        assert_eq!(body, "Body\n");
    }

    #[test]
    fn strip_header_keeps_later_rules() {
        let content = "---\nid: 1\nsubject: A\n---\nIntro\n\n---\n\nOutro\n";
        assert_eq!(strip_header(content), "Intro\n\n---\n\nOutro\n");
    }

    #[test]
    fn sentinel_round_trip() {
        let book = BookRef {
            id: 7,
            title: "Guide".to_string(),
        };
        let decoded = decode_book(&encode_book(&book)).unwrap();
        assert_eq!(decoded, book);
    }

    #[test]
    fn sanitize_removes_filesystem_hostile_chars() {
        assert_eq!(sanitize_title("a/b: c?"), "ab c");
        assert_eq!(sanitize_title("  padded  "), "padded");
        assert_eq!(sanitize_title("plain"), "plain");
    }

    fn strip_fences(encoded: &str) -> &str {
        split_document(encoded).expect("encoded header has fences").0
    }
}
