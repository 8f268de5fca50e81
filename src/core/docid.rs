//! Canonical document identifiers
//!
//! Document IDs arrive from the vault scanner, from the UI and from older
//! index entries in slightly different shapes (`notes\Folder\a.md`,
//! `/notes/Folder/a.md`, `Folder/a.md`). Every comparison between the
//! authoritative listing and the index goes through [`normalize_document_id`].

/// Collection-style prefixes stripped from the front of an ID
const COLLECTION_PREFIXES: &[&str] = &["notes/"];

/// Normalize a document ID to its canonical form.
///
/// Backslashes become forward slashes, empty segments collapse, whitespace
/// around segments is dropped, a leading `./` is trimmed and a leading
/// collection prefix is removed. The remaining folder path is kept. Applying
/// it twice gives the same result.
pub fn normalize_document_id(id: &str) -> String {
    let unified = id.replace('\\', "/");

    let mut collapsed = String::with_capacity(unified.len());
    for segment in unified.split('/') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        if !collapsed.is_empty() {
            collapsed.push('/');
        }
        collapsed.push_str(segment);
    }

    let mut rest = collapsed.as_str();
    loop {
        let before = rest;
        rest = rest.strip_prefix("./").unwrap_or(rest);
        for prefix in COLLECTION_PREFIXES {
            if let Some(stripped) = rest.strip_prefix(prefix) {
                rest = stripped;
                break;
            }
        }
        if rest == before {
            break;
        }
    }

    rest.to_string()
}

/// Storage key of a vector record: `collection:documentId`
pub fn record_key(collection: &str, document_id: &str) -> String {
    format!("{}:{}", collection, document_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_prefix_and_backslashes() {
        assert_eq!(
            normalize_document_id("notes/Folder\\Sub\\note.md"),
            "Folder/Sub/note.md"
        );
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "notes/Folder\\Sub\\note.md",
            "/notes//a.md",
            "./notes/notes/b.md",
            "Projects/plan.md",
            "notes",
            "",
            "  notes\\x.md ",
        ];
        for input in inputs {
            let once = normalize_document_id(input);
            assert_eq!(normalize_document_id(&once), once, "input: {input:?}");
        }
    }

    #[test]
    fn test_preserves_folder_path() {
        assert_eq!(normalize_document_id("Projects/2024/plan.md"), "Projects/2024/plan.md");
        assert_eq!(normalize_document_id("doc1"), "doc1");
    }

    #[test]
    fn test_prefix_must_be_whole_segment() {
        assert_eq!(normalize_document_id("notesfolder/a.md"), "notesfolder/a.md");
        // A bare "notes" with no trailing segment is a document, not a prefix
        assert_eq!(normalize_document_id("notes"), "notes");
    }

    #[test]
    fn test_record_key() {
        assert_eq!(record_key("notes", "doc1"), "notes:doc1");
    }
}
