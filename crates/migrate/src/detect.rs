//! Structural classification of snapshot metadata documents.

use charsnap_common::{BlobHash, GamePath};
use serde_json::{Map, Value};
use std::path::Path;

/// On-disk schema generation of a snapshot directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    /// Unrecognized or unreadable. Never migrated.
    Unknown,
    /// Legacy `hash → [paths]` replacement shape.
    Old,
    /// Current `path → hash` shape without a version stamp.
    NewButUnversioned,
    /// Stamped with `format_version`; nothing to do.
    NewAndVersioned,
}

/// Tagged parse result over a generic JSON tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedSnapshot {
    Versioned,
    Unversioned,
    /// Legacy replacements in document order.
    Legacy(Vec<(BlobHash, Vec<GamePath>)>),
    Unrecognized(String),
}

impl ParsedSnapshot {
    pub fn parse(doc: &Value) -> Self {
        let Some(obj) = doc.as_object() else {
            return Self::Unrecognized("document is not an object".into());
        };
        if obj.contains_key("format_version") {
            return Self::Versioned;
        }
        let Some(replacements) = obj.get("file_replacements").and_then(Value::as_object) else {
            return Self::Unrecognized("no file_replacements object".into());
        };
        match replacements.values().next() {
            None => Self::Unversioned,
            Some(Value::String(_)) => parse_unversioned(replacements),
            Some(Value::Array(_)) => parse_legacy(replacements),
            Some(other) => Self::Unrecognized(format!("unexpected replacement value: {other}")),
        }
    }

    pub fn format(&self) -> SnapshotFormat {
        match self {
            Self::Versioned => SnapshotFormat::NewAndVersioned,
            Self::Unversioned => SnapshotFormat::NewButUnversioned,
            Self::Legacy(_) => SnapshotFormat::Old,
            Self::Unrecognized(_) => SnapshotFormat::Unknown,
        }
    }
}

fn parse_unversioned(replacements: &Map<String, Value>) -> ParsedSnapshot {
    for (path, value) in replacements {
        let valid = GamePath::new(path).is_ok()
            && value.as_str().is_some_and(|h| BlobHash::new(h).is_ok());
        if !valid {
            return ParsedSnapshot::Unrecognized(format!("mixed or invalid entry for {path:?}"));
        }
    }
    ParsedSnapshot::Unversioned
}

fn parse_legacy(replacements: &Map<String, Value>) -> ParsedSnapshot {
    let mut out = Vec::with_capacity(replacements.len());
    for (hash, value) in replacements {
        let Ok(hash) = BlobHash::new(hash) else {
            return ParsedSnapshot::Unrecognized(format!("invalid legacy hash {hash:?}"));
        };
        let Some(items) = value.as_array() else {
            return ParsedSnapshot::Unrecognized(format!("mixed entry for hash {hash}"));
        };
        let mut paths = Vec::with_capacity(items.len());
        for item in items {
            match item.as_str().map(GamePath::new) {
                Some(Ok(p)) => paths.push(p),
                _ => {
                    return ParsedSnapshot::Unrecognized(format!(
                        "invalid legacy path under hash {hash}"
                    ));
                }
            }
        }
        out.push((hash, paths));
    }
    ParsedSnapshot::Legacy(out)
}

/// Classify a metadata file. Read and parse failures are `Unknown`.
pub fn detect_format(metadata_file: &Path) -> SnapshotFormat {
    read_document(metadata_file)
        .map(|doc| ParsedSnapshot::parse(&doc).format())
        .unwrap_or(SnapshotFormat::Unknown)
}

pub(crate) fn read_document(metadata_file: &Path) -> Option<Value> {
    let bytes = match std::fs::read(metadata_file) {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(file = %metadata_file.display(), error = %e, "cannot read snapshot metadata");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(doc) => Some(doc),
        Err(e) => {
            tracing::warn!(file = %metadata_file.display(), error = %e, "cannot parse snapshot metadata");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn format_of(doc: Value) -> SnapshotFormat {
        ParsedSnapshot::parse(&doc).format()
    }

    #[test]
    fn version_field_wins() {
        assert_eq!(
            format_of(json!({"format_version": 1, "file_replacements": {"aa": ["x.tex"]}})),
            SnapshotFormat::NewAndVersioned
        );
        assert_eq!(format_of(json!({"format_version": null})), SnapshotFormat::NewAndVersioned);
    }

    #[test]
    fn string_values_are_unversioned() {
        assert_eq!(
            format_of(json!({"file_replacements": {"chara/a.tex": "0a"}})),
            SnapshotFormat::NewButUnversioned
        );
        assert_eq!(format_of(json!({"file_replacements": {}})), SnapshotFormat::NewButUnversioned);
    }

    #[test]
    fn array_values_are_old() {
        let parsed = ParsedSnapshot::parse(&json!({
            "file_replacements": {"0A": ["chara/a.tex", "chara/b.tex"], "0b": []}
        }));
        let ParsedSnapshot::Legacy(entries) = parsed else {
            panic!("expected legacy shape");
        };
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0.as_str(), "0a");
        assert_eq!(entries[0].1.len(), 2);
    }

    #[test]
    fn first_value_decides_in_document_order() {
        // The first value is an array even though "b..." sorts after "a...".
        let doc: Value =
            serde_json::from_str(r#"{"file_replacements": {"bb": ["x.tex"], "aa": ["y.tex"]}}"#)
                .unwrap();
        let ParsedSnapshot::Legacy(entries) = ParsedSnapshot::parse(&doc) else {
            panic!("expected legacy shape");
        };
        assert_eq!(entries[0].0.as_str(), "bb");
    }

    #[test]
    fn everything_else_is_unknown() {
        for doc in [
            json!([]),
            json!("text"),
            json!({}),
            json!({"file_replacements": []}),
            json!({"file_replacements": {"a.tex": 5}}),
            json!({"file_replacements": {"a.tex": "0a", "b.tex": ["x"]}}),
            json!({"file_replacements": {"0a": ["x.tex"], "0b": "y"}}),
            json!({"file_replacements": {"not-hex": ["x.tex"]}}),
            json!({"file_replacements": {"0a": [1]}}),
        ] {
            assert_eq!(format_of(doc.clone()), SnapshotFormat::Unknown, "{doc}");
        }
    }

    #[test]
    fn unreadable_files_are_unknown() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("snapshot.json");
        assert_eq!(detect_format(&missing), SnapshotFormat::Unknown);
        std::fs::write(&missing, b"{ broken").unwrap();
        assert_eq!(detect_format(&missing), SnapshotFormat::Unknown);
    }
}
