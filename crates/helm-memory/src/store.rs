//! Shared on-disk JSON helpers.
//!
//! Every document this crate writes goes through
//! [`write_json_atomic`]: serialize, write to `<path>.tmp`, then rename
//! over the destination. Readers therefore never observe a torn file.
//! The pattern is single-writer only; concurrent multi-process writers are
//! last-writer-wins.

use std::fs;
use std::path::{Path, PathBuf};

use helm_types::HelmError;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// `<path>.tmp` sibling used for the staged write.
fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Serialize `value` and atomically replace `path` with it, creating parent
/// directories as needed.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), HelmError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| HelmError::persistence(parent.display(), e))?;
        }
    }
    let raw = serde_json::to_string_pretty(value)
        .map_err(|e| HelmError::persistence(path.display(), e))?;
    let tmp = tmp_path(path);
    fs::write(&tmp, raw).map_err(|e| HelmError::persistence(tmp.display(), e))?;
    fs::rename(&tmp, path).map_err(|e| HelmError::persistence(path.display(), e))?;
    Ok(())
}

/// Best-effort JSON read: `None` when the file is missing, unreadable, or
/// does not parse. Cache loaders use this so a corrupt cache means a fresh
/// start, never a crash.
pub fn read_json_lenient<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let raw = fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        version: u32,
        label: String,
    }

    #[test]
    fn atomic_write_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("doc.json");
        let doc = Doc {
            version: 1,
            label: "hello".into(),
        };
        write_json_atomic(&path, &doc).unwrap();
        let back: Doc = read_json_lenient(&path).unwrap();
        assert_eq!(doc, back);
        // No staged temp file left behind.
        assert!(!path.with_file_name("doc.json.tmp").exists());
    }

    #[test]
    fn atomic_write_replaces_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        write_json_atomic(&path, &Doc { version: 1, label: "a".into() }).unwrap();
        write_json_atomic(&path, &Doc { version: 2, label: "b".into() }).unwrap();
        let back: Doc = read_json_lenient(&path).unwrap();
        assert_eq!(back.version, 2);
    }

    #[test]
    fn lenient_read_tolerates_missing_and_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(read_json_lenient::<Doc>(&missing).is_none());

        let corrupt = dir.path().join("corrupt.json");
        std::fs::write(&corrupt, "{not json").unwrap();
        assert!(read_json_lenient::<Doc>(&corrupt).is_none());
    }
}
