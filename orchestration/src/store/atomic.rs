//! Write-tmp-then-rename JSON I/O.
//!
//! The tmp file is a sibling of the target (same filesystem, so the rename is
//! atomic) and is fsynced before the rename. Corrupt files are never
//! overwritten in place — they are moved aside first so the bad bytes stay
//! available for inspection.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use super::{StoreError, StoreResult};

/// Serialize `value` as pretty JSON and atomically install it at `path`.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| StoreError::corrupt(path, format!("serialize: {e}")))?;
    write_bytes_atomic(path, &bytes)
}

/// Atomically install a UTF-8 document at `path`.
pub fn write_string_atomic(path: &Path, content: &str) -> StoreResult<()> {
    write_bytes_atomic(path, content.as_bytes())
}

fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }

    let tmp = tmp_sibling(path);
    {
        let mut file = File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
        file.write_all(bytes).map_err(|e| StoreError::io(&tmp, e))?;
        file.sync_all().map_err(|e| StoreError::io(&tmp, e))?;
    }
    fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))?;
    Ok(())
}

fn tmp_sibling(path: &Path) -> std::path::PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    path.with_file_name(format!(".{name}.tmp-{}", std::process::id()))
}

/// Read a JSON document. Missing file is `Ok(None)`; malformed content is
/// [`StoreError::Corrupt`].
pub fn read_json<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    serde_json::from_str(&data)
        .map(Some)
        .map_err(|e| StoreError::corrupt(path, e.to_string()))
}

/// Read a JSON document, quarantining it on corruption.
///
/// A malformed file is renamed to `<name>.corrupt-<unix-seconds>` and the
/// state is treated as empty so the caller can continue.
pub fn read_json_or_quarantine<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    match read_json(path) {
        Ok(value) => Ok(value),
        Err(StoreError::Corrupt { detail, .. }) => {
            let aside = path.with_file_name(format!(
                "{}.corrupt-{}",
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "state".to_string()),
                Utc::now().timestamp()
            ));
            warn!(
                path = %path.display(),
                aside = %aside.display(),
                detail,
                "quarantining corrupt state file"
            );
            fs::rename(path, &aside).map_err(|e| StoreError::io(path, e))?;
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Doc {
        name: String,
        count: u32,
    }

    #[test]
    fn test_write_read_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("doc.json");

        let doc = Doc {
            name: "alpha".into(),
            count: 3,
        };
        write_json_atomic(&path, &doc).unwrap();

        let loaded: Doc = read_json(&path).unwrap().unwrap();
        assert_eq!(loaded, doc);
    }

    #[test]
    fn test_read_missing_is_none() {
        let dir = tempdir().unwrap();
        let loaded: Option<Doc> = read_json(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_read_corrupt_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();

        let result: StoreResult<Option<Doc>> = read_json(&path);
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_quarantine_moves_corrupt_aside() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();

        let loaded: Option<Doc> = read_json_or_quarantine(&path).unwrap();
        assert!(loaded.is_none());
        assert!(!path.exists());

        // Moved aside, not deleted.
        let aside_exists = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().starts_with("bad.json.corrupt-"));
        assert!(aside_exists);
    }

    #[test]
    fn test_overwrite_is_atomic_replace() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");

        write_json_atomic(&path, &Doc { name: "a".into(), count: 1 }).unwrap();
        write_json_atomic(&path, &Doc { name: "b".into(), count: 2 }).unwrap();

        let loaded: Doc = read_json(&path).unwrap().unwrap();
        assert_eq!(loaded.name, "b");

        // No tmp siblings left behind.
        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .count();
        assert_eq!(leftovers, 0);
    }
}
