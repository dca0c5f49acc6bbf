//! Append-only JSONL logs.
//!
//! One writer per file (enforced by the ownership rules, not the filesystem).
//! Readers tolerate a torn trailing line — a crash mid-append leaves at most
//! one partial record, which is discarded.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::{write_string_atomic, StoreError, StoreResult};

/// Append one record as a single line.
pub fn append_jsonl<T: Serialize>(path: &Path, record: &T) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    let mut line = serde_json::to_string(record)
        .map_err(|e| StoreError::corrupt(path, format!("serialize: {e}")))?;
    line.push('\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| StoreError::io(path, e))?;
    file.write_all(line.as_bytes())
        .map_err(|e| StoreError::io(path, e))?;
    Ok(())
}

/// Read every parseable record, in append order.
///
/// Malformed lines (including a partially-written tail) are skipped.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> StoreResult<Vec<T>> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(path, e)),
    };

    let mut records = Vec::new();
    let mut skipped = 0usize;
    for line in data.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(record) => records.push(record),
            Err(_) => skipped += 1,
        }
    }
    if skipped > 0 {
        debug!(path = %path.display(), skipped, "skipped malformed jsonl lines");
    }
    Ok(records)
}

/// Read the last `limit` parseable records.
pub fn read_jsonl_tail<T: DeserializeOwned>(path: &Path, limit: usize) -> StoreResult<Vec<T>> {
    let mut records = read_jsonl(path)?;
    if records.len() > limit {
        records.drain(..records.len() - limit);
    }
    Ok(records)
}

/// Atomically replace the log with the given records (used by prune/trim).
pub fn rewrite_jsonl_atomic<T: Serialize>(path: &Path, records: &[T]) -> StoreResult<()> {
    let mut content = String::new();
    for record in records {
        let line = serde_json::to_string(record)
            .map_err(|e| StoreError::corrupt(path, format!("serialize: {e}")))?;
        content.push_str(&line);
        content.push('\n');
    }
    write_string_atomic(path, &content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Rec {
        seq: u32,
        msg: String,
    }

    fn rec(seq: u32) -> Rec {
        Rec {
            seq,
            msg: format!("record {seq}"),
        }
    }

    #[test]
    fn test_append_preserves_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.jsonl");

        for i in 0..5 {
            append_jsonl(&path, &rec(i)).unwrap();
        }

        let records: Vec<Rec> = read_jsonl(&path).unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(records[0].seq, 0);
        assert_eq!(records[4].seq, 4);
    }

    #[test]
    fn test_read_missing_is_empty() {
        let dir = tempdir().unwrap();
        let records: Vec<Rec> = read_jsonl(&dir.path().join("absent.jsonl")).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_torn_tail_discarded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.jsonl");

        append_jsonl(&path, &rec(1)).unwrap();
        append_jsonl(&path, &rec(2)).unwrap();
        // Simulate a crash mid-append: partial line without newline.
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"seq\": 3, \"ms").unwrap();

        let records: Vec<Rec> = read_jsonl(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].seq, 2);
    }

    #[test]
    fn test_malformed_middle_line_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.jsonl");

        append_jsonl(&path, &rec(1)).unwrap();
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(b"garbage line\n").unwrap();
        }
        append_jsonl(&path, &rec(2)).unwrap();

        let records: Vec<Rec> = read_jsonl(&path).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_tail_limit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        for i in 0..10 {
            append_jsonl(&path, &rec(i)).unwrap();
        }

        let records: Vec<Rec> = read_jsonl_tail(&path, 3).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].seq, 7);
    }

    #[test]
    fn test_rewrite_replaces_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        for i in 0..10 {
            append_jsonl(&path, &rec(i)).unwrap();
        }

        rewrite_jsonl_atomic(&path, &[rec(8), rec(9)]).unwrap();
        let records: Vec<Rec> = read_jsonl(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].seq, 8);
    }
}
