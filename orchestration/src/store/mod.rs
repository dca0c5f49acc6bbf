//! Atomic store — the single primitive every shared-state mutation goes
//! through.
//!
//! JSON documents are written tmp-then-rename so concurrent readers never see
//! torn writes; append-only logs are line-oriented JSONL whose readers discard
//! a partially-written trailing line. Schema validation is a first-class gate
//! in front of any publish.

mod atomic;
mod jsonl;
mod schema;

pub use atomic::{read_json, read_json_or_quarantine, write_json_atomic, write_string_atomic};
pub use jsonl::{append_jsonl, read_jsonl, read_jsonl_tail, rewrite_jsonl_atomic};
pub use schema::{validate, Schema};

use std::path::PathBuf;

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt state at {path}: {detail}")]
    Corrupt { path: PathBuf, detail: String },

    #[error("schema violation at {pointer}: {detail}")]
    SchemaInvalid { pointer: String, detail: String },
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            detail: detail.into(),
        }
    }
}
