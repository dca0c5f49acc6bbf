//! Rotating, line-stamped agent logs.
//!
//! `logs/agent-<taskId>.log` rotates at 10 MiB into up to three numbered
//! generations (`.1` newest, `.3` oldest). Every line carries a `[HH:MM:SS]`
//! stamp and the source stream; headers and footers frame each run.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;

use super::{SupervisorError, SupervisorResult};

/// Rotation threshold.
pub const ROTATE_BYTES: u64 = 10 * 1024 * 1024;

/// Older generations kept after rotation.
pub const MAX_LOG_GENERATIONS: u32 = 3;

/// Append-only writer with size-based rotation.
#[derive(Debug)]
pub struct RotatingLog {
    path: PathBuf,
    rotate_bytes: u64,
}

impl RotatingLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            rotate_bytes: ROTATE_BYTES,
        }
    }

    /// Override the rotation threshold (tests).
    pub fn with_rotate_bytes(mut self, bytes: u64) -> Self {
        self.rotate_bytes = bytes;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Frame the start of a run.
    pub fn write_header(&self, pid: u32, task_id: &str) -> SupervisorResult<()> {
        self.write_raw(&format!(
            "===== agent run start | pid={pid} task={task_id} | {} =====",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        ))
    }

    /// Frame the end of a run with its exit status.
    pub fn write_footer(&self, exit_code: Option<i32>, signal: Option<i32>) -> SupervisorResult<()> {
        self.write_raw(&format!(
            "===== agent run end | exit={} signal={} | {} =====",
            exit_code.map_or_else(|| "none".to_string(), |c| c.to_string()),
            signal.map_or_else(|| "none".to_string(), |s| s.to_string()),
            Local::now().format("%Y-%m-%d %H:%M:%S")
        ))
    }

    /// Append one output line: `[HH:MM:SS] [stdout|stderr] text`.
    pub fn write_line(&self, stream: &str, line: &str) -> SupervisorResult<()> {
        self.write_raw(&format!(
            "[{}] [{stream}] {line}",
            Local::now().format("%H:%M:%S")
        ))
    }

    fn write_raw(&self, line: &str) -> SupervisorResult<()> {
        self.rotate_if_needed()?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SupervisorError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| SupervisorError::Io {
                path: self.path.clone(),
                source: e,
            })?;
        writeln!(file, "{line}").map_err(|e| SupervisorError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        Ok(())
    }

    fn rotate_if_needed(&self) -> SupervisorResult<()> {
        let size = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(_) => return Ok(()),
        };
        if size < self.rotate_bytes {
            return Ok(());
        }

        // Shift generations: .2 -> .3 (oldest dropped), .1 -> .2, base -> .1
        let generation = |n: u32| PathBuf::from(format!("{}.{n}", self.path.display()));
        let _ = std::fs::remove_file(generation(MAX_LOG_GENERATIONS));
        for n in (1..MAX_LOG_GENERATIONS).rev() {
            let _ = std::fs::rename(generation(n), generation(n + 1));
        }
        std::fs::rename(&self.path, generation(1)).map_err(|e| SupervisorError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        Ok(())
    }
}
