//! Execution provider contract.
//!
//! Local, Docker and SSH execution share one shape so the PM treats them
//! interchangeably. Only the local provider ships here; remote providers
//! are deployment adapters behind the same trait.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{AdapterError, AdapterResult};
use crate::util::pid_alive;

/// Where a managed process stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Exited,
    Unknown,
}

/// A provider that can run agent processes somewhere.
#[async_trait]
pub trait ExecutionProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Launch a shell command; returns an opaque execution id.
    async fn spawn(&self, command: &str, workdir: &PathBuf) -> AdapterResult<String>;

    /// Kill an execution.
    async fn kill(&self, execution_id: &str) -> AdapterResult<()>;

    /// Current status.
    async fn get_status(&self, execution_id: &str) -> AdapterResult<ExecutionStatus>;

    /// Recent output lines, best effort.
    async fn get_logs(&self, execution_id: &str, lines: usize) -> AdapterResult<Vec<String>>;

    /// Whether the provider itself is usable on this host.
    async fn is_available(&self) -> bool;
}

/// Runs processes directly on this host. Execution ids are pids.
pub struct LocalExecutor;

#[async_trait]
impl ExecutionProvider for LocalExecutor {
    fn name(&self) -> &str {
        "local"
    }

    async fn spawn(&self, command: &str, workdir: &PathBuf) -> AdapterResult<String> {
        let child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(workdir)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| AdapterError::Io(e.to_string()))?;
        let pid = child
            .id()
            .ok_or_else(|| AdapterError::Io("child exited before pid read".into()))?;
        Ok(pid.to_string())
    }

    async fn kill(&self, execution_id: &str) -> AdapterResult<()> {
        let pid = parse_pid(execution_id)?;
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
        Ok(())
    }

    async fn get_status(&self, execution_id: &str) -> AdapterResult<ExecutionStatus> {
        let pid = parse_pid(execution_id)?;
        Ok(if pid_alive(pid) {
            ExecutionStatus::Running
        } else {
            ExecutionStatus::Exited
        })
    }

    async fn get_logs(&self, _execution_id: &str, _lines: usize) -> AdapterResult<Vec<String>> {
        // Local processes log through the supervisor's rotating files.
        Ok(Vec::new())
    }

    async fn is_available(&self) -> bool {
        true
    }
}

fn parse_pid(execution_id: &str) -> AdapterResult<u32> {
    execution_id
        .parse()
        .map_err(|_| AdapterError::Io(format!("bad execution id: {execution_id}")))
}
