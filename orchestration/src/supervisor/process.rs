//! Agent process lifecycle: spawn through an adapter-built command, attach
//! output to the rotating log, terminate gracefully.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{info, warn};

use super::logs::RotatingLog;
use super::{SupervisorError, SupervisorResult};
use crate::paths::StateLayout;
use crate::util::pid_alive;

/// Grace period between SIGTERM and SIGKILL.
const TERM_GRACE: Duration = Duration::from_secs(5);

/// A spawned agent process under supervision.
pub struct AgentHandle {
    pub pid: u32,
    pub task_id: String,
    pub log_path: std::path::PathBuf,
    child: tokio::process::Child,
    log: Arc<RotatingLog>,
}

impl AgentHandle {
    /// Non-blocking liveness probe.
    pub fn is_alive(&self) -> bool {
        pid_alive(self.pid)
    }

    /// Wait for natural exit, writing the footer.
    pub async fn wait(mut self) -> SupervisorResult<Option<i32>> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| SupervisorError::Spawn(e.to_string()))?;
        let code = status.code();
        self.log.write_footer(code, signal_of(&status))?;
        Ok(code)
    }

    /// Graceful terminate: SIGTERM, a grace period, then SIGKILL.
    pub async fn terminate(mut self) -> SupervisorResult<()> {
        unsafe {
            libc::kill(self.pid as libc::pid_t, libc::SIGTERM);
        }
        let graceful =
            tokio::time::timeout(TERM_GRACE, self.child.wait()).await;
        match graceful {
            Ok(Ok(status)) => {
                self.log.write_footer(status.code(), signal_of(&status))?;
                info!(pid = self.pid, "agent terminated gracefully");
            }
            _ => {
                warn!(pid = self.pid, "agent ignored SIGTERM, killing");
                let _ = self.child.kill().await;
                self.log.write_footer(None, Some(libc::SIGKILL))?;
            }
        }
        Ok(())
    }
}

fn signal_of(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

/// Spawns and supervises agent processes.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    layout: StateLayout,
}

impl ProcessSupervisor {
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }

    /// Spawn `shell_command` for `task_id`, wiring stdout/stderr into the
    /// task's rotating log.
    pub fn spawn(
        &self,
        task_id: &str,
        shell_command: &str,
        workdir: &Path,
    ) -> SupervisorResult<AgentHandle> {
        let log_path = self.layout.agent_process_log(task_id);
        let log = Arc::new(RotatingLog::new(&log_path));

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(shell_command)
            .current_dir(workdir)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| SupervisorError::Spawn(e.to_string()))?;

        let pid = child
            .id()
            .ok_or_else(|| SupervisorError::Spawn("child exited before pid read".into()))?;
        log.write_header(pid, task_id)?;
        info!(pid, task_id, log = %log_path.display(), "agent spawned");

        if let Some(stdout) = child.stdout.take() {
            spawn_stream_writer(stdout, "stdout", log.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_stream_writer(stderr, "stderr", log.clone());
        }

        Ok(AgentHandle {
            pid,
            task_id: task_id.to_string(),
            log_path,
            child,
            log,
        })
    }

    /// Probe a pid recorded in a session lockfile.
    pub fn is_pid_alive(&self, pid: u32) -> bool {
        pid_alive(pid)
    }
}

fn spawn_stream_writer<R>(reader: R, stream: &'static str, log: Arc<RotatingLog>)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Err(e) = log.write_line(stream, &line) {
                warn!(stream, error = %e, "failed to write agent log line");
                break;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_spawn_captures_both_streams() {
        let dir = tempdir().unwrap();
        let supervisor = ProcessSupervisor::new(StateLayout::new(dir.path()));

        let handle = supervisor
            .spawn("task-1", "echo out-line; echo err-line >&2", dir.path())
            .unwrap();
        let log_path = handle.log_path.clone();
        let code = handle.wait().await.unwrap();
        assert_eq!(code, Some(0));

        // Give the reader tasks a beat to flush.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let content = std::fs::read_to_string(&log_path).unwrap();
        assert!(content.contains("[stdout] out-line"));
        assert!(content.contains("[stderr] err-line"));
        assert!(content.contains("agent run start"));
        assert!(content.contains("exit=0"));
    }

    #[tokio::test]
    async fn test_terminate_kills_stubborn_process() {
        let dir = tempdir().unwrap();
        let supervisor = ProcessSupervisor::new(StateLayout::new(dir.path()));

        let handle = supervisor
            .spawn("task-2", "sleep 300", dir.path())
            .unwrap();
        let pid = handle.pid;
        assert!(handle.is_alive());

        handle.terminate().await.unwrap();
        // SIGTERM is enough for sleep; either way the process must be gone.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!pid_alive(pid));
    }

    #[tokio::test]
    async fn test_nonzero_exit_recorded() {
        let dir = tempdir().unwrap();
        let supervisor = ProcessSupervisor::new(StateLayout::new(dir.path()));

        let handle = supervisor.spawn("task-3", "exit 3", dir.path()).unwrap();
        let log_path = handle.log_path.clone();
        let code = handle.wait().await.unwrap();
        assert_eq!(code, Some(3));

        let content = std::fs::read_to_string(&log_path).unwrap();
        assert!(content.contains("exit=3"));
    }
}
