//! Shared helpers for external commands and id generation.
//!
//! Every shell-out in the orchestrator goes through [`run_with_timeout`] so
//! the wall-clock budgets of the external-command contract hold everywhere.

use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;

/// Outcome of an external command run under a deadline.
#[derive(Debug)]
pub enum CommandOutcome {
    /// Process exited within the budget.
    Completed {
        status_code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    /// Deadline elapsed; the process was killed.
    TimedOut,
}

impl CommandOutcome {
    /// Stdout when the command completed successfully, `None` otherwise.
    pub fn success_stdout(self) -> Option<String> {
        match self {
            CommandOutcome::Completed {
                status_code: Some(0),
                stdout,
                ..
            } => Some(stdout),
            _ => None,
        }
    }
}

/// Run `program` with `args` in `cwd`, killing it when `timeout` elapses.
///
/// Output is captured fully; the child is polled at 20ms granularity.
pub fn run_with_timeout(
    program: &str,
    args: &[&str],
    cwd: &Path,
    timeout: Duration,
) -> std::io::Result<CommandOutcome> {
    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait()? {
            Some(_) => break,
            None if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Ok(CommandOutcome::TimedOut);
            }
            None => std::thread::sleep(Duration::from_millis(20)),
        }
    }

    let output = child.wait_with_output()?;
    Ok(CommandOutcome::Completed {
        status_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Convenience wrapper for `git` invocations (5 s budget).
pub fn run_git(repo: &Path, args: &[&str]) -> Option<String> {
    match run_with_timeout("git", args, repo, Duration::from_secs(5)) {
        Ok(outcome) => outcome.success_stdout(),
        Err(_) => None,
    }
}

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Monotonic process-scoped id: `<prefix>-<unix_millis>-<counter>`.
///
/// The counter lives for the process; uniqueness across processes comes from
/// the millisecond timestamp plus single-writer ownership of each id space.
pub fn next_id(prefix: &str) -> String {
    let n = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{:04}", Utc::now().timestamp_millis(), n)
}

/// Short random id: `<prefix>-<uuid8>`.
pub fn short_id(prefix: &str) -> String {
    format!("{prefix}-{}", &uuid::Uuid::new_v4().to_string()[..8])
}

/// Zero-signal probe: is a process with this pid alive?
pub fn pid_alive(pid: u32) -> bool {
    // kill(pid, 0) performs permission and existence checks only.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}
