//! Polling log tailer.
//!
//! Polls the file size every 250 ms. A shrink means the file rotated, so
//! reading restarts from offset 0. Partial trailing lines are buffered until
//! their newline arrives. When the file disappears and the process is known
//! dead, one final sentinel event is emitted and the tailer stops.

use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

/// Poll cadence.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// What the tailer saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailEvent {
    Line(String),
    /// File vanished while the process is dead; the tailer is done.
    LogRemoved,
}

/// Control handle for a running tailer.
pub struct TailHandle {
    stop: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl TailHandle {
    /// Ask the tailer to stop and wait for it.
    pub async fn stop(self) {
        self.stop.store(true, Ordering::Relaxed);
        let _ = self.task.await;
    }
}

/// Start tailing `path`, delivering events to `on_event`.
///
/// `process_dead` is polled when the file is missing; the tailer keeps
/// waiting for the file while it returns false (the process may not have
/// opened its log yet).
pub fn tail_log<F, D>(path: PathBuf, mut on_event: F, process_dead: D) -> TailHandle
where
    F: FnMut(TailEvent) + Send + 'static,
    D: Fn() -> bool + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();

    let task = tokio::spawn(async move {
        let mut offset: u64 = 0;
        let mut partial = String::new();

        loop {
            if stop_flag.load(Ordering::Relaxed) {
                break;
            }

            let size = match std::fs::metadata(&path) {
                Ok(meta) => meta.len(),
                Err(_) => {
                    if process_dead() {
                        on_event(TailEvent::LogRemoved);
                        break;
                    }
                    tokio::time::sleep(POLL_INTERVAL).await;
                    continue;
                }
            };

            if size < offset {
                // Rotation: start over from the top of the new file.
                debug!(path = %path.display(), "log rotated, restarting tail");
                offset = 0;
                partial.clear();
            }

            if size > offset {
                if let Ok(mut file) = std::fs::File::open(&path) {
                    if file.seek(SeekFrom::Start(offset)).is_ok() {
                        let mut chunk = String::new();
                        if file.read_to_string(&mut chunk).is_ok() {
                            offset = size;
                            partial.push_str(&chunk);
                            while let Some(newline) = partial.find('\n') {
                                let line: String = partial.drain(..=newline).collect();
                                on_event(TailEvent::Line(
                                    line.trim_end_matches('\n').to_string(),
                                ));
                            }
                        }
                    }
                }
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    });

    TailHandle { stop, task }
}
