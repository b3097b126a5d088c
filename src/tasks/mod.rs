//! Long-running, progress-reporting units of work executed by the update
//! worker thread.
//!
//! Every task runs synchronously inside [`LongRunningTask::start`] and never
//! lets an error or panic escape it: the body's `Result` is converted to a
//! [`TaskResult`] by [`TaskStatus::run_once`]. Progress lives in a shared
//! [`TaskStatus`] so other threads can read it while the task runs.

pub mod downloader;
pub mod framework_updater;
pub mod game_install;
pub mod game_updater;
pub mod registrar;

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::OnceCell;

use crate::errors::{Result, UpdaterError};

pub use downloader::{CancelHandle, DownloadSource, FileDownloader};
pub use framework_updater::FrameworkUpdater;
pub use game_install::GameInstall;
pub use game_updater::GameUpdater;
pub use registrar::GameRegistrar;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskResult {
    Completed,
    Cancelled,
    Error,
}

/// Progress counters and the terminal result of one task.
#[derive(Debug)]
pub struct TaskStatus {
    kind: &'static str,
    progress: AtomicU64,
    total: AtomicU64,
    outcome: OnceCell<TaskResult>,
}

impl TaskStatus {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            progress: AtomicU64::new(0),
            total: AtomicU64::new(0),
            outcome: OnceCell::new(),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn progress(&self) -> u64 {
        self.progress.load(Ordering::Acquire)
    }

    /// Upper bound for `progress`; 0 means indeterminate.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }

    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Release);
    }

    pub fn add_progress(&self, delta: u64) {
        let _ = self
            .progress
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_add(delta))
            });
    }

    pub fn set_progress(&self, value: u64) {
        self.progress.store(value, Ordering::Release);
    }

    pub fn outcome(&self) -> Option<TaskResult> {
        self.outcome.get().copied()
    }

    /// Runs `body` unless a result was already recorded, converting errors
    /// and panics into `TaskResult::Error`.
    pub fn run_once<F>(&self, body: F) -> TaskResult
    where
        F: FnOnce() -> Result<()>,
    {
        if let Some(previous) = self.outcome() {
            tracing::warn!("{} already finished ({:?}), not restarting", self.kind, previous);
            return previous;
        }

        let result = match panic::catch_unwind(AssertUnwindSafe(body)) {
            Ok(Ok(())) => TaskResult::Completed,
            Ok(Err(UpdaterError::Cancelled)) => {
                tracing::info!("{} cancelled", self.kind);
                TaskResult::Cancelled
            }
            Ok(Err(err)) => {
                tracing::error!("{} failed: {}", self.kind, err);
                TaskResult::Error
            }
            Err(payload) => {
                tracing::error!("{} panicked: {}", self.kind, panic_message(&payload));
                TaskResult::Error
            }
        };

        *self.outcome.get_or_init(|| result)
    }
}

pub(crate) fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub trait LongRunningTask: Send {
    /// Shared progress/total/outcome, readable from any thread.
    fn status(&self) -> std::sync::Arc<TaskStatus>;

    /// Runs the task to a terminal state on the calling thread.
    fn start(&mut self) -> TaskResult;

    fn progress(&self) -> u64 {
        self.status().progress()
    }

    fn total(&self) -> u64 {
        self.status().total()
    }
}

/// A task that can be stopped from another thread while `start` runs.
pub trait CancellableTask: LongRunningTask {
    fn cancel_handle(&self) -> CancelHandle;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_body_results() {
        assert_eq!(TaskStatus::new("ok").run_once(|| Ok(())), TaskResult::Completed);
        assert_eq!(
            TaskStatus::new("cancel").run_once(|| Err(UpdaterError::Cancelled)),
            TaskResult::Cancelled
        );
        assert_eq!(
            TaskStatus::new("fail").run_once(|| Err(UpdaterError::Http("502".to_string()))),
            TaskResult::Error
        );
    }

    #[test]
    fn panic_becomes_error() {
        let status = TaskStatus::new("boom");
        let result = status.run_once(|| panic!("installer exploded"));
        assert_eq!(result, TaskResult::Error);
        assert_eq!(status.outcome(), Some(TaskResult::Error));
    }

    #[test]
    fn second_run_returns_recorded_result() {
        let status = TaskStatus::new("once");
        let mut runs = 0;
        assert_eq!(
            status.run_once(|| {
                runs += 1;
                Err(UpdaterError::Cancelled)
            }),
            TaskResult::Cancelled
        );
        assert_eq!(
            status.run_once(|| {
                runs += 1;
                Ok(())
            }),
            TaskResult::Cancelled
        );
        assert_eq!(runs, 1);
    }

    #[test]
    fn progress_saturates() {
        let status = TaskStatus::new("bytes");
        status.set_progress(u64::MAX - 1);
        status.add_progress(10);
        assert_eq!(status.progress(), u64::MAX);
    }
}
