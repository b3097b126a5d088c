use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::services::orchestrator::SessionShared;

/// Periodically pushes the current task's progress to the view. Polls once
/// immediately, then every `interval`, until stopped or dropped.
///
/// Stopping never waits for an in-flight `show_progress`: a view that
/// marshals onto its UI thread may be stopped from that same thread.
pub struct ProgressReporter {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressReporter {
    pub(crate) fn spawn(shared: Arc<SessionShared>, interval: Duration) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("update-progress".to_string())
            .spawn(move || loop {
                if let Some((progress, total)) = shared.current_progress() {
                    shared.view().show_progress(progress, total);
                }
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;
        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Signals the thread to exit after its current poll. Does not block.
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }

    /// Stops the thread and waits for it. Only call this from a thread the
    /// view never blocks on.
    pub fn join(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                tracing::warn!("progress reporter panicked");
            }
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        // detaches the thread if still running
        self.stop();
    }
}
