//! The update session: a dedicated worker thread that downloads and applies a
//! framework update and then a game update, a progress reporter polling
//! whatever task is current, and the cancel/close entry points used by the
//! foreground.
//!
//! The framework leg is best-effort: a failed framework download is reported
//! and the game leg still runs. A failed game download ends the session
//! before any registration happens.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crate::config::UpdaterConfig;
use crate::errors::Result;
use crate::models::{Game, UpdateRequest};
use crate::services::factory::TaskFactory;
use crate::services::progress::ProgressReporter;
use crate::services::view::{CredentialProvider, ProgressView};
use crate::tasks::{
    panic_message, CancelHandle, DownloadSource, GameInstall, LongRunningTask, TaskResult,
    TaskStatus,
};
use crate::utils::file::FileManager;
use crate::utils::paths::UpdaterPaths;

const DOWNLOAD_FAILED_TITLE: &str = "Download failed";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UpdateStage {
    #[default]
    Idle,
    DownloadingFramework,
    InstallingFramework,
    DownloadingGame,
    InstallingGame,
    Registering,
    Done(TaskResult),
}

#[derive(Default)]
struct SessionState {
    current_task: Option<Arc<TaskStatus>>,
    current_downloader: Option<CancelHandle>,
    stage: UpdateStage,
    worker_running: bool,
}

/// State shared between the worker, the progress reporter and the
/// foreground. Every field of `SessionState` is only touched under `state`.
pub(crate) struct SessionShared {
    state: Mutex<SessionState>,
    closing: AtomicBool,
    view: Arc<dyn ProgressView>,
}

impl SessionShared {
    fn new(view: Arc<dyn ProgressView>) -> Self {
        Self {
            state: Mutex::new(SessionState::default()),
            closing: AtomicBool::new(false),
            view,
        }
    }

    /// A holder that panicked cannot leave the state unusable.
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn view(&self) -> &dyn ProgressView {
        self.view.as_ref()
    }

    pub(crate) fn current_progress(&self) -> Option<(u64, u64)> {
        let state = self.lock();
        state
            .current_task
            .as_ref()
            .map(|status| (status.progress(), status.total()))
    }

    fn cancel_download(&self) {
        let state = self.lock();
        if let Some(downloader) = state.current_downloader.as_ref() {
            tracing::info!("cancelling current download");
            downloader.cancel();
        }
    }

    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }
}

/// Everything the worker needs for one run.
pub struct UpdateContext {
    pub request: UpdateRequest,
    pub config: UpdaterConfig,
    pub paths: UpdaterPaths,
    pub files: FileManager,
    pub game: Game,
    pub factory: Arc<dyn TaskFactory>,
    pub credentials: Option<Arc<dyn CredentialProvider>>,
}

pub struct UpdateSession {
    shared: Arc<SessionShared>,
    worker: Mutex<Option<JoinHandle<TaskResult>>>,
    reporter: Mutex<Option<ProgressReporter>>,
}

impl UpdateSession {
    pub fn start(context: UpdateContext, view: Arc<dyn ProgressView>) -> Result<Self> {
        view.set_title(&format!("Updating {}", context.game.name));
        view.set_details(&format!("Updating {}, please wait...", context.game.name));
        view.set_allow_cancel(false);
        view.show_progress(0, 0);

        let shared = Arc::new(SessionShared::new(view));
        let reporter = ProgressReporter::spawn(Arc::clone(&shared), context.config.progress_interval())?;

        shared.lock().worker_running = true;
        let orchestrator = UpdateOrchestrator {
            context,
            shared: Arc::clone(&shared),
        };
        let worker = thread::Builder::new()
            .name("update-worker".to_string())
            .spawn(move || orchestrator.run());
        let worker = match worker {
            Ok(worker) => worker,
            Err(err) => {
                shared.lock().worker_running = false;
                return Err(err.into());
            }
        };

        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
            reporter: Mutex::new(Some(reporter)),
        })
    }

    /// Cancels the current download, if any. Installers run to completion.
    pub fn cancel(&self) {
        self.shared.cancel_download();
    }

    /// The view went away: stop polling and ask the worker to stop at the
    /// next step boundary.
    /// Safe to call from the view's own thread: nothing here waits on the
    /// reporter or the worker.
    pub fn close(&self) {
        if let Some(reporter) = self
            .reporter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            reporter.stop();
        }
        if !self.shared.closing.swap(true, Ordering::AcqRel) && self.is_running() {
            tracing::info!("view closed while updating, stopping worker");
        }
        self.shared.cancel_download();
    }

    pub fn stage(&self) -> UpdateStage {
        self.shared.lock().stage
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().worker_running
    }

    /// Blocks until the worker finishes, then stops the reporter, and returns
    /// the worker's result.
    pub fn wait(&self) -> TaskResult {
        let worker = {
            let mut slot = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(worker) if worker.thread().id() != thread::current().id() => slot.take(),
                _ => None,
            }
        };
        let joined = worker.map(|worker| worker.join().unwrap_or(TaskResult::Error));

        let reporter = self
            .reporter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut reporter) = reporter {
            reporter.join();
        }

        match (joined, self.stage()) {
            (Some(result), _) => result,
            (None, UpdateStage::Done(result)) => result,
            (None, _) => TaskResult::Error,
        }
    }
}

impl Drop for UpdateSession {
    fn drop(&mut self) {
        self.close();
    }
}

enum Leg {
    Continue,
    Stop(TaskResult),
}

/// A downloaded artifact that is deleted when the guard goes out of scope,
/// whatever the outcome of the leg that produced it.
struct TempArtifact {
    path: PathBuf,
    files: FileManager,
}

impl TempArtifact {
    fn new(path: PathBuf, files: FileManager) -> Self {
        Self { path, files }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if !self.files.exists(&self.path) {
            return;
        }
        if let Err(err) = self.files.delete_with_timeout(&self.path) {
            tracing::warn!("unable to delete {}: {}", self.path.display(), err);
        }
    }
}

struct UpdateOrchestrator {
    context: UpdateContext,
    shared: Arc<SessionShared>,
}

impl UpdateOrchestrator {
    fn run(self) -> TaskResult {
        let result = match panic::catch_unwind(AssertUnwindSafe(|| self.run_legs())) {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                tracing::error!("update failed: {}", err);
                self.view().show_unhandled_error(&err.to_string());
                TaskResult::Error
            }
            Err(payload) => {
                let message = panic_message(&payload);
                tracing::error!("update worker panicked: {}", message);
                self.view().show_unhandled_error(&message);
                TaskResult::Error
            }
        };

        {
            let mut state = self.shared.lock();
            state.current_task = None;
            state.current_downloader = None;
            state.stage = UpdateStage::Done(result);
            state.worker_running = false;
        }
        tracing::info!("update finished: {:?}", result);
        self.view().close();
        result
    }

    fn view(&self) -> &dyn ProgressView {
        self.shared.view()
    }

    fn run_legs(&self) -> Result<TaskResult> {
        self.context.paths.init_updater_directories()?;
        if self.context.request.is_empty() {
            tracing::info!("no updates requested");
            return Ok(TaskResult::Completed);
        }

        if let Some(url) = self.context.request.framework_update.as_deref() {
            if let Leg::Stop(result) = self.framework_leg(url)? {
                return Ok(result);
            }
        }

        if let Some(url) = self.context.request.game_update.as_deref() {
            if let Leg::Stop(result) = self.game_leg(url)? {
                return Ok(result);
            }
        }

        Ok(TaskResult::Completed)
    }

    fn framework_leg(&self, url: &str) -> Result<Leg> {
        let artifact = TempArtifact::new(
            self.context.paths.framework_artifact(),
            self.context.files.clone(),
        );
        if self.shared.is_closing() {
            return Ok(Leg::Stop(TaskResult::Cancelled));
        }

        tracing::info!("Downloading framework update...");
        self.view().set_details("Downloading framework update...");
        let result = self.download(
            UpdateStage::DownloadingFramework,
            DownloadSource {
                url: url.to_string(),
                destination: artifact.path().to_path_buf(),
                expected_hash: self.context.request.framework_update_hash.clone(),
                credentials: None,
            },
        );

        match result {
            TaskResult::Cancelled => Ok(Leg::Stop(TaskResult::Cancelled)),
            TaskResult::Error => {
                // a game update may still be possible, keep going
                self.view()
                    .show_warning(DOWNLOAD_FAILED_TITLE, "Failed to download framework update");
                Ok(Leg::Continue)
            }
            TaskResult::Completed => {
                if self.shared.is_closing() {
                    return Ok(Leg::Stop(TaskResult::Cancelled));
                }
                tracing::info!("Installing framework update...");
                self.view().set_details("Installing framework update...");
                let updater = self.context.factory.framework_updater(artifact.path());
                self.run_task(UpdateStage::InstallingFramework, updater);
                Ok(Leg::Continue)
            }
        }
    }

    fn game_leg(&self, url: &str) -> Result<Leg> {
        let game_name = self.context.game.name.as_str();
        let artifact = TempArtifact::new(
            self.context.paths.game_artifact(),
            self.context.files.clone(),
        );
        if self.shared.is_closing() {
            return Ok(Leg::Stop(TaskResult::Cancelled));
        }

        tracing::info!("Downloading game update...");
        self.view()
            .set_details(&format!("Downloading {} update...", game_name));
        let result = self.download(
            UpdateStage::DownloadingGame,
            DownloadSource {
                url: url.to_string(),
                destination: artifact.path().to_path_buf(),
                expected_hash: self.context.request.game_update_hash.clone(),
                credentials: self.context.credentials.clone(),
            },
        );

        match result {
            TaskResult::Cancelled => Ok(Leg::Stop(TaskResult::Cancelled)),
            TaskResult::Error => {
                self.view().show_message(
                    DOWNLOAD_FAILED_TITLE,
                    &format!("Failed to download {} update", game_name),
                );
                Ok(Leg::Stop(TaskResult::Error))
            }
            TaskResult::Completed => {
                if self.shared.is_closing() {
                    return Ok(Leg::Stop(TaskResult::Cancelled));
                }
                tracing::info!("Installing game update...");
                self.view()
                    .set_details(&format!("Installing {} update...", game_name));
                let install = GameInstall::open(artifact.path())?;
                let updater = self.context.factory.game_updater(install);
                self.run_task(UpdateStage::InstallingGame, updater);

                if self.context.config.auto_register_on_update {
                    if self.shared.is_closing() {
                        return Ok(Leg::Stop(TaskResult::Cancelled));
                    }
                    tracing::info!("Registering game update...");
                    self.view()
                        .set_details(&format!("Registering {}...", game_name));
                    let registrar = self.context.factory.registrar(true, &self.context.game);
                    self.run_task(UpdateStage::Registering, registrar);
                }
                Ok(Leg::Continue)
            }
        }
    }

    /// Installs the downloader as the current, cancellable task, runs it with
    /// the lock released, then clears the cancel handle.
    fn download(&self, stage: UpdateStage, source: DownloadSource) -> TaskResult {
        let mut downloader = self.context.factory.downloader(source);
        {
            let mut state = self.shared.lock();
            state.stage = stage;
            state.current_task = Some(downloader.status());
            state.current_downloader = Some(downloader.cancel_handle());
            if self.shared.is_closing() {
                downloader.cancel_handle().cancel();
            }
        }
        self.view().set_allow_cancel(true);

        let result = downloader.start();

        self.shared.lock().current_downloader = None;
        self.view().set_allow_cancel(false);
        result
    }

    /// Runs an installer to completion. Its result is logged, never acted on.
    fn run_task(&self, stage: UpdateStage, mut task: Box<dyn LongRunningTask>) {
        let status = task.status();
        {
            let mut state = self.shared.lock();
            state.stage = stage;
            state.current_task = Some(Arc::clone(&status));
        }
        let result = task.start();
        if result != TaskResult::Completed {
            tracing::warn!("{} finished with {:?}", status.kind(), result);
        }
    }
}
