use std::path::Path;
use std::sync::Arc;

use crate::models::Game;
use crate::shell::ShellIntegration;
use crate::tasks::{
    CancellableTask, DownloadSource, FileDownloader, FrameworkUpdater, GameInstall,
    GameRegistrar, GameUpdater, LongRunningTask,
};
use crate::utils::file::FileManager;
use crate::utils::paths::UpdaterPaths;

/// Builds the tasks an update session runs.
pub trait TaskFactory: Send + Sync {
    fn downloader(&self, source: DownloadSource) -> Box<dyn CancellableTask>;
    fn framework_updater(&self, archive: &Path) -> Box<dyn LongRunningTask>;
    fn game_updater(&self, install: GameInstall) -> Box<dyn LongRunningTask>;
    fn registrar(&self, register: bool, game: &Game) -> Box<dyn LongRunningTask>;
}

#[derive(Clone)]
pub struct StandardTaskFactory {
    paths: UpdaterPaths,
    files: FileManager,
    shell: Arc<dyn ShellIntegration>,
}

impl StandardTaskFactory {
    pub fn new(paths: UpdaterPaths, files: FileManager, shell: Arc<dyn ShellIntegration>) -> Self {
        Self {
            paths,
            files,
            shell,
        }
    }
}

impl TaskFactory for StandardTaskFactory {
    fn downloader(&self, source: DownloadSource) -> Box<dyn CancellableTask> {
        Box::new(FileDownloader::new(source))
    }

    fn framework_updater(&self, archive: &Path) -> Box<dyn LongRunningTask> {
        Box::new(FrameworkUpdater::new(
            archive.to_path_buf(),
            self.paths.framework_dir(),
        ))
    }

    fn game_updater(&self, install: GameInstall) -> Box<dyn LongRunningTask> {
        Box::new(GameUpdater::new(
            install,
            self.paths.game_base_dir(),
            self.files.clone(),
        ))
    }

    fn registrar(&self, register: bool, game: &Game) -> Box<dyn LongRunningTask> {
        Box::new(GameRegistrar::new(
            register,
            game.clone(),
            self.paths.clone(),
            self.files.clone(),
            Arc::clone(&self.shell),
        ))
    }
}
