use std::path::PathBuf;
use std::sync::Arc;

use crate::errors::Result;
use crate::models::UPDATE_MANIFEST_FILE;
use crate::tasks::{GameInstall, LongRunningTask, TaskResult, TaskStatus};
use crate::utils::archive::extract_zip_archive;
use crate::utils::file::{is_safe_relative_path, FileManager};

/// Applies an opened game update to the installed game directory. The
/// install is released when the updater is dropped.
pub struct GameUpdater {
    install: GameInstall,
    game_dir: PathBuf,
    files: FileManager,
    status: Arc<TaskStatus>,
}

impl GameUpdater {
    pub fn new(install: GameInstall, game_dir: PathBuf, files: FileManager) -> Self {
        Self {
            install,
            game_dir,
            files,
            status: Arc::new(TaskStatus::new("game update")),
        }
    }

    fn execute(&mut self) -> Result<()> {
        let removals = self.install.manifest().remove_files.clone();
        self.status
            .set_total((self.install.entry_count() + removals.len()) as u64);

        let status = Arc::clone(&self.status);
        let written = extract_zip_archive(
            self.install.archive_mut(),
            &self.game_dir,
            |name| name == UPDATE_MANIFEST_FILE,
            || status.add_progress(1),
        )?;

        for relative in &removals {
            let relative_path = std::path::Path::new(relative);
            if is_safe_relative_path(relative_path) {
                self.files
                    .delete_with_timeout(&self.game_dir.join(relative_path))?;
            } else {
                tracing::warn!("ignoring unsafe removal entry {}", relative);
            }
            self.status.add_progress(1);
        }

        tracing::info!(
            "applied game update from {}: {} written, {} removed",
            self.install.path().display(),
            written.len(),
            removals.len()
        );
        Ok(())
    }
}

impl LongRunningTask for GameUpdater {
    fn status(&self) -> Arc<TaskStatus> {
        Arc::clone(&self.status)
    }

    fn start(&mut self) -> TaskResult {
        let status = Arc::clone(&self.status);
        status.run_once(|| self.execute())
    }
}
