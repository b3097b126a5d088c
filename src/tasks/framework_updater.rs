use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use zip::ZipArchive;

use crate::errors::Result;
use crate::tasks::{LongRunningTask, TaskResult, TaskStatus};
use crate::utils::archive::extract_zip_archive;

/// Applies a downloaded framework archive to the installed runtime.
pub struct FrameworkUpdater {
    archive_path: PathBuf,
    framework_dir: PathBuf,
    status: Arc<TaskStatus>,
}

impl FrameworkUpdater {
    pub fn new(archive_path: PathBuf, framework_dir: PathBuf) -> Self {
        Self {
            archive_path,
            framework_dir,
            status: Arc::new(TaskStatus::new("framework update")),
        }
    }

    fn execute(&mut self) -> Result<()> {
        let file = File::open(&self.archive_path)?;
        let mut archive = ZipArchive::new(file)?;
        self.status.set_total(archive.len() as u64);

        let status = Arc::clone(&self.status);
        let written = extract_zip_archive(
            &mut archive,
            &self.framework_dir,
            |_| false,
            || status.add_progress(1),
        )?;
        tracing::info!(
            "applied framework update: {} files into {}",
            written.len(),
            self.framework_dir.display()
        );
        Ok(())
    }
}

impl LongRunningTask for FrameworkUpdater {
    fn status(&self) -> Arc<TaskStatus> {
        Arc::clone(&self.status)
    }

    fn start(&mut self) -> TaskResult {
        let status = Arc::clone(&self.status);
        status.run_once(|| self.execute())
    }
}
