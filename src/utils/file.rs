use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

/// Filesystem helpers shared by tasks and the orchestrator.
#[derive(Clone, Debug)]
pub struct FileManager {
    delete_timeout: Duration,
    retry_interval: Duration,
}

impl Default for FileManager {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_millis(100))
    }
}

impl FileManager {
    pub fn new(delete_timeout: Duration, retry_interval: Duration) -> Self {
        Self {
            delete_timeout,
            retry_interval,
        }
    }

    pub fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    pub fn ensure_dir(&self, path: &Path) -> io::Result<()> {
        if !path.is_dir() {
            fs::create_dir_all(path)?;
        }
        Ok(())
    }

    /// Deletes a file, retrying while it is transiently locked. A file that is
    /// already gone counts as deleted.
    pub fn delete_with_timeout(&self, path: &Path) -> io::Result<()> {
        let deadline = Instant::now() + self.delete_timeout;
        loop {
            match fs::remove_file(path) {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
                Err(err) => {
                    if Instant::now() >= deadline {
                        return Err(err);
                    }
                    tracing::debug!("retrying delete of {}: {}", path.display(), err);
                    thread::sleep(self.retry_interval);
                }
            }
        }
    }

    pub fn is_dir_empty(&self, path: &Path) -> io::Result<bool> {
        Ok(fs::read_dir(path)?.next().is_none())
    }

    /// Removes `path` when it is an existing, empty directory. Returns whether
    /// anything was removed.
    pub fn remove_dir_if_empty(&self, path: &Path) -> io::Result<bool> {
        if !path.is_dir() || !self.is_dir_empty(path)? {
            return Ok(false);
        }
        fs::remove_dir(path)?;
        Ok(true)
    }

    pub fn write_atomic(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let temp_path = path.with_extension("tmp");
        if let Some(parent) = temp_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&temp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        drop(file);
        fs::rename(temp_path, path)?;
        Ok(())
    }
}

/// Rejects absolute paths and any `..`/root/prefix component.
pub fn is_safe_relative_path(path: &Path) -> bool {
    use std::path::Component;

    if path.as_os_str().is_empty() {
        return false;
    }
    path.components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

/// Makes a display name usable as a single path component: separators and
/// characters shells reject become `_`.
pub fn sanitize_path_segment(value: &str) -> String {
    let cleaned: String = value
        .trim()
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            ch if ch.is_control() => '_',
            ch => ch,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}
