//! Operating-system integration points touched when a game is registered.

pub mod desktop;

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::errors::Result;
use crate::models::InstalledProgram;

pub use desktop::DesktopShell;

/// A launcher entry placed on the desktop or in the start menu.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shortcut {
    pub name: String,
    pub target: PathBuf,
    pub arguments: Vec<String>,
    pub icon: PathBuf,
}

pub trait ShellIntegration: Send + Sync {
    fn create_icon(&self, game_name: &str, source: &Path, destination: &Path) -> Result<()>;

    fn has_shortcut(&self, path: &Path) -> bool;
    fn create_shortcut(&self, path: &Path, shortcut: &Shortcut) -> Result<()>;
    fn delete_shortcut(&self, path: &Path) -> Result<()>;

    /// Adds or replaces the "installed programs" record for `program.uid`.
    fn add_installed_program(&self, program: &InstalledProgram) -> Result<()>;
    /// Removing a record that does not exist is not an error.
    fn remove_installed_program(&self, uid: &str) -> Result<()>;

    fn library_contains(&self, definition_file: &Path) -> Result<bool>;
    fn library_install(
        &self,
        definition_file: &Path,
        install_dir: &Path,
        executable: &Path,
    ) -> Result<Uuid>;
    fn library_uninstall(&self, definition_file: &Path) -> Result<()>;
    fn library_add_task(&self, instance_id: Uuid, name: &str, link: &str) -> Result<()>;
}
