use std::io;
use std::path::{Path, PathBuf};

use crate::config::ShellConfig;

pub const GAME_DIR: &str = "game";
pub const DOWNLOADS_DIR: &str = "Downloads";
pub const FRAMEWORK_DIR: &str = "framework";
pub const CORE_RESOURCES_DIR: &str = "resources";
pub const LOG_DIR: &str = "logs";

pub const GAME_ICON: &str = "gameicon.png";
pub const GAME_SYSTEM_ICON: &str = "gamesystemicon.ico";
pub const GAME_DEFINITION_FILE: &str = "gdf.dll";

pub const FRAMEWORK_ARTIFACT: &str = "framework.zip";
pub const GAME_ARTIFACT: &str = "update.zip";

const LAUNCHER_EXECUTABLE: &str = "matchstick-updater";

fn ensure_dir(path: &Path) -> Option<PathBuf> {
    if path.as_os_str().is_empty() {
        return None;
    }
    if std::fs::create_dir_all(path).is_ok() {
        return Some(path.to_path_buf());
    }
    None
}

fn env_dir(key: &str) -> Option<PathBuf> {
    let value = std::env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(PathBuf::from(trimmed))
}

/// `MATCHSTICK_ROOT_DIR`, then the explicit override, then the directory of
/// the running executable.
pub fn resolve_app_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = env_dir("MATCHSTICK_ROOT_DIR") {
        return dir;
    }
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            return dir.to_path_buf();
        }
    }
    PathBuf::from(".")
}

pub fn resolve_log_dir(app_dir: &Path) -> PathBuf {
    if let Some(dir) = env_dir("MATCHSTICK_LOG_DIR") {
        if let Some(found) = ensure_dir(&dir) {
            return found;
        }
    }
    let root_logs = app_dir.join(LOG_DIR);
    if let Some(found) = ensure_dir(&root_logs) {
        return found;
    }
    std::env::temp_dir().join("matchstick").join(LOG_DIR)
}

/// Every location the updater reads from or writes to, derived from the
/// application directory and the shell overrides.
#[derive(Clone, Debug)]
pub struct UpdaterPaths {
    app_dir: PathBuf,
    shell: ShellConfig,
}

impl UpdaterPaths {
    pub fn new(app_dir: PathBuf, shell: ShellConfig) -> Self {
        Self { app_dir, shell }
    }

    pub fn app_dir(&self) -> &Path {
        &self.app_dir
    }

    pub fn game_base_dir(&self) -> PathBuf {
        self.app_dir.join(GAME_DIR)
    }

    pub fn framework_dir(&self) -> PathBuf {
        self.app_dir.join(FRAMEWORK_DIR)
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.app_dir.join(DOWNLOADS_DIR)
    }

    pub fn framework_artifact(&self) -> PathBuf {
        self.downloads_dir().join(FRAMEWORK_ARTIFACT)
    }

    pub fn game_artifact(&self) -> PathBuf {
        self.downloads_dir().join(GAME_ARTIFACT)
    }

    pub fn init_updater_directories(&self) -> io::Result<()> {
        std::fs::create_dir_all(self.downloads_dir())
    }

    pub fn game_definition_file(&self) -> PathBuf {
        self.game_base_dir().join(GAME_DEFINITION_FILE)
    }

    /// The game's own PNG icon, if it ships one.
    pub fn game_icon_source(&self) -> PathBuf {
        self.game_base_dir().join(GAME_ICON)
    }

    pub fn game_system_icon_target(&self) -> PathBuf {
        self.game_base_dir().join(GAME_SYSTEM_ICON)
    }

    pub fn game_system_icon_file(&self) -> PathBuf {
        self.prefer_game_resource(GAME_SYSTEM_ICON)
    }

    fn prefer_game_resource(&self, name: &str) -> PathBuf {
        let own = self.game_base_dir().join(name);
        if own.exists() {
            own
        } else {
            self.app_dir.join(CORE_RESOURCES_DIR).join(name)
        }
    }

    pub fn launcher_executable(&self) -> PathBuf {
        std::env::current_exe().unwrap_or_else(|_| self.app_dir.join(LAUNCHER_EXECUTABLE))
    }

    pub fn desktop_dir(&self) -> PathBuf {
        self.shell
            .desktop_dir
            .clone()
            .or_else(|| home_dir().map(|home| home.join("Desktop")))
            .unwrap_or_else(|| self.app_dir.join("shell").join("desktop"))
    }

    pub fn start_menu_dir(&self) -> PathBuf {
        self.shell
            .start_menu_dir
            .clone()
            .or_else(|| {
                home_dir().map(|home| home.join(".local").join("share").join("applications"))
            })
            .unwrap_or_else(|| self.app_dir.join("shell").join("start-menu"))
    }

    pub fn installed_programs_dir(&self) -> PathBuf {
        self.shell
            .installed_programs_dir
            .clone()
            .unwrap_or_else(|| self.app_dir.join("shell").join("installed-programs"))
    }

    pub fn game_library_dir(&self) -> PathBuf {
        self.shell
            .game_library_dir
            .clone()
            .unwrap_or_else(|| self.app_dir.join("shell").join("game-library"))
    }
}

fn home_dir() -> Option<PathBuf> {
    env_dir("HOME").or_else(|| env_dir("USERPROFILE"))
}
