use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, UpdaterError};

pub const CONFIG_FILE: &str = "updater.json";

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct UpdaterConfig {
    pub auto_register_on_update: bool,
    pub delete_timeout_ms: u64,
    pub delete_retry_interval_ms: u64,
    pub progress_interval_ms: u64,
    pub shell: ShellConfig,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ShellConfig {
    pub desktop_dir: Option<PathBuf>,
    pub start_menu_dir: Option<PathBuf>,
    pub installed_programs_dir: Option<PathBuf>,
    pub game_library_dir: Option<PathBuf>,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            auto_register_on_update: false,
            delete_timeout_ms: 5_000,
            delete_retry_interval_ms: 100,
            progress_interval_ms: 1_000,
            shell: ShellConfig::default(),
        }
    }
}

impl UpdaterConfig {
    /// Reads `updater.json` from the application directory, then applies
    /// environment overrides. A missing file yields the defaults.
    pub fn load(app_dir: &Path) -> Result<Self> {
        let path = app_dir.join(CONFIG_FILE);
        let mut config = if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            serde_json::from_str::<UpdaterConfig>(&data).map_err(|err| {
                UpdaterError::Config(format!("invalid {}: {}", path.display(), err))
            })?
        } else {
            UpdaterConfig::default()
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(value) = env_flag("MATCHSTICK_AUTO_REGISTER_ON_UPDATE") {
            self.auto_register_on_update = value;
        }
    }

    pub fn delete_timeout(&self) -> Duration {
        Duration::from_millis(self.delete_timeout_ms)
    }

    pub fn delete_retry_interval(&self) -> Duration {
        Duration::from_millis(self.delete_retry_interval_ms.max(1))
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms.max(10))
    }
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|value| env_truthy(&value))
}

pub(crate) fn env_truthy(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = UpdaterConfig::load(dir.path()).expect("load config");
        assert_eq!(config.delete_timeout_ms, 5_000);
        assert_eq!(config.progress_interval(), Duration::from_secs(1));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"delete_timeout_ms": 250, "shell": {"desktop_dir": "/tmp/desk"}}"#,
        )
        .expect("write config");

        let config = UpdaterConfig::load(dir.path()).expect("load config");
        assert_eq!(config.delete_timeout_ms, 250);
        assert_eq!(config.progress_interval_ms, 1_000);
        assert_eq!(config.shell.desktop_dir, Some(PathBuf::from("/tmp/desk")));
    }

    #[test]
    fn malformed_file_is_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(CONFIG_FILE), "{ not json").expect("write config");
        let err = UpdaterConfig::load(dir.path()).expect_err("should fail");
        assert!(matches!(err, UpdaterError::Config(_)));
    }

    #[test]
    fn truthy_values() {
        for value in ["1", "true", " YES ", "on"] {
            assert!(env_truthy(value), "{value} should be truthy");
        }
        for value in ["0", "false", "", "maybe"] {
            assert!(!env_truthy(value), "{value} should be falsy");
        }
    }
}
