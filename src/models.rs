use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, UpdaterError};

pub const GAME_METADATA_FILE: &str = "game.json";
pub const UPDATE_MANIFEST_FILE: &str = "update.json";

/// Metadata of the installed game, read from `game/game.json`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Game {
    pub uid: String,
    pub name: String,
    pub developer_name: String,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

impl Game {
    pub fn load(game_dir: &Path) -> Result<Self> {
        let path = game_dir.join(GAME_METADATA_FILE);
        if !path.exists() {
            return Err(UpdaterError::NotFound(path.display().to_string()));
        }
        let data = std::fs::read_to_string(path)?;
        let game = serde_json::from_str(&data)?;
        Ok(game)
    }
}

/// The four optional launcher inputs for one update run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateRequest {
    pub game_update: Option<String>,
    pub game_update_hash: Option<String>,
    pub framework_update: Option<String>,
    pub framework_update_hash: Option<String>,
}

impl UpdateRequest {
    pub fn new(
        game_update: Option<String>,
        game_update_hash: Option<String>,
        framework_update: Option<String>,
        framework_update_hash: Option<String>,
    ) -> Self {
        Self {
            game_update: normalize(game_update),
            game_update_hash: normalize(game_update_hash),
            framework_update: normalize(framework_update),
            framework_update_hash: normalize(framework_update_hash),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.game_update.is_none() && self.framework_update.is_none()
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialChallenge {
    pub url: String,
    pub realm: Option<String>,
    pub attempt: u32,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Optional `update.json` carried inside a game update archive.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct GameUpdateManifest {
    #[serde(default)]
    pub remove_files: Vec<String>,
}

/// One "installed programs" record.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct InstalledProgram {
    pub uid: String,
    pub display_name: String,
    pub publisher: String,
    #[serde(default)]
    pub version: Option<String>,
    pub install_location: String,
    pub launch_command: String,
    pub display_icon: String,
    #[serde(default)]
    pub homepage: Option<String>,
    pub install_date: String,
}
