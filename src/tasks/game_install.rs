use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use zip::result::ZipError;
use zip::ZipArchive;

use crate::errors::Result;
use crate::models::{GameUpdateManifest, UPDATE_MANIFEST_FILE};

/// An opened game update archive. Holds the file open until dropped.
pub struct GameInstall {
    path: PathBuf,
    archive: ZipArchive<File>,
    manifest: GameUpdateManifest,
}

impl GameInstall {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file)?;
        let manifest = read_manifest(&mut archive)?;
        tracing::debug!("opened game install {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            archive,
            manifest,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn manifest(&self) -> &GameUpdateManifest {
        &self.manifest
    }

    pub fn entry_count(&self) -> usize {
        self.archive.len()
    }

    pub(crate) fn archive_mut(&mut self) -> &mut ZipArchive<File> {
        &mut self.archive
    }
}

impl Drop for GameInstall {
    fn drop(&mut self) {
        tracing::debug!("released game install {}", self.path.display());
    }
}

fn read_manifest(archive: &mut ZipArchive<File>) -> Result<GameUpdateManifest> {
    let mut entry = match archive.by_name(UPDATE_MANIFEST_FILE) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(GameUpdateManifest::default()),
        Err(err) => return Err(err.into()),
    };
    let mut data = String::new();
    entry.read_to_string(&mut data)?;
    Ok(serde_json::from_str(&data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::archive::test_support::write_zip;

    #[test]
    fn reads_optional_manifest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let with_manifest = dir.path().join("with.zip");
        write_zip(
            &with_manifest,
            &[
                ("content/a.dat", b"a"),
                ("update.json", br#"{"remove_files":["content/old.dat"]}"#),
            ],
        );
        let without_manifest = dir.path().join("without.zip");
        write_zip(&without_manifest, &[("content/a.dat", b"a")]);

        let install = GameInstall::open(&with_manifest).expect("open");
        assert_eq!(install.manifest().remove_files, vec!["content/old.dat"]);
        assert_eq!(install.entry_count(), 2);

        let install = GameInstall::open(&without_manifest).expect("open");
        assert!(install.manifest().remove_files.is_empty());
    }

    #[test]
    fn dropping_releases_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("update.zip");
        write_zip(&path, &[("game.json", b"{}")]);
        {
            let _install = GameInstall::open(&path).expect("open");
        }
        std::fs::remove_file(&path).expect("file no longer held");
    }

    #[test]
    fn missing_archive_fails_to_open() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(GameInstall::open(&dir.path().join("nothing.zip")).is_err());
    }
}
