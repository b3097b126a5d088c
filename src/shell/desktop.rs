use std::fs;
use std::path::{Path, PathBuf};

use image::ImageFormat;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{Result, UpdaterError};
use crate::models::InstalledProgram;
use crate::shell::{ShellIntegration, Shortcut};
use crate::utils::crypto::compute_sha256_hex;
use crate::utils::file::FileManager;

const ICON_SIZE: u32 = 256;

#[derive(Clone, Debug, Deserialize, Serialize)]
struct LibraryEntry {
    instance_id: Uuid,
    definition_file: PathBuf,
    install_dir: PathBuf,
    executable: PathBuf,
    #[serde(default)]
    tasks: Vec<LibraryTask>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct LibraryTask {
    name: String,
    link: String,
}

/// Filesystem-backed shell: `.desktop` launchers, and JSON records for the
/// installed-programs list and the game library.
#[derive(Clone, Debug)]
pub struct DesktopShell {
    installed_programs_dir: PathBuf,
    library_dir: PathBuf,
    files: FileManager,
}

impl DesktopShell {
    pub fn new(installed_programs_dir: PathBuf, library_dir: PathBuf, files: FileManager) -> Self {
        Self {
            installed_programs_dir,
            library_dir,
            files,
        }
    }

    fn program_path(&self, uid: &str) -> PathBuf {
        self.installed_programs_dir
            .join(format!("{}.json", sanitize_file_token(uid)))
    }

    fn library_path(&self, definition_file: &Path) -> PathBuf {
        let key = compute_sha256_hex(definition_file.to_string_lossy().as_bytes());
        self.library_dir.join(format!("{}.json", &key[..16]))
    }

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let payload = serde_json::to_vec_pretty(value)?;
        self.files.write_atomic(path, &payload)?;
        Ok(())
    }
}

impl ShellIntegration for DesktopShell {
    fn create_icon(&self, game_name: &str, source: &Path, destination: &Path) -> Result<()> {
        let image = image::open(source)?;
        let icon = image.thumbnail(ICON_SIZE, ICON_SIZE).to_rgba8();
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        icon.save_with_format(destination, ImageFormat::Ico)?;
        tracing::info!("created system icon for {} at {}", game_name, destination.display());
        Ok(())
    }

    fn has_shortcut(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn create_shortcut(&self, path: &Path, shortcut: &Shortcut) -> Result<()> {
        let mut exec = quote_exec_arg(&shortcut.target.to_string_lossy());
        for argument in &shortcut.arguments {
            exec.push(' ');
            exec.push_str(&quote_exec_arg(argument));
        }
        let contents = format!(
            "[Desktop Entry]\nType=Application\nName={}\nExec={}\nIcon={}\nTerminal=false\n",
            shortcut.name,
            exec,
            shortcut.icon.display()
        );
        self.files.write_atomic(path, contents.as_bytes())?;
        Ok(())
    }

    fn delete_shortcut(&self, path: &Path) -> Result<()> {
        self.files.delete_with_timeout(path)?;
        Ok(())
    }

    fn add_installed_program(&self, program: &InstalledProgram) -> Result<()> {
        self.write_json(&self.program_path(&program.uid), program)
    }

    fn remove_installed_program(&self, uid: &str) -> Result<()> {
        self.files.delete_with_timeout(&self.program_path(uid))?;
        Ok(())
    }

    fn library_contains(&self, definition_file: &Path) -> Result<bool> {
        Ok(self.library_path(definition_file).is_file())
    }

    fn library_install(
        &self,
        definition_file: &Path,
        install_dir: &Path,
        executable: &Path,
    ) -> Result<Uuid> {
        let entry = LibraryEntry {
            instance_id: Uuid::new_v4(),
            definition_file: definition_file.to_path_buf(),
            install_dir: install_dir.to_path_buf(),
            executable: executable.to_path_buf(),
            tasks: Vec::new(),
        };
        self.write_json(&self.library_path(definition_file), &entry)?;
        Ok(entry.instance_id)
    }

    fn library_uninstall(&self, definition_file: &Path) -> Result<()> {
        self.files
            .delete_with_timeout(&self.library_path(definition_file))?;
        Ok(())
    }

    fn library_add_task(&self, instance_id: Uuid, name: &str, link: &str) -> Result<()> {
        if !self.library_dir.is_dir() {
            return Err(UpdaterError::NotFound(format!("library entry {}", instance_id)));
        }
        for dir_entry in fs::read_dir(&self.library_dir)? {
            let path = dir_entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let data = fs::read_to_string(&path)?;
            let mut entry: LibraryEntry = match serde_json::from_str(&data) {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!("skipping unreadable library entry {}: {}", path.display(), err);
                    continue;
                }
            };
            if entry.instance_id != instance_id {
                continue;
            }
            entry.tasks.retain(|task| task.name != name);
            entry.tasks.push(LibraryTask {
                name: name.to_string(),
                link: link.to_string(),
            });
            return self.write_json(&path, &entry);
        }
        Err(UpdaterError::NotFound(format!("library entry {}", instance_id)))
    }
}

fn quote_exec_arg(value: &str) -> String {
    if value.chars().any(|ch| ch.is_whitespace() || ch == '"') {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

fn sanitize_file_token(value: &str) -> String {
    value
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(root: &Path) -> DesktopShell {
        DesktopShell::new(
            root.join("programs"),
            root.join("library"),
            FileManager::default(),
        )
    }

    #[test]
    fn shortcut_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let shell = shell(dir.path());
        let path = dir.path().join("Desktop").join("Console.desktop");
        let shortcut = Shortcut {
            name: "Console".to_string(),
            target: PathBuf::from("/opt/my games/updater"),
            arguments: vec!["launch".to_string()],
            icon: PathBuf::from("/opt/icon.ico"),
        };

        assert!(!shell.has_shortcut(&path));
        shell.create_shortcut(&path, &shortcut).expect("create");
        assert!(shell.has_shortcut(&path));
        let contents = fs::read_to_string(&path).expect("read");
        assert!(contents.contains("Exec=\"/opt/my games/updater\" launch"));

        shell.delete_shortcut(&path).expect("delete");
        assert!(!shell.has_shortcut(&path));
        shell.delete_shortcut(&path).expect("deleting twice is fine");
    }

    #[test]
    fn library_install_and_task() {
        let dir = tempfile::tempdir().expect("tempdir");
        let shell = shell(dir.path());
        let gdf = dir.path().join("game").join("gdf.dll");

        assert!(!shell.library_contains(&gdf).expect("contains"));
        let id = shell
            .library_install(&gdf, dir.path(), Path::new("/bin/updater"))
            .expect("install");
        assert!(shell.library_contains(&gdf).expect("contains"));
        shell
            .library_add_task(id, "Homepage", "https://example.org")
            .expect("add task");
        shell
            .library_add_task(id, "Homepage", "https://example.org/new")
            .expect("replace task");

        let stored: LibraryEntry =
            serde_json::from_str(&fs::read_to_string(shell.library_path(&gdf)).expect("read"))
                .expect("parse");
        assert_eq!(stored.tasks.len(), 1);
        assert_eq!(stored.tasks[0].link, "https://example.org/new");

        shell.library_uninstall(&gdf).expect("uninstall");
        assert!(!shell.library_contains(&gdf).expect("contains"));
        assert!(shell.library_add_task(id, "Homepage", "x").is_err());
    }

    #[test]
    fn converts_png_to_ico() {
        let dir = tempfile::tempdir().expect("tempdir");
        let shell = shell(dir.path());
        let source = dir.path().join("gameicon.png");
        image::RgbaImage::from_pixel(512, 512, image::Rgba([200, 40, 40, 255]))
            .save_with_format(&source, ImageFormat::Png)
            .expect("write png");
        let destination = dir.path().join("game").join("gamesystemicon.ico");

        shell
            .create_icon("Console", &source, &destination)
            .expect("create icon");

        let icon = image::open(&destination).expect("read ico");
        assert_eq!(icon.width(), ICON_SIZE);
    }

    #[test]
    fn program_records_use_safe_names() {
        assert_eq!(sanitize_file_token("game/../uid 1"), "game_.._uid_1");
    }
}
