use std::path::PathBuf;
use std::sync::Arc;

use crate::errors::{Result, UpdaterError};
use crate::models::{Game, InstalledProgram};
use crate::shell::{ShellIntegration, Shortcut};
use crate::tasks::{LongRunningTask, TaskResult, TaskStatus};
use crate::utils::file::{sanitize_path_segment, FileManager};
use crate::utils::paths::UpdaterPaths;

const SHORTCUT_EXTENSION: &str = "desktop";
const HOMEPAGE_TASK: &str = "Homepage";

/// Adds (or removes) the shell-visible integration for a game. Every step
/// clears what a previous registration left behind before recreating it.
pub struct GameRegistrar {
    register: bool,
    game: Game,
    paths: UpdaterPaths,
    files: FileManager,
    shell: Arc<dyn ShellIntegration>,
    status: Arc<TaskStatus>,
}

type Step = fn(&GameRegistrar) -> Result<()>;

impl GameRegistrar {
    pub fn new(
        register: bool,
        game: Game,
        paths: UpdaterPaths,
        files: FileManager,
        shell: Arc<dyn ShellIntegration>,
    ) -> Self {
        let kind = if register { "registration" } else { "deregistration" };
        Self {
            register,
            game,
            paths,
            files,
            shell,
            status: Arc::new(TaskStatus::new(kind)),
        }
    }

    fn execute(&mut self) -> Result<()> {
        let steps: [(&str, Step); 4] = [
            ("system icon", Self::create_system_icon),
            ("installed programs", Self::update_installed_programs),
            ("start menu", Self::update_start_menu),
            ("desktop shortcut", Self::update_desktop_shortcut),
        ];
        self.status.set_total(steps.len() as u64 + 1);

        let mut failed = Vec::new();
        for (index, (name, step)) in steps.iter().enumerate() {
            if let Err(err) = step(self) {
                tracing::warn!("{} step failed for {}: {}", name, self.game.name, err);
                failed.push(*name);
            }
            self.status.add_progress(1);
            // the game library is optional, so it runs outside the failure tally
            if index == 1 {
                if let Err(err) = self.update_game_library() {
                    tracing::warn!("unable to update game library for {}: {}", self.game.name, err);
                }
                self.status.add_progress(1);
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(UpdaterError::Shell(format!("failed steps: {}", failed.join(", "))))
        }
    }

    fn create_system_icon(&self) -> Result<()> {
        if !self.register {
            return Ok(());
        }
        let source = self.paths.game_icon_source();
        if !self.files.exists(&source) {
            return Ok(());
        }
        self.shell
            .create_icon(&self.game.name, &source, &self.paths.game_system_icon_target())
    }

    fn update_installed_programs(&self) -> Result<()> {
        if !self.register {
            return self.shell.remove_installed_program(&self.game.uid);
        }
        let program = InstalledProgram {
            uid: self.game.uid.clone(),
            display_name: self.game.name.clone(),
            publisher: self.game.developer_name.clone(),
            version: self.game.version.clone(),
            install_location: self.paths.app_dir().display().to_string(),
            launch_command: self.paths.launcher_executable().display().to_string(),
            display_icon: self.paths.game_system_icon_file().display().to_string(),
            homepage: self.game.homepage.clone(),
            install_date: chrono::Local::now().format("%Y%m%d").to_string(),
        };
        self.shell.add_installed_program(&program)
    }

    fn update_game_library(&self) -> Result<()> {
        let definition = self.paths.game_definition_file();
        if !self.files.exists(&definition) {
            return Ok(());
        }
        if self.shell.library_contains(&definition)? {
            self.shell.library_uninstall(&definition)?;
        }
        if !self.register {
            return Ok(());
        }
        let instance_id = self.shell.library_install(
            &definition,
            self.paths.app_dir(),
            &self.paths.launcher_executable(),
        )?;
        if let Some(homepage) = self.game.homepage.as_deref().filter(|link| !link.is_empty()) {
            self.shell
                .library_add_task(instance_id, HOMEPAGE_TASK, homepage)?;
        }
        Ok(())
    }

    fn update_start_menu(&self) -> Result<()> {
        let folder = self
            .paths
            .start_menu_dir()
            .join(sanitize_path_segment(&self.game.developer_name));
        if self.register {
            self.files.ensure_dir(&folder)?;
        }
        self.replace_shortcut(folder.join(self.shortcut_file_name()))?;
        if !self.register && self.files.remove_dir_if_empty(&folder)? {
            tracing::info!("removed empty start menu folder {}", folder.display());
        }
        Ok(())
    }

    fn update_desktop_shortcut(&self) -> Result<()> {
        self.replace_shortcut(self.paths.desktop_dir().join(self.shortcut_file_name()))
    }

    fn replace_shortcut(&self, path: PathBuf) -> Result<()> {
        if self.shell.has_shortcut(&path) {
            self.shell.delete_shortcut(&path)?;
        }
        if self.register {
            let shortcut = Shortcut {
                name: self.game.name.clone(),
                target: self.paths.launcher_executable(),
                arguments: Vec::new(),
                icon: self.paths.game_system_icon_file(),
            };
            self.shell.create_shortcut(&path, &shortcut)?;
        }
        Ok(())
    }

    fn shortcut_file_name(&self) -> String {
        format!("{}.{}", sanitize_path_segment(&self.game.name), SHORTCUT_EXTENSION)
    }
}

impl LongRunningTask for GameRegistrar {
    fn status(&self) -> Arc<TaskStatus> {
        Arc::clone(&self.status)
    }

    fn start(&mut self) -> TaskResult {
        let status = Arc::clone(&self.status);
        status.run_once(|| self.execute())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use uuid::Uuid;

    use crate::config::ShellConfig;
    use crate::shell::DesktopShell;

    struct Fixture {
        _dir: tempfile::TempDir,
        paths: UpdaterPaths,
        shell: Arc<dyn ShellIntegration>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        let shell_config = ShellConfig {
            desktop_dir: Some(root.join("desktop")),
            start_menu_dir: Some(root.join("start-menu")),
            installed_programs_dir: Some(root.join("programs")),
            game_library_dir: Some(root.join("library")),
        };
        let paths = UpdaterPaths::new(root.join("app"), shell_config);
        std::fs::create_dir_all(paths.game_base_dir()).expect("game dir");
        let shell: Arc<dyn ShellIntegration> = Arc::new(DesktopShell::new(
            paths.installed_programs_dir(),
            paths.game_library_dir(),
            FileManager::default(),
        ));
        Fixture {
            _dir: dir,
            paths,
            shell,
        }
    }

    fn game() -> Game {
        Game {
            uid: "console".to_string(),
            name: "Console".to_string(),
            developer_name: "Matchstick".to_string(),
            homepage: Some("https://example.org".to_string()),
            version: Some("1.2".to_string()),
        }
    }

    fn run(fixture: &Fixture, register: bool) -> TaskResult {
        run_game(fixture, register, game())
    }

    fn run_game(fixture: &Fixture, register: bool, game: Game) -> TaskResult {
        GameRegistrar::new(
            register,
            game,
            fixture.paths.clone(),
            FileManager::default(),
            Arc::clone(&fixture.shell),
        )
        .start()
    }

    fn count_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
    }

    #[test]
    fn registering_twice_is_idempotent() {
        let fixture = fixture();
        assert_eq!(run(&fixture, true), TaskResult::Completed);
        assert_eq!(run(&fixture, true), TaskResult::Completed);

        assert_eq!(count_files(&fixture.paths.desktop_dir()), 1);
        assert_eq!(
            count_files(&fixture.paths.start_menu_dir().join("Matchstick")),
            1
        );
        assert_eq!(count_files(&fixture.paths.installed_programs_dir()), 1);
    }

    #[test]
    fn deregistering_unregistered_game_is_noop() {
        let fixture = fixture();
        assert_eq!(run(&fixture, false), TaskResult::Completed);
        assert!(!fixture.paths.start_menu_dir().join("Matchstick").exists());
        assert_eq!(count_files(&fixture.paths.desktop_dir()), 0);
    }

    #[test]
    fn deregister_removes_entries_and_empty_folder() {
        let fixture = fixture();
        assert_eq!(run(&fixture, true), TaskResult::Completed);
        assert_eq!(run(&fixture, false), TaskResult::Completed);

        assert_eq!(count_files(&fixture.paths.desktop_dir()), 0);
        assert_eq!(count_files(&fixture.paths.installed_programs_dir()), 0);
        assert!(!fixture.paths.start_menu_dir().join("Matchstick").exists());
    }

    #[test]
    fn deregister_keeps_shared_start_menu_folder() {
        let fixture = fixture();
        assert_eq!(run(&fixture, true), TaskResult::Completed);
        let folder = fixture.paths.start_menu_dir().join("Matchstick");
        std::fs::write(folder.join("Other Game.desktop"), b"[Desktop Entry]").expect("other");

        assert_eq!(run(&fixture, false), TaskResult::Completed);
        assert!(folder.join("Other Game.desktop").exists());
        assert!(!folder.join("Console.desktop").exists());
    }

    #[test]
    fn separators_in_names_stay_in_one_folder() {
        let fixture = fixture();
        let game = Game {
            name: "Console/Deluxe".to_string(),
            developer_name: "Matchstick/Labs".to_string(),
            ..game()
        };
        let folder = fixture.paths.start_menu_dir().join("Matchstick_Labs");

        assert_eq!(run_game(&fixture, true, game.clone()), TaskResult::Completed);
        assert!(folder.join("Console_Deluxe.desktop").is_file());
        assert!(!fixture.paths.start_menu_dir().join("Matchstick").exists());
        assert!(fixture.paths.desktop_dir().join("Console_Deluxe.desktop").is_file());

        assert_eq!(run_game(&fixture, false, game), TaskResult::Completed);
        assert!(!folder.exists());
        assert_eq!(count_files(&fixture.paths.start_menu_dir()), 0);
    }

    #[test]
    fn registers_with_game_library_when_definition_exists() {
        let fixture = fixture();
        std::fs::write(fixture.paths.game_definition_file(), b"gdf").expect("gdf");

        assert_eq!(run(&fixture, true), TaskResult::Completed);
        assert_eq!(run(&fixture, true), TaskResult::Completed);
        assert_eq!(count_files(&fixture.paths.game_library_dir()), 1);

        assert_eq!(run(&fixture, false), TaskResult::Completed);
        assert_eq!(count_files(&fixture.paths.game_library_dir()), 0);
    }

    /// Delegates to a real shell but fails every game library call.
    struct BrokenLibrary(DesktopShell);

    impl ShellIntegration for BrokenLibrary {
        fn create_icon(&self, game_name: &str, source: &Path, destination: &Path) -> Result<()> {
            self.0.create_icon(game_name, source, destination)
        }
        fn has_shortcut(&self, path: &Path) -> bool {
            self.0.has_shortcut(path)
        }
        fn create_shortcut(&self, path: &Path, shortcut: &Shortcut) -> Result<()> {
            self.0.create_shortcut(path, shortcut)
        }
        fn delete_shortcut(&self, path: &Path) -> Result<()> {
            self.0.delete_shortcut(path)
        }
        fn add_installed_program(&self, program: &InstalledProgram) -> Result<()> {
            self.0.add_installed_program(program)
        }
        fn remove_installed_program(&self, uid: &str) -> Result<()> {
            self.0.remove_installed_program(uid)
        }
        fn library_contains(&self, _: &Path) -> Result<bool> {
            Err(UpdaterError::Shell("library service unavailable".to_string()))
        }
        fn library_install(&self, _: &Path, _: &Path, _: &Path) -> Result<Uuid> {
            Err(UpdaterError::Shell("library service unavailable".to_string()))
        }
        fn library_uninstall(&self, _: &Path) -> Result<()> {
            Err(UpdaterError::Shell("library service unavailable".to_string()))
        }
        fn library_add_task(&self, _: Uuid, _: &str, _: &str) -> Result<()> {
            Err(UpdaterError::Shell("library service unavailable".to_string()))
        }
    }

    #[test]
    fn library_failure_does_not_block_shortcuts() {
        let mut fixture = fixture();
        std::fs::write(fixture.paths.game_definition_file(), b"gdf").expect("gdf");
        fixture.shell = Arc::new(BrokenLibrary(DesktopShell::new(
            fixture.paths.installed_programs_dir(),
            fixture.paths.game_library_dir(),
            FileManager::default(),
        )));

        assert_eq!(run(&fixture, true), TaskResult::Completed);
        assert_eq!(count_files(&fixture.paths.desktop_dir()), 1);
    }

    #[test]
    fn failed_step_still_runs_later_steps() {
        let fixture = fixture();
        // a directory where the installed-programs record should go
        let blocker = fixture.paths.installed_programs_dir().join("console.json");
        std::fs::create_dir_all(blocker.join("inner")).expect("blocker");

        assert_eq!(run(&fixture, true), TaskResult::Error);
        assert_eq!(count_files(&fixture.paths.desktop_dir()), 1);
    }
}
