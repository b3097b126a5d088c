use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use clap::{Parser, Subcommand};

use matchstick_updater::config::UpdaterConfig;
use matchstick_updater::errors::Result;
use matchstick_updater::logging;
use matchstick_updater::models::{CredentialChallenge, Credentials, Game, UpdateRequest};
use matchstick_updater::services::{
    CredentialProvider, ProgressView, StandardTaskFactory, TaskFactory, UpdateContext,
    UpdateSession,
};
use matchstick_updater::shell::{DesktopShell, ShellIntegration};
use matchstick_updater::utils::file::FileManager;
use matchstick_updater::utils::paths::{resolve_app_dir, resolve_log_dir, UpdaterPaths};
use matchstick_updater::TaskResult;

#[derive(Parser)]
#[command(name = "matchstick-updater")]
#[command(version, about = "Updates and registers an installed Matchstick game")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Application directory (default: the executable's directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Decline credential challenges instead of prompting for them
    #[arg(long, global = true)]
    no_prompt: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Download and apply framework and/or game updates
    Update {
        /// Game update archive URL
        #[arg(long)]
        game_update: Option<String>,

        /// Expected SHA-256 of the game update archive
        #[arg(long)]
        game_update_hash: Option<String>,

        /// Framework update archive URL
        #[arg(long)]
        framework_update: Option<String>,

        /// Expected SHA-256 of the framework update archive
        #[arg(long)]
        framework_update_hash: Option<String>,
    },

    /// Add desktop, start menu and installed-programs entries
    Register,

    /// Remove the entries added by `register`
    Deregister,
}

#[derive(Default)]
struct ConsoleView {
    last_percent: Mutex<Option<u64>>,
}

impl ProgressView for ConsoleView {
    fn set_title(&self, title: &str) {
        println!("{}", title);
    }

    fn set_details(&self, details: &str) {
        println!("{}", details);
    }

    fn set_allow_cancel(&self, _allow: bool) {}

    fn show_progress(&self, progress: u64, total: u64) {
        if total == 0 {
            return;
        }
        let percent = progress.saturating_mul(100) / total;
        let mut last = self
            .last_percent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *last != Some(percent) {
            *last = Some(percent);
            print!("\r{:>3}% ({} / {})", percent, progress, total);
            let _ = io::stdout().flush();
        }
    }

    fn show_warning(&self, title: &str, body: &str) {
        eprintln!("\nwarning: {}: {}", title, body);
    }

    fn show_message(&self, title: &str, body: &str) {
        eprintln!("\n{}: {}", title, body);
    }

    fn show_unhandled_error(&self, message: &str) {
        eprintln!("\nunexpected error: {}", message);
    }

    fn close(&self) {
        println!();
    }
}

struct ConsoleCredentials;

impl CredentialProvider for ConsoleCredentials {
    fn credentials(&self, challenge: &CredentialChallenge) -> Option<Credentials> {
        let realm = challenge.realm.as_deref().unwrap_or("update server");
        eprintln!("\n{} requires credentials ({})", challenge.url, realm);
        let username = prompt("username: ")?;
        if username.is_empty() {
            return None;
        }
        let password = prompt("password: ")?;
        Some(Credentials { username, password })
    }
}

fn prompt(label: &str) -> Option<String> {
    eprint!("{}", label);
    let _ = io::stderr().flush();
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).ok()?;
    Some(line.trim_end_matches(['\r', '\n']).to_string())
}

fn run(cli: Cli) -> Result<TaskResult> {
    let app_dir = resolve_app_dir(cli.root.as_deref());
    if let Err(err) = logging::init(&resolve_log_dir(&app_dir)) {
        eprintln!("logging disabled: {}", err);
    }

    let config = UpdaterConfig::load(&app_dir)?;
    let paths = UpdaterPaths::new(app_dir, config.shell.clone());
    let files = FileManager::new(config.delete_timeout(), config.delete_retry_interval());
    let game = Game::load(&paths.game_base_dir())?;
    let shell: Arc<dyn ShellIntegration> = Arc::new(DesktopShell::new(
        paths.installed_programs_dir(),
        paths.game_library_dir(),
        files.clone(),
    ));
    let factory = Arc::new(StandardTaskFactory::new(paths.clone(), files.clone(), shell));
    tracing::info!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Update {
            game_update,
            game_update_hash,
            framework_update,
            framework_update_hash,
        } => {
            let credentials: Option<Arc<dyn CredentialProvider>> = if cli.no_prompt {
                None
            } else {
                Some(Arc::new(ConsoleCredentials))
            };
            let context = UpdateContext {
                request: UpdateRequest::new(
                    game_update,
                    game_update_hash,
                    framework_update,
                    framework_update_hash,
                ),
                config,
                paths,
                files,
                game,
                factory,
                credentials,
            };
            let session = UpdateSession::start(context, Arc::new(ConsoleView::default()))?;
            Ok(session.wait())
        }
        Commands::Register => {
            paths.init_updater_directories()?;
            let mut registrar = factory.registrar(true, &game);
            Ok(registrar.start())
        }
        Commands::Deregister => {
            let mut registrar = factory.registrar(false, &game);
            Ok(registrar.start())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(TaskResult::Completed) => ExitCode::SUCCESS,
        Ok(TaskResult::Cancelled) => ExitCode::from(2),
        Ok(TaskResult::Error) => ExitCode::from(1),
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::from(1)
        }
    }
}
