//! Burnki - Sync burned WaniKani items into a flashcard deck
//!
//! This is the command-line host for the Burnki sync core.

use anyhow::{Context, Result, anyhow};
use burnki::{
    CancelToken, CardStore, Command, CommandHandler, CommandRegistry, ConfigWatermarkStore,
    FileAudioCache, Settings, SqliteCardStore, StartupAction, SyncOrchestrator, SyncProgress,
    UreqTransport, WatermarkStore, register_commands, startup_action,
};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// Database file for the local deck
const DATABASE_FILE: &str = "burnki.db";

/// Directory for downloaded pronunciation audio
const MEDIA_DIR: &str = "media";

#[derive(Parser)]
#[command(name = "burnki", version, about = "Sync burned WaniKani items into a flashcard deck")]
struct Cli {
    /// Config file (defaults to ~/.config/burnki/burnki.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for the deck database and audio (defaults to the platform data dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Sync items burned since the last sync
    Sync,
    /// Sync every burned item again
    FullResync,
    /// Run the startup auto-sync, if enabled
    Startup,
    /// Show the watermark, card count and paths
    Status,
}

/// Menu of registered commands, as a host would keep them
#[derive(Default)]
struct MenuRegistry {
    items: HashMap<Command, CommandHandler>,
}

impl CommandRegistry for MenuRegistry {
    fn register(&mut self, command: Command, handler: CommandHandler) {
        info!("Menu item: {}", command.label());
        self.items.insert(command, handler);
    }
}

impl MenuRegistry {
    fn run(&self, command: Command, cancel: &CancelToken) -> Result<()> {
        let handler = self
            .items
            .get(&command)
            .ok_or_else(|| anyhow!("{} is not registered", command.label()))?;

        match handler(cancel) {
            Ok(report) => {
                println!("{}", report.summary());
                Ok(())
            }
            Err(e) => {
                error!("{} failed: {}", command.label(), e);
                Err(anyhow!(e.user_message()))
            }
        }
    }
}

/// Cancel `cancel` on the first Ctrl-C; a second one exits immediately
///
/// The sync stops at its next checkpoint, leaving the watermark untouched.
fn cancel_on_interrupt(cancel: CancelToken) {
    let spawned = std::thread::Builder::new()
        .name("burnki-signal".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    warn!("Ctrl-C handling unavailable: {}", e);
                    return;
                }
            };
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                warn!("Interrupted; stopping the sync at the next checkpoint");
                cancel.cancel();

                if tokio::signal::ctrl_c().await.is_ok() {
                    std::process::exit(130);
                }
            });
        });
    if let Err(e) = spawned {
        warn!("Ctrl-C handling unavailable: {}", e);
    }
}

/// Paths the host wires the stores to
struct Paths {
    config: PathBuf,
    database: PathBuf,
    media: PathBuf,
}

impl Paths {
    fn resolve(cli: &Cli) -> Result<Self> {
        let config = match &cli.config {
            Some(path) => path.clone(),
            None => Settings::default_config_path()
                .context("Could not determine the config directory")?,
        };
        let data_dir = match &cli.data_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
                dir.clone()
            }
            None => config::ensure_data_dir()?,
        };

        Ok(Self {
            config,
            database: data_dir.join(DATABASE_FILE),
            media: data_dir.join(MEDIA_DIR),
        })
    }
}

fn load_settings(path: &Path) -> Result<Settings> {
    if path.exists() {
        Settings::from_file(path)
    } else {
        warn!("No config at {}; using defaults", path.display());
        Ok(Settings::default().with_env_token())
    }
}

fn build_menu(settings: &Settings, paths: &Paths) -> Result<MenuRegistry> {
    let cards: Arc<dyn CardStore> = Arc::new(SqliteCardStore::new(&paths.database)?);
    let watermarks: Arc<dyn WatermarkStore> = Arc::new(ConfigWatermarkStore::new(&paths.config));
    let audio_cache = Arc::new(FileAudioCache::new(&paths.media)?);
    let transport = UreqTransport::new(settings.request_timeout);

    let orchestrator = SyncOrchestrator::new(settings, transport, cards, watermarks, audio_cache)?
        .with_progress(|event| match event {
            SyncProgress::PhaseChanged(phase) => info!("Phase: {:?}", phase),
            SyncProgress::RateLimited { wait } => {
                info!("Rate limited, resuming in {}s", wait.as_secs())
            }
            SyncProgress::Committed { done, total } if done == total || done % 50 == 0 => {
                info!("Committed {}/{} cards", done, total)
            }
            _ => {}
        });

    let mut menu = MenuRegistry::default();
    register_commands(&mut menu, Arc::new(orchestrator));
    Ok(menu)
}

fn status(settings: &Settings, paths: &Paths) -> Result<()> {
    let cards = SqliteCardStore::new(&paths.database)?.count_cards()?;

    println!("Config:     {}", paths.config.display());
    println!("Database:   {}", paths.database.display());
    println!("Media:      {}", paths.media.display());
    println!("Token:      {}", if settings.has_token() { "configured" } else { "missing" });
    println!("Watermark:  {}", settings.last_sync_timestamp);
    println!("Cards:      {}", cards);
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let paths = Paths::resolve(&cli)?;
    let settings = load_settings(&paths.config)?;

    let sync = |command: Command| -> Result<()> {
        let menu = build_menu(&settings, &paths)?;
        let cancel = CancelToken::new();
        cancel_on_interrupt(cancel.clone());
        menu.run(command, &cancel)
    };

    match cli.command {
        CliCommand::Sync => sync(Command::SyncNow),
        CliCommand::FullResync => sync(Command::FullResync),
        CliCommand::Startup => match startup_action(&settings) {
            StartupAction::Sync => sync(Command::SyncNow),
            StartupAction::MissingToken => {
                println!(
                    "Burnki: set api_token in {} or {} to enable auto-sync.",
                    paths.config.display(),
                    burnki::config::TOKEN_ENV_VAR
                );
                Ok(())
            }
            StartupAction::Disabled => {
                info!("Auto-sync on startup is disabled");
                Ok(())
            }
        },
        CliCommand::Status => status(&settings, &paths),
    }
}

fn main() -> ExitCode {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // Bootstrap config directory
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burnki::{SyncError, SyncMode, SyncReport, Watermark};

    fn menu() -> MenuRegistry {
        let mut menu = MenuRegistry::default();
        menu.register(
            Command::SyncNow,
            Box::new(|cancel| {
                if cancel.is_cancelled() {
                    return Err(SyncError::Cancelled { committed: 0 });
                }
                Ok(SyncReport::new(SyncMode::Incremental, Watermark::empty()))
            }),
        );
        menu
    }

    #[test]
    fn test_run_reports_cancellation() {
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = menu().run(Command::SyncNow, &cancel).unwrap_err();
        assert!(err.to_string().contains("after syncing 0 items"));
    }

    #[test]
    fn test_run_without_cancel_succeeds() {
        assert!(menu().run(Command::SyncNow, &CancelToken::new()).is_ok());
    }

    #[test]
    fn test_unregistered_command() {
        let err = menu().run(Command::FullResync, &CancelToken::new()).unwrap_err();
        assert!(err.to_string().contains("Full Re-sync is not registered"));
    }
}
