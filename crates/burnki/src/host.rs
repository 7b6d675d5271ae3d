//! Host application integration
//!
//! The host (an add-on shell, the CLI, a test) owns its own menu and event
//! dispatch. This module only hands it plain command handlers to register,
//! and tells it what to do at startup.

use log::{info, warn};
use std::sync::Arc;

use crate::config::Settings;
use crate::error::SyncError;
use crate::sync::{CancelToken, SyncOrchestrator, SyncReport};
use crate::wanikani::HttpTransport;

/// User-facing sync commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    SyncNow,
    FullResync,
}

impl Command {
    pub const ALL: [Command; 2] = [Command::SyncNow, Command::FullResync];

    /// Menu label shown by the host
    pub fn label(&self) -> &'static str {
        match self {
            Command::SyncNow => "Sync Now",
            Command::FullResync => "Full Re-sync",
        }
    }
}

/// Handler invoked when the host triggers a command
pub type CommandHandler = Box<dyn Fn(&CancelToken) -> Result<SyncReport, SyncError> + Send + Sync>;

/// Implemented by the host to receive command handlers
pub trait CommandRegistry {
    fn register(&mut self, command: Command, handler: CommandHandler);
}

/// Register every sync command with the host
pub fn register_commands<R, T>(registry: &mut R, orchestrator: Arc<SyncOrchestrator<T>>)
where
    R: CommandRegistry + ?Sized,
    T: HttpTransport + 'static,
{
    for command in Command::ALL {
        let orchestrator = orchestrator.clone();
        let handler: CommandHandler = match command {
            Command::SyncNow => Box::new(move |cancel| orchestrator.sync_now(cancel)),
            Command::FullResync => Box::new(move |cancel| orchestrator.full_resync(cancel)),
        };
        registry.register(command, handler);
    }
    info!("Registered {} Burnki commands", Command::ALL.len());
}

/// What the host should do once it has started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupAction {
    /// Run an incremental sync
    Sync,
    /// Auto-sync is on but there is no token to sync with
    MissingToken,
    /// Auto-sync is turned off
    Disabled,
}

/// Decide whether to sync on startup
pub fn startup_action(settings: &Settings) -> StartupAction {
    if !settings.auto_sync_on_startup {
        return StartupAction::Disabled;
    }
    if !settings.has_token() {
        warn!("Auto-sync skipped: no WaniKani API token configured");
        return StartupAction::MissingToken;
    }
    StartupAction::Sync
}
