//! `canvas-sync` command line.
//!
//! ## Commands
//!
//! - `canvas-sync unpack` - expand every reachable room, prune the rest
//! - `canvas-sync pack` - rebuild room snapshots from their directories
//! - `canvas-sync room create|delete`
//! - `canvas-sync widget create|delete`
//!
//! ## Exit Codes
//! - 0: Success, warnings allowed
//! - 1: One or more rooms failed
//! - 2: Configuration error or unusable arguments

mod provision_cmd;
mod sync_cmd;

use canvas_sync_core::ErrorCategory;
use canvas_sync_core::SyncConfig;
use canvas_sync_core::SyncError;
use clap::Parser;
use clap::Subcommand;
use std::path::Path;
use std::path::PathBuf;

pub use provision_cmd::RoomCli;
pub use provision_cmd::WidgetCli;
pub use sync_cmd::PackArgs;
pub use sync_cmd::UnpackArgs;

pub const EXIT_OK: i32 = 0;
pub const EXIT_ROOM_FAILED: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

/// Keep canvas room snapshots and their directory trees in sync
#[derive(Debug, Parser)]
#[command(name = "canvas-sync", version)]
pub struct Cli {
    /// Repository root containing the single root room directory
    #[arg(long, global = true, default_value = ".", value_name = "PATH")]
    pub repo: PathBuf,

    /// Config file (default: $CANVAS_SYNC_CONFIG, then <repo>/canvas-sync.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Unpack every room reachable from the root and prune the rest
    Unpack(UnpackArgs),

    /// Pack room directories into their snapshot files
    Pack(PackArgs),

    /// Create or delete rooms
    Room(RoomCli),

    /// Create or delete widgets
    Widget(WidgetCli),
}

impl Cli {
    pub fn run(self) -> i32 {
        let config = match load_config(&self.repo, self.config.as_deref()) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("error: {err:#}");
                return EXIT_FATAL;
            }
        };

        let result = match self.command {
            Command::Unpack(args) => sync_cmd::run_unpack(&self.repo, config, &args),
            Command::Pack(args) => sync_cmd::run_pack(&self.repo, &config, &args),
            Command::Room(cli) => cli.run(&self.repo, &config),
            Command::Widget(cli) => cli.run(&self.repo, &config),
        };

        match result {
            Ok(code) => code,
            Err(err) => {
                eprintln!("error: {err:#}");
                exit_code(&err)
            }
        }
    }
}

fn load_config(repo: &Path, explicit: Option<&Path>) -> anyhow::Result<SyncConfig> {
    let config = match explicit {
        Some(path) => SyncConfig::load_from_path(path)?,
        None => SyncConfig::load(repo)?,
    };
    tracing::debug!(repo = %repo.display(), ?config, "configuration loaded");
    Ok(config)
}

/// Map an error to the process exit code.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<SyncError>().map(SyncError::category) {
        Some(ErrorCategory::FatalConfig | ErrorCategory::RefusedDeletion) | None => EXIT_FATAL,
        Some(_) => EXIT_ROOM_FAILED,
    }
}
