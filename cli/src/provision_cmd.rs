//! `room` and `widget` provisioning subcommands.

use crate::EXIT_OK;
use canvas_sync_core::SyncConfig;
use canvas_sync_core::provision;
use clap::Parser;
use clap::Subcommand;
use std::path::Path;
use std::path::PathBuf;

#[derive(Debug, Parser)]
pub struct RoomCli {
    #[command(subcommand)]
    pub command: RoomSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum RoomSubcommand {
    /// Create a child room under an existing room
    Create(RoomCreateArgs),
    /// Delete a room directory inside --repo (never the root room)
    Delete(DeleteArgs),
}

#[derive(Debug, Parser)]
pub struct RoomCreateArgs {
    /// Parent room directory
    #[arg(long, value_name = "PATH")]
    pub parent: PathBuf,

    /// Canvas name, also used as the link label
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Debug, Parser)]
pub struct WidgetCli {
    #[command(subcommand)]
    pub command: WidgetSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum WidgetSubcommand {
    /// Create an empty widget in a room
    Create(WidgetCreateArgs),
    /// Delete a widget directory
    Delete(DeleteArgs),
}

#[derive(Debug, Parser)]
pub struct WidgetCreateArgs {
    /// Room directory to create the widget in
    #[arg(long, value_name = "PATH")]
    pub room: PathBuf,

    /// Template handle the widget renders with
    #[arg(long = "template", value_name = "HANDLE")]
    pub template_handle: String,
}

#[derive(Debug, Parser)]
pub struct DeleteArgs {
    pub path: PathBuf,
}

impl RoomCli {
    pub fn run(self, repo: &Path, config: &SyncConfig) -> anyhow::Result<i32> {
        match self.command {
            RoomSubcommand::Create(args) => {
                let room = provision::create_room(&args.parent, args.name.as_deref(), config)?;
                println!("{}", room.display());
            }
            RoomSubcommand::Delete(args) => {
                provision::delete_room(repo, &args.path, config)?;
                println!("deleted {}", args.path.display());
            }
        }
        Ok(EXIT_OK)
    }
}

impl WidgetCli {
    pub fn run(self, repo: &Path, config: &SyncConfig) -> anyhow::Result<i32> {
        match self.command {
            WidgetSubcommand::Create(args) => {
                let widget = provision::create_widget(&args.room, &args.template_handle, config)?;
                println!("{}", widget.display());
            }
            WidgetSubcommand::Delete(args) => {
                provision::delete_widget(repo, &args.path, config)?;
                println!("deleted {}", args.path.display());
            }
        }
        Ok(EXIT_OK)
    }
}
