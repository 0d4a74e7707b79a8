//! `unpack` and `pack`.

use crate::EXIT_OK;
use crate::EXIT_ROOM_FAILED;
use canvas_sync_core::PackReport;
use canvas_sync_core::SyncConfig;
use canvas_sync_core::UnpackReport;
use clap::Parser;
use std::path::Path;
use std::path::PathBuf;

#[derive(Debug, Parser)]
pub struct UnpackArgs {
    /// Report what would be pruned without deleting anything
    #[arg(long)]
    pub dry_run: bool,

    /// Skip pruning of unreachable rooms and widgets
    #[arg(long)]
    pub no_prune: bool,

    /// Fail when a link leads back to an already visited room
    #[arg(long)]
    pub fail_on_cycle: bool,

    /// Output the run report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct PackArgs {
    /// Pack only this room directory
    #[arg(long, value_name = "PATH")]
    pub room: Option<PathBuf>,

    /// Output the run report as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run_unpack(repo: &Path, mut config: SyncConfig, args: &UnpackArgs) -> anyhow::Result<i32> {
    config.dry_run |= args.dry_run;
    config.prune &= !args.no_prune;
    config.fail_on_cycle |= args.fail_on_cycle;

    let report = canvas_sync_core::unpack_tree(repo, &config)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_unpack(&report);
    }

    Ok(if report.has_failures() {
        EXIT_ROOM_FAILED
    } else {
        EXIT_OK
    })
}

pub fn run_pack(repo: &Path, config: &SyncConfig, args: &PackArgs) -> anyhow::Result<i32> {
    let report = match &args.room {
        Some(room) => canvas_sync_core::pack_room(room, config),
        None => canvas_sync_core::pack_tree(repo, config)?,
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_pack(&report);
    }

    Ok(if report.has_failures() {
        EXIT_ROOM_FAILED
    } else {
        EXIT_OK
    })
}

fn print_messages(warnings: &[String], errors: &[String]) {
    for warning in warnings {
        println!("warning: {warning}");
    }
    for error in errors {
        println!("error: {error}");
    }
}

fn print_unpack(report: &UnpackReport) {
    print_messages(&report.warnings, &report.errors);
    println!(
        "Unpacked {} room(s) from {}: {} file(s) written, {} widget(s)",
        report.rooms_visited.len(),
        report.root.display(),
        report.files_written,
        report.widgets_written
    );
    if report.broken_links > 0 || report.cycles > 0 {
        println!(
            "{} broken link(s), {} cycle(s) not followed",
            report.broken_links, report.cycles
        );
    }
    match &report.collect {
        Some(collect) => {
            print_messages(&[], &collect.errors);
            let verb = if collect.dry_run { "Would prune" } else { "Pruned" };
            println!(
                "{verb} {} room(s), {} widget(s)",
                collect.rooms_deleted.len(),
                collect.widgets_deleted.len()
            );
            for path in collect.rooms_deleted.iter().chain(&collect.widgets_deleted) {
                println!("  {}", path.display());
            }
        }
        None => println!("Pruning disabled"),
    }
}

fn print_pack(report: &PackReport) {
    print_messages(&report.warnings, &report.errors);
    for room in &report.rooms {
        println!(
            "{} {}: {} widget(s), {} link(s){}",
            if room.written { "packed" } else { "unchanged" },
            room.room.display(),
            room.widgets,
            room.links,
            if room.widgets_skipped > 0 {
                format!(", {} skipped", room.widgets_skipped)
            } else {
                String::new()
            }
        );
    }
}
