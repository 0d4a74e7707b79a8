//! Whole-tree entry points.
//!
//! `unpack_tree` walks the room graph from the root and prunes what it did
//! not reach. `pack_tree` packs every room found on disk, each on its own.

use crate::collect;
use crate::collect::CollectReport;
use crate::config::SyncConfig;
use crate::error::Result;
use crate::graph;
use crate::pack::Packer;
use crate::pack::RoomPack;
use crate::unpack::Unpacker;
use crate::walk;
use crate::walk::Role;
use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;
use std::path::Path;
use std::path::PathBuf;

/// Summary of one unpack run.
#[derive(Debug, Clone, Serialize)]
pub struct UnpackReport {
    pub root: PathBuf,

    /// Rooms unpacked, in traversal order
    pub rooms_visited: Vec<PathBuf>,

    /// Rooms whose snapshot was missing or unreadable
    pub rooms_protected: Vec<PathBuf>,

    pub widgets_written: usize,
    pub files_written: usize,
    pub broken_links: usize,
    pub cycles: usize,

    /// `None` when pruning is disabled
    pub collect: Option<CollectReport>,

    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl UnpackReport {
    pub fn has_failures(&self) -> bool {
        !self.errors.is_empty()
            || self
                .collect
                .as_ref()
                .is_some_and(|collect| !collect.errors.is_empty())
    }
}

/// Per-room line of a [`PackReport`].
#[derive(Debug, Clone, Serialize)]
pub struct PackedRoom {
    pub room: PathBuf,
    pub widgets: usize,
    pub widgets_skipped: usize,
    pub links: usize,
    pub written: bool,
}

impl PackedRoom {
    fn from_pack(room: &Path, pack: &RoomPack) -> Self {
        Self {
            room: room.to_path_buf(),
            widgets: pack.widgets_included.len(),
            widgets_skipped: pack.widgets_skipped.len(),
            links: pack.links_included.len(),
            written: pack.written,
        }
    }
}

/// Summary of one pack run.
#[derive(Debug, Clone, Serialize)]
pub struct PackReport {
    pub rooms: Vec<PackedRoom>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl PackReport {
    fn new() -> Self {
        Self {
            rooms: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.errors.is_empty()
    }

    fn record(&mut self, room: &Path, result: Result<RoomPack>) {
        match result {
            Ok(pack) => {
                self.warnings.extend(
                    pack.warnings
                        .iter()
                        .map(|warning| format!("{}: {warning}", room.display())),
                );
                self.rooms.push(PackedRoom::from_pack(room, &pack));
            }
            Err(err) => {
                tracing::error!(
                    room = %room.display(),
                    category = err.category().as_str(),
                    error = %err,
                    "failed to pack room"
                );
                self.errors.push(format!("{}: {err}", room.display()));
            }
        }
    }
}

/// Unpack every room reachable from the root, then prune unless disabled.
///
/// Only configuration problems (root not unique, a cycle under
/// `fail_on_cycle`) are returned as errors; room failures land in the report.
pub fn unpack_tree(repo_root: &Path, config: &SyncConfig) -> Result<UnpackReport> {
    let unpacker = Unpacker::new(config);
    let state = graph::traverse(repo_root, &unpacker)?;

    let collect = config
        .prune
        .then(|| collect::collect(repo_root, &state, config));

    let report = UnpackReport {
        root: state.root.clone(),
        rooms_visited: state.visited.clone(),
        rooms_protected: state.protected.clone(),
        widgets_written: state.processed_widgets.len(),
        files_written: state.files_written,
        broken_links: state.broken_links,
        cycles: state.cycles.len(),
        collect,
        warnings: state.warnings,
        errors: state.errors,
        timestamp: Utc::now(),
    };
    tracing::info!(
        rooms = report.rooms_visited.len(),
        files_written = report.files_written,
        warnings = report.warnings.len(),
        errors = report.errors.len(),
        "unpack finished"
    );
    Ok(report)
}

/// Pack every room directory under `repo_root`.
pub fn pack_tree(repo_root: &Path, config: &SyncConfig) -> Result<PackReport> {
    graph::find_root(repo_root, config)?;
    let packer = Packer::new(config);
    let mut report = PackReport::new();
    for room in walk::role_dirs(repo_root, Role::Room, config) {
        report.record(&room, packer.pack_room(&room));
    }
    tracing::info!(
        rooms = report.rooms.len(),
        warnings = report.warnings.len(),
        errors = report.errors.len(),
        "pack finished"
    );
    Ok(report)
}

/// Pack a single room directory.
pub fn pack_room(room: &Path, config: &SyncConfig) -> PackReport {
    let mut report = PackReport::new();
    report.record(room, Packer::new(config).pack_room(room));
    report
}
