//! Breadth-first traversal of the room graph.
//!
//! Links are only known once a room has been unpacked, so traversal and
//! unpacking are interleaved: each [`step`] pops one room, unpacks it and
//! queues the child rooms its links point at. The state is threaded by value
//! through every step.

use crate::config::SyncConfig;
use crate::error::ErrorCategory;
use crate::error::Result;
use crate::error::SyncError;
use crate::fsio;
use crate::unpack::Unpacker;
use crate::walk;
use crate::walk::Role;
use std::collections::BTreeSet;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::path::Path;
use std::path::PathBuf;

/// A link to a room id that was already visited or queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleLink {
    pub from: PathBuf,
    pub target_canvas_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct TraversalState {
    pub root: PathBuf,
    queue: VecDeque<PathBuf>,
    /// Room ids visited or queued.
    seen_ids: HashSet<String>,
    /// Rooms unpacked, in visit order.
    pub visited: Vec<PathBuf>,
    /// Child rooms of visited rooms that no link has reached yet.
    pub candidates: BTreeSet<PathBuf>,
    pub processed_widgets: BTreeSet<PathBuf>,
    /// Rooms whose snapshot could not be unpacked; nothing below them is pruned.
    pub protected: Vec<PathBuf>,
    pub cycles: Vec<CycleLink>,
    pub broken_links: usize,
    pub files_written: usize,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl TraversalState {
    pub fn is_done(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_protected(&self, path: &Path) -> bool {
        self.protected.iter().any(|room| path.starts_with(room))
    }

    fn enqueue(&mut self, room_id: String, path: PathBuf) {
        self.candidates.remove(&path);
        self.seen_ids.insert(room_id);
        self.queue.push_back(path);
    }
}

/// The single `room-*` directory directly under `repo_root`.
pub fn find_root(repo_root: &Path, config: &SyncConfig) -> Result<PathBuf> {
    let mut roots: Vec<PathBuf> = walk::child_dirs(repo_root, Role::Room, config).collect();
    match roots.len() {
        1 => Ok(roots.remove(0)),
        0 => Err(SyncError::fatal_config(format!(
            "no {}* directory under {}",
            config.room_prefix,
            repo_root.display()
        ))),
        n => Err(SyncError::fatal_config(format!(
            "{n} root rooms under {}: {}",
            repo_root.display(),
            roots
                .iter()
                .filter_map(|path| fsio::dir_name(path))
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

/// Initial state with the root room queued.
pub fn start(repo_root: &Path, config: &SyncConfig) -> Result<TraversalState> {
    let root = find_root(repo_root, config)?;
    let mut state = TraversalState {
        root: root.clone(),
        ..Default::default()
    };
    let root_id = fsio::dir_name(&root).unwrap_or_default();
    state.enqueue(root_id, root);
    Ok(state)
}

/// Unpack the next queued room. A room that fails is recorded and
/// protected; only a cycle under `fail_on_cycle` ends the traversal.
pub fn step(mut state: TraversalState, unpacker: &Unpacker<'_>) -> Result<TraversalState> {
    let Some(room) = state.queue.pop_front() else {
        return Ok(state);
    };
    let config = unpacker.config();
    tracing::debug!(room = %room.display(), "visiting room");
    state.visited.push(room.clone());

    let unpacked = match unpacker.unpack_room(&room) {
        Ok(unpacked) => unpacked,
        Err(err) if !err.category().run_recoverable() => return Err(err),
        Err(err) => {
            let message = format!("{}: {err}", room.display());
            match err.category() {
                ErrorCategory::MissingFile => {
                    tracing::warn!(room = %room.display(), "no snapshot, skipping room");
                    state.warnings.push(message);
                }
                category => {
                    tracing::error!(
                        room = %room.display(),
                        category = category.as_str(),
                        error = %err,
                        "room failed"
                    );
                    state.errors.push(message);
                }
            }
            state.protected.push(room);
            return Ok(state);
        }
    };

    for child in walk::child_dirs(&room, Role::Room, config) {
        state.candidates.insert(child);
    }
    state.processed_widgets.extend(unpacked.widget_dirs);
    state.files_written += unpacked.files_written;
    state.broken_links += unpacked.broken_links.len();
    state.warnings.extend(
        unpacked
            .warnings
            .into_iter()
            .map(|warning| format!("{}: {warning}", room.display())),
    );

    for link in unpacked.links {
        if state.seen_ids.contains(&link.target_canvas_id) {
            if config.fail_on_cycle {
                return Err(SyncError::fatal_config(format!(
                    "{} links back to already visited room {}",
                    room.display(),
                    link.target_canvas_id
                )));
            }
            tracing::warn!(
                room = %room.display(),
                target = %link.target_canvas_id,
                "link to an already visited room, not following"
            );
            state.warnings.push(format!(
                "{}: cycle through {}",
                room.display(),
                link.target_canvas_id
            ));
            state.cycles.push(CycleLink {
                from: room.clone(),
                target_canvas_id: link.target_canvas_id,
            });
            continue;
        }
        state.enqueue(link.target_canvas_id, link.target_path);
    }

    Ok(state)
}

/// Run the whole traversal from the root of `repo_root`.
pub fn traverse(repo_root: &Path, unpacker: &Unpacker<'_>) -> Result<TraversalState> {
    let mut state = start(repo_root, unpacker.config())?;
    while !state.is_done() {
        state = step(state, unpacker)?;
    }
    tracing::info!(
        rooms = state.visited.len(),
        widgets = state.processed_widgets.len(),
        candidates = state.candidates.len(),
        cycles = state.cycles.len(),
        "traversal finished"
    );
    Ok(state)
}
