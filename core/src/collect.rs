//! Reachability garbage collection.
//!
//! Runs after a traversal. Widget directories the traversal did not write
//! are removed first, then every room candidate no link reached. Deletion
//! is best-effort: one failure is recorded and the rest continue.

use crate::config::SyncConfig;
use crate::graph::TraversalState;
use crate::walk;
use crate::walk::Role;
use serde::Serialize;
use std::path::Path;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectReport {
    pub widgets_deleted: Vec<PathBuf>,
    pub rooms_deleted: Vec<PathBuf>,
    pub errors: Vec<String>,
    /// Paths were only reported, nothing was removed.
    pub dry_run: bool,
}

/// Delete what `state` did not reach under `repo_root`.
pub fn collect(repo_root: &Path, state: &TraversalState, config: &SyncConfig) -> CollectReport {
    let mut report = CollectReport {
        dry_run: config.dry_run,
        ..Default::default()
    };

    let stale_widgets: Vec<PathBuf> = walk::role_dirs(repo_root, Role::Widget, config)
        .filter(|dir| !state.processed_widgets.contains(dir) && !state.is_protected(dir))
        .collect();
    for dir in stale_widgets {
        if remove(&dir, config.dry_run, &mut report.errors) {
            report.widgets_deleted.push(dir);
        }
    }

    for room in &state.candidates {
        if state.is_protected(room) {
            continue;
        }
        if !config.dry_run && !room.exists() {
            continue;
        }
        if remove(room, config.dry_run, &mut report.errors) {
            report.rooms_deleted.push(room.clone());
        }
    }

    tracing::info!(
        widgets = report.widgets_deleted.len(),
        rooms = report.rooms_deleted.len(),
        errors = report.errors.len(),
        dry_run = report.dry_run,
        "pruned unreachable directories"
    );
    report
}

fn remove(path: &Path, dry_run: bool, errors: &mut Vec<String>) -> bool {
    if dry_run {
        tracing::info!(path = %path.display(), "would delete");
        return true;
    }
    match std::fs::remove_dir_all(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "deleted");
            true
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to delete");
            errors.push(format!("failed to delete {}: {e}", path.display()));
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph;
    use crate::unpack::Unpacker;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn snapshot(room: &Path, documents: serde_json::Value) {
        fs::create_dir_all(room).unwrap();
        fs::write(
            room.join("snapshot.json"),
            json!({"documents": documents}).to_string(),
        )
        .unwrap();
    }

    fn widget(id: &str) -> serde_json::Value {
        json!({"state": {"id": id, "typeName": "shape", "type": "widget"}})
    }

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("room-A");
        snapshot(
            &a,
            json!([
                widget("shape:keep"),
                {"state": {"id": "shape:L", "typeName": "shape", "type": "link",
                           "props": {"targetCanvasId": "room-B"}}}
            ]),
        );
        snapshot(&a.join("room-B"), json!([]));
        fs::create_dir_all(a.join("widget-old")).unwrap();
        fs::create_dir_all(a.join("room-B/widget-gone")).unwrap();
        fs::create_dir_all(a.join("room-stray/widget-x")).unwrap();
        dir
    }

    #[test]
    fn removes_unreached_widgets_and_rooms() {
        let dir = tree();
        let a = dir.path().join("room-A");
        let cfg = SyncConfig::default();
        let state = graph::traverse(dir.path(), &Unpacker::new(&cfg)).unwrap();

        let report = collect(dir.path(), &state, &cfg);

        assert_eq!(
            report.widgets_deleted,
            vec![
                a.join("room-B/widget-gone"),
                a.join("room-stray/widget-x"),
                a.join("widget-old"),
            ]
        );
        assert_eq!(report.rooms_deleted, vec![a.join("room-stray")]);
        assert!(report.errors.is_empty());
        assert!(a.join("widget-keep").is_dir());
        assert!(a.join("room-B").is_dir());
        assert!(!a.join("room-stray").exists());
        assert!(!a.join("widget-old").exists());
    }

    #[test]
    fn failed_removal_does_not_stop_the_rest() {
        let dir = tree();
        let a = dir.path().join("room-A");
        let cfg = SyncConfig::default();
        let mut state = graph::traverse(dir.path(), &Unpacker::new(&cfg)).unwrap();
        fs::write(a.join("room-aaa"), "not a directory").unwrap();
        state.candidates.insert(a.join("room-aaa"));

        let report = collect(dir.path(), &state, &cfg);

        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("room-aaa"));
        assert_eq!(report.rooms_deleted, vec![a.join("room-stray")]);
        assert!(!a.join("room-stray").exists());
        assert!(!a.join("widget-old").exists());
        assert!(a.join("room-aaa").is_file());
    }

    #[test]
    fn dry_run_only_reports() {
        let dir = tree();
        let a = dir.path().join("room-A");
        let cfg = SyncConfig {
            dry_run: true,
            ..Default::default()
        };
        let state = graph::traverse(dir.path(), &Unpacker::new(&cfg)).unwrap();

        let report = collect(dir.path(), &state, &cfg);

        assert!(report.dry_run);
        assert_eq!(report.rooms_deleted, vec![a.join("room-stray")]);
        assert!(a.join("room-stray/widget-x").is_dir());
        assert!(a.join("widget-old").is_dir());
    }

    #[test]
    fn protected_room_keeps_its_widgets() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("room-A");
        snapshot(
            &a,
            json!([{"state": {"id": "shape:L", "typeName": "shape", "type": "link",
                              "props": {"targetCanvasId": "room-B"}}}]),
        );
        fs::create_dir_all(a.join("room-B/widget-w")).unwrap();
        fs::write(a.join("room-B/snapshot.json"), "{").unwrap();
        let cfg = SyncConfig::default();
        let state = graph::traverse(dir.path(), &Unpacker::new(&cfg)).unwrap();

        let report = collect(dir.path(), &state, &cfg);

        assert!(report.widgets_deleted.is_empty());
        assert!(a.join("room-B/widget-w").is_dir());
    }
}
