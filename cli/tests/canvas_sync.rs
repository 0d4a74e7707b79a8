//! canvas-sync CLI integration tests
//!
//! ## Exit Codes
//! - 0: Success, warnings allowed
//! - 1: One or more rooms failed
//! - 2: Configuration error or unusable arguments

use std::fs;
use std::path::Path;

use anyhow::Result;
use predicates::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::Value as JsonValue;
use serde_json::json;
use tempfile::TempDir;

fn canvas_sync(repo: &Path) -> Result<assert_cmd::Command> {
    let mut cmd = assert_cmd::Command::cargo_bin("canvas-sync")?;
    cmd.arg("--repo").arg(repo);
    cmd.env_remove("CANVAS_SYNC_CONFIG");
    cmd.env("RUST_LOG", "error");
    Ok(cmd)
}

fn write_root(repo: &Path) -> Result<()> {
    let room = repo.join("room-A");
    fs::create_dir_all(room.join("room-B"))?;
    fs::create_dir_all(room.join("room-stray"))?;
    let snapshot = json!({
        "documents": [
            {"state": {"id": "document:document", "typeName": "document", "name": "Home"}},
            {"state": {"id": "shape:W1", "typeName": "shape", "type": "widget", "x": 10, "y": 20}},
            {"state": {"id": "shape:L1", "typeName": "shape", "type": "link",
                       "props": {"targetCanvasId": "room-B"}}}
        ]
    });
    fs::write(room.join("snapshot.json"), snapshot.to_string())?;
    Ok(())
}

#[test]
fn unpack_reports_json_and_prunes() -> Result<()> {
    let repo = TempDir::new()?;
    write_root(repo.path())?;

    let output = canvas_sync(repo.path())?
        .args(["unpack", "--json"])
        .output()?;

    assert_eq!(output.status.code(), Some(0));
    let report: JsonValue = serde_json::from_slice(&output.stdout)?;
    assert_eq!(report["rooms_visited"].as_array().map(Vec::len), Some(2));
    assert_eq!(
        report["collect"]["rooms_deleted"].as_array().map(Vec::len),
        Some(1)
    );
    assert!(!repo.path().join("room-A/room-stray").exists());
    assert!(repo.path().join("room-A/widget-W1/properties.json").is_file());
    Ok(())
}

#[test]
fn unpack_dry_run_keeps_strays() -> Result<()> {
    let repo = TempDir::new()?;
    write_root(repo.path())?;

    canvas_sync(repo.path())?
        .args(["unpack", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Would prune 1 room(s)"));

    assert!(repo.path().join("room-A/room-stray").is_dir());
    Ok(())
}

#[test]
fn two_roots_exit_with_fatal_code() -> Result<()> {
    let repo = TempDir::new()?;
    write_root(repo.path())?;
    fs::create_dir_all(repo.path().join("room-Z"))?;

    canvas_sync(repo.path())?
        .arg("unpack")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("root rooms"));
    Ok(())
}

#[test]
fn pack_after_unpack_rebuilds_snapshot() -> Result<()> {
    let repo = TempDir::new()?;
    write_root(repo.path())?;
    canvas_sync(repo.path())?.arg("unpack").assert().success();

    let output = canvas_sync(repo.path())?
        .args(["pack", "--json"])
        .output()?;

    assert_eq!(output.status.code(), Some(0));
    let report: JsonValue = serde_json::from_slice(&output.stdout)?;
    let rooms = report["rooms"].as_array().cloned().unwrap_or_default();
    assert_eq!(rooms.len(), 2);
    assert_eq!(rooms[0]["widgets"], json!(1));
    assert_eq!(rooms[0]["links"], json!(1));
    Ok(())
}

#[test]
fn malformed_room_metadata_fails_pack_with_code_1() -> Result<()> {
    let repo = TempDir::new()?;
    write_root(repo.path())?;
    canvas_sync(repo.path())?.arg("unpack").assert().success();
    fs::write(repo.path().join("room-A/room-B/canvas-info.json"), "{")?;

    canvas_sync(repo.path())?
        .arg("pack")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("error:"));
    Ok(())
}

#[test]
fn room_and_widget_provisioning() -> Result<()> {
    let repo = TempDir::new()?;
    let root = repo.path().join("room-A");
    fs::create_dir_all(&root)?;

    let output = canvas_sync(repo.path())?
        .args(["room", "create", "--name", "Notes", "--parent"])
        .arg(&root)
        .output()?;
    assert_eq!(output.status.code(), Some(0));
    let child = String::from_utf8(output.stdout)?.trim().to_string();
    assert!(Path::new(&child).join("canvas-link-info.json").is_file());

    let output = canvas_sync(repo.path())?
        .args(["widget", "create", "--template", "counter", "--room"])
        .arg(&child)
        .output()?;
    assert_eq!(output.status.code(), Some(0));
    let widget = String::from_utf8(output.stdout)?.trim().to_string();
    assert!(Path::new(&widget).join("template.src").is_file());

    canvas_sync(repo.path())?
        .args(["widget", "delete"])
        .arg(&widget)
        .assert()
        .success();
    assert!(!Path::new(&widget).exists());

    canvas_sync(repo.path())?
        .args(["room", "delete"])
        .arg(&root)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("root room"));

    canvas_sync(repo.path())?
        .args(["room", "delete"])
        .arg(&child)
        .assert()
        .success();
    assert!(!Path::new(&child).exists());
    Ok(())
}

#[test]
fn root_room_survives_room_named_checkout() -> Result<()> {
    let scratch = TempDir::new()?;
    let repo = scratch.path().join("room-service");
    let root = repo.join("room-A");
    fs::create_dir_all(&root)?;

    canvas_sync(&repo)?
        .args(["room", "delete"])
        .arg(&root)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("root room"));
    assert!(root.is_dir());
    Ok(())
}

#[test]
fn explicit_config_file_is_used() -> Result<()> {
    let repo = TempDir::new()?;
    write_root(repo.path())?;
    let config = repo.path().join("custom.toml");
    fs::write(&config, "prune = false\n")?;

    canvas_sync(repo.path())?
        .arg("--config")
        .arg(&config)
        .arg("unpack")
        .assert()
        .success()
        .stdout(predicate::str::contains("Pruning disabled"));
    assert!(repo.path().join("room-A/room-stray").is_dir());
    Ok(())
}

#[test]
fn invalid_config_exits_with_fatal_code() -> Result<()> {
    let repo = TempDir::new()?;
    write_root(repo.path())?;
    fs::write(repo.path().join("canvas-sync.toml"), "snapshot_file = \"a/b\"\n")?;

    canvas_sync(repo.path())?
        .arg("unpack")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("snapshot_file"));
    Ok(())
}
