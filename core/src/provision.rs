//! Room and widget provisioning.
//!
//! New rooms and widgets get random ids. Deletion is guarded by the shape of
//! the path below the repository root: the root room, anything outside a
//! room and anything outside the repository can never be removed.

use crate::config::SyncConfig;
use crate::error::Result;
use crate::error::SyncError;
use crate::fsio;
use crate::layout::CanvasInfo;
use crate::layout::LinkInfo;
use crate::layout::PageEntry;
use crate::layout::RoomMetadata;
use crate::layout::WidgetProperties;
use crate::model::SnapshotSchema;
use crate::pack::Packer;
use crate::walk;
use crate::walk::Role;
use serde_json::Map;
use serde_json::Value;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;
use uuid::Uuid;

fn require_room(path: &Path, config: &SyncConfig) -> Result<String> {
    if !walk::is_role_dir(path, Role::Room, config) {
        return Err(SyncError::fatal_config(format!(
            "{} is not a {}* directory",
            path.display(),
            config.room_prefix
        )));
    }
    if !path.is_dir() {
        return Err(SyncError::MissingFile {
            path: path.to_path_buf(),
        });
    }
    fsio::dir_name(path).ok_or_else(|| SyncError::MissingFile {
        path: path.to_path_buf(),
    })
}

fn write_new(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).map_err(|e| SyncError::io(path, e))
}

/// Create `room-<uuid>` under `parent` with its metadata, empty storage, a
/// link descriptor naming `parent`, and an initial snapshot.
///
/// The parent's own snapshot picks the link up on its next pack.
pub fn create_room(parent: &Path, name: Option<&str>, config: &SyncConfig) -> Result<PathBuf> {
    let parent_id = require_room(parent, config)?;
    let id = Uuid::new_v4();
    let room_id = format!("{}{id}", config.room_prefix);
    let room = parent.join(&room_id);
    std::fs::create_dir(&room).map_err(|e| SyncError::io(&room, e))?;

    let mut canvas = CanvasInfo {
        room_id: Some(room_id.clone()),
        ..Default::default()
    };
    if let Some(name) = name {
        canvas.canvas_name = name.to_string();
    }
    let metadata = RoomMetadata {
        canvas,
        pages: vec![PageEntry::default()],
        schema: Some(SnapshotSchema::default()),
        generated_at: Some(chrono::Utc::now().to_rfc3339()),
        ..Default::default()
    };
    let metadata_path = room.join(&config.metadata_file);
    write_new(&metadata_path, &fsio::json_bytes(&metadata, &metadata_path)?)?;

    let storage_path = room.join(&config.storage_file);
    write_new(
        &storage_path,
        &fsio::json_bytes(&Value::Object(Map::new()), &storage_path)?,
    )?;

    let mut link = LinkInfo::new(parent_id, format!("shape:{id}"));
    link.label = name.unwrap_or_default().to_string();
    let link_path = room.join(&config.link_info_file);
    write_new(&link_path, &fsio::json_bytes(&link, &link_path)?)?;

    Packer::new(config).pack_room(&room)?;
    tracing::info!(room = %room.display(), "created room");
    Ok(room)
}

/// Create `widget-<uuid>` in `room` with default properties, empty template
/// files and empty storage.
pub fn create_widget(room: &Path, template_handle: &str, config: &SyncConfig) -> Result<PathBuf> {
    require_room(room, config)?;
    let id = Uuid::new_v4();
    let dir = room.join(format!("{}{id}", config.widget_prefix));
    std::fs::create_dir(&dir).map_err(|e| SyncError::io(&dir, e))?;

    let properties = WidgetProperties::new(format!("shape:{id}"), template_handle);
    let properties_path = dir.join(&config.properties_file);
    write_new(&properties_path, &fsio::json_bytes(&properties, &properties_path)?)?;
    write_new(&dir.join(&config.template_source_file), b"")?;
    write_new(&dir.join(&config.template_output_file), b"")?;
    let storage_path = dir.join(&config.storage_file);
    write_new(
        &storage_path,
        &fsio::json_bytes(&Value::Object(Map::new()), &storage_path)?,
    )?;

    tracing::info!(widget = %dir.display(), handle = template_handle, "created widget");
    Ok(dir)
}

/// `path` relative to `repo`, after resolving both. Paths that climb with
/// `..` or resolve outside the repository are refused.
fn repo_relative(repo: &Path, path: &Path) -> Result<PathBuf> {
    if path
        .components()
        .any(|component| component == Component::ParentDir)
    {
        return Err(SyncError::refused(path, "path must not contain '..'"));
    }
    let repo = repo.canonicalize().map_err(|e| SyncError::io(repo, e))?;
    let resolved = match path.canonicalize() {
        Ok(resolved) => resolved,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SyncError::MissingFile {
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(SyncError::io(path, e)),
    };
    if !resolved.is_dir() {
        return Err(SyncError::MissingFile {
            path: path.to_path_buf(),
        });
    }
    match resolved.strip_prefix(&repo) {
        Ok(relative) => Ok(relative.to_path_buf()),
        Err(_) => Err(SyncError::refused(
            path,
            format!("not inside the repository {}", repo.display()),
        )),
    }
}

fn component_roles(relative: &Path, config: &SyncConfig) -> Vec<Option<Role>> {
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(name) => {
                Some(name.to_str().and_then(|name| walk::role_of(name, config)))
            }
            _ => None,
        })
        .collect()
}

/// Delete a non-root room of the repository at `repo`. Below the repository
/// root the path must name a room directory and contain at least two room
/// segments.
pub fn delete_room(repo: &Path, path: &Path, config: &SyncConfig) -> Result<()> {
    let relative = repo_relative(repo, path)?;
    let roles = component_roles(&relative, config);
    if roles.last() != Some(&Some(Role::Room)) {
        return Err(SyncError::refused(path, "not a room directory"));
    }
    let room_segments = roles.iter().filter(|role| **role == Some(Role::Room)).count();
    if room_segments < 2 {
        return Err(SyncError::refused(path, "the root room cannot be deleted"));
    }
    let target = repo.join(&relative);
    std::fs::remove_dir_all(&target).map_err(|e| SyncError::io(&target, e))?;
    tracing::info!(room = %path.display(), "deleted room");
    Ok(())
}

/// Delete a widget directory that sits directly inside a room directory of
/// the repository at `repo`.
pub fn delete_widget(repo: &Path, path: &Path, config: &SyncConfig) -> Result<()> {
    let relative = repo_relative(repo, path)?;
    match component_roles(&relative, config).as_slice() {
        [.., Some(Role::Room), Some(Role::Widget)] => {}
        _ => {
            return Err(SyncError::refused(
                path,
                "not a widget directory inside a room",
            ));
        }
    }
    let target = repo.join(&relative);
    std::fs::remove_dir_all(&target).map_err(|e| SyncError::io(&target, e))?;
    tracing::info!(widget = %path.display(), "deleted widget");
    Ok(())
}
