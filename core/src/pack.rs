//! Tree to snapshot.
//!
//! Packs a single room directory. Only the room's own files, its widget
//! directories and the link descriptors its immediate child rooms carry
//! are read, so rooms can be packed in any order.

use crate::classify;
use crate::classify::LinkDescriptor;
use crate::classify::StorageMaps;
use crate::classify::WidgetDescriptor;
use crate::config::SyncConfig;
use crate::error::Result;
use crate::error::SyncError;
use crate::fsio;
use crate::layout;
use crate::layout::LinkInfo;
use crate::layout::RoomMetadata;
use crate::layout::WidgetProperties;
use crate::model;
use crate::model::DocumentEntry;
use crate::model::Record;
use crate::model::Snapshot;
use crate::walk;
use crate::walk::Role;
use serde_json::Map;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;

/// Outcome of packing one room.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomPack {
    pub room_id: String,
    pub snapshot: Snapshot,
    pub widgets_included: Vec<PathBuf>,
    pub widgets_skipped: Vec<PathBuf>,
    pub links_included: Vec<PathBuf>,
    /// Child rooms whose descriptor names another parent.
    pub stale_links: Vec<PathBuf>,
    pub warnings: Vec<String>,
    /// Whether the snapshot file changed on disk.
    pub written: bool,
}

impl RoomPack {
    fn warn(&mut self, message: String) {
        tracing::warn!(room = %self.room_id, "{message}");
        self.warnings.push(message);
    }
}

pub struct Packer<'a> {
    config: &'a SyncConfig,
}

impl<'a> Packer<'a> {
    pub fn new(config: &'a SyncConfig) -> Self {
        Self { config }
    }

    /// Assemble the snapshot of `room_path` without writing it.
    pub fn build_snapshot(&self, room_path: &Path) -> Result<RoomPack> {
        let room_id = fsio::dir_name(room_path).ok_or_else(|| {
            SyncError::fatal_config(format!("room path {} has no name", room_path.display()))
        })?;
        let mut pack = RoomPack {
            room_id,
            snapshot: Snapshot {
                clock: 0,
                document_clock: 0,
                tombstones: Map::new(),
                tombstone_history_starts_at_clock: 0,
                schema: model::SnapshotSchema::default(),
                documents: Vec::new(),
            },
            widgets_included: Vec::new(),
            widgets_skipped: Vec::new(),
            links_included: Vec::new(),
            stale_links: Vec::new(),
            warnings: Vec::new(),
            written: false,
        };

        let metadata_path = room_path.join(&self.config.metadata_file);
        let metadata = match fsio::read_json_opt::<RoomMetadata>(&metadata_path)? {
            Some(metadata) => metadata,
            None => {
                pack.warn(SyncError::MissingFile { path: metadata_path }.to_string());
                RoomMetadata::default()
            }
        };

        let storage_path = room_path.join(&self.config.storage_file);
        let global = match fsio::read_json_opt::<Map<String, Value>>(&storage_path)? {
            Some(global) => global,
            None => {
                pack.warn(SyncError::MissingFile { path: storage_path }.to_string());
                Map::new()
            }
        };

        let widgets = self.read_widgets(room_path, &mut pack);
        let links = self.read_links(room_path, &mut pack);

        let mut records: Vec<(Record, Option<i64>)> = Vec::new();
        records.push((
            Record::Document(classify::document_record(&metadata.canvas, &pack.room_id)),
            metadata.document_last_changed_clock,
        ));
        for page in metadata.pages_or_default() {
            records.push((Record::Page(classify::page_record(&page)), page.last_changed_clock));
        }

        let storage = StorageMaps {
            global,
            shapes: widgets
                .iter()
                .map(|widget| (widget.shape_id().to_string(), widget.storage.clone()))
                .collect(),
            ..Default::default()
        };
        records.push((
            Record::Storage(storage.to_record()),
            metadata.storage_last_changed_clock,
        ));
        for widget in &widgets {
            records.push((
                Record::Widget(widget.to_record()),
                widget.properties.last_changed_clock,
            ));
        }
        for (target, info) in &links {
            records.push((
                Record::Link(LinkDescriptor::record_from_info(info, target)),
                info.last_changed_clock,
            ));
        }

        let mut documents: Vec<DocumentEntry> = records
            .into_iter()
            .enumerate()
            .map(|(position, (record, clock))| {
                DocumentEntry::new(record, clock.unwrap_or_else(|| model::fallback_clock(position)))
            })
            .collect();
        documents.extend(metadata.other_records.iter().cloned());

        let max_clock = model::max_record_clock(&documents);
        let mut schema = metadata.schema.unwrap_or_default();
        schema.schema_version = model::SCHEMA_VERSION;
        pack.snapshot = Snapshot {
            clock: metadata.clock.unwrap_or(max_clock),
            document_clock: metadata.document_clock.unwrap_or(max_clock),
            tombstones: metadata.tombstones.unwrap_or_default(),
            tombstone_history_starts_at_clock: metadata
                .tombstone_history_starts_at_clock
                .unwrap_or(0),
            schema,
            documents,
        };
        Ok(pack)
    }

    /// Build the snapshot of `room_path` and write it if it changed.
    pub fn pack_room(&self, room_path: &Path) -> Result<RoomPack> {
        let mut pack = self.build_snapshot(room_path)?;
        let path = room_path.join(&self.config.snapshot_file);
        let bytes = pack
            .snapshot
            .to_json_bytes()
            .map_err(|e| SyncError::malformed(&path, e))?;
        pack.written = fsio::write_if_changed(&path, &bytes)?;
        tracing::debug!(
            room = %pack.room_id,
            widgets = pack.widgets_included.len(),
            links = pack.links_included.len(),
            written = pack.written,
            "packed room"
        );
        Ok(pack)
    }

    fn read_widgets(&self, room_path: &Path, pack: &mut RoomPack) -> Vec<WidgetDescriptor> {
        let mut widgets = Vec::new();
        let mut seen = HashSet::new();
        for dir in walk::child_dirs(room_path, Role::Widget, self.config) {
            match self.read_widget(&dir) {
                Ok(widget) if !seen.insert(widget.shape_id().to_string()) => {
                    pack.warn(format!(
                        "duplicate shape id {} in {}, skipping",
                        widget.shape_id(),
                        dir.display()
                    ));
                    pack.widgets_skipped.push(dir);
                }
                Ok(widget) => {
                    widgets.push(widget);
                    pack.widgets_included.push(dir);
                }
                Err(err) => {
                    pack.warn(format!("skipping widget: {err}"));
                    pack.widgets_skipped.push(dir);
                }
            }
        }
        widgets
    }

    /// A widget is read whole or not at all.
    fn read_widget(&self, dir: &Path) -> Result<WidgetDescriptor> {
        let properties_path = dir.join(&self.config.properties_file);
        let source_path = dir.join(&self.config.template_source_file);
        let output_path = dir.join(&self.config.template_output_file);
        let storage_path = dir.join(&self.config.storage_file);
        for (path, file) in [
            (&properties_path, &self.config.properties_file),
            (&source_path, &self.config.template_source_file),
            (&output_path, &self.config.template_output_file),
            (&storage_path, &self.config.storage_file),
        ] {
            if !path.is_file() {
                return Err(SyncError::IncompleteWidget {
                    path: dir.to_path_buf(),
                    missing: file.clone(),
                });
            }
        }

        let mut properties: WidgetProperties = fsio::read_json_opt(&properties_path)?
            .ok_or_else(|| SyncError::MissingFile {
                path: properties_path.clone(),
            })?;
        if properties.shape_id.is_empty() {
            let name = fsio::dir_name(dir).unwrap_or_default();
            properties.shape_id = layout::shape_id_from_dir_name(&name, &self.config.widget_prefix)
                .ok_or_else(|| SyncError::IncompleteWidget {
                    path: dir.to_path_buf(),
                    missing: "shapeId".to_string(),
                })?;
        }
        let storage: Value = fsio::read_json_opt(&storage_path)?
            .ok_or_else(|| SyncError::MissingFile { path: storage_path })?;

        Ok(WidgetDescriptor {
            properties,
            template_source: read_blob(&source_path)?,
            template_output: read_blob(&output_path)?,
            storage,
        })
    }

    /// Descriptors of immediate child rooms that name this room as parent,
    /// keyed by the child's directory name.
    fn read_links(&self, room_path: &Path, pack: &mut RoomPack) -> Vec<(String, LinkInfo)> {
        let mut links = Vec::new();
        for child in walk::child_dirs(room_path, Role::Room, self.config) {
            let Some(target) = fsio::dir_name(&child) else {
                continue;
            };
            let path = child.join(&self.config.link_info_file);
            let info = match fsio::read_json_opt::<LinkInfo>(&path) {
                Ok(Some(info)) => info,
                Ok(None) => {
                    tracing::debug!(child = %child.display(), "child room has no link descriptor");
                    continue;
                }
                Err(err) => {
                    pack.warn(format!("skipping link: {err}"));
                    continue;
                }
            };
            if info.parent_canvas_id != pack.room_id {
                tracing::debug!(
                    child = %child.display(),
                    parent = %info.parent_canvas_id,
                    "ignoring descriptor written by another parent"
                );
                pack.stale_links.push(child);
                continue;
            }
            links.push((target, info));
            pack.links_included.push(child);
        }
        links
    }
}

/// Template blobs are stored verbatim; the snapshot carries them as strings.
fn read_blob(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| SyncError::io(path, e))?;
    String::from_utf8(bytes).map_err(|e| {
        SyncError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        )
    })
}
