//! Snapshot to tree.
//!
//! One room at a time: classify every record of the room's snapshot, then
//! write the room files, one directory per widget and one link descriptor
//! into each linked child room. Steps run in that order; a failed write
//! lets the rest of its step finish and then abandons the room.

use crate::classify;
use crate::classify::ClassifiedRoom;
use crate::classify::LinkDescriptor;
use crate::classify::WidgetDescriptor;
use crate::config::SyncConfig;
use crate::error::Result;
use crate::error::SyncError;
use crate::fsio;
use crate::layout;
use crate::layout::CanvasInfo;
use crate::layout::RoomMetadata;
use crate::model;
use crate::model::Snapshot;
use crate::walk;
use crate::walk::Role;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;

/// A link whose descriptor was written, so the walker may follow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowableLink {
    pub link_shape_id: String,
    pub target_canvas_id: String,
    pub target_path: PathBuf,
}

/// Outcome of unpacking one room.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomUnpack {
    pub room_id: String,
    /// Links in snapshot record order.
    pub links: Vec<FollowableLink>,
    /// Targets that were not written: absent or not a room directory name.
    pub broken_links: Vec<String>,
    pub widget_dirs: Vec<PathBuf>,
    pub warnings: Vec<String>,
    pub files_written: usize,
}

impl RoomUnpack {
    fn warn(&mut self, message: String) {
        tracing::warn!(room = %self.room_id, "{message}");
        self.warnings.push(message);
    }
}

/// Collects the writes of one step. Every file of the step is attempted;
/// the first failure is returned once the step is done.
#[derive(Default)]
struct StepWrites {
    written: usize,
    first_error: Option<SyncError>,
}

impl StepWrites {
    fn write(&mut self, path: &Path, bytes: &[u8]) {
        match fsio::write_if_changed(path, bytes) {
            Ok(true) => self.written += 1,
            Ok(false) => {}
            Err(err) => self.fail(err),
        }
    }

    fn write_json<T: serde::Serialize>(&mut self, path: &Path, value: &T) {
        match fsio::json_bytes(value, path) {
            Ok(bytes) => self.write(path, &bytes),
            Err(err) => self.fail(err),
        }
    }

    fn fail(&mut self, err: SyncError) {
        tracing::error!(category = err.category().as_str(), error = %err, "write failed");
        if self.first_error.is_none() {
            self.first_error = Some(err);
        }
    }

    fn finish(self, report: &mut RoomUnpack) -> Result<()> {
        report.files_written += self.written;
        match self.first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

pub struct Unpacker<'a> {
    config: &'a SyncConfig,
}

impl<'a> Unpacker<'a> {
    pub fn new(config: &'a SyncConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &'a SyncConfig {
        self.config
    }

    /// Read `room_path`'s snapshot file and unpack it in place.
    pub fn unpack_room(&self, room_path: &Path) -> Result<RoomUnpack> {
        let path = room_path.join(&self.config.snapshot_file);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SyncError::MissingFile { path });
            }
            Err(e) => return Err(SyncError::io(&path, e)),
        };
        let snapshot = Snapshot::from_slice(&bytes).map_err(|e| SyncError::malformed(&path, e))?;
        self.unpack_snapshot(&snapshot, room_path)
    }

    pub fn unpack_snapshot(&self, snapshot: &Snapshot, room_path: &Path) -> Result<RoomUnpack> {
        let room_id = fsio::dir_name(room_path).ok_or_else(|| {
            SyncError::fatal_config(format!("room path {} has no name", room_path.display()))
        })?;
        let room = classify::classify_all(snapshot);
        let mut report = RoomUnpack {
            room_id,
            ..Default::default()
        };

        let mut step = StepWrites::default();
        self.write_room_files(snapshot, &room, room_path, &mut report, &mut step);
        step.finish(&mut report)?;

        let default_parent = room
            .pages
            .first()
            .map_or_else(|| model::DEFAULT_PAGE_ID.to_string(), |page| page.id.clone());
        let mut seen_ids = HashSet::new();
        let mut seen_dirs = HashSet::new();

        let mut step = StepWrites::default();
        for widget in &room.widgets {
            let shape_id = widget.shape_id();
            if !seen_ids.insert(shape_id.to_string()) {
                report.warn(format!("duplicate shape id {shape_id}, skipping"));
                continue;
            }
            let Some(dir_name) = layout::widget_dir_name(shape_id, &self.config.widget_prefix)
            else {
                report.warn(format!(
                    "shape id {shape_id:?} does not yield a safe directory name, skipping"
                ));
                continue;
            };
            if !seen_dirs.insert(dir_name.clone()) {
                report.warn(format!(
                    "shape id {shape_id} maps to {dir_name}, already used by another widget, skipping"
                ));
                continue;
            }
            let dir = room_path.join(dir_name);
            self.write_widget(widget, dir, &default_parent, &mut report, &mut step);
        }
        step.finish(&mut report)?;

        let mut linked_children = HashSet::new();
        let mut step = StepWrites::default();
        for link in &room.links {
            if !seen_ids.insert(link.info.link_shape_id.clone()) {
                report.warn(format!(
                    "duplicate shape id {}, skipping",
                    link.info.link_shape_id
                ));
                continue;
            }
            if !linked_children.insert(link.target_canvas_id.clone()) {
                report.warn(format!(
                    "{} is already linked from this room, ignoring {}",
                    link.target_canvas_id, link.info.link_shape_id
                ));
                continue;
            }
            self.write_link(link, &default_parent, room_path, &mut report, &mut step);
        }
        step.finish(&mut report)?;

        tracing::debug!(
            room = %report.room_id,
            widgets = report.widget_dirs.len(),
            links = report.links.len(),
            files_written = report.files_written,
            "unpacked room"
        );
        Ok(report)
    }

    fn write_room_files(
        &self,
        snapshot: &Snapshot,
        room: &ClassifiedRoom,
        room_path: &Path,
        report: &mut RoomUnpack,
        step: &mut StepWrites,
    ) {
        let (canvas, document_clock) = match &room.document {
            Some(document) => (document.canvas.clone(), Some(document.last_changed_clock)),
            None => {
                report.warn("snapshot has no document record, using defaults".to_string());
                (CanvasInfo::default(), None)
            }
        };
        if let Some(recorded) = canvas.room_id.as_deref()
            && recorded != report.room_id
        {
            report.warn(format!(
                "document names room {recorded}, directory is {}",
                report.room_id
            ));
        }

        let mut metadata = RoomMetadata {
            canvas: CanvasInfo {
                room_id: Some(report.room_id.clone()),
                ..canvas
            },
            pages: room.pages.clone(),
            schema: Some(snapshot.schema.clone()),
            generated_at: None,
            clock: Some(snapshot.clock),
            document_clock: Some(snapshot.document_clock),
            tombstones: Some(snapshot.tombstones.clone()),
            tombstone_history_starts_at_clock: Some(snapshot.tombstone_history_starts_at_clock),
            document_last_changed_clock: document_clock,
            storage_last_changed_clock: room.storage.last_changed_clock,
            other_records: room.others.clone(),
        };
        metadata.pages = metadata.pages_or_default();

        let metadata_path = room_path.join(&self.config.metadata_file);
        metadata.generated_at = Some(generated_at(&metadata_path, &metadata));
        step.write_json(&metadata_path, &metadata);

        step.write_json(
            &room_path.join(&self.config.storage_file),
            &Value::Object(room.storage.global.clone()),
        );
    }

    fn write_widget(
        &self,
        widget: &WidgetDescriptor,
        dir: PathBuf,
        default_parent: &str,
        report: &mut RoomUnpack,
        step: &mut StepWrites,
    ) {
        if let Err(err) = fsio::create_dir_all(&dir) {
            step.fail(err);
            return;
        }

        let mut properties = widget.properties.clone();
        properties
            .parent_id
            .get_or_insert_with(|| default_parent.to_string());
        properties
            .index
            .get_or_insert_with(|| model::DEFAULT_INDEX.to_string());

        step.write_json(&dir.join(&self.config.properties_file), &properties);
        step.write(
            &dir.join(&self.config.template_source_file),
            widget.template_source.as_bytes(),
        );
        step.write(
            &dir.join(&self.config.template_output_file),
            widget.template_output.as_bytes(),
        );
        step.write_json(&dir.join(&self.config.storage_file), &widget.storage);
        report.widget_dirs.push(dir);
    }

    fn write_link(
        &self,
        link: &LinkDescriptor,
        default_parent: &str,
        room_path: &Path,
        report: &mut RoomUnpack,
        step: &mut StepWrites,
    ) {
        let target = &link.target_canvas_id;
        if !layout::is_safe_component(target)
            || walk::role_of(target, self.config) != Some(Role::Room)
        {
            report.warn(format!("link target {target:?} is not a room directory name"));
            report.broken_links.push(target.clone());
            return;
        }
        let target_path = room_path.join(target);
        if !target_path.is_dir() {
            let err = SyncError::BrokenLink {
                parent: room_path.to_path_buf(),
                target: target.clone(),
            };
            report.warn(err.to_string());
            report.broken_links.push(target.clone());
            return;
        }
        if let Some(declared) = link.declared_parent.as_deref()
            && declared != report.room_id
        {
            report.warn(format!(
                "link {} declares parent {declared}, rewriting to {}",
                link.info.link_shape_id, report.room_id
            ));
        }

        let mut info = link.info.clone();
        info.parent_canvas_id = report.room_id.clone();
        info.parent_id
            .get_or_insert_with(|| default_parent.to_string());
        info.index
            .get_or_insert_with(|| model::DEFAULT_INDEX.to_string());
        step.write_json(&target_path.join(&self.config.link_info_file), &info);

        report.links.push(FollowableLink {
            link_shape_id: info.link_shape_id,
            target_canvas_id: target.clone(),
            target_path,
        });
    }
}

/// Keep the previous timestamp when nothing else in the metadata changed.
fn generated_at(path: &Path, metadata: &RoomMetadata) -> String {
    let previous = match fsio::read_json_opt::<RoomMetadata>(path) {
        Ok(previous) => previous,
        Err(err) => {
            tracing::debug!(error = %err, "ignoring unreadable metadata file");
            None
        }
    };
    if let Some(mut previous) = previous
        && let Some(stamp) = previous.generated_at.take()
        && previous == *metadata
    {
        return stamp;
    }
    chrono::Utc::now().to_rfc3339()
}
