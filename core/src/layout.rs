//! Directory-tree file formats.
//!
//! ```text
//! room-A/
//!   snapshot.json            Snapshot (document-store form)
//!   canvas-info.json         RoomMetadata
//!   storage.json             room-wide key/value store
//!   widget-W1/
//!     properties.json        WidgetProperties
//!     template.src           template source, opaque
//!     template.out           compiled template output, opaque
//!     storage.json           per-widget state
//!   room-B/
//!     canvas-link-info.json  LinkInfo written by room-A
//!     ...
//! ```
//!
//! Clock fields are optional on read so the packer can default each one
//! independently; the unpacker always writes them.

use crate::model;
use crate::model::DocumentEntry;
use crate::model::SnapshotSchema;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Number;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    #[serde(default = "model::default_zero")]
    pub x: Number,
    #[serde(default = "model::default_zero")]
    pub y: Number,
}

impl Default for Position {
    fn default() -> Self {
        Self {
            x: model::default_zero(),
            y: model::default_zero(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Size {
    #[serde(default = "model::default_width")]
    pub w: Number,
    #[serde(default = "model::default_height")]
    pub h: Number,
}

impl Default for Size {
    fn default() -> Self {
        Self {
            w: model::default_width(),
            h: model::default_height(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanvasMode {
    #[default]
    Freeform,
}

impl CanvasMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Freeform => "freeform",
        }
    }

    /// Unknown modes read as the default rather than failing the room.
    pub fn from_meta(meta: &Map<String, Value>) -> Self {
        match meta.get("canvasMode").and_then(Value::as_str) {
            Some("freeform") | None => Self::Freeform,
            Some(other) => {
                tracing::warn!(mode = other, "unknown canvas mode, using freeform");
                Self::Freeform
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default)]
    pub canvas_mode: CanvasMode,
    #[serde(default = "default_canvas_name")]
    pub canvas_name: String,
    #[serde(default = "default_grid_size")]
    pub grid_size: u64,
    /// Document `meta` minus the keys mirrored in the fields above.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
}

impl Default for CanvasInfo {
    fn default() -> Self {
        Self {
            room_id: None,
            canvas_mode: CanvasMode::default(),
            canvas_name: default_canvas_name(),
            grid_size: default_grid_size(),
            meta: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageEntry {
    #[serde(default = "default_page_id")]
    pub id: String,
    #[serde(default = "default_page_name")]
    pub name: String,
    #[serde(default = "default_index")]
    pub index: String,
    #[serde(default)]
    pub meta: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_changed_clock: Option<i64>,
}

impl Default for PageEntry {
    fn default() -> Self {
        Self {
            id: default_page_id(),
            name: default_page_name(),
            index: default_index(),
            meta: Map::new(),
            last_changed_clock: None,
        }
    }
}

/// Contents of a room's metadata file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMetadata {
    #[serde(default)]
    pub canvas: CanvasInfo,
    #[serde(default)]
    pub pages: Vec<PageEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SnapshotSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_clock: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tombstones: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tombstone_history_starts_at_clock: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_last_changed_clock: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_last_changed_clock: Option<i64>,
    /// Records the converter does not model, kept for the next pack.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub other_records: Vec<DocumentEntry>,
}

impl RoomMetadata {
    /// Pages to emit; a room always has at least one.
    pub fn pages_or_default(&self) -> Vec<PageEntry> {
        if self.pages.is_empty() {
            vec![PageEntry::default()]
        } else {
            self.pages.clone()
        }
    }
}

/// Contents of `properties.json` inside a widget directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetProperties {
    #[serde(default)]
    pub shape_id: String,
    #[serde(default)]
    pub template_handle: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub size: Size,
    #[serde(default = "model::default_zero")]
    pub rotation: Number,
    #[serde(default = "model::default_one")]
    pub opacity: Number,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "model::default_one")]
    pub zoom_scale: Number,
    #[serde(default)]
    pub meta: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_changed_clock: Option<i64>,
}

impl WidgetProperties {
    pub fn new(shape_id: impl Into<String>, template_handle: impl Into<String>) -> Self {
        Self {
            shape_id: shape_id.into(),
            template_handle: template_handle.into(),
            position: Position::default(),
            size: Size::default(),
            rotation: model::default_zero(),
            opacity: model::default_one(),
            is_locked: false,
            color: default_color(),
            zoom_scale: model::default_one(),
            meta: Map::new(),
            parent_id: Some(default_page_id()),
            index: Some(default_index()),
            last_changed_clock: None,
        }
    }
}

/// Link descriptor, stored in the child room's directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkInfo {
    pub parent_canvas_id: String,
    pub link_shape_id: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub size: Size,
    #[serde(default)]
    pub label: String,
    #[serde(default = "default_link_type")]
    pub link_type: String,
    #[serde(default = "model::default_zero")]
    pub rotation: Number,
    #[serde(default = "model::default_one")]
    pub opacity: Number,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default)]
    pub meta: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_changed_clock: Option<i64>,
}

impl LinkInfo {
    pub fn new(parent_canvas_id: impl Into<String>, link_shape_id: impl Into<String>) -> Self {
        Self {
            parent_canvas_id: parent_canvas_id.into(),
            link_shape_id: link_shape_id.into(),
            position: Position::default(),
            size: Size::default(),
            label: String::new(),
            link_type: default_link_type(),
            rotation: model::default_zero(),
            opacity: model::default_one(),
            is_locked: false,
            meta: Map::new(),
            parent_id: Some(default_page_id()),
            index: Some(default_index()),
            last_changed_clock: None,
        }
    }
}

/// Directory name for a widget: the shape id with its type prefix stripped
/// (`shape:foo` becomes `widget-foo`). `None` when the remainder is not a
/// safe single path component.
pub fn widget_dir_name(shape_id: &str, widget_prefix: &str) -> Option<String> {
    let stem = shape_id
        .split_once(':')
        .map_or(shape_id, |(_, rest)| rest);
    if !is_safe_component(stem) {
        return None;
    }
    Some(format!("{widget_prefix}{stem}"))
}

/// Inverse of [`widget_dir_name`], used when `properties.json` lacks a shape id.
pub fn shape_id_from_dir_name(dir_name: &str, widget_prefix: &str) -> Option<String> {
    dir_name
        .strip_prefix(widget_prefix)
        .filter(|stem| !stem.is_empty())
        .map(|stem| format!("shape:{stem}"))
}

/// True for a non-empty name that cannot escape its parent directory.
pub fn is_safe_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

fn default_canvas_name() -> String {
    model::DEFAULT_CANVAS_NAME.to_string()
}

fn default_grid_size() -> u64 {
    model::DEFAULT_GRID_SIZE
}

fn default_page_id() -> String {
    model::DEFAULT_PAGE_ID.to_string()
}

fn default_page_name() -> String {
    model::DEFAULT_PAGE_NAME.to_string()
}

fn default_index() -> String {
    model::DEFAULT_INDEX.to_string()
}

fn default_color() -> String {
    model::DEFAULT_COLOR.to_string()
}

fn default_link_type() -> String {
    model::DEFAULT_LINK_TYPE.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn widget_dir_name_strips_type_prefix() {
        assert_eq!(widget_dir_name("shape:foo", "widget-").as_deref(), Some("widget-foo"));
        assert_eq!(widget_dir_name("bare", "widget-").as_deref(), Some("widget-bare"));
        assert_eq!(widget_dir_name("shape:a:b", "widget-").as_deref(), Some("widget-a:b"));
    }

    #[test]
    fn widget_dir_name_rejects_unsafe_ids() {
        assert_eq!(widget_dir_name("shape:", "widget-"), None);
        assert_eq!(widget_dir_name("shape:..", "widget-"), None);
        assert_eq!(widget_dir_name("shape:a/b", "widget-"), None);
    }

    #[test]
    fn shape_id_round_trips_through_dir_name() {
        let dir = widget_dir_name("shape:W1", "widget-").unwrap();
        assert_eq!(
            shape_id_from_dir_name(&dir, "widget-").as_deref(),
            Some("shape:W1")
        );
        assert_eq!(shape_id_from_dir_name("widget-", "widget-"), None);
    }

    #[test]
    fn empty_metadata_file_reads_as_defaults() {
        let meta: RoomMetadata = serde_json::from_value(json!({})).unwrap();
        assert_eq!(meta.canvas.grid_size, 10);
        assert_eq!(meta.canvas.canvas_mode, CanvasMode::Freeform);
        assert_eq!(meta.pages_or_default(), vec![PageEntry::default()]);
        assert_eq!(meta.clock, None);
    }

    #[test]
    fn widget_properties_fill_display_defaults() {
        let props: WidgetProperties =
            serde_json::from_value(json!({"shapeId": "shape:W1"})).unwrap();
        assert_eq!(props.rotation, Number::from(0));
        assert_eq!(props.opacity, Number::from(1));
        assert_eq!(props.color, "black");
        assert_eq!(props.zoom_scale, Number::from(1));
        assert_eq!(props.size, Size::default());
        assert!(!props.is_locked);
    }
}
