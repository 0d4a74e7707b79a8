//! In-memory snapshot of one room.
//!
//! A snapshot is the document-store view of a room: a logical clock pair, a
//! tombstone map, an opaque schema block and an ordered list of records.
//! Records are a tagged union keyed on `typeName` (and `type` for shapes);
//! anything the converter does not understand is kept verbatim as
//! [`Record::Other`].

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde_json::Map;
use serde_json::Number;
use serde_json::Value;

/// Version stamped into every snapshot the packer writes.
pub const SCHEMA_VERSION: u64 = 2;

/// Fallback clock for a record is its list position plus this offset.
pub const CLOCK_OFFSET: i64 = 1;

pub const DOCUMENT_ID: &str = "document:document";
pub const STORAGE_ID: &str = "storage:storage";
pub const DEFAULT_PAGE_ID: &str = "page:page";
pub const DEFAULT_PAGE_NAME: &str = "Page 1";
pub const DEFAULT_INDEX: &str = "a1";
pub const DEFAULT_CANVAS_NAME: &str = "Untitled";
pub const DEFAULT_GRID_SIZE: u64 = 10;
pub const DEFAULT_WIDTH: u64 = 300;
pub const DEFAULT_HEIGHT: u64 = 200;
pub const DEFAULT_COLOR: &str = "black";
pub const DEFAULT_LINK_TYPE: &str = "canvas";

/// Record-kind sequence counters shipped with [`SCHEMA_VERSION`].
const SCHEMA_SEQUENCES: &[(&str, u64)] = &[
    ("com.tldraw.store", 4),
    ("com.tldraw.asset", 1),
    ("com.tldraw.camera", 1),
    ("com.tldraw.document", 2),
    ("com.tldraw.instance", 25),
    ("com.tldraw.instance_page_state", 5),
    ("com.tldraw.page", 1),
    ("com.tldraw.instance_presence", 5),
    ("com.tldraw.pointer", 1),
    ("com.tldraw.shape", 4),
    ("com.tldraw.shape.widget", 1),
    ("com.tldraw.shape.link", 1),
    ("com.tldraw.binding", 1),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSchema {
    #[serde(default = "default_schema_version")]
    pub schema_version: u64,
    #[serde(default = "default_sequences")]
    pub sequences: Map<String, Value>,
}

fn default_schema_version() -> u64 {
    SCHEMA_VERSION
}

fn default_sequences() -> Map<String, Value> {
    SCHEMA_SEQUENCES
        .iter()
        .map(|(kind, seq)| ((*kind).to_string(), Value::from(*seq)))
        .collect()
}

impl Default for SnapshotSchema {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            sequences: default_sequences(),
        }
    }
}

/// One element of a snapshot's `documents` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentEntry {
    pub state: Record,
    #[serde(default)]
    pub last_changed_clock: i64,
}

impl DocumentEntry {
    pub fn new(state: Record, last_changed_clock: i64) -> Self {
        Self {
            state,
            last_changed_clock,
        }
    }
}

/// Complete document-store representation of one room.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub clock: i64,
    pub document_clock: i64,
    pub tombstones: Map<String, Value>,
    pub tombstone_history_starts_at_clock: i64,
    pub schema: SnapshotSchema,
    pub documents: Vec<DocumentEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntry {
    state: Record,
    #[serde(default)]
    last_changed_clock: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSnapshot {
    #[serde(default)]
    clock: Option<i64>,
    #[serde(default)]
    document_clock: Option<i64>,
    #[serde(default)]
    tombstones: Option<Map<String, Value>>,
    #[serde(default)]
    tombstone_history_starts_at_clock: Option<i64>,
    #[serde(default)]
    schema: Option<SnapshotSchema>,
    #[serde(default)]
    documents: Vec<RawEntry>,
}

impl<'de> Deserialize<'de> for Snapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawSnapshot::deserialize(deserializer)?;
        let documents: Vec<DocumentEntry> = raw
            .documents
            .into_iter()
            .enumerate()
            .map(|(position, entry)| DocumentEntry {
                state: entry.state,
                last_changed_clock: entry
                    .last_changed_clock
                    .unwrap_or_else(|| fallback_clock(position)),
            })
            .collect();
        let max_clock = max_record_clock(&documents);
        Ok(Self {
            clock: raw.clock.unwrap_or(max_clock),
            document_clock: raw.document_clock.unwrap_or(max_clock),
            tombstones: raw.tombstones.unwrap_or_default(),
            tombstone_history_starts_at_clock: raw.tombstone_history_starts_at_clock.unwrap_or(0),
            schema: raw.schema.unwrap_or_default(),
            documents,
        })
    }
}

impl Snapshot {
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Pretty-printed JSON with a trailing newline.
    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

/// Clock assigned to a record that does not carry one.
pub fn fallback_clock(position: usize) -> i64 {
    i64::try_from(position).unwrap_or(i64::MAX - CLOCK_OFFSET) + CLOCK_OFFSET
}

pub fn max_record_clock(documents: &[DocumentEntry]) -> i64 {
    documents
        .iter()
        .map(|entry| entry.last_changed_clock)
        .max()
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Document,
    Page,
    Storage,
    WidgetShape,
    LinkShape,
    Other,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Page => "page",
            Self::Storage => "storage",
            Self::WidgetShape => "widget-shape",
            Self::LinkShape => "link-shape",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    #[serde(default = "default_document_id")]
    pub id: String,
    #[serde(default = "default_canvas_name")]
    pub name: String,
    #[serde(default = "default_grid_size")]
    pub grid_size: u64,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRecord {
    pub id: String,
    #[serde(default = "default_page_name")]
    pub name: String,
    #[serde(default = "default_index")]
    pub index: String,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

/// Room-wide key/value store plus per-widget state keyed by shape id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageRecord {
    #[serde(default = "default_storage_id")]
    pub id: String,
    #[serde(default)]
    pub global: Map<String, Value>,
    #[serde(default)]
    pub shapes: Map<String, Value>,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetProps {
    #[serde(default = "default_width")]
    pub w: Number,
    #[serde(default = "default_height")]
    pub h: Number,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_one")]
    pub zoom_scale: Number,
    #[serde(default)]
    pub template_handle: String,
    #[serde(default)]
    pub template_source: String,
    #[serde(default)]
    pub template_output: String,
}

impl Default for WidgetProps {
    fn default() -> Self {
        Self {
            w: default_width(),
            h: default_height(),
            color: default_color(),
            zoom_scale: default_one(),
            template_handle: String::new(),
            template_source: String::new(),
            template_output: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetShape {
    pub id: String,
    #[serde(default = "default_zero")]
    pub x: Number,
    #[serde(default = "default_zero")]
    pub y: Number,
    #[serde(default = "default_zero")]
    pub rotation: Number,
    #[serde(default = "default_one")]
    pub opacity: Number,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(default)]
    pub meta: Map<String, Value>,
    #[serde(default)]
    pub props: WidgetProps,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkProps {
    #[serde(default = "default_width")]
    pub w: Number,
    #[serde(default = "default_height")]
    pub h: Number,
    #[serde(default)]
    pub label: String,
    #[serde(default = "default_link_type")]
    pub link_type: String,
    pub target_canvas_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_canvas_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkShape {
    pub id: String,
    #[serde(default = "default_zero")]
    pub x: Number,
    #[serde(default = "default_zero")]
    pub y: Number,
    #[serde(default = "default_zero")]
    pub rotation: Number,
    #[serde(default = "default_one")]
    pub opacity: Number,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(default)]
    pub meta: Map<String, Value>,
    pub props: LinkProps,
}

/// A typed snapshot record.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Document(DocumentRecord),
    Page(PageRecord),
    Storage(StorageRecord),
    Widget(WidgetShape),
    Link(LinkShape),
    Other(Value),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Document(_) => RecordKind::Document,
            Self::Page(_) => RecordKind::Page,
            Self::Storage(_) => RecordKind::Storage,
            Self::Widget(_) => RecordKind::WidgetShape,
            Self::Link(_) => RecordKind::LinkShape,
            Self::Other(_) => RecordKind::Other,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Document(r) => Some(&r.id),
            Self::Page(r) => Some(&r.id),
            Self::Storage(r) => Some(&r.id),
            Self::Widget(r) => Some(&r.id),
            Self::Link(r) => Some(&r.id),
            Self::Other(value) => value.get("id").and_then(Value::as_str),
        }
    }

    /// Decode a raw record. Never fails: unknown kinds, and known kinds whose
    /// payload does not match, come back as [`Record::Other`].
    pub fn from_value(value: Value) -> Self {
        let type_name = value.get("typeName").and_then(Value::as_str);
        let shape_type = value.get("type").and_then(Value::as_str);
        let decoded = match (type_name, shape_type) {
            (Some("document"), _) => decode(&value).map(Self::Document),
            (Some("page"), _) => decode(&value).map(Self::Page),
            (Some("storage"), _) => decode(&value).map(Self::Storage),
            (Some("shape"), Some("widget")) => decode(&value).map(Self::Widget),
            (Some("shape"), Some("link")) => decode(&value).map(Self::Link),
            _ => return Self::Other(value),
        };
        match decoded {
            Ok(record) => record,
            Err(err) => {
                let id = value.get("id").and_then(Value::as_str).unwrap_or("<none>");
                tracing::warn!(
                    id,
                    error = %err,
                    "record payload does not match its kind, keeping it opaque"
                );
                Self::Other(value)
            }
        }
    }

    /// Encode back to the wire shape, with `typeName`/`type` right after `id`.
    pub fn to_value(&self) -> serde_json::Result<Value> {
        let (body, type_name, shape_type) = match self {
            Self::Document(r) => (serde_json::to_value(r)?, "document", None),
            Self::Page(r) => (serde_json::to_value(r)?, "page", None),
            Self::Storage(r) => (serde_json::to_value(r)?, "storage", None),
            Self::Widget(r) => (serde_json::to_value(r)?, "shape", Some("widget")),
            Self::Link(r) => (serde_json::to_value(r)?, "shape", Some("link")),
            Self::Other(value) => return Ok(value.clone()),
        };
        let Value::Object(fields) = body else {
            return Ok(body);
        };

        let mut out = Map::new();
        if let Some(id) = fields.get("id") {
            out.insert("id".to_string(), id.clone());
        }
        out.insert("typeName".to_string(), Value::from(type_name));
        if let Some(shape_type) = shape_type {
            out.insert("type".to_string(), Value::from(shape_type));
        }
        for (key, value) in fields {
            if key != "id" {
                out.insert(key, value);
            }
        }
        Ok(Value::Object(out))
    }
}

/// Typed decode that treats an explicit `null` the same as an absent field,
/// so defaults apply to both. `meta` is left alone.
fn decode<T: serde::de::DeserializeOwned>(value: &Value) -> serde_json::Result<T> {
    let mut cleaned = value.clone();
    if let Value::Object(fields) = &mut cleaned {
        fields.retain(|_, v| !v.is_null());
        if let Some(Value::Object(props)) = fields.get_mut("props") {
            props.retain(|_, v| !v.is_null());
        }
    }
    serde_json::from_value(cleaned)
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_value)
    }
}

fn default_document_id() -> String {
    DOCUMENT_ID.to_string()
}

fn default_storage_id() -> String {
    STORAGE_ID.to_string()
}

fn default_canvas_name() -> String {
    DEFAULT_CANVAS_NAME.to_string()
}

fn default_page_name() -> String {
    DEFAULT_PAGE_NAME.to_string()
}

fn default_index() -> String {
    DEFAULT_INDEX.to_string()
}

fn default_grid_size() -> u64 {
    DEFAULT_GRID_SIZE
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

fn default_link_type() -> String {
    DEFAULT_LINK_TYPE.to_string()
}

pub(crate) fn default_zero() -> Number {
    Number::from(0)
}

pub(crate) fn default_one() -> Number {
    Number::from(1)
}

pub(crate) fn default_width() -> Number {
    Number::from(DEFAULT_WIDTH)
}

pub(crate) fn default_height() -> Number {
    Number::from(DEFAULT_HEIGHT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn decodes_each_record_kind() {
        let snapshot: Snapshot = serde_json::from_value(json!({
            "clock": 9,
            "documentClock": 9,
            "tombstones": {"shape:gone": 4},
            "tombstoneHistoryStartsAtClock": 0,
            "schema": {"schemaVersion": 2, "sequences": {"com.tldraw.shape": 4}},
            "documents": [
                {"state": {"id": "document:document", "typeName": "document", "name": "A", "gridSize": 20, "meta": {}}, "lastChangedClock": 1},
                {"state": {"id": "page:page", "typeName": "page", "name": "Page 1", "index": "a1", "meta": {}}, "lastChangedClock": 2},
                {"state": {"id": "storage:storage", "typeName": "storage", "global": {"k": 1}, "shapes": {}}, "lastChangedClock": 3},
                {"state": {"id": "shape:w", "typeName": "shape", "type": "widget", "x": 1, "y": 2, "props": {}}, "lastChangedClock": 4},
                {"state": {"id": "shape:l", "typeName": "shape", "type": "link", "props": {"targetCanvasId": "room-B"}}, "lastChangedClock": 5},
                {"state": {"id": "camera:1", "typeName": "camera", "x": 0}, "lastChangedClock": 6}
            ]
        }))
        .unwrap();

        let kinds: Vec<RecordKind> = snapshot.documents.iter().map(|d| d.state.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                RecordKind::Document,
                RecordKind::Page,
                RecordKind::Storage,
                RecordKind::WidgetShape,
                RecordKind::LinkShape,
                RecordKind::Other,
            ]
        );
        assert_eq!(snapshot.tombstones.get("shape:gone"), Some(&json!(4)));
    }

    #[test]
    fn link_without_target_stays_opaque() {
        let raw = json!({"id": "shape:l", "typeName": "shape", "type": "link", "props": {}});
        assert_eq!(Record::from_value(raw.clone()), Record::Other(raw));
    }

    #[test]
    fn nulls_fall_back_to_defaults() {
        let record = Record::from_value(json!({
            "id": "shape:w",
            "typeName": "shape",
            "type": "widget",
            "rotation": null,
            "opacity": null,
            "props": {"color": null, "zoomScale": null}
        }));
        let Record::Widget(widget) = record else {
            panic!("expected a widget record");
        };
        assert_eq!(widget.rotation, Number::from(0));
        assert_eq!(widget.opacity, Number::from(1));
        assert_eq!(widget.props.color, "black");
        assert_eq!(widget.props.zoom_scale, Number::from(1));
        assert_eq!(widget.props.w, Number::from(300));
        assert_eq!(widget.props.h, Number::from(200));
    }

    #[test]
    fn missing_clocks_are_derived_from_position() {
        let snapshot: Snapshot = serde_json::from_value(json!({
            "documents": [
                {"state": {"id": "document:document", "typeName": "document"}},
                {"state": {"id": "page:page", "typeName": "page"}, "lastChangedClock": 7},
                {"state": {"id": "storage:storage", "typeName": "storage"}}
            ]
        }))
        .unwrap();
        let clocks: Vec<i64> = snapshot
            .documents
            .iter()
            .map(|d| d.last_changed_clock)
            .collect();
        assert_eq!(clocks, vec![1, 7, 3]);
        assert_eq!(snapshot.clock, 7);
        assert_eq!(snapshot.document_clock, 7);
        assert_eq!(snapshot.schema, SnapshotSchema::default());
    }

    #[test]
    fn encodes_type_tags_after_id() {
        let record = Record::Page(PageRecord {
            id: "page:page".to_string(),
            name: "Page 1".to_string(),
            index: "a1".to_string(),
            meta: Map::new(),
        });
        let value = record.to_value().unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["id", "typeName", "name", "index", "meta"]);
    }
}
