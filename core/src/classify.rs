//! Record classification.
//!
//! Turns snapshot records into the normalized views the tree layout stores,
//! and turns those views back into records for the packer. No I/O happens
//! here.

use crate::layout::CanvasInfo;
use crate::layout::CanvasMode;
use crate::layout::LinkInfo;
use crate::layout::PageEntry;
use crate::layout::Position;
use crate::layout::Size;
use crate::layout::WidgetProperties;
use crate::model;
use crate::model::DocumentEntry;
use crate::model::DocumentRecord;
use crate::model::LinkProps;
use crate::model::LinkShape;
use crate::model::PageRecord;
use crate::model::Record;
use crate::model::Snapshot;
use crate::model::StorageRecord;
use crate::model::WidgetProps;
use crate::model::WidgetShape;
use serde_json::Map;
use serde_json::Value;

const META_CANVAS_MODE: &str = "canvasMode";
const META_ROOM_ID: &str = "roomId";

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentInfo {
    pub canvas: CanvasInfo,
    pub last_changed_clock: i64,
}

impl DocumentInfo {
    fn from_record(record: &DocumentRecord, last_changed_clock: i64) -> Self {
        let mut meta = record.meta.clone();
        let canvas_mode = CanvasMode::from_meta(&meta);
        let room_id = meta
            .get(META_ROOM_ID)
            .and_then(Value::as_str)
            .map(str::to_string);
        meta.remove(META_CANVAS_MODE);
        meta.remove(META_ROOM_ID);

        let grid_size = if record.grid_size == 0 {
            tracing::warn!(id = %record.id, "grid size 0 is not allowed, using default");
            model::DEFAULT_GRID_SIZE
        } else {
            record.grid_size
        };

        Self {
            canvas: CanvasInfo {
                room_id,
                canvas_mode,
                canvas_name: record.name.clone(),
                grid_size,
                meta,
            },
            last_changed_clock,
        }
    }
}

/// Document record for `room_id`; the directory name wins over any room id
/// recorded earlier.
pub fn document_record(canvas: &CanvasInfo, room_id: &str) -> DocumentRecord {
    let mut meta = Map::new();
    meta.insert(
        META_CANVAS_MODE.to_string(),
        Value::from(canvas.canvas_mode.as_str()),
    );
    meta.insert(META_ROOM_ID.to_string(), Value::from(room_id));
    for (key, value) in &canvas.meta {
        meta.insert(key.clone(), value.clone());
    }
    DocumentRecord {
        id: model::DOCUMENT_ID.to_string(),
        name: canvas.canvas_name.clone(),
        grid_size: canvas.grid_size.max(1),
        meta,
    }
}

fn page_entry(record: &PageRecord, last_changed_clock: i64) -> PageEntry {
    PageEntry {
        id: record.id.clone(),
        name: record.name.clone(),
        index: record.index.clone(),
        meta: record.meta.clone(),
        last_changed_clock: Some(last_changed_clock),
    }
}

pub fn page_record(page: &PageEntry) -> PageRecord {
    PageRecord {
        id: page.id.clone(),
        name: page.name.clone(),
        index: page.index.clone(),
        meta: page.meta.clone(),
    }
}

/// The room's storage record split into its global store and the
/// per-widget entries keyed by shape id.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StorageMaps {
    pub global: Map<String, Value>,
    pub shapes: Map<String, Value>,
    pub meta: Map<String, Value>,
    pub last_changed_clock: Option<i64>,
}

impl StorageMaps {
    /// Maps of the first storage record in `documents`, or empty maps.
    pub fn from_documents(documents: &[DocumentEntry]) -> Self {
        documents
            .iter()
            .find_map(|entry| match &entry.state {
                Record::Storage(record) => Some(Self::from_record(record, entry.last_changed_clock)),
                _ => None,
            })
            .unwrap_or_default()
    }

    fn from_record(record: &StorageRecord, last_changed_clock: i64) -> Self {
        Self {
            global: record.global.clone(),
            shapes: record.shapes.clone(),
            meta: record.meta.clone(),
            last_changed_clock: Some(last_changed_clock),
        }
    }

    /// Private storage of one widget; `{}` when the room has no entry for it.
    pub fn widget_storage(&self, shape_id: &str) -> Value {
        self.shapes
            .get(shape_id)
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()))
    }

    pub fn to_record(&self) -> StorageRecord {
        StorageRecord {
            id: model::STORAGE_ID.to_string(),
            global: self.global.clone(),
            shapes: self.shapes.clone(),
            meta: self.meta.clone(),
        }
    }
}

/// A widget shape joined with its private storage.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetDescriptor {
    pub properties: WidgetProperties,
    pub template_source: String,
    pub template_output: String,
    pub storage: Value,
}

impl WidgetDescriptor {
    fn from_record(shape: &WidgetShape, last_changed_clock: i64, storage: &StorageMaps) -> Self {
        let properties = WidgetProperties {
            shape_id: shape.id.clone(),
            template_handle: shape.props.template_handle.clone(),
            position: Position {
                x: shape.x.clone(),
                y: shape.y.clone(),
            },
            size: Size {
                w: shape.props.w.clone(),
                h: shape.props.h.clone(),
            },
            rotation: shape.rotation.clone(),
            opacity: shape.opacity.clone(),
            is_locked: shape.is_locked,
            color: shape.props.color.clone(),
            zoom_scale: shape.props.zoom_scale.clone(),
            meta: shape.meta.clone(),
            parent_id: shape.parent_id.clone(),
            index: shape.index.clone(),
            last_changed_clock: Some(last_changed_clock),
        };
        Self {
            properties,
            template_source: shape.props.template_source.clone(),
            template_output: shape.props.template_output.clone(),
            storage: storage.widget_storage(&shape.id),
        }
    }

    pub fn shape_id(&self) -> &str {
        &self.properties.shape_id
    }

    pub fn to_record(&self) -> WidgetShape {
        let p = &self.properties;
        WidgetShape {
            id: p.shape_id.clone(),
            x: p.position.x.clone(),
            y: p.position.y.clone(),
            rotation: p.rotation.clone(),
            opacity: p.opacity.clone(),
            is_locked: p.is_locked,
            parent_id: p.parent_id.clone(),
            index: p.index.clone(),
            meta: p.meta.clone(),
            props: WidgetProps {
                w: p.size.w.clone(),
                h: p.size.h.clone(),
                color: p.color.clone(),
                zoom_scale: p.zoom_scale.clone(),
                template_handle: p.template_handle.clone(),
                template_source: self.template_source.clone(),
                template_output: self.template_output.clone(),
            },
        }
    }
}

/// A link shape as seen from the room that owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkDescriptor {
    pub target_canvas_id: String,
    /// `parentCanvasId` carried by the record itself, if any.
    pub declared_parent: Option<String>,
    pub info: LinkInfo,
}

impl LinkDescriptor {
    fn from_record(shape: &LinkShape, last_changed_clock: i64) -> Self {
        let info = LinkInfo {
            parent_canvas_id: shape.props.parent_canvas_id.clone().unwrap_or_default(),
            link_shape_id: shape.id.clone(),
            position: Position {
                x: shape.x.clone(),
                y: shape.y.clone(),
            },
            size: Size {
                w: shape.props.w.clone(),
                h: shape.props.h.clone(),
            },
            label: shape.props.label.clone(),
            link_type: shape.props.link_type.clone(),
            rotation: shape.rotation.clone(),
            opacity: shape.opacity.clone(),
            is_locked: shape.is_locked,
            meta: shape.meta.clone(),
            parent_id: shape.parent_id.clone(),
            index: shape.index.clone(),
            last_changed_clock: Some(last_changed_clock),
        };
        Self {
            target_canvas_id: shape.props.target_canvas_id.clone(),
            declared_parent: shape.props.parent_canvas_id.clone(),
            info,
        }
    }

    /// Rebuild the link shape from a descriptor found in `target_canvas_id`.
    pub fn record_from_info(info: &LinkInfo, target_canvas_id: &str) -> LinkShape {
        LinkShape {
            id: info.link_shape_id.clone(),
            x: info.position.x.clone(),
            y: info.position.y.clone(),
            rotation: info.rotation.clone(),
            opacity: info.opacity.clone(),
            is_locked: info.is_locked,
            parent_id: info.parent_id.clone(),
            index: info.index.clone(),
            meta: info.meta.clone(),
            props: LinkProps {
                w: info.size.w.clone(),
                h: info.size.h.clone(),
                label: info.label.clone(),
                link_type: info.link_type.clone(),
                target_canvas_id: target_canvas_id.to_string(),
                parent_canvas_id: Some(info.parent_canvas_id.clone()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    Document(DocumentInfo),
    Page(PageEntry),
    Storage(StorageMaps),
    Widget(WidgetDescriptor),
    Link(LinkDescriptor),
}

/// Classify one record. `storage` supplies widget private state; ignored
/// kinds return `None`.
pub fn classify(entry: &DocumentEntry, storage: &StorageMaps) -> Option<Classified> {
    let clock = entry.last_changed_clock;
    match &entry.state {
        Record::Document(record) => Some(Classified::Document(DocumentInfo::from_record(
            record, clock,
        ))),
        Record::Page(record) => Some(Classified::Page(page_entry(record, clock))),
        Record::Storage(record) => Some(Classified::Storage(StorageMaps::from_record(
            record, clock,
        ))),
        Record::Widget(shape) => Some(Classified::Widget(WidgetDescriptor::from_record(
            shape, clock, storage,
        ))),
        Record::Link(shape) => Some(Classified::Link(LinkDescriptor::from_record(shape, clock))),
        Record::Other(_) => None,
    }
}

/// Every record of a room, grouped by kind in snapshot order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClassifiedRoom {
    pub document: Option<DocumentInfo>,
    pub pages: Vec<PageEntry>,
    pub storage: StorageMaps,
    pub widgets: Vec<WidgetDescriptor>,
    pub links: Vec<LinkDescriptor>,
    /// Unclassified entries, kept verbatim.
    pub others: Vec<DocumentEntry>,
}

pub fn classify_all(snapshot: &Snapshot) -> ClassifiedRoom {
    let storage = StorageMaps::from_documents(&snapshot.documents);
    let mut room = ClassifiedRoom {
        storage: storage.clone(),
        ..Default::default()
    };
    let mut seen_storage = false;

    for entry in &snapshot.documents {
        match classify(entry, &storage) {
            Some(Classified::Document(info)) => {
                if room.document.is_some() {
                    tracing::warn!("room has more than one document record, keeping the first");
                } else {
                    room.document = Some(info);
                }
            }
            Some(Classified::Page(page)) => room.pages.push(page),
            Some(Classified::Storage(_)) => {
                if seen_storage {
                    tracing::warn!("room has more than one storage record, keeping the first");
                }
                seen_storage = true;
            }
            Some(Classified::Widget(widget)) => room.widgets.push(widget),
            Some(Classified::Link(link)) => room.links.push(link),
            None => room.others.push(entry.clone()),
        }
    }

    room
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::Number;
    use serde_json::json;

    fn entry(state: Value, clock: i64) -> DocumentEntry {
        DocumentEntry::new(Record::from_value(state), clock)
    }

    #[test]
    fn widget_picks_up_private_storage_by_shape_id() {
        let storage = StorageMaps::from_documents(&[entry(
            json!({"id": "storage:storage", "typeName": "storage", "global": {}, "shapes": {"shape:W1": {"count": 3}}}),
            3,
        )]);
        let widget = entry(
            json!({"id": "shape:W1", "typeName": "shape", "type": "widget", "x": 10, "y": 20, "props": {"templateHandle": "counter"}}),
            4,
        );

        let Some(Classified::Widget(descriptor)) = classify(&widget, &storage) else {
            panic!("expected widget");
        };
        assert_eq!(descriptor.storage, json!({"count": 3}));
        assert_eq!(descriptor.properties.position.x, Number::from(10));
        assert_eq!(descriptor.properties.template_handle, "counter");
        assert_eq!(descriptor.properties.last_changed_clock, Some(4));
    }

    #[test]
    fn widget_without_storage_entry_gets_empty_object() {
        let widget = entry(
            json!({"id": "shape:W2", "typeName": "shape", "type": "widget"}),
            1,
        );
        let Some(Classified::Widget(descriptor)) = classify(&widget, &StorageMaps::default())
        else {
            panic!("expected widget");
        };
        assert_eq!(descriptor.storage, json!({}));
        assert_eq!(descriptor.properties.color, "black");
    }

    #[test]
    fn unknown_kinds_are_ignored() {
        let camera = entry(json!({"id": "camera:1", "typeName": "camera"}), 1);
        assert_eq!(classify(&camera, &StorageMaps::default()), None);

        let geo = entry(json!({"id": "shape:g", "typeName": "shape", "type": "geo"}), 1);
        assert_eq!(classify(&geo, &StorageMaps::default()), None);
    }

    #[test]
    fn document_meta_splits_out_room_identity() {
        let doc = entry(
            json!({"id": "document:document", "typeName": "document", "name": "Main", "gridSize": 20,
                   "meta": {"canvasMode": "freeform", "roomId": "room-A", "theme": "dark"}}),
            1,
        );
        let Some(Classified::Document(info)) = classify(&doc, &StorageMaps::default()) else {
            panic!("expected document");
        };
        assert_eq!(info.canvas.room_id.as_deref(), Some("room-A"));
        assert_eq!(info.canvas.grid_size, 20);
        assert_eq!(Value::Object(info.canvas.meta.clone()), json!({"theme": "dark"}));

        let record = document_record(&info.canvas, "room-A");
        assert_eq!(
            Value::Object(record.meta),
            json!({"canvasMode": "freeform", "roomId": "room-A", "theme": "dark"})
        );
    }

    #[test]
    fn link_record_round_trips_through_descriptor() {
        let raw = json!({
            "id": "shape:L1", "typeName": "shape", "type": "link",
            "x": 5, "y": 6, "rotation": 0, "opacity": 1, "isLocked": false,
            "parentId": "page:page", "index": "a2", "meta": {},
            "props": {"w": 120, "h": 80, "label": "Next", "linkType": "canvas",
                      "targetCanvasId": "room-B", "parentCanvasId": "room-A"}
        });
        let Some(Classified::Link(link)) = classify(&entry(raw.clone(), 5), &StorageMaps::default())
        else {
            panic!("expected link");
        };
        assert_eq!(link.target_canvas_id, "room-B");
        assert_eq!(link.info.parent_canvas_id, "room-A");

        let rebuilt = Record::Link(LinkDescriptor::record_from_info(&link.info, "room-B"));
        assert_eq!(rebuilt.to_value().unwrap(), raw);
    }

    #[test]
    fn classify_all_keeps_record_order_and_others() {
        let snapshot: Snapshot = serde_json::from_value(json!({
            "documents": [
                {"state": {"id": "document:document", "typeName": "document"}},
                {"state": {"id": "shape:b", "typeName": "shape", "type": "link", "props": {"targetCanvasId": "room-B"}}},
                {"state": {"id": "instance:x", "typeName": "instance"}},
                {"state": {"id": "shape:a", "typeName": "shape", "type": "link", "props": {"targetCanvasId": "room-A2"}}}
            ]
        }))
        .unwrap();
        let room = classify_all(&snapshot);
        let targets: Vec<&str> = room.links.iter().map(|l| l.target_canvas_id.as_str()).collect();
        assert_eq!(targets, vec!["room-B", "room-A2"]);
        assert_eq!(room.others.len(), 1);
        assert_eq!(room.others[0].last_changed_clock, 3);
        assert!(room.document.is_some());
    }
}
