//! # Step Document
//!
//! The unconditioned content of one step of a flow.
//!
//! A step is a grid of boxes. Each box may hold one content block, joined by
//! the box id, and each block may carry formatting keyed by the block's name:
//!
//! ```text
//! layout:            [Box a (0,0 6x2), Box b (6,0 6x2)]
//! layoutContent:     { a: Block "Q1" (Text), b: Block "Q2" (MultipleChoice) }
//! contentFormatting: { Q1: { fontSize: 18 } }
//! ```
//!
//! Effective views produced by the resolver use the same type.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Stable id of a grid box, the join key into `layout_content`
pub type BoxId = String;

/// Step-unique block name, also the learner-response variable name
pub type BlockName = String;

/// Free-form style attributes keyed by property name
pub type Formatting = BTreeMap<String, Value>;

/// Grid cell geometry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridBox {
    pub id: BoxId,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl GridBox {
    pub fn new(id: impl Into<BoxId>, x: u32, y: u32, w: u32, h: u32) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            w,
            h,
        }
    }
}

/// Content type tag, fixed when a block is created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContentKind {
    #[default]
    Text,
    Image,
    MultipleChoice,
    NumberInput,
    Button,
    Embed,
}

impl ContentKind {
    pub const ALL: [ContentKind; 6] = [
        ContentKind::Text,
        ContentKind::Image,
        ContentKind::MultipleChoice,
        ContentKind::NumberInput,
        ContentKind::Button,
        ContentKind::Embed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Text => "Text",
            ContentKind::Image => "Image",
            ContentKind::MultipleChoice => "MultipleChoice",
            ContentKind::NumberInput => "NumberInput",
            ContentKind::Button => "Button",
            ContentKind::Embed => "Embed",
        }
    }
}

/// One addressable unit of step content
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(default)]
    pub name: BlockName,

    #[serde(default)]
    pub kind: ContentKind,

    #[serde(default)]
    pub body: Value,

    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl ContentBlock {
    pub fn new(name: impl Into<BlockName>, kind: ContentKind) -> Self {
        Self {
            name: name.into(),
            kind,
            body: Value::Null,
            properties: Map::new(),
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Build a block from a partial value (missing fields take defaults)
    pub fn from_partial(partial: &Map<String, Value>) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(partial.clone()))
    }

    /// Shallow-merge a partial value on top of this block
    pub fn merged(&self, partial: &Map<String, Value>) -> Result<Self, serde_json::Error> {
        let mut fields = self.to_fields()?;
        for (key, value) in partial {
            fields.insert(key.clone(), value.clone());
        }
        serde_json::from_value(Value::Object(fields))
    }

    /// True when every key of `partial` already holds the same value
    pub fn matches_partial(&self, partial: &Map<String, Value>) -> bool {
        match self.to_fields() {
            Ok(fields) => partial.iter().all(|(key, value)| fields.get(key) == Some(value)),
            Err(_) => false,
        }
    }

    pub fn to_fields(&self) -> Result<Map<String, Value>, serde_json::Error> {
        match serde_json::to_value(self)? {
            Value::Object(fields) => Ok(fields),
            _ => Ok(Map::new()),
        }
    }
}

/// Base document of a step (also the shape of every effective view)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDocument {
    #[serde(default)]
    pub layout: Vec<GridBox>,

    #[serde(default)]
    pub layout_content: BTreeMap<BoxId, ContentBlock>,

    #[serde(default)]
    pub content_formatting: BTreeMap<BlockName, Formatting>,
}

impl StepDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_box(mut self, grid_box: GridBox) -> Self {
        self.layout.retain(|b| b.id != grid_box.id);
        self.layout.push(grid_box);
        self
    }

    pub fn with_block(mut self, box_id: impl Into<BoxId>, block: ContentBlock) -> Self {
        self.layout_content.insert(box_id.into(), block);
        self
    }

    pub fn with_formatting(mut self, name: impl Into<BlockName>, property: impl Into<String>, value: Value) -> Self {
        self.content_formatting
            .entry(name.into())
            .or_default()
            .insert(property.into(), value);
        self
    }

    pub fn has_box(&self, id: &str) -> bool {
        self.layout.iter().any(|b| b.id == id)
    }

    pub fn block(&self, id: &str) -> Option<&ContentBlock> {
        self.layout_content.get(id)
    }

    /// Find a block and its box by block name
    pub fn block_by_name(&self, name: &str) -> Option<(&BoxId, &ContentBlock)> {
        self.layout_content.iter().find(|(_, block)| block.name == name)
    }

    pub fn block_names(&self) -> BTreeSet<BlockName> {
        self.layout_content.values().map(|b| b.name.clone()).collect()
    }

    pub fn formatting(&self, name: &str) -> Option<&Formatting> {
        self.content_formatting.get(name)
    }

    pub fn formatting_value(&self, name: &str, property: &str) -> Option<&Value> {
        self.formatting(name).and_then(|f| f.get(property))
    }

    /// Set or clear one formatting property; empty records are dropped.
    /// Returns whether anything changed.
    pub fn set_formatting_value(&mut self, name: &str, property: &str, value: Option<Value>) -> bool {
        match value {
            Some(value) => {
                let record = self.content_formatting.entry(name.to_string()).or_default();
                if record.get(property) == Some(&value) {
                    return false;
                }
                record.insert(property.to_string(), value);
                true
            }
            None => {
                let Some(record) = self.content_formatting.get_mut(name) else {
                    return false;
                };
                let removed = record.remove(property).is_some();
                if record.is_empty() {
                    self.content_formatting.remove(name);
                }
                removed
            }
        }
    }
}

/// Serialize a layout the way it is persisted (one opaque string field)
pub fn serialize_layout(layout: &[GridBox]) -> String {
    serde_json::to_string(layout).unwrap_or_default()
}

/// Read a layout from either its serialized string form or a JSON array
pub fn parse_layout(value: &Value) -> Result<Vec<GridBox>, serde_json::Error> {
    match value {
        Value::String(serialized) => serde_json::from_str(serialized),
        other => serde_json::from_value(other.clone()),
    }
}

/// Serialize block contents the way they are persisted (one string field)
pub fn serialize_layout_content(content: &BTreeMap<BoxId, ContentBlock>) -> String {
    serde_json::to_string(content).unwrap_or_default()
}

pub fn parse_layout_content(value: &Value) -> Result<BTreeMap<BoxId, ContentBlock>, serde_json::Error> {
    match value {
        Value::String(serialized) => serde_json::from_str(serialized),
        other => serde_json::from_value(other.clone()),
    }
}

/// Make `desired` unique against `taken` by suffixing a counter
pub fn unique_name(desired: &str, taken: &BTreeSet<BlockName>, separator: &str) -> BlockName {
    if !taken.contains(desired) {
        return desired.to_string();
    }

    let mut counter = 1u32;
    loop {
        let candidate = format!("{}{}{}", desired, separator, counter);
        if !taken.contains(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn partial(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_block_merge_is_shallow() {
        let block = ContentBlock::new("Q1", ContentKind::Text)
            .with_body(json!({ "html": "<p>hi</p>" }))
            .with_property("placeholder", json!("type here"));

        let merged = block
            .merged(&partial(json!({ "name": "Q1b", "properties": { "rows": 3 } })))
            .unwrap();

        assert_eq!(merged.name, "Q1b");
        assert_eq!(merged.kind, ContentKind::Text);
        assert_eq!(merged.body, json!({ "html": "<p>hi</p>" }));
        // properties replaced wholesale, not deep-merged
        assert_eq!(merged.properties.len(), 1);
        assert_eq!(merged.properties["rows"], json!(3));
    }

    #[test]
    fn test_block_from_partial_fills_defaults() {
        let block = ContentBlock::from_partial(&partial(json!({ "name": "Img", "kind": "Image" }))).unwrap();
        assert_eq!(block.kind, ContentKind::Image);
        assert_eq!(block.body, Value::Null);
        assert!(block.properties.is_empty());
    }

    #[test]
    fn test_block_rejects_unknown_kind() {
        assert!(ContentBlock::from_partial(&partial(json!({ "kind": "Hologram" }))).is_err());
    }

    #[test]
    fn test_matches_partial() {
        let block = ContentBlock::new("Q1", ContentKind::Text).with_body(json!("<p>a</p>"));

        assert!(block.matches_partial(&partial(json!({ "body": "<p>a</p>" }))));
        assert!(block.matches_partial(&partial(json!({ "body": "<p>a</p>", "name": "Q1" }))));
        assert!(!block.matches_partial(&partial(json!({ "body": "<p>b</p>" }))));
    }

    #[test]
    fn test_formatting_record_dropped_when_empty() {
        let mut doc = StepDocument::new().with_formatting("Q1", "fontSize", json!(18));

        assert!(!doc.set_formatting_value("Q1", "fontSize", Some(json!(18))));
        assert!(doc.set_formatting_value("Q1", "fontSize", None));
        assert!(doc.formatting("Q1").is_none());
        assert!(!doc.set_formatting_value("Q1", "fontSize", None));
    }

    #[test]
    fn test_layout_serialization_forms() {
        let layout = vec![GridBox::new("a", 0, 0, 6, 2), GridBox::new("b", 6, 0, 6, 2)];
        let serialized = serialize_layout(&layout);

        assert_eq!(parse_layout(&Value::String(serialized)).unwrap(), layout);
        assert_eq!(parse_layout(&serde_json::to_value(&layout).unwrap()).unwrap(), layout);
        assert!(parse_layout(&json!("not a layout")).is_err());
    }

    #[test]
    fn test_document_field_names() {
        let doc = StepDocument::new()
            .with_box(GridBox::new("a", 0, 0, 1, 1))
            .with_block("a", ContentBlock::new("Q1", ContentKind::Text));
        let json = serde_json::to_value(&doc).unwrap();

        assert!(json.get("layoutContent").is_some());
        assert!(json.get("contentFormatting").is_some());
        assert_eq!(json["layoutContent"]["a"]["kind"], "Text");
    }

    #[test]
    fn test_unique_name_suffixes_counter() {
        let taken: BTreeSet<String> = ["Q1", "Q1_1", "Text"].iter().map(|s| s.to_string()).collect();

        assert_eq!(unique_name("Q2", &taken, "_"), "Q2");
        assert_eq!(unique_name("Q1", &taken, "_"), "Q1_2");
        assert_eq!(unique_name("Text", &taken, "-"), "Text-1");
    }

    #[test]
    fn test_block_lookup_by_name() {
        let doc = StepDocument::new()
            .with_block("a", ContentBlock::new("Q1", ContentKind::Text))
            .with_block("b", ContentBlock::new("Q2", ContentKind::NumberInput));

        let (box_id, block) = doc.block_by_name("Q2").unwrap();
        assert_eq!(box_id, "b");
        assert_eq!(block.kind, ContentKind::NumberInput);
        assert_eq!(doc.block_names().len(), 2);
    }
}
