//! # Content Types
//!
//! Every block carries an exact [`ContentKind`], fixed when it is created.
//! The [`Registry`] maps each kind to its [`ContentType`]: how it renders,
//! how raw editor input becomes an edit intent, and what it declares about
//! learner responses and configurable properties.
//!
//! `render` and `edit` are pure functions of the block, its formatting and
//! the context. Edits are never applied here; they come back as
//! [`EditIntent`]s for the caller to route.

mod button;
mod choice;
mod media;
mod number;
mod text;

pub use button::ButtonType;
pub use choice::MultipleChoiceType;
pub use media::{encode_query, widget_url, EmbedType, ImageType};
pub use number::NumberInputType;
pub use text::TextType;

use crate::response::ResponseRecord;
use crate::vdom::VNode;
use flowdeck_editor::{BoxId, ContentBlock, ContentKind, EditIntent, Formatting};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// Whether a step is being authored or taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RenderMode {
    Edit,
    #[default]
    Preview,
}

/// What a renderer may look at besides the block itself
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub mode: RenderMode,
    pub responses: &'a ResponseRecord,
}

impl<'a> RenderContext<'a> {
    pub fn edit(responses: &'a ResponseRecord) -> Self {
        Self {
            mode: RenderMode::Edit,
            responses,
        }
    }

    pub fn preview(responses: &'a ResponseRecord) -> Self {
        Self {
            mode: RenderMode::Preview,
            responses,
        }
    }

    pub fn is_editing(&self) -> bool {
        self.mode == RenderMode::Edit
    }

    /// The learner's current answer for a block
    pub fn response(&self, block: &ContentBlock) -> Option<&'a Value> {
        self.responses.get(&block.name)
    }
}

/// Raw input from an authoring widget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EditorInput {
    SetBody { body: Value },
    SetProperty { key: String, value: Value },
    Rename { name: String },
    SetFormatting { property: String, value: Option<Value> },
}

/// Shape of one field of the response a kind produces (documentation only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseProperty {
    pub name: String,
    pub kind: ValueKind,
    pub description: String,
}

impl ResponseProperty {
    pub fn new(name: &str, kind: ValueKind, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            description: description.to_string(),
        }
    }
}

/// One configurable property of a kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    pub key: String,
    pub kind: ValueKind,
    #[serde(default)]
    pub default: Value,
}

impl PropertySchema {
    pub fn new(key: &str, kind: ValueKind, default: Value) -> Self {
        Self {
            key: key.to_string(),
            kind,
            default,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueKind {
    String,
    Number,
    Boolean,
    Array,
    Url,
}

impl ValueKind {
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ValueKind::String | ValueKind::Url => value.is_string(),
            ValueKind::Number => value.is_number(),
            ValueKind::Boolean => value.is_boolean(),
            ValueKind::Array => value.is_array(),
        }
    }
}

/// Behavior of one content kind
pub trait ContentType: Send + Sync {
    fn kind(&self) -> ContentKind;

    /// Block a new box of this kind starts with
    fn default_block(&self) -> ContentBlock {
        let mut block = ContentBlock::new(self.kind().as_str(), self.kind());
        for schema in self.properties_schema() {
            block.properties.insert(schema.key, schema.default);
        }
        block
    }

    fn render(&self, block: &ContentBlock, formatting: Option<&Formatting>, ctx: &RenderContext<'_>) -> VNode;

    /// Whether `body` is acceptable for this kind
    fn accepts_body(&self, _body: &Value) -> bool {
        true
    }

    fn response_properties(&self) -> Vec<ResponseProperty> {
        Vec::new()
    }

    fn properties_schema(&self) -> Vec<PropertySchema> {
        Vec::new()
    }

    /// Key/value pairs pushed into an embedded widget's query string
    fn query_params(&self, _block: &ContentBlock) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Translate editor input into an intent for the router
    fn edit(&self, box_id: &BoxId, block: &ContentBlock, input: EditorInput) -> Option<EditIntent> {
        match input {
            EditorInput::SetBody { body } => {
                if !self.accepts_body(&body) {
                    debug!(kind = self.kind().as_str(), "Rejecting body of the wrong shape");
                    return None;
                }
                Some(EditIntent::edit_content(box_id.clone(), single_field("body", body)))
            }

            EditorInput::SetProperty { key, value } => {
                let schema = self.properties_schema();
                let accepted = schema.iter().any(|s| s.key == key && s.kind.accepts(&value));
                if !accepted {
                    debug!(kind = self.kind().as_str(), key = %key, "Rejecting unknown or mistyped property");
                    return None;
                }
                // properties merge as one field, so send the whole map
                let mut properties = block.properties.clone();
                properties.insert(key, value);
                Some(EditIntent::edit_content(
                    box_id.clone(),
                    single_field("properties", Value::Object(properties)),
                ))
            }

            EditorInput::Rename { name } => {
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                Some(EditIntent::edit_content(
                    box_id.clone(),
                    single_field("name", Value::String(name.to_string())),
                ))
            }

            EditorInput::SetFormatting { property, value } => Some(EditIntent::ChangeFormatting {
                name: block.name.clone(),
                property,
                value,
            }),
        }
    }
}

fn single_field(key: &str, value: Value) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    map
}

/// Kind → behavior, resolved by exact kind
pub struct Registry {
    types: BTreeMap<ContentKind, Box<dyn ContentType>>,
}

impl Registry {
    pub fn empty() -> Self {
        Self { types: BTreeMap::new() }
    }

    /// Registry with every built-in kind
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(TextType);
        registry.register(ImageType);
        registry.register(MultipleChoiceType);
        registry.register(NumberInputType);
        registry.register(ButtonType);
        registry.register(EmbedType);
        registry
    }

    pub fn register(&mut self, content_type: impl ContentType + 'static) {
        self.types.insert(content_type.kind(), Box::new(content_type));
    }

    pub fn get(&self, kind: ContentKind) -> Option<&dyn ContentType> {
        self.types.get(&kind).map(|t| t.as_ref())
    }

    pub fn default_block(&self, kind: ContentKind) -> Option<ContentBlock> {
        self.get(kind).map(|t| t.default_block())
    }

    pub fn kinds(&self) -> impl Iterator<Item = ContentKind> + '_ {
        self.types.keys().copied()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::standard()
    }
}

/// Apply a formatting record as styles (`fontSize: 18` → `font-size: 18px`)
pub fn formatting_styles(formatting: Option<&Formatting>) -> Vec<(String, String)> {
    let Some(formatting) = formatting else {
        return Vec::new();
    };

    formatting
        .iter()
        .filter_map(|(property, value)| {
            let css = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) if takes_length(property) => format!("{n}px"),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((kebab_case(property), css))
        })
        .collect()
}

fn takes_length(property: &str) -> bool {
    let lower = property.to_ascii_lowercase();
    ["size", "width", "height", "margin", "padding", "radius", "gap"]
        .iter()
        .any(|suffix| lower.ends_with(suffix))
}

fn kebab_case(property: &str) -> String {
    let mut out = String::with_capacity(property.len() + 4);
    for c in property.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Shared wrapper every kind renders into
pub(crate) fn block_shell(block: &ContentBlock, formatting: Option<&Formatting>, ctx: &RenderContext<'_>) -> VNode {
    let node = VNode::element("div")
        .with_attr("class", format!("block block-{}", block.kind.as_str().to_ascii_lowercase()))
        .with_attr("data-block", block.name.clone())
        .with_styles(formatting_styles(formatting));

    if ctx.is_editing() {
        node.with_attr("data-editable", "true")
    } else {
        node
    }
}

/// String view of a property, or empty
pub(crate) fn property_str<'b>(block: &'b ContentBlock, key: &str) -> &'b str {
    block.properties.get(key).and_then(Value::as_str).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_standard_registry_covers_every_kind() {
        let registry = Registry::standard();
        for kind in ContentKind::ALL {
            let content_type = registry.get(kind).unwrap();
            assert_eq!(content_type.kind(), kind);
            assert_eq!(registry.default_block(kind).unwrap().kind, kind);
        }
    }

    #[test]
    fn test_formatting_styles() {
        let mut formatting = Formatting::new();
        formatting.insert("fontSize".into(), json!(18));
        formatting.insert("color".into(), json!("red"));
        formatting.insert("fontWeight".into(), json!(700));
        formatting.insert("nested".into(), json!({ "a": 1 }));

        let styles = formatting_styles(Some(&formatting));
        assert!(styles.contains(&("font-size".into(), "18px".into())));
        assert!(styles.contains(&("color".into(), "red".into())));
        assert!(styles.contains(&("font-weight".into(), "700".into())));
        assert_eq!(styles.len(), 3);
    }

    #[test]
    fn test_edit_translates_input() {
        let registry = Registry::standard();
        let text = registry.get(ContentKind::Text).unwrap();
        let block = ContentBlock::new("Q1", ContentKind::Text);
        let box_id: BoxId = "a".into();

        let intent = text
            .edit(&box_id, &block, EditorInput::SetBody { body: json!("<p>x</p>") })
            .unwrap();
        assert_eq!(
            intent,
            EditIntent::edit_content("a", json!({ "body": "<p>x</p>" }).as_object().cloned().unwrap())
        );

        let intent = text
            .edit(
                &box_id,
                &block,
                EditorInput::SetFormatting {
                    property: "fontSize".into(),
                    value: Some(json!(12)),
                },
            )
            .unwrap();
        assert_eq!(intent, EditIntent::set_formatting("Q1", "fontSize", json!(12)));

        assert!(text
            .edit(&box_id, &block, EditorInput::Rename { name: "  ".into() })
            .is_none());
    }

    #[test]
    fn test_property_edits_are_schema_checked() {
        let registry = Registry::standard();
        let number = registry.get(ContentKind::NumberInput).unwrap();
        let block = number.default_block();
        let box_id: BoxId = "n".into();

        let ok = number.edit(
            &box_id,
            &block,
            EditorInput::SetProperty {
                key: "max".into(),
                value: json!(10),
            },
        );
        let Some(EditIntent::AddOrEditContent { value, .. }) = ok else {
            panic!("expected a content edit");
        };
        assert_eq!(value["properties"]["max"], json!(10));
        // the rest of the properties ride along
        assert!(value["properties"].get("min").is_some());

        let unknown = number.edit(
            &box_id,
            &block,
            EditorInput::SetProperty {
                key: "colour".into(),
                value: json!(1),
            },
        );
        let mistyped = number.edit(
            &box_id,
            &block,
            EditorInput::SetProperty {
                key: "max".into(),
                value: json!("ten"),
            },
        );
        assert!(unknown.is_none());
        assert!(mistyped.is_none());
    }
}
