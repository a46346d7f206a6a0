use super::{block_shell, ContentType, PropertySchema, RenderContext, ValueKind};
use crate::vdom::VNode;
use flowdeck_editor::{ContentBlock, ContentKind, Formatting};
use serde_json::{json, Value};

/// Clickable button; `event` names the event its click fires
pub struct ButtonType;

impl ContentType for ButtonType {
    fn kind(&self) -> ContentKind {
        ContentKind::Button
    }

    fn default_block(&self) -> ContentBlock {
        ContentBlock::new("Button", ContentKind::Button)
            .with_body(json!("Continue"))
            .with_property("event", json!(""))
    }

    fn accepts_body(&self, body: &Value) -> bool {
        body.is_string()
    }

    fn properties_schema(&self) -> Vec<PropertySchema> {
        vec![PropertySchema::new("event", ValueKind::String, json!(""))]
    }

    fn render(&self, block: &ContentBlock, formatting: Option<&Formatting>, ctx: &RenderContext<'_>) -> VNode {
        let mut button = VNode::element("button")
            .with_attr("type", "button")
            .with_child(VNode::text(block.body.as_str().unwrap_or_default()));

        match block.properties.get("event").and_then(Value::as_str) {
            Some(event) if !event.is_empty() => button = button.with_attr("data-event", event),
            _ => {}
        }

        block_shell(block, formatting, ctx).with_child(button)
    }
}
