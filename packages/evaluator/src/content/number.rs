use super::{block_shell, ContentType, PropertySchema, RenderContext, ResponseProperty, ValueKind};
use crate::vdom::VNode;
use flowdeck_editor::{ContentBlock, ContentKind, Formatting};
use serde_json::{json, Value};

/// Numeric answer box; the body is the prompt shown as placeholder
pub struct NumberInputType;

impl ContentType for NumberInputType {
    fn kind(&self) -> ContentKind {
        ContentKind::NumberInput
    }

    fn accepts_body(&self, body: &Value) -> bool {
        body.is_string() || body.is_null()
    }

    fn response_properties(&self) -> Vec<ResponseProperty> {
        vec![ResponseProperty::new("value", ValueKind::Number, "Number the learner entered")]
    }

    fn properties_schema(&self) -> Vec<PropertySchema> {
        vec![
            PropertySchema::new("min", ValueKind::Number, Value::Null),
            PropertySchema::new("max", ValueKind::Number, Value::Null),
            PropertySchema::new("step", ValueKind::Number, json!(1)),
        ]
    }

    fn render(&self, block: &ContentBlock, formatting: Option<&Formatting>, ctx: &RenderContext<'_>) -> VNode {
        let mut input = VNode::element("input")
            .with_attr("type", "number")
            .with_attr("name", block.name.clone());

        for key in ["min", "max", "step"] {
            if let Some(n) = block.properties.get(key).and_then(Value::as_f64) {
                input = input.with_attr(key, n.to_string());
            }
        }
        if let Some(prompt) = block.body.as_str() {
            input = input.with_attr("placeholder", prompt);
        }

        let current = match ctx.response(block) {
            Some(Value::Object(map)) => map.get("value").cloned(),
            other => other.cloned(),
        };
        if let Some(value) = current.filter(|v| !v.is_null()) {
            let shown = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            input = input.with_attr("value", shown);
        }
        if ctx.is_editing() {
            input = input.with_attr("disabled", "true");
        }

        block_shell(block, formatting, ctx).with_child(input)
    }
}
