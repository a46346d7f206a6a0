use super::{block_shell, ContentType, PropertySchema, RenderContext, ResponseProperty, ValueKind};
use crate::vdom::VNode;
use flowdeck_editor::{ContentBlock, ContentKind, Formatting};
use serde_json::{json, Value};

/// Options to pick from; the body is the list of option labels
pub struct MultipleChoiceType;

impl MultipleChoiceType {
    fn options(block: &ContentBlock) -> Vec<String> {
        block
            .body
            .as_array()
            .map(|items| items.iter().map(label).collect())
            .unwrap_or_default()
    }

    fn selected(block: &ContentBlock, ctx: &RenderContext<'_>) -> Vec<String> {
        match ctx.response(block) {
            Some(Value::Array(items)) => items.iter().map(label).collect(),
            Some(Value::Object(map)) => map
                .get("selected")
                .and_then(Value::as_array)
                .map(|items| items.iter().map(label).collect())
                .unwrap_or_default(),
            Some(Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }
}

fn label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl ContentType for MultipleChoiceType {
    fn kind(&self) -> ContentKind {
        ContentKind::MultipleChoice
    }

    fn default_block(&self) -> ContentBlock {
        ContentBlock::new("Choice", ContentKind::MultipleChoice)
            .with_body(json!(["Option 1", "Option 2"]))
            .with_property("multiple", json!(false))
    }

    fn accepts_body(&self, body: &Value) -> bool {
        body.as_array().is_some_and(|items| items.iter().all(Value::is_string))
    }

    fn response_properties(&self) -> Vec<ResponseProperty> {
        vec![
            ResponseProperty::new("selected", ValueKind::Array, "Labels of the chosen options"),
            ResponseProperty::new("value", ValueKind::String, "First chosen label"),
        ]
    }

    fn properties_schema(&self) -> Vec<PropertySchema> {
        vec![PropertySchema::new("multiple", ValueKind::Boolean, json!(false))]
    }

    fn render(&self, block: &ContentBlock, formatting: Option<&Formatting>, ctx: &RenderContext<'_>) -> VNode {
        let multiple = block.properties.get("multiple").and_then(Value::as_bool).unwrap_or(false);
        let input_type = if multiple { "checkbox" } else { "radio" };
        let selected = Self::selected(block, ctx);

        let options = Self::options(block)
            .into_iter()
            .enumerate()
            .map(|(index, option)| {
                let input = VNode::element("input")
                    .with_attr("type", input_type)
                    .with_attr("name", block.name.clone())
                    .with_attr("value", option.clone());
                let input = if selected.contains(&option) {
                    input.with_attr("checked", "true")
                } else {
                    input
                };
                let input = if ctx.is_editing() {
                    input.with_attr("disabled", "true")
                } else {
                    input
                };

                VNode::element("label")
                    .with_key(index.to_string())
                    .with_child(input)
                    .with_child(VNode::text(option))
            })
            .collect();

        block_shell(block, formatting, ctx).with_children(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::ResponseRecord;

    #[test]
    fn test_selected_options_are_checked() {
        let block = ContentBlock::new("Q1", ContentKind::MultipleChoice).with_body(json!(["a", "b", "c"]));
        let mut responses = ResponseRecord::new();
        responses.insert("Q1".into(), json!({ "selected": ["b"] }));

        let node = MultipleChoiceType.render(&block, None, &RenderContext::preview(&responses));
        let checked: Vec<_> = node
            .children()
            .iter()
            .map(|option| option.children()[0].attr("checked").is_some())
            .collect();
        assert_eq!(checked, vec![false, true, false]);
        assert_eq!(node.children()[0].children()[0].attr("type"), Some("radio"));
    }

    #[test]
    fn test_body_must_be_labels() {
        assert!(MultipleChoiceType.accepts_body(&json!(["x"])));
        assert!(!MultipleChoiceType.accepts_body(&json!("x")));
        assert!(!MultipleChoiceType.accepts_body(&json!([1])));
    }
}
