use super::{block_shell, ContentType, RenderContext};
use crate::vdom::VNode;
use flowdeck_editor::{ContentBlock, ContentKind, Formatting};
use serde_json::Value;

/// Rich text; the body is an HTML string or a delta (`{ "ops": [{ "insert": .. }] }`)
pub struct TextType;

impl ContentType for TextType {
    fn kind(&self) -> ContentKind {
        ContentKind::Text
    }

    fn default_block(&self) -> ContentBlock {
        ContentBlock::new("Text", ContentKind::Text).with_body(Value::String(String::new()))
    }

    fn accepts_body(&self, body: &Value) -> bool {
        body.is_string() || body.get("ops").is_some_and(Value::is_array) || body.is_null()
    }

    fn render(&self, block: &ContentBlock, formatting: Option<&Formatting>, ctx: &RenderContext<'_>) -> VNode {
        let shell = block_shell(block, formatting, ctx);
        let paragraph = VNode::element("div")
            .with_attr("class", "rich-text")
            .with_child(VNode::text(plain_text(&block.body)));

        if ctx.is_editing() {
            shell.with_child(paragraph.with_attr("contenteditable", "true"))
        } else {
            shell.with_child(paragraph)
        }
    }
}

/// Visible text of a rich-text body
pub fn plain_text(body: &Value) -> String {
    match body {
        Value::String(html) => strip_tags(html),
        Value::Object(_) => body
            .get("ops")
            .and_then(Value::as_array)
            .map(|ops| {
                ops.iter()
                    .filter_map(|op| op.get("insert").and_then(Value::as_str))
                    .collect::<String>()
            })
            .unwrap_or_default(),
        _ => String::new(),
    }
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}
