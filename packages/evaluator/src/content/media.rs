use super::{block_shell, property_str, ContentType, PropertySchema, RenderContext, ValueKind};
use crate::vdom::VNode;
use flowdeck_editor::{ContentBlock, ContentKind, Formatting};
use serde_json::{json, Value};
use url::{form_urlencoded, Url};

/// Static image
pub struct ImageType;

impl ContentType for ImageType {
    fn kind(&self) -> ContentKind {
        ContentKind::Image
    }

    fn properties_schema(&self) -> Vec<PropertySchema> {
        vec![
            PropertySchema::new("src", ValueKind::Url, json!("")),
            PropertySchema::new("alt", ValueKind::String, json!("")),
        ]
    }

    fn render(&self, block: &ContentBlock, formatting: Option<&Formatting>, ctx: &RenderContext<'_>) -> VNode {
        let src = property_str(block, "src");
        let shell = block_shell(block, formatting, ctx);

        if src.is_empty() {
            return if ctx.is_editing() {
                shell.with_child(
                    VNode::element("div")
                        .with_attr("class", "placeholder")
                        .with_child(VNode::text("Choose an image")),
                )
            } else {
                shell
            };
        }

        shell.with_child(
            VNode::element("img")
                .with_attr("src", src)
                .with_attr("alt", property_str(block, "alt")),
        )
    }
}

/// Embedded interactive widget configured through its query string
pub struct EmbedType;

/// Properties that configure the frame itself rather than the widget
const FRAME_PROPERTIES: [&str; 2] = ["url", "height"];

impl ContentType for EmbedType {
    fn kind(&self) -> ContentKind {
        ContentKind::Embed
    }

    fn properties_schema(&self) -> Vec<PropertySchema> {
        vec![
            PropertySchema::new("url", ValueKind::Url, json!("")),
            PropertySchema::new("height", ValueKind::Number, json!(400)),
            PropertySchema::new("params", ValueKind::Array, json!([])),
        ]
    }

    /// `params` entries (`{ "key": .., "value": .. }`) first, then any other loose property
    fn query_params(&self, block: &ContentBlock) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = block
            .properties
            .get("params")
            .and_then(Value::as_array)
            .map(|params| {
                params
                    .iter()
                    .filter_map(|param| {
                        let key = param.get("key").and_then(Value::as_str)?;
                        let value = param.get("value").and_then(query_value)?;
                        Some((key.to_string(), value))
                    })
                    .collect()
            })
            .unwrap_or_default();

        pairs.extend(
            block
                .properties
                .iter()
                .filter(|(key, _)| !FRAME_PROPERTIES.contains(&key.as_str()) && key.as_str() != "params")
                .filter_map(|(key, value)| query_value(value).map(|v| (key.clone(), v))),
        );
        pairs
    }

    fn render(&self, block: &ContentBlock, formatting: Option<&Formatting>, ctx: &RenderContext<'_>) -> VNode {
        let shell = block_shell(block, formatting, ctx);
        let base = property_str(block, "url");
        if base.is_empty() {
            return shell;
        }

        let src = match widget_url(base, &self.query_params(block)) {
            Ok(url) => url,
            Err(e) => return shell.with_child(VNode::error(format!("Invalid embed url: {e}"))),
        };

        let height = block.properties.get("height").and_then(Value::as_f64).unwrap_or(400.0);
        shell.with_child(
            VNode::element("iframe")
                .with_attr("src", src)
                .with_style("height", format!("{height}px")),
        )
    }
}

fn query_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Form-urlencode key/value pairs
pub fn encode_query(params: &[(String, String)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .finish()
}

/// Widget URL with `params` appended to any query it already carries
pub fn widget_url(base: &str, params: &[(String, String)]) -> Result<String, url::ParseError> {
    let mut url = Url::parse(base)?;
    if !params.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::ResponseRecord;

    fn embed() -> ContentBlock {
        EmbedType
            .default_block()
            .with_property("url", json!("https://widgets.example/graph?theme=dark"))
            .with_property("params", json!([{ "key": "a", "value": 2 }, { "key": "label", "value": "x y" }]))
    }

    #[test]
    fn test_query_params_skip_frame_properties() {
        let params = EmbedType.query_params(&embed());
        assert_eq!(
            params,
            vec![("a".to_string(), "2".to_string()), ("label".to_string(), "x y".to_string())]
        );
        assert_eq!(encode_query(&params), "a=2&label=x+y");
    }

    #[test]
    fn test_iframe_src_keeps_existing_query() {
        let node = EmbedType.render(&embed(), None, &RenderContext::preview(&ResponseRecord::new()));
        let frame = &node.children()[0];
        assert_eq!(
            frame.attr("src"),
            Some("https://widgets.example/graph?theme=dark&a=2&label=x+y")
        );
        assert_eq!(frame.style("height"), Some("400px"));
    }

    #[test]
    fn test_bad_url_renders_inline_error() {
        let block = EmbedType.default_block().with_property("url", json!("not a url"));
        let node = EmbedType.render(&block, None, &RenderContext::preview(&ResponseRecord::new()));
        assert!(node.children()[0].is_error());
    }

    #[test]
    fn test_empty_image_shows_placeholder_only_while_editing() {
        let block = ImageType.default_block();
        let responses = ResponseRecord::new();
        assert_eq!(
            ImageType.render(&block, None, &RenderContext::edit(&responses)).children().len(),
            1
        );
        assert!(ImageType
            .render(&block, None, &RenderContext::preview(&responses))
            .children()
            .is_empty());
    }
}
