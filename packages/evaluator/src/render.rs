//! Renders an effective step view into a VNode tree.
//!
//! One positioned cell per layout box, in layout order. A cell holds the
//! box's block rendered by its kind, with the block's formatting applied.

use crate::content::{RenderContext, Registry};
use crate::vdom::VNode;
use flowdeck_editor::{GridBox, StepDocument};
use tracing::{instrument, warn};

/// Render a whole step
#[instrument(skip_all, fields(boxes = view.layout.len(), mode = ?ctx.mode))]
pub fn render_step(view: &StepDocument, registry: &Registry, ctx: &RenderContext<'_>) -> VNode {
    let cells = view.layout.iter().map(|grid_box| render_cell(view, grid_box, registry, ctx)).collect();

    VNode::element("div")
        .with_attr("class", "step")
        .with_style("display", "grid")
        .with_style("grid-template-columns", "repeat(12, 1fr)")
        .with_children(cells)
}

fn render_cell(view: &StepDocument, grid_box: &GridBox, registry: &Registry, ctx: &RenderContext<'_>) -> VNode {
    let cell = VNode::element("div")
        .with_key(grid_box.id.clone())
        .with_attr("class", "cell")
        .with_attr("data-box", grid_box.id.clone())
        .with_style("grid-column", format!("{} / span {}", grid_box.x + 1, grid_box.w.max(1)))
        .with_style("grid-row", format!("{} / span {}", grid_box.y + 1, grid_box.h.max(1)));

    let Some(block) = view.block(&grid_box.id) else {
        return if ctx.is_editing() {
            cell.with_child(
                VNode::element("div")
                    .with_attr("class", "empty")
                    .with_child(VNode::text("Empty box")),
            )
        } else {
            cell
        };
    };

    let Some(content_type) = registry.get(block.kind) else {
        warn!(kind = block.kind.as_str(), box_id = %grid_box.id, "No content type registered");
        return cell.with_child(VNode::error(format!("Unsupported content: {}", block.kind.as_str())));
    };

    cell.with_child(content_type.render(block, view.formatting(&block.name), ctx))
}
