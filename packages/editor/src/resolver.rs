//! # Overlay Resolution
//!
//! Applies overlays onto a base (or previously resolved) view to produce the
//! effective view a renderer sees. Resolution is pure: it never touches its
//! inputs and recomputes in full on every call.
//!
//! Malformed records are skipped with a warning so an inconsistent overlay can
//! never take down the rendering path.

use crate::document::{parse_layout, ContentBlock, StepDocument};
use crate::overlay::{ChangeOp, OpKind, Overlay, Prop};
use std::sync::Arc;
use tracing::warn;

/// Resolve one overlay on top of `view`.
///
/// An empty overlay hands back the same `Arc`, so callers can skip
/// re-rendering with `Arc::ptr_eq`.
pub fn resolve(view: &Arc<StepDocument>, overlay: &Overlay) -> Arc<StepDocument> {
    if overlay.is_empty() {
        return Arc::clone(view);
    }

    let mut doc = StepDocument::clone(view);
    apply_overlay(&mut doc, overlay);
    Arc::new(doc)
}

/// Resolve layers in precedence order (base → experiment → event)
pub fn resolve_layers<'a>(
    base: &Arc<StepDocument>,
    layers: impl IntoIterator<Item = Option<&'a Overlay>>,
) -> Arc<StepDocument> {
    layers
        .into_iter()
        .flatten()
        .fold(Arc::clone(base), |view, overlay| resolve(&view, overlay))
}

/// Apply every record of `overlay` onto `doc` in list order
pub fn apply_overlay(doc: &mut StepDocument, overlay: &Overlay) {
    for op in overlay.ops() {
        apply_op(doc, op);
    }
}

fn apply_op(doc: &mut StepDocument, op: &ChangeOp) {
    match op.prop {
        Prop::Layout => apply_layout(doc, op),
        Prop::LayoutContent => apply_layout_content(doc, op),
        Prop::ContentFormatting => apply_content_formatting(doc, op),
    }
}

fn apply_layout(doc: &mut StepDocument, op: &ChangeOp) {
    if op.op != OpKind::Change {
        warn!(op = ?op.op, "Skipping layout record that is not a change");
        return;
    }

    match parse_layout(&op.value) {
        Ok(layout) => doc.layout = layout,
        Err(e) => warn!(error = %e, "Skipping layout record with unreadable value"),
    }
}

fn apply_layout_content(doc: &mut StepDocument, op: &ChangeOp) {
    let Some(box_id) = op.id.as_deref() else {
        warn!(op = ?op.op, "Skipping content record without a box id");
        return;
    };

    if op.op == OpKind::Remove {
        doc.layout_content.remove(box_id);
        return;
    }

    let Some(partial) = op.value.as_object() else {
        warn!(box_id = %box_id, "Skipping content record whose value is not an object");
        return;
    };

    let merged = match doc.layout_content.get(box_id) {
        Some(existing) => existing.merged(partial),
        None => ContentBlock::from_partial(partial),
    };

    match merged {
        Ok(block) => {
            doc.layout_content.insert(box_id.to_string(), block);
        }
        Err(e) => warn!(box_id = %box_id, error = %e, "Skipping malformed content record"),
    }
}

fn apply_content_formatting(doc: &mut StepDocument, op: &ChangeOp) {
    let (Some(name), Some(property)) = (op.id.as_deref(), op.formatting_property()) else {
        warn!(op = ?op.op, "Skipping formatting record without block name or property");
        return;
    };

    let value = match op.op {
        OpKind::Remove => None,
        _ => Some(op.value.get("value").cloned().unwrap_or_default()),
    };
    doc.set_formatting_value(name, property, value);
}
