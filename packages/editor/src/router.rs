//! # Edit Routing
//!
//! Applies an [`EditIntent`] to exactly one layer: the base document, or the
//! overlay of the active context.
//!
//! Overlay edits are classified against the *parent* view (everything below
//! the active layer). Callers must resolve that view immediately before
//! routing, never reuse one cached from an earlier render, or an id added in
//! a sibling context could be misclassified.

use crate::document::{serialize_layout, BoxId, ContentBlock, GridBox, StepDocument};
use crate::mutations::{EditIntent, LayerMutation, NoopReason};
use crate::overlay::{ChangeOp, OpKind, Overlay, Prop};
use crate::resolver::apply_overlay;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Layer an edit is routed into
pub enum LayerTarget<'a> {
    /// Mutate the base document directly
    Base(&'a mut StepDocument),

    /// Record the edit in an overlay sitting on top of `parent`
    Overlay {
        overlay: &'a mut Overlay,
        parent: &'a StepDocument,
    },
}

/// Route one edit into its target layer
pub fn apply_edit(intent: &EditIntent, target: LayerTarget<'_>) -> LayerMutation {
    let mutation = match (intent, target) {
        (EditIntent::AddOrEditContent { id, value }, LayerTarget::Base(doc)) => base_edit_content(doc, id, value),
        (EditIntent::AddOrEditContent { id, value }, LayerTarget::Overlay { overlay, parent }) => {
            overlay_edit_content(overlay, parent, id, value)
        }

        (EditIntent::RemoveContent { id }, LayerTarget::Base(doc)) => base_remove_content(doc, id),
        (EditIntent::RemoveContent { id }, LayerTarget::Overlay { overlay, parent }) => {
            overlay_remove_content(overlay, parent, id)
        }

        (EditIntent::ChangeFormatting { name, property, value }, LayerTarget::Base(doc)) => {
            base_change_formatting(doc, name, property, value.clone())
        }
        (EditIntent::ChangeFormatting { name, property, value }, LayerTarget::Overlay { overlay, parent }) => {
            overlay_change_formatting(overlay, parent, name, property, value.clone())
        }

        (EditIntent::ReplaceLayout { layout }, LayerTarget::Base(doc)) => base_replace_layout(doc, layout),
        (EditIntent::ReplaceLayout { layout }, LayerTarget::Overlay { overlay, parent }) => {
            overlay_replace_layout(overlay, parent, layout)
        }
    };

    debug!(prop = ?intent.prop(), result = ?mutation, "Routed edit");
    mutation
}

fn effective_of(parent: &StepDocument, overlay: &Overlay) -> StepDocument {
    let mut view = parent.clone();
    apply_overlay(&mut view, overlay);
    view
}

// Content

fn base_edit_content(doc: &mut StepDocument, id: &BoxId, value: &Map<String, Value>) -> LayerMutation {
    let next = match doc.layout_content.get(id) {
        Some(current) if current.matches_partial(value) => return LayerMutation::Noop(NoopReason::Unchanged),
        Some(current) => current.merged(value),
        None if doc.has_box(id) => ContentBlock::from_partial(value),
        None => return LayerMutation::Noop(NoopReason::MissingTarget),
    };

    match next {
        Ok(block) => {
            doc.layout_content.insert(id.clone(), block);
            LayerMutation::Base {
                touched: vec![Prop::LayoutContent],
            }
        }
        Err(e) => {
            warn!(box_id = %id, error = %e, "Dropping content edit that does not form a block");
            LayerMutation::Noop(NoopReason::Malformed)
        }
    }
}

fn overlay_edit_content(
    overlay: &mut Overlay,
    parent: &StepDocument,
    id: &BoxId,
    value: &Map<String, Value>,
) -> LayerMutation {
    let effective = effective_of(parent, overlay);

    let candidate = match effective.block(id) {
        Some(current) if current.matches_partial(value) => return LayerMutation::Noop(NoopReason::Unchanged),
        Some(current) => current.merged(value),
        None if effective.has_box(id) => ContentBlock::from_partial(value),
        None => return LayerMutation::Noop(NoopReason::MissingTarget),
    };
    if let Err(e) = candidate {
        warn!(box_id = %id, error = %e, "Dropping content edit that does not form a block");
        return LayerMutation::Noop(NoopReason::Malformed);
    }

    // Coalesce into the layer's own record
    if let Some(index) = overlay.find_content(id) {
        if let Some(Value::Object(existing)) = overlay.get_mut(index).map(|op| &mut op.value) {
            for (key, field) in value {
                existing.insert(key.clone(), field.clone());
            }
            return LayerMutation::Coalesced {
                prop: Prop::LayoutContent,
            };
        }
        warn!(box_id = %id, "Replacing content record whose value is not an object");
        overlay.remove(index);
    }

    // Re-adding after a removal in this same layer revives the parent's block
    if let Some(index) = overlay.find_content_tombstone(id) {
        overlay.remove(index);
    }

    let op = if parent.block(id).is_some() {
        OpKind::Edit
    } else {
        OpKind::Add
    };
    overlay.push(ChangeOp::content(op, id.clone(), value.clone()));

    LayerMutation::Appended {
        prop: Prop::LayoutContent,
        op,
    }
}

fn base_remove_content(doc: &mut StepDocument, id: &BoxId) -> LayerMutation {
    let Some(block) = doc.layout_content.remove(id) else {
        return LayerMutation::Noop(NoopReason::MissingTarget);
    };

    let mut touched = vec![Prop::LayoutContent];
    if doc.content_formatting.remove(&block.name).is_some() {
        touched.push(Prop::ContentFormatting);
    }

    LayerMutation::Base { touched }
}

fn overlay_remove_content(overlay: &mut Overlay, parent: &StepDocument, id: &BoxId) -> LayerMutation {
    let own = overlay.find_content(id).map(|index| overlay.remove(index));

    if parent.block(id).is_some() {
        if own.is_none() && overlay.find_content_tombstone(id).is_some() {
            return LayerMutation::Noop(NoopReason::AlreadyRemoved);
        }
        overlay.push(ChangeOp::remove_content(id.clone()));
        return LayerMutation::Tombstoned {
            prop: Prop::LayoutContent,
            replaced: own.is_some(),
        };
    }

    match own {
        Some(record) => {
            // The block only ever existed in this layer; so did its formatting
            let cascaded = record
                .block_name()
                .map(|name| overlay.drop_formatting_for(name))
                .unwrap_or(0);
            LayerMutation::RolledBack {
                prop: Prop::LayoutContent,
                cascaded,
            }
        }
        None => LayerMutation::Noop(NoopReason::MissingTarget),
    }
}

// Formatting

fn base_change_formatting(doc: &mut StepDocument, name: &str, property: &str, value: Option<Value>) -> LayerMutation {
    if doc.block_by_name(name).is_none() {
        return LayerMutation::Noop(NoopReason::MissingTarget);
    }

    if doc.set_formatting_value(name, property, value) {
        LayerMutation::Base {
            touched: vec![Prop::ContentFormatting],
        }
    } else {
        LayerMutation::Noop(NoopReason::Unchanged)
    }
}

fn overlay_change_formatting(
    overlay: &mut Overlay,
    parent: &StepDocument,
    name: &str,
    property: &str,
    value: Option<Value>,
) -> LayerMutation {
    let effective = effective_of(parent, overlay);
    if effective.block_by_name(name).is_none() {
        return LayerMutation::Noop(NoopReason::MissingTarget);
    }

    let current = effective.formatting_value(name, property);
    let existing = overlay.find_formatting(name, property);

    match value {
        Some(value) => {
            if current == Some(&value) {
                return LayerMutation::Noop(NoopReason::Unchanged);
            }
            let record = ChangeOp::formatting(name, property, Some(value));
            match existing.and_then(|index| overlay.get_mut(index)) {
                Some(op) => {
                    *op = record;
                    LayerMutation::Coalesced {
                        prop: Prop::ContentFormatting,
                    }
                }
                None => {
                    overlay.push(record);
                    LayerMutation::Appended {
                        prop: Prop::ContentFormatting,
                        op: OpKind::Change,
                    }
                }
            }
        }
        None => {
            if current.is_none() {
                return LayerMutation::Noop(NoopReason::AlreadyRemoved);
            }
            let in_parent = parent.formatting_value(name, property).is_some();

            match existing {
                Some(index) if !in_parent => {
                    overlay.remove(index);
                    LayerMutation::RolledBack {
                        prop: Prop::ContentFormatting,
                        cascaded: 0,
                    }
                }
                Some(index) => {
                    if let Some(op) = overlay.get_mut(index) {
                        *op = ChangeOp::formatting(name, property, None);
                    }
                    LayerMutation::Tombstoned {
                        prop: Prop::ContentFormatting,
                        replaced: true,
                    }
                }
                None => {
                    overlay.push(ChangeOp::formatting(name, property, None));
                    LayerMutation::Tombstoned {
                        prop: Prop::ContentFormatting,
                        replaced: false,
                    }
                }
            }
        }
    }
}

// Layout

fn same_layout(a: &[GridBox], b: &[GridBox]) -> bool {
    serialize_layout(a) == serialize_layout(b)
}

fn base_replace_layout(doc: &mut StepDocument, layout: &[GridBox]) -> LayerMutation {
    if same_layout(&doc.layout, layout) {
        return LayerMutation::Noop(NoopReason::Unchanged);
    }

    doc.layout = layout.to_vec();
    LayerMutation::Base {
        touched: vec![Prop::Layout],
    }
}

fn overlay_replace_layout(overlay: &mut Overlay, parent: &StepDocument, layout: &[GridBox]) -> LayerMutation {
    let effective = effective_of(parent, overlay);
    if same_layout(&effective.layout, layout) {
        return LayerMutation::Noop(NoopReason::Unchanged);
    }

    let record = ChangeOp::layout(layout);
    match overlay.find_layout().and_then(|index| overlay.get_mut(index)) {
        Some(op) => {
            *op = record;
            LayerMutation::Coalesced { prop: Prop::Layout }
        }
        None => {
            overlay.push(record);
            LayerMutation::Appended {
                prop: Prop::Layout,
                op: OpKind::Change,
            }
        }
    }
}
