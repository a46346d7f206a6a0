//! # Edit Intents
//!
//! High-level edits the UI emits, and what routing them did to a layer.
//!
//! ## Intent Semantics
//!
//! ### AddOrEditContent
//! - Shallow-merges a partial block into the box's content
//! - Coalesces into the layer's existing record for the box
//! - Dropped when every field already holds the incoming value
//!
//! ### RemoveContent
//! - Rolls back the layer's own record when the block never existed below it
//! - Otherwise leaves a `remove` tombstone
//! - On the base document, also drops the block's formatting
//!
//! ### ChangeFormatting
//! - Same coalesce/rollback rules, keyed by (block name, property)
//! - `value: None` removes the property
//!
//! ### ReplaceLayout
//! - The whole layout is written at once, never per-box diffs

use crate::document::{BlockName, BoxId, GridBox};
use crate::overlay::{OpKind, Prop};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Edit emitted by the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EditIntent {
    AddOrEditContent {
        id: BoxId,
        value: Map<String, Value>,
    },

    RemoveContent {
        id: BoxId,
    },

    ChangeFormatting {
        name: BlockName,
        property: String,
        #[serde(default)]
        value: Option<Value>,
    },

    ReplaceLayout {
        layout: Vec<GridBox>,
    },
}

impl EditIntent {
    pub fn edit_content(id: impl Into<BoxId>, value: Map<String, Value>) -> Self {
        EditIntent::AddOrEditContent { id: id.into(), value }
    }

    pub fn remove_content(id: impl Into<BoxId>) -> Self {
        EditIntent::RemoveContent { id: id.into() }
    }

    pub fn set_formatting(name: impl Into<BlockName>, property: impl Into<String>, value: Value) -> Self {
        EditIntent::ChangeFormatting {
            name: name.into(),
            property: property.into(),
            value: Some(value),
        }
    }

    pub fn clear_formatting(name: impl Into<BlockName>, property: impl Into<String>) -> Self {
        EditIntent::ChangeFormatting {
            name: name.into(),
            property: property.into(),
            value: None,
        }
    }

    pub fn replace_layout(layout: Vec<GridBox>) -> Self {
        EditIntent::ReplaceLayout { layout }
    }

    /// Slice the intent targets
    pub fn prop(&self) -> Prop {
        match self {
            EditIntent::AddOrEditContent { .. } | EditIntent::RemoveContent { .. } => Prop::LayoutContent,
            EditIntent::ChangeFormatting { .. } => Prop::ContentFormatting,
            EditIntent::ReplaceLayout { .. } => Prop::Layout,
        }
    }
}

/// Why an edit changed nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoopReason {
    /// Incoming value equals the current one
    Unchanged,
    /// Box or block does not exist in the effective view
    MissingTarget,
    /// Already removed in this layer
    AlreadyRemoved,
    /// The layer could not be reached (e.g. group deleted)
    NoLayer,
    /// The value could not be applied
    Malformed,
}

/// Outcome of routing one edit
#[derive(Debug, Clone, PartialEq)]
pub enum LayerMutation {
    Noop(NoopReason),

    /// Base document written directly; lists every slice touched
    Base { touched: Vec<Prop> },

    /// New record appended to the active overlay
    Appended { prop: Prop, op: OpKind },

    /// Existing record in the active overlay updated in place
    Coalesced { prop: Prop },

    /// Record deleted because the change never existed below this layer
    RolledBack { prop: Prop, cascaded: usize },

    /// `remove` tombstone recorded; `replaced` when it superseded the layer's own record
    Tombstoned { prop: Prop, replaced: bool },
}

impl LayerMutation {
    pub fn is_noop(&self) -> bool {
        matches!(self, LayerMutation::Noop(_))
    }

    /// Slices whose persisted value may have changed
    pub fn touched(&self) -> Vec<Prop> {
        match self {
            LayerMutation::Noop(_) => Vec::new(),
            LayerMutation::Base { touched } => touched.clone(),
            LayerMutation::Appended { prop, .. }
            | LayerMutation::Coalesced { prop }
            | LayerMutation::Tombstoned { prop, .. } => vec![*prop],
            LayerMutation::RolledBack { prop, cascaded } => {
                if *cascaded > 0 && *prop != Prop::ContentFormatting {
                    vec![*prop, Prop::ContentFormatting]
                } else {
                    vec![*prop]
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_intent_wire_format() {
        let intent = EditIntent::clear_formatting("Q1", "fontSize");
        let json = serde_json::to_value(&intent).unwrap();
        assert_eq!(json["type"], "changeFormatting");
        assert_eq!(json["value"], Value::Null);

        let parsed: EditIntent = serde_json::from_value(json!({
            "type": "removeContent",
            "id": "a"
        }))
        .unwrap();
        assert_eq!(parsed, EditIntent::remove_content("a"));
    }

    #[test]
    fn test_touched_slices() {
        assert!(LayerMutation::Noop(NoopReason::Unchanged).touched().is_empty());
        assert_eq!(
            LayerMutation::RolledBack {
                prop: Prop::LayoutContent,
                cascaded: 1
            }
            .touched(),
            vec![Prop::LayoutContent, Prop::ContentFormatting]
        );
        assert_eq!(
            LayerMutation::Coalesced {
                prop: Prop::Layout
            }
            .touched(),
            vec![Prop::Layout]
        );
    }
}
