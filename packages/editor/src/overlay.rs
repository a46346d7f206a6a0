//! # Overlays
//!
//! An overlay is an ordered log of change operations scoped to one context
//! (an experiment group or an event) and one step. Later operations win.
//!
//! Within one overlay there is at most one live record per target:
//! - `layout`: one `change` record holding the whole serialized layout
//! - `layoutContent`: one `add`/`edit` record or one `remove` tombstone per box id
//! - `contentFormatting`: one `change` or `remove` record per (block name, property)

use crate::document::{serialize_layout, GridBox};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Document slice a change targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Prop {
    Layout,
    LayoutContent,
    ContentFormatting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Add,
    Edit,
    Remove,
    Change,
}

/// One change record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeOp {
    pub prop: Prop,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub op: OpKind,

    #[serde(default)]
    pub value: Value,
}

impl ChangeOp {
    /// Layout checkpoint (the layout is always written whole)
    pub fn layout(layout: &[GridBox]) -> Self {
        Self {
            prop: Prop::Layout,
            id: None,
            op: OpKind::Change,
            value: Value::String(serialize_layout(layout)),
        }
    }

    pub fn content(op: OpKind, box_id: impl Into<String>, value: Map<String, Value>) -> Self {
        Self {
            prop: Prop::LayoutContent,
            id: Some(box_id.into()),
            op,
            value: Value::Object(value),
        }
    }

    pub fn remove_content(box_id: impl Into<String>) -> Self {
        Self {
            prop: Prop::LayoutContent,
            id: Some(box_id.into()),
            op: OpKind::Remove,
            value: Value::Null,
        }
    }

    /// Formatting change; `None` builds a `remove` record for the property
    pub fn formatting(name: impl Into<String>, property: &str, value: Option<Value>) -> Self {
        let (op, value) = match value {
            Some(value) => (OpKind::Change, json!({ "property": property, "value": value })),
            None => (OpKind::Remove, json!({ "property": property })),
        };
        Self {
            prop: Prop::ContentFormatting,
            id: Some(name.into()),
            op,
            value,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.op == OpKind::Remove
    }

    pub fn targets(&self, prop: Prop, id: &str) -> bool {
        self.prop == prop && self.id.as_deref() == Some(id)
    }

    /// Property name of a formatting record
    pub fn formatting_property(&self) -> Option<&str> {
        self.value.get("property").and_then(Value::as_str)
    }

    /// Block name carried by a content record's value, if any
    pub fn block_name(&self) -> Option<&str> {
        self.value.get("name").and_then(Value::as_str)
    }
}

/// Ordered change list for one context and one step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Overlay {
    ops: Vec<ChangeOp>,
}

impl Overlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ops(ops: Vec<ChangeOp>) -> Self {
        Self { ops }
    }

    pub fn ops(&self) -> &[ChangeOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<ChangeOp> {
        self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn push(&mut self, op: ChangeOp) {
        self.ops.push(op);
    }

    pub fn remove(&mut self, index: usize) -> ChangeOp {
        self.ops.remove(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut ChangeOp> {
        self.ops.get_mut(index)
    }

    pub fn retain(&mut self, keep: impl FnMut(&ChangeOp) -> bool) {
        self.ops.retain(keep);
    }

    /// Live (`add`/`edit`) content record for a box
    pub fn find_content(&self, box_id: &str) -> Option<usize> {
        self.ops
            .iter()
            .rposition(|op| op.targets(Prop::LayoutContent, box_id) && !op.is_tombstone())
    }

    /// `remove` tombstone for a box
    pub fn find_content_tombstone(&self, box_id: &str) -> Option<usize> {
        self.ops
            .iter()
            .rposition(|op| op.targets(Prop::LayoutContent, box_id) && op.is_tombstone())
    }

    /// Record (`change` or `remove`) for one formatting property of a block
    pub fn find_formatting(&self, name: &str, property: &str) -> Option<usize> {
        self.ops.iter().rposition(|op| {
            op.targets(Prop::ContentFormatting, name) && op.formatting_property() == Some(property)
        })
    }

    pub fn find_layout(&self) -> Option<usize> {
        self.ops.iter().rposition(|op| op.prop == Prop::Layout)
    }

    /// Number of records targeting `(prop, id)`
    pub fn count_for(&self, prop: Prop, id: &str) -> usize {
        self.ops.iter().filter(|op| op.targets(prop, id)).count()
    }

    /// Drop every formatting record for a block; returns how many went
    pub fn drop_formatting_for(&mut self, name: &str) -> usize {
        let before = self.ops.len();
        self.ops.retain(|op| !op.targets(Prop::ContentFormatting, name));
        before - self.ops.len()
    }

    /// Block names introduced or renamed by this overlay's content records, with their box
    pub fn block_names(&self) -> impl Iterator<Item = (&str, &str)> {
        self.ops
            .iter()
            .filter(|op| op.prop == Prop::LayoutContent && !op.is_tombstone())
            .filter_map(|op| Some((op.id.as_deref()?, op.block_name()?)))
    }
}
