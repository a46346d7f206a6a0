//! Persisted slices of an editing session.
//!
//! Each slice is one top-level field of one stored document. The scheduler
//! diffs slices independently, so an edit to formatting never rewrites the
//! layout.

use crate::store::DocPath;
use flowdeck_editor::document::{serialize_layout, serialize_layout_content};
use flowdeck_editor::EditSession;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slice {
    Layout,
    LayoutContent,
    ContentFormatting,
    ResponseCheck,
    Experiment,
    Events,
}

impl Slice {
    pub const ALL: [Slice; 6] = [
        Slice::Layout,
        Slice::LayoutContent,
        Slice::ContentFormatting,
        Slice::ResponseCheck,
        Slice::Experiment,
        Slice::Events,
    ];

    /// Field name inside the owning document
    pub fn field(&self) -> &'static str {
        match self {
            Slice::Layout => "layout",
            Slice::LayoutContent => "layoutContent",
            Slice::ContentFormatting => "contentFormatting",
            Slice::ResponseCheck => "responseCheck",
            Slice::Experiment => "groups",
            Slice::Events => "events",
        }
    }
}

impl fmt::Display for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field())
    }
}

/// Identity of the documents one session writes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTarget {
    pub flow_id: String,
    pub step_id: String,
    pub experiment_id: Option<String>,
}

impl SyncTarget {
    pub fn of(session: &EditSession) -> Self {
        Self {
            flow_id: session.flow_id.clone(),
            step_id: session.step_id.clone(),
            experiment_id: session.experiment().map(|e| e.id.clone()),
        }
    }

    /// Whether `session` edits the same step this target writes to
    pub fn owns(&self, session: &EditSession) -> bool {
        self.flow_id == session.flow_id && self.step_id == session.step_id
    }

    /// Document a slice lives in; `None` for the experiment slice without an experiment
    pub fn path(&self, slice: Slice) -> Option<DocPath> {
        match slice {
            Slice::Experiment => self.experiment_id.as_ref().map(DocPath::experiment),
            _ => Some(DocPath::step(&self.flow_id, &self.step_id)),
        }
    }
}

/// Current value of every slice the session has
pub fn snapshot(session: &EditSession) -> BTreeMap<Slice, Value> {
    let base = session.base();
    let mut slices = BTreeMap::new();

    slices.insert(Slice::Layout, Value::String(serialize_layout(&base.layout)));
    slices.insert(
        Slice::LayoutContent,
        Value::String(serialize_layout_content(&base.layout_content)),
    );
    slices.insert(
        Slice::ResponseCheck,
        session
            .response_check()
            .map(|s| Value::String(s.to_string()))
            .unwrap_or(Value::Null),
    );

    match serde_json::to_value(&base.content_formatting) {
        Ok(value) => {
            slices.insert(Slice::ContentFormatting, value);
        }
        Err(e) => warn!(error = %e, "Could not serialize formatting"),
    }

    match serde_json::to_value(session.events()) {
        Ok(value) => {
            slices.insert(Slice::Events, value);
        }
        Err(e) => warn!(error = %e, "Could not serialize events"),
    }

    if let Some(experiment) = session.experiment() {
        match serde_json::to_value(&experiment.groups) {
            Ok(value) => {
                slices.insert(Slice::Experiment, value);
            }
            Err(e) => warn!(error = %e, "Could not serialize experiment groups"),
        }
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowdeck_editor::{ContentBlock, ContentKind, ExperimentGroup, ExperimentRecord, GridBox, StepDocument};
    use serde_json::json;

    fn session() -> EditSession {
        EditSession::new("f", "s").with_base(
            StepDocument::new()
                .with_box(GridBox::new("a", 0, 0, 4, 2))
                .with_block("a", ContentBlock::new("Q1", ContentKind::Text))
                .with_formatting("Q1", "fontSize", json!(14)),
        )
    }

    #[test]
    fn test_snapshot_without_experiment() {
        let slices = snapshot(&session());

        assert!(!slices.contains_key(&Slice::Experiment));
        assert!(slices[&Slice::Layout].is_string());
        assert_eq!(slices[&Slice::ContentFormatting], json!({ "Q1": { "fontSize": 14 } }));
        assert_eq!(slices[&Slice::ResponseCheck], Value::Null);
        assert_eq!(slices[&Slice::Events], json!({}));
    }

    #[test]
    fn test_experiment_slice_targets_experiment_document() {
        let session = session().with_experiment(ExperimentRecord::new("exp").with_group(ExperimentGroup::new("A", 0.5)));
        let target = SyncTarget::of(&session);

        assert_eq!(target.path(Slice::Experiment), Some(DocPath::experiment("exp")));
        assert_eq!(target.path(Slice::Layout), Some(DocPath::step("f", "s")));
        assert_eq!(snapshot(&session)[&Slice::Experiment][0]["name"], "A");
    }

    #[test]
    fn test_target_ownership() {
        let target = SyncTarget::of(&session());
        assert!(target.owns(&session()));
        assert!(!target.owns(&EditSession::new("f", "other")));
        assert_eq!(target.path(Slice::Experiment), None);
    }
}
