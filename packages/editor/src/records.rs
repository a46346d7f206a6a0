//! Persisted records that own overlays: experiment groups and events.

use crate::document::BoxId;
use crate::overlay::Overlay;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type StepId = String;

/// One A/B group; owns one overlay per step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentGroup {
    pub name: String,

    #[serde(default)]
    pub weight: f64,

    #[serde(default)]
    pub users: Vec<String>,

    #[serde(default)]
    pub steps: BTreeMap<StepId, Overlay>,
}

impl ExperimentGroup {
    pub fn new(name: impl Into<String>, weight: f64) -> Self {
        Self {
            name: name.into(),
            weight,
            ..Default::default()
        }
    }

    pub fn overlay(&self, step_id: &str) -> Option<&Overlay> {
        self.steps.get(step_id)
    }
}

/// Experiment document attached to a flow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentRecord {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub groups: Vec<ExperimentGroup>,
}

impl ExperimentRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            groups: Vec::new(),
        }
    }

    pub fn with_group(mut self, group: ExperimentGroup) -> Self {
        self.groups.push(group);
        self
    }

    pub fn group(&self, name: &str) -> Option<&ExperimentGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn group_mut(&mut self, name: &str) -> Option<&mut ExperimentGroup> {
        self.groups.iter_mut().find(|g| g.name == name)
    }

    /// Every step overlay across all groups
    pub fn overlays(&self) -> impl Iterator<Item = &Overlay> {
        self.groups.iter().flat_map(|g| g.steps.values())
    }
}

/// What fires an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTrigger {
    #[serde(default = "default_trigger_kind")]
    pub kind: String,

    /// Box the learner interacts with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<BoxId>,
}

fn default_trigger_kind() -> String {
    "click".to_string()
}

impl EventTrigger {
    pub fn click(source: impl Into<BoxId>) -> Self {
        Self {
            kind: default_trigger_kind(),
            source: Some(source.into()),
        }
    }
}

impl Default for EventTrigger {
    fn default() -> Self {
        Self {
            kind: default_trigger_kind(),
            source: None,
        }
    }
}

/// "What the step looks like after this event fires"
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(default)]
    pub trigger: EventTrigger,

    #[serde(default)]
    pub changes: Overlay,
}
