//! # Context Selection
//!
//! Decides which layer edits route to and which view is rendered.
//!
//! ```text
//! events.current set          → Event { event, group }   (nested on the viewed group)
//! experiment.current = group  → Experiment { group }
//! otherwise ("All" / unset)   → Base
//! ```
//!
//! Selecting a group or an event never mutates a layer.

use serde::{Deserialize, Serialize};

/// Sentinel group name meaning "edit the base document directly"
pub const ALL_GROUPS: &str = "All";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentState {
    pub current: Option<String>,
}

impl ExperimentState {
    /// Currently viewed group, ignoring the `"All"` sentinel
    pub fn selected_group(&self) -> Option<&str> {
        self.current.as_deref().filter(|name| *name != ALL_GROUPS)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventState {
    pub current: Option<String>,
}

/// The layer subsequent edits land in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveLayer {
    Base,
    Experiment {
        group: String,
    },
    Event {
        event: String,
        /// Group the event is previewed on top of, if any
        group: Option<String>,
    },
}

impl ActiveLayer {
    pub fn is_base(&self) -> bool {
        matches!(self, ActiveLayer::Base)
    }

    /// Group whose overlay sits under (or is) this layer
    pub fn group(&self) -> Option<&str> {
        match self {
            ActiveLayer::Base => None,
            ActiveLayer::Experiment { group } => Some(group.as_str()),
            ActiveLayer::Event { group, .. } => group.as_deref(),
        }
    }

    pub fn event(&self) -> Option<&str> {
        match self {
            ActiveLayer::Event { event, .. } => Some(event.as_str()),
            _ => None,
        }
    }
}

/// Pick the active layer from experiment and event selection
pub fn active_layer(experiment: &ExperimentState, events: &EventState) -> ActiveLayer {
    let group = experiment.selected_group().map(str::to_string);

    if let Some(event) = &events.current {
        return ActiveLayer::Event {
            event: event.clone(),
            group,
        };
    }

    match group {
        Some(group) => ActiveLayer::Experiment { group },
        None => ActiveLayer::Base,
    }
}
