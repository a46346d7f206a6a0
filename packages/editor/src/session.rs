//! # Edit Session Management
//!
//! An `EditSession` is one author's live, uncommitted view of one step:
//! the base document, the flow's experiment groups, the step's events, and
//! which of them is currently selected.
//!
//! Edits are applied optimistically to local state; persistence happens
//! elsewhere by diffing the session's slices against what was last written.

use crate::context::{active_layer, ActiveLayer, EventState, ExperimentState, ALL_GROUPS};
use crate::document::{unique_name, BlockName, BoxId, ContentBlock, StepDocument};
use crate::errors::EditorError;
use crate::mutations::{EditIntent, LayerMutation, NoopReason};
use crate::overlay::Overlay;
use crate::records::{EventRecord, EventTrigger, ExperimentGroup, ExperimentRecord, StepId};
use crate::resolver::{resolve, resolve_layers};
use crate::router::{apply_edit, LayerTarget};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Editing state for one step
pub struct EditSession {
    pub flow_id: String,
    pub step_id: StepId,

    base: Arc<StepDocument>,
    experiment: Option<ExperimentRecord>,
    events: BTreeMap<String, EventRecord>,
    response_check: Option<String>,

    experiment_state: ExperimentState,
    event_state: EventState,

    /// Bumped on every edit that changed a layer
    version: u64,

    name_separator: String,

    effective: Arc<StepDocument>,
    view_tx: watch::Sender<Arc<StepDocument>>,
}

impl EditSession {
    /// Create an empty session for a step
    pub fn new(flow_id: impl Into<String>, step_id: impl Into<StepId>) -> Self {
        let base = Arc::new(StepDocument::new());
        let (view_tx, _) = watch::channel(Arc::clone(&base));

        Self {
            flow_id: flow_id.into(),
            step_id: step_id.into(),
            base: Arc::clone(&base),
            experiment: None,
            events: BTreeMap::new(),
            response_check: None,
            experiment_state: ExperimentState::default(),
            event_state: EventState::default(),
            version: 0,
            name_separator: "_".to_string(),
            effective: base,
            view_tx,
        }
    }

    pub fn with_base(mut self, base: StepDocument) -> Self {
        self.base = Arc::new(base);
        self.refresh();
        self
    }

    pub fn with_experiment(mut self, experiment: ExperimentRecord) -> Self {
        self.experiment = Some(experiment);
        self.refresh();
        self
    }

    pub fn with_events(mut self, events: BTreeMap<String, EventRecord>) -> Self {
        self.events = events;
        self.refresh();
        self
    }

    pub fn with_response_check(mut self, source: Option<String>) -> Self {
        self.response_check = source;
        self
    }

    pub fn with_name_separator(mut self, separator: impl Into<String>) -> Self {
        self.name_separator = separator.into();
        self
    }

    // Queries

    /// Effective view for the current selection
    pub fn effective_view(&self) -> Arc<StepDocument> {
        Arc::clone(&self.effective)
    }

    /// Receive a new effective view whenever it changes
    pub fn subscribe(&self) -> watch::Receiver<Arc<StepDocument>> {
        self.view_tx.subscribe()
    }

    pub fn active_layer(&self) -> ActiveLayer {
        active_layer(&self.experiment_state, &self.event_state)
    }

    pub fn base(&self) -> &Arc<StepDocument> {
        &self.base
    }

    pub fn experiment(&self) -> Option<&ExperimentRecord> {
        self.experiment.as_ref()
    }

    pub fn events(&self) -> &BTreeMap<String, EventRecord> {
        &self.events
    }

    pub fn response_check(&self) -> Option<&str> {
        self.response_check.as_deref()
    }

    pub fn experiment_state(&self) -> &ExperimentState {
        &self.experiment_state
    }

    pub fn event_state(&self) -> &EventState {
        &self.event_state
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Overlay a group owns for this step, if materialized
    pub fn group_overlay(&self, group: &str) -> Option<&Overlay> {
        self.experiment
            .as_ref()
            .and_then(|e| e.group(group))
            .and_then(|g| g.overlay(&self.step_id))
    }

    pub fn event_overlay(&self, event: &str) -> Option<&Overlay> {
        self.events.get(event).map(|record| &record.changes)
    }

    /// Freshly resolved view for any layer
    pub fn view_for(&self, layer: &ActiveLayer) -> Arc<StepDocument> {
        match layer {
            ActiveLayer::Base => Arc::clone(&self.base),
            ActiveLayer::Experiment { group } => resolve_layers(&self.base, [self.group_overlay(group)]),
            ActiveLayer::Event { event, group } => resolve_layers(
                &self.base,
                [
                    group.as_deref().and_then(|g| self.group_overlay(g)),
                    self.event_overlay(event),
                ],
            ),
        }
    }

    /// Freshly resolved view of everything below `layer`
    pub fn parent_view(&self, layer: &ActiveLayer) -> Arc<StepDocument> {
        match layer {
            ActiveLayer::Base | ActiveLayer::Experiment { .. } => Arc::clone(&self.base),
            ActiveLayer::Event { group: None, .. } => Arc::clone(&self.base),
            ActiveLayer::Event { group: Some(group), .. } => resolve_layers(&self.base, [self.group_overlay(group)]),
        }
    }

    /// Block names in use anywhere for this step: base plus every overlay
    pub fn taken_names(&self) -> BTreeSet<BlockName> {
        self.names_outside(None)
    }

    /// Names held by blocks in any box other than `skip`, across every layer
    fn names_outside(&self, skip: Option<&str>) -> BTreeSet<BlockName> {
        let kept = |box_id: &str| skip != Some(box_id);
        let collect = |doc: &StepDocument, names: &mut BTreeSet<BlockName>| {
            names.extend(
                doc.layout_content
                    .iter()
                    .filter(|(box_id, _)| kept(box_id.as_str()))
                    .map(|(_, block)| block.name.clone()),
            );
        };

        let mut names = BTreeSet::new();
        collect(self.base.as_ref(), &mut names);

        let overlays = self
            .experiment
            .iter()
            .flat_map(|e| e.groups.iter())
            .filter_map(|g| g.overlay(&self.step_id))
            .chain(self.events.values().map(|record| &record.changes));

        for overlay in overlays {
            names.extend(
                overlay
                    .block_names()
                    .filter(|(box_id, _)| kept(*box_id))
                    .map(|(_, name)| name.to_string()),
            );
            collect(resolve(&self.base, overlay).as_ref(), &mut names);
        }

        names
    }

    // Context selection (never mutates a layer)

    /// Select an experiment group; `"All"` (or `None`) means the base document
    pub fn set_active_experiment_group(&mut self, name: Option<&str>) -> Result<(), EditorError> {
        let next = match name {
            None | Some(ALL_GROUPS) => None,
            Some(group) => {
                let experiment = self.experiment.as_ref().ok_or(EditorError::NoExperiment)?;
                if experiment.group(group).is_none() {
                    return Err(EditorError::UnknownGroup(group.to_string()));
                }
                Some(group.to_string())
            }
        };

        debug!(group = ?next, "Selecting experiment group");
        self.experiment_state.current = next;
        self.refresh();
        Ok(())
    }

    /// Select (or clear) the event being previewed
    pub fn set_active_event(&mut self, name: Option<&str>) {
        debug!(event = ?name, "Selecting event");
        self.event_state.current = name.map(str::to_string);
        self.refresh();
    }

    // Records

    pub fn attach_experiment(&mut self, experiment: ExperimentRecord) {
        self.experiment = Some(experiment);
        self.experiment_state.current = None;
        self.refresh();
    }

    /// Drop the experiment and every group overlay with it
    pub fn detach_experiment(&mut self) -> Option<ExperimentRecord> {
        let removed = self.experiment.take()?;
        self.experiment_state.current = None;
        self.version += 1;
        self.refresh();
        Some(removed)
    }

    pub fn add_experiment_group(&mut self, name: &str, weight: f64) -> Result<(), EditorError> {
        if name == ALL_GROUPS {
            return Err(EditorError::ReservedGroupName(name.to_string()));
        }
        let experiment = self.experiment.as_mut().ok_or(EditorError::NoExperiment)?;
        if experiment.group(name).is_some() {
            return Err(EditorError::DuplicateGroup(name.to_string()));
        }

        experiment.groups.push(ExperimentGroup::new(name, weight));
        Ok(())
    }

    /// Remove a group and every overlay it owns; clears the selection if it pointed here
    pub fn remove_experiment_group(&mut self, name: &str) -> Result<ExperimentGroup, EditorError> {
        let experiment = self.experiment.as_mut().ok_or(EditorError::NoExperiment)?;
        let index = experiment
            .groups
            .iter()
            .position(|g| g.name == name)
            .ok_or_else(|| EditorError::UnknownGroup(name.to_string()))?;

        let removed = experiment.groups.remove(index);
        if self.experiment_state.current.as_deref() == Some(name) {
            self.experiment_state.current = None;
        }
        self.version += 1;
        self.refresh();
        Ok(removed)
    }

    /// Define (or redefine the trigger of) an event
    pub fn define_event(&mut self, name: &str, trigger: EventTrigger) {
        self.events.entry(name.to_string()).or_default().trigger = trigger;
        self.version += 1;
    }

    pub fn set_response_check(&mut self, source: Option<String>) {
        self.response_check = source.filter(|s| !s.trim().is_empty());
        self.version += 1;
    }

    // Editing

    /// Route one edit to the active layer. A rename that collides with
    /// another block's name gets a numbered suffix first.
    pub fn apply_edit(&mut self, mut intent: EditIntent) -> LayerMutation {
        self.dedupe_rename(&mut intent);
        let layer = self.active_layer();

        let mutation = match &layer {
            ActiveLayer::Base => {
                let doc = Arc::make_mut(&mut self.base);
                apply_edit(&intent, LayerTarget::Base(doc))
            }
            ActiveLayer::Experiment { group } => self.edit_group_overlay(group, &intent),
            ActiveLayer::Event { event, .. } => {
                let parent = self.parent_view(&layer);
                self.edit_event_overlay(event, &parent, &intent)
            }
        };

        if !mutation.is_noop() {
            self.version += 1;
        }
        self.refresh();
        mutation
    }

    /// Add a new block to a box, making its name unique for the step first
    pub fn add_block(&mut self, box_id: impl Into<BoxId>, mut block: ContentBlock) -> LayerMutation {
        block.name = unique_name(&block.name, &self.taken_names(), &self.name_separator);

        match block.to_fields() {
            Ok(value) => self.apply_edit(EditIntent::AddOrEditContent {
                id: box_id.into(),
                value,
            }),
            Err(e) => {
                warn!(error = %e, "Could not serialize new block");
                LayerMutation::Noop(NoopReason::Malformed)
            }
        }
    }

    fn dedupe_rename(&self, intent: &mut EditIntent) {
        let EditIntent::AddOrEditContent { id, value } = intent else {
            return;
        };
        let Some(desired) = value.get("name").and_then(Value::as_str).map(str::to_string) else {
            return;
        };
        let id = id.as_str();
        if self.effective_view().block(id).is_some_and(|block| block.name == desired) {
            return;
        }

        let unique = unique_name(&desired, &self.names_outside(Some(id)), &self.name_separator);
        if unique != desired {
            debug!(box_id = %id, requested = %desired, name = %unique, "Renamed block to keep names unique");
            value.insert("name".into(), Value::String(unique));
        }
    }

    fn edit_group_overlay(&mut self, group: &str, intent: &EditIntent) -> LayerMutation {
        let parent = Arc::clone(&self.base);
        let step_id = self.step_id.clone();

        let Some(group_record) = self.experiment.as_mut().and_then(|e| e.group_mut(group)) else {
            warn!(group = %group, "Edit routed to a group that no longer exists");
            return LayerMutation::Noop(NoopReason::NoLayer);
        };

        let overlay = group_record.steps.entry(step_id.clone()).or_default();
        let mutation = apply_edit(intent, LayerTarget::Overlay { overlay, parent: &parent });

        if overlay.is_empty() {
            group_record.steps.remove(&step_id);
            if !mutation.is_noop() {
                info!(group = %group, step_id = %step_id, "Group overlay emptied; deleting it");
            }
        }

        mutation
    }

    fn edit_event_overlay(&mut self, event: &str, parent: &StepDocument, intent: &EditIntent) -> LayerMutation {
        let existing = self.events.remove(event);
        let defined = existing.is_some();
        let mut record = existing.unwrap_or_default();

        let mutation = apply_edit(
            intent,
            LayerTarget::Overlay {
                overlay: &mut record.changes,
                parent,
            },
        );

        if record.changes.is_empty() && !mutation.is_noop() {
            // Everything rolled back: the event record goes, and so does the pointer to it
            info!(event = %event, "Event overlay emptied; deleting it");
            if self.event_state.current.as_deref() == Some(event) {
                self.event_state.current = None;
            }
        } else if defined || !record.changes.is_empty() {
            self.events.insert(event.to_string(), record);
        }

        mutation
    }

    /// Recompute the effective view and notify subscribers if it changed
    fn refresh(&mut self) {
        let next = self.view_for(&self.active_layer());
        if Arc::ptr_eq(&next, &self.effective) {
            return;
        }

        let changed = *next != *self.effective;
        self.effective = Arc::clone(&next);
        if changed {
            self.view_tx.send_replace(next);
        }
    }
}
