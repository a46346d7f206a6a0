//! One author's open step, bound to the document store.
//!
//! The facade owns the [`EditSession`], the [`SyncScheduler`] that persists
//! it, and the query-string debouncers of any widgets being configured.
//! Every call that changes a layer or record is followed by a scheduler
//! transition, so persistence always trails local state.

use crate::loader::load_session;
use crate::query_sync::QuerySync;
use crate::scheduler::{SyncError, SyncScheduler};
use crate::slices::{snapshot, Slice, SyncTarget};
use crate::store::{DocPath, DocumentStore, Fields};
use flowdeck_common::Config;
use flowdeck_editor::{
    ActiveLayer, BoxId, ContentKind, EditIntent, EditSession, EditorError, EventTrigger, ExperimentGroup,
    ExperimentRecord, LayerMutation, NoopReason, StepDocument,
};
use flowdeck_evaluator::{
    encode_query, grade, render_step, CheckOutcome, EditorInput, Registry, RenderContext, RenderMode,
    ResponseRecord, VNode,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, warn};

/// What happens to unsaved writes when leaving a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NavigationPolicy {
    /// Wait for every slice to reach the store first
    #[default]
    Flush,
    /// Drop pending and in-flight writes
    Discard,
}

pub struct Workspace {
    store: Arc<dyn DocumentStore>,
    config: Config,
    registry: Registry,
    session: EditSession,
    scheduler: SyncScheduler,
    widgets: BTreeMap<BoxId, QuerySync>,
}

impl Workspace {
    /// Load a step and start tracking it for persistence
    #[instrument(skip(store, config))]
    pub async fn open(
        store: Arc<dyn DocumentStore>,
        config: Config,
        flow_id: &str,
        step_id: &str,
    ) -> Result<Self, SyncError> {
        let session = load_session(store.as_ref(), &config, flow_id, step_id).await?;

        let mut scheduler = SyncScheduler::new(Arc::clone(&store), SyncTarget::of(&session));
        scheduler.baseline(snapshot(&session));

        info!(flow_id, step_id, "Opened step");
        Ok(Self {
            store,
            config,
            registry: Registry::standard(),
            session,
            scheduler,
            widgets: BTreeMap::new(),
        })
    }

    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    pub fn session(&self) -> &EditSession {
        &self.session
    }

    pub fn scheduler(&self) -> &SyncScheduler {
        &self.scheduler
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn effective_view(&self) -> Arc<StepDocument> {
        self.session.effective_view()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<StepDocument>> {
        self.session.subscribe()
    }

    pub fn active_layer(&self) -> ActiveLayer {
        self.session.active_layer()
    }

    // Context selection

    pub fn set_active_experiment_group(&mut self, name: Option<&str>) -> Result<(), EditorError> {
        self.session.set_active_experiment_group(name)
    }

    pub fn set_active_event(&mut self, name: Option<&str>) {
        self.session.set_active_event(name);
    }

    // Editing

    pub fn apply_edit(&mut self, intent: EditIntent) -> LayerMutation {
        let mutation = self.session.apply_edit(intent);
        if !mutation.is_noop() {
            self.sync();
        }
        mutation
    }

    /// Put a fresh block of `kind` into a box
    pub fn add_block(&mut self, box_id: impl Into<BoxId>, kind: ContentKind) -> LayerMutation {
        let Some(block) = self.registry.default_block(kind) else {
            warn!(kind = kind.as_str(), "No content type registered");
            return LayerMutation::Noop(NoopReason::Malformed);
        };

        let mutation = self.session.add_block(box_id, block);
        if !mutation.is_noop() {
            self.sync();
        }
        mutation
    }

    /// Translate raw editor input on a box through its content type
    pub fn input(&mut self, box_id: &str, input: EditorInput) -> LayerMutation {
        let view = self.session.effective_view();
        let Some(block) = view.block(box_id) else {
            debug!(box_id, "Input for a box without content");
            return LayerMutation::Noop(NoopReason::MissingTarget);
        };
        let Some(content_type) = self.registry.get(block.kind) else {
            return LayerMutation::Noop(NoopReason::Malformed);
        };
        let Some(intent) = content_type.edit(&box_id.to_string(), block, input) else {
            return LayerMutation::Noop(NoopReason::Malformed);
        };

        let mutation = self.apply_edit(intent);
        if !mutation.is_noop() {
            self.refresh_widget(box_id);
        }
        mutation
    }

    // Records

    pub fn define_event(&mut self, name: &str, trigger: EventTrigger) {
        self.session.define_event(name, trigger);
        self.sync();
    }

    pub fn set_response_check(&mut self, source: Option<String>) {
        self.session.set_response_check(source);
        self.sync();
    }

    pub fn add_experiment_group(&mut self, name: &str, weight: f64) -> Result<(), EditorError> {
        self.session.add_experiment_group(name, weight)?;
        self.sync();
        Ok(())
    }

    pub fn remove_experiment_group(&mut self, name: &str) -> Result<ExperimentGroup, EditorError> {
        let removed = self.session.remove_experiment_group(name)?;
        self.sync();
        Ok(removed)
    }

    /// Create an experiment document and point the flow at it
    #[instrument(skip(self))]
    pub async fn create_experiment(&mut self, experiment_id: &str) -> Result<(), SyncError> {
        let groups = json!([]);
        let mut fields = Fields::new();
        fields.insert("groups".to_string(), groups.clone());
        self.store.create(&DocPath::experiment(experiment_id), fields).await?;
        self.write_flow_reference(Value::String(experiment_id.to_string())).await?;

        self.session.attach_experiment(ExperimentRecord::new(experiment_id));
        self.scheduler.set_experiment(Some(experiment_id.to_string()), Some(groups));
        Ok(())
    }

    /// Delete the flow's experiment document and every group overlay in it
    #[instrument(skip(self))]
    pub async fn delete_experiment(&mut self) -> Result<Option<ExperimentRecord>, SyncError> {
        let Some(experiment_id) = self.session.experiment().map(|e| e.id.clone()) else {
            return Ok(None);
        };

        // a write that already left must land before the delete, or it would recreate the document
        self.scheduler.settle(Slice::Experiment).await;
        self.scheduler.set_experiment(None, None);
        self.store.delete(&DocPath::experiment(&experiment_id)).await?;
        self.write_flow_reference(Value::Null).await?;
        Ok(self.session.detach_experiment())
    }

    // Output

    pub fn render(&self, mode: RenderMode, responses: &ResponseRecord) -> VNode {
        let ctx = RenderContext { mode, responses };
        render_step(&self.session.effective_view(), &self.registry, &ctx)
    }

    pub fn grade(&self, responses: &ResponseRecord) -> CheckOutcome {
        grade(self.session.response_check(), responses)
    }

    // Widgets

    /// Start debouncing query-string sync for the widget in `box_id`
    pub fn watch_widget(&mut self, box_id: &str) -> Option<mpsc::UnboundedReceiver<String>> {
        let view = self.session.effective_view();
        let block = view.block(box_id)?;
        let content_type = self.registry.get(block.kind)?;
        let committed = encode_query(&content_type.query_params(block));
        let (sync, commits) = QuerySync::spawn(self.config.query_sync_quiet_period(), Some(committed));
        self.widgets.insert(box_id.to_string(), sync);
        Some(commits)
    }

    fn refresh_widget(&self, box_id: &str) {
        let Some(sync) = self.widgets.get(box_id) else {
            return;
        };
        let view = self.session.effective_view();
        if let Some((block, content_type)) = view
            .block(box_id)
            .and_then(|block| self.registry.get(block.kind).map(|t| (block, t)))
        {
            sync.update_from_block(content_type, block);
        }
    }

    // Persistence

    /// Push the current state of every slice and wait for the writes
    pub async fn flush(&mut self) -> Result<(), SyncError> {
        self.sync();
        self.scheduler.flush().await
    }

    /// Leave the current step for another one in the same flow
    #[instrument(skip(self), fields(from = %self.session.step_id))]
    pub async fn open_step(&mut self, step_id: &str, policy: NavigationPolicy) -> Result<(), SyncError> {
        match policy {
            NavigationPolicy::Flush => {
                if let Err(e) = self.flush().await {
                    warn!(error = %e, "Leaving step with unsaved changes");
                }
            }
            NavigationPolicy::Discard => self.scheduler.discard(),
        }

        for sync in self.widgets.values() {
            sync.cancel();
        }
        self.widgets.clear();

        let session = load_session(self.store.as_ref(), &self.config, &self.session.flow_id, step_id).await?;
        self.scheduler.retarget(SyncTarget::of(&session), snapshot(&session));
        self.session = session;
        Ok(())
    }

    fn sync(&mut self) {
        self.scheduler.on_transition(&self.session);
    }

    async fn write_flow_reference(&self, experiment: Value) -> Result<(), SyncError> {
        let mut fields = Fields::new();
        fields.insert("experiment".to_string(), experiment);
        self.store.write(&DocPath::flow(&self.session.flow_id), fields).await?;
        Ok(())
    }
}
