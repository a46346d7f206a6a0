//! Diff-gated persistence of session slices.
//!
//! [`SyncScheduler`] keeps, per slice, the last value the store accepted and
//! at most one write in flight:
//! - A transition whose value matches what was last handed off is ignored
//! - An idle slice dispatches immediately
//! - An in-flight slice keeps only the newest pending value and sends it
//!   once the current write completes
//!
//! Writes run as spawned tasks that report back over a completion channel.
//! Completions carry the generation they were issued under; retargeting bumps
//! the generation, so late completions for a previous step are dropped.
//! Each write also carries a ticket, and a completion is only applied to the
//! slice whose in-flight ticket it matches.
//!
//! # Error Handling
//!
//! A failed write leaves `last_persisted` untouched, so the next transition
//! sees a non-empty diff and writes again.

use crate::slices::{snapshot, Slice, SyncTarget};
use crate::store::{DocumentStore, Fields, StoreError};
use flowdeck_editor::EditSession;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Writes failed for slices: {0:?}")]
    WritesFailed(Vec<Slice>),
}

/// What `schedule` did with a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Structurally equal to what was last handed off
    Unchanged,
    /// Write issued
    Dispatched,
    /// Replaced the pending value behind an in-flight write
    Coalesced,
    /// No document to write to
    Unroutable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    InFlight,
}

/// Completion message from spawned write tasks
#[derive(Debug)]
pub struct WriteComplete {
    pub generation: u64,
    pub ticket: u64,
    pub slice: Slice,
    pub value: Value,
    pub result: Result<(), StoreError>,
}

#[derive(Debug)]
struct SliceState {
    last_persisted: Option<Value>,
    in_flight: Option<Value>,
    pending: Option<Value>,
    phase: SyncPhase,
    ticket: Option<u64>,
    task: Option<JoinHandle<()>>,
}

impl SliceState {
    fn new(last_persisted: Option<Value>) -> Self {
        Self {
            last_persisted,
            in_flight: None,
            pending: None,
            phase: SyncPhase::Idle,
            ticket: None,
            task: None,
        }
    }

    /// Most recent value handed toward the store
    fn latest(&self) -> Option<&Value> {
        self.pending
            .as_ref()
            .or(self.in_flight.as_ref())
            .or(self.last_persisted.as_ref())
    }
}

pub struct SyncScheduler {
    store: Arc<dyn DocumentStore>,
    target: SyncTarget,
    generation: u64,
    next_ticket: u64,
    slices: BTreeMap<Slice, SliceState>,
    /// Slices whose writes failed since the last flush
    failed: Vec<Slice>,
    completion_tx: mpsc::UnboundedSender<WriteComplete>,
    completion_rx: mpsc::UnboundedReceiver<WriteComplete>,
}

impl std::fmt::Debug for SyncScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncScheduler")
            .field("target", &self.target)
            .field("generation", &self.generation)
            .field("in_flight", &self.in_flight_count())
            .finish()
    }
}

impl SyncScheduler {
    pub fn new(store: Arc<dyn DocumentStore>, target: SyncTarget) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        Self {
            store,
            target,
            generation: 0,
            next_ticket: 0,
            slices: BTreeMap::new(),
            failed: Vec::new(),
            completion_tx,
            completion_rx,
        }
    }

    pub fn target(&self) -> &SyncTarget {
        &self.target
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Record values known to be stored already
    pub fn baseline(&mut self, values: BTreeMap<Slice, Value>) {
        for (slice, value) in values {
            self.slices.entry(slice).or_insert_with(|| SliceState::new(None)).last_persisted = Some(value);
        }
    }

    pub fn last_persisted(&self, slice: Slice) -> Option<&Value> {
        self.slices.get(&slice).and_then(|s| s.last_persisted.as_ref())
    }

    pub fn phase(&self, slice: Slice) -> SyncPhase {
        self.slices.get(&slice).map(|s| s.phase).unwrap_or(SyncPhase::Idle)
    }

    pub fn in_flight_count(&self) -> usize {
        self.slices.values().filter(|s| s.phase == SyncPhase::InFlight).count()
    }

    /// Hand the scheduler the next value of one slice
    pub fn schedule(&mut self, slice: Slice, value: Value) -> ScheduleOutcome {
        self.poll_completions();

        let state = self.slices.entry(slice).or_insert_with(|| SliceState::new(None));
        if state.latest() == Some(&value) {
            return ScheduleOutcome::Unchanged;
        }

        if state.phase == SyncPhase::InFlight {
            debug!(slice = %slice, "Coalescing behind in-flight write");
            state.pending = Some(value);
            return ScheduleOutcome::Coalesced;
        }

        self.dispatch(slice, value)
    }

    /// Diff every slice of `session` against what was persisted
    pub fn on_transition(&mut self, session: &EditSession) -> Vec<(Slice, ScheduleOutcome)> {
        if !self.target.owns(session) {
            warn!(
                flow_id = %session.flow_id,
                step_id = %session.step_id,
                "Ignoring transition from a session this scheduler does not own"
            );
            return Vec::new();
        }

        let experiment_id = session.experiment().map(|e| e.id.clone());
        if experiment_id != self.target.experiment_id {
            self.set_experiment(experiment_id, None);
        }

        snapshot(session)
            .into_iter()
            .map(|(slice, value)| (slice, self.schedule(slice, value)))
            .collect()
    }

    /// Switch the experiment document the experiment slice writes to
    pub fn set_experiment(&mut self, experiment_id: Option<String>, persisted: Option<Value>) {
        debug!(experiment = ?experiment_id, "Experiment changed; resetting its slice");
        if let Some(task) = self.slices.remove(&Slice::Experiment).and_then(|s| s.task) {
            task.abort();
        }
        self.failed.retain(|slice| *slice != Slice::Experiment);
        self.target.experiment_id = experiment_id;
        if let Some(value) = persisted {
            self.baseline(BTreeMap::from([(Slice::Experiment, value)]));
        }
    }

    /// Drain completions that have already arrived
    pub fn poll_completions(&mut self) {
        while let Ok(complete) = self.completion_rx.try_recv() {
            self.handle_completion(complete);
        }
    }

    /// Wait until no write for the current target is in flight.
    ///
    /// Reports every slice whose write failed since the last flush.
    #[instrument(skip(self), fields(generation = self.generation))]
    pub async fn flush(&mut self) -> Result<(), SyncError> {
        self.poll_completions();

        while self.in_flight_count() > 0 {
            let Some(complete) = self.completion_rx.recv().await else {
                break;
            };
            self.handle_completion(complete);
        }

        let mut failed = std::mem::take(&mut self.failed);
        if failed.is_empty() {
            Ok(())
        } else {
            failed.sort();
            failed.dedup();
            Err(SyncError::WritesFailed(failed))
        }
    }

    /// Drop the pending value of one slice and wait for its in-flight write to land.
    ///
    /// Failures are kept for the next `flush` to report.
    #[instrument(skip(self))]
    pub async fn settle(&mut self, slice: Slice) {
        self.poll_completions();
        if let Some(state) = self.slices.get_mut(&slice) {
            state.pending = None;
        }

        while self.phase(slice) == SyncPhase::InFlight {
            let Some(complete) = self.completion_rx.recv().await else {
                break;
            };
            self.handle_completion(complete);
        }
    }

    /// Abort in-flight writes and forget pending values
    pub fn discard(&mut self) {
        let mut aborted = 0;
        for state in self.slices.values_mut() {
            if let Some(task) = state.task.take() {
                task.abort();
                aborted += 1;
            }
            state.pending = None;
            state.in_flight = None;
            state.ticket = None;
            state.phase = SyncPhase::Idle;
        }
        self.failed.clear();
        self.generation += 1;
        debug!(aborted, generation = self.generation, "Discarded pending writes");
    }

    /// Point at another step; writes issued before this are dropped on completion
    pub fn retarget(&mut self, target: SyncTarget, baseline: BTreeMap<Slice, Value>) {
        self.discard();
        debug!(flow_id = %target.flow_id, step_id = %target.step_id, "Retargeting scheduler");
        self.target = target;
        self.slices.clear();
        self.baseline(baseline);
    }

    fn dispatch(&mut self, slice: Slice, value: Value) -> ScheduleOutcome {
        let Some(path) = self.target.path(slice) else {
            return ScheduleOutcome::Unroutable;
        };
        let Some(state) = self.slices.get_mut(&slice) else {
            return ScheduleOutcome::Unroutable;
        };

        let mut fields = Fields::new();
        fields.insert(slice.field().to_string(), value.clone());

        let ticket = self.next_ticket;
        self.next_ticket += 1;

        state.phase = SyncPhase::InFlight;
        state.in_flight = Some(value.clone());
        state.ticket = Some(ticket);

        let store = Arc::clone(&self.store);
        let tx = self.completion_tx.clone();
        let generation = self.generation;

        debug!(slice = %slice, path = %path, generation, ticket, "Dispatching write");
        state.task = Some(tokio::spawn(async move {
            let result = store.write(&path, fields).await;
            let _ = tx.send(WriteComplete {
                generation,
                ticket,
                slice,
                value,
                result,
            });
        }));

        ScheduleOutcome::Dispatched
    }

    fn handle_completion(&mut self, complete: WriteComplete) {
        if complete.generation != self.generation {
            debug!(
                slice = %complete.slice,
                generation = complete.generation,
                current = self.generation,
                "Dropping stale write completion"
            );
            return;
        }

        let slice = complete.slice;
        let Some(state) = self.slices.get_mut(&slice) else {
            return;
        };
        if state.ticket != Some(complete.ticket) {
            debug!(slice = %slice, ticket = complete.ticket, "Dropping completion for a replaced write");
            return;
        }
        state.phase = SyncPhase::Idle;
        state.in_flight = None;
        state.ticket = None;
        state.task = None;

        let failed = match complete.result {
            Ok(()) => {
                state.last_persisted = Some(complete.value);
                false
            }
            Err(e) => {
                warn!(slice = %slice, error = %e, "Write failed; will retry on next transition");
                true
            }
        };

        // After a failure the pending value is dropped; the next transition carries it again.
        if let Some(next) = state.pending.take() {
            if !failed && state.last_persisted.as_ref() != Some(&next) {
                self.dispatch(slice, next);
            }
        }

        if failed {
            self.failed.push(slice);
        }
    }
}
