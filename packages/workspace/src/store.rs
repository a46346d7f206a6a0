//! Abstract document store and an in-memory implementation.
//!
//! Documents are flat JSON objects addressed by a fully-qualified path.
//! `write` merges the given fields into the stored document; it never
//! replaces fields it was not given.

use async_trait::async_trait;
use flowdeck_common::CommonResult;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::{oneshot, Semaphore};
use tracing::debug;

/// Top-level fields of one stored document
pub type Fields = Map<String, Value>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document already exists: {0}")]
    AlreadyExists(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Fully-qualified document address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DocPath {
    Flow { flow_id: String },
    Step { flow_id: String, step_id: String },
    Experiment { experiment_id: String },
}

impl DocPath {
    pub fn flow(flow_id: impl Into<String>) -> Self {
        DocPath::Flow {
            flow_id: flow_id.into(),
        }
    }

    pub fn step(flow_id: impl Into<String>, step_id: impl Into<String>) -> Self {
        DocPath::Step {
            flow_id: flow_id.into(),
            step_id: step_id.into(),
        }
    }

    pub fn experiment(experiment_id: impl Into<String>) -> Self {
        DocPath::Experiment {
            experiment_id: experiment_id.into(),
        }
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocPath::Flow { flow_id } => write!(f, "flows/{flow_id}"),
            DocPath::Step { flow_id, step_id } => write!(f, "flows/{flow_id}/steps/{step_id}"),
            DocPath::Experiment { experiment_id } => write!(f, "experiments/{experiment_id}"),
        }
    }
}

/// External document store
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// `Ok(None)` when the document does not exist
    async fn read(&self, path: &DocPath) -> Result<Option<Fields>, StoreError>;

    /// Merge `fields` into the document, creating it if absent
    async fn write(&self, path: &DocPath, fields: Fields) -> Result<(), StoreError>;

    async fn create(&self, path: &DocPath, fields: Fields) -> Result<(), StoreError>;

    async fn delete(&self, path: &DocPath) -> Result<(), StoreError>;
}

/// One call observed by a [`MemoryStore`]
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Write { path: DocPath, fields: Fields },
    Create { path: DocPath, fields: Fields },
    Delete { path: DocPath },
}

/// In-memory store with a call log, failure injection and a write gate.
///
/// A gated write is in transit once issued: it lands when released even if
/// the caller has stopped waiting for it.
#[derive(Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
    calls: Mutex<Vec<StoreCall>>,
    gate: Option<Arc<Semaphore>>,
}

#[derive(Default)]
struct Shared {
    docs: Mutex<BTreeMap<String, Fields>>,
    failures: AtomicUsize,
}

impl Shared {
    fn docs_lock(&self) -> MutexGuard<'_, BTreeMap<String, Fields>> {
        self.docs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn take_failure(&self) -> bool {
        self.failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn merge(&self, path: &DocPath, fields: Fields) -> Result<(), StoreError> {
        if self.take_failure() {
            debug!(path = %path, "Injected write failure");
            return Err(StoreError::Unavailable(path.to_string()));
        }

        let mut docs = self.docs_lock();
        let doc = docs.entry(path.to_string()).or_default();
        for (key, value) in fields {
            doc.insert(key, value);
        }
        Ok(())
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes wait until [`MemoryStore::release`] lets them through
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    /// Seed from a JSON object of `{ "<path>": { ..fields } }`
    pub fn from_json_file(path: impl AsRef<Path>) -> CommonResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let docs: BTreeMap<String, Fields> = serde_json::from_str(&content)?;
        Ok(Self {
            shared: Arc::new(Shared {
                docs: Mutex::new(docs),
                ..Shared::default()
            }),
            ..Self::default()
        })
    }

    pub fn with_doc(self, path: &DocPath, fields: Fields) -> Self {
        self.shared.docs_lock().insert(path.to_string(), fields);
        self
    }

    /// Let `count` gated writes land
    pub fn release(&self, count: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(count);
        }
    }

    /// Fail the next `count` writes with `Unavailable`
    pub fn fail_next_writes(&self, count: usize) {
        self.shared.failures.store(count, Ordering::SeqCst);
    }

    pub fn doc(&self, path: &DocPath) -> Option<Fields> {
        self.shared.docs_lock().get(&path.to_string()).cloned()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls_lock().clone()
    }

    /// Fields of every write issued, in order
    pub fn writes(&self) -> Vec<(DocPath, Fields)> {
        self.calls_lock()
            .iter()
            .filter_map(|call| match call {
                StoreCall::Write { path, fields } => Some((path.clone(), fields.clone())),
                _ => None,
            })
            .collect()
    }

    fn calls_lock(&self) -> MutexGuard<'_, Vec<StoreCall>> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn read(&self, path: &DocPath) -> Result<Option<Fields>, StoreError> {
        Ok(self.shared.docs_lock().get(&path.to_string()).cloned())
    }

    async fn write(&self, path: &DocPath, fields: Fields) -> Result<(), StoreError> {
        self.calls_lock().push(StoreCall::Write {
            path: path.clone(),
            fields: fields.clone(),
        });

        let Some(gate) = self.gate.clone() else {
            return self.shared.merge(path, fields);
        };

        let shared = Arc::clone(&self.shared);
        let path = path.clone();
        let (ack_tx, ack_rx) = oneshot::channel();
        tokio::spawn(async move {
            let result = match gate.acquire_owned().await {
                Ok(permit) => {
                    permit.forget();
                    shared.merge(&path, fields)
                }
                Err(_) => Err(StoreError::Unavailable("store closed".to_string())),
            };
            let _ = ack_tx.send(result);
        });

        ack_rx
            .await
            .unwrap_or_else(|_| Err(StoreError::Unavailable("write dropped".to_string())))
    }

    async fn create(&self, path: &DocPath, fields: Fields) -> Result<(), StoreError> {
        self.calls_lock().push(StoreCall::Create {
            path: path.clone(),
            fields: fields.clone(),
        });

        let mut docs = self.shared.docs_lock();
        let key = path.to_string();
        if docs.contains_key(&key) {
            return Err(StoreError::AlreadyExists(key));
        }
        docs.insert(key, fields);
        Ok(())
    }

    async fn delete(&self, path: &DocPath) -> Result<(), StoreError> {
        self.calls_lock().push(StoreCall::Delete { path: path.clone() });

        match self.shared.docs_lock().remove(&path.to_string()) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(path.to_string())),
        }
    }
}
