//! Error types for the editor

use thiserror::Error;

/// Errors from record-level session operations.
///
/// Routing an edit never fails; it reports a `LayerMutation::Noop` instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditorError {
    #[error("No experiment is attached to this flow")]
    NoExperiment,

    #[error("Unknown experiment group: {0}")]
    UnknownGroup(String),

    #[error("Experiment group already exists: {0}")]
    DuplicateGroup(String),

    #[error("Group name is reserved: {0}")]
    ReservedGroupName(String),
}
