//! # Flowdeck Editor
//!
//! Layered document engine for flow steps.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ base StepDocument (layout, content, format) │
//! └─────────────────────────────────────────────┘
//!                     ↓  + group overlay
//! ┌─────────────────────────────────────────────┐
//! │ experiment view (one A/B group)             │
//! └─────────────────────────────────────────────┘
//!                     ↓  + event overlay
//! ┌─────────────────────────────────────────────┐
//! │ event view ("after the learner clicks X")   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Base is source of truth**: overlays only record differences from it
//! 2. **One layer per edit**: the selected context decides where an edit lands
//! 3. **Minimal overlays**: at most one live record per target; edits that
//!    undo a layer-local addition delete the record instead of stacking
//! 4. **Pure resolution**: effective views are recomputed, never patched
//!
//! ## Usage
//!
//! ```rust,ignore
//! use flowdeck_editor::{EditIntent, EditSession};
//!
//! let mut session = EditSession::new("flow-1", "step-1")
//!     .with_base(base)
//!     .with_experiment(experiment);
//!
//! session.set_active_experiment_group(Some("B"))?;
//! session.apply_edit(EditIntent::set_formatting("Q1", "fontSize", json!(18)));
//!
//! let view = session.effective_view();
//! ```

pub mod context;
pub mod document;
mod errors;
pub mod mutations;
pub mod overlay;
pub mod records;
pub mod resolver;
pub mod router;
mod session;

pub use context::{active_layer, ActiveLayer, EventState, ExperimentState, ALL_GROUPS};
pub use document::{BlockName, BoxId, ContentBlock, ContentKind, Formatting, GridBox, StepDocument};
pub use errors::EditorError;
pub use mutations::{EditIntent, LayerMutation, NoopReason};
pub use overlay::{ChangeOp, OpKind, Overlay, Prop};
pub use records::{EventRecord, EventTrigger, ExperimentGroup, ExperimentRecord, StepId};
pub use resolver::{resolve, resolve_layers};
pub use router::{apply_edit, LayerTarget};
pub use session::EditSession;
