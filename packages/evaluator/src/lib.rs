//! # Flowdeck Evaluator
//!
//! Turns effective step views into something a learner can see and grade.
//!
//! ## Purpose
//!
//! - **Content-type dispatch**: a registry keyed by exact [`ContentKind`](flowdeck_editor::ContentKind)
//!   that renders blocks and translates authoring input into edit intents
//! - **Rendering**: an effective view becomes a VNode tree, one cell per layout box
//! - **Response checks**: a per-step formula graded against the learner's answers
//!
//! ## Determinism Contract
//!
//! Rendering is a pure function of `(view, registry, context)`. Attribute and
//! style maps are ordered, so the same view always produces the same tree.
//!
//! ## Error Recovery
//!
//! Rendering never fails: an unknown kind or a broken widget url becomes an
//! inline `VNode::Error`. Response-check failures grade as incorrect.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use flowdeck_evaluator::{grade, render_step, Registry, RenderContext};
//!
//! let registry = Registry::standard();
//! let tree = render_step(&session.effective_view(), &registry, &RenderContext::preview(&responses));
//! let outcome = grade(session.response_check(), &responses);
//! ```

pub mod content;
pub mod render;
pub mod response;
pub mod vdom;

pub use content::{
    encode_query, widget_url, ContentType, EditorInput, PropertySchema, Registry, RenderContext, RenderMode,
    ResponseProperty, ValueKind,
};
pub use render::render_step;
pub use response::{grade, CheckOutcome, EvalError, EvalResult, Interpreter, ResponseCheck, ResponseRecord, Value};
pub use vdom::VNode;
