//! # Flowdeck Workspace
//!
//! Binds an editing session to an external document store.
//!
//! ## Architecture
//!
//! ```text
//! DocumentStore ──read──> loader ──> EditSession ──edits──> Workspace
//!       ^                                                      │
//!       └──────write────── SyncScheduler <──snapshot(slices)───┘
//! ```
//!
//! - **Store**: an async trait addressed by fully-qualified paths, with
//!   partial-merge writes. [`MemoryStore`] backs tests and local hosts.
//! - **Scheduler**: diffs each slice against what the store last accepted,
//!   writes immediately, coalesces while a write is in flight, and drops
//!   completions that belong to a step the author already left.
//! - **Query sync**: debounces embedded-widget query strings.
//!
//! Persistence never blocks editing. A failed write is retried on the next
//! state transition.

pub mod loader;
pub mod query_sync;
pub mod scheduler;
pub mod slices;
pub mod store;
mod workspace;

pub use loader::load_session;
pub use query_sync::QuerySync;
pub use scheduler::{ScheduleOutcome, SyncError, SyncPhase, SyncScheduler, WriteComplete};
pub use slices::{snapshot, Slice, SyncTarget};
pub use store::{DocPath, DocumentStore, Fields, MemoryStore, StoreCall, StoreError};
pub use workspace::{NavigationPolicy, Workspace};
