//! Domain models for taskctl.
//!
//! # Core Concepts
//!
//! - [`Epic`]: A unit of work decomposed into tasks. Never deleted.
//! - [`Task`]: The smallest trackable unit, owned by one epic, optionally
//!   blocked on other tasks through its `depends_on` list.
//! - [`ReviewReceipt`]: Append-only verdict record gating a task's completion.
//! - [`MemoryEntry`]: Categorized free-text note, independent of the task graph.
//!
//! Ids carry ownership: a [`TaskId`] embeds its parent [`EpicId`].

mod epic;
mod id;
mod memory;
mod review;
mod task;

pub use epic::*;
pub use id::*;
pub use memory::*;
pub use review::*;
pub use task::*;

use serde::Serialize;

/// A record of either kind, as returned by [`crate::store::Store::get`].
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Entity {
    Epic(Epic),
    Task(Task),
}
