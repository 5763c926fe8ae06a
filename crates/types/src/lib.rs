//! Foundation types for the paxon consensus stack.
//!
//! This crate provides the types shared by every layer of the
//! implementation:
//!
//! - **Identity**: [`ProcessId`], [`SystemId`], and the [`Port`]/[`Rank`]
//!   aliases
//! - **Consensus values**: [`Value`] and the per-epoch [`EpState`]
//! - **Group structure**: [`Membership`] with quorum and rank arithmetic
//!
//! It is self-contained and does not depend on any other workspace crate,
//! making it the foundation layer.

mod membership;
mod process;
mod value;

pub use membership::Membership;
pub use process::{Port, ProcessId, Rank, SystemId};
pub use value::{EpState, Value};
