//! Core model for the paxon consensus stack.
//!
//! This crate provides the pieces every layer is built from:
//!
//! - [`Message`]: all internal and wire-visible messages, as a closed
//!   tagged union with optional system-id and abstraction-id tags
//! - [`Action`]: all possible outputs a stack can hand to its runner
//! - [`Abstraction`]: the capability interface every layer implements
//! - [`Dispatcher`]: the per-instance FIFO queue and registry that drives
//!   the abstractions
//!
//! # Architecture
//!
//! ```text
//! Messages → Dispatcher::step() → first claiming Abstraction → Outbox
//!                                                     │
//!                          triggered messages ────────┤→ back into the queue
//!                          registrations ─────────────┤→ into the registry
//!                          actions ───────────────────┘→ executed by the runner
//! ```
//!
//! Abstractions are:
//! - **Synchronous**: no async, no blocking
//! - **Deterministic**: same state + message = same outputs
//! - **Isolated**: each owns its private state; the only communication
//!   channel between abstractions is the message queue
//!
//! All I/O (sockets, timers, the hub connection) is performed by the
//! runner that executes the returned actions.

mod action;
mod dispatcher;
mod message;

pub use action::{Action, TimerId};
pub use dispatcher::{Abstraction, Dispatcher, Outbox};
pub use message::{AbstractionId, Body, Message};
