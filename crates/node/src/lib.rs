//! Production node with async I/O.
//!
//! This crate wraps the deterministic consensus stack with real I/O:
//!
//! - Framed TCP transport (4-byte big-endian length prefix + bincode
//!   body) for peer and hub traffic
//! - A listener task that routes inbound envelopes to the owning
//!   consensus instance by system id, creating instances on demand
//! - One tokio task per instance that owns its dispatcher, translates
//!   envelopes to `PlDeliver`, executes actions, and manages the
//!   heartbeat timer
//! - A hub client for registration and decision reporting
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Node                               │
//! │                                                              │
//! │  listener task:  accept → read frame → decode → route        │
//! │        │                                                     │
//! │        ▼ mpsc per instance                                   │
//! │  instance task:  translate → dispatcher sweep → actions      │
//! │        │                                                     │
//! │        ├── Send / SendToHub → short-lived connect-write task │
//! │        └── SetTimer → heartbeat timer task → EpfdTimeout     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Outbound send failures are logged and dropped; the layers above
//! retransmit through their own periodic logic (heartbeats, NACK
//! retries).

pub mod codec;
mod instance;
mod node;
pub mod telemetry;
mod timer;

pub use codec::{read_frame, write_frame, wrap_envelope, CodecError, MAX_FRAME_LEN};
pub use instance::InstanceHandle;
pub use node::{Node, NodeConfig, NodeError};
pub use telemetry::{init_telemetry, TelemetryConfig, TelemetryError};
pub use timer::HeartbeatTimer;
