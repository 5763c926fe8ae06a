//! Actions returned by the stack for the runner to execute.

use crate::{AbstractionId, Message};
use paxon_types::ProcessId;
use std::time::Duration;

/// Type alias for timer identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// The failure detector's adaptive heartbeat timer.
    Heartbeat,
}

/// All possible outputs from a consensus instance.
///
/// Actions are **requests for I/O**: the stack never touches a socket or
/// a clock itself. The production runner executes them against real TCP
/// and tokio timers; the simulation runner executes them against the
/// in-memory network and virtual clock.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Send a message to a peer process.
    ///
    /// `abstraction` is the routing tag the wire envelope carries; it is
    /// taken from the `PlSend` wrapper the message travelled in.
    Send {
        destination: ProcessId,
        message: Message,
        abstraction: Option<AbstractionId>,
    },

    /// Send a message to the hub.
    SendToHub { message: Message },

    /// (Re)arm a timer. An existing timer with the same id is replaced.
    SetTimer { id: TimerId, duration: Duration },
}

impl Action {
    /// Get the action type name for telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::Send { .. } => "Send",
            Action::SendToHub { .. } => "SendToHub",
            Action::SetTimer { .. } => "SetTimer",
        }
    }
}
