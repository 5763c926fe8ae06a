//! The layered consensus abstractions.
//!
//! A node hosts one stack per consensus instance. The layers, leaves
//! first:
//!
//! - [`PerfectLink`]: hands `PlSend` messages to the runner for delivery
//! - [`BestEffortBroadcast`]: fans a message out to the whole membership
//! - [`EventuallyPerfectFailureDetector`]: heartbeats with an adaptive
//!   timeout, producing suspect/restore events
//! - [`EventualLeaderDetector`]: trusts the highest-rank non-suspected
//!   process
//! - [`EpochChange`]: produces a monotonically increasing
//!   (timestamp, leader) sequence from leader changes
//! - [`EpochConsensus`]: one read/write agreement attempt per epoch, with
//!   state carry-over
//! - [`UniformConsensus`]: sequences epoch instances into a single
//!   decision
//! - [`Application`]: wires the stack from the hub's proposal and reports
//!   the decision back
//!
//! Dependencies flow upward: each layer triggers messages the next layer
//! consumes. The layers communicate only through the dispatcher's queue.

mod app;
mod beb;
mod ec;
mod eld;
mod ep;
mod epfd;
mod pl;
mod uc;

pub use app::Application;
pub use beb::BestEffortBroadcast;
pub use ec::EpochChange;
pub use eld::EventualLeaderDetector;
pub use ep::EpochConsensus;
pub use epfd::EventuallyPerfectFailureDetector;
pub use pl::PerfectLink;
pub use uc::UniformConsensus;

use paxon_core::{AbstractionId, Body, Message};
use paxon_types::{Membership, ProcessId, SystemId};
use std::sync::Arc;
use std::time::Duration;

/// Tunables for one consensus instance.
#[derive(Debug, Clone)]
pub struct StackConfig {
    /// Initial heartbeat period Δ of the failure detector. The detector
    /// grows its delay by this increment whenever a suspicion proves
    /// premature.
    pub delta: Duration,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            delta: Duration::from_millis(100),
        }
    }
}

/// Immutable per-instance context shared by the abstractions: which
/// instance this is, who participates, and which participant we are.
#[derive(Debug)]
pub struct InstanceCtx {
    pub system_id: SystemId,
    pub membership: Membership,
    pub own: ProcessId,
}

/// Shared context handle.
pub type Ctx = Arc<InstanceCtx>;

/// Wrap a message in a `PlSend` carrying the given routing tag.
fn pl_send(tag: AbstractionId, destination: ProcessId, message: Message) -> Message {
    Message::tagged(
        tag,
        Body::PlSend {
            destination,
            message: Box::new(message),
        },
    )
}

/// Wrap a message in a `BebBroadcast`.
fn beb_broadcast(message: Message) -> Message {
    Message::new(Body::BebBroadcast {
        message: Box::new(message),
    })
}

#[cfg(test)]
mod testing {
    use super::*;
    use paxon_types::Membership;

    /// Three processes, ranks 1/2/3 on ports 5011/5012/5013.
    pub fn membership3() -> Membership {
        Membership::new(vec![
            ProcessId::new("127.0.0.1", 5011, 1),
            ProcessId::new("127.0.0.1", 5012, 2),
            ProcessId::new("127.0.0.1", 5013, 3),
        ])
    }

    pub fn process(rank: u32) -> ProcessId {
        ProcessId::new("127.0.0.1", 5010 + rank as u16, rank)
    }

    pub fn ctx(own_rank: u32) -> Ctx {
        Arc::new(InstanceCtx {
            system_id: SystemId::from("sys-test"),
            membership: membership3(),
            own: process(own_rank),
        })
    }
}
