//! Message types for the consensus stack.

use paxon_types::{EpState, ProcessId, SystemId, Value};
use serde::{Deserialize, Serialize};

/// Routing hint naming the abstraction a message belongs to.
///
/// Best-effort broadcast claims a `PlDeliver` only when the envelope is
/// tagged [`AbstractionId::Beb`]; everywhere else the tag is carried for
/// observability and message types disambiguate on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbstractionId {
    App,
    Beb,
    Ec,
    Eld,
    Ep,
    Epfd,
    Pl,
    Uc,
}

impl AbstractionId {
    pub fn as_str(&self) -> &'static str {
        match self {
            AbstractionId::App => "app",
            AbstractionId::Beb => "beb",
            AbstractionId::Ec => "ec",
            AbstractionId::Eld => "eld",
            AbstractionId::Ep => "ep",
            AbstractionId::Epfd => "epfd",
            AbstractionId::Pl => "pl",
            AbstractionId::Uc => "uc",
        }
    }
}

/// One message, internal or wire-visible.
///
/// Every message optionally carries the instance it belongs to and the
/// abstraction that produced it. The dispatcher stamps the system id on
/// everything it enqueues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub system_id: Option<SystemId>,
    pub abstraction: Option<AbstractionId>,
    pub body: Body,
}

impl Message {
    pub fn new(body: Body) -> Self {
        Self {
            system_id: None,
            abstraction: None,
            body,
        }
    }

    pub fn tagged(abstraction: AbstractionId, body: Body) -> Self {
        Self {
            system_id: None,
            abstraction: Some(abstraction),
            body,
        }
    }

    pub fn with_system(mut self, system_id: SystemId) -> Self {
        self.system_id = Some(system_id);
        self
    }

    /// Get the message type name for telemetry.
    pub fn type_name(&self) -> &'static str {
        match &self.body {
            Body::Network { .. } => "NetworkMessage",
            Body::AppRegistration { .. } => "AppRegistration",
            Body::AppPropose { .. } => "AppPropose",
            Body::AppDecide { .. } => "AppDecide",
            Body::UcPropose { .. } => "UcPropose",
            Body::UcDecide { .. } => "UcDecide",
            Body::EcNewEpoch { .. } => "EcNewEpoch",
            Body::EcNack => "EcNack",
            Body::EcStartEpoch { .. } => "EcStartEpoch",
            Body::EpPropose { .. } => "EpPropose",
            Body::EpRead => "EpRead",
            Body::EpState { .. } => "EpState",
            Body::EpWrite { .. } => "EpWrite",
            Body::EpAccept => "EpAccept",
            Body::EpDecided { .. } => "EpDecided",
            Body::EpDecide { .. } => "EpDecide",
            Body::EpAbort => "EpAbort",
            Body::EpAborted { .. } => "EpAborted",
            Body::BebBroadcast { .. } => "BebBroadcast",
            Body::BebDeliver { .. } => "BebDeliver",
            Body::PlSend { .. } => "PlSend",
            Body::PlDeliver { .. } => "PlDeliver",
            Body::EldTrust { .. } => "EldTrust",
            Body::EpfdTimeout => "EpfdTimeout",
            Body::EpfdHeartbeatRequest => "EpfdHeartbeatRequest",
            Body::EpfdHeartbeatReply => "EpfdHeartbeatReply",
            Body::EpfdSuspect { .. } => "EpfdSuspect",
            Body::EpfdRestore { .. } => "EpfdRestore",
        }
    }
}

/// The complete recognized set of message payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Body {
    // ═══════════════════════════════════════════════════════════════════
    // Wire envelope and hub traffic
    // ═══════════════════════════════════════════════════════════════════
    /// Outer envelope of every TCP payload. The receiver resolves the
    /// sender to a `ProcessId` through the membership list by
    /// `sender_listening_port`.
    Network {
        message: Box<Message>,
        /// Empty for local sends.
        sender_host: String,
        sender_listening_port: u16,
    },

    /// Sent to the hub at node startup.
    AppRegistration { owner: String, index: u32 },

    /// Hub → node: membership and the value this node proposes.
    AppPropose {
        processes: Vec<ProcessId>,
        value: Value,
    },

    /// Node → hub: the decided value for this instance.
    AppDecide { value: Value },

    // ═══════════════════════════════════════════════════════════════════
    // Uniform consensus
    // ═══════════════════════════════════════════════════════════════════
    UcPropose { value: Value },
    UcDecide { value: Value },

    // ═══════════════════════════════════════════════════════════════════
    // Epoch change
    // ═══════════════════════════════════════════════════════════════════
    EcNewEpoch { timestamp: u64 },
    EcNack,
    EcStartEpoch {
        new_timestamp: u64,
        new_leader: ProcessId,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Epoch consensus
    // ═══════════════════════════════════════════════════════════════════
    EpPropose { value: Value },
    EpRead,
    EpState { state: EpState },
    EpWrite { value: Value },
    EpAccept,
    EpDecided { value: Value },
    EpDecide { ets: u64, value: Value },
    EpAbort,
    EpAborted { ets: u64, state: EpState },

    // ═══════════════════════════════════════════════════════════════════
    // Broadcast and links
    // ═══════════════════════════════════════════════════════════════════
    BebBroadcast { message: Box<Message> },
    BebDeliver {
        sender: ProcessId,
        message: Box<Message>,
    },
    PlSend {
        destination: ProcessId,
        message: Box<Message>,
    },
    PlDeliver {
        sender: ProcessId,
        message: Box<Message>,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Failure detection and leader election
    // ═══════════════════════════════════════════════════════════════════
    EldTrust { process: ProcessId },
    EpfdTimeout,
    EpfdHeartbeatRequest,
    EpfdHeartbeatReply,
    EpfdSuspect { process: ProcessId },
    EpfdRestore { process: ProcessId },
}
