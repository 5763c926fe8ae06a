//! Epoch consensus.

use crate::{beb_broadcast, pl_send, Ctx};
use paxon_core::{Abstraction, AbstractionId, Body, Message, Outbox};
use paxon_types::{EpState, Port, ProcessId, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

/// One read/write agreement attempt under a designated leader.
///
/// The leader first reads the `(valueTimestamp, value)` state of a quorum
/// and adopts the highest-timestamped defined value it sees, then writes
/// its proposal to everyone. A process that stores the write acknowledges
/// it; a quorum of acknowledgments lets the leader announce the decision.
///
/// An instance lives until it is aborted: it then reports its state for
/// the successor epoch to carry and halts, claiming nothing further. Only
/// messages originating from the instance's designated leader drive the
/// read/write/decided phases; a leader-only message from any other sender
/// is dropped.
pub struct EpochConsensus {
    ctx: Ctx,
    ets: u64,
    leader: ProcessId,
    state: EpState,
    tmp_val: Value,
    states: BTreeMap<Port, EpState>,
    accepted: BTreeSet<Port>,
    halted: bool,
}

impl EpochConsensus {
    pub fn new(ctx: Ctx, ets: u64, leader: ProcessId, state: EpState) -> Self {
        Self {
            ctx,
            ets,
            leader,
            state,
            tmp_val: Value::UNDEFINED,
            states: BTreeMap::new(),
            accepted: BTreeSet::new(),
            halted: false,
        }
    }

    pub fn ets(&self) -> u64 {
        self.ets
    }

    fn is_leader(&self) -> bool {
        self.ctx.own == self.leader
    }

    fn on_propose(&mut self, value: Value, out: &mut Outbox) {
        if !self.is_leader() {
            trace!(ets = self.ets, "proposal on a non-leader instance dropped");
            return;
        }
        self.tmp_val = value;
        out.trigger(beb_broadcast(Message::tagged(AbstractionId::Ep, Body::EpRead)));
    }

    fn on_read(&mut self, sender: &ProcessId, out: &mut Outbox) {
        if *sender != self.leader {
            trace!(ets = self.ets, sender = %sender, "read from non-leader dropped");
            return;
        }
        out.trigger(pl_send(
            AbstractionId::Ep,
            sender.clone(),
            Message::tagged(AbstractionId::Ep, Body::EpState { state: self.state }),
        ));
    }

    fn on_state(&mut self, sender: &ProcessId, state: EpState, out: &mut Outbox) {
        if !self.is_leader() {
            return;
        }
        self.states.insert(sender.port, state);
        if !self.ctx.membership.is_quorum(self.states.len()) {
            return;
        }
        let highest = self
            .states
            .values()
            .fold(None::<EpState>, |best, candidate| match best {
                Some(best) if best.value_timestamp >= candidate.value_timestamp => Some(best),
                _ => Some(*candidate),
            });
        if let Some(highest) = highest {
            if highest.value.defined {
                self.tmp_val = highest.value;
            }
        }
        self.states.clear();
        debug!(
            system_id = %self.ctx.system_id,
            ets = self.ets,
            value = %self.tmp_val,
            "read quorum complete, writing"
        );
        out.trigger(beb_broadcast(Message::tagged(
            AbstractionId::Ep,
            Body::EpWrite { value: self.tmp_val },
        )));
    }

    fn on_write(&mut self, sender: &ProcessId, value: Value, out: &mut Outbox) {
        if *sender != self.leader {
            trace!(ets = self.ets, sender = %sender, "write from non-leader dropped");
            return;
        }
        self.state = EpState::new(self.ets, value);
        out.trigger(pl_send(
            AbstractionId::Ep,
            sender.clone(),
            Message::tagged(AbstractionId::Ep, Body::EpAccept),
        ));
    }

    fn on_accept(&mut self, sender: &ProcessId, out: &mut Outbox) {
        if !self.is_leader() {
            return;
        }
        self.accepted.insert(sender.port);
        if !self.ctx.membership.is_quorum(self.accepted.len()) {
            return;
        }
        self.accepted.clear();
        debug!(
            system_id = %self.ctx.system_id,
            ets = self.ets,
            value = %self.tmp_val,
            "write quorum complete, deciding"
        );
        out.trigger(beb_broadcast(Message::tagged(
            AbstractionId::Ep,
            Body::EpDecided { value: self.tmp_val },
        )));
    }

    fn on_decided(&mut self, sender: &ProcessId, value: Value, out: &mut Outbox) {
        if *sender != self.leader {
            trace!(ets = self.ets, sender = %sender, "decision from non-leader dropped");
            return;
        }
        out.trigger(Message::tagged(
            AbstractionId::Ep,
            Body::EpDecide {
                ets: self.ets,
                value,
            },
        ));
    }

    fn on_abort(&mut self, out: &mut Outbox) {
        out.trigger(Message::tagged(
            AbstractionId::Ep,
            Body::EpAborted {
                ets: self.ets,
                state: self.state,
            },
        ));
        self.halted = true;
    }
}

impl Abstraction for EpochConsensus {
    fn name(&self) -> &'static str {
        "ep"
    }

    fn handle(&mut self, message: &Message, out: &mut Outbox) -> bool {
        if self.halted {
            return false;
        }
        match &message.body {
            Body::EpPropose { value } => {
                self.on_propose(*value, out);
                true
            }
            Body::BebDeliver {
                sender,
                message: inner,
            } => match &inner.body {
                Body::EpRead => {
                    self.on_read(sender, out);
                    true
                }
                Body::EpWrite { value } => {
                    self.on_write(sender, *value, out);
                    true
                }
                Body::EpDecided { value } => {
                    self.on_decided(sender, *value, out);
                    true
                }
                _ => false,
            },
            Body::PlDeliver {
                sender,
                message: inner,
            } => match &inner.body {
                Body::EpState { state } => {
                    self.on_state(sender, *state, out);
                    true
                }
                Body::EpAccept => {
                    self.on_accept(sender, out);
                    true
                }
                _ => false,
            },
            Body::EpAbort => {
                self.on_abort(out);
                true
            }
            _ => false,
        }
    }

    // The dispatcher sweeps the abort's `EpAborted` to uniform consensus
    // before this instance is collected, so the successor is installed by
    // the time the halted instance disappears.
    fn defunct(&self) -> bool {
        self.halted
    }
}
