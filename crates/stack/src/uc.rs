//! Uniform consensus.

use crate::{Ctx, EpochConsensus};
use paxon_core::{Abstraction, AbstractionId, Body, Message, Outbox};
use paxon_types::{EpState, ProcessId, Value};
use tracing::{debug, info};

/// Leader-driven consensus over a well-formed sequence of epochs.
///
/// Runs one epoch consensus instance at a time. On an epoch change it
/// aborts the running instance, takes its reported state, and starts the
/// successor with that state so any value a previous leader managed to
/// write survives. The process decides the first value an epoch decides
/// and keeps participating afterwards to help the others.
///
/// Only messages tagged with the current epoch timestamp advance state;
/// `EpAborted` and `EpDecide` for any other epoch are left unclaimed and
/// thereby inert.
pub struct UniformConsensus {
    ctx: Ctx,
    val: Value,
    proposed: bool,
    decided: bool,
    ets: u64,
    leader: ProcessId,
    new_ts: u64,
    new_leader: Option<ProcessId>,
}

impl UniformConsensus {
    pub fn new(ctx: Ctx) -> Self {
        let leader = ctx
            .membership
            .min_rank()
            .cloned()
            .unwrap_or_else(|| ctx.own.clone());
        Self {
            ctx,
            val: Value::UNDEFINED,
            proposed: false,
            decided: false,
            ets: 0,
            leader,
            new_ts: 0,
            new_leader: None,
        }
    }

    fn maybe_propose(&mut self, out: &mut Outbox) {
        if self.leader == self.ctx.own && self.val.defined && !self.proposed {
            self.proposed = true;
            out.trigger(Message::tagged(
                AbstractionId::Uc,
                Body::EpPropose { value: self.val },
            ));
        }
    }
}

impl Abstraction for UniformConsensus {
    fn name(&self) -> &'static str {
        "uc"
    }

    fn on_register(&mut self, out: &mut Outbox) {
        // The initial epoch: timestamp 0, led by the minimum rank, empty
        // state.
        out.register(Box::new(EpochConsensus::new(
            self.ctx.clone(),
            self.ets,
            self.leader.clone(),
            EpState::default(),
        )));
    }

    fn handle(&mut self, message: &Message, out: &mut Outbox) -> bool {
        match &message.body {
            Body::UcPropose { value } => {
                self.val = *value;
                self.maybe_propose(out);
                true
            }
            Body::EcStartEpoch {
                new_timestamp,
                new_leader,
            } => {
                self.new_ts = *new_timestamp;
                self.new_leader = Some(new_leader.clone());
                out.trigger(Message::tagged(AbstractionId::Uc, Body::EpAbort));
                true
            }
            Body::EpAborted { ets, state } => {
                if *ets != self.ets {
                    return false;
                }
                let Some(new_leader) = self.new_leader.clone() else {
                    return true;
                };
                self.ets = self.new_ts;
                self.leader = new_leader;
                self.proposed = false;
                debug!(
                    system_id = %self.ctx.system_id,
                    ets = self.ets,
                    leader = %self.leader,
                    carried_ts = state.value_timestamp,
                    "starting next epoch"
                );
                out.register(Box::new(EpochConsensus::new(
                    self.ctx.clone(),
                    self.ets,
                    self.leader.clone(),
                    *state,
                )));
                self.maybe_propose(out);
                true
            }
            Body::EpDecide { ets, value } => {
                if *ets != self.ets {
                    return false;
                }
                if !self.decided {
                    self.decided = true;
                    info!(
                        system_id = %self.ctx.system_id,
                        ets = self.ets,
                        value = %value,
                        "decided"
                    );
                    out.trigger(Message::tagged(
                        AbstractionId::Uc,
                        Body::UcDecide { value: *value },
                    ));
                }
                true
            }
            _ => false,
        }
    }
}
