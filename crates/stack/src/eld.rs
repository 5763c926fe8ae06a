//! Eventual leader detector.

use crate::Ctx;
use paxon_core::{Abstraction, Body, Message, Outbox};
use paxon_types::{Port, ProcessId};
use std::collections::BTreeSet;
use tracing::debug;

/// Monarchical leader election over the failure detector's output.
///
/// The non-suspected process with the highest rank is the trusted leader.
/// Provided at least one process is correct, the same correct process is
/// eventually trusted by every correct process. When every process is
/// suspected the previous leader is kept rather than withdrawn.
pub struct EventualLeaderDetector {
    ctx: Ctx,
    suspected: BTreeSet<Port>,
    leader: Option<ProcessId>,
}

impl EventualLeaderDetector {
    pub fn new(ctx: Ctx) -> Self {
        Self {
            ctx,
            suspected: BTreeSet::new(),
            leader: None,
        }
    }

    fn update(&mut self, out: &mut Outbox) {
        let Some(candidate) = self.ctx.membership.max_rank_excluding(&self.suspected) else {
            return;
        };
        let changed = self
            .leader
            .as_ref()
            .map_or(true, |leader| leader.rank != candidate.rank);
        if changed {
            let candidate = candidate.clone();
            debug!(
                system_id = %self.ctx.system_id,
                leader = %candidate,
                "trusted leader changed"
            );
            self.leader = Some(candidate.clone());
            out.trigger(Message::new(Body::EldTrust { process: candidate }));
        }
    }
}

impl Abstraction for EventualLeaderDetector {
    fn name(&self) -> &'static str {
        "eld"
    }

    fn on_register(&mut self, out: &mut Outbox) {
        self.update(out);
    }

    fn handle(&mut self, message: &Message, out: &mut Outbox) -> bool {
        match &message.body {
            Body::EpfdSuspect { process } => {
                if self.suspected.insert(process.port) {
                    self.update(out);
                }
                true
            }
            Body::EpfdRestore { process } => {
                self.suspected.remove(&process.port);
                self.update(out);
                true
            }
            _ => false,
        }
    }
}
