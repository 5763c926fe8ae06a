//! Epoch change.

use crate::{beb_broadcast, pl_send, Ctx};
use paxon_core::{Abstraction, AbstractionId, Body, Message, Outbox};
use paxon_types::ProcessId;
use tracing::debug;

/// Signals the start of a new epoch whenever the leader changes.
///
/// Every process keeps `last_ts` (the last epoch it started) and `ts`
/// (the last epoch it attempted to start as leader, initially its own
/// rank). A process that becomes trusted adds `N` to `ts` and broadcasts
/// `EC_NEW_EPOCH`; receivers accept it when it comes from their trusted
/// leader with a timestamp above `last_ts`, and answer `EC_NACK`
/// otherwise. A NACKed leader that is still trusted bumps `ts` by `N`
/// and retries. The `ts += N` rule keeps timestamps from distinct
/// leaders disjoint, so every accepted `(timestamp, leader)` pair is
/// strictly newer than the previous one.
pub struct EpochChange {
    ctx: Ctx,
    last_ts: u64,
    ts: u64,
    trusted: ProcessId,
}

impl EpochChange {
    pub fn new(ctx: Ctx) -> Self {
        let trusted = ctx
            .membership
            .min_rank()
            .cloned()
            .unwrap_or_else(|| ctx.own.clone());
        let ts = ctx.own.rank as u64;
        Self {
            ctx,
            last_ts: 0,
            ts,
            trusted,
        }
    }

    fn broadcast_new_epoch(&mut self, out: &mut Outbox) {
        self.ts += self.ctx.membership.len() as u64;
        debug!(
            system_id = %self.ctx.system_id,
            ts = self.ts,
            "announcing new epoch"
        );
        out.trigger(beb_broadcast(Message::tagged(
            AbstractionId::Ec,
            Body::EcNewEpoch { timestamp: self.ts },
        )));
    }
}

impl Abstraction for EpochChange {
    fn name(&self) -> &'static str {
        "ec"
    }

    fn handle(&mut self, message: &Message, out: &mut Outbox) -> bool {
        match &message.body {
            Body::EldTrust { process } => {
                self.trusted = process.clone();
                if *process == self.ctx.own {
                    self.broadcast_new_epoch(out);
                }
                true
            }
            Body::BebDeliver {
                sender,
                message: inner,
            } => {
                let Body::EcNewEpoch { timestamp } = inner.body else {
                    return false;
                };
                if *sender == self.trusted && timestamp > self.last_ts {
                    self.last_ts = timestamp;
                    out.trigger(Message::tagged(
                        AbstractionId::Ec,
                        Body::EcStartEpoch {
                            new_timestamp: timestamp,
                            new_leader: sender.clone(),
                        },
                    ));
                } else {
                    out.trigger(pl_send(
                        AbstractionId::Ec,
                        sender.clone(),
                        Message::tagged(AbstractionId::Ec, Body::EcNack),
                    ));
                }
                true
            }
            Body::PlDeliver { message: inner, .. } => {
                if !matches!(inner.body, Body::EcNack) {
                    return false;
                }
                if self.trusted == self.ctx.own {
                    self.broadcast_new_epoch(out);
                }
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ctx, process};

    fn deliver_new_epoch(ec: &mut EpochChange, from_rank: u32, timestamp: u64) -> Outbox {
        let mut out = Outbox::default();
        let message = Message::new(Body::BebDeliver {
            sender: process(from_rank),
            message: Box::new(Message::tagged(
                AbstractionId::Ec,
                Body::EcNewEpoch { timestamp },
            )),
        });
        assert!(ec.handle(&message, &mut out));
        out
    }

    fn trust(ec: &mut EpochChange, rank: u32) -> Outbox {
        let mut out = Outbox::default();
        assert!(ec.handle(
            &Message::new(Body::EldTrust {
                process: process(rank)
            }),
            &mut out,
        ));
        out
    }

    fn started_epochs(out: &Outbox) -> Vec<(u64, u16)> {
        out.messages()
            .iter()
            .filter_map(|m| match &m.body {
                Body::EcStartEpoch {
                    new_timestamp,
                    new_leader,
                } => Some((*new_timestamp, new_leader.port)),
                _ => None,
            })
            .collect()
    }

    fn broadcast_timestamp(out: &Outbox) -> Option<u64> {
        out.messages().iter().find_map(|m| match &m.body {
            Body::BebBroadcast { message } => match message.body {
                Body::EcNewEpoch { timestamp } => Some(timestamp),
                _ => None,
            },
            _ => None,
        })
    }

    fn nacked(out: &Outbox) -> Vec<u16> {
        out.messages()
            .iter()
            .filter_map(|m| match &m.body {
                Body::PlSend {
                    destination,
                    message,
                } if matches!(message.body, Body::EcNack) => Some(destination.port),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_self_trust_starts_an_epoch_above_every_rank() {
        let mut ec = EpochChange::new(ctx(3));
        let out = trust(&mut ec, 3);
        // Own rank 3 plus N = 3.
        assert_eq!(broadcast_timestamp(&out), Some(6));
    }

    #[test]
    fn test_foreign_trust_broadcasts_nothing() {
        let mut ec = EpochChange::new(ctx(1));
        let out = trust(&mut ec, 3);
        assert!(broadcast_timestamp(&out).is_none());
    }

    #[test]
    fn test_accepted_timestamps_are_strictly_increasing() {
        let mut ec = EpochChange::new(ctx(1));
        trust(&mut ec, 3);

        let out = deliver_new_epoch(&mut ec, 3, 6);
        assert_eq!(started_epochs(&out), vec![(6, 5013)]);

        // A replay or an older announcement from the same leader is
        // refused.
        let out = deliver_new_epoch(&mut ec, 3, 6);
        assert_eq!(nacked(&out), vec![5013]);
        let out = deliver_new_epoch(&mut ec, 3, 3);
        assert_eq!(nacked(&out), vec![5013]);

        let out = deliver_new_epoch(&mut ec, 3, 9);
        assert_eq!(started_epochs(&out), vec![(9, 5013)]);
    }

    #[test]
    fn test_untrusted_sender_is_nacked() {
        let mut ec = EpochChange::new(ctx(1));
        trust(&mut ec, 3);

        let out = deliver_new_epoch(&mut ec, 2, 5);
        assert!(started_epochs(&out).is_empty());
        assert_eq!(nacked(&out), vec![5012]);
    }

    #[test]
    fn test_nack_retries_with_a_higher_timestamp() {
        let mut ec = EpochChange::new(ctx(2));
        let out = trust(&mut ec, 2);
        assert_eq!(broadcast_timestamp(&out), Some(5));

        let mut out = Outbox::default();
        let nack = Message::new(Body::PlDeliver {
            sender: process(1),
            message: Box::new(Message::tagged(AbstractionId::Ec, Body::EcNack)),
        });
        assert!(ec.handle(&nack, &mut out));
        assert_eq!(broadcast_timestamp(&out), Some(8));
    }

    #[test]
    fn test_nack_after_losing_trust_is_inert() {
        let mut ec = EpochChange::new(ctx(2));
        trust(&mut ec, 2);
        trust(&mut ec, 3);

        let mut out = Outbox::default();
        let nack = Message::new(Body::PlDeliver {
            sender: process(1),
            message: Box::new(Message::tagged(AbstractionId::Ec, Body::EcNack)),
        });
        assert!(ec.handle(&nack, &mut out));
        assert!(broadcast_timestamp(&out).is_none());
    }
}
