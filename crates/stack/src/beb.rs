//! Best-effort broadcast.

use crate::{pl_send, Ctx};
use paxon_core::{Abstraction, AbstractionId, Body, Message, Outbox};

/// Sends a message to every process in the membership, including the
/// local one, over the perfect link.
///
/// Outgoing `PlSend`s are tagged `beb` so the receiving side can tell a
/// broadcast delivery apart from a direct one; only `beb`-tagged
/// `PlDeliver`s are claimed here and re-emitted as `BebDeliver`.
pub struct BestEffortBroadcast {
    ctx: Ctx,
}

impl BestEffortBroadcast {
    pub fn new(ctx: Ctx) -> Self {
        Self { ctx }
    }
}

impl Abstraction for BestEffortBroadcast {
    fn name(&self) -> &'static str {
        "beb"
    }

    fn handle(&mut self, message: &Message, out: &mut Outbox) -> bool {
        match &message.body {
            Body::BebBroadcast { message: inner } => {
                for process in self.ctx.membership.iter() {
                    out.trigger(pl_send(
                        AbstractionId::Beb,
                        process.clone(),
                        (**inner).clone(),
                    ));
                }
                true
            }
            Body::PlDeliver {
                sender,
                message: inner,
            } if message.abstraction == Some(AbstractionId::Beb) => {
                out.trigger(Message::tagged(
                    AbstractionId::Beb,
                    Body::BebDeliver {
                        sender: sender.clone(),
                        message: inner.clone(),
                    },
                ));
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

    #[test]
    fn test_broadcast_fans_out_to_everyone_including_self() {
        let mut beb = BestEffortBroadcast::new(ctx(1));
        let mut out = Outbox::default();

        let broadcast = Message::new(Body::BebBroadcast {
            message: Box::new(Message::new(Body::EpRead)),
        });
        assert!(beb.handle(&broadcast, &mut out));

        let mut ports: Vec<u16> = out
            .messages()
            .iter()
            .map(|m| match &m.body {
                Body::PlSend { destination, .. } => {
                    assert_eq!(m.abstraction, Some(AbstractionId::Beb));
                    destination.port
                }
                other => panic!("expected PlSend, got {other:?}"),
            })
            .collect();
        ports.sort_unstable();
        assert_eq!(ports, vec![5011, 5012, 5013]);
    }

    #[test]
    fn test_tagged_delivery_is_reemitted() {
        let mut beb = BestEffortBroadcast::new(ctx(1));
        let mut out = Outbox::default();

        let delivery = Message::tagged(
            AbstractionId::Beb,
            Body::PlDeliver {
                sender: process(2),
                message: Box::new(Message::new(Body::EpRead)),
            },
        );
        assert!(beb.handle(&delivery, &mut out));

        match &out.messages()[0].body {
            Body::BebDeliver { sender, message } => {
                assert_eq!(sender.port, 5012);
                assert!(matches!(message.body, Body::EpRead));
            }
            other => panic!("expected BebDeliver, got {other:?}"),
        }
    }

    #[test]
    fn test_untagged_delivery_falls_through() {
        let mut beb = BestEffortBroadcast::new(ctx(1));
        let mut out = Outbox::default();

        let delivery = Message::new(Body::PlDeliver {
            sender: process(2),
            message: Box::new(Message::new(Body::EcNack)),
        });
        assert!(!beb.handle(&delivery, &mut out));
        assert!(out.is_empty());
    }
}
