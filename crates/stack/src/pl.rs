//! Perfect point-to-point link.

use paxon_core::{Abstraction, Action, Body, Message, Outbox};

/// Hands every `PlSend` to the runner for delivery.
///
/// The network layer on the receiving side produces the matching
/// `PlDeliver` into the destination instance's queue. Send failures are
/// logged by the runner and never propagated; retransmission is the
/// business of the layers above (heartbeats, NACK retries).
pub struct PerfectLink;

impl Abstraction for PerfectLink {
    fn name(&self) -> &'static str {
        "pl"
    }

    fn handle(&mut self, message: &Message, out: &mut Outbox) -> bool {
        if let Body::PlSend {
            destination,
            message: inner,
        } = &message.body
        {
            out.act(Action::Send {
                destination: destination.clone(),
                message: (**inner).clone(),
                abstraction: message.abstraction,
            });
            return true;
        }
        false
    }
}
