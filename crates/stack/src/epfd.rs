//! Eventually perfect failure detector.

use crate::{pl_send, Ctx};
use paxon_core::{Abstraction, AbstractionId, Action, Body, Message, Outbox, TimerId};
use paxon_types::Port;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;

/// Heartbeat-based failure detector with an adaptive timeout.
///
/// Every `delay`, the detector compares who replied since the last round
/// against who it currently suspects. A process that went quiet is
/// suspected; a suspected process that replied is restored, and the round
/// delay grows by Δ since the previous suspicion was evidently premature.
/// Detection may be wrong for an arbitrary prefix of the run, but once
/// the delay exceeds the real communication bound it becomes accurate.
///
/// The timer callback never touches this state: the runner enqueues an
/// `EpfdTimeout` marker and the dispatcher thread performs the round, so
/// every transition is serialized with network-driven events.
pub struct EventuallyPerfectFailureDetector {
    ctx: Ctx,
    delta: Duration,
    delay: Duration,
    alive: BTreeSet<Port>,
    suspected: BTreeSet<Port>,
}

impl EventuallyPerfectFailureDetector {
    pub fn new(ctx: Ctx, delta: Duration) -> Self {
        let alive = ctx.membership.iter().map(|p| p.port).collect();
        Self {
            ctx,
            delta,
            delay: delta,
            alive,
            suspected: BTreeSet::new(),
        }
    }

    /// Current round delay. Grows monotonically, by Δ per premature
    /// suspicion.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    fn on_timeout(&mut self, out: &mut Outbox) {
        if !self.alive.is_disjoint(&self.suspected) {
            self.delay += self.delta;
            debug!(
                system_id = %self.ctx.system_id,
                delay_ms = self.delay.as_millis() as u64,
                "premature suspicion, timeout increased"
            );
        }
        for process in self.ctx.membership.iter() {
            let is_alive = self.alive.contains(&process.port);
            let is_suspected = self.suspected.contains(&process.port);
            if !is_alive && !is_suspected {
                self.suspected.insert(process.port);
                out.trigger(Message::new(Body::EpfdSuspect {
                    process: process.clone(),
                }));
            } else if is_alive && is_suspected {
                self.suspected.remove(&process.port);
                out.trigger(Message::new(Body::EpfdRestore {
                    process: process.clone(),
                }));
            }
            out.trigger(pl_send(
                AbstractionId::Epfd,
                process.clone(),
                Message::new(Body::EpfdHeartbeatRequest),
            ));
        }
        self.alive.clear();
        out.act(Action::SetTimer {
            id: TimerId::Heartbeat,
            duration: self.delay,
        });
    }
}

impl Abstraction for EventuallyPerfectFailureDetector {
    fn name(&self) -> &'static str {
        "epfd"
    }

    fn on_register(&mut self, out: &mut Outbox) {
        out.act(Action::SetTimer {
            id: TimerId::Heartbeat,
            duration: self.delay,
        });
    }

    fn handle(&mut self, message: &Message, out: &mut Outbox) -> bool {
        match &message.body {
            Body::EpfdTimeout => {
                self.on_timeout(out);
                true
            }
            Body::PlDeliver {
                sender,
                message: inner,
            } => match inner.body {
                Body::EpfdHeartbeatRequest => {
                    out.trigger(pl_send(
                        AbstractionId::Epfd,
                        sender.clone(),
                        Message::new(Body::EpfdHeartbeatReply),
                    ));
                    true
                }
                Body::EpfdHeartbeatReply => {
                    self.alive.insert(sender.port);
                    true
                }
                _ => false,
            },
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ctx, process};

    const DELTA: Duration = Duration::from_millis(100);

    fn detector() -> EventuallyPerfectFailureDetector {
        EventuallyPerfectFailureDetector::new(ctx(1), DELTA)
    }

    fn deliver_reply(epfd: &mut EventuallyPerfectFailureDetector, rank: u32, out: &mut Outbox) {
        let message = Message::new(Body::PlDeliver {
            sender: process(rank),
            message: Box::new(Message::new(Body::EpfdHeartbeatReply)),
        });
        assert!(epfd.handle(&message, out));
    }

    fn timeout(epfd: &mut EventuallyPerfectFailureDetector) -> Outbox {
        let mut out = Outbox::default();
        assert!(epfd.handle(&Message::new(Body::EpfdTimeout), &mut out));
        out
    }

    fn suspects(out: &Outbox) -> Vec<u16> {
        out.messages()
            .iter()
            .filter_map(|m| match &m.body {
                Body::EpfdSuspect { process } => Some(process.port),
                _ => None,
            })
            .collect()
    }

    fn restores(out: &Outbox) -> Vec<u16> {
        out.messages()
            .iter()
            .filter_map(|m| match &m.body {
                Body::EpfdRestore { process } => Some(process.port),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_registration_arms_the_timer() {
        let mut epfd = detector();
        let mut out = Outbox::default();
        epfd.on_register(&mut out);
        assert!(matches!(
            out.actions()[0],
            Action::SetTimer {
                id: TimerId::Heartbeat,
                duration
            } if duration == DELTA
        ));
    }

    #[test]
    fn test_first_round_requests_heartbeats_without_suspecting() {
        let mut epfd = detector();
        let out = timeout(&mut epfd);

        assert!(suspects(&out).is_empty());
        let requests = out
            .messages()
            .iter()
            .filter(|m| matches!(&m.body, Body::PlSend { message, .. }
                if matches!(message.body, Body::EpfdHeartbeatRequest)))
            .count();
        assert_eq!(requests, 3);
        // Round ends by rescheduling itself.
        assert!(matches!(out.actions()[0], Action::SetTimer { .. }));
    }

    #[test]
    fn test_silent_process_is_suspected() {
        let mut epfd = detector();
        timeout(&mut epfd);

        // Only ranks 1 and 2 reply; rank 3 stays silent.
        let mut out = Outbox::default();
        deliver_reply(&mut epfd, 1, &mut out);
        deliver_reply(&mut epfd, 2, &mut out);

        let out = timeout(&mut epfd);
        assert_eq!(suspects(&out), vec![5013]);
        assert_eq!(epfd.delay(), DELTA);
    }

    #[test]
    fn test_restore_grows_the_delay() {
        let mut epfd = detector();
        timeout(&mut epfd);

        // Rank 3 misses a round and is suspected.
        let mut out = Outbox::default();
        deliver_reply(&mut epfd, 1, &mut out);
        deliver_reply(&mut epfd, 2, &mut out);
        timeout(&mut epfd);

        // Rank 3 replies again: restored, and the delay adapts.
        let mut out = Outbox::default();
        deliver_reply(&mut epfd, 1, &mut out);
        deliver_reply(&mut epfd, 2, &mut out);
        deliver_reply(&mut epfd, 3, &mut out);

        let out = timeout(&mut epfd);
        assert_eq!(restores(&out), vec![5013]);
        assert_eq!(epfd.delay(), DELTA * 2);
    }

    #[test]
    fn test_oscillating_process_keeps_growing_the_delay() {
        let mut epfd = detector();
        timeout(&mut epfd);

        for round in 1..=3u32 {
            // Silent round: suspected.
            let mut out = Outbox::default();
            deliver_reply(&mut epfd, 1, &mut out);
            deliver_reply(&mut epfd, 2, &mut out);
            timeout(&mut epfd);

            // Reply round: restored, delay grows.
            let mut out = Outbox::default();
            deliver_reply(&mut epfd, 1, &mut out);
            deliver_reply(&mut epfd, 2, &mut out);
            deliver_reply(&mut epfd, 3, &mut out);
            timeout(&mut epfd);

            assert_eq!(epfd.delay(), DELTA + DELTA * round);
        }
    }

    #[test]
    fn test_heartbeat_request_is_answered() {
        let mut epfd = detector();
        let mut out = Outbox::default();
        let request = Message::new(Body::PlDeliver {
            sender: process(2),
            message: Box::new(Message::new(Body::EpfdHeartbeatRequest)),
        });
        assert!(epfd.handle(&request, &mut out));

        match &out.messages()[0].body {
            Body::PlSend {
                destination,
                message,
            } => {
                assert_eq!(destination.port, 5012);
                assert!(matches!(message.body, Body::EpfdHeartbeatReply));
            }
            other => panic!("expected PlSend, got {other:?}"),
        }
    }
}
