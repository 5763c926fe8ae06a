//! The per-instance message dispatcher.

use crate::{Action, Message};
use paxon_types::SystemId;
use std::collections::VecDeque;
use tracing::trace;

/// The capability interface every layer of the stack implements.
///
/// A message offered to [`Abstraction::handle`] is consumed when the
/// implementation returns `true`. Abstractions register in dependency
/// order and at most one live abstraction claims any given message type,
/// so first-match dispatch is equivalent to dispatch-by-type without the
/// dispatcher knowing the type table.
pub trait Abstraction: Send {
    /// Short name for telemetry.
    fn name(&self) -> &'static str;

    /// Called once when the dispatcher installs this abstraction. The
    /// outbox allows emitting initial messages, actions, and further
    /// registrations (an initial leader announcement, the first heartbeat
    /// timer, the first epoch instance).
    fn on_register(&mut self, _out: &mut Outbox) {}

    /// Offer a message. Returns `true` when the message is claimed;
    /// internal faults are swallowed and never cross this boundary.
    fn handle(&mut self, message: &Message, out: &mut Outbox) -> bool;

    /// True once this abstraction can never claim another message and may
    /// be discarded by the dispatcher.
    fn defunct(&self) -> bool {
        false
    }
}

/// Collects everything a handler emits: messages back into the queue,
/// actions for the runner, and newly registered abstractions.
#[derive(Default)]
pub struct Outbox {
    messages: Vec<Message>,
    actions: Vec<Action>,
    registrations: Vec<Box<dyn Abstraction>>,
}

impl Outbox {
    /// Enqueue a message for dispatch within this instance.
    pub fn trigger(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Request an I/O action from the runner.
    pub fn act(&mut self, action: Action) {
        self.actions.push(action);
    }

    /// Register a new abstraction with the dispatcher.
    pub fn register(&mut self, abstraction: Box<dyn Abstraction>) {
        self.registrations.push(abstraction);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn registrations(&self) -> &[Box<dyn Abstraction>] {
        &self.registrations
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.actions.is_empty() && self.registrations.is_empty()
    }
}

/// Per-instance FIFO queue and abstraction registry.
///
/// [`Dispatcher::step`] performs one sweep over the queue. Each message is
/// offered to every abstraction in registration order; the first to claim
/// it consumes it, otherwise the message is left in place and the cursor
/// moves on; a later sweep retries it, since it may become claimable once
/// a new epoch instance registers. Malformed or unrecognized messages are never
/// claimed and simply have no effect.
pub struct Dispatcher {
    system_id: SystemId,
    queue: VecDeque<Message>,
    abstractions: Vec<Box<dyn Abstraction>>,
    actions: Vec<Action>,
}

impl Dispatcher {
    pub fn new(system_id: SystemId) -> Self {
        Self {
            system_id,
            queue: VecDeque::new(),
            abstractions: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn system_id(&self) -> &SystemId {
        &self.system_id
    }

    /// Enqueue a message, stamping the instance's system id if the
    /// message carries none.
    pub fn trigger(&mut self, mut message: Message) {
        if message.system_id.is_none() {
            message.system_id = Some(self.system_id.clone());
        }
        self.queue.push_back(message);
    }

    /// Install an abstraction, running its registration hook. The hook may
    /// trigger messages and register further abstractions.
    pub fn register(&mut self, abstraction: Box<dyn Abstraction>) {
        self.install(vec![abstraction]);
    }

    /// One sweep over the queue. Returns `true` when at least one message
    /// was claimed; the caller yields briefly before retrying when
    /// nothing made progress.
    pub fn step(&mut self) -> bool {
        let mut progressed = false;
        let mut index = 0;
        while index < self.queue.len() {
            let Some(message) = self.queue.remove(index) else {
                break;
            };
            let mut out = Outbox::default();
            let mut claimed = false;
            for abstraction in self.abstractions.iter_mut() {
                if abstraction.handle(&message, &mut out) {
                    trace!(
                        system_id = %self.system_id,
                        abstraction = abstraction.name(),
                        message = message.type_name(),
                        "message claimed"
                    );
                    claimed = true;
                    break;
                }
            }
            if claimed {
                progressed = true;
                self.absorb(out);
            } else {
                // Skip rule: put it back and try the next queued message.
                self.queue.insert(index, message);
                index += 1;
            }
        }
        // Halted epoch instances whose successor has replaced them claim
        // nothing anymore; drop them rather than accumulate one per epoch.
        self.abstractions.retain(|a| !a.defunct());
        progressed
    }

    /// Actions accumulated since the last drain, in emission order.
    pub fn drain_actions(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.actions)
    }

    /// True while unclaimed messages remain queued.
    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    pub fn abstraction_count(&self) -> usize {
        self.abstractions.len()
    }

    fn absorb(&mut self, out: Outbox) {
        let Outbox {
            messages,
            actions,
            registrations,
        } = out;
        for message in messages {
            self.trigger(message);
        }
        self.actions.extend(actions);
        self.install(registrations);
    }

    fn install(&mut self, registrations: Vec<Box<dyn Abstraction>>) {
        let mut pending = registrations;
        while !pending.is_empty() {
            for mut abstraction in std::mem::take(&mut pending) {
                let mut out = Outbox::default();
                abstraction.on_register(&mut out);
                trace!(
                    system_id = %self.system_id,
                    abstraction = abstraction.name(),
                    "abstraction registered"
                );
                self.abstractions.push(abstraction);
                let Outbox {
                    messages,
                    actions,
                    registrations,
                } = out;
                for message in messages {
                    self.trigger(message);
                }
                self.actions.extend(actions);
                pending.extend(registrations);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Body;
    use std::sync::{Arc, Mutex};

    /// Claims every message whose type name matches, recording what it
    /// saw through a shared log so tests can inspect claimed messages.
    struct Claimer {
        name: &'static str,
        wants: &'static str,
        seen: Arc<Mutex<Vec<Message>>>,
        defunct: bool,
    }

    impl Claimer {
        fn new(name: &'static str, wants: &'static str) -> Self {
            Self {
                name,
                wants,
                seen: Arc::new(Mutex::new(Vec::new())),
                defunct: false,
            }
        }

        fn recording(
            name: &'static str,
            wants: &'static str,
            seen: Arc<Mutex<Vec<Message>>>,
        ) -> Self {
            Self {
                name,
                wants,
                seen,
                defunct: false,
            }
        }
    }

    impl Abstraction for Claimer {
        fn name(&self) -> &'static str {
            self.name
        }

        fn handle(&mut self, message: &Message, _out: &mut Outbox) -> bool {
            if message.type_name() == self.wants {
                if let Ok(mut seen) = self.seen.lock() {
                    seen.push(message.clone());
                }
                return true;
            }
            false
        }

        fn defunct(&self) -> bool {
            self.defunct
        }
    }

    /// Registers a `Claimer` for `EcNack` when it sees `EpRead`.
    struct Registrar;

    impl Abstraction for Registrar {
        fn name(&self) -> &'static str {
            "registrar"
        }

        fn handle(&mut self, message: &Message, out: &mut Outbox) -> bool {
            if matches!(message.body, Body::EpRead) {
                out.register(Box::new(Claimer::new("late", "EcNack")));
                return true;
            }
            false
        }
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(SystemId::from("sys-test"))
    }

    #[test]
    fn test_first_match_wins() {
        let mut d = dispatcher();
        d.register(Box::new(Claimer::new("first", "EpRead")));
        d.register(Box::new(Claimer::new("second", "EpRead")));
        d.trigger(Message::new(Body::EpRead));

        assert!(d.step());
        assert!(!d.has_pending());
    }

    #[test]
    fn test_unclaimed_message_is_skipped_not_dropped() {
        let mut d = dispatcher();
        d.register(Box::new(Claimer::new("only", "EpRead")));
        d.trigger(Message::new(Body::EcNack));
        d.trigger(Message::new(Body::EpRead));

        // EcNack is skipped, EpRead claimed.
        assert!(d.step());
        assert_eq!(d.pending_len(), 1);

        // Nothing claims EcNack; the sweep makes no progress.
        assert!(!d.step());
        assert_eq!(d.pending_len(), 1);
    }

    #[test]
    fn test_skipped_message_claimable_after_registration() {
        let mut d = dispatcher();
        d.register(Box::new(Registrar));
        d.trigger(Message::new(Body::EcNack));
        d.trigger(Message::new(Body::EpRead));

        // EcNack skipped; EpRead claimed, registering its claimer; the
        // same sweep does not revisit the skipped message.
        assert!(d.step());
        assert_eq!(d.pending_len(), 1);

        // Next sweep delivers the previously skipped EcNack.
        assert!(d.step());
        assert!(!d.has_pending());
    }

    #[test]
    fn test_trigger_stamps_system_id() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut d = dispatcher();
        d.register(Box::new(Claimer::recording("only", "EpRead", seen.clone())));
        d.trigger(Message::new(Body::EpRead));
        d.step();

        let seen = seen.lock().expect("log poisoned");
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].system_id, Some(SystemId::from("sys-test")));
    }

    #[test]
    fn test_defunct_abstractions_are_discarded() {
        let mut d = dispatcher();
        let mut claimer = Claimer::new("halted", "EpRead");
        claimer.defunct = true;
        d.register(Box::new(claimer));
        assert_eq!(d.abstraction_count(), 1);

        d.step();
        assert_eq!(d.abstraction_count(), 0);
    }
}
