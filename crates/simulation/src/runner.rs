//! Deterministic simulation runner.

use crate::network::{NetworkConfig, SimulatedNetwork};
use paxon_core::{Action, Body, Dispatcher, Message, TimerId};
use paxon_stack::{Application, StackConfig};
use paxon_types::{Membership, Port, ProcessId, SystemId, Value};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;
use tracing::{debug, trace};

/// Globally ordered event key: virtual time, then insertion sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct EventKey {
    time: Duration,
    seq: u64,
}

/// Statistics collected during a simulation, including the wire traffic
/// the scenarios assert on.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SimulationStats {
    /// Events delivered to dispatchers.
    pub events_processed: u64,
    /// Messages scheduled for delivery.
    pub messages_sent: u64,
    /// Messages dropped by partitions or crashes.
    pub messages_dropped: u64,
    /// Timers set.
    pub timers_set: u64,
    /// Distinct epoch announcements observed on the wire, by sender.
    pub new_epochs: BTreeMap<Port, BTreeSet<u64>>,
    /// Epoch-change NACKs delivered.
    pub nacks_delivered: u64,
    /// Epoch write messages scheduled for delivery.
    pub ep_writes_sent: u64,
    /// Epoch accept messages scheduled for delivery.
    pub ep_accepts_sent: u64,
}

/// Drives a whole consensus group deterministically.
///
/// Each node is a dispatcher with its application registered; the runner
/// executes the actions the dispatchers emit. Decisions reported to the
/// hub are recorded per node for assertions.
pub struct SimulationRunner {
    membership: Membership,
    nodes: BTreeMap<Port, Dispatcher>,
    queue: BTreeMap<EventKey, (Port, Message)>,
    seq: u64,
    now: Duration,
    network: SimulatedNetwork,
    rng: ChaCha8Rng,
    timers: HashMap<(Port, TimerId), EventKey>,
    decisions: BTreeMap<Port, Vec<Value>>,
    stats: SimulationStats,
}

impl SimulationRunner {
    pub fn new(network_config: NetworkConfig, stack_config: StackConfig, seed: u64) -> Self {
        let network = SimulatedNetwork::new(network_config);
        let rng = ChaCha8Rng::seed_from_u64(seed);
        let system_id = SystemId::from("sim-1");

        let membership = Membership::new(
            network
                .ports()
                .iter()
                .enumerate()
                .map(|(i, &port)| ProcessId::new("127.0.0.1", port, i as u32 + 1))
                .collect(),
        );

        let mut nodes = BTreeMap::new();
        for process in membership.iter() {
            let mut dispatcher = Dispatcher::new(system_id.clone());
            dispatcher.register(Box::new(Application::new(
                system_id.clone(),
                process.port,
                stack_config.clone(),
            )));
            nodes.insert(process.port, dispatcher);
        }

        debug!(nodes = nodes.len(), seed, "created simulation runner");

        Self {
            membership,
            nodes,
            queue: BTreeMap::new(),
            seq: 0,
            now: Duration::ZERO,
            network,
            rng,
            timers: HashMap::new(),
            decisions: BTreeMap::new(),
            stats: SimulationStats::default(),
        }
    }

    pub fn membership(&self) -> &Membership {
        &self.membership
    }

    pub fn ports(&self) -> Vec<Port> {
        self.network.ports().to_vec()
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    pub fn network_mut(&mut self) -> &mut SimulatedNetwork {
        &mut self.network
    }

    /// Crash a node permanently.
    pub fn crash(&mut self, port: Port) {
        self.network.crash(port);
    }

    /// Feed a hub proposal to one node at the current time.
    pub fn propose(&mut self, port: Port, value: Value) {
        let proposal = Message::new(Body::AppPropose {
            processes: self.membership.iter().cloned().collect(),
            value,
        });
        self.schedule(port, self.now, proposal);
    }

    /// Feed the same proposal to every node, hub-style.
    pub fn propose_all(&mut self, value: Value) {
        for port in self.ports() {
            self.propose(port, value);
        }
    }

    /// Decisions a node reported to the hub, in order.
    pub fn decisions_of(&self, port: Port) -> &[Value] {
        self.decisions.get(&port).map_or(&[], Vec::as_slice)
    }

    /// The first decision a node reported, if any.
    pub fn decided(&self, port: Port) -> Option<Value> {
        self.decisions_of(port).first().copied()
    }

    /// Run the simulation up to and including `end` (virtual time).
    pub fn run_until(&mut self, end: Duration) {
        while let Some((&key, _)) = self.queue.first_key_value() {
            if key.time > end {
                break;
            }
            let Some((key, (port, message))) = self.queue.pop_first() else {
                break;
            };
            self.now = key.time;
            if self.network.is_crashed(port) {
                continue;
            }

            trace!(time = ?self.now, port, message = message.type_name(), "delivering");
            self.stats.events_processed += 1;

            let actions = {
                let Some(dispatcher) = self.nodes.get_mut(&port) else {
                    continue;
                };
                dispatcher.trigger(message);
                while dispatcher.step() {}
                dispatcher.drain_actions()
            };
            for action in actions {
                self.process_action(port, action);
            }
        }
        if self.now < end {
            self.now = end;
        }
    }

    /// Advance the simulation by `duration`.
    pub fn run_for(&mut self, duration: Duration) {
        self.run_until(self.now + duration);
    }

    fn process_action(&mut self, from: Port, action: Action) {
        match action {
            Action::Send {
                destination,
                message,
                abstraction,
            } => {
                let Some(latency) = self.network.should_deliver(from, destination.port, &mut self.rng)
                else {
                    self.stats.messages_dropped += 1;
                    return;
                };
                self.observe_wire(from, &message);
                self.stats.messages_sent += 1;

                let Some(sender) = self.membership.by_port(from).cloned() else {
                    return;
                };
                let delivery = Message {
                    system_id: message.system_id.clone(),
                    abstraction,
                    body: Body::PlDeliver {
                        sender,
                        message: Box::new(message),
                    },
                };
                self.schedule(destination.port, self.now + latency, delivery);
            }

            Action::SendToHub { message } => {
                if let Body::AppDecide { value } = message.body {
                    debug!(port = from, value = %value, "decision reported");
                    self.decisions.entry(from).or_default().push(value);
                }
            }

            Action::SetTimer { id, duration } => {
                let fire_at = self.now + duration;
                let key = self.schedule(from, fire_at, Message::new(Body::EpfdTimeout));
                if let Some(stale) = self.timers.insert((from, id), key) {
                    self.queue.remove(&stale);
                }
                self.stats.timers_set += 1;
            }
        }
    }

    /// Record the wire-visible traffic the end-to-end scenarios assert
    /// on.
    fn observe_wire(&mut self, from: Port, message: &Message) {
        match &message.body {
            Body::EcNewEpoch { timestamp } => {
                self.stats
                    .new_epochs
                    .entry(from)
                    .or_default()
                    .insert(*timestamp);
            }
            Body::EcNack => self.stats.nacks_delivered += 1,
            Body::EpWrite { .. } => self.stats.ep_writes_sent += 1,
            Body::EpAccept => self.stats.ep_accepts_sent += 1,
            _ => {}
        }
    }

    fn schedule(&mut self, port: Port, time: Duration, message: Message) -> EventKey {
        let key = EventKey {
            time,
            seq: self.seq,
        };
        self.seq += 1;
        self.queue.insert(key, (port, message));
        key
    }
}
