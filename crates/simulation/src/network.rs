//! Simulated network with deterministic latency, partitions, and crashes.

use paxon_types::Port;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;
use std::time::Duration;

/// Configuration for the simulated network.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Number of nodes in the group; ranks 1..=n on ports 5011, 5012, ...
    pub num_nodes: u32,
    /// Base one-way message latency.
    pub latency: Duration,
    /// Jitter as a fraction of base latency (0.0 - 1.0).
    pub jitter_fraction: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            num_nodes: 3,
            latency: Duration::from_millis(5),
            jitter_fraction: 0.1,
        }
    }
}

/// Deterministic message-delivery decisions.
///
/// Partitions are directional: a pair `(a, b)` in the set drops messages
/// from `a` to `b` only. A crashed node neither sends nor receives, and
/// never processes another event.
#[derive(Debug)]
pub struct SimulatedNetwork {
    config: NetworkConfig,
    ports: Vec<Port>,
    partitions: HashSet<(Port, Port)>,
    crashed: HashSet<Port>,
}

impl SimulatedNetwork {
    pub fn new(config: NetworkConfig) -> Self {
        let ports = (1..=config.num_nodes).map(|rank| 5010 + rank as Port).collect();
        Self {
            config,
            ports,
            partitions: HashSet::new(),
            crashed: HashSet::new(),
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    // ─── Partition management ───

    pub fn is_partitioned(&self, from: Port, to: Port) -> bool {
        self.partitions.contains(&(from, to))
    }

    /// Drop messages from `from` to `to` only.
    pub fn partition_unidirectional(&mut self, from: Port, to: Port) {
        self.partitions.insert((from, to));
    }

    pub fn partition_bidirectional(&mut self, a: Port, b: Port) {
        self.partitions.insert((a, b));
        self.partitions.insert((b, a));
    }

    /// Cut a node off from every other node, both directions. Local
    /// self-delivery keeps working, as it does over real loopback.
    pub fn isolate_node(&mut self, node: Port) {
        for &other in &self.ports {
            if other != node {
                self.partitions.insert((node, other));
                self.partitions.insert((other, node));
            }
        }
    }

    pub fn heal_bidirectional(&mut self, a: Port, b: Port) {
        self.partitions.remove(&(a, b));
        self.partitions.remove(&(b, a));
    }

    /// Restore full connectivity.
    pub fn heal_all(&mut self) {
        self.partitions.clear();
    }

    // ─── Crashes ───

    /// Crash a node permanently. Messages already in flight from it are
    /// still delivered; everything addressed to it is dropped.
    pub fn crash(&mut self, node: Port) {
        self.crashed.insert(node);
    }

    pub fn is_crashed(&self, node: Port) -> bool {
        self.crashed.contains(&node)
    }

    // ─── Delivery decisions ───

    /// Decide whether a message from `from` to `to` is delivered.
    /// Returns the sampled latency, or `None` when it is dropped.
    pub fn should_deliver(
        &self,
        from: Port,
        to: Port,
        rng: &mut ChaCha8Rng,
    ) -> Option<Duration> {
        if self.is_crashed(from) || self.is_crashed(to) {
            return None;
        }
        if self.is_partitioned(from, to) {
            return None;
        }
        Some(self.sample_latency(rng))
    }

    fn sample_latency(&self, rng: &mut ChaCha8Rng) -> Duration {
        let base = self.config.latency.as_secs_f64();
        let jitter_range = base * self.config.jitter_fraction;
        let jitter = if jitter_range > 0.0 {
            rng.gen_range(-jitter_range..jitter_range)
        } else {
            0.0
        };
        Duration::from_secs_f64((base + jitter).max(0.0005))
    }
}
