//! Deterministic in-memory simulation of a consensus group.
//!
//! Runs several nodes' dispatchers against a simulated network and a
//! virtual clock, with no sockets and no tokio runtime. Given the same
//! seed, a simulation produces identical results every run:
//!
//! - Events live in a globally ordered queue keyed by (time, sequence)
//! - Network latency jitter comes from a seeded RNG
//! - Partitions and crashes are explicit test inputs
//!
//! The runner plays the role the production node plays for a real
//! deployment: it executes the stack's actions (sends become deliveries
//! after a sampled latency, timers become queued markers, hub sends
//! become recorded decisions).

mod network;
mod runner;

pub use network::{NetworkConfig, SimulatedNetwork};
pub use runner::{SimulationRunner, SimulationStats};
