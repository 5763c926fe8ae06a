//! Group membership and quorum arithmetic.

use crate::{Port, ProcessId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The ordered list of participants, fixed for the lifetime of one
/// consensus instance.
///
/// `N` is the list's size; a quorum is any subset strictly larger than
/// `N / 2`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    processes: Vec<ProcessId>,
}

impl Membership {
    pub fn new(processes: Vec<ProcessId>) -> Self {
        Self { processes }
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessId> {
        self.processes.iter()
    }

    /// True when `count` distinct processes form a quorum.
    pub fn is_quorum(&self, count: usize) -> bool {
        count > self.len() / 2
    }

    /// Resolve a process by its listening port.
    pub fn by_port(&self, port: Port) -> Option<&ProcessId> {
        self.processes.iter().find(|p| p.port == port)
    }

    /// The process with the lowest rank.
    pub fn min_rank(&self) -> Option<&ProcessId> {
        self.processes.iter().min_by_key(|p| p.rank)
    }

    /// The highest-rank process whose port is not in `excluded`.
    pub fn max_rank_excluding(&self, excluded: &BTreeSet<Port>) -> Option<&ProcessId> {
        self.processes
            .iter()
            .filter(|p| !excluded.contains(&p.port))
            .max_by_key(|p| p.rank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn membership() -> Membership {
        Membership::new(vec![
            ProcessId::new("127.0.0.1", 5011, 1),
            ProcessId::new("127.0.0.1", 5012, 2),
            ProcessId::new("127.0.0.1", 5013, 3),
        ])
    }

    #[test]
    fn test_quorum_is_strict_majority() {
        let m = membership();
        assert!(!m.is_quorum(0));
        assert!(!m.is_quorum(1));
        assert!(m.is_quorum(2));
        assert!(m.is_quorum(3));
    }

    #[test]
    fn test_rank_lookups() {
        let m = membership();
        assert_eq!(m.min_rank().map(|p| p.port), Some(5011));

        let mut excluded = BTreeSet::new();
        assert_eq!(m.max_rank_excluding(&excluded).map(|p| p.port), Some(5013));

        excluded.insert(5013);
        assert_eq!(m.max_rank_excluding(&excluded).map(|p| p.port), Some(5012));

        excluded.insert(5011);
        excluded.insert(5012);
        assert!(m.max_rank_excluding(&excluded).is_none());
    }

    #[test]
    fn test_by_port() {
        let m = membership();
        assert_eq!(m.by_port(5012).map(|p| p.rank), Some(2));
        assert!(m.by_port(5999).is_none());
    }
}
