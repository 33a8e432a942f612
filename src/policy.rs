//! Election policies: pick one node id out of the current active snapshot.

use crate::error::{Result, RouterError};
use crate::node_id::NodeId;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Strategy mapping the current active-node list to one chosen node id.
/// Must be side-effect-free with respect to membership state; may hold internal
/// cursor state of its own (e.g. a round-robin index).
pub trait ElectionPolicy: Send + Sync {
    fn choose_node(&self, active: &[NodeId]) -> Result<NodeId>;
}

fn empty_active_error() -> RouterError {
    RouterError::Policy("active set is empty".to_string())
}

/// Cycles through the active snapshot in order, wrapping around. The cursor is
/// a global atomic counter rather than an index into any one snapshot, so
/// fairness holds even as the snapshot's membership and length change between
/// calls.
#[derive(Default)]
pub struct RoundRobinPolicy {
    cursor: AtomicUsize,
}

impl RoundRobinPolicy {
    pub fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
        }
    }
}

impl ElectionPolicy for RoundRobinPolicy {
    fn choose_node(&self, active: &[NodeId]) -> Result<NodeId> {
        if active.is_empty() {
            return Err(empty_active_error());
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % active.len();
        Ok(active[idx].clone())
    }
}

/// Picks a uniformly random node from the active snapshot on each call.
#[derive(Default)]
pub struct RandomPolicy;

impl RandomPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl ElectionPolicy for RandomPolicy {
    fn choose_node(&self, active: &[NodeId]) -> Result<NodeId> {
        if active.is_empty() {
            return Err(empty_active_error());
        }
        let idx = rand::rng().random_range(0..active.len());
        Ok(active[idx].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<NodeId> {
        names.iter().map(|n| NodeId::new(*n)).collect()
    }

    #[test]
    fn round_robin_cycles_every_node_exactly_once_per_period() {
        let policy = RoundRobinPolicy::new();
        let active = ids(&["a", "b", "c"]);

        let mut seen = std::collections::HashSet::new();
        for _ in 0..3 {
            seen.insert(policy.choose_node(&active).unwrap());
        }
        assert_eq!(seen.len(), 3);

        // The cycle repeats deterministically.
        let first_round: Vec<_> = (0..3).map(|_| policy.choose_node(&active).unwrap()).collect();
        let second_round: Vec<_> = (0..3).map(|_| policy.choose_node(&active).unwrap()).collect();
        assert_eq!(first_round, second_round);
    }

    #[test]
    fn round_robin_errors_on_empty_active_set() {
        let policy = RoundRobinPolicy::new();
        assert!(policy.choose_node(&[]).is_err());
    }

    #[test]
    fn random_policy_always_returns_a_member_of_the_snapshot() {
        let policy = RandomPolicy::new();
        let active = ids(&["a", "b", "c"]);
        for _ in 0..20 {
            let chosen = policy.choose_node(&active).unwrap();
            assert!(active.contains(&chosen));
        }
    }
}
