//! Wait-for graph and cycle detection.
//!
//! An edge `T1 → T2` means T1 is blocked on a lock held by T2, or queued
//! behind an earlier request of T2 on the same variable. Edges out of a
//! transaction are added when one of its operations blocks; every edge
//! touching a transaction is removed when it commits or aborts.
//!
//! ## Detection
//!
//! Cycle detection is a topological reduction (Kahn's algorithm):
//!
//! 1. Repeatedly remove nodes with no incoming edge.
//! 2. Repeatedly remove nodes with no outgoing edge into the remainder.
//! 3. Every node left lies on a cycle or between cycles, and each of them
//!    has a successor among the others, so walking successors from any of
//!    them must revisit a node. The revisited suffix is a concrete cycle.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::types::TransactionId;

/// Directed graph of waiting transactions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaitForGraph {
    edges: BTreeMap<TransactionId, BTreeSet<TransactionId>>,
}

impl WaitForGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the graph has no edges.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Record that `waiter` waits for every transaction in `holders`.
    ///
    /// Self edges are ignored.
    pub fn add_edges(
        &mut self,
        waiter: TransactionId,
        holders: impl IntoIterator<Item = TransactionId>,
    ) {
        let targets: BTreeSet<TransactionId> =
            holders.into_iter().filter(|holder| *holder != waiter).collect();
        if !targets.is_empty() {
            self.edges.entry(waiter).or_default().extend(targets);
        }
    }

    /// Remove every edge into or out of `transaction`.
    pub fn remove_transaction(&mut self, transaction: TransactionId) {
        self.edges.remove(&transaction);
        self.edges.retain(|_, targets| {
            targets.remove(&transaction);
            !targets.is_empty()
        });
    }

    /// Whether `transaction` is still waiting on someone.
    pub fn is_waiting(&self, transaction: TransactionId) -> bool {
        self.edges.contains_key(&transaction)
    }

    /// Transactions `transaction` waits for.
    pub fn waits_for(&self, transaction: TransactionId) -> impl Iterator<Item = TransactionId> + '_ {
        self.edges.get(&transaction).into_iter().flatten().copied()
    }

    /// All edges as `(waiter, holder)` pairs, sorted.
    pub fn edges(&self) -> Vec<(TransactionId, TransactionId)> {
        self.edges
            .iter()
            .flat_map(|(waiter, holders)| holders.iter().map(move |holder| (*waiter, *holder)))
            .collect()
    }

    /// Nodes that survive the two-sided topological reduction.
    ///
    /// Empty exactly when the graph is acyclic.
    pub fn irreducible_nodes(&self) -> BTreeSet<TransactionId> {
        let mut nodes: BTreeSet<TransactionId> = BTreeSet::new();
        let mut predecessors: BTreeMap<TransactionId, BTreeSet<TransactionId>> = BTreeMap::new();
        for (waiter, holders) in &self.edges {
            nodes.insert(*waiter);
            for holder in holders {
                nodes.insert(*holder);
                predecessors.entry(*holder).or_default().insert(*waiter);
            }
        }

        // Forward pass on in-degree.
        let mut in_degree: BTreeMap<TransactionId, usize> = nodes
            .iter()
            .map(|node| (*node, predecessors.get(node).map_or(0, BTreeSet::len)))
            .collect();
        let mut queue: VecDeque<TransactionId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(node, _)| *node)
            .collect();
        while let Some(node) = queue.pop_front() {
            in_degree.remove(&node);
            for holder in self.waits_for(node) {
                if let Some(degree) = in_degree.get_mut(&holder) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(holder);
                    }
                }
            }
        }
        let mut remaining: BTreeSet<TransactionId> = in_degree.into_keys().collect();

        // Backward pass on out-degree within the remainder.
        let mut out_degree: BTreeMap<TransactionId, usize> = remaining
            .iter()
            .map(|node| {
                let degree = self
                    .waits_for(*node)
                    .filter(|holder| remaining.contains(holder))
                    .count();
                (*node, degree)
            })
            .collect();
        let mut queue: VecDeque<TransactionId> = out_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(node, _)| *node)
            .collect();
        while let Some(node) = queue.pop_front() {
            remaining.remove(&node);
            for waiter in predecessors.get(&node).into_iter().flatten() {
                if let Some(degree) = out_degree.get_mut(waiter) {
                    if remaining.contains(waiter) && *degree > 0 {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(*waiter);
                        }
                    }
                }
            }
        }
        remaining
    }

    /// One cycle of the graph, in edge order, if any exists.
    ///
    /// Deterministic: the walk starts at the smallest irreducible node and
    /// always follows the smallest eligible successor.
    pub fn find_cycle(&self) -> Option<Vec<TransactionId>> {
        let remaining = self.irreducible_nodes();
        let mut current = *remaining.iter().next()?;
        let mut path: Vec<TransactionId> = Vec::new();
        let mut position: BTreeMap<TransactionId, usize> = BTreeMap::new();

        loop {
            if let Some(start) = position.get(&current) {
                return Some(path.split_off(*start));
            }
            position.insert(current, path.len());
            path.push(current);
            current = self
                .waits_for(current)
                .find(|holder| remaining.contains(holder))?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(id: u32) -> TransactionId {
        TransactionId::new(id)
    }

    #[test]
    fn test_add_and_remove_edges() {
        let mut graph = WaitForGraph::new();
        graph.add_edges(t(1), [t(2), t(3)]);
        graph.add_edges(t(2), [t(3)]);
        assert!(graph.is_waiting(t(1)));
        assert_eq!(graph.edges().len(), 3);

        graph.remove_transaction(t(3));
        assert_eq!(graph.edges(), vec![(t(1), t(2))]);
        assert!(!graph.is_waiting(t(2)));

        graph.remove_transaction(t(2));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_self_edges_ignored() {
        let mut graph = WaitForGraph::new();
        graph.add_edges(t(1), [t(1)]);
        assert!(graph.is_empty());
    }

    #[test]
    fn test_acyclic_chain() {
        let mut graph = WaitForGraph::new();
        graph.add_edges(t(1), [t(2)]);
        graph.add_edges(t(2), [t(3)]);
        assert!(graph.irreducible_nodes().is_empty());
        assert_eq!(graph.find_cycle(), None);
    }

    #[test]
    fn test_two_node_cycle() {
        let mut graph = WaitForGraph::new();
        graph.add_edges(t(1), [t(2)]);
        graph.add_edges(t(2), [t(1)]);
        assert_eq!(graph.find_cycle(), Some(vec![t(1), t(2)]));
    }

    #[test]
    fn test_cycle_excludes_tails() {
        // 4 → 1 → 2 → 3 → 1, and 3 → 5
        let mut graph = WaitForGraph::new();
        graph.add_edges(t(4), [t(1)]);
        graph.add_edges(t(1), [t(2)]);
        graph.add_edges(t(2), [t(3)]);
        graph.add_edges(t(3), [t(1), t(5)]);

        assert_eq!(
            graph.irreducible_nodes(),
            BTreeSet::from([t(1), t(2), t(3)])
        );
        assert_eq!(graph.find_cycle(), Some(vec![t(1), t(2), t(3)]));
    }

    #[test]
    fn test_cycle_found_past_a_bridge() {
        // 1 ⇄ 2 and 3 ⇄ 4, bridged by 2 → 3. The walk from 1 may cross
        // into the second cycle; whatever it returns must be a real cycle.
        let mut graph = WaitForGraph::new();
        graph.add_edges(t(1), [t(2)]);
        graph.add_edges(t(2), [t(1), t(3)]);
        graph.add_edges(t(3), [t(4)]);
        graph.add_edges(t(4), [t(3)]);

        let cycle = graph.find_cycle().expect("cycle");
        for (i, node) in cycle.iter().enumerate() {
            let next = cycle[(i + 1) % cycle.len()];
            assert!(graph.waits_for(*node).any(|holder| holder == next));
        }
    }
}
