//! Enumeration policies: which frontier node to expand next.

use crate::graph::NodeId;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use stpn_math::ExactReal;

/// A frontier policy for the enumeration engine.
pub trait EnumerationPolicy {
    /// Offer a newly discovered node with its priority (the reaching
    /// probability in transient analysis, one otherwise).
    fn push(&mut self, node: NodeId, priority: ExactReal);

    /// Take the next node to expand.
    fn pop(&mut self) -> Option<NodeId>;

    /// True when the policy decided no further expansion is worthwhile.
    fn halted(&self) -> bool {
        false
    }
}

/// Breadth-first expansion by insertion order.
#[derive(Debug, Default)]
pub struct Fifo {
    queue: VecDeque<NodeId>,
}

impl Fifo {
    /// An empty FIFO frontier.
    pub fn new() -> Self {
        Fifo::default()
    }
}

impl EnumerationPolicy for Fifo {
    fn push(&mut self, node: NodeId, _priority: ExactReal) {
        self.queue.push_back(node);
    }

    fn pop(&mut self) -> Option<NodeId> {
        self.queue.pop_front()
    }
}

#[derive(Debug)]
struct GreedyEntry {
    priority: ExactReal,
    /// Insertion sequence number; earlier entries win ties.
    sequence: u64,
    node: NodeId,
}

impl PartialEq for GreedyEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for GreedyEntry {}

impl Ord for GreedyEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap on priority; ties broken by the earlier insertion.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for GreedyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Greedy expansion by largest reaching probability, with error-bounded
/// truncation: once the total unexplored reaching probability falls below
/// the configured error, expansion halts and the produced kernels
/// under-approximate as strict lower bounds.
#[derive(Debug)]
pub struct GreedyByReachingProbability {
    heap: BinaryHeap<GreedyEntry>,
    unexplored: f64,
    error: f64,
    sequence: u64,
}

impl GreedyByReachingProbability {
    /// A greedy frontier truncating below the given error.
    pub fn new(error: f64) -> Self {
        GreedyByReachingProbability {
            heap: BinaryHeap::new(),
            unexplored: 0.0,
            error,
            sequence: 0,
        }
    }
}

impl EnumerationPolicy for GreedyByReachingProbability {
    fn push(&mut self, node: NodeId, priority: ExactReal) {
        self.unexplored += priority.to_f64();
        self.heap.push(GreedyEntry {
            priority,
            sequence: self.sequence,
            node,
        });
        self.sequence += 1;
    }

    fn pop(&mut self) -> Option<NodeId> {
        let entry = self.heap.pop()?;
        self.unexplored -= entry.priority.to_f64();
        Some(entry.node)
    }

    fn halted(&self) -> bool {
        self.unexplored < self.error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(i: usize) -> NodeId {
        // NodeId construction goes through the graph in real use; tests
        // fake it through a tiny graph.
        let mut g = crate::graph::SuccessionGraph::new(stpn_state::State::new());
        for k in 1..=i {
            let mut s = stpn_state::State::new();
            s.petri = Some(stpn_state::PetriStateFeature {
                marking: stpn_state::Marking::new().with("p", k as u32),
                enabled: Default::default(),
                newly_enabled: Default::default(),
            });
            g.add_or_get(s);
        }
        g.nodes().last().unwrap().0
    }

    #[test]
    fn fifo_is_first_in_first_out() {
        let mut p = Fifo::new();
        p.push(id(0), ExactReal::one());
        p.push(id(1), ExactReal::one());
        assert_eq!(p.pop(), Some(id(0)));
        assert_eq!(p.pop(), Some(id(1)));
    }

    #[test]
    fn greedy_pops_largest_priority_first() {
        let mut p = GreedyByReachingProbability::new(0.0);
        p.push(id(0), ExactReal::from_decimal_str("0.2").unwrap());
        p.push(id(1), ExactReal::from_decimal_str("0.7").unwrap());
        p.push(id(2), ExactReal::from_decimal_str("0.1").unwrap());
        assert_eq!(p.pop(), Some(id(1)));
        assert_eq!(p.pop(), Some(id(0)));
    }

    #[test]
    fn greedy_breaks_ties_by_insertion_order() {
        let mut p = GreedyByReachingProbability::new(0.0);
        p.push(id(0), ExactReal::one());
        p.push(id(1), ExactReal::one());
        assert_eq!(p.pop(), Some(id(0)));
    }

    #[test]
    fn greedy_halts_below_the_error() {
        let mut p = GreedyByReachingProbability::new(0.05);
        p.push(id(0), ExactReal::from_decimal_str("0.04").unwrap());
        assert!(p.halted());
        p.push(id(1), ExactReal::from_decimal_str("0.5").unwrap());
        assert!(!p.halted());
    }
}
