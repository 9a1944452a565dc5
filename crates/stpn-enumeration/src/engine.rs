//! The enumeration engine.
//!
//! Pops frontier nodes by policy, consults the stop criteria and the
//! cooperative monitor, computes successors, applies the postprocessor,
//! and inserts children with value-based hash-consing. On a
//! monitor-requested interruption the engine emits an informational
//! message and returns the partial graph.

use crate::graph::SuccessionGraph;
use crate::policy::EnumerationPolicy;
use crate::stop::StopCriterion;
use stpn_core::{AnalysisMonitor, Result};
use stpn_math::ExactReal;
use stpn_state::{State, StochasticNet, SuccessionEvaluator};

/// The pluggable parts of one enumeration: successor rule, frontier
/// policy, stop criteria, and the postprocessor applied to each child
/// before insertion.
pub struct EnumerationComponents<'a, N, P> {
    /// Successor rule.
    pub evaluator: SuccessionEvaluator<'a, N>,
    /// Frontier policy.
    pub policy: P,
    /// Close-without-expanding predicate.
    pub stop: Box<dyn StopCriterion + 'a>,
    /// Applied to every child (and the root) before insertion; derived
    /// features may be attached here, never after.
    pub postprocessor: Box<dyn Fn(State) -> State + 'a>,
}

/// Priority of a node for the frontier policy: the reaching probability
/// when present, one otherwise.
fn priority(state: &State) -> ExactReal {
    state
        .transient
        .as_ref()
        .map(|t| t.reaching_probability.clone())
        .unwrap_or_else(ExactReal::one)
}

/// Expand the succession graph from an initial state.
pub fn enumerate<N: StochasticNet, P: EnumerationPolicy>(
    mut components: EnumerationComponents<'_, N, P>,
    initial: State,
    monitor: &dyn AnalysisMonitor,
) -> Result<SuccessionGraph> {
    let initial = (components.postprocessor)(initial);
    let root_priority = priority(&initial);
    let mut graph = SuccessionGraph::new(initial);
    components.policy.push(graph.root(), root_priority);

    let mut expanded = 0usize;
    loop {
        if components.policy.halted() {
            log::debug!("policy truncation after {expanded} expansions");
            break;
        }
        let Some(id) = components.policy.pop() else {
            break;
        };
        if monitor.interrupt_requested() {
            monitor.message("enumeration interrupted; returning the partial graph");
            break;
        }
        let state = graph.node(id);
        if components.stop.should_stop(state) {
            continue;
        }
        let successions = components.evaluator.successors(state)?;
        expanded += 1;
        for succession in successions {
            let child = (components.postprocessor)(succession.child);
            let child_priority = priority(&child);
            let (child_id, inserted) = graph.add_or_get(child);
            graph.add_edge(id, child_id, succession.fired, succession.probability);
            if inserted {
                components.policy.push(child_id, child_priority);
            }
        }
    }
    log::debug!(
        "enumeration finished: {} nodes, {} edges, {} expanded",
        graph.len(),
        graph.edges().len(),
        expanded
    );
    Ok(graph)
}

/// Expand every node (FIFO, no stop criteria) — the plain class graph.
pub fn enumerate_all<'a, N: StochasticNet>(
    evaluator: SuccessionEvaluator<'a, N>,
    initial: State,
    monitor: &dyn AnalysisMonitor,
) -> Result<SuccessionGraph> {
    enumerate(
        EnumerationComponents {
            evaluator,
            policy: crate::policy::Fifo::new(),
            stop: Box::new(crate::stop::Never),
            postprocessor: Box::new(|s| s),
        },
        initial,
        monitor,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Fifo;
    use crate::stop::{MarkingConditionStop, Never};
    use num_rational::BigRational;
    use std::collections::BTreeMap;
    use stpn_core::NopMonitor;
    use stpn_state::{
        Marking, StochasticTransitionFeature, Transition,
    };

    struct RingNet {
        features: BTreeMap<Transition, StochasticTransitionFeature>,
        arcs: BTreeMap<Transition, (&'static str, &'static str)>,
    }

    /// A three-place ring of exponential transitions.
    fn ring() -> RingNet {
        let mut features = BTreeMap::new();
        let mut arcs = BTreeMap::new();
        for (name, from, to) in [("a", "p0", "p1"), ("b", "p1", "p2"), ("c", "p2", "p0")] {
            features.insert(
                Transition::new(name),
                StochasticTransitionFeature::exponential(BigRational::from_integer(1.into())),
            );
            arcs.insert(Transition::new(name), (from, to));
        }
        RingNet { features, arcs }
    }

    impl StochasticNet for RingNet {
        fn transitions(&self) -> Vec<Transition> {
            self.features.keys().cloned().collect()
        }

        fn enabled(&self, marking: &Marking) -> Vec<Transition> {
            self.arcs
                .iter()
                .filter(|(_, (from, _))| marking.get(from) > 0)
                .map(|(t, _)| t.clone())
                .collect()
        }

        fn fire(&self, marking: &Marking, transition: &Transition) -> Result<Marking> {
            let (from, to) = self.arcs[transition];
            let mut next = marking.clone();
            next.remove(from, 1);
            next.add(to, 1);
            Ok(next)
        }

        fn feature(&self, transition: &Transition) -> Result<&StochasticTransitionFeature> {
            Ok(&self.features[transition])
        }
    }

    #[test]
    fn ring_closes_on_three_classes() {
        let net = ring();
        let evaluator = SuccessionEvaluator::new(&net);
        let initial = evaluator
            .initial_state(&Marking::new().with("p0", 1))
            .unwrap();
        let graph = enumerate(
            EnumerationComponents {
                evaluator,
                policy: Fifo::new(),
                stop: Box::new(Never),
                postprocessor: Box::new(|s| s),
            },
            initial,
            &NopMonitor,
        )
        .unwrap();
        // The ring revisits the initial class: three nodes, three edges.
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.edges().len(), 3);
        assert_eq!(graph.edges()[2].to, graph.root());
    }

    #[test]
    fn stop_criterion_prevents_expansion() {
        let net = ring();
        let evaluator = SuccessionEvaluator::new(&net);
        let initial = evaluator
            .initial_state(&Marking::new().with("p0", 1))
            .unwrap();
        let graph = enumerate(
            EnumerationComponents {
                evaluator,
                policy: Fifo::new(),
                stop: Box::new(MarkingConditionStop(|m: &Marking| m.get("p1") > 0)),
                postprocessor: Box::new(|s| s),
            },
            initial,
            &NopMonitor,
        )
        .unwrap();
        // p1 is reached but not expanded.
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.edges().len(), 1);
    }

    #[test]
    fn interruption_returns_partial_graph() {
        let net = ring();
        let monitor = stpn_core::FlagMonitor::new();
        monitor.request_interrupt();
        let evaluator = SuccessionEvaluator::new(&net);
        let initial = evaluator
            .initial_state(&Marking::new().with("p0", 1))
            .unwrap();
        let graph = enumerate_all(evaluator, initial, &monitor).unwrap();
        assert_eq!(graph.len(), 1, "nothing expanded under interruption");
    }
}
