//! Bottom strongly-connected component decomposition and absorption
//! probabilities.
//!
//! Two passes of iterative depth-first search in Kosaraju's style: the
//! first computes a reverse post-order on the reverse graph, the second
//! collects components by forward search in that order. A component is a
//! BSCC iff no edge leaves it; every other state is transient. Absorption
//! probabilities solve `(I − T)·X = B` by LU, where `T` is the
//! transient→transient submatrix and `B` the one-step transient→BSCC mass.

use crate::dtmc::Dtmc;
use nalgebra::DMatrix;
use std::collections::HashMap;
use std::hash::Hash;
use stpn_core::{Error, Real, Result, Stage};

/// The result of a BSCC decomposition.
#[derive(Debug, Clone)]
pub struct AbsorptionProbs<S> {
    transient: Vec<S>,
    bsccs: Vec<Vec<S>>,
    /// `|transient| × |bsccs|` absorption matrix.
    matrix: DMatrix<Real>,
    transient_index: HashMap<S, usize>,
}

impl<S: Clone + Eq + Hash> AbsorptionProbs<S> {
    /// The transient states, ordered by the reverse post-order of the
    /// decomposition.
    pub fn transient_states(&self) -> &[S] {
        &self.transient
    }

    /// The bottom strongly-connected components.
    pub fn bsccs(&self) -> &[Vec<S>] {
        &self.bsccs
    }

    /// Probability of eventual absorption of `state` into BSCC `k`.
    ///
    /// A state inside a BSCC is absorbed in its own component with
    /// probability one.
    pub fn probability(&self, state: &S, k: usize) -> Real {
        if let Some(&t) = self.transient_index.get(state) {
            return self.matrix[(t, k)];
        }
        if self.bsccs[k].contains(state) {
            1.0
        } else {
            0.0
        }
    }
}

/// Decompose a chain into transient states and BSCCs, solving the
/// absorption probabilities of every transient state.
pub fn decompose<S: Clone + Eq + Hash>(chain: &Dtmc<S>) -> Result<AbsorptionProbs<S>> {
    let n = chain.len();
    let mut reverse: Vec<Vec<usize>> = vec![Vec::new(); n];
    for i in 0..n {
        for &(j, _) in chain.edges(i) {
            reverse[j].push(i);
        }
    }

    // Pass 1: post-order on the reverse graph, iteratively.
    let mut order = Vec::with_capacity(n);
    let mut visited = vec![false; n];
    for root in 0..n {
        if visited[root] {
            continue;
        }
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        visited[root] = true;
        while let Some((node, cursor)) = stack.pop() {
            if cursor < reverse[node].len() {
                stack.push((node, cursor + 1));
                let next = reverse[node][cursor];
                if !visited[next] {
                    visited[next] = true;
                    stack.push((next, 0));
                }
            } else {
                order.push(node);
            }
        }
    }

    // Pass 2: forward DFS in reverse post-order collects the SCCs.
    let mut component = vec![usize::MAX; n];
    let mut components: Vec<Vec<usize>> = Vec::new();
    for &root in order.iter().rev() {
        if component[root] != usize::MAX {
            continue;
        }
        let id = components.len();
        let mut members = Vec::new();
        let mut stack = vec![root];
        component[root] = id;
        while let Some(node) = stack.pop() {
            members.push(node);
            for &(next, _) in chain.edges(node) {
                if component[next] == usize::MAX {
                    component[next] = id;
                    stack.push(next);
                }
            }
        }
        components.push(members);
    }

    // A component is bottom iff no edge leaves it.
    let mut is_bottom = vec![true; components.len()];
    for i in 0..n {
        for &(j, _) in chain.edges(i) {
            if component[i] != component[j] {
                is_bottom[component[i]] = false;
            }
        }
    }

    let mut bscc_of: Vec<Option<usize>> = vec![None; components.len()];
    let mut bsccs: Vec<Vec<S>> = Vec::new();
    for (c, members) in components.iter().enumerate() {
        if is_bottom[c] {
            bscc_of[c] = Some(bsccs.len());
            bsccs.push(members.iter().map(|&i| chain.states()[i].clone()).collect());
        }
    }

    // Transient states in reverse post-order, like the component sweep.
    let mut transient_nodes: Vec<usize> = Vec::new();
    for &node in order.iter().rev() {
        if !is_bottom[component[node]] {
            transient_nodes.push(node);
        }
    }
    let position: HashMap<usize, usize> = transient_nodes
        .iter()
        .enumerate()
        .map(|(pos, &node)| (node, pos))
        .collect();

    let t = transient_nodes.len();
    let k = bsccs.len();
    let mut t_matrix = DMatrix::zeros(t, t);
    let mut b_matrix = DMatrix::zeros(t, k);
    for (row, &node) in transient_nodes.iter().enumerate() {
        for &(next, prob) in chain.edges(node) {
            match bscc_of[component[next]] {
                Some(b) => b_matrix[(row, b)] += prob,
                None => t_matrix[(row, position[&next])] += prob,
            }
        }
    }

    let matrix = if t == 0 {
        DMatrix::zeros(0, k)
    } else {
        let system = DMatrix::identity(t, t) - t_matrix;
        system.lu().solve(&b_matrix).ok_or_else(|| {
            Error::numeric(Stage::AbsorptionSolve, "singular transient system")
        })?
    };

    let transient: Vec<S> = transient_nodes
        .iter()
        .map(|&i| chain.states()[i].clone())
        .collect();
    let transient_index = transient
        .iter()
        .enumerate()
        .map(|(pos, s)| (s.clone(), pos))
        .collect();
    Ok(AbsorptionProbs {
        transient,
        bsccs,
        matrix,
        transient_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Transient {A, B}, BSCCs {C} and {D, E}.
    fn five_node_chain() -> Dtmc<&'static str> {
        let mut chain = Dtmc::new();
        chain.add_edge("A", "B", 0.5);
        chain.add_edge("A", "C", 0.5);
        chain.add_edge("B", "A", 0.2);
        chain.add_edge("B", "D", 0.8);
        chain.add_edge("C", "C", 1.0);
        chain.add_edge("D", "E", 1.0);
        chain.add_edge("E", "D", 1.0);
        chain
    }

    #[test]
    fn decomposition_finds_two_bsccs() {
        let probs = decompose(&five_node_chain()).unwrap();
        assert_eq!(probs.bsccs().len(), 2);
        let mut transient = probs.transient_states().to_vec();
        transient.sort();
        assert_eq!(transient, vec!["A", "B"]);
    }

    #[test]
    fn absorption_rows_sum_to_one() {
        let probs = decompose(&five_node_chain()).unwrap();
        for state in ["A", "B"] {
            let total: f64 = (0..probs.bsccs().len())
                .map(|k| probs.probability(&state, k))
                .sum();
            assert!((total - 1.0).abs() < 1e-9, "{state}: {total}");
        }
    }

    #[test]
    fn absorption_values() {
        // From A: absorbed in C with p, in {D,E} with 1−p where
        // p = 0.5 / (1 − 0.5·0.2) = 5/9.
        let probs = decompose(&five_node_chain()).unwrap();
        let c_index = probs
            .bsccs()
            .iter()
            .position(|b| b.contains(&"C"))
            .unwrap();
        let de_index = 1 - c_index;
        assert!((probs.probability(&"A", c_index) - 5.0 / 9.0).abs() < 1e-9);
        assert!((probs.probability(&"A", de_index) - 4.0 / 9.0).abs() < 1e-9);
    }

    #[test]
    fn bscc_members_absorb_in_their_component() {
        let probs = decompose(&five_node_chain()).unwrap();
        let c_index = probs
            .bsccs()
            .iter()
            .position(|b| b.contains(&"C"))
            .unwrap();
        assert_eq!(probs.probability(&"C", c_index), 1.0);
        assert_eq!(probs.probability(&"C", 1 - c_index), 0.0);
    }
}
