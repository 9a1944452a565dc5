//! Discrete-time Markov chains.

use nalgebra::{DMatrix, DVector};
use std::collections::HashMap;
use std::hash::Hash;
use stpn_core::{ensure, Error, Real, Result, Stage};

/// A discrete-time Markov chain over logic states of type `S`.
///
/// States are registered once and addressed by dense indices; edges carry
/// transition probabilities, and a list of initial states carries the
/// initial distribution.
#[derive(Debug, Clone)]
pub struct Dtmc<S> {
    states: Vec<S>,
    index: HashMap<S, usize>,
    edges: Vec<Vec<(usize, Real)>>,
    initial: Vec<(usize, Real)>,
}

impl<S> Default for Dtmc<S> {
    fn default() -> Self {
        Dtmc {
            states: Vec::new(),
            index: HashMap::new(),
            edges: Vec::new(),
            initial: Vec::new(),
        }
    }
}

impl<S: Clone + Eq + Hash> Dtmc<S> {
    /// An empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a state, returning its index (idempotent).
    pub fn add_state(&mut self, state: S) -> usize {
        if let Some(&i) = self.index.get(&state) {
            return i;
        }
        let i = self.states.len();
        self.index.insert(state.clone(), i);
        self.states.push(state);
        self.edges.push(Vec::new());
        i
    }

    /// Add a weighted edge between two (registered or new) states.
    pub fn add_edge(&mut self, from: S, to: S, probability: Real) {
        let f = self.add_state(from);
        let t = self.add_state(to);
        self.edges[f].push((t, probability));
    }

    /// Mark a state as initial with the given probability.
    pub fn add_initial(&mut self, state: S, probability: Real) {
        let i = self.add_state(state);
        self.initial.push((i, probability));
    }

    /// Number of states.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// True when the chain has no states.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// The registered states, in index order.
    pub fn states(&self) -> &[S] {
        &self.states
    }

    /// Index of a registered state.
    pub fn index_of(&self, state: &S) -> Option<usize> {
        self.index.get(state).copied()
    }

    /// The outgoing edges of a state index.
    pub fn edges(&self, i: usize) -> &[(usize, Real)] {
        &self.edges[i]
    }

    /// The initial states with their probabilities.
    pub fn initial(&self) -> &[(usize, Real)] {
        &self.initial
    }

    /// The dense transition matrix `P` (row-stochastic when the chain is).
    pub fn transition_matrix(&self) -> DMatrix<Real> {
        let n = self.states.len();
        let mut p = DMatrix::zeros(n, n);
        for (i, edges) in self.edges.iter().enumerate() {
            for &(j, prob) in edges {
                p[(i, j)] += prob;
            }
        }
        p
    }

    /// The stationary distribution `π` with `π · P = π`, `Σ π = 1`.
    ///
    /// Solved by LU after replacing one equation with the normalization
    /// constraint. A singular system (reducible chain where irreducibility
    /// was assumed) is a numeric error.
    pub fn stationary_distribution(&self, epsilon: Real) -> Result<Vec<Real>> {
        let n = self.states.len();
        ensure!(n > 0, "stationary distribution of an empty chain");
        let p = self.transition_matrix();
        // (Pᵀ − I) π = 0 with the last row replaced by Σ π = 1.
        let mut a = p.transpose() - DMatrix::identity(n, n);
        for j in 0..n {
            a[(n - 1, j)] = 1.0;
        }
        let mut b = DVector::zeros(n);
        b[n - 1] = 1.0;
        let solution = a.lu().solve(&b).ok_or_else(|| {
            Error::numeric(Stage::StationarySolve, "singular embedded chain")
        })?;
        let pi: Vec<Real> = solution.iter().copied().collect();
        // Sanity: π·P = π within the requested tolerance.
        for j in 0..n {
            let mut balance = 0.0;
            for i in 0..n {
                balance += pi[i] * p[(i, j)];
            }
            if (balance - pi[j]).abs() > epsilon {
                return Err(Error::numeric(
                    Stage::StationarySolve,
                    format!("stationary residual {} above tolerance", (balance - pi[j]).abs()),
                ));
            }
        }
        Ok(pi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_state_stationary() {
        // P = [[0.3, 0.7], [0.4, 0.6]] has π = [4/11, 7/11].
        let mut chain = Dtmc::new();
        chain.add_edge("a", "a", 0.3);
        chain.add_edge("a", "b", 0.7);
        chain.add_edge("b", "a", 0.4);
        chain.add_edge("b", "b", 0.6);
        let pi = chain.stationary_distribution(1e-9).unwrap();
        assert!((pi[0] - 4.0 / 11.0).abs() < 1e-9);
        assert!((pi[1] - 7.0 / 11.0).abs() < 1e-9);
        assert!((pi.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn state_registration_is_idempotent() {
        let mut chain = Dtmc::new();
        let a = chain.add_state("a");
        assert_eq!(chain.add_state("a"), a);
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn reducible_chain_is_rejected() {
        // Two absorbing states: the stationary system is singular.
        let mut chain = Dtmc::new();
        chain.add_edge("a", "a", 1.0);
        chain.add_edge("b", "b", 1.0);
        assert!(chain.stationary_distribution(1e-9).is_err());
    }
}
