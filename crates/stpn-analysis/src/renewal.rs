//! The Markov Renewal Equation solver.
//!
//! `P = L + dG * P`: the probability of being in marking `j` at time `t`
//! from regeneration `i` is the local-kernel term plus, for each earlier
//! renewal into `k` at time `u`, the corresponding solution at `t − u`.
//! The convolution is a trapezoidal-style sum over global-kernel
//! increments, computed iteratively with all earlier samples memoized,
//! and clipped to each row's convergence horizon.

use crate::kernel::KernelSamples;
use stpn_core::Real;

/// Solve the discretized Markov Renewal Equation.
///
/// Returns `P[t][i][j]` over the kernel grid of the samples.
pub fn solve(kernel: &KernelSamples) -> Vec<Vec<Vec<Real>>> {
    let samples = kernel.samples();
    let rows = kernel.regenerations.len();
    let cols = kernel.markings.len();
    let mut solution = vec![vec![vec![0.0; cols]; rows]; samples];

    for t in 0..samples {
        for i in 0..rows {
            let horizon = kernel.global_horizon[i].min(t);
            for j in 0..cols {
                let mut value = kernel.local[t][i][j];
                for u in 1..=horizon {
                    for k in 0..rows {
                        let increment =
                            kernel.global[u][i][k] - kernel.global[u - 1][i][k];
                        if increment != 0.0 {
                            value += increment * solution[t - u][k][j];
                        }
                    }
                }
                solution[t][i][j] = value;
            }
        }
    }
    solution
}
