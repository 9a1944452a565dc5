//! Sampled local and global kernels.

use stpn_core::Real;
use stpn_markov::Ticks;
use stpn_state::{DeterministicEnablingState, Marking};

/// The discretized Markov-renewal kernels of a regenerative analysis.
///
/// `local[t][i][j]` is the probability of being in marking `j` at the
/// `t`-th kernel tick after regeneration `i` with no renewal in between;
/// `global[t][i][k]` is the cumulative probability of having renewed into
/// regeneration `k` by that tick. Without row normalization both are
/// strict lower bounds under truncation.
#[derive(Debug, Clone)]
pub struct KernelSamples {
    /// The regenerations (kernel rows), in discovery order.
    pub regenerations: Vec<DeterministicEnablingState>,
    /// The markings of the local kernel columns.
    pub markings: Vec<Marking>,
    /// `local[t][i][j]`.
    pub local: Vec<Vec<Vec<Real>>>,
    /// `global[t][i][k]`, cumulative in `t`.
    pub global: Vec<Vec<Vec<Real>>>,
    /// The sampling grids.
    pub ticks: Ticks,
    /// Per-row convergence horizon of the global kernel, as a sample
    /// index: increments beyond it are zero.
    pub global_horizon: Vec<usize>,
}

impl KernelSamples {
    /// Number of kernel samples.
    pub fn samples(&self) -> usize {
        self.local.len()
    }

    /// Rescale each global row so that local and global mass sum to one.
    ///
    /// Rows with no renewal mass are left untouched. Normalized rows are
    /// no longer guaranteed lower bounds.
    pub fn normalize_rows(&mut self) {
        for t in 0..self.local.len() {
            for i in 0..self.regenerations.len() {
                let local_mass: Real = self.local[t][i].iter().sum();
                let global_mass: Real = self.global[t][i].iter().sum();
                if global_mass > 0.0 && local_mass + global_mass > 0.0 {
                    let factor = (1.0 - local_mass) / global_mass;
                    for g in &mut self.global[t][i] {
                        *g *= factor;
                    }
                }
            }
        }
    }

    /// `Σ_j L[t][i][j] + Σ_k G[t][i][k]` for one row and sample.
    pub fn row_mass(&self, t: usize, i: usize) -> Real {
        let l: Real = self.local[t][i].iter().sum();
        let g: Real = self.global[t][i].iter().sum();
        l + g
    }
}
