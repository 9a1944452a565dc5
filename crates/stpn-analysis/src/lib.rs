//! # stpn-analysis
//!
//! The analysis layer of the stpn workspace: regenerative trees with
//! local/global kernel discretization, the Markov-renewal solver, the
//! steady-state path over the embedded chain, the one-general-transition
//! path with a subordinated CTMC, and the user-facing analysis builders.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod builders;
pub mod kernel;
pub mod onegen;
pub mod regenerative;
pub mod renewal;
pub mod solution;
pub mod steady;

pub use builders::{Policy, RegenerativeSteadyState, RegenerativeTransient, TreeTransient};
pub use kernel::KernelSamples;
pub use onegen::OneGenTransient;
pub use solution::{RewardRate, SteadyStateSolution, TransientSolution};
