//! # stpn-markov
//!
//! The numeric Markov layer of the stpn workspace: discrete-time chains
//! with stationary solutions, bottom strongly-connected component
//! decomposition with absorption probabilities, Fox–Glynn Poisson
//! truncation, uniformized CTMC transient analysis, and the aligned time
//! grids shared by kernel discretization and quadrature.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod bscc;
pub mod ctmc;
pub mod dtmc;
pub mod fox_glynn;
pub mod interval;
pub mod ticks;

pub use bscc::AbsorptionProbs;
pub use ctmc::{Ctmc, CtmcState, CtmcTransient};
pub use dtmc::Dtmc;
pub use fox_glynn::FoxGlynn;
pub use interval::IntervalScanner;
pub use ticks::Ticks;
