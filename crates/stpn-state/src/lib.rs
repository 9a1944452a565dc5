//! # stpn-state
//!
//! The state layer of the stpn workspace: markings, the Petri-net
//! collaborator interface, stochastic transition features, the state
//! feature bag, and the symbolic succession rules that transform one
//! stochastic state class into its successors.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod feature;
pub mod marking;
pub mod net;
pub mod succession;

pub use feature::{
    DeterministicEnablingState, PetriStateFeature, Regeneration, State, StochasticStateFeature,
    TransientStochasticStateFeature,
};
pub use marking::Marking;
pub use net::{DelayDistribution, MarkingExpr, StochasticNet, StochasticTransitionFeature, Transition};
pub use succession::{Succession, SuccessionEvaluator};
