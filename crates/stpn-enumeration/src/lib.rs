//! # stpn-enumeration
//!
//! Enumeration of stochastic state-class graphs: an arena-backed
//! succession graph with value-based node identity, pluggable expansion
//! policies (FIFO and greedy by reaching probability), stop criteria, and
//! the engine that drives successor computation under a cooperative
//! monitor.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod engine;
pub mod graph;
pub mod policy;
pub mod stop;

pub use engine::{enumerate, enumerate_all, EnumerationComponents};
pub use graph::{Edge, NodeId, SuccessionGraph};
pub use policy::{EnumerationPolicy, Fifo, GreedyByReachingProbability};
pub use stop::{AnyStop, MarkingConditionStop, Never, RegenerationStop, StopCriterion, TimeBoundStop};
