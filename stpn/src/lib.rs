//! # stpn
//!
//! Quantitative transient and steady-state analysis of stochastic time
//! Petri nets: stochastic state-class enumeration over expolynomial
//! densities and difference-bound zones, Markov-renewal kernels between
//! regenerations, and a subordinated-CTMC path for nets with one general
//! transition at a time.
//!
//! This crate is a **façade** that re-exports all public items from the
//! underlying workspace crates. Application code should depend on this
//! crate rather than the individual `stpn-*` crates.
//!
//! ## Quick start
//!
//! ```toml
//! [dependencies]
//! stpn = "0.1"
//! ```
//!
//! ```rust
//! use stpn::math::ExactReal;
//!
//! let half = ExactReal::from_decimal_str("0.5").unwrap();
//! assert_eq!(&half + &half, ExactReal::one());
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

/// Core types, aliases, errors, and the analysis monitor.
pub use stpn_core as core;

/// Exact arithmetic, expolynomials, zones, and state densities.
pub use stpn_math as math;

/// Markov-chain numerics: BSCCs, stationary solutions, uniformization.
pub use stpn_markov as markov;

/// Markings, transition features, state classes, and succession.
pub use stpn_state as state;

/// Succession-graph enumeration with policies and stop criteria.
pub use stpn_enumeration as enumeration;

/// Analysis builders, kernels, and solutions.
pub use stpn_analysis as analysis;
