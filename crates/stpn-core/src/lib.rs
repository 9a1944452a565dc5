//! # stpn-core
//!
//! Core types, traits, and error definitions for the stpn workspace.
//!
//! This crate provides the foundational building blocks shared across all
//! other crates in the workspace – type aliases, the error taxonomy, the
//! `ensure!`/`fail!` convenience macros, and the cooperative
//! [`AnalysisMonitor`] consulted by long-running computations.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod errors;
pub mod monitor;

pub use errors::{Error, Result, Stage};
pub use monitor::{AnalysisMonitor, FlagMonitor, NopMonitor};

/// Floating-point type used for numeric output throughout the library.
pub type Real = f64;

/// A time measurement (model time units).
pub type Time = Real;

/// A probability value in `[0, 1]`.
pub type Probability = Real;

/// Alias used for array sizes / indices.
pub type Size = usize;

/// Resolution of indeterminate arithmetic forms such as `+∞ + −∞`.
///
/// The exact-arithmetic layer refuses to guess: every analysis carries one
/// of these, the succession evaluator threads it into its exact
/// multiplications, and the `*_with` operations of the exact layer resolve
/// against it — `FailFast` reports a numeric error, `Zero` substitutes
/// zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndeterminatePolicy {
    /// Fail the analysis with [`Error::Numeric`] (default).
    #[default]
    FailFast,
    /// Substitute zero and continue.
    Zero,
}
