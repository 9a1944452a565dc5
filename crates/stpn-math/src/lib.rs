//! # stpn-math
//!
//! The symbolic and geometric layers of the stpn workspace: exact decimal
//! arithmetic extended with ±∞ and neighborhoods, multivariate expolynomial
//! algebra, difference-bound zones, and piecewise state densities.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod density;
pub mod exact;
pub mod expol;
pub mod zone;

pub use density::StateDensity;
pub use exact::{ExactReal, Side};
pub use expol::{AtomicTerm, Exmonomial, Expolynomial, Variable};
pub use zone::DbmZone;
