//! Multivariate expolynomial algebra.
//!
//! An *expolynomial* is a sum of *exmonomials*, each a constant times a bag
//! of atomic terms `vᵅ` and `e^{−λv}`. Expolynomials are closed under
//! addition, multiplication, substitution, variable shift, and integration,
//! which makes them a suitable representation for the joint densities of
//! stochastic state classes.
//!
//! The textual round-trip follows the grammar
//!
//! ```text
//! expolynomial := exmonomial ('+' exmonomial)*
//! exmonomial   := term ('*' term)*
//! term         := <decimal> | ident | ident '^' <int> | 'Exp[' <decimal> ident ']'
//! ```

mod exmonomial;
mod expolynomial;
mod parser;
mod variable;

pub use exmonomial::{AtomicTerm, Exmonomial};
pub use expolynomial::{Expolynomial, LimitDirection, Sign};
pub use parser::parse_expolynomial;
pub use variable::Variable;
