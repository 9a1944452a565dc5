//! Exmonomials: a constant times a normalized bag of atomic terms.

use super::variable::Variable;
use crate::exact::ExactReal;
use num_rational::BigRational;
use num_traits::{ToPrimitive, Zero};
use std::collections::BTreeMap;
use std::fmt;

/// An atomic multiplicative term.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AtomicTerm {
    /// `vᵅ` with a non-negative integer exponent.
    Monomial {
        /// The variable.
        variable: Variable,
        /// The exponent `α ≥ 0`.
        exponent: u32,
    },
    /// `e^{−λv}` with a rational rate.
    Exponential {
        /// The variable.
        variable: Variable,
        /// The rate `λ` (may be negative after substitutions).
        rate: BigRational,
    },
}

impl AtomicTerm {
    /// The variable this term is over.
    pub fn variable(&self) -> &Variable {
        match self {
            AtomicTerm::Monomial { variable, .. } => variable,
            AtomicTerm::Exponential { variable, .. } => variable,
        }
    }
}

/// Normalized per-variable atoms: at most one monomial exponent and one
/// exponential rate. An entry with zero exponent and zero rate is removed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub(crate) struct VarAtoms {
    pub(crate) exponent: u32,
    pub(crate) rate: BigRational,
}

impl VarAtoms {
    fn is_trivial(&self) -> bool {
        self.exponent == 0 && self.rate.is_zero()
    }
}

/// A constant multiplier times a normalized bag of atomic terms.
///
/// Normalized form keeps at most one monomial and one exponential per
/// variable; atoms with exponent 0 or rate 0 are dropped. Two exmonomials
/// have *equal form* when their atom bags coincide, regardless of the
/// constants.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Exmonomial {
    atoms: BTreeMap<Variable, VarAtoms>,
    constant: ExactReal,
}

impl Exmonomial {
    /// A constant exmonomial with no atoms.
    ///
    /// # Panics
    /// Panics if `constant` is infinite: exmonomial constants are finite by
    /// construction.
    pub fn constant(constant: ExactReal) -> Self {
        assert!(constant.is_finite(), "exmonomial constant must be finite");
        Exmonomial {
            atoms: BTreeMap::new(),
            constant,
        }
    }

    /// The constant multiplier.
    pub fn constant_value(&self) -> &ExactReal {
        &self.constant
    }

    /// Multiply by an atomic term, merging exponents and rates.
    pub fn multiply_term(&mut self, term: &AtomicTerm) {
        match term {
            AtomicTerm::Monomial { variable, exponent } => {
                if *exponent == 0 {
                    return;
                }
                let entry = self.atoms.entry(variable.clone()).or_default();
                entry.exponent += exponent;
            }
            AtomicTerm::Exponential { variable, rate } => {
                if rate.is_zero() {
                    return;
                }
                let entry = self.atoms.entry(variable.clone()).or_default();
                entry.rate += rate;
                if entry.is_trivial() {
                    self.atoms.remove(variable);
                }
            }
        }
    }

    /// Builder-style variant of [`Exmonomial::multiply_term`].
    pub fn with_term(mut self, term: AtomicTerm) -> Self {
        self.multiply_term(&term);
        self
    }

    /// Product of two exmonomials.
    pub fn multiply(&self, other: &Exmonomial) -> Exmonomial {
        let mut result = self.clone();
        result.constant = &result.constant * &other.constant;
        for (v, a) in &other.atoms {
            let entry = result.atoms.entry(v.clone()).or_default();
            entry.exponent += a.exponent;
            entry.rate += &a.rate;
            if entry.is_trivial() {
                result.atoms.remove(v);
            }
        }
        result
    }

    /// Scale the constant.
    pub fn scale(&self, factor: &ExactReal) -> Exmonomial {
        Exmonomial {
            constant: &self.constant * factor,
            atoms: self.atoms.clone(),
        }
    }

    /// Negate the constant.
    pub fn negate(&self) -> Exmonomial {
        Exmonomial {
            constant: -self.constant.clone(),
            atoms: self.atoms.clone(),
        }
    }

    /// The variables appearing in the atom bag.
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.atoms.keys()
    }

    /// The monomial exponent on `v` (0 if absent).
    pub fn exponent_of(&self, v: &Variable) -> u32 {
        self.atoms.get(v).map_or(0, |a| a.exponent)
    }

    /// The exponential rate on `v` (0 if absent).
    pub fn rate_of(&self, v: &Variable) -> BigRational {
        self.atoms.get(v).map_or_else(BigRational::zero, |a| a.rate.clone())
    }

    /// True when both bags contain exactly the same atoms.
    pub fn same_form(&self, other: &Exmonomial) -> bool {
        self.atoms == other.atoms
    }

    /// True when no atoms remain (a pure constant).
    pub fn is_constant(&self) -> bool {
        self.atoms.is_empty()
    }

    /// Remove every atom on `v`, returning the removed pair `(α, λ)`.
    pub(crate) fn take_atoms(&mut self, v: &Variable) -> (u32, BigRational) {
        match self.atoms.remove(v) {
            Some(a) => (a.exponent, a.rate),
            None => (0, BigRational::zero()),
        }
    }

    /// Mutable access for the sibling expolynomial module.
    pub(crate) fn constant_mut(&mut self) -> &mut ExactReal {
        &mut self.constant
    }

    /// Evaluate at a full numeric assignment.
    ///
    /// Every variable in the atom bag must be bound.
    pub fn evaluate(&self, assignment: &BTreeMap<Variable, f64>) -> Option<f64> {
        let mut result = self.constant.to_f64();
        for (v, a) in &self.atoms {
            let x = *assignment.get(v)?;
            if a.exponent > 0 {
                result *= x.powi(a.exponent as i32);
            }
            if !a.rate.is_zero() {
                let lambda = a.rate.to_f64().unwrap_or(0.0);
                result *= (-lambda * x).exp();
            }
        }
        Some(result)
    }

    /// Neighborhood-free copy of the atoms, as a term list.
    pub fn terms(&self) -> Vec<AtomicTerm> {
        let mut out = Vec::new();
        for (v, a) in &self.atoms {
            if a.exponent > 0 {
                out.push(AtomicTerm::Monomial {
                    variable: v.clone(),
                    exponent: a.exponent,
                });
            }
            if !a.rate.is_zero() {
                out.push(AtomicTerm::Exponential {
                    variable: v.clone(),
                    rate: a.rate.clone(),
                });
            }
        }
        out
    }
}

impl fmt::Display for Exmonomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.constant)?;
        for (v, a) in &self.atoms {
            if a.exponent == 1 {
                write!(f, " * {v}")?;
            } else if a.exponent > 1 {
                write!(f, " * {v}^{}", a.exponent)?;
            }
            if !a.rate.is_zero() {
                write!(f, " * Exp[{} {v}]", rational_decimal(&a.rate))?;
            }
        }
        Ok(())
    }
}

/// Negated-rate display helper: the grammar stores the rate of `e^{−λv}`
/// as the literal `λ`.
fn rational_decimal(r: &BigRational) -> String {
    ExactReal::from_rational(r.clone()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(s: &str) -> Variable {
        Variable::new(s)
    }

    fn rat(n: i64, d: i64) -> BigRational {
        BigRational::new(n.into(), d.into())
    }

    #[test]
    fn normalization_merges_atoms_per_variable() {
        let mut m = Exmonomial::constant(ExactReal::one());
        m.multiply_term(&AtomicTerm::Monomial {
            variable: var("x"),
            exponent: 2,
        });
        m.multiply_term(&AtomicTerm::Monomial {
            variable: var("x"),
            exponent: 1,
        });
        m.multiply_term(&AtomicTerm::Exponential {
            variable: var("x"),
            rate: rat(1, 2),
        });
        assert_eq!(m.exponent_of(&var("x")), 3);
        assert_eq!(m.rate_of(&var("x")), rat(1, 2));
    }

    #[test]
    fn zero_rate_and_exponent_atoms_are_dropped() {
        let mut m = Exmonomial::constant(ExactReal::one());
        m.multiply_term(&AtomicTerm::Exponential {
            variable: var("x"),
            rate: rat(3, 1),
        });
        m.multiply_term(&AtomicTerm::Exponential {
            variable: var("x"),
            rate: rat(-3, 1),
        });
        assert!(m.is_constant());
    }

    #[test]
    fn same_form_ignores_constant() {
        let a = Exmonomial::constant(ExactReal::from(2)).with_term(AtomicTerm::Monomial {
            variable: var("x"),
            exponent: 1,
        });
        let b = Exmonomial::constant(ExactReal::from(5)).with_term(AtomicTerm::Monomial {
            variable: var("x"),
            exponent: 1,
        });
        assert!(a.same_form(&b));
    }

    #[test]
    fn evaluate_exponential() {
        let m = Exmonomial::constant(ExactReal::from(2)).with_term(AtomicTerm::Exponential {
            variable: var("x"),
            rate: rat(1, 1),
        });
        let mut assignment = BTreeMap::new();
        assignment.insert(var("x"), 1.0);
        let got = m.evaluate(&assignment).unwrap();
        assert!((got - 2.0 * (-1.0_f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn evaluate_requires_all_variables() {
        let m = Exmonomial::constant(ExactReal::one()).with_term(AtomicTerm::Monomial {
            variable: var("x"),
            exponent: 1,
        });
        assert!(m.evaluate(&BTreeMap::new()).is_none());
    }
}
