//! Expolynomials: ordered sums of exmonomials.

use super::exmonomial::{AtomicTerm, Exmonomial};
use super::variable::Variable;
use crate::exact::ExactReal;
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};
use stpn_core::{Error, Result, Stage};

/// Sign of a linear substitution offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    /// `+offset`.
    Plus,
    /// `−offset`.
    Minus,
}

impl Sign {
    fn factor(self) -> BigRational {
        match self {
            Sign::Plus => BigRational::one(),
            Sign::Minus => -BigRational::one(),
        }
    }
}

/// Direction of a limit on one variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitDirection {
    /// The variable is driven to `+∞`.
    PlusInfinity,
    /// The variable is driven to `−∞`.
    MinusInfinity,
}

/// An ordered sum of exmonomials.
///
/// The sum is kept normalized: exmonomials of equal form are merged by
/// summing their constants, and zero-constant terms are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Expolynomial {
    terms: Vec<Exmonomial>,
}

impl Expolynomial {
    /// The zero expolynomial (no terms).
    pub fn zero() -> Self {
        Expolynomial::default()
    }

    /// A constant expolynomial.
    pub fn constant(value: ExactReal) -> Self {
        Expolynomial::from_terms(vec![Exmonomial::constant(value)])
    }

    /// The constant one.
    pub fn one() -> Self {
        Expolynomial::constant(ExactReal::one())
    }

    /// Build from a term list, normalizing.
    pub fn from_terms(terms: Vec<Exmonomial>) -> Self {
        let mut e = Expolynomial { terms };
        e.normalize();
        e
    }

    /// The terms of the sum.
    pub fn terms(&self) -> &[Exmonomial] {
        &self.terms
    }

    /// True when no terms remain.
    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    /// The constant value, if the expolynomial has no variables.
    pub fn as_constant(&self) -> Option<ExactReal> {
        if self.terms.is_empty() {
            return Some(ExactReal::zero());
        }
        if self.terms.len() == 1 && self.terms[0].is_constant() {
            return Some(self.terms[0].constant_value().clone());
        }
        None
    }

    /// The set of variables appearing in any term.
    pub fn variables(&self) -> BTreeSet<Variable> {
        self.terms
            .iter()
            .flat_map(|t| t.variables().cloned())
            .collect()
    }

    fn normalize(&mut self) {
        let mut merged: Vec<Exmonomial> = Vec::with_capacity(self.terms.len());
        for term in self.terms.drain(..) {
            if let Some(existing) = merged.iter_mut().find(|m| m.same_form(&term)) {
                let sum = existing.constant_value() + term.constant_value();
                *existing.constant_mut() = sum;
            } else {
                merged.push(term);
            }
        }
        merged.retain(|m| !m.constant_value().is_zero());
        // Canonical order, so that value equality and hashing see through
        // the construction history.
        merged.sort();
        self.terms = merged;
    }

    /// Scale every term's constant.
    pub fn scale(&self, factor: &ExactReal) -> Expolynomial {
        Expolynomial::from_terms(self.terms.iter().map(|t| t.scale(factor)).collect())
    }

    /// Divide by a non-zero finite scalar.
    pub fn div_scalar(&self, divisor: &ExactReal) -> Expolynomial {
        Expolynomial::from_terms(
            self.terms.iter().map(|t| {
                let mut t = t.clone();
                let quotient = t.constant_value().div_exact(divisor);
                *t.constant_mut() = quotient;
                t
            }).collect(),
        )
    }

    /// Integer power by repeated multiplication.
    pub fn pow(&self, n: u32) -> Expolynomial {
        let mut result = Expolynomial::one();
        for _ in 0..n {
            result = &result * self;
        }
        result
    }

    // ─── Substitution ─────────────────────────────────────────────────────────

    /// Substitute a finite constant for `v`.
    ///
    /// The monomial part is evaluated exactly; the exponential part
    /// `e^{−λ·value}` is evaluated numerically (the algebra carries no
    /// transcendental constants).
    pub fn substitute(&self, v: &Variable, value: &ExactReal) -> Expolynomial {
        assert!(value.is_finite(), "substitute requires a finite value");
        let mut out = Vec::with_capacity(self.terms.len());
        for term in &self.terms {
            let mut term = term.clone();
            let (alpha, lambda) = term.take_atoms(v);
            let mut constant = term.constant_value().clone();
            if alpha > 0 {
                constant = &constant * &value.pow(alpha);
            }
            if !lambda.is_zero() {
                let exponent = -&lambda
                    * value.rational().expect("finite value has a rational");
                constant = &constant * &exp_rational(&exponent);
            }
            *term.constant_mut() = constant;
            out.push(term);
        }
        Expolynomial::from_terms(out)
    }

    /// Substitute `base := Σᵢ ±offsetᵢ + constant`.
    ///
    /// Monomials expand by the Newton binomial (the replacement is raised to
    /// the monomial's power with exact coefficients); exponentials split into
    /// `e^{−λ·constant}` times one exponential atom per offset with rate
    /// `±λ`. [`Expolynomial::shift`] and the one- and two-offset `evaluate`
    /// forms are all expressed through this.
    pub fn substitute_linear(
        &self,
        base: &Variable,
        offsets: &[(Sign, Variable)],
        constant: &ExactReal,
    ) -> Expolynomial {
        assert!(constant.is_finite(), "offset constant must be finite");
        // The replacement as an expolynomial, for the monomial expansion.
        let mut replacement_terms = Vec::new();
        if !constant.is_zero() {
            replacement_terms.push(Exmonomial::constant(constant.clone()));
        }
        for (sign, offset) in offsets {
            let c = match sign {
                Sign::Plus => ExactReal::one(),
                Sign::Minus => -ExactReal::one(),
            };
            replacement_terms.push(Exmonomial::constant(c).with_term(AtomicTerm::Monomial {
                variable: offset.clone(),
                exponent: 1,
            }));
        }
        let replacement = Expolynomial::from_terms(replacement_terms);

        let mut result = Expolynomial::zero();
        for term in &self.terms {
            let mut rest = term.clone();
            let (alpha, lambda) = rest.take_atoms(base);
            let mut factor = Expolynomial::from_terms(vec![rest]);
            if alpha > 0 {
                factor = &factor * &replacement.pow(alpha);
            }
            if !lambda.is_zero() {
                let mut exp_part = Exmonomial::constant(exp_rational(
                    &(-&lambda * constant.rational().expect("finite")),
                ));
                for (sign, offset) in offsets {
                    exp_part.multiply_term(&AtomicTerm::Exponential {
                        variable: offset.clone(),
                        rate: &lambda * sign.factor(),
                    });
                }
                factor = &factor * &Expolynomial::from_terms(vec![exp_part]);
            }
            result = &result + &factor;
        }
        result
    }

    /// Replace `x` by `x + y` (Newton binomial on monomial degrees,
    /// exponentials gain a factor `e^{−λy}`).
    pub fn shift(&self, x: &Variable, y: &Variable) -> Expolynomial {
        self.substitute_linear(
            x,
            &[(Sign::Plus, x.clone()), (Sign::Plus, y.clone())],
            &ExactReal::zero(),
        )
    }

    // ─── Integration ──────────────────────────────────────────────────────────

    /// Symbolic primitive in `v`.
    ///
    /// For a term `c · vᵅ · e^{−λv}` with `λ ≠ 0` the closed form
    ///
    /// `∫ vᵅ e^{−λv} dv = −e^{−λv} Σ_{k=0..α} (α! / (k!·λ^{α+1−k})) vᵏ`
    ///
    /// is applied; for `λ = 0` the power rule. Atoms on other variables are
    /// untouched multipliers.
    pub fn integrate(&self, v: &Variable) -> Expolynomial {
        let mut result = Expolynomial::zero();
        for term in &self.terms {
            let mut rest = term.clone();
            let (alpha, lambda) = rest.take_atoms(v);
            let primitive = if lambda.is_zero() {
                // c vᵅ ↦ c v^{α+1} / (α+1)
                let mut t = rest.clone();
                let quotient = t
                    .constant_value()
                    .div_exact(&ExactReal::from((alpha + 1) as i64));
                *t.constant_mut() = quotient;
                t.multiply_term(&AtomicTerm::Monomial {
                    variable: v.clone(),
                    exponent: alpha + 1,
                });
                Expolynomial::from_terms(vec![t])
            } else {
                let alpha_fact = factorial(alpha);
                let mut terms = Vec::with_capacity(alpha as usize + 1);
                for k in 0..=alpha {
                    let coeff = BigRational::from_integer(&alpha_fact / factorial(k))
                        / lambda.pow((alpha + 1 - k) as i32);
                    let mut t = rest.clone();
                    let scaled =
                        &(-t.constant_value().clone()) * &ExactReal::from_rational(coeff);
                    *t.constant_mut() = scaled;
                    if k > 0 {
                        t.multiply_term(&AtomicTerm::Monomial {
                            variable: v.clone(),
                            exponent: k,
                        });
                    }
                    t.multiply_term(&AtomicTerm::Exponential {
                        variable: v.clone(),
                        rate: lambda.clone(),
                    });
                    terms.push(t);
                }
                Expolynomial::from_terms(terms)
            };
            result = &result + &primitive;
        }
        result
    }

    /// Definite integral in `v` between two bounds, either of which may be
    /// infinite. Divergent tails are a numeric error.
    pub fn integrate_between(
        &self,
        v: &Variable,
        lower: &ExactReal,
        upper: &ExactReal,
    ) -> Result<Expolynomial> {
        let primitive = self.integrate(v);
        let at_upper = primitive.value_at(v, upper)?;
        let at_lower = primitive.value_at(v, lower)?;
        Ok(&at_upper - &at_lower)
    }

    /// The primitive evaluated at a (possibly infinite) bound.
    fn value_at(&self, v: &Variable, bound: &ExactReal) -> Result<Expolynomial> {
        match bound {
            ExactReal::PositiveInfinity => self.value_at_infinity(v, LimitDirection::PlusInfinity),
            ExactReal::NegativeInfinity => self.value_at_infinity(v, LimitDirection::MinusInfinity),
            finite => Ok(self.substitute(v, &finite.to_center())),
        }
    }

    /// True limit of each term as `v → ±∞`: decaying terms vanish,
    /// divergent terms are a numeric error.
    pub(crate) fn value_at_infinity(
        &self,
        v: &Variable,
        direction: LimitDirection,
    ) -> Result<Expolynomial> {
        let mut out = Vec::new();
        for term in &self.terms {
            let alpha = term.exponent_of(v);
            let lambda = term.rate_of(v);
            let decays = match direction {
                LimitDirection::PlusInfinity => lambda.is_positive(),
                LimitDirection::MinusInfinity => lambda.is_negative(),
            };
            if decays {
                continue;
            }
            if !lambda.is_zero() || alpha > 0 {
                return Err(Error::numeric(
                    Stage::SymbolicIntegration,
                    format!("integral diverges in {v}"),
                ));
            }
            out.push(term.clone());
        }
        Ok(Expolynomial::from_terms(out))
    }

    // ─── Limits ───────────────────────────────────────────────────────────────

    /// Drive a subset of variables to ±∞, keeping the dominant terms.
    ///
    /// Terms are scored twice: first by the sum of exponential rates on
    /// `+∞`-bound variables minus the rates on `−∞`-bound variables (smaller
    /// wins, since `e^{−λ·∞} → 0` for `λ > 0`), then by the total monomial
    /// degree on the driven variables (smaller wins within equal rate
    /// score). Terms attaining the minimum pair survive with their driven
    /// atoms removed; the sign flips once per odd-degree monomial on a
    /// `−∞`-bound variable.
    pub fn limit(&self, directions: &BTreeMap<Variable, LimitDirection>) -> Expolynomial {
        if self.terms.is_empty() {
            return Expolynomial::zero();
        }
        let score = |term: &Exmonomial| -> (BigRational, u64) {
            let mut rate_score = BigRational::zero();
            let mut degree_score = 0u64;
            for (v, dir) in directions {
                let rate = term.rate_of(v);
                match dir {
                    LimitDirection::PlusInfinity => rate_score += rate,
                    LimitDirection::MinusInfinity => rate_score -= rate,
                }
                degree_score += term.exponent_of(v) as u64;
            }
            (rate_score, degree_score)
        };
        let best = self
            .terms
            .iter()
            .map(score)
            .min()
            .expect("non-empty term list");
        let mut survivors = Vec::new();
        for term in &self.terms {
            if score(term) != best {
                continue;
            }
            let mut kept = term.clone();
            let mut flips = 0u32;
            for (v, dir) in directions {
                let (alpha, _) = kept.take_atoms(v);
                if *dir == LimitDirection::MinusInfinity && alpha % 2 == 1 {
                    flips += 1;
                }
            }
            if flips % 2 == 1 {
                kept = kept.negate();
            }
            survivors.push(kept);
        }
        Expolynomial::from_terms(survivors)
    }

    // ─── Evaluation ───────────────────────────────────────────────────────────

    /// Numeric evaluation at a full assignment.
    ///
    /// Every variable of the expolynomial must be bound.
    pub fn evaluate(&self, assignment: &BTreeMap<Variable, f64>) -> Result<f64> {
        let mut sum = 0.0;
        for term in &self.terms {
            sum += term.evaluate(assignment).ok_or_else(|| {
                Error::Validation("evaluation with unbound variables".to_string())
            })?;
        }
        Ok(sum)
    }
}

/// `e^x` for a rational exponent, as an exact value of the numeric result.
fn exp_rational(x: &BigRational) -> ExactReal {
    if x.is_zero() {
        return ExactReal::one();
    }
    let approx = x.to_f64().unwrap_or(0.0).exp();
    ExactReal::from_f64(approx).unwrap_or_else(ExactReal::zero)
}

/// `n!` as a big integer.
fn factorial(n: u32) -> BigInt {
    let mut f = BigInt::one();
    for i in 2..=n {
        f *= i;
    }
    f
}

impl Add for &Expolynomial {
    type Output = Expolynomial;

    fn add(self, other: &Expolynomial) -> Expolynomial {
        let mut terms = self.terms.clone();
        terms.extend(other.terms.iter().cloned());
        Expolynomial::from_terms(terms)
    }
}

impl Sub for &Expolynomial {
    type Output = Expolynomial;

    fn sub(self, other: &Expolynomial) -> Expolynomial {
        self.add(&other.clone().neg())
    }
}

impl Neg for Expolynomial {
    type Output = Expolynomial;

    fn neg(self) -> Expolynomial {
        Expolynomial::from_terms(self.terms.iter().map(Exmonomial::negate).collect())
    }
}

impl Mul for &Expolynomial {
    type Output = Expolynomial;

    fn mul(self, other: &Expolynomial) -> Expolynomial {
        let mut terms = Vec::with_capacity(self.terms.len() * other.terms.len());
        for a in &self.terms {
            for b in &other.terms {
                terms.push(a.multiply(b));
            }
        }
        Expolynomial::from_terms(terms)
    }
}

impl fmt::Display for Expolynomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.terms.is_empty() {
            return write!(f, "0");
        }
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                write!(f, " + ")?;
            }
            write!(f, "{term}")?;
        }
        Ok(())
    }
}
