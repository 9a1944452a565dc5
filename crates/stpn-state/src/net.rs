//! The Petri-net collaborator interface.
//!
//! The analysis engine does not define the structural net layer; it
//! consumes it through [`StochasticNet`]: enumerate the transitions enabled
//! in a marking, fire one to produce a new marking, and query each
//! transition's stochastic feature (delay distribution, marking-dependent
//! clock rate, and weight for immediate transitions).

use crate::marking::Marking;
use num_rational::BigRational;
use num_traits::ToPrimitive;
use std::fmt;
use std::sync::Arc;
use stpn_core::{Real, Result};
use stpn_math::expol::Variable;
use stpn_math::{ExactReal, Expolynomial, StateDensity};

/// A transition identifier.
///
/// The transition's name doubles as the name of its timer variable in the
/// symbolic layer, so the reserved variable names are not admissible.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Transition(Arc<str>);

impl Transition {
    /// A transition with the given name.
    pub fn new(name: impl AsRef<str>) -> Self {
        Transition(Arc::from(name.as_ref()))
    }

    /// The transition's name.
    pub fn name(&self) -> &str {
        &self.0
    }

    /// The timer variable of this transition.
    pub fn timer(&self) -> Variable {
        Variable::new(self.name())
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<&str> for Transition {
    fn from(name: &str) -> Self {
        Transition::new(name)
    }
}

/// A marking-dependent expression.
///
/// The engine needs only evaluation and the set of places read; closures
/// implement the trait directly for constant-free use.
pub trait MarkingExpr: Send + Sync {
    /// Evaluate on a marking.
    fn evaluate(&self, marking: &Marking) -> Real;

    /// The places the expression reads (empty for constants).
    fn places(&self) -> Vec<String> {
        Vec::new()
    }
}

impl<F: Fn(&Marking) -> Real + Send + Sync> MarkingExpr for F {
    fn evaluate(&self, marking: &Marking) -> Real {
        self(marking)
    }
}

/// A constant marking expression.
#[derive(Debug, Clone, Copy)]
pub struct Constant(pub Real);

impl MarkingExpr for Constant {
    fn evaluate(&self, _marking: &Marking) -> Real {
        self.0
    }
}

/// The delay distribution of a transition.
#[derive(Debug, Clone)]
pub enum DelayDistribution {
    /// Zero delay; fires with weight-based probability.
    Immediate,
    /// Exponential with the given rate.
    Exponential {
        /// The rate λ.
        rate: BigRational,
    },
    /// Deterministic delay.
    Deterministic {
        /// The firing delay.
        value: ExactReal,
    },
    /// Uniform on `[lower, upper]`.
    Uniform {
        /// Left endpoint.
        lower: ExactReal,
        /// Right endpoint.
        upper: ExactReal,
    },
    /// Erlang with the given rate and shape.
    Erlang {
        /// The rate λ.
        rate: BigRational,
        /// The shape `k ≥ 1`.
        shape: u32,
    },
    /// A general expolynomial density over bounded pieces.
    Piecewise {
        /// `(lower, upper, density)` pieces.
        pieces: Vec<(ExactReal, ExactReal, Expolynomial)>,
    },
}

impl DelayDistribution {
    /// True for an immediate transition.
    pub fn is_immediate(&self) -> bool {
        matches!(self, DelayDistribution::Immediate)
    }

    /// True for an exponential transition.
    pub fn is_exponential(&self) -> bool {
        matches!(self, DelayDistribution::Exponential { .. })
    }

    /// True for a deterministic transition.
    pub fn is_deterministic(&self) -> bool {
        matches!(self, DelayDistribution::Deterministic { .. })
    }

    /// Build the timer density for a newly enabled transition.
    ///
    /// Immediate transitions carry no timer.
    pub fn build_density(&self, timer: Variable) -> Result<StateDensity> {
        match self {
            DelayDistribution::Immediate => Err(stpn_core::Error::Validation(
                "immediate transitions carry no timer density".to_string(),
            )),
            DelayDistribution::Exponential { rate } => {
                StateDensity::exponential(timer, rate.clone())
            }
            DelayDistribution::Deterministic { value } => {
                StateDensity::deterministic(timer, value.clone())
            }
            DelayDistribution::Uniform { lower, upper } => {
                StateDensity::uniform(timer, lower.clone(), upper.clone())
            }
            DelayDistribution::Erlang { rate, shape } => {
                StateDensity::erlang(timer, rate.clone(), *shape)
            }
            DelayDistribution::Piecewise { pieces } => {
                StateDensity::piecewise(timer, pieces.clone())
            }
        }
    }

    /// The supremum of the support (`+∞` for unbounded delays).
    pub fn upper_bound(&self) -> ExactReal {
        match self {
            DelayDistribution::Immediate => ExactReal::zero(),
            DelayDistribution::Exponential { .. } | DelayDistribution::Erlang { .. } => {
                ExactReal::positive_infinity()
            }
            DelayDistribution::Deterministic { value } => value.clone(),
            DelayDistribution::Uniform { upper, .. } => upper.clone(),
            DelayDistribution::Piecewise { pieces } => pieces
                .iter()
                .map(|(_, hi, _)| hi.clone())
                .max()
                .unwrap_or_else(ExactReal::zero),
        }
    }

    /// Numeric density at `t` (for grid precomputation; the deterministic
    /// distribution has no density and reports zero).
    pub fn pdf(&self, t: Real) -> Result<Real> {
        if t < 0.0 {
            return Ok(0.0);
        }
        match self {
            DelayDistribution::Immediate | DelayDistribution::Deterministic { .. } => Ok(0.0),
            DelayDistribution::Exponential { rate } => {
                let l = rate.to_f64().unwrap_or(0.0);
                Ok(l * (-l * t).exp())
            }
            DelayDistribution::Uniform { lower, upper } => {
                let (a, b) = (lower.to_f64(), upper.to_f64());
                Ok(if t >= a && t <= b { 1.0 / (b - a) } else { 0.0 })
            }
            DelayDistribution::Erlang { rate, shape } => {
                let l = rate.to_f64().unwrap_or(0.0);
                let k = *shape;
                let mut fact = 1.0;
                for i in 2..k {
                    fact *= i as Real;
                }
                Ok(l.powi(k as i32) * t.powi(k as i32 - 1) * (-l * t).exp() / fact)
            }
            DelayDistribution::Piecewise { pieces } => {
                let mut value = 0.0;
                for (lo, hi, density) in pieces {
                    if t >= lo.to_f64() && t <= hi.to_f64() {
                        let vars = density.variables();
                        let mut assignment = std::collections::BTreeMap::new();
                        for v in vars {
                            assignment.insert(v, t);
                        }
                        value += density.evaluate(&assignment)?;
                    }
                }
                Ok(value)
            }
        }
    }

    /// Numeric cumulative distribution at `t`.
    pub fn cdf(&self, t: Real) -> Result<Real> {
        if t < 0.0 {
            return Ok(0.0);
        }
        match self {
            DelayDistribution::Immediate => Ok(1.0),
            DelayDistribution::Deterministic { value } => {
                Ok(if t >= value.to_f64() { 1.0 } else { 0.0 })
            }
            DelayDistribution::Exponential { rate } => {
                let l = rate.to_f64().unwrap_or(0.0);
                Ok(1.0 - (-l * t).exp())
            }
            DelayDistribution::Uniform { lower, upper } => {
                let (a, b) = (lower.to_f64(), upper.to_f64());
                Ok(((t - a) / (b - a)).clamp(0.0, 1.0))
            }
            DelayDistribution::Erlang { rate, shape } => {
                // 1 − Σ_{i<k} e^{−λt}(λt)ⁱ/i!
                let l = rate.to_f64().unwrap_or(0.0);
                let x = l * t;
                let mut term = (-x).exp();
                let mut sum = term;
                for i in 1..*shape {
                    term *= x / i as Real;
                    sum += term;
                }
                Ok(1.0 - sum)
            }
            DelayDistribution::Piecewise { pieces } => {
                let mut total = 0.0;
                for (lo, hi, density) in pieces {
                    let (a, b) = (lo.to_f64(), hi.to_f64());
                    if t <= a {
                        continue;
                    }
                    let upper = if t < b {
                        ExactReal::from_f64(t).unwrap_or_else(ExactReal::zero)
                    } else {
                        hi.clone()
                    };
                    let vars: Vec<Variable> = density.variables().into_iter().collect();
                    let piece_mass = match vars.first() {
                        Some(v) => density
                            .integrate_between(v, lo, &upper)?
                            .as_constant()
                            .map(|c| c.to_f64())
                            .unwrap_or(0.0),
                        // A constant density piece.
                        None => {
                            let width = upper.to_f64() - a;
                            density
                                .evaluate(&std::collections::BTreeMap::new())
                                .unwrap_or(0.0)
                                * width
                        }
                    };
                    total += piece_mass;
                }
                Ok(total)
            }
        }
    }
}

/// The stochastic feature of a transition: delay distribution, clock rate,
/// and immediate-firing weight.
#[derive(Clone)]
pub struct StochasticTransitionFeature {
    /// The delay distribution.
    pub distribution: DelayDistribution,
    /// Marking-dependent clock rate; must evaluate to 1 for non-EXP
    /// transitions on the paths that forbid rate scaling.
    pub clock_rate: Arc<dyn MarkingExpr>,
    /// Marking-dependent weight, used when the transition is immediate.
    pub weight: Arc<dyn MarkingExpr>,
}

impl fmt::Debug for StochasticTransitionFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StochasticTransitionFeature")
            .field("distribution", &self.distribution)
            .finish_non_exhaustive()
    }
}

impl StochasticTransitionFeature {
    /// A feature with the given distribution, unit clock rate and weight.
    pub fn new(distribution: DelayDistribution) -> Self {
        StochasticTransitionFeature {
            distribution,
            clock_rate: Arc::new(Constant(1.0)),
            weight: Arc::new(Constant(1.0)),
        }
    }

    /// An exponential transition.
    pub fn exponential(rate: BigRational) -> Self {
        Self::new(DelayDistribution::Exponential { rate })
    }

    /// A deterministic transition.
    pub fn deterministic(value: ExactReal) -> Self {
        Self::new(DelayDistribution::Deterministic { value })
    }

    /// A uniform transition.
    pub fn uniform(lower: ExactReal, upper: ExactReal) -> Self {
        Self::new(DelayDistribution::Uniform { lower, upper })
    }

    /// An Erlang transition.
    pub fn erlang(rate: BigRational, shape: u32) -> Self {
        Self::new(DelayDistribution::Erlang { rate, shape })
    }

    /// An immediate transition with constant weight.
    pub fn immediate(weight: Real) -> Self {
        let mut feature = Self::new(DelayDistribution::Immediate);
        feature.weight = Arc::new(Constant(weight));
        feature
    }

    /// Override the clock-rate expression.
    pub fn with_clock_rate(mut self, clock_rate: Arc<dyn MarkingExpr>) -> Self {
        self.clock_rate = clock_rate;
        self
    }

    /// Override the weight expression.
    pub fn with_weight(mut self, weight: Arc<dyn MarkingExpr>) -> Self {
        self.weight = weight;
        self
    }
}

/// The consumed Petri-net interface.
pub trait StochasticNet {
    /// All transitions of the net.
    fn transitions(&self) -> Vec<Transition>;

    /// The transitions enabled in a marking.
    fn enabled(&self, marking: &Marking) -> Vec<Transition>;

    /// Fire an enabled transition, producing the successor marking.
    fn fire(&self, marking: &Marking, transition: &Transition) -> Result<Marking>;

    /// The stochastic feature of a transition.
    ///
    /// A transition without a stochastic feature is a validation error.
    fn feature(&self, transition: &Transition) -> Result<&StochasticTransitionFeature>;
}
