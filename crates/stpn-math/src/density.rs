//! Piecewise state densities over difference-bound zones.
//!
//! A [`StateDensity`] is the joint distribution of the timers of a
//! stochastic state class: a list of `(zone, expolynomial)` pieces with
//! disjoint, fully-dimensional supports over the *free* variables, plus a
//! set of *Dirac* variables that carry no density dimension of their own —
//! deterministic timers, and timers that became an exact offset of another
//! timer after a firing. Dirac variables still appear in every zone (with
//! zero width against the ground or a sync partner), so all constraint
//! reasoning stays inside the DBM.
//!
//! The central operations are symbolic variable elimination with subzone
//! decomposition (`total_integral`, `marginalize_out`) and the state-class
//! successor transform (`after_firing`), which conditions the density to a
//! firing event, rebases every surviving timer on the firing instant, and
//! eliminates the fired timer.

use crate::exact::ExactReal;
use crate::expol::{Expolynomial, Sign, Variable};
use crate::zone::DbmZone;
use num_rational::BigRational;
use std::collections::BTreeSet;
use std::fmt;
use stpn_core::{ensure, fail, Error, Result, Stage};

use crate::expol::AtomicTerm;

/// One piece of a partitioned density.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Piece {
    /// The support of this piece.
    pub zone: DbmZone,
    /// The density over the free variables of the support.
    pub density: Expolynomial,
}

/// A piecewise expolynomial density over DBM supports.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateDensity {
    variables: BTreeSet<Variable>,
    dirac: BTreeSet<Variable>,
    pieces: Vec<Piece>,
}

/// A linear resolution of a variable against the free ones:
/// a representative plus an exact offset, or a constant.
enum LinearForm {
    Constant(ExactReal),
    Offset(Variable, ExactReal),
}

/// A symbolic integration bound: a constant, `x + c`, or `c − x`.
#[derive(Debug, Clone)]
enum BoundExpr {
    Const(ExactReal),
    /// `x + c`.
    PlusVar(Variable, ExactReal),
    /// `c − x`.
    MinusVar(Variable, ExactReal),
}

impl StateDensity {
    // ─── Constructors ─────────────────────────────────────────────────────────

    /// The empty density over no variables (a single unit piece).
    pub fn unit() -> Self {
        StateDensity {
            variables: BTreeSet::new(),
            dirac: BTreeSet::new(),
            pieces: vec![Piece {
                zone: DbmZone::new(std::iter::empty::<Variable>()),
                density: Expolynomial::one(),
            }],
        }
    }

    /// An exponential timer: `f(v) = λ e^{−λv}` on `[0, ∞)`.
    pub fn exponential(v: Variable, rate: BigRational) -> Result<Self> {
        ensure!(
            rate > BigRational::from_integer(0.into()),
            "exponential rate must be positive"
        );
        let mut zone = DbmZone::new([v.clone()]);
        zone.impose_bound(&Variable::ground(), &v, &ExactReal::zero())?;
        zone.normalize();
        let density = Expolynomial::from_terms(vec![crate::expol::Exmonomial::constant(
            ExactReal::from_rational(rate.clone()),
        )
        .with_term(AtomicTerm::Exponential { variable: v.clone(), rate })]);
        Ok(StateDensity {
            variables: BTreeSet::from([v]),
            dirac: BTreeSet::new(),
            pieces: vec![Piece { zone, density }],
        })
    }

    /// A uniform timer on `[a, b]`, `a < b`.
    pub fn uniform(v: Variable, a: ExactReal, b: ExactReal) -> Result<Self> {
        ensure!(a < b, "uniform support must have positive length");
        ensure!(
            a.is_finite() && b.is_finite(),
            "uniform support must be bounded"
        );
        let ground = Variable::ground();
        let mut zone = DbmZone::new([v.clone()]);
        zone.impose_bound(&v, &ground, &b)?;
        zone.impose_bound(&ground, &v, &(-a.clone()))?;
        zone.normalize();
        let density = Expolynomial::constant(ExactReal::one().div_exact(&(&b - &a)));
        Ok(StateDensity {
            variables: BTreeSet::from([v]),
            dirac: BTreeSet::new(),
            pieces: vec![Piece { zone, density }],
        })
    }

    /// A deterministic timer fixed at `value`.
    pub fn deterministic(v: Variable, value: ExactReal) -> Result<Self> {
        ensure!(value.is_finite(), "deterministic value must be finite");
        let ground = Variable::ground();
        let mut zone = DbmZone::new([v.clone()]);
        zone.impose_bound(&v, &ground, &value)?;
        zone.impose_bound(&ground, &v, &(-value.clone()))?;
        zone.normalize();
        Ok(StateDensity {
            variables: BTreeSet::from([v.clone()]),
            dirac: BTreeSet::from([v]),
            pieces: vec![Piece {
                zone,
                density: Expolynomial::one(),
            }],
        })
    }

    /// An Erlang timer: shape `k ≥ 1`, `f(v) = λᵏ v^{k−1} e^{−λv}/(k−1)!`.
    pub fn erlang(v: Variable, rate: BigRational, shape: u32) -> Result<Self> {
        ensure!(shape >= 1, "Erlang shape must be at least 1");
        ensure!(
            rate > BigRational::from_integer(0.into()),
            "Erlang rate must be positive"
        );
        let mut zone = DbmZone::new([v.clone()]);
        zone.impose_bound(&Variable::ground(), &v, &ExactReal::zero())?;
        zone.normalize();
        let mut coeff = rate.pow(shape as i32);
        for i in 2..shape {
            coeff /= BigRational::from_integer(i.into());
        }
        let mut term = crate::expol::Exmonomial::constant(ExactReal::from_rational(coeff));
        if shape > 1 {
            term.multiply_term(&AtomicTerm::Monomial {
                variable: v.clone(),
                exponent: shape - 1,
            });
        }
        term.multiply_term(&AtomicTerm::Exponential {
            variable: v.clone(),
            rate,
        });
        Ok(StateDensity {
            variables: BTreeSet::from([v]),
            dirac: BTreeSet::new(),
            pieces: vec![Piece {
                zone,
                density: Expolynomial::from_terms(vec![term]),
            }],
        })
    }

    /// A general timer from explicit expolynomial pieces over `v`.
    pub fn piecewise(v: Variable, pieces: Vec<(ExactReal, ExactReal, Expolynomial)>) -> Result<Self> {
        ensure!(!pieces.is_empty(), "a piecewise density needs pieces");
        let ground = Variable::ground();
        let mut out = Vec::with_capacity(pieces.len());
        for (lo, hi, density) in pieces {
            ensure!(lo < hi, "piece bounds must be increasing");
            let mut zone = DbmZone::new([v.clone()]);
            zone.impose_bound(&v, &ground, &hi)?;
            zone.impose_bound(&ground, &v, &(-lo.clone()))?;
            zone.normalize();
            out.push(Piece { zone, density });
        }
        Ok(StateDensity {
            variables: BTreeSet::from([v]),
            dirac: BTreeSet::new(),
            pieces: out,
        })
    }

    /// Build from raw parts. Pieces must share a variable set.
    pub fn from_parts(dirac: BTreeSet<Variable>, pieces: Vec<Piece>) -> Result<Self> {
        ensure!(!pieces.is_empty(), "a state density needs pieces");
        let variables: BTreeSet<Variable> =
            pieces[0].zone.variables().iter().cloned().collect();
        for p in &pieces {
            ensure!(
                p.zone.variables().iter().cloned().collect::<BTreeSet<_>>() == variables,
                "pieces must share one variable set"
            );
        }
        ensure!(
            dirac.is_subset(&variables),
            "Dirac variables must belong to the density"
        );
        Ok(StateDensity {
            variables,
            dirac,
            pieces,
        })
    }

    // ─── Accessors ────────────────────────────────────────────────────────────

    /// All variables of the density.
    pub fn variables(&self) -> &BTreeSet<Variable> {
        &self.variables
    }

    /// Variables carrying no density dimension.
    pub fn dirac_variables(&self) -> &BTreeSet<Variable> {
        &self.dirac
    }

    /// The free (density-carrying) variables.
    pub fn free_variables(&self) -> BTreeSet<Variable> {
        self.variables.difference(&self.dirac).cloned().collect()
    }

    /// The pieces of the partition.
    pub fn pieces(&self) -> &[Piece] {
        &self.pieces
    }

    /// True when `v` belongs to the density.
    pub fn has_variable(&self, v: &Variable) -> bool {
        self.variables.contains(v)
    }

    /// The tightest upper bound of `a − b` across the pieces.
    pub fn max_bound(&self, a: &Variable, b: &Variable) -> ExactReal {
        self.pieces
            .iter()
            .map(|p| p.zone.bound(a, b).clone())
            .max()
            .unwrap_or_else(ExactReal::positive_infinity)
    }

    /// The lowest value `a − b` can take across the pieces.
    pub fn min_bound(&self, a: &Variable, b: &Variable) -> ExactReal {
        self.pieces
            .iter()
            .map(|p| p.zone.min_bound(a, b))
            .min()
            .unwrap_or_else(ExactReal::negative_infinity)
    }

    /// True if some piece admits `v ≤ u` for every `u` in `others`.
    pub fn can_be_lowest(&self, v: &Variable, others: &[Variable]) -> bool {
        self.pieces
            .iter()
            .any(|p| p.zone.can_variable_be_lowest_or_equal(v, others))
    }

    // ─── Products and restrictions ────────────────────────────────────────────

    /// Independent product with a density over disjoint variables.
    pub fn cartesian_product(&self, other: &StateDensity) -> Result<StateDensity> {
        let mut pieces = Vec::with_capacity(self.pieces.len() * other.pieces.len());
        for a in &self.pieces {
            for b in &other.pieces {
                pieces.push(Piece {
                    zone: a.zone.cartesian_product(&b.zone)?,
                    density: &a.density * &b.density,
                });
            }
        }
        let mut dirac = self.dirac.clone();
        dirac.extend(other.dirac.iter().cloned());
        let mut variables = self.variables.clone();
        variables.extend(other.variables.iter().cloned());
        Ok(StateDensity {
            variables,
            dirac,
            pieces,
        })
    }

    /// Restrict the support with `from − to ≤ bound` constraints, dropping
    /// pieces that become empty or lose a free dimension.
    pub fn impose(
        &self,
        constraints: &[(Variable, Variable, ExactReal)],
    ) -> Result<StateDensity> {
        let free = self.free_variables();
        let mut pieces = Vec::with_capacity(self.pieces.len());
        for piece in &self.pieces {
            let mut zone = piece.zone.clone();
            for (a, b, c) in constraints {
                zone.impose_bound(a, b, c)?;
            }
            zone.normalize();
            if zone.is_empty() || !full_dimensional_over(&zone, &free) {
                continue;
            }
            pieces.push(Piece {
                zone,
                density: piece.density.clone(),
            });
        }
        Ok(StateDensity {
            variables: self.variables.clone(),
            dirac: self.dirac.clone(),
            pieces,
        })
    }

    /// True when no support remains.
    pub fn is_vacuous(&self) -> bool {
        self.pieces.is_empty()
    }

    // ─── Integration ──────────────────────────────────────────────────────────

    /// The total mass of the density.
    pub fn total_integral(&self) -> Result<ExactReal> {
        let mut total = ExactReal::zero();
        for piece in &self.pieces {
            let mut zone = piece.zone.normalized();
            for d in &self.dirac {
                zone.project(d);
            }
            let mut parts = vec![(zone, piece.density.clone())];
            loop {
                let Some(v) = parts
                    .iter()
                    .flat_map(|(z, _)| z.variables().iter())
                    .next()
                    .cloned()
                else {
                    break;
                };
                let mut next = Vec::new();
                for (z, f) in parts {
                    if z.has_variable(&v) {
                        let free: BTreeSet<Variable> = z
                            .variables()
                            .iter()
                            .filter(|u| *u != &v)
                            .cloned()
                            .collect();
                        next.extend(integrate_out(&z, &f, &v, &free)?);
                    } else {
                        next.push((z, f));
                    }
                }
                parts = next;
            }
            for (_, f) in parts {
                let value = f.as_constant().ok_or_else(|| {
                    Error::numeric(
                        Stage::SymbolicIntegration,
                        "residual variables after elimination",
                    )
                })?;
                total = &total + &value;
            }
        }
        Ok(total)
    }

    /// Mass of the region satisfying `from − to ≤ bound` constraints.
    pub fn probability_of(
        &self,
        constraints: &[(Variable, Variable, ExactReal)],
    ) -> Result<ExactReal> {
        self.impose(constraints)?.total_integral()
    }

    /// Eliminate one variable, marginalizing the density onto the rest.
    pub fn marginalize_out(&self, v: &Variable) -> Result<StateDensity> {
        ensure!(self.has_variable(v), "unknown variable {v}");
        let mut variables = self.variables.clone();
        variables.remove(v);
        let mut dirac = self.dirac.clone();
        if dirac.remove(v) {
            // A Dirac dimension carries its whole mass: drop the zone column.
            let pieces = self
                .pieces
                .iter()
                .map(|p| {
                    let mut zone = p.zone.normalized();
                    zone.project(v);
                    Piece {
                        zone,
                        density: p.density.clone(),
                    }
                })
                .collect();
            return Ok(StateDensity {
                variables,
                dirac,
                pieces,
            });
        }
        // Any Dirac variable synced to `v` must be re-expressed first; with
        // the engine's firing rules this does not arise, so reject it.
        for d in &self.dirac {
            for p in &self.pieces {
                let z = p.zone.normalized();
                let width = z.bound(d, v) + z.bound(v, d);
                ensure!(
                    !width.is_zero(),
                    "cannot marginalize {v}: {d} is synchronized to it"
                );
            }
        }
        let mut free = self.free_variables();
        free.remove(v);
        let mut pieces = Vec::new();
        for piece in &self.pieces {
            let zone = piece.zone.normalized();
            for (zone, density) in integrate_out(&zone, &piece.density, v, &free)? {
                pieces.push(Piece { zone, density });
            }
        }
        Ok(StateDensity {
            variables,
            dirac,
            pieces,
        })
    }

    /// The marginal density of a single variable.
    pub fn marginal(&self, v: &Variable) -> Result<StateDensity> {
        ensure!(self.has_variable(v), "unknown variable {v}");
        let mut result = self.clone();
        let others: Vec<Variable> = self
            .variables
            .iter()
            .filter(|u| *u != v)
            .cloned()
            .collect();
        for u in &others {
            result = result.marginalize_out(u)?;
        }
        Ok(result)
    }

    /// Scale every piece by a constant.
    pub fn scale(&self, factor: &ExactReal) -> StateDensity {
        StateDensity {
            variables: self.variables.clone(),
            dirac: self.dirac.clone(),
            pieces: self
                .pieces
                .iter()
                .map(|p| Piece {
                    zone: p.zone.clone(),
                    density: p.density.scale(factor),
                })
                .collect(),
        }
    }

    /// Condition the density to `v` being the minimum among `others`.
    ///
    /// Returns the conditioned density and the probability of the event.
    pub fn condition_to_minimum(
        &self,
        v: &Variable,
        others: &[Variable],
    ) -> Result<Option<(StateDensity, ExactReal)>> {
        let constraints: Vec<_> = others
            .iter()
            .filter(|u| *u != v)
            .map(|u| (v.clone(), u.clone(), ExactReal::zero()))
            .collect();
        let restricted = self.impose(&constraints)?;
        let probability = restricted.total_integral()?;
        if probability.is_zero() {
            return Ok(None);
        }
        let inverse = ExactReal::one().div_exact(&probability);
        Ok(Some((restricted.scale(&inverse), probability)))
    }

    /// The expected value of a timer.
    pub fn mean_value(&self, v: &Variable) -> Result<ExactReal> {
        ensure!(self.has_variable(v), "unknown variable {v}");
        let mut total = ExactReal::zero();
        for piece in &self.pieces {
            let zone = piece.zone.normalized();
            let contribution = match self.linear_form(v, &zone)? {
                LinearForm::Constant(d) => {
                    let mass = StateDensity {
                        variables: self.variables.clone(),
                        dirac: self.dirac.clone(),
                        pieces: vec![piece.clone()],
                    }
                    .total_integral()?;
                    &d * &mass
                }
                LinearForm::Offset(u, c) => {
                    let weighted = &piece.density
                        * &Expolynomial::from_terms(vec![crate::expol::Exmonomial::constant(
                            ExactReal::one(),
                        )
                        .with_term(AtomicTerm::Monomial {
                            variable: u.clone(),
                            exponent: 1,
                        })]);
                    let base = StateDensity {
                        variables: self.variables.clone(),
                        dirac: self.dirac.clone(),
                        pieces: vec![Piece {
                            zone: piece.zone.clone(),
                            density: weighted,
                        }],
                    }
                    .total_integral()?;
                    let mass = StateDensity {
                        variables: self.variables.clone(),
                        dirac: self.dirac.clone(),
                        pieces: vec![piece.clone()],
                    }
                    .total_integral()?;
                    &base + &(&c * &mass)
                }
            };
            total = &total + &contribution;
        }
        Ok(total)
    }

    /// Resolve a variable as a free variable, an exact offset of one, or a
    /// constant, against one piece's zone.
    fn linear_form(&self, v: &Variable, zone: &DbmZone) -> Result<LinearForm> {
        if !self.dirac.contains(v) {
            return Ok(LinearForm::Offset(v.clone(), ExactReal::zero()));
        }
        if let Some(d) = zone.fixed_value(v) {
            return Ok(LinearForm::Constant(d));
        }
        for u in self.free_variables() {
            let width = zone.bound(v, &u) + zone.bound(&u, v);
            if width.is_zero() {
                return Ok(LinearForm::Offset(u.clone(), zone.bound(v, &u).clone()));
            }
        }
        fail!("Dirac variable {v} has no resolution against the free ones")
    }

    // ─── The successor transform ──────────────────────────────────────────────

    /// Condition to `t` firing first among `others`, rebase every surviving
    /// timer on the firing instant, and eliminate the fired timer.
    ///
    /// Returns `None` when the firing event has zero probability, otherwise
    /// the renormalized successor density and the firing probability.
    /// A zero-probability division never happens here: the caller observes
    /// `None` instead.
    pub fn after_firing(
        &self,
        t: &Variable,
        others: &[Variable],
    ) -> Result<Option<(StateDensity, ExactReal)>> {
        ensure!(self.has_variable(t), "unknown fired variable {t}");
        let constraints: Vec<_> = others
            .iter()
            .filter(|u| *u != t)
            .map(|u| (t.clone(), u.clone(), ExactReal::zero()))
            .collect();
        let restricted = self.impose(&constraints)?;
        if restricted.is_vacuous() {
            return Ok(None);
        }
        let probability = restricted.total_integral()?;
        if probability.is_zero() {
            return Ok(None);
        }

        // A Dirac fired timer synced to a free one hands its zone relation
        // over: the free partner becomes the Dirac survivor.
        let mut restricted = restricted;
        if restricted.dirac.contains(t) {
            let form = restricted.linear_form(t, &restricted.pieces[0].zone.normalized())?;
            if let LinearForm::Offset(u, c) = form {
                for piece in &mut restricted.pieces {
                    // u := t − c inside the density.
                    piece.density =
                        piece
                            .density
                            .substitute_linear(&u, &[(Sign::Plus, t.clone())], &(-c.clone()));
                }
                restricted.dirac.remove(t);
                restricted.dirac.insert(u);
            }
        }

        let survivors: Vec<Variable> = restricted
            .variables
            .iter()
            .filter(|u| *u != t)
            .cloned()
            .collect();
        let free_survivors: Vec<Variable> = survivors
            .iter()
            .filter(|u| !restricted.dirac.contains(*u))
            .cloned()
            .collect();

        let mut new_dirac: BTreeSet<Variable> = restricted
            .dirac
            .iter()
            .filter(|u| *u != t)
            .cloned()
            .collect();
        let mut carrier_promoted: Option<Variable> = None;

        let mut pieces = Vec::new();
        for piece in &restricted.pieces {
            let z1 = piece.zone.normalized();
            let zprime = successor_zone(&z1, t, &survivors)?;
            if zprime.is_empty() {
                continue;
            }
            // Rebase the density: every free survivor reads as "remaining
            // time after the firing", so x_u stands for x_u + x_t.
            let mut f2 = piece.density.clone();
            for u in &free_survivors {
                f2 = f2.shift(u, t);
            }
            if restricted.dirac.contains(t) {
                // Fired timer at a known point value.
                let value = z1.fixed_value(t).ok_or_else(|| {
                    Error::Structural(format!("Dirac fired timer {t} has no fixed value"))
                })?;
                pieces.push(Piece {
                    zone: zprime,
                    density: f2.substitute(t, &value),
                });
            } else if let Some(carrier) = restricted
                .dirac
                .iter()
                .find(|d| *d != t && z1.fixed_value(d).is_some())
                .cloned()
            {
                // A ground-fixed Dirac survivor absorbs the fired timer's
                // randomness: x_t = d − carrier' exactly.
                let d = z1.fixed_value(&carrier).expect("carrier is ground-fixed");
                pieces.push(Piece {
                    zone: zprime,
                    density: f2.substitute_linear(t, &[(Sign::Minus, carrier.clone())], &d),
                });
                carrier_promoted = Some(carrier);
            } else {
                pieces.extend(integrate_fired(&zprime, &f2, t, &z1, &free_survivors)?);
            }
        }
        if let Some(carrier) = carrier_promoted {
            new_dirac.remove(&carrier);
        }
        if pieces.is_empty() {
            return Ok(None);
        }

        let inverse = ExactReal::one().div_exact(&probability);
        let variables: BTreeSet<Variable> = survivors.into_iter().collect();
        let density = StateDensity {
            variables,
            dirac: new_dirac,
            pieces: pieces
                .into_iter()
                .map(|p| Piece {
                    zone: p.zone,
                    density: p.density.scale(&inverse),
                })
                .collect(),
        };
        Ok(Some((density, probability)))
    }
}

/// The zone of the successor class: difference bounds are unchanged,
/// ground bounds become the old bounds against the fired timer.
fn successor_zone(z1: &DbmZone, t: &Variable, survivors: &[Variable]) -> Result<DbmZone> {
    let ground = Variable::ground();
    let mut zone = DbmZone::new(survivors.iter().cloned());
    for u in survivors {
        zone.impose_bound(u, &ground, z1.bound(u, t))?;
        zone.impose_bound(&ground, u, z1.bound(t, u))?;
        for w in survivors {
            if u != w {
                zone.impose_bound(u, w, z1.bound(u, w))?;
            }
        }
    }
    zone.normalize();
    Ok(zone)
}

/// Check full-dimensionality restricted to the given variables.
fn full_dimensional_over(zone: &DbmZone, free: &BTreeSet<Variable>) -> bool {
    let mut z = zone.normalized();
    let others: Vec<Variable> = z
        .variables()
        .iter()
        .filter(|v| !free.contains(*v))
        .cloned()
        .collect();
    for v in &others {
        z.project(v);
    }
    z.is_full_dimensional()
}

/// Eliminate `v` from a single `(zone, density)` pair by splitting on the
/// active lower/upper bound pair and integrating symbolically. The `free`
/// set tells which dimensions must stay full after the split.
fn integrate_out(
    zone: &DbmZone,
    density: &Expolynomial,
    v: &Variable,
    free: &BTreeSet<Variable>,
) -> Result<Vec<(DbmZone, Expolynomial)>> {
    let ground = Variable::ground();
    let z = zone.normalized();

    let mut lowers: Vec<BoundExpr> = Vec::new();
    let mut uppers: Vec<BoundExpr> = Vec::new();
    lowers.push(BoundExpr::Const(-z.bound(&ground, v).clone()));
    uppers.push(BoundExpr::Const(z.bound(v, &ground).clone()));
    for u in z.variables() {
        if u == v {
            continue;
        }
        // x_v ≥ x_u − c[u][v]
        if z.bound(u, v).is_finite() {
            lowers.push(BoundExpr::PlusVar(u.clone(), -z.bound(u, v).clone()));
        }
        // x_v ≤ x_u + c[v][u]
        if z.bound(v, u).is_finite() {
            uppers.push(BoundExpr::PlusVar(u.clone(), z.bound(v, u).clone()));
        }
    }

    let primitive = density.integrate(v);
    let mut out = Vec::new();
    for lo in &lowers {
        for hi in &uppers {
            let mut sub = z.clone();
            if !(impose_dominates(&mut sub, lo, &lowers, true)?
                && impose_dominates(&mut sub, hi, &uppers, false)?)
            {
                continue;
            }
            sub.normalize();
            if sub.is_empty() {
                continue;
            }
            sub.project(v);
            if sub.is_empty() || !full_dimensional_over(&sub, free) {
                continue;
            }
            let value = &substitute_bound(&primitive, v, hi)?
                - &substitute_bound(&primitive, v, lo)?;
            out.push((sub, value));
        }
    }
    Ok(out)
}

/// Eliminate the fired timer: its bounds live in the predecessor zone
/// `z1` but must be expressed in successor coordinates, where they read
/// `c − x_u` for the surviving timers.
fn integrate_fired(
    zprime: &DbmZone,
    density: &Expolynomial,
    t: &Variable,
    z1: &DbmZone,
    free_survivors: &[Variable],
) -> Result<Vec<Piece>> {
    let ground = Variable::ground();
    let mut lowers: Vec<BoundExpr> = Vec::new();
    let mut uppers: Vec<BoundExpr> = Vec::new();
    lowers.push(BoundExpr::Const(-z1.bound(&ground, t).clone()));
    uppers.push(BoundExpr::Const(z1.bound(t, &ground).clone()));
    for u in free_survivors {
        // x_t ≥ −c[*][u] − x_u'
        if z1.bound(&ground, u).is_finite() {
            lowers.push(BoundExpr::MinusVar(u.clone(), -z1.bound(&ground, u).clone()));
        }
        // x_t ≤ c[u][*] − x_u'
        if z1.bound(u, &ground).is_finite() {
            uppers.push(BoundExpr::MinusVar(u.clone(), z1.bound(u, &ground).clone()));
        }
    }

    let primitive = density.integrate(t);
    let mut out = Vec::new();
    for lo in &lowers {
        for hi in &uppers {
            let mut sub = zprime.clone();
            if !(impose_dominates(&mut sub, lo, &lowers, true)?
                && impose_dominates(&mut sub, hi, &uppers, false)?)
            {
                continue;
            }
            sub.normalize();
            if sub.is_empty() {
                continue;
            }
            let free: BTreeSet<Variable> = free_survivors.iter().cloned().collect();
            if !full_dimensional_over(&sub, &free) {
                continue;
            }
            let value = &substitute_bound(&primitive, t, hi)?
                - &substitute_bound(&primitive, t, lo)?;
            out.push(Piece {
                zone: sub,
                density: value,
            });
        }
    }
    Ok(out)
}

/// Impose on `zone` that `chosen` dominates every other candidate: it is
/// the maximum of the lower bounds (`as_lower`) or the minimum of the upper
/// bounds. Returns false when the choice is infeasible outright.
fn impose_dominates(
    zone: &mut DbmZone,
    chosen: &BoundExpr,
    all: &[BoundExpr],
    as_lower: bool,
) -> Result<bool> {
    let ground = Variable::ground();
    for other in all {
        if std::ptr::eq(chosen, other) {
            continue;
        }
        // Require chosen − other ≥ 0 for lowers, ≤ 0 for uppers; rewrite
        // both as a difference bound.
        let (a, b) = if as_lower { (other, chosen) } else { (chosen, other) };
        // Now require a ≤ b.
        let feasible = match (a, b) {
            (BoundExpr::Const(ca), BoundExpr::Const(cb)) => ca <= cb,
            (BoundExpr::Const(ca), BoundExpr::PlusVar(ub, cb)) => {
                // ca ≤ x_b + cb  ⟺  −x_b ≤ cb − ca
                tighten(zone, &ground, ub, cb - ca)?
            }
            (BoundExpr::PlusVar(ua, ca), BoundExpr::Const(cb)) => {
                // x_a + ca ≤ cb
                tighten(zone, ua, &ground, cb - ca)?
            }
            (BoundExpr::PlusVar(ua, ca), BoundExpr::PlusVar(ub, cb)) => {
                if ua == ub {
                    ca <= cb
                } else {
                    // x_a − x_b ≤ cb − ca
                    tighten(zone, ua, ub, cb - ca)?
                }
            }
            (BoundExpr::Const(ca), BoundExpr::MinusVar(ub, cb)) => {
                // ca ≤ cb − x_b  ⟺  x_b ≤ cb − ca
                tighten(zone, ub, &ground, cb - ca)?
            }
            (BoundExpr::MinusVar(ua, ca), BoundExpr::Const(cb)) => {
                // ca − x_a ≤ cb  ⟺  −x_a ≤ cb − ca
                tighten(zone, &ground, ua, cb - ca)?
            }
            (BoundExpr::MinusVar(ua, ca), BoundExpr::MinusVar(ub, cb)) => {
                if ua == ub {
                    ca <= cb
                } else {
                    // ca − x_a ≤ cb − x_b  ⟺  x_b − x_a ≤ cb − ca
                    tighten(zone, ub, ua, cb - ca)?
                }
            }
            _ => {
                return Err(Error::numeric(
                    Stage::SymbolicIntegration,
                    "mixed-sign integration bounds",
                ));
            }
        };
        if !feasible {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Tighten `a − b ≤ bound`, pruning choices that are infeasible outright
/// (`−∞`) and skipping vacuous ones (`+∞`).
fn tighten(zone: &mut DbmZone, a: &Variable, b: &Variable, bound: ExactReal) -> Result<bool> {
    match bound {
        ExactReal::NegativeInfinity => Ok(false),
        ExactReal::PositiveInfinity => Ok(true),
        finite => {
            zone.impose_bound(a, b, &finite)?;
            Ok(true)
        }
    }
}

/// Substitute a symbolic bound for `v` in the primitive.
fn substitute_bound(
    primitive: &Expolynomial,
    v: &Variable,
    bound: &BoundExpr,
) -> Result<Expolynomial> {
    match bound {
        BoundExpr::Const(c) if c.is_finite() => Ok(primitive.substitute(v, &c.to_center())),
        BoundExpr::Const(c) => primitive.value_at_infinity(
            v,
            if *c == ExactReal::PositiveInfinity {
                crate::expol::LimitDirection::PlusInfinity
            } else {
                crate::expol::LimitDirection::MinusInfinity
            },
        ),
        BoundExpr::PlusVar(u, c) => {
            Ok(primitive.substitute_linear(v, &[(Sign::Plus, u.clone())], &c.to_center()))
        }
        BoundExpr::MinusVar(u, c) => {
            Ok(primitive.substitute_linear(v, &[(Sign::Minus, u.clone())], &c.to_center()))
        }
    }
}

impl fmt::Display for StateDensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, piece) in self.pieces.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{{{}}} on {{{}}}", piece.density, piece.zone)?;
        }
        Ok(())
    }
}
