//! Difference-bound zones.
//!
//! A [`DbmZone`] stores pairwise upper bounds `xᵢ − xⱼ ≤ c[i][j]` over a set
//! of variables plus the ground `t*` (index 0), as an `(n+1)×(n+1)` matrix
//! of [`ExactReal`]. Strict bounds are encoded through the left-neighborhood
//! tag of the bound value; `−∞` bounds are rejected.
//!
//! Normalization is the all-pairs shortest-path closure, skipping `k == i`
//! and `k == j` so that the diagonal stays at its `+∞` convention; it is
//! idempotent and guarded by a flag. Emptiness and full-dimensionality are
//! read off pair sums `c[i][j] + c[j][i]` afterwards.

use crate::exact::ExactReal;
use crate::expol::Variable;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use stpn_core::{ensure, Result};

/// A difference-bound zone over a variable set plus the ground.
#[derive(Debug, Clone)]
pub struct DbmZone {
    /// Index 0 is the ground variable; the rest are sorted by name.
    variables: Vec<Variable>,
    index: BTreeMap<Variable, usize>,
    /// Flat `(n+1)×(n+1)` row-major bound matrix.
    bounds: Vec<ExactReal>,
    normalized: bool,
}

impl DbmZone {
    /// An unconstrained zone over the given (non-ground) variables.
    pub fn new(variables: impl IntoIterator<Item = Variable>) -> Self {
        let mut vars: Vec<Variable> = variables.into_iter().collect();
        vars.sort();
        vars.dedup();
        assert!(
            !vars.iter().any(|v| v.is_ground()),
            "the ground variable is implicit"
        );
        let mut all = Vec::with_capacity(vars.len() + 1);
        all.push(Variable::ground());
        all.extend(vars);
        let dim = all.len();
        let index = all
            .iter()
            .enumerate()
            .map(|(i, v)| (v.clone(), i))
            .collect();
        DbmZone {
            variables: all,
            index,
            bounds: vec![ExactReal::positive_infinity(); dim * dim],
            normalized: true,
        }
    }

    /// The non-ground variables of the zone, in index order.
    pub fn variables(&self) -> &[Variable] {
        &self.variables[1..]
    }

    /// Number of non-ground variables.
    pub fn dimension(&self) -> usize {
        self.variables.len() - 1
    }

    /// True if `v` is the ground or one of the zone's variables.
    pub fn has_variable(&self, v: &Variable) -> bool {
        self.index.contains_key(v)
    }

    fn idx(&self, v: &Variable) -> usize {
        *self
            .index
            .get(v)
            .unwrap_or_else(|| panic!("variable {v} not in zone"))
    }

    fn at(&self, i: usize, j: usize) -> &ExactReal {
        &self.bounds[i * self.variables.len() + j]
    }

    fn set(&mut self, i: usize, j: usize, value: ExactReal) {
        let dim = self.variables.len();
        self.bounds[i * dim + j] = value;
    }

    /// The upper bound on `a − b`.
    pub fn bound(&self, a: &Variable, b: &Variable) -> &ExactReal {
        self.at(self.idx(a), self.idx(b))
    }

    /// The lower bound on `a − b` (the negated reverse bound).
    pub fn min_bound(&self, a: &Variable, b: &Variable) -> ExactReal {
        -self.bound(b, a).clone()
    }

    /// Tighten the bound `a − b ≤ value`. Loosening is ignored.
    ///
    /// `−∞` is not an admissible bound.
    pub fn impose_bound(&mut self, a: &Variable, b: &Variable, value: &ExactReal) -> Result<()> {
        ensure!(
            *value != ExactReal::NegativeInfinity,
            "a DBM bound cannot be −∞"
        );
        let (i, j) = (self.idx(a), self.idx(b));
        if value < self.at(i, j) {
            self.set(i, j, value.clone());
            self.normalized = false;
        }
        Ok(())
    }

    /// True once [`DbmZone::normalize`] has run and no bound changed since.
    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    /// All-pairs shortest-path closure (Floyd–Warshall), skipping `k == i`
    /// and `k == j` so the `+∞` diagonal is preserved. Idempotent.
    pub fn normalize(&mut self) {
        if self.normalized {
            return;
        }
        let dim = self.variables.len();
        for k in 0..dim {
            for i in 0..dim {
                if i == k || self.at(i, k).is_infinite() {
                    continue;
                }
                for j in 0..dim {
                    if j == k || j == i || self.at(k, j).is_infinite() {
                        continue;
                    }
                    // Finite + finite: no indeterminate form possible.
                    let through = self.at(i, k) + self.at(k, j);
                    if &through < self.at(i, j) {
                        self.set(i, j, through);
                    }
                }
            }
        }
        self.normalized = true;
    }

    /// A normalized copy.
    pub fn normalized(&self) -> DbmZone {
        let mut z = self.clone();
        z.normalize();
        z
    }

    /// True when the zone contains no point.
    ///
    /// Requires a normalized zone.
    pub fn is_empty(&self) -> bool {
        debug_assert!(self.normalized, "is_empty requires a normalized zone");
        let dim = self.variables.len();
        let zero = ExactReal::zero();
        for i in 0..dim {
            for j in (i + 1)..dim {
                if let Some(sum) = self.at(i, j).checked_add(self.at(j, i)) {
                    if sum < zero {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// True when no pair of variables is constrained to a fixed difference.
    ///
    /// Requires a normalized zone.
    pub fn is_full_dimensional(&self) -> bool {
        debug_assert!(self.normalized, "requires a normalized zone");
        let dim = self.variables.len();
        let zero = ExactReal::zero();
        for i in 0..dim {
            for j in (i + 1)..dim {
                match self.at(i, j).checked_add(self.at(j, i)) {
                    Some(sum) if sum > zero => {}
                    None => {}
                    _ => return false,
                }
            }
        }
        true
    }

    /// The width `sup(v) − inf(v)` of a variable against the ground.
    pub fn width(&self, v: &Variable) -> ExactReal {
        let i = self.idx(v);
        self.at(i, 0) + self.at(0, i)
    }

    /// The point value of a zero-width variable, if it has one.
    pub fn fixed_value(&self, v: &Variable) -> Option<ExactReal> {
        if self.width(v).is_zero() {
            Some(self.bound(v, &Variable::ground()).clone())
        } else {
            None
        }
    }

    /// Remove one dimension, preserving the reachable constraints on the
    /// remaining variables.
    ///
    /// The ground cannot be projected away.
    pub fn project(&mut self, v: &Variable) {
        assert!(!v.is_ground(), "cannot project the ground variable");
        self.normalize();
        let gone = self.idx(v);
        let dim = self.variables.len();
        let mut bounds = Vec::with_capacity((dim - 1) * (dim - 1));
        for i in 0..dim {
            if i == gone {
                continue;
            }
            for j in 0..dim {
                if j == gone {
                    continue;
                }
                bounds.push(self.at(i, j).clone());
            }
        }
        self.variables.remove(gone);
        self.bounds = bounds;
        self.index = self
            .variables
            .iter()
            .enumerate()
            .map(|(i, v)| (v.clone(), i))
            .collect();
        // The closure of a normalized matrix minus one row/column is still
        // normalized.
    }

    /// Combine two zones over disjoint variable sets; cross bounds are the
    /// one-step paths through the ground.
    pub fn cartesian_product(&self, other: &DbmZone) -> Result<DbmZone> {
        for v in other.variables() {
            ensure!(
                !self.has_variable(v),
                "cartesian product requires disjoint variables, {v} overlaps"
            );
        }
        let mut vars: Vec<Variable> = self.variables().to_vec();
        vars.extend(other.variables().iter().cloned());
        let mut result = DbmZone::new(vars);
        let ground = Variable::ground();
        for side in [self, other] {
            for a in side.variables.iter() {
                for b in side.variables.iter() {
                    if a != b {
                        result.impose_bound(a, b, side.bound(a, b))?;
                    }
                }
            }
        }
        // One-step update through the ground for cross pairs.
        for a in self.variables() {
            for b in other.variables() {
                if let Some(cross) = self
                    .bound(a, &ground)
                    .checked_add(other.bound(&ground, b))
                {
                    result.impose_bound(a, b, &cross)?;
                }
                if let Some(cross) = other
                    .bound(b, &ground)
                    .checked_add(self.bound(&ground, a))
                {
                    result.impose_bound(b, a, &cross)?;
                }
            }
        }
        result.normalized = false;
        result.normalize();
        Ok(result)
    }

    /// Pointwise minimum of the bound matrices; both zones must range over
    /// the same variables.
    pub fn intersect(&self, other: &DbmZone) -> Result<DbmZone> {
        ensure!(
            self.variables == other.variables,
            "intersection requires equal variable sets"
        );
        let mut result = self.clone();
        for a in &self.variables {
            for b in &self.variables {
                if a != b {
                    result.impose_bound(a, b, other.bound(a, b))?;
                }
            }
        }
        result.normalize();
        Ok(result)
    }

    /// True when the assignment (ground = 0) satisfies every bound.
    pub fn contains_point(&self, point: &BTreeMap<Variable, ExactReal>) -> bool {
        let value = |v: &Variable| -> Option<ExactReal> {
            if v.is_ground() {
                Some(ExactReal::zero())
            } else {
                point.get(v).cloned()
            }
        };
        for a in &self.variables {
            for b in &self.variables {
                if a == b {
                    continue;
                }
                let (Some(pa), Some(pb)) = (value(a), value(b)) else {
                    return false;
                };
                if &pa - &pb > *self.bound(a, b) {
                    return false;
                }
            }
        }
        true
    }

    /// True when every point of `other` lies in `self` (same variables).
    pub fn contains_zone(&self, other: &DbmZone) -> bool {
        if self.variables != other.variables {
            return false;
        }
        let this = self.normalized();
        let that = other.normalized();
        for a in &this.variables {
            for b in &this.variables {
                if a != b && that.bound(a, b) > this.bound(a, b) {
                    return false;
                }
            }
        }
        true
    }

    /// True iff the zone admits `v ≤ x` for every `x` in `others`.
    pub fn can_variable_be_lowest_or_equal(&self, v: &Variable, others: &[Variable]) -> bool {
        let mut restricted = self.clone();
        for u in others {
            if u == v {
                continue;
            }
            if restricted
                .impose_bound(v, u, &ExactReal::zero())
                .is_err()
            {
                return false;
            }
        }
        restricted.normalize();
        !restricted.is_empty()
    }

    /// Value-equality after normalizing both sides (variable order is
    /// immaterial; the index permutation is resolved by name).
    pub fn equivalent(&self, other: &DbmZone) -> bool {
        if self.index.len() != other.index.len()
            || !self.index.keys().eq(other.index.keys())
        {
            return false;
        }
        let this = self.normalized();
        let that = other.normalized();
        this.index.keys().all(|a| {
            that.index.keys().all(|b| a == b || this.bound(a, b) == that.bound(a, b))
        })
    }
}

/// Equality compares bounds under the name permutation. Callers that may
/// hold unnormalized zones should use [`DbmZone::equivalent`]; the engine
/// keeps zones normalized at rest, which makes this consistent with `Hash`.
impl PartialEq for DbmZone {
    fn eq(&self, other: &Self) -> bool {
        if self.index.len() != other.index.len()
            || !self.index.keys().eq(other.index.keys())
        {
            return false;
        }
        self.index.keys().all(|a| {
            other
                .index
                .keys()
                .all(|b| a == b || self.bound(a, b) == other.bound(a, b))
        })
    }
}

impl Eq for DbmZone {}

impl Hash for DbmZone {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for a in self.index.keys() {
            a.hash(state);
            for b in self.index.keys() {
                if a != b {
                    self.bound(a, b).hash(state);
                }
            }
        }
    }
}

impl fmt::Display for DbmZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for a in &self.variables {
            for b in &self.variables {
                if a == b || self.at(self.idx(a), self.idx(b)).is_infinite() {
                    continue;
                }
                if !first {
                    write!(f, ", ")?;
                }
                write!(f, "{a} - {b} <= {}", self.bound(a, b))?;
                first = false;
            }
        }
        if first {
            write!(f, "(unconstrained)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(s: &str) -> Variable {
        Variable::new(s)
    }

    fn dec(s: &str) -> ExactReal {
        ExactReal::from_decimal_str(s).unwrap()
    }

    /// `0 ≤ x ≤ hi` for every listed variable.
    fn box_zone(vars: &[(&str, &str)]) -> DbmZone {
        let ground = Variable::ground();
        let mut z = DbmZone::new(vars.iter().map(|(v, _)| var(v)));
        for (v, hi) in vars {
            z.impose_bound(&var(v), &ground, &dec(hi)).unwrap();
            z.impose_bound(&ground, &var(v), &ExactReal::zero()).unwrap();
        }
        z.normalize();
        z
    }

    #[test]
    fn normalization_is_idempotent_and_triangular() {
        let mut z = box_zone(&[("x", "2"), ("y", "3")]);
        z.impose_bound(&var("x"), &var("y"), &dec("1")).unwrap();
        z.normalize();
        let snapshot = z.clone();
        z.normalized = false;
        z.normalize();
        assert_eq!(z, snapshot);
        // Triangle inequality on all triples.
        let all: Vec<Variable> =
            std::iter::once(Variable::ground()).chain(z.variables().to_vec()).collect();
        for i in &all {
            for j in &all {
                for k in &all {
                    if i == j || j == k || i == k {
                        continue;
                    }
                    if let Some(path) = z.bound(i, k).checked_add(z.bound(k, j)) {
                        assert!(*z.bound(i, j) <= path);
                    }
                }
            }
        }
    }

    #[test]
    fn empty_zone_detected() {
        let ground = Variable::ground();
        let mut z = DbmZone::new([var("x")]);
        z.impose_bound(&var("x"), &ground, &dec("1")).unwrap();
        z.impose_bound(&ground, &var("x"), &dec("-2")).unwrap(); // x ≥ 2
        z.normalize();
        assert!(z.is_empty());
    }

    #[test]
    fn strict_bounds_make_degenerate_zones_empty() {
        use crate::exact::Side;
        let ground = Variable::ground();
        let mut z = DbmZone::new([var("x")]);
        // x < 1 and x ≥ 1: empty.
        let one_left = ExactReal::with_side(dec("1").rational().unwrap().clone(), Side::Left);
        z.impose_bound(&var("x"), &ground, &one_left).unwrap();
        z.impose_bound(&ground, &var("x"), &dec("-1")).unwrap();
        z.normalize();
        assert!(z.is_empty());
    }

    #[test]
    fn projection_preserves_containment() {
        let mut z = box_zone(&[("x", "2"), ("y", "3")]);
        z.impose_bound(&var("x"), &var("y"), &ExactReal::zero()).unwrap();
        z.normalize();
        let mut projected = z.clone();
        projected.project(&var("x"));
        // y = 2.5 is reachable with some x ≤ y.
        let mut p = BTreeMap::new();
        p.insert(var("y"), dec("2.5"));
        assert!(projected.contains_point(&p));
        let mut full = p.clone();
        full.insert(var("x"), dec("1"));
        assert!(z.contains_point(&full));
    }

    #[test]
    fn cartesian_product_of_boxes_is_their_product() {
        let a = box_zone(&[("x", "1")]);
        let b = box_zone(&[("y", "2")]);
        let prod = a.cartesian_product(&b).unwrap();
        let mut p = BTreeMap::new();
        p.insert(var("x"), dec("0.5"));
        p.insert(var("y"), dec("1.5"));
        assert!(prod.contains_point(&p));
        p.insert(var("y"), dec("2.5"));
        assert!(!prod.contains_point(&p));
    }

    #[test]
    fn cartesian_product_rejects_overlap() {
        let a = box_zone(&[("x", "1")]);
        let b = box_zone(&[("x", "2")]);
        assert!(a.cartesian_product(&b).is_err());
    }

    #[test]
    fn zone_containment() {
        let small = box_zone(&[("x", "1")]);
        let large = box_zone(&[("x", "2")]);
        assert!(large.contains_zone(&small));
        assert!(!small.contains_zone(&large));
    }

    #[test]
    fn lowest_or_equal_query() {
        let ground = Variable::ground();
        let mut z = box_zone(&[("x", "3"), ("y", "3")]);
        assert!(z.can_variable_be_lowest_or_equal(&var("x"), &[var("y")]));
        // Force x ≥ 2 and y ≤ 1: x can no longer be lowest.
        z.impose_bound(&ground, &var("x"), &dec("-2")).unwrap();
        z.impose_bound(&var("y"), &ground, &dec("1")).unwrap();
        z.normalize();
        assert!(!z.can_variable_be_lowest_or_equal(&var("x"), &[var("y")]));
    }

    #[test]
    fn equality_ignores_variable_insertion_order() {
        let a = box_zone(&[("x", "1"), ("y", "2")]);
        let b = box_zone(&[("y", "2"), ("x", "1")]);
        assert!(a.equivalent(&b));
        assert_eq!(a, b);
    }

    #[test]
    fn fixed_value_of_degenerate_variable() {
        let ground = Variable::ground();
        let mut z = DbmZone::new([var("d")]);
        z.impose_bound(&var("d"), &ground, &dec("2")).unwrap();
        z.impose_bound(&ground, &var("d"), &dec("-2")).unwrap();
        z.normalize();
        assert_eq!(z.fixed_value(&var("d")), Some(dec("2")));
        assert!(!z.is_full_dimensional());
        assert!(!z.is_empty());
    }

    #[test]
    fn minus_infinity_bound_rejected() {
        let mut z = DbmZone::new([var("x")]);
        assert!(z
            .impose_bound(&var("x"), &Variable::ground(), &ExactReal::negative_infinity())
            .is_err());
    }
}
