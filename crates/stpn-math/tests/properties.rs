//! Property tests for the symbolic and geometric layers.

use approx::relative_eq;
use num_rational::BigRational;
use proptest::prelude::*;
use std::collections::BTreeMap;
use stpn_math::expol::{AtomicTerm, Exmonomial, Expolynomial, Variable};
use stpn_math::{DbmZone, ExactReal};

fn var(s: &str) -> Variable {
    Variable::new(s)
}

fn rat(n: i64, d: i64) -> BigRational {
    BigRational::new(n.into(), d.into())
}

/// A random exmonomial over `x` and `y` with small coefficients.
fn exmonomial_strategy() -> impl Strategy<Value = Exmonomial> {
    (
        -4i64..=4,
        0u32..=3,
        0u32..=2,
        prop_oneof![Just(0i64), Just(1), Just(2)],
    )
        .prop_map(|(c, dx, dy, rx)| {
            let mut m = Exmonomial::constant(ExactReal::from(c));
            m.multiply_term(&AtomicTerm::Monomial {
                variable: var("x"),
                exponent: dx,
            });
            m.multiply_term(&AtomicTerm::Monomial {
                variable: var("y"),
                exponent: dy,
            });
            m.multiply_term(&AtomicTerm::Exponential {
                variable: var("x"),
                rate: rat(rx, 2),
            });
            m
        })
}

fn expolynomial_strategy() -> impl Strategy<Value = Expolynomial> {
    proptest::collection::vec(exmonomial_strategy(), 0..4).prop_map(Expolynomial::from_terms)
}

fn assignment(x: f64, y: f64) -> BTreeMap<Variable, f64> {
    let mut a = BTreeMap::new();
    a.insert(var("x"), x);
    a.insert(var("y"), y);
    a
}

proptest! {
    #[test]
    fn addition_commutes(f in expolynomial_strategy(), g in expolynomial_strategy()) {
        prop_assert_eq!(&f + &g, &g + &f);
    }

    #[test]
    fn multiplication_commutes_and_associates(
        f in expolynomial_strategy(),
        g in expolynomial_strategy(),
        h in expolynomial_strategy(),
    ) {
        prop_assert_eq!(&f * &g, &g * &f);
        prop_assert_eq!(&(&f * &g) * &h, &f * &(&g * &h));
    }

    #[test]
    fn multiplication_distributes_pointwise(
        f in expolynomial_strategy(),
        g in expolynomial_strategy(),
        h in expolynomial_strategy(),
        x in 0.0f64..2.0,
        y in 0.0f64..2.0,
    ) {
        let a = assignment(x, y);
        let lhs = (&f * &(&g + &h)).evaluate(&a).unwrap();
        let rhs = (&f * &g).evaluate(&a).unwrap() + (&f * &h).evaluate(&a).unwrap();
        prop_assert!(relative_eq!(lhs, rhs, epsilon = 1e-9, max_relative = 1e-9));
    }

    #[test]
    fn product_evaluates_pointwise(
        f in expolynomial_strategy(),
        g in expolynomial_strategy(),
        x in 0.0f64..2.0,
        y in 0.0f64..2.0,
    ) {
        let a = assignment(x, y);
        let lhs = (&f * &g).evaluate(&a).unwrap();
        let rhs = f.evaluate(&a).unwrap() * g.evaluate(&a).unwrap();
        prop_assert!(relative_eq!(lhs, rhs, epsilon = 1e-9, max_relative = 1e-9));
    }

    #[test]
    fn integration_satisfies_the_fundamental_theorem(
        f in expolynomial_strategy(),
        y in 0.5f64..2.0,
    ) {
        // (∫₁² f dx)(y) = F(2)(y) − F(1)(y).
        let definite = f
            .integrate_between(&var("x"), &ExactReal::one(), &ExactReal::from(2))
            .unwrap();
        let primitive = f.integrate(&var("x"));
        let direct = &primitive.substitute(&var("x"), &ExactReal::from(2))
            - &primitive.substitute(&var("x"), &ExactReal::one());
        let mut a = BTreeMap::new();
        a.insert(var("y"), y);
        let lhs = definite.evaluate(&a).unwrap();
        let rhs = direct.evaluate(&a).unwrap();
        prop_assert!(relative_eq!(lhs, rhs, epsilon = 1e-9, max_relative = 1e-9));
    }

    #[test]
    fn shift_then_zero_is_identity(f in expolynomial_strategy()) {
        let shifted = f.shift(&var("x"), &var("z"));
        prop_assert_eq!(shifted.substitute(&var("z"), &ExactReal::zero()), f);
    }

    #[test]
    fn dominated_terms_drop_in_limits(slow in 1i64..=3, extra in 1i64..=3) {
        // e^{−slow·x/2} dominates e^{−(slow+extra)·x/2} toward +∞.
        let dominant = Exmonomial::constant(ExactReal::one()).with_term(AtomicTerm::Exponential {
            variable: var("x"),
            rate: rat(slow, 2),
        });
        let dominated = Exmonomial::constant(ExactReal::from(7)).with_term(AtomicTerm::Exponential {
            variable: var("x"),
            rate: rat(slow + extra, 2),
        });
        let e = Expolynomial::from_terms(vec![dominant, dominated]);
        let mut dirs = BTreeMap::new();
        dirs.insert(var("x"), stpn_math::expol::LimitDirection::PlusInfinity);
        let l = e.limit(&dirs);
        prop_assert_eq!(l.as_constant(), Some(ExactReal::one()));
    }
}

/// A random box zone over `x` and `y` with a cross constraint.
fn zone_strategy() -> impl Strategy<Value = DbmZone> {
    (1i64..=6, 1i64..=6, -2i64..=6).prop_map(|(bx, by, cross)| {
        let ground = Variable::ground();
        let mut z = DbmZone::new([var("x"), var("y")]);
        z.impose_bound(&var("x"), &ground, &ExactReal::from(bx)).unwrap();
        z.impose_bound(&ground, &var("x"), &ExactReal::zero()).unwrap();
        z.impose_bound(&var("y"), &ground, &ExactReal::from(by)).unwrap();
        z.impose_bound(&ground, &var("y"), &ExactReal::zero()).unwrap();
        z.impose_bound(&var("x"), &var("y"), &ExactReal::from(cross)).unwrap();
        z.normalize();
        z
    })
}

proptest! {
    #[test]
    fn normalization_is_idempotent(z in zone_strategy()) {
        let again = z.normalized();
        prop_assert!(z.equivalent(&again));
    }

    #[test]
    fn normalization_closes_triangles(z in zone_strategy()) {
        let mut all = vec![Variable::ground()];
        all.extend(z.variables().iter().cloned());
        for a in &all {
            for b in &all {
                for c in &all {
                    if a == b || b == c || a == c {
                        continue;
                    }
                    if let Some(path) = z.bound(a, c).checked_add(z.bound(c, b)) {
                        prop_assert!(*z.bound(a, b) <= path);
                    }
                }
            }
        }
    }

    #[test]
    fn projection_preserves_points(
        z in zone_strategy(),
        num in 0i64..=12,
    ) {
        // Any y admitted by the projection extends to a full point.
        if z.is_empty() {
            return Ok(());
        }
        let mut projected = z.clone();
        projected.project(&var("x"));
        let y = ExactReal::from_rational(rat(num, 2));
        let mut p = BTreeMap::new();
        p.insert(var("y"), y.clone());
        if projected.contains_point(&p) {
            // The tightest lower end of the x-interval for this y is a
            // witness: max(−c[*][x], y − c[y][x]).
            let from_ground = -z.bound(&Variable::ground(), &var("x")).clone();
            let from_y = &y - z.bound(&var("y"), &var("x"));
            let witness = from_ground.max(from_y);
            let mut full = p.clone();
            full.insert(var("x"), witness);
            prop_assert!(z.contains_point(&full));
        }
    }

    #[test]
    fn cartesian_product_matches_point_products(
        bx in 1i64..=5,
        by in 1i64..=5,
        px in 0i64..=6,
        py in 0i64..=6,
    ) {
        let ground = Variable::ground();
        let mut a = DbmZone::new([var("x")]);
        a.impose_bound(&var("x"), &ground, &ExactReal::from(bx)).unwrap();
        a.impose_bound(&ground, &var("x"), &ExactReal::zero()).unwrap();
        a.normalize();
        let mut b = DbmZone::new([var("y")]);
        b.impose_bound(&var("y"), &ground, &ExactReal::from(by)).unwrap();
        b.impose_bound(&ground, &var("y"), &ExactReal::zero()).unwrap();
        b.normalize();
        let product = a.cartesian_product(&b).unwrap();

        let x = ExactReal::from_rational(rat(px, 2));
        let y = ExactReal::from_rational(rat(py, 2));
        let in_a = a.contains_point(&BTreeMap::from([(var("x"), x.clone())]));
        let in_b = b.contains_point(&BTreeMap::from([(var("y"), y.clone())]));
        let joint = product
            .contains_point(&BTreeMap::from([(var("x"), x), (var("y"), y)]));
        prop_assert_eq!(joint, in_a && in_b);
    }
}
