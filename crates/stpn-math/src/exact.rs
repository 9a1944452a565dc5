//! Exact signed arithmetic extended with ±∞ and neighborhoods.
//!
//! [`ExactReal`] is a thin facade over `num_rational::BigRational` extended
//! with two infinities and a left/right neighborhood tag. The tag encodes
//! strict inequalities on an otherwise closed-interval arithmetic: a bound
//! of `2⁻` (left neighborhood) admits every value strictly below 2 without
//! a separate strictness flag.
//!
//! `+∞ + −∞` is an indeterminate form. The checked operations return
//! `None` on it; the operator impls panic, because reaching the form
//! through them means a caller skipped the policy decision that
//! [`stpn_core::IndeterminatePolicy`] exists for.

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, Div, Mul, Neg, Sub};
use stpn_core::{Error, IndeterminatePolicy, Result, Stage};

// ─── Side ─────────────────────────────────────────────────────────────────────

/// Neighborhood tag of a finite value.
///
/// `Left` denotes the left neighborhood `v⁻` (values approaching `v` from
/// below), `Right` the right neighborhood `v⁺`. `Center` is the exact value.
/// The derived ordering `Left < Center < Right` is the numeric one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Side {
    /// Left neighborhood `v⁻`.
    Left,
    /// The exact value.
    #[default]
    Center,
    /// Right neighborhood `v⁺`.
    Right,
}

impl Side {
    /// Neighborhood of `−v` given the neighborhood of `v`.
    pub fn negated(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Center => Side::Center,
            Side::Right => Side::Left,
        }
    }

    /// Neighborhood of a sum: equal sides persist, opposite sides cancel.
    pub fn combined(self, other: Self) -> Self {
        match (self, other) {
            (s, Side::Center) => s,
            (Side::Center, s) => s,
            (Side::Left, Side::Left) => Side::Left,
            (Side::Right, Side::Right) => Side::Right,
            (Side::Left, Side::Right) | (Side::Right, Side::Left) => Side::Center,
        }
    }
}

// ─── ExactReal ────────────────────────────────────────────────────────────────

/// An exact signed value: a rational with a neighborhood tag, or ±∞.
///
/// Values are kept in reduced rational form, so `2.0` and `2.00` are the
/// same value and hash identically. Infinite values carry no payload.
///
/// The derived ordering is total: `−∞ < v⁻ < v < v⁺ < +∞`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExactReal {
    /// `−∞`.
    NegativeInfinity,
    /// A finite rational with its neighborhood tag.
    Finite {
        /// The reduced rational value.
        value: BigRational,
        /// The neighborhood tag.
        side: Side,
    },
    /// `+∞`.
    PositiveInfinity,
}

/// Hash sentinels for the infinities.
const HASH_POS_INF: u64 = 0x7ff0_0000_0000_0000;
const HASH_NEG_INF: u64 = 0xfff0_0000_0000_0000;

impl Hash for ExactReal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            ExactReal::PositiveInfinity => HASH_POS_INF.hash(state),
            ExactReal::NegativeInfinity => HASH_NEG_INF.hash(state),
            ExactReal::Finite { value, side } => {
                value.hash(state);
                side.hash(state);
            }
        }
    }
}

impl ExactReal {
    /// The exact value zero.
    pub fn zero() -> Self {
        Self::from_rational(BigRational::zero())
    }

    /// The exact value one.
    pub fn one() -> Self {
        Self::from_rational(BigRational::one())
    }

    /// `+∞`.
    pub fn positive_infinity() -> Self {
        ExactReal::PositiveInfinity
    }

    /// `−∞`.
    pub fn negative_infinity() -> Self {
        ExactReal::NegativeInfinity
    }

    /// An exact finite value from a reduced rational.
    pub fn from_rational(value: BigRational) -> Self {
        ExactReal::Finite {
            value,
            side: Side::Center,
        }
    }

    /// A finite value with an explicit neighborhood tag.
    pub fn with_side(value: BigRational, side: Side) -> Self {
        ExactReal::Finite { value, side }
    }

    /// Parse a plain decimal string such as `"2"`, `"-0.50"`, or `"1e-3"`.
    pub fn from_decimal_str(s: &str) -> Option<Self> {
        let s = s.trim();
        let (mantissa, exp10) = match s.split_once(['e', 'E']) {
            Some((m, e)) => (m, e.parse::<i32>().ok()?),
            None => (s, 0),
        };
        let (int_part, frac_part) = match mantissa.split_once('.') {
            Some((i, f)) => (i, f),
            None => (mantissa, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        let digits: String = format!("{int_part}{frac_part}");
        let numer: BigInt = digits.parse().ok()?;
        let scale = frac_part.len() as i32 - exp10;
        let ten = BigInt::from(10);
        let value = if scale >= 0 {
            BigRational::new(numer, ten.pow(scale as u32))
        } else {
            BigRational::from_integer(numer * ten.pow((-scale) as u32))
        };
        Some(Self::from_rational(value))
    }

    /// Convert a finite `f64` exactly; infinities map to ±∞, `NaN` to `None`.
    pub fn from_f64(x: f64) -> Option<Self> {
        if x.is_nan() {
            return None;
        }
        if x == f64::INFINITY {
            return Some(ExactReal::PositiveInfinity);
        }
        if x == f64::NEG_INFINITY {
            return Some(ExactReal::NegativeInfinity);
        }
        BigRational::from_float(x).map(Self::from_rational)
    }

    /// True for a finite value.
    pub fn is_finite(&self) -> bool {
        matches!(self, ExactReal::Finite { .. })
    }

    /// True for `+∞` or `−∞`.
    pub fn is_infinite(&self) -> bool {
        !self.is_finite()
    }

    /// True for exact zero (any neighborhood of zero is not zero).
    pub fn is_zero(&self) -> bool {
        matches!(self, ExactReal::Finite { value, side } if value.is_zero() && *side == Side::Center)
    }

    /// The finite rational value, if any.
    pub fn rational(&self) -> Option<&BigRational> {
        match self {
            ExactReal::Finite { value, .. } => Some(value),
            _ => None,
        }
    }

    /// The neighborhood tag (`Center` for infinities).
    pub fn side(&self) -> Side {
        match self {
            ExactReal::Finite { side, .. } => *side,
            _ => Side::Center,
        }
    }

    /// Drop the neighborhood tag, keeping the value.
    pub fn to_center(&self) -> Self {
        match self {
            ExactReal::Finite { value, .. } => Self::from_rational(value.clone()),
            other => other.clone(),
        }
    }

    /// Numeric output value (±∞ map to the IEEE infinities).
    pub fn to_f64(&self) -> f64 {
        match self {
            ExactReal::PositiveInfinity => f64::INFINITY,
            ExactReal::NegativeInfinity => f64::NEG_INFINITY,
            ExactReal::Finite { value, .. } => value.to_f64().unwrap_or_else(|| {
                // Fall back to a quotient of lossy conversions for huge terms.
                let n = value.numer().to_f64().unwrap_or(f64::INFINITY);
                let d = value.denom().to_f64().unwrap_or(f64::INFINITY);
                n / d
            }),
        }
    }

    /// Checked addition; `None` on `+∞ + −∞`.
    pub fn checked_add(&self, other: &Self) -> Option<Self> {
        use ExactReal::*;
        match (self, other) {
            (PositiveInfinity, NegativeInfinity) | (NegativeInfinity, PositiveInfinity) => None,
            (PositiveInfinity, _) | (_, PositiveInfinity) => Some(PositiveInfinity),
            (NegativeInfinity, _) | (_, NegativeInfinity) => Some(NegativeInfinity),
            (Finite { value: a, side: sa }, Finite { value: b, side: sb }) => Some(Finite {
                value: a + b,
                side: sa.combined(*sb),
            }),
        }
    }

    /// Checked subtraction; `None` on `∞ − ∞` of equal sign.
    pub fn checked_sub(&self, other: &Self) -> Option<Self> {
        self.checked_add(&other.clone().neg())
    }

    /// Addition resolving `+∞ + −∞` against the configured policy:
    /// `FailFast` reports a numeric error, `Zero` substitutes zero.
    pub fn add_with(&self, other: &Self, policy: IndeterminatePolicy) -> Result<Self> {
        resolve(self.checked_add(other), policy, "+∞ + −∞")
    }

    /// Subtraction resolving `∞ − ∞` against the configured policy.
    pub fn sub_with(&self, other: &Self, policy: IndeterminatePolicy) -> Result<Self> {
        resolve(self.checked_sub(other), policy, "∞ − ∞")
    }

    /// Multiplication resolving `0 · ±∞` against the configured policy.
    pub fn mul_with(&self, other: &Self, policy: IndeterminatePolicy) -> Result<Self> {
        resolve(self.checked_mul(other), policy, "0 · ±∞")
    }

    /// Checked multiplication; `None` on `0 · ±∞`.
    pub fn checked_mul(&self, other: &Self) -> Option<Self> {
        use ExactReal::*;
        match (self, other) {
            (Finite { value, .. }, inf @ (PositiveInfinity | NegativeInfinity))
            | (inf @ (PositiveInfinity | NegativeInfinity), Finite { value, .. }) => {
                if value.is_zero() {
                    None
                } else if value.is_positive() {
                    Some(inf.clone())
                } else {
                    Some(inf.clone().neg())
                }
            }
            (PositiveInfinity, PositiveInfinity) | (NegativeInfinity, NegativeInfinity) => {
                Some(PositiveInfinity)
            }
            (PositiveInfinity, NegativeInfinity) | (NegativeInfinity, PositiveInfinity) => {
                Some(NegativeInfinity)
            }
            (Finite { value: a, side: sa }, Finite { value: b, side: sb }) => {
                let side = match (sa, sb) {
                    (Side::Center, Side::Center) => Side::Center,
                    (s, Side::Center) => {
                        if b.is_negative() {
                            s.negated()
                        } else {
                            *s
                        }
                    }
                    (Side::Center, s) => {
                        if a.is_negative() {
                            s.negated()
                        } else {
                            *s
                        }
                    }
                    _ => Side::Center,
                };
                Some(Finite {
                    value: a * b,
                    side,
                })
            }
        }
    }

    /// Division by a non-zero finite value.
    ///
    /// # Panics
    /// Panics if `other` is zero or infinite.
    pub fn div_exact(&self, other: &Self) -> Self {
        let divisor = other
            .rational()
            .expect("division by an infinite value");
        assert!(!divisor.is_zero(), "division by zero");
        match self {
            ExactReal::PositiveInfinity => {
                if divisor.is_positive() {
                    ExactReal::PositiveInfinity
                } else {
                    ExactReal::NegativeInfinity
                }
            }
            ExactReal::NegativeInfinity => {
                if divisor.is_positive() {
                    ExactReal::NegativeInfinity
                } else {
                    ExactReal::PositiveInfinity
                }
            }
            ExactReal::Finite { value, side } => ExactReal::Finite {
                value: value / divisor,
                side: if divisor.is_negative() {
                    side.negated()
                } else {
                    *side
                },
            },
        }
    }

    /// Integer power. `x⁰ = 1` for every `x` by convention.
    pub fn pow(&self, n: u32) -> Self {
        if n == 0 {
            return Self::one();
        }
        match self {
            ExactReal::PositiveInfinity => ExactReal::PositiveInfinity,
            ExactReal::NegativeInfinity => {
                if n % 2 == 0 {
                    ExactReal::PositiveInfinity
                } else {
                    ExactReal::NegativeInfinity
                }
            }
            ExactReal::Finite { value, side } => ExactReal::Finite {
                value: value.pow(n as i32),
                side: if n % 2 == 0 && value.is_negative() {
                    side.negated()
                } else {
                    *side
                },
            },
        }
    }

    /// Absolute value.
    pub fn abs(&self) -> Self {
        match self {
            ExactReal::PositiveInfinity | ExactReal::NegativeInfinity => {
                ExactReal::PositiveInfinity
            }
            ExactReal::Finite { value, side } => {
                if value.is_negative() {
                    ExactReal::Finite {
                        value: -value,
                        side: side.negated(),
                    }
                } else {
                    self.clone()
                }
            }
        }
    }

    /// The smaller of `self` and `other`.
    pub fn min(&self, other: &Self) -> Self {
        if self <= other {
            self.clone()
        } else {
            other.clone()
        }
    }

    /// The larger of `self` and `other`.
    pub fn max(&self, other: &Self) -> Self {
        if self >= other {
            self.clone()
        } else {
            other.clone()
        }
    }
}

/// Map a checked operation's outcome through the indeterminate policy.
fn resolve(
    value: Option<ExactReal>,
    policy: IndeterminatePolicy,
    form: &str,
) -> Result<ExactReal> {
    match (value, policy) {
        (Some(v), _) => Ok(v),
        (None, IndeterminatePolicy::Zero) => Ok(ExactReal::zero()),
        (None, IndeterminatePolicy::FailFast) => Err(Error::numeric(
            Stage::ExactArithmetic,
            format!("indeterminate form {form}"),
        )),
    }
}

impl Neg for ExactReal {
    type Output = ExactReal;

    fn neg(self) -> ExactReal {
        match self {
            ExactReal::PositiveInfinity => ExactReal::NegativeInfinity,
            ExactReal::NegativeInfinity => ExactReal::PositiveInfinity,
            ExactReal::Finite { value, side } => ExactReal::Finite {
                value: -value,
                side: side.negated(),
            },
        }
    }
}

impl Add for &ExactReal {
    type Output = ExactReal;

    fn add(self, other: &ExactReal) -> ExactReal {
        self.checked_add(other)
            .expect("indeterminate form +∞ + −∞")
    }
}

impl Add for ExactReal {
    type Output = ExactReal;

    fn add(self, other: ExactReal) -> ExactReal {
        (&self).add(&other)
    }
}

impl Sub for &ExactReal {
    type Output = ExactReal;

    fn sub(self, other: &ExactReal) -> ExactReal {
        self.checked_sub(other)
            .expect("indeterminate form ∞ − ∞")
    }
}

impl Sub for ExactReal {
    type Output = ExactReal;

    fn sub(self, other: ExactReal) -> ExactReal {
        (&self).sub(&other)
    }
}

impl Mul for &ExactReal {
    type Output = ExactReal;

    fn mul(self, other: &ExactReal) -> ExactReal {
        self.checked_mul(other)
            .expect("indeterminate form 0 · ±∞")
    }
}

impl Mul for ExactReal {
    type Output = ExactReal;

    fn mul(self, other: ExactReal) -> ExactReal {
        (&self).mul(&other)
    }
}

impl Div for &ExactReal {
    type Output = ExactReal;

    fn div(self, other: &ExactReal) -> ExactReal {
        self.div_exact(other)
    }
}

impl From<i64> for ExactReal {
    fn from(x: i64) -> Self {
        Self::from_rational(BigRational::from_integer(BigInt::from(x)))
    }
}

impl From<BigRational> for ExactReal {
    fn from(value: BigRational) -> Self {
        Self::from_rational(value)
    }
}

impl fmt::Display for ExactReal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExactReal::PositiveInfinity => write!(f, "inf"),
            ExactReal::NegativeInfinity => write!(f, "-inf"),
            ExactReal::Finite { value, side } => {
                write_rational_decimal(f, value)?;
                match side {
                    Side::Left => write!(f, "⁻"),
                    Side::Center => Ok(()),
                    Side::Right => write!(f, "⁺"),
                }
            }
        }
    }
}

/// Write a rational as an exact decimal when the denominator is `2ᵃ·5ᵇ`,
/// falling back to `p/q` otherwise.
fn write_rational_decimal(f: &mut fmt::Formatter<'_>, value: &BigRational) -> fmt::Result {
    if value.is_integer() {
        return write!(f, "{}", value.numer());
    }
    let mut denom = value.denom().clone();
    let mut twos = 0u32;
    let mut fives = 0u32;
    let two = BigInt::from(2);
    let five = BigInt::from(5);
    while (&denom % &two).is_zero() {
        denom /= &two;
        twos += 1;
    }
    while (&denom % &five).is_zero() {
        denom /= &five;
        fives += 1;
    }
    if !denom.is_one() {
        return write!(f, "{}/{}", value.numer(), value.denom());
    }
    let scale = twos.max(fives);
    let ten = BigInt::from(10);
    let scaled = value.numer() * ten.pow(scale) / value.denom();
    let negative = scaled.is_negative();
    let digits = scaled.abs().to_string();
    let digits = if digits.len() <= scale as usize {
        format!("{}{}", "0".repeat(scale as usize + 1 - digits.len()), digits)
    } else {
        digits
    };
    let split = digits.len() - scale as usize;
    write!(
        f,
        "{}{}.{}",
        if negative { "-" } else { "" },
        &digits[..split],
        &digits[split..]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn dec(s: &str) -> ExactReal {
        ExactReal::from_decimal_str(s).unwrap()
    }

    fn hash_of(x: &ExactReal) -> u64 {
        let mut h = DefaultHasher::new();
        x.hash(&mut h);
        h.finish()
    }

    #[test]
    fn trailing_zeros_compare_and_hash_equal() {
        assert_eq!(dec("2.0"), dec("2.00"));
        assert_eq!(hash_of(&dec("2.0")), hash_of(&dec("2.00")));
    }

    #[test]
    fn ordering_respects_neighborhoods() {
        let two = dec("2");
        let two_left = ExactReal::with_side(two.rational().unwrap().clone(), Side::Left);
        let two_right = ExactReal::with_side(two.rational().unwrap().clone(), Side::Right);
        assert!(two_left < two);
        assert!(two < two_right);
        assert!(ExactReal::negative_infinity() < two_left);
        assert!(two_right < ExactReal::positive_infinity());
    }

    #[test]
    fn infinity_addition() {
        let inf = ExactReal::positive_infinity();
        assert_eq!(inf.checked_add(&dec("5")), Some(inf.clone()));
        assert_eq!(inf.checked_add(&ExactReal::negative_infinity()), None);
    }

    #[test]
    fn indeterminate_forms_follow_the_policy() {
        let inf = ExactReal::positive_infinity();
        let neg_inf = ExactReal::negative_infinity();
        assert!(matches!(
            inf.add_with(&neg_inf, IndeterminatePolicy::FailFast),
            Err(Error::Numeric {
                stage: Stage::ExactArithmetic,
                ..
            })
        ));
        assert_eq!(
            inf.add_with(&neg_inf, IndeterminatePolicy::Zero).unwrap(),
            ExactReal::zero()
        );
        assert!(ExactReal::zero()
            .mul_with(&inf, IndeterminatePolicy::FailFast)
            .is_err());
        assert_eq!(
            ExactReal::zero()
                .mul_with(&inf, IndeterminatePolicy::Zero)
                .unwrap(),
            ExactReal::zero()
        );
        // Determinate operands are unaffected by the policy.
        assert_eq!(
            dec("2").add_with(&dec("3"), IndeterminatePolicy::FailFast).unwrap(),
            dec("5")
        );
    }

    #[test]
    fn neighborhood_sum_rules() {
        assert_eq!(Side::Left.combined(Side::Left), Side::Left);
        assert_eq!(Side::Left.combined(Side::Right), Side::Center);
        assert_eq!(Side::Left.negated(), Side::Right);
        let a = ExactReal::with_side(BigRational::one(), Side::Left);
        let b = ExactReal::with_side(BigRational::one(), Side::Right);
        assert_eq!((&a + &b).side(), Side::Center);
    }

    #[test]
    fn pow_and_abs() {
        assert_eq!(dec("-2").pow(3), dec("-8"));
        assert_eq!(dec("-2").pow(2), dec("4"));
        assert_eq!(ExactReal::negative_infinity().pow(2), ExactReal::positive_infinity());
        assert_eq!(dec("-3.5").abs(), dec("3.5"));
    }

    #[test]
    fn division_flips_neighborhood_on_negative_divisor() {
        let x = ExactReal::with_side(BigRational::from_integer(BigInt::from(4)), Side::Left);
        let q = x.div_exact(&dec("-2"));
        assert_eq!(q.rational().unwrap(), &BigRational::from_integer(BigInt::from(-2)));
        assert_eq!(q.side(), Side::Right);
    }

    #[test]
    fn decimal_parsing_and_display() {
        assert_eq!(dec("1e-3"), dec("0.001"));
        assert_eq!(dec("2.50").to_string(), "2.5");
        assert_eq!(dec("-0.125").to_string(), "-0.125");
        assert_eq!(ExactReal::positive_infinity().to_string(), "inf");
    }

    #[test]
    fn to_f64_roundtrip() {
        assert_eq!(dec("0.25").to_f64(), 0.25);
        assert_eq!(ExactReal::negative_infinity().to_f64(), f64::NEG_INFINITY);
    }
}
