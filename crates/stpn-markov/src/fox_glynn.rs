//! Fox–Glynn Poisson truncation and weighting.
//!
//! Given a rate `λ > 0` and a target error `ε`, the finder computes left
//! and right truncation points so that each discarded tail carries at most
//! `ε/2` — with the right point capped at `mode + ⌈(λ+1)/2⌉` in the
//! large-rate regime as an overflow safeguard — and the weighter fills
//! scaled weights by recurrence from the mode outward. Weights are self-normalizing: `weight(k) / total_weight`
//! approximates the Poisson probability of `k`, with the total accumulated
//! outside-in (smallest terms first) to preserve accuracy.

use stpn_core::{ensure, Error, Real, Result, Stage};

/// The scale assigned to the mode weight, chosen so that neither tail
/// underflows nor the total overflows for supported rates.
const MODE_WEIGHT: Real = 1e100;

/// The smallest admissible scaled weight before an underflow is reported.
const LOG_UNDERFLOW: Real = -600.0;

/// Truncated, scaled Poisson weights for one rate.
#[derive(Debug, Clone)]
pub struct FoxGlynn {
    lambda: Real,
    left: usize,
    right: usize,
    weights: Vec<Real>,
    total_weight: Real,
}

impl FoxGlynn {
    /// Compute truncation points and weights for `Pois(λ)` with target
    /// truncation error `ε`.
    pub fn new(lambda: Real, epsilon: Real) -> Result<Self> {
        ensure!(lambda > 0.0, "Fox-Glynn requires λ > 0, got {lambda}");
        ensure!(
            epsilon >= f64::MIN_POSITIVE && epsilon < 1.0,
            "Fox-Glynn error bound out of range: {epsilon}"
        );
        if lambda > 1e7 {
            return Err(Error::numeric(
                Stage::PoissonTruncation,
                format!("λ = {lambda} too large for stable weighting"),
            ));
        }

        let mode = lambda.floor() as usize;
        let sqrt_two_pi = (2.0 * std::f64::consts::PI).sqrt();

        // Left truncation point: normal-tail bound below the mode.
        let left = if lambda < 25.0 {
            0
        } else {
            let b = (1.0 + 1.0 / lambda) * (1.0 / (8.0 * lambda)).exp();
            let sqrt_lambda = lambda.sqrt();
            let mut k: Real = 3.0;
            loop {
                let tail = b * (-k * k / 2.0).exp() / (k * sqrt_two_pi);
                if tail < epsilon / 2.0 {
                    let point = mode as Real - k * sqrt_lambda - 1.5;
                    break point.max(0.0) as usize;
                }
                k += 1.0;
            }
        };

        // Right truncation point: the corresponding bound above the mode.
        let right = {
            let a = (1.0 + 1.0 / lambda) * (1.0_f64 / 16.0).exp() * 2.0_f64.sqrt();
            let sqrt_two_lambda = (2.0 * lambda).sqrt();
            let mut k: Real = 3.0;
            let point = loop {
                let tail = a * (-k * k / 2.0).exp() / (k * sqrt_two_pi);
                if tail < epsilon / 2.0 {
                    break mode as Real + k * sqrt_two_lambda + 1.5;
                }
                k += 1.0;
            };
            point.ceil() as usize
        };
        // Overflow safeguard in the large-rate regime, where the analytic
        // tail bound applies: however small the target error, the window
        // never extends past mode + ⌈(λ+1)/2⌉. Below that regime the
        // window stays ε-driven, which the small-rate accuracy contracts
        // rely on.
        let right = if lambda >= 400.0 {
            right.min(mode + (lambda as usize + 2) / 2)
        } else {
            right
        };

        // Weights by recurrence from the mode outward:
        // w[k+1] = w[k]·λ/(k+1) ascending, w[k−1] = w[k]·k/λ descending.
        let mut weights = vec![0.0; right - left + 1];
        weights[mode - left] = MODE_WEIGHT;
        for k in (left..mode).rev() {
            weights[k - left] = weights[k + 1 - left] * (k + 1) as Real / lambda;
        }
        for k in mode..right {
            weights[k + 1 - left] = weights[k - left] * lambda / (k + 1) as Real;
        }
        // Underflow safeguard on the kept range.
        let smallest = weights[0].min(weights[right - left]);
        if smallest == 0.0 || smallest.ln() < MODE_WEIGHT.ln() + LOG_UNDERFLOW {
            return Err(Error::numeric(
                Stage::PoissonTruncation,
                "Poisson weights underflow in the kept range",
            ));
        }

        // Outside-in summation, smallest terms first.
        let mut total = 0.0;
        let (mut i, mut j) = (0, right - left);
        while i < j {
            if weights[i] <= weights[j] {
                total += weights[i];
                i += 1;
            } else {
                total += weights[j];
                j -= 1;
            }
        }
        total += weights[i];
        if !total.is_finite() || total == 0.0 {
            return Err(Error::numeric(
                Stage::PoissonTruncation,
                "Poisson weight total overflowed",
            ));
        }

        Ok(FoxGlynn {
            lambda,
            left,
            right,
            weights,
            total_weight: total,
        })
    }

    /// The rate λ.
    pub fn lambda(&self) -> Real {
        self.lambda
    }

    /// First kept index.
    pub fn left(&self) -> usize {
        self.left
    }

    /// Last kept index.
    pub fn right(&self) -> usize {
        self.right
    }

    /// The scaled weight of `k` (zero outside the kept range).
    pub fn weight(&self, k: usize) -> Real {
        if k < self.left || k > self.right {
            0.0
        } else {
            self.weights[k - self.left]
        }
    }

    /// The scaled total weight.
    pub fn total_weight(&self) -> Real {
        self.total_weight
    }

    /// The approximated Poisson probability of `k`.
    pub fn poisson(&self, k: usize) -> Real {
        self.weight(k) / self.total_weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exact_poisson(lambda: f64, k: u64) -> f64 {
        // e^{−λ} λᵏ / k!, accumulated in log space.
        let mut log_p = -lambda + k as f64 * lambda.ln();
        for i in 1..=k {
            log_p -= (i as f64).ln();
        }
        log_p.exp()
    }

    #[test]
    fn lambda_ten_truncation_points() {
        let fg = FoxGlynn::new(10.0, 1e-9).unwrap();
        assert!(fg.left() <= 6, "left = {}", fg.left());
        assert!(fg.right() >= 16, "right = {}", fg.right());
    }

    #[test]
    fn mode_probability_matches_closed_form() {
        let fg = FoxGlynn::new(10.0, 1e-9).unwrap();
        let expected = exact_poisson(10.0, 10);
        assert!((fg.poisson(10) - expected).abs() < 1e-9);
    }

    #[test]
    fn kept_mass_covers_one_minus_epsilon() {
        for lambda in [0.5, 4.0, 30.0, 250.0] {
            let fg = FoxGlynn::new(lambda, 1e-9).unwrap();
            let mass: f64 = (fg.left()..=fg.right()).map(|k| fg.poisson(k)).sum();
            assert!(mass >= 1.0 - 1e-9, "λ={lambda}: mass {mass}");
            assert!(mass <= 1.0 + 1e-9, "λ={lambda}: mass {mass}");
        }
    }

    #[test]
    fn pointwise_error_within_bound() {
        let fg = FoxGlynn::new(30.0, 1e-9).unwrap();
        for k in fg.left()..=fg.right().min(120) {
            let expected = exact_poisson(30.0, k as u64);
            assert!(
                (fg.poisson(k) - expected).abs() < 1e-9,
                "k={k}: {} vs {expected}",
                fg.poisson(k)
            );
        }
    }

    #[test]
    fn statrs_agreement_at_the_mode() {
        use statrs::distribution::{Discrete, Poisson};
        let fg = FoxGlynn::new(12.5, 1e-10).unwrap();
        let reference = Poisson::new(12.5).unwrap();
        for k in [5u64, 12, 20] {
            assert!((fg.poisson(k as usize) - reference.pmf(k)).abs() < 1e-10);
        }
    }

    #[test]
    fn right_point_is_clamped_for_large_rates() {
        // An extreme error target would push the ε-driven window far past
        // the overflow safeguard; the clamp caps it at mode + ⌈(λ+1)/2⌉.
        let fg = FoxGlynn::new(500.0, 1e-250).unwrap();
        assert_eq!(fg.right(), 500 + (500 + 2) / 2);
        let mass: f64 = (fg.left()..=fg.right()).map(|k| fg.poisson(k)).sum();
        assert!((mass - 1.0).abs() < 1e-9);
    }

    #[test]
    fn moderate_rates_stay_epsilon_driven() {
        // At λ = 450 with a routine error target the ε-driven window is
        // already inside the safeguard.
        let fg = FoxGlynn::new(450.0, 1e-9).unwrap();
        assert!(fg.right() < 450 + (450 + 2) / 2);
        let expected = exact_poisson(450.0, 450);
        assert!((fg.poisson(450) - expected).abs() < 1e-9);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(FoxGlynn::new(0.0, 1e-9).is_err());
        assert!(FoxGlynn::new(10.0, 0.0).is_err());
        assert!(FoxGlynn::new(2e7, 1e-9).is_err());
    }
}
