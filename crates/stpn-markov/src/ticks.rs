//! Aligned time grids.
//!
//! Kernel sampling and quadrature share two grids: a coarse *kernel* grid
//! carrying the output time points and a fine *integral* grid used as
//! quadrature sub-steps. Their ratio is a positive integer, so every
//! kernel tick lies on the integral grid.

use stpn_core::{ensure, Real, Result};

/// Two aligned time grids over `[0, time_bound]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticks {
    time_step: Real,
    kernel_count: usize,
    ratio: usize,
}

impl Ticks {
    /// Build grids covering `[0, time_bound]` with the given kernel step
    /// and integral sub-steps per kernel step.
    pub fn new(time_bound: Real, time_step: Real, ratio: usize) -> Result<Self> {
        ensure!(time_bound > 0.0, "time bound must be positive");
        ensure!(time_step > 0.0, "time step must be positive");
        ensure!(ratio >= 1, "grid ratio must be a positive integer");
        ensure!(
            time_step <= time_bound,
            "time step {time_step} exceeds the bound {time_bound}"
        );
        let kernel_count = (time_bound / time_step).round() as usize;
        ensure!(
            (kernel_count as Real * time_step - time_bound).abs() < 1e-9 * time_bound,
            "the time step must divide the bound"
        );
        Ok(Ticks {
            time_step,
            kernel_count,
            ratio,
        })
    }

    /// The kernel step Δ.
    pub fn time_step(&self) -> Real {
        self.time_step
    }

    /// The integral sub-step δ = Δ / ratio.
    pub fn integral_step(&self) -> Real {
        self.time_step / self.ratio as Real
    }

    /// Sub-steps per kernel step.
    pub fn ratio(&self) -> usize {
        self.ratio
    }

    /// Number of kernel points, including `t = 0`.
    pub fn kernel_points(&self) -> usize {
        self.kernel_count + 1
    }

    /// Number of integral points, including `t = 0`.
    pub fn integral_points(&self) -> usize {
        self.kernel_count * self.ratio + 1
    }

    /// The kernel time at index `i`.
    pub fn kernel_time(&self, i: usize) -> Real {
        i as Real * self.time_step
    }

    /// The integral time at index `i`.
    pub fn integral_time(&self, i: usize) -> Real {
        i as Real * self.integral_step()
    }

    /// The integral index of kernel point `i`.
    pub fn integral_index(&self, i: usize) -> usize {
        i * self.ratio
    }

    /// Iterate over the kernel times.
    pub fn kernel_times(&self) -> impl Iterator<Item = Real> + '_ {
        (0..self.kernel_points()).map(|i| self.kernel_time(i))
    }

    /// Iterate over the integral times.
    pub fn integral_times(&self) -> impl Iterator<Item = Real> + '_ {
        (0..self.integral_points()).map(|i| self.integral_time(i))
    }
}

/// Composite trapezoidal rule over uniformly spaced samples.
pub fn trapezoid(samples: &[Real], step: Real) -> Real {
    if samples.len() < 2 {
        return 0.0;
    }
    let interior: Real = samples[1..samples.len() - 1].iter().sum();
    step * (0.5 * (samples[0] + samples[samples.len() - 1]) + interior)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grids_align() {
        let ticks = Ticks::new(3.0, 1.0, 4).unwrap();
        assert_eq!(ticks.kernel_points(), 4);
        assert_eq!(ticks.integral_points(), 13);
        assert_eq!(ticks.integral_index(2), 8);
        assert!((ticks.integral_time(ticks.integral_index(2)) - ticks.kernel_time(2)).abs() < 1e-12);
    }

    #[test]
    fn non_dividing_step_rejected() {
        assert!(Ticks::new(1.0, 0.3, 2).is_err());
    }

    #[test]
    fn trapezoid_is_exact_on_lines() {
        // ∫₀¹ x dx = 0.5.
        let samples: Vec<f64> = (0..=10).map(|i| i as f64 / 10.0).collect();
        assert!((trapezoid(&samples, 0.1) - 0.5).abs() < 1e-12);
    }
}
