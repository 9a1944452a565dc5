//! Error types for the stpn workspace.
//!
//! A single `thiserror`-derived enum covers the four failure families of the
//! analysis engine: input validation (detected before or while building an
//! analysis), numeric failures (tagged with the stage that produced them),
//! structural failures (model properties that make the requested analysis
//! meaningless), and cooperative interruption.

use thiserror::Error;

/// The analysis stage in which a numeric failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Exact arithmetic on extended decimals (e.g. an indeterminate form).
    ExactArithmetic,
    /// Symbolic integration or substitution of an expolynomial.
    SymbolicIntegration,
    /// Conditioning a state density to a firing event.
    DensityConditioning,
    /// Fox–Glynn Poisson truncation.
    PoissonTruncation,
    /// Uniformized CTMC transient iteration.
    Uniformization,
    /// LU solution of a stationary distribution.
    StationarySolve,
    /// LU solution of absorption probabilities.
    AbsorptionSolve,
    /// Kernel discretization or Markov-renewal convolution.
    KernelEvaluation,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::ExactArithmetic => "exact arithmetic",
            Stage::SymbolicIntegration => "symbolic integration",
            Stage::DensityConditioning => "density conditioning",
            Stage::PoissonTruncation => "Poisson truncation",
            Stage::Uniformization => "uniformization",
            Stage::StationarySolve => "stationary solve",
            Stage::AbsorptionSolve => "absorption solve",
            Stage::KernelEvaluation => "kernel evaluation",
        };
        f.write_str(name)
    }
}

/// The top-level error type used throughout the stpn workspace.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// Invalid input detected synchronously (bad model or configuration).
    #[error("validation error: {0}")]
    Validation(String),

    /// Numeric failure in a specific analysis stage.
    #[error("numeric error during {stage}: {message}")]
    Numeric {
        /// The stage that produced the failure.
        stage: Stage,
        /// Human-readable description.
        message: String,
    },

    /// A structural property of the model makes the analysis meaningless
    /// (time lock, multiple general transitions on the OneGen path, a
    /// disabled transition recorded in the graph).
    #[error("structural error: {0}")]
    Structural(String),

    /// The analysis monitor requested an interruption; partial results, if
    /// any, are well-defined but incomplete.
    #[error("analysis interrupted")]
    Interrupted,
}

impl Error {
    /// Shorthand for a [`Error::Numeric`] with the given stage.
    pub fn numeric(stage: Stage, message: impl Into<String>) -> Self {
        Error::Numeric {
            stage,
            message: message.into(),
        }
    }
}

/// Shorthand `Result` type used throughout the stpn workspace.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Return `Err(Error::Validation(...))` if `$cond` is false.
///
/// # Example
/// ```
/// use stpn_core::ensure;
/// fn positive(x: f64) -> stpn_core::Result<f64> {
///     ensure!(x > 0.0, "x must be positive, got {x}");
///     Ok(x)
/// }
/// assert!(positive(1.0).is_ok());
/// assert!(positive(-1.0).is_err());
/// ```
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $($msg:tt)*) => {
        if !$cond {
            return Err($crate::errors::Error::Validation(
                format!($($msg)*)
            ));
        }
    };
}

/// Return `Err(Error::Structural(...))` immediately.
#[macro_export]
macro_rules! fail {
    ($($msg:tt)*) => {
        return Err($crate::errors::Error::Structural(format!($($msg)*)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_error_displays_stage() {
        let e = Error::numeric(Stage::StationarySolve, "singular matrix");
        assert_eq!(
            e.to_string(),
            "numeric error during stationary solve: singular matrix"
        );
    }

    #[test]
    fn ensure_macro_produces_validation() {
        fn check(x: i32) -> Result<()> {
            ensure!(x >= 0, "negative: {x}");
            Ok(())
        }
        assert_eq!(
            check(-1),
            Err(Error::Validation("negative: -1".to_string()))
        );
    }
}
