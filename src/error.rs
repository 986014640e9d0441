//! Error type shared by every simulation operation.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, SimulationError>;

/// Errors raised while validating inputs or running a simulation.
///
/// All variants except `NumericalFailure` are detected before any
/// computation starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    /// A scalar or list input is outside its valid domain.
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Description of the invalid value.
        reason: String,
    },

    /// Supplied random draws do not match the portfolio and run count.
    #[error(
        "Dimension mismatch: expected {expected_loans} loans x {expected_runs} runs, \
         got {actual_loans} x {actual_runs}"
    )]
    DimensionMismatch {
        expected_loans: usize,
        expected_runs: usize,
        actual_loans: usize,
        actual_runs: usize,
    },

    /// A computed value came out NaN or infinite.
    #[error("Numerical failure: {0}")]
    NumericalFailure(String),

    /// Configuration file could not be read or parsed.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SimulationError {
    /// Create an invalid parameter error
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SimulationError::invalid("correlation", "must be in [0, 1), got 1");
        assert!(err.to_string().contains("correlation"));

        let err = SimulationError::DimensionMismatch {
            expected_loans: 3,
            expected_runs: 10,
            actual_loans: 2,
            actual_runs: 10,
        };
        assert!(err.to_string().contains("expected 3 loans x 10 runs"));
    }
}
