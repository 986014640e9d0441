//! Analytic Vasicek Loss Percentiles
//!
//! Closed-form loss quantile of a large homogeneous-correlation pool:
//!
//! ```text
//! loss(alpha) = sum_j  w_j * LGD_j * N( (N^-1(PD_j) + sqrt(rho) * N^-1(alpha)) / sqrt(1 - rho) )
//! ```
//!
//! with `w_j = balance_j / total balance`. The result is a fraction of total
//! balance. It is the limit the simulated percentiles approach as the run
//! count grows; for small run counts the two are not interchangeable.

use serde::Serialize;

use crate::engine::{Correlation, SimulationResult};
use crate::error::{Result, SimulationError};
use crate::normal::{is_open_unit, norm_cdf, norm_inv};
use crate::portfolio::Portfolio;
use crate::stats::{percentile, sorted};

/// Number of points in [`default_alpha_grid`].
pub const DEFAULT_GRID_POINTS: usize = 999;

/// Confidence levels 0.001, 0.002, ..., 0.999.
pub fn default_alpha_grid() -> Vec<f64> {
    (1..=DEFAULT_GRID_POINTS).map(|i| i as f64 / 1000.0).collect()
}

/// Analytic loss curve: `fractions[i]` is the loss at `alphas[i]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VasicekCurve {
    pub correlation: f64,
    pub alphas: Vec<f64>,
    pub fractions: Vec<f64>,
}

impl VasicekCurve {
    /// Losses as percentages (0-100) of balance.
    pub fn pct(&self) -> Vec<f64> {
        self.fractions.iter().map(|f| f * 100.0).collect()
    }
}

/// Closed-form percentile estimator for one portfolio.
///
/// The per-loan terms that do not depend on `alpha` are computed once.
#[derive(Debug, Clone)]
pub struct VasicekEstimator {
    weighted_lgds: Vec<f64>,
    thresholds: Vec<f64>,
}

impl VasicekEstimator {
    /// # Errors
    /// `InvalidParameter` if a loan's PD has no finite inverse-normal.
    pub fn new(portfolio: &Portfolio) -> Result<Self> {
        let total = portfolio.total_balance();
        let mut weighted_lgds = Vec::with_capacity(portfolio.len());
        let mut thresholds = Vec::with_capacity(portfolio.len());

        for (j, loan) in portfolio.loans().iter().enumerate() {
            let threshold = loan.default_threshold();
            if !threshold.is_finite() {
                return Err(SimulationError::invalid(
                    "probability_of_default",
                    format!("loan {} has PD {}", j, loan.probability_of_default()),
                ));
            }
            weighted_lgds.push(loan.balance() / total * loan.loss_given_default());
            thresholds.push(threshold);
        }

        Ok(Self {
            weighted_lgds,
            thresholds,
        })
    }

    /// Loss fraction at a single confidence level.
    ///
    /// # Errors
    /// `InvalidParameter` if `alpha` is not in (0, 1).
    pub fn loss_at(&self, correlation: Correlation, alpha: f64) -> Result<f64> {
        if !is_open_unit(alpha) {
            return Err(SimulationError::invalid(
                "alpha",
                format!("must be in (0, 1), got {}", alpha),
            ));
        }
        let shift = correlation.systematic_weight() * norm_inv(alpha);
        let scale = correlation.idiosyncratic_weight();

        let loss = self
            .weighted_lgds
            .iter()
            .zip(&self.thresholds)
            .map(|(w_lgd, t)| w_lgd * norm_cdf((t + shift) / scale))
            .sum();
        Ok(loss)
    }

    /// Loss fractions for an ordered set of confidence levels.
    pub fn curve(&self, correlation: Correlation, alphas: &[f64]) -> Result<VasicekCurve> {
        let fractions = alphas
            .iter()
            .map(|&alpha| self.loss_at(correlation, alpha))
            .collect::<Result<Vec<_>>>()?;
        Ok(VasicekCurve {
            correlation: correlation.value(),
            alphas: alphas.to_vec(),
            fractions,
        })
    }
}

/// One row of a simulated-vs-analytic comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvergencePoint {
    pub alpha: f64,
    /// Analytic loss, % of balance.
    pub analytic_pct: f64,
    /// Simulated loss percentile, % of balance.
    pub simulated_pct: f64,
    /// Absolute gap in percentage points.
    pub gap_pct: f64,
}

/// Simulated percentiles checked against the analytic curve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvergenceReport {
    pub correlation: f64,
    pub runs: usize,
    pub tolerance_pct: f64,
    pub points: Vec<ConvergencePoint>,
}

impl ConvergenceReport {
    pub fn max_gap_pct(&self) -> f64 {
        self.points.iter().map(|p| p.gap_pct).fold(0.0, f64::max)
    }

    pub fn within_tolerance(&self) -> bool {
        self.max_gap_pct() <= self.tolerance_pct
    }
}

/// Compares a simulation's empirical percentiles with the analytic ones at
/// the same correlation.
///
/// `tolerance_pct` is in percentage points of balance.
pub fn compare_to_simulation(
    estimator: &VasicekEstimator,
    result: &SimulationResult,
    alphas: &[f64],
    tolerance_pct: f64,
) -> Result<ConvergenceReport> {
    let correlation = Correlation::new(result.correlation)?;
    let ranked = sorted(&result.pct_losses)?;

    let points = alphas
        .iter()
        .map(|&alpha| {
            let analytic_pct = estimator.loss_at(correlation, alpha)? * 100.0;
            let simulated_pct = percentile(&ranked, alpha * 100.0);
            Ok(ConvergencePoint {
                alpha,
                analytic_pct,
                simulated_pct,
                gap_pct: (analytic_pct - simulated_pct).abs(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ConvergenceReport {
        correlation: result.correlation,
        runs: result.runs(),
        tolerance_pct,
        points,
    })
}
