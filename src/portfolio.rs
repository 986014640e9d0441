//! Loan Portfolio
//!
//! Loan exposures and the synthetic pool generator used by the simulation.
//!
//! ## Pool Generation
//! - PD uniform on the open interval (0, 1)
//! - LGD uniform on [0, 1)
//! - Balance uniform on a fixed grid `balance_min + k * step <= balance_max`

use rand::distributions::Open01;
use rand::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::error::{Result, SimulationError};
use crate::normal::{is_open_unit, norm_inv};

/// Default spacing of generated balances.
pub const DEFAULT_BALANCE_STEP: f64 = 1000.0;

/// A single loan: default probability, loss given default and balance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LoanExposure {
    probability_of_default: f64,
    loss_given_default: f64,
    balance: f64,
}

impl LoanExposure {
    /// Validated constructor.
    ///
    /// # Errors
    /// `InvalidParameter` if PD is not in (0, 1), LGD is not in [0, 1] or
    /// balance is not strictly positive and finite.
    pub fn new(probability_of_default: f64, loss_given_default: f64, balance: f64) -> Result<Self> {
        if !is_open_unit(probability_of_default) {
            return Err(SimulationError::invalid(
                "probability_of_default",
                format!("must be in (0, 1), got {}", probability_of_default),
            ));
        }
        if !(0.0..=1.0).contains(&loss_given_default) {
            return Err(SimulationError::invalid(
                "loss_given_default",
                format!("must be in [0, 1], got {}", loss_given_default),
            ));
        }
        if !(balance.is_finite() && balance > 0.0) {
            return Err(SimulationError::invalid(
                "balance",
                format!("must be positive and finite, got {}", balance),
            ));
        }
        Ok(Self {
            probability_of_default,
            loss_given_default,
            balance,
        })
    }

    pub fn probability_of_default(&self) -> f64 {
        self.probability_of_default
    }

    pub fn loss_given_default(&self) -> f64 {
        self.loss_given_default
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    /// Dollar loss if this loan defaults.
    #[inline]
    pub fn loss_amount(&self) -> f64 {
        self.loss_given_default * self.balance
    }

    /// Asset-return level below which the loan defaults, Φ⁻¹(PD).
    #[inline]
    pub fn default_threshold(&self) -> f64 {
        norm_inv(self.probability_of_default)
    }
}

/// Ordered, non-empty pool of loans.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Portfolio {
    loans: Vec<LoanExposure>,
    total_balance: f64,
}

impl Portfolio {
    /// Builds a portfolio from already validated loans.
    ///
    /// # Errors
    /// `InvalidParameter` if `loans` is empty or the total balance overflows.
    pub fn new(loans: Vec<LoanExposure>) -> Result<Self> {
        if loans.is_empty() {
            return Err(SimulationError::invalid("num_loans", "portfolio must contain at least one loan"));
        }
        let total_balance: f64 = loans.iter().map(|l| l.balance).sum();
        if !total_balance.is_finite() {
            return Err(SimulationError::invalid(
                "balance",
                format!("total balance of {} loans is not finite", loans.len()),
            ));
        }
        Ok(Self { loans, total_balance })
    }

    /// Builds a portfolio from parallel PD / LGD / balance columns.
    pub fn from_columns(pds: &[f64], lgds: &[f64], balances: &[f64]) -> Result<Self> {
        if pds.len() != lgds.len() || pds.len() != balances.len() {
            return Err(SimulationError::invalid(
                "loans",
                format!(
                    "column lengths differ: {} PDs, {} LGDs, {} balances",
                    pds.len(),
                    lgds.len(),
                    balances.len()
                ),
            ));
        }
        let loans = pds
            .iter()
            .zip(lgds)
            .zip(balances)
            .map(|((&pd, &lgd), &bal)| LoanExposure::new(pd, lgd, bal))
            .collect::<Result<Vec<_>>>()?;
        Self::new(loans)
    }

    pub fn loans(&self) -> &[LoanExposure] {
        &self.loans
    }

    pub fn len(&self) -> usize {
        self.loans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loans.is_empty()
    }

    pub fn total_balance(&self) -> f64 {
        self.total_balance
    }

    /// Share of total balance held by each loan; sums to 1.
    pub fn weights(&self) -> Vec<f64> {
        self.loans.iter().map(|l| l.balance / self.total_balance).collect()
    }

    /// Φ⁻¹(PD) per loan, in loan order.
    pub fn default_thresholds(&self) -> Vec<f64> {
        self.loans.iter().map(LoanExposure::default_threshold).collect()
    }

    /// LGD × balance per loan, in loan order.
    pub fn loss_amounts(&self) -> Vec<f64> {
        self.loans.iter().map(LoanExposure::loss_amount).collect()
    }

    /// Balance-weighted expected loss as a fraction of total balance.
    pub fn expected_loss_fraction(&self) -> f64 {
        self.loans
            .iter()
            .map(|l| l.probability_of_default * l.loss_amount())
            .sum::<f64>()
            / self.total_balance
    }
}

/// Draws synthetic loan pools.
#[derive(Debug, Clone)]
pub struct PortfolioGenerator {
    balance_step: f64,
}

impl Default for PortfolioGenerator {
    fn default() -> Self {
        Self {
            balance_step: DEFAULT_BALANCE_STEP,
        }
    }
}

impl PortfolioGenerator {
    /// Generator with a custom balance grid spacing.
    pub fn with_step(balance_step: f64) -> Result<Self> {
        if !(balance_step.is_finite() && balance_step > 0.0) {
            return Err(SimulationError::invalid(
                "balance_step",
                format!("must be positive and finite, got {}", balance_step),
            ));
        }
        Ok(Self { balance_step })
    }

    pub fn balance_step(&self) -> f64 {
        self.balance_step
    }

    /// Generates `num_loans` loans with balances in `[balance_min, balance_max]`.
    ///
    /// # Errors
    /// `InvalidParameter` if `num_loans == 0`, `balance_min <= 0`, a bound is
    /// not finite, or `balance_min > balance_max`.
    pub fn generate(
        &self,
        num_loans: usize,
        balance_min: f64,
        balance_max: f64,
        rng: &mut impl Rng,
    ) -> Result<Portfolio> {
        if num_loans == 0 {
            return Err(SimulationError::invalid("num_loans", "must be positive"));
        }
        if !(balance_min.is_finite() && balance_max.is_finite()) {
            return Err(SimulationError::invalid("balance_min", "balance bounds must be finite"));
        }
        if balance_min <= 0.0 {
            return Err(SimulationError::invalid(
                "balance_min",
                format!("must be positive, got {}", balance_min),
            ));
        }
        if balance_min > balance_max {
            return Err(SimulationError::invalid(
                "balance_min",
                format!("{} exceeds balance_max {}", balance_min, balance_max),
            ));
        }

        let grid_points = ((balance_max - balance_min) / self.balance_step).floor() as u64;

        let loans: Vec<LoanExposure> = (0..num_loans)
            .map(|_| {
                let pd: f64 = rng.sample(Open01);
                let lgd: f64 = rng.gen();
                let k = rng.gen_range(0..=grid_points);
                LoanExposure {
                    probability_of_default: pd,
                    loss_given_default: lgd,
                    balance: balance_min + k as f64 * self.balance_step,
                }
            })
            .collect();

        let portfolio = Portfolio::new(loans)?;
        debug!(
            num_loans,
            total_balance = portfolio.total_balance(),
            "generated loan pool"
        );
        Ok(portfolio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;

    #[test]
    fn test_generated_pool_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let pool = PortfolioGenerator::default()
            .generate(500, 10_000.0, 10_000_000.0, &mut rng)
            .unwrap();

        assert_eq!(pool.len(), 500);
        for loan in pool.loans() {
            assert!(loan.probability_of_default() > 0.0 && loan.probability_of_default() < 1.0);
            assert!((0.0..=1.0).contains(&loan.loss_given_default()));
            assert!(loan.balance() >= 10_000.0 && loan.balance() <= 10_000_000.0);
            let steps = (loan.balance() - 10_000.0) / 1000.0;
            assert_abs_diff_eq!(steps, steps.round(), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_weights_sum_to_one() {
        let mut rng = StdRng::seed_from_u64(11);
        let pool = PortfolioGenerator::default()
            .generate(1000, 10_000.0, 10_000_000.0, &mut rng)
            .unwrap();
        let total: f64 = pool.weights().iter().sum();
        assert_abs_diff_eq!(total, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_equal_bounds_give_constant_balance() {
        let mut rng = StdRng::seed_from_u64(3);
        let pool = PortfolioGenerator::default()
            .generate(10, 5000.0, 5000.0, &mut rng)
            .unwrap();
        assert!(pool.loans().iter().all(|l| l.balance() == 5000.0));
        assert_abs_diff_eq!(pool.total_balance(), 50_000.0);
    }

    #[test]
    fn test_generation_rejects_bad_inputs() {
        let mut rng = StdRng::seed_from_u64(0);
        let generator = PortfolioGenerator::default();
        assert!(generator.generate(0, 1.0, 2.0, &mut rng).is_err());
        assert!(generator.generate(5, 3000.0, 2000.0, &mut rng).is_err());
        assert!(generator.generate(5, 0.0, 2000.0, &mut rng).is_err());
        assert!(PortfolioGenerator::with_step(0.0).is_err());
    }

    #[test]
    fn test_loan_validation() {
        assert!(LoanExposure::new(0.0, 0.5, 100.0).is_err());
        assert!(LoanExposure::new(1.0, 0.5, 100.0).is_err());
        assert!(LoanExposure::new(0.1, 1.5, 100.0).is_err());
        assert!(LoanExposure::new(0.1, 0.5, -1.0).is_err());
        assert!(LoanExposure::new(0.1, 1.0, 100.0).is_ok());
        assert!(Portfolio::new(Vec::new()).is_err());
        assert!(Portfolio::from_columns(&[0.1], &[0.5, 0.5], &[1.0]).is_err());
    }

    #[test]
    fn test_overflowing_total_balance_rejected() {
        let huge = Portfolio::from_columns(&[0.5, 0.5], &[1.0, 1.0], &[1e308, 1e308]);
        assert!(matches!(
            huge,
            Err(SimulationError::InvalidParameter { name: "balance", .. })
        ));

        let large = Portfolio::from_columns(&[0.5, 0.5], &[1.0, 1.0], &[1e307, 1e307]).unwrap();
        let total: f64 = large.weights().iter().sum();
        assert_abs_diff_eq!(total, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_loss_amounts_and_expected_loss() {
        let pool = Portfolio::from_columns(&[0.1, 0.2], &[0.5, 1.0], &[100.0, 300.0]).unwrap();
        assert_eq!(pool.loss_amounts(), vec![50.0, 300.0]);
        // (0.1 * 50 + 0.2 * 300) / 400
        assert_abs_diff_eq!(pool.expected_loss_fraction(), 65.0 / 400.0, epsilon = 1e-15);
    }
}
