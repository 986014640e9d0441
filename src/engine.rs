//! Single-Factor Loss Simulation
//!
//! Per-run portfolio loss under the one-factor Gaussian copula:
//!
//! ```text
//! R_js = sqrt(rho) * Z_s + sqrt(1 - rho) * eps_js
//! loan j defaults in run s  <=>  R_js < inv_norm(PD_j)
//! L_s  = sum_j  1{default} * LGD_j * balance_j
//! ```
//!
//! ## Strategies
//! - `Scalar`: explicit runs x loans double loop (reference)
//! - `Vectorized`: whole return matrix built with ndarray broadcasting
//! - `Parallel`: vectorized kernel over contiguous run batches on rayon
//!
//! All three perform the same floating-point operations in the same order,
//! so their per-run loss lists are identical, not merely close.

use ndarray::{s, Array1, ArrayView1, ArrayView2, Axis, Zip};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SimulationError};
use crate::factors::{DrawSource, RandomDraws};
use crate::portfolio::Portfolio;

/// Runs per batch for the parallel strategy.
pub const DEFAULT_BATCH_SIZE: usize = 4096;

/// Asset correlation `rho`, restricted to [0, 1).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Correlation(f64);

impl Correlation {
    /// # Errors
    /// `InvalidParameter` unless `0 <= rho < 1`.
    pub fn new(rho: f64) -> Result<Self> {
        if !(0.0..1.0).contains(&rho) {
            return Err(SimulationError::invalid(
                "correlation",
                format!("must be in [0, 1), got {}", rho),
            ));
        }
        Ok(Self(rho))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Loading on the systematic factor, sqrt(rho).
    #[inline]
    pub fn systematic_weight(&self) -> f64 {
        self.0.sqrt()
    }

    /// Loading on the idiosyncratic factor, sqrt(1 - rho). Never zero.
    #[inline]
    pub fn idiosyncratic_weight(&self) -> f64 {
        (1.0 - self.0).sqrt()
    }
}

/// How the per-run losses are computed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Scalar,
    #[default]
    Vectorized,
    Parallel,
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Scalar => "scalar",
            Self::Vectorized => "vectorized",
            Self::Parallel => "parallel",
        }
    }
}

/// Per-run losses for one correlation value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    pub correlation: f64,
    pub strategy: Strategy,
    pub total_balance: f64,
    /// Dollar loss per run, in run order.
    pub dollar_losses: Vec<f64>,
    /// Loss per run as a percentage (0-100) of total balance.
    pub pct_losses: Vec<f64>,
}

impl SimulationResult {
    pub fn runs(&self) -> usize {
        self.dollar_losses.len()
    }
}

/// Single-factor loss simulator.
#[derive(Debug, Clone, Copy)]
pub struct SimulationEngine {
    strategy: Strategy,
    batch_size: usize,
}

impl Default for SimulationEngine {
    fn default() -> Self {
        Self::new(Strategy::default())
    }
}

impl SimulationEngine {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Overrides the run batch size used by [`Strategy::Parallel`].
    pub fn with_batch_size(mut self, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(SimulationError::invalid("batch_size", "must be positive"));
        }
        self.batch_size = batch_size;
        Ok(self)
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Simulates `num_simulations` runs for one correlation value.
    ///
    /// Every input is validated before any loss is computed.
    ///
    /// # Errors
    /// - `InvalidParameter` for zero runs or a PD whose threshold is not finite
    /// - `DimensionMismatch` if supplied draws have the wrong shape
    /// - `NumericalFailure` if a run loss comes out NaN or infinite
    pub fn run(
        &self,
        portfolio: &Portfolio,
        correlation: Correlation,
        num_simulations: usize,
        source: DrawSource<'_>,
    ) -> Result<SimulationResult> {
        if num_simulations == 0 {
            return Err(SimulationError::invalid("num_simulations", "must be positive"));
        }
        let thresholds = checked_thresholds(portfolio)?;

        match source {
            DrawSource::Supplied(draws) => {
                draws.check_shape(portfolio.len(), num_simulations)?;
                self.simulate(portfolio, &thresholds, correlation, draws)
            }
            DrawSource::Generate(provider) => {
                let draws = provider.draw(portfolio.len(), num_simulations)?;
                self.simulate(portfolio, &thresholds, correlation, &draws)
            }
        }
    }

    fn simulate(
        &self,
        portfolio: &Portfolio,
        thresholds: &[f64],
        correlation: Correlation,
        draws: &RandomDraws,
    ) -> Result<SimulationResult> {
        let loss_amounts = portfolio.loss_amounts();

        let dollar_losses = match self.strategy {
            Strategy::Scalar => scalar_losses(thresholds, &loss_amounts, correlation, draws),
            Strategy::Vectorized => vectorized_losses(
                ArrayView1::from(thresholds),
                ArrayView1::from(&loss_amounts[..]),
                correlation,
                draws.systematic(),
                draws.idiosyncratic(),
            )
            .to_vec(),
            Strategy::Parallel => parallel_losses(
                thresholds,
                &loss_amounts,
                correlation,
                draws,
                self.batch_size,
            ),
        };

        if let Some(run) = dollar_losses.iter().position(|l| !l.is_finite()) {
            return Err(SimulationError::NumericalFailure(format!(
                "non-finite loss in run {} at correlation {}",
                run,
                correlation.value()
            )));
        }

        let total_balance = portfolio.total_balance();
        let pct_losses = dollar_losses
            .iter()
            .map(|loss| loss / total_balance * 100.0)
            .collect();

        debug!(
            correlation = correlation.value(),
            strategy = self.strategy.name(),
            runs = dollar_losses.len(),
            "simulated portfolio losses"
        );

        Ok(SimulationResult {
            correlation: correlation.value(),
            strategy: self.strategy,
            total_balance,
            dollar_losses,
            pct_losses,
        })
    }
}

fn checked_thresholds(portfolio: &Portfolio) -> Result<Vec<f64>> {
    let thresholds = portfolio.default_thresholds();
    if let Some(j) = thresholds.iter().position(|t| !t.is_finite()) {
        return Err(SimulationError::invalid(
            "probability_of_default",
            format!(
                "loan {} has PD {} with no finite default threshold",
                j,
                portfolio.loans()[j].probability_of_default()
            ),
        ));
    }
    Ok(thresholds)
}

fn scalar_losses(
    thresholds: &[f64],
    loss_amounts: &[f64],
    correlation: Correlation,
    draws: &RandomDraws,
) -> Vec<f64> {
    let sqrt_rho = correlation.systematic_weight();
    let sqrt_idio = correlation.idiosyncratic_weight();
    let z = draws.systematic();
    let eps = draws.idiosyncratic();

    let mut run_losses = Vec::with_capacity(z.len());
    for (s, &z_s) in z.iter().enumerate() {
        let mut run_loss = 0.0;

        for (j, (&threshold, &loss_amount)) in thresholds.iter().zip(loss_amounts).enumerate() {
            let r_js = sqrt_rho * z_s + sqrt_idio * eps[[j, s]];
            let is_defaulted = r_js < threshold;
            run_loss += if is_defaulted { loss_amount } else { 0.0 };
        }

        run_losses.push(run_loss);
    }
    run_losses
}

fn vectorized_losses(
    thresholds: ArrayView1<'_, f64>,
    loss_amounts: ArrayView1<'_, f64>,
    correlation: Correlation,
    z: ArrayView1<'_, f64>,
    eps: ArrayView2<'_, f64>,
) -> Array1<f64> {
    // 1 x runs row, broadcast down the loans x runs matrix
    let systematic = (&z * correlation.systematic_weight()).insert_axis(Axis(0));
    let returns = &eps * correlation.idiosyncratic_weight() + &systematic;

    let threshold_col = thresholds.insert_axis(Axis(1));
    let loss_col = loss_amounts.insert_axis(Axis(1));

    // Default mask applied to the loss column in the same pass.
    let loan_losses = Zip::from(&returns)
        .and_broadcast(&threshold_col)
        .and_broadcast(&loss_col)
        .map_collect(|&r, &t, &l| if r < t { l } else { 0.0 });

    // Sum down the loan axis, loan by loan.
    loan_losses.fold_axis(Axis(0), 0.0, |acc, x| acc + x)
}

fn parallel_losses(
    thresholds: &[f64],
    loss_amounts: &[f64],
    correlation: Correlation,
    draws: &RandomDraws,
    batch_size: usize,
) -> Vec<f64> {
    let runs = draws.num_simulations();
    let z = draws.systematic();
    let eps = draws.idiosyncratic();
    let thresholds = ArrayView1::from(thresholds);
    let loss_amounts = ArrayView1::from(loss_amounts);

    let batches: Vec<Array1<f64>> = (0..runs.div_ceil(batch_size))
        .into_par_iter()
        .map(|b| {
            let start = b * batch_size;
            let end = (start + batch_size).min(runs);
            vectorized_losses(
                thresholds,
                loss_amounts,
                correlation,
                z.slice(s![start..end]),
                eps.slice(s![.., start..end]),
            )
        })
        .collect();

    batches.iter().flat_map(|batch| batch.iter().copied()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::RandomFactorProvider;
    use crate::normal::norm_inv;
    use crate::portfolio::PortfolioGenerator;
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn two_loan_scenario() -> (Portfolio, RandomDraws) {
        let portfolio = Portfolio::from_columns(&[0.1, 0.1], &[1.0, 1.0], &[100.0, 100.0]).unwrap();
        let draws = RandomDraws::from_vecs(
            vec![0.0],
            vec![vec![norm_inv(0.05)], vec![norm_inv(0.20)]],
        )
        .unwrap();
        (portfolio, draws)
    }

    fn random_setup(loans: usize, runs: usize, seed: u64) -> (Portfolio, RandomDraws) {
        let mut rng = StdRng::seed_from_u64(seed);
        let portfolio = PortfolioGenerator::default()
            .generate(loans, 10_000.0, 1_000_000.0, &mut rng)
            .unwrap();
        let draws = RandomFactorProvider::from_seed(seed + 1).draw(loans, runs).unwrap();
        (portfolio, draws)
    }

    #[test]
    fn test_correlation_bounds() {
        assert!(Correlation::new(0.0).is_ok());
        assert!(Correlation::new(0.99).is_ok());
        assert!(Correlation::new(1.0).is_err());
        assert!(Correlation::new(-0.1).is_err());
        assert!(Correlation::new(f64::NAN).is_err());
    }

    #[test]
    fn test_two_loan_scenario() {
        let (portfolio, draws) = two_loan_scenario();
        let rho = Correlation::new(0.0).unwrap();

        for strategy in [Strategy::Scalar, Strategy::Vectorized, Strategy::Parallel] {
            let result = SimulationEngine::new(strategy)
                .run(&portfolio, rho, 1, DrawSource::Supplied(&draws))
                .unwrap();
            assert_eq!(result.dollar_losses, vec![100.0]);
            assert_abs_diff_eq!(result.pct_losses[0], 50.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_strategies_identical() {
        let (portfolio, draws) = random_setup(60, 2_500, 5);

        for &rho in &[0.0, 0.05, 0.3, 0.9] {
            let rho = Correlation::new(rho).unwrap();
            let scalar = SimulationEngine::new(Strategy::Scalar)
                .run(&portfolio, rho, 2_500, DrawSource::Supplied(&draws))
                .unwrap();
            let vectorized = SimulationEngine::new(Strategy::Vectorized)
                .run(&portfolio, rho, 2_500, DrawSource::Supplied(&draws))
                .unwrap();
            let parallel = SimulationEngine::new(Strategy::Parallel)
                .with_batch_size(333)
                .unwrap()
                .run(&portfolio, rho, 2_500, DrawSource::Supplied(&draws))
                .unwrap();

            assert_eq!(scalar.dollar_losses, vectorized.dollar_losses);
            assert_eq!(scalar.dollar_losses, parallel.dollar_losses);
            assert_eq!(scalar.pct_losses, parallel.pct_losses);
        }
    }

    #[test]
    fn test_generate_source_is_reproducible() {
        let (portfolio, _) = random_setup(10, 10, 3);
        let rho = Correlation::new(0.2).unwrap();
        let engine = SimulationEngine::default();

        let mut p1 = RandomFactorProvider::from_seed(77);
        let mut p2 = RandomFactorProvider::from_seed(77);
        let a = engine.run(&portfolio, rho, 500, DrawSource::Generate(&mut p1)).unwrap();
        let b = engine.run(&portfolio, rho, 500, DrawSource::Generate(&mut p2)).unwrap();
        assert_eq!(a, b);

        // the provider advances, so a second call sees fresh draws
        let c = engine.run(&portfolio, rho, 500, DrawSource::Generate(&mut p1)).unwrap();
        assert_ne!(a.dollar_losses, c.dollar_losses);
    }

    #[test]
    fn test_rejects_bad_inputs_before_computing() {
        let (portfolio, draws) = two_loan_scenario();
        let engine = SimulationEngine::default();
        let rho = Correlation::new(0.1).unwrap();

        assert!(matches!(
            engine.run(&portfolio, rho, 2, DrawSource::Supplied(&draws)),
            Err(SimulationError::DimensionMismatch { expected_runs: 2, actual_runs: 1, .. })
        ));
        assert!(matches!(
            engine.run(&portfolio, rho, 0, DrawSource::Supplied(&draws)),
            Err(SimulationError::InvalidParameter { name: "num_simulations", .. })
        ));

        let three = Portfolio::from_columns(&[0.1; 3], &[1.0; 3], &[1.0; 3]).unwrap();
        assert!(matches!(
            engine.run(&three, rho, 1, DrawSource::Supplied(&draws)),
            Err(SimulationError::DimensionMismatch { expected_loans: 3, actual_loans: 2, .. })
        ));
        assert!(SimulationEngine::default().with_batch_size(0).is_err());
    }

    #[test]
    fn test_smallest_pd_still_has_finite_threshold() {
        let portfolio = Portfolio::from_columns(&[5e-324, 0.5], &[1.0, 1.0], &[10.0, 10.0]).unwrap();
        assert!(checked_thresholds(&portfolio).is_ok());

        let draws = RandomDraws::from_vecs(vec![0.0], vec![vec![-10.0], vec![-10.0]]).unwrap();
        let result = SimulationEngine::new(Strategy::Scalar)
            .run(&portfolio, Correlation::new(0.0).unwrap(), 1, DrawSource::Supplied(&draws))
            .unwrap();
        assert_eq!(result.dollar_losses, vec![10.0]);
    }

    #[test]
    fn test_zero_correlation_uses_only_idiosyncratic_draws() {
        // With rho = 0 the systematic draw must not matter.
        let portfolio = Portfolio::from_columns(&[0.3, 0.6], &[1.0, 0.5], &[10.0, 20.0]).unwrap();
        let eps = vec![vec![-0.2, 0.4], vec![0.1, 0.5]];
        let calm = RandomDraws::from_vecs(vec![0.0, 0.0], eps.clone()).unwrap();
        let shocked = RandomDraws::from_vecs(vec![-5.0, 5.0], eps).unwrap();
        let rho = Correlation::new(0.0).unwrap();
        let engine = SimulationEngine::new(Strategy::Scalar);

        let a = engine.run(&portfolio, rho, 2, DrawSource::Supplied(&calm)).unwrap();
        let b = engine.run(&portfolio, rho, 2, DrawSource::Supplied(&shocked)).unwrap();
        assert_eq!(a.dollar_losses, b.dollar_losses);
    }

    #[test]
    fn test_lower_pd_never_adds_defaults() {
        let (portfolio, draws) = random_setup(20, 2_000, 21);
        let rho = Correlation::new(0.25).unwrap();
        let engine = SimulationEngine::default();

        let pds: Vec<f64> = portfolio.loans().iter().map(|l| l.probability_of_default()).collect();
        let lgds: Vec<f64> = portfolio.loans().iter().map(|l| l.loss_given_default()).collect();
        let bals: Vec<f64> = portfolio.loans().iter().map(|l| l.balance()).collect();

        let mut lowered = pds.clone();
        lowered[4] *= 0.5;
        let safer = Portfolio::from_columns(&lowered, &lgds, &bals).unwrap();

        let base = engine.run(&portfolio, rho, 2_000, DrawSource::Supplied(&draws)).unwrap();
        let less = engine.run(&safer, rho, 2_000, DrawSource::Supplied(&draws)).unwrap();
        for (b, l) in base.dollar_losses.iter().zip(&less.dollar_losses) {
            assert!(l <= b);
        }
    }
}
