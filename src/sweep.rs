//! Correlation Sweep
//!
//! Runs the simulation for a list of correlation values against one shared
//! draw set, so that differences between correlations come from `rho` alone,
//! and collects:
//! - one percentile curve per configured percentile (correlation -> loss %)
//! - histogram bins for selected correlations
//! - summary statistics per correlation

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{round2, SimulationConfig};
use crate::engine::{Correlation, SimulationEngine};
use crate::error::{Result, SimulationError};
use crate::factors::{DrawSource, RandomDraws, RandomFactorProvider};
use crate::portfolio::{Portfolio, PortfolioGenerator};
use crate::stats::{percentile, sorted, validate_percentiles, Histogram, LossSummary};

/// Loss (% of balance) at one percentile, indexed by correlation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PercentileCurve {
    pub percentile: f64,
    pub correlations: Vec<f64>,
    pub losses_pct: Vec<f64>,
}

impl PercentileCurve {
    fn new(percentile: f64) -> Self {
        Self {
            percentile,
            correlations: Vec::new(),
            losses_pct: Vec::new(),
        }
    }

    fn push(&mut self, correlation: f64, loss_pct: f64) {
        self.correlations.push(correlation);
        self.losses_pct.push(loss_pct);
    }

    pub fn len(&self) -> usize {
        self.correlations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.correlations.is_empty()
    }

    /// Loss at a correlation in the curve, matched at two-decimal resolution.
    pub fn at(&self, correlation: f64) -> Option<f64> {
        self.correlations
            .iter()
            .position(|&c| round2(c) == round2(correlation))
            .map(|i| self.losses_pct[i])
    }
}

/// Histogram of percentage losses for one correlation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationHistogram {
    pub correlation: f64,
    pub histogram: Histogram,
}

/// Everything computed for one correlation value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationOutcome {
    pub correlation: f64,
    pub summary: LossSummary,
    /// Empirical loss % at each configured percentile, in configured order.
    pub percentile_losses: Vec<f64>,
    pub histogram: Option<Histogram>,
    /// Per-run loss %, kept only when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pct_losses: Option<Vec<f64>>,
}

/// Result of a full correlation sweep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepReport {
    pub num_loans: usize,
    pub num_simulations: usize,
    pub total_balance: f64,
    pub curves: Vec<PercentileCurve>,
    pub histograms: Vec<CorrelationHistogram>,
    pub outcomes: Vec<CorrelationOutcome>,
}

impl SweepReport {
    pub fn curve(&self, percentile: f64) -> Option<&PercentileCurve> {
        self.curves.iter().find(|c| c.percentile == percentile)
    }
}

/// Collects percentile curves, histograms and summaries over a sweep.
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    percentiles: Vec<f64>,
    histogram_correlations: Vec<f64>,
    histogram_bins: usize,
    parallel: bool,
    keep_losses: bool,
}

impl ResultAggregator {
    /// # Errors
    /// `InvalidParameter` if `percentiles` is empty or outside [0, 100].
    pub fn new(percentiles: Vec<f64>) -> Result<Self> {
        validate_percentiles(&percentiles)?;
        Ok(Self {
            percentiles,
            histogram_correlations: Vec::new(),
            histogram_bins: 50,
            parallel: false,
            keep_losses: false,
        })
    }

    pub fn from_config(config: &SimulationConfig) -> Result<Self> {
        Ok(Self::new(config.percentiles.clone())?
            .with_histograms(config.histogram_correlations.clone(), config.histogram_bins)?
            .with_parallel(config.parallel_sweep))
    }

    /// Produce `bins`-bin histograms for the given correlations.
    pub fn with_histograms(mut self, correlations: Vec<f64>, bins: usize) -> Result<Self> {
        if bins == 0 {
            return Err(SimulationError::invalid("histogram_bins", "must be positive"));
        }
        self.histogram_correlations = correlations.into_iter().map(round2).collect();
        self.histogram_bins = bins;
        Ok(self)
    }

    /// Evaluate correlations concurrently.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Keep each correlation's per-run loss list in the report.
    pub fn keep_losses(mut self, keep: bool) -> Self {
        self.keep_losses = keep;
        self
    }

    pub fn percentiles(&self) -> &[f64] {
        &self.percentiles
    }

    /// Runs `engine` for every correlation against the same `draws`.
    ///
    /// Shapes are checked once up front, so the sweep either fails before
    /// any simulation or returns results for every correlation.
    pub fn sweep(
        &self,
        engine: &SimulationEngine,
        portfolio: &Portfolio,
        correlations: &[Correlation],
        draws: &RandomDraws,
    ) -> Result<SweepReport> {
        if correlations.is_empty() {
            return Err(SimulationError::invalid("correlations", "must not be empty"));
        }
        draws.check_shape(portfolio.len(), draws.num_simulations())?;
        let runs = draws.num_simulations();

        info!(
            correlations = correlations.len(),
            runs,
            loans = portfolio.len(),
            strategy = engine.strategy().name(),
            parallel = self.parallel,
            "starting correlation sweep"
        );

        let outcomes: Vec<CorrelationOutcome> = if self.parallel {
            correlations
                .par_iter()
                .map(|&rho| self.evaluate(engine, portfolio, rho, draws))
                .collect::<Result<Vec<_>>>()?
        } else {
            correlations
                .iter()
                .map(|&rho| self.evaluate(engine, portfolio, rho, draws))
                .collect::<Result<Vec<_>>>()?
        };

        let mut curves: Vec<PercentileCurve> =
            self.percentiles.iter().map(|&p| PercentileCurve::new(p)).collect();
        let mut histograms = Vec::new();
        for outcome in &outcomes {
            for (curve, &loss) in curves.iter_mut().zip(&outcome.percentile_losses) {
                curve.push(outcome.correlation, loss);
            }
            if let Some(histogram) = &outcome.histogram {
                histograms.push(CorrelationHistogram {
                    correlation: outcome.correlation,
                    histogram: histogram.clone(),
                });
            }
        }

        info!(correlations = outcomes.len(), "correlation sweep complete");

        Ok(SweepReport {
            num_loans: portfolio.len(),
            num_simulations: runs,
            total_balance: portfolio.total_balance(),
            curves,
            histograms,
            outcomes,
        })
    }

    fn evaluate(
        &self,
        engine: &SimulationEngine,
        portfolio: &Portfolio,
        correlation: Correlation,
        draws: &RandomDraws,
    ) -> Result<CorrelationOutcome> {
        debug!(correlation = correlation.value(), "running calculation");
        let result = engine.run(
            portfolio,
            correlation,
            draws.num_simulations(),
            DrawSource::Supplied(draws),
        )?;

        let ranked = sorted(&result.pct_losses)?;
        let percentile_losses = self
            .percentiles
            .iter()
            .map(|&p| percentile(&ranked, p))
            .collect();

        let histogram = if self.histogram_correlations.contains(&round2(correlation.value())) {
            Some(Histogram::from_values(&result.pct_losses, self.histogram_bins)?)
        } else {
            None
        };

        Ok(CorrelationOutcome {
            correlation: correlation.value(),
            summary: LossSummary::from_sorted(&ranked),
            percentile_losses,
            histogram,
            pct_losses: self.keep_losses.then_some(result.pct_losses),
        })
    }
}

/// A generated portfolio and draw set together with the sweep over them.
#[derive(Debug, Clone)]
pub struct SweepRun {
    pub seed: u64,
    pub portfolio: Portfolio,
    pub report: SweepReport,
}

/// Generates the pool and draws described by `config`, then sweeps every
/// configured correlation over them.
pub fn run_sweep(config: &SimulationConfig) -> Result<SweepRun> {
    config.validate()?;
    let correlations = config.correlation_values()?;

    let mut provider = match config.seed {
        Some(seed) => RandomFactorProvider::from_seed(seed),
        None => RandomFactorProvider::from_entropy(),
    };
    let seed = provider.seed();

    let portfolio = PortfolioGenerator::with_step(config.balance_step)?.generate(
        config.num_loans,
        config.balance_min,
        config.balance_max,
        provider.rng(),
    )?;
    let draws = provider.draw(config.num_loans, config.num_simulations)?;

    let engine = SimulationEngine::new(config.strategy).with_batch_size(config.batch_size)?;
    let report = ResultAggregator::from_config(config)?.sweep(&engine, &portfolio, &correlations, &draws)?;

    Ok(SweepRun {
        seed,
        portfolio,
        report,
    })
}
