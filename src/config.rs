//! Simulation configuration.
//!
//! Everything a run needs is carried in [`SimulationConfig`]: pool size and
//! balance range, run count, the correlation sweep, reported percentiles,
//! histogram selection and seed. It can be loaded from a TOML file, patched
//! from environment variables, or assembled with [`SimulationConfigBuilder`].

use serde::Deserialize;
use std::path::Path;

use crate::engine::{Correlation, Strategy, DEFAULT_BATCH_SIZE};
use crate::error::{Result, SimulationError};
use crate::stats::validate_percentiles;

/// Correlations 0.01, 0.02, ..., 0.50.
pub fn default_correlations() -> Vec<f64> {
    (1..=50).map(|i| round2(i as f64 * 0.01)).collect()
}

/// Rounds to two decimals, the resolution correlations are reported at.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn default_num_loans() -> usize {
    1000
}

fn default_num_simulations() -> usize {
    100_000
}

fn default_balance_min() -> f64 {
    10_000.0
}

fn default_balance_max() -> f64 {
    10_000_000.0
}

fn default_balance_step() -> f64 {
    1000.0
}

fn default_percentiles() -> Vec<f64> {
    vec![50.0, 75.0, 90.0, 95.0, 99.0, 99.9]
}

fn default_histogram_correlations() -> Vec<f64> {
    vec![0.05, 0.1, 0.15, 0.25]
}

fn default_histogram_bins() -> usize {
    50
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

/// Full description of a simulation sweep.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    #[serde(default = "default_num_loans")]
    pub num_loans: usize,

    #[serde(default = "default_num_simulations")]
    pub num_simulations: usize,

    /// Correlation values to sweep, each in [0, 1).
    #[serde(default = "default_correlations")]
    pub correlations: Vec<f64>,

    #[serde(default = "default_balance_min")]
    pub balance_min: f64,

    #[serde(default = "default_balance_max")]
    pub balance_max: f64,

    /// Generated balances are multiples of this step above `balance_min`.
    #[serde(default = "default_balance_step")]
    pub balance_step: f64,

    /// Percentile points (0-100) tracked across the sweep.
    #[serde(default = "default_percentiles")]
    pub percentiles: Vec<f64>,

    /// Correlations for which histogram bins are produced.
    #[serde(default = "default_histogram_correlations")]
    pub histogram_correlations: Vec<f64>,

    #[serde(default = "default_histogram_bins")]
    pub histogram_bins: usize,

    /// Seed for portfolio and factor draws; random when absent.
    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default)]
    pub strategy: Strategy,

    /// Runs per batch for the parallel strategy.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Evaluate correlations concurrently.
    #[serde(default)]
    pub parallel_sweep: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            num_loans: default_num_loans(),
            num_simulations: default_num_simulations(),
            correlations: default_correlations(),
            balance_min: default_balance_min(),
            balance_max: default_balance_max(),
            balance_step: default_balance_step(),
            percentiles: default_percentiles(),
            histogram_correlations: default_histogram_correlations(),
            histogram_bins: default_histogram_bins(),
            seed: None,
            strategy: Strategy::default(),
            batch_size: default_batch_size(),
            parallel_sweep: false,
        }
    }
}

impl SimulationConfig {
    pub fn builder() -> SimulationConfigBuilder {
        SimulationConfigBuilder::default()
    }

    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SimulationError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| SimulationError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SFS_NUM_LOANS`, `SFS_NUM_SIMULATIONS` and `SFS_SEED` overrides.
    pub fn with_env_override(mut self) -> Self {
        if let Some(n) = env_parse("SFS_NUM_LOANS") {
            self.num_loans = n;
        }
        if let Some(n) = env_parse("SFS_NUM_SIMULATIONS") {
            self.num_simulations = n;
        }
        if let Some(seed) = env_parse("SFS_SEED") {
            self.seed = Some(seed);
        }
        self
    }

    /// Validated correlation values, in sweep order.
    pub fn correlation_values(&self) -> Result<Vec<Correlation>> {
        self.correlations.iter().map(|&rho| Correlation::new(rho)).collect()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.num_loans == 0 {
            return Err(SimulationError::invalid("num_loans", "must be positive"));
        }
        if self.num_simulations == 0 {
            return Err(SimulationError::invalid("num_simulations", "must be positive"));
        }
        if self.correlations.is_empty() {
            return Err(SimulationError::invalid("correlations", "must not be empty"));
        }
        self.correlation_values()?;
        for &rho in &self.histogram_correlations {
            Correlation::new(rho)?;
        }
        if !(self.balance_min.is_finite() && self.balance_min > 0.0) {
            return Err(SimulationError::invalid(
                "balance_min",
                format!("must be positive and finite, got {}", self.balance_min),
            ));
        }
        if !self.balance_max.is_finite() || self.balance_min > self.balance_max {
            return Err(SimulationError::invalid(
                "balance_max",
                format!("must be finite and >= balance_min, got {}", self.balance_max),
            ));
        }
        if !(self.balance_step.is_finite() && self.balance_step > 0.0) {
            return Err(SimulationError::invalid("balance_step", "must be positive and finite"));
        }
        validate_percentiles(&self.percentiles)?;
        if self.histogram_bins == 0 {
            return Err(SimulationError::invalid("histogram_bins", "must be positive"));
        }
        if self.batch_size == 0 {
            return Err(SimulationError::invalid("batch_size", "must be positive"));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Builder for [`SimulationConfig`], validated at `build` time.
#[derive(Debug, Clone, Default)]
pub struct SimulationConfigBuilder {
    config: SimulationConfig,
}

impl SimulationConfigBuilder {
    pub fn num_loans(mut self, num_loans: usize) -> Self {
        self.config.num_loans = num_loans;
        self
    }

    pub fn num_simulations(mut self, num_simulations: usize) -> Self {
        self.config.num_simulations = num_simulations;
        self
    }

    pub fn correlations(mut self, correlations: Vec<f64>) -> Self {
        self.config.correlations = correlations;
        self
    }

    pub fn balance_range(mut self, balance_min: f64, balance_max: f64) -> Self {
        self.config.balance_min = balance_min;
        self.config.balance_max = balance_max;
        self
    }

    pub fn balance_step(mut self, balance_step: f64) -> Self {
        self.config.balance_step = balance_step;
        self
    }

    pub fn percentiles(mut self, percentiles: Vec<f64>) -> Self {
        self.config.percentiles = percentiles;
        self
    }

    pub fn histogram_correlations(mut self, correlations: Vec<f64>) -> Self {
        self.config.histogram_correlations = correlations;
        self
    }

    pub fn histogram_bins(mut self, bins: usize) -> Self {
        self.config.histogram_bins = bins;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    pub fn parallel_sweep(mut self, parallel: bool) -> Self {
        self.config.parallel_sweep = parallel;
        self
    }

    /// # Errors
    /// `InvalidParameter` for the first invalid field found.
    pub fn build(self) -> Result<SimulationConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = SimulationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.correlations.len(), 50);
        assert_eq!(config.correlations[0], 0.01);
        assert_eq!(config.correlations[49], 0.5);
    }

    #[test]
    fn test_builder_validation() {
        assert!(SimulationConfig::builder().num_loans(0).build().is_err());
        assert!(SimulationConfig::builder().num_simulations(0).build().is_err());
        assert!(SimulationConfig::builder().correlations(vec![0.2, 1.0]).build().is_err());
        assert!(SimulationConfig::builder().correlations(vec![]).build().is_err());
        assert!(SimulationConfig::builder().balance_range(5000.0, 1000.0).build().is_err());
        assert!(SimulationConfig::builder().percentiles(vec![120.0]).build().is_err());
        assert!(SimulationConfig::builder().histogram_bins(0).build().is_err());

        let config = SimulationConfig::builder()
            .num_loans(10)
            .num_simulations(200)
            .seed(4)
            .strategy(Strategy::Scalar)
            .build()
            .unwrap();
        assert_eq!(config.num_loans, 10);
        assert_eq!(config.seed, Some(4));
        assert_eq!(config.strategy, Strategy::Scalar);
    }

    #[test]
    fn test_from_toml() {
        let config = SimulationConfig::from_toml_str(
            r#"
            num_loans = 25
            num_simulations = 1000
            correlations = [0.0, 0.1, 0.2]
            seed = 99
            strategy = "parallel"
            "#,
        )
        .unwrap();

        assert_eq!(config.num_loans, 25);
        assert_eq!(config.correlations, vec![0.0, 0.1, 0.2]);
        assert_eq!(config.strategy, Strategy::Parallel);
        assert_eq!(config.percentiles, default_percentiles());
        assert_eq!(config.balance_step, 1000.0);
    }

    #[test]
    fn test_from_toml_rejects_bad_values() {
        assert!(matches!(
            SimulationConfig::from_toml_str("correlations = [1.0]"),
            Err(SimulationError::InvalidParameter { name: "correlation", .. })
        ));
        assert!(matches!(
            SimulationConfig::from_toml_str("unknown_key = 3"),
            Err(SimulationError::Config(_))
        ));
    }
}
