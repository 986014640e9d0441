//! Single-Factor Credit Portfolio Loss Simulation
//!
//! This library simulates the loss distribution of a loan pool under the
//! one-factor Gaussian copula (asset correlation model) and checks it
//! against the closed-form Vasicek percentiles.
//!
//! ## Modules
//!
//! - `portfolio`: loan exposures and the synthetic pool generator
//! - `factors`: reusable systematic / idiosyncratic normal draws
//! - `engine`: per-run portfolio loss (scalar, vectorized, parallel)
//! - `vasicek`: analytic loss percentiles and convergence checks
//! - `sweep`: percentile curves and histograms across correlations
//! - `config`: sweep configuration (TOML, env overrides, builder)
//!
//! ## Usage
//!
//! ```bash
//! # Sweep correlations 0.01..0.50 and print percentile curves
//! cargo run --bin loss_sweep --release
//!
//! # Compare simulated and analytic percentiles at one correlation
//! cargo run --bin vasicek_check --release -- --correlation 0.15
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod factors;
pub mod normal;
pub mod portfolio;
pub mod stats;
pub mod sweep;
pub mod vasicek;

pub use config::SimulationConfig;
pub use engine::{Correlation, SimulationEngine, SimulationResult, Strategy};
pub use error::{Result, SimulationError};
pub use factors::{DrawSource, RandomDraws, RandomFactorProvider};
pub use portfolio::{LoanExposure, Portfolio, PortfolioGenerator};
pub use sweep::{run_sweep, PercentileCurve, ResultAggregator, SweepReport};
pub use vasicek::{compare_to_simulation, ConvergenceReport, VasicekCurve, VasicekEstimator};
