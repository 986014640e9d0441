//! Vasicek Convergence Check Binary
//!
//! Simulates one correlation with a large run count and compares the
//! empirical loss percentiles with the analytic Vasicek curve.
//!
//! ## Usage
//! ```bash
//! cargo run --bin vasicek_check --release -- --correlation 0.15
//! ```

use clap::Parser;
use single_factor_sim::engine::{Correlation, SimulationEngine, Strategy};
use single_factor_sim::factors::{DrawSource, RandomFactorProvider};
use single_factor_sim::portfolio::PortfolioGenerator;
use single_factor_sim::vasicek::{compare_to_simulation, VasicekEstimator};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "vasicek_check")]
#[command(about = "Compare simulated loss percentiles with the Vasicek formula")]
struct Cli {
    /// Asset correlation in [0, 1)
    #[arg(short, long, default_value = "0.15")]
    correlation: f64,

    #[arg(long, default_value = "1000")]
    num_loans: usize,

    #[arg(long, default_value = "100000")]
    num_simulations: usize,

    #[arg(long, default_value = "10000")]
    balance_min: f64,

    #[arg(long, default_value = "10000000")]
    balance_max: f64,

    #[arg(long, default_value = "42")]
    seed: u64,

    /// Allowed gap in percentage points of balance
    #[arg(long, default_value = "1.0")]
    tolerance: f64,
}

const CHECK_ALPHAS: [f64; 6] = [0.5, 0.75, 0.9, 0.95, 0.99, 0.999];

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let correlation = Correlation::new(cli.correlation)?;

    let mut provider = RandomFactorProvider::from_seed(cli.seed);
    let portfolio = PortfolioGenerator::default().generate(
        cli.num_loans,
        cli.balance_min,
        cli.balance_max,
        provider.rng(),
    )?;

    info!(
        correlation = cli.correlation,
        runs = cli.num_simulations,
        "simulating"
    );
    let result = SimulationEngine::new(Strategy::Parallel).run(
        &portfolio,
        correlation,
        cli.num_simulations,
        DrawSource::Generate(&mut provider),
    )?;

    let estimator = VasicekEstimator::new(&portfolio)?;
    let report = compare_to_simulation(&estimator, &result, &CHECK_ALPHAS, cli.tolerance)?;

    println!("=======================================================");
    println!("  Vasicek vs Simulation (rho = {})", cli.correlation);
    println!("=======================================================");
    println!();
    println!("| alpha  | Analytic % | Simulated % | Gap (pp) |");
    println!("|--------|------------|-------------|----------|");
    for point in &report.points {
        println!(
            "| {:6.3} | {:10.3} | {:11.3} | {:8.3} |",
            point.alpha, point.analytic_pct, point.simulated_pct, point.gap_pct
        );
    }
    println!();
    println!(
        "Max gap {:.3}pp over {} runs: {}",
        report.max_gap_pct(),
        report.runs,
        if report.within_tolerance() {
            "within tolerance"
        } else {
            "OUTSIDE tolerance"
        }
    );

    Ok(())
}
