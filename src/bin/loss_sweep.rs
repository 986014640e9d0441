//! Correlation Sweep Binary
//!
//! Generates a synthetic loan pool, simulates its loss distribution for each
//! correlation in the sweep on one shared draw set, and prints how the loss
//! percentiles move with correlation.
//!
//! ## Usage
//! ```bash
//! cargo run --bin loss_sweep --release
//! cargo run --bin loss_sweep --release -- --config sweep.toml --format json
//! RUST_LOG=debug cargo run --bin loss_sweep -- --num-simulations 10000
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use single_factor_sim::config::SimulationConfig;
use single_factor_sim::engine::Strategy;
use single_factor_sim::sweep::{run_sweep, SweepRun};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Parser)]
#[command(name = "loss_sweep")]
#[command(about = "Single-factor portfolio loss percentiles across asset correlations")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of loans in the generated pool
    #[arg(long)]
    num_loans: Option<usize>,

    /// Number of simulation runs per correlation
    #[arg(long)]
    num_simulations: Option<usize>,

    /// Seed for the pool and the factor draws
    #[arg(long)]
    seed: Option<u64>,

    /// Loss computation strategy
    #[arg(long, value_parser = parse_strategy)]
    strategy: Option<Strategy>,

    /// Evaluate correlations concurrently
    #[arg(long)]
    parallel_sweep: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    format: OutputFormat,
}

fn parse_strategy(s: &str) -> Result<Strategy, String> {
    match s {
        "scalar" => Ok(Strategy::Scalar),
        "vectorized" => Ok(Strategy::Vectorized),
        "parallel" => Ok(Strategy::Parallel),
        other => Err(format!(
            "unknown strategy '{}': expected scalar, vectorized or parallel",
            other
        )),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SimulationConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SimulationConfig::default(),
    }
    .with_env_override();

    if let Some(n) = cli.num_loans {
        config.num_loans = n;
    }
    if let Some(n) = cli.num_simulations {
        config.num_simulations = n;
    }
    if let Some(seed) = cli.seed {
        config.seed = Some(seed);
    }
    if let Some(strategy) = cli.strategy {
        config.strategy = strategy;
    }
    config.parallel_sweep |= cli.parallel_sweep;

    info!(
        num_loans = config.num_loans,
        num_simulations = config.num_simulations,
        correlations = config.correlations.len(),
        "configuration loaded"
    );

    let run = run_sweep(&config)?;

    match cli.format {
        OutputFormat::Table => print_tables(&run),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&run.report)?),
    }
    Ok(())
}

fn print_tables(run: &SweepRun) {
    let report = &run.report;

    println!("=======================================================");
    println!("  Single-Factor Portfolio Loss Simulation");
    println!("=======================================================");
    println!();
    println!("Parameters:");
    println!("  Loans:              {}", report.num_loans);
    println!("  Runs per rho:       {}", report.num_simulations);
    println!("  Total balance:      ${:.0}", report.total_balance);
    println!("  Expected loss:      {:.2}%", run.portfolio.expected_loss_fraction() * 100.0);
    println!("  Seed:               {}", run.seed);
    println!();

    println!("Loss (% of balance) at percentile");
    print!("| rho  |");
    for curve in &report.curves {
        print!(" {:>7} |", format!("{}", curve.percentile));
    }
    println!(" {:>7} |", "std");
    print!("|------|");
    for _ in &report.curves {
        print!("---------|");
    }
    println!("---------|");

    for (i, outcome) in report.outcomes.iter().enumerate() {
        print!("| {:.2} |", outcome.correlation);
        for curve in &report.curves {
            print!(" {:7.2} |", curve.losses_pct[i]);
        }
        println!(" {:7.2} |", outcome.summary.std_dev);
    }

    for entry in &report.histograms {
        println!();
        println!("Histogram at rho = {}", entry.correlation);
        println!("{}", "-".repeat(50));
        let peak = entry.histogram.counts.iter().copied().max().unwrap_or(0).max(1);
        for (i, &count) in entry.histogram.counts.iter().enumerate() {
            let bar = "#".repeat(count * 40 / peak);
            println!("  {:7.2}% {:>7} {}", entry.histogram.edges[i], count, bar);
        }
    }
}
