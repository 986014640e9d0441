//! Empirical statistics over per-run losses.

use serde::Serialize;

use crate::error::{Result, SimulationError};

/// Sorts a copy of `values` ascending.
///
/// # Errors
/// `NumericalFailure` if any value is NaN.
pub fn sorted(values: &[f64]) -> Result<Vec<f64>> {
    if values.iter().any(|v| v.is_nan()) {
        return Err(SimulationError::NumericalFailure(
            "cannot rank a loss list containing NaN".to_string(),
        ));
    }
    let mut out = values.to_vec();
    out.sort_by(f64::total_cmp);
    Ok(out)
}

/// Percentile `p` (0-100) of an ascending slice, linearly interpolated
/// between the two closest ranks. `p` is clamped to [0, 100].
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 100.0) };
    let rank = (sorted.len() as f64 - 1.0) * p / 100.0;
    let lo = rank.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Mean of the losses beyond the `p` percentile (0-100).
pub fn expected_shortfall(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let cutoff_idx = ((sorted.len() as f64) * p / 100.0).ceil() as usize;
    let tail = &sorted[cutoff_idx.min(sorted.len())..];
    if tail.is_empty() {
        return sorted[sorted.len() - 1];
    }
    tail.iter().sum::<f64>() / tail.len() as f64
}

/// Checks that every percentile point lies in [0, 100].
pub fn validate_percentiles(points: &[f64]) -> Result<()> {
    if points.is_empty() {
        return Err(SimulationError::invalid("percentiles", "must not be empty"));
    }
    if let Some(p) = points.iter().find(|p| !(0.0..=100.0).contains(*p)) {
        return Err(SimulationError::invalid(
            "percentiles",
            format!("{} is outside [0, 100]", p),
        ));
    }
    Ok(())
}

/// Equal-width histogram of a loss list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    /// `bins + 1` ascending edges.
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
    /// Counts normalised so that the histogram integrates to one.
    pub density: Vec<f64>,
}

impl Histogram {
    /// Bins `values` between their minimum and maximum. The last bin is
    /// closed on the right. A constant list is spread over `[v - 0.5, v + 0.5]`.
    pub fn from_values(values: &[f64], bins: usize) -> Result<Self> {
        if bins == 0 {
            return Err(SimulationError::invalid("histogram_bins", "must be positive"));
        }
        if values.is_empty() {
            return Err(SimulationError::invalid("values", "cannot bin an empty loss list"));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(SimulationError::NumericalFailure(
                "cannot bin non-finite losses".to_string(),
            ));
        }

        let mut lo = values.iter().copied().fold(f64::INFINITY, f64::min);
        let mut hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if lo == hi {
            lo -= 0.5;
            hi += 0.5;
        }
        let width = (hi - lo) / bins as f64;
        let edges: Vec<f64> = (0..=bins).map(|i| lo + width * i as f64).collect();

        let mut counts = vec![0usize; bins];
        for &v in values {
            let idx = (((v - lo) / width).floor() as usize).min(bins - 1);
            counts[idx] += 1;
        }

        let n = values.len() as f64;
        let density = counts.iter().map(|&c| c as f64 / (n * width)).collect();

        Ok(Self {
            edges,
            counts,
            density,
        })
    }

    pub fn bins(&self) -> usize {
        self.counts.len()
    }
}

/// Descriptive statistics of one loss distribution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LossSummary {
    pub runs: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    /// Share of runs with a positive loss.
    pub loss_probability: f64,
    /// Mean loss beyond the 99th percentile.
    pub expected_shortfall_99: f64,
}

impl LossSummary {
    pub fn from_sorted(sorted: &[f64]) -> Self {
        let runs = sorted.len();
        if runs == 0 {
            return Self {
                runs,
                mean: 0.0,
                std_dev: 0.0,
                min: 0.0,
                max: 0.0,
                loss_probability: 0.0,
                expected_shortfall_99: 0.0,
            };
        }
        let n = runs as f64;
        let mean = sorted.iter().sum::<f64>() / n;
        let variance = sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;

        Self {
            runs,
            mean,
            std_dev: variance.sqrt(),
            min: sorted[0],
            max: sorted[runs - 1],
            loss_probability: sorted.iter().filter(|&&x| x > 0.0).count() as f64 / n,
            expected_shortfall_99: expected_shortfall(sorted, 99.0),
        }
    }

    pub fn variance(&self) -> f64 {
        self.std_dev * self.std_dev
    }
}
