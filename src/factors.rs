//! Random factor draws for the single-factor model.
//!
//! [`RandomFactorProvider`] wraps a seeded `StdRng` and produces standard
//! normal [`RandomDraws`]. A draw set is generated once and then shared
//! read-only, so that a correlation sweep differs only through `rho` and
//! never through sampling noise.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::prelude::*;
use rand_distr::StandardNormal;

use crate::error::{Result, SimulationError};

/// Systematic and idiosyncratic standard normal draws.
///
/// `systematic` has one entry per run; `idiosyncratic` is laid out
/// loans × runs.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomDraws {
    systematic: Array1<f64>,
    idiosyncratic: Array2<f64>,
}

impl RandomDraws {
    /// Wraps caller-supplied draws.
    ///
    /// # Errors
    /// - `DimensionMismatch` if the idiosyncratic column count differs from
    ///   the systematic length.
    /// - `InvalidParameter` if the draws are empty or contain NaN/inf.
    pub fn from_parts(systematic: Array1<f64>, idiosyncratic: Array2<f64>) -> Result<Self> {
        let (loans, runs) = idiosyncratic.dim();
        if runs != systematic.len() {
            return Err(SimulationError::DimensionMismatch {
                expected_loans: loans,
                expected_runs: systematic.len(),
                actual_loans: loans,
                actual_runs: runs,
            });
        }
        if loans == 0 || runs == 0 {
            return Err(SimulationError::invalid("draws", "must contain at least one loan and one run"));
        }
        if let Some(bad) = systematic.iter().position(|z| !z.is_finite()) {
            return Err(SimulationError::invalid(
                "systematic",
                format!("non-finite draw at run {}", bad),
            ));
        }
        if idiosyncratic.iter().any(|e| !e.is_finite()) {
            return Err(SimulationError::invalid("idiosyncratic", "contains non-finite draws"));
        }
        Ok(Self {
            systematic,
            idiosyncratic,
        })
    }

    /// Builds draws from a systematic vector and row-per-loan epsilons.
    pub fn from_vecs(systematic: Vec<f64>, idiosyncratic: Vec<Vec<f64>>) -> Result<Self> {
        let runs = systematic.len();
        let loans = idiosyncratic.len();
        if let Some(row) = idiosyncratic.iter().find(|row| row.len() != runs) {
            return Err(SimulationError::DimensionMismatch {
                expected_loans: loans,
                expected_runs: runs,
                actual_loans: loans,
                actual_runs: row.len(),
            });
        }
        let flat: Vec<f64> = idiosyncratic.into_iter().flatten().collect();
        let matrix = Array2::from_shape_vec((loans, runs), flat)
            .map_err(|e| SimulationError::invalid("idiosyncratic", e.to_string()))?;
        Self::from_parts(Array1::from(systematic), matrix)
    }

    pub fn num_loans(&self) -> usize {
        self.idiosyncratic.nrows()
    }

    pub fn num_simulations(&self) -> usize {
        self.systematic.len()
    }

    pub fn systematic(&self) -> ArrayView1<'_, f64> {
        self.systematic.view()
    }

    pub fn idiosyncratic(&self) -> ArrayView2<'_, f64> {
        self.idiosyncratic.view()
    }

    /// Checks the draw set against the expected (loans, runs) shape.
    pub fn check_shape(&self, num_loans: usize, num_simulations: usize) -> Result<()> {
        if self.num_loans() != num_loans || self.num_simulations() != num_simulations {
            return Err(SimulationError::DimensionMismatch {
                expected_loans: num_loans,
                expected_runs: num_simulations,
                actual_loans: self.num_loans(),
                actual_runs: self.num_simulations(),
            });
        }
        Ok(())
    }
}

/// Seeded source of fresh [`RandomDraws`].
pub struct RandomFactorProvider {
    rng: StdRng,
    seed: u64,
}

impl RandomFactorProvider {
    /// Provider with a fixed seed; identical seeds give identical draws.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    /// Provider seeded from OS entropy. The chosen seed is kept so a run
    /// can be replayed.
    pub fn from_entropy() -> Self {
        Self::from_seed(rand::thread_rng().gen())
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Mutable access to the underlying generator, e.g. for portfolio generation.
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Draws a new systematic vector and idiosyncratic matrix.
    ///
    /// # Errors
    /// `InvalidParameter` if either dimension is zero.
    pub fn draw(&mut self, num_loans: usize, num_simulations: usize) -> Result<RandomDraws> {
        if num_loans == 0 {
            return Err(SimulationError::invalid("num_loans", "must be positive"));
        }
        if num_simulations == 0 {
            return Err(SimulationError::invalid("num_simulations", "must be positive"));
        }
        let rng = &mut self.rng;
        let systematic = Array1::from_shape_fn(num_simulations, |_| rng.sample::<f64, _>(StandardNormal));
        let idiosyncratic =
            Array2::from_shape_fn((num_loans, num_simulations), |_| rng.sample::<f64, _>(StandardNormal));
        Ok(RandomDraws {
            systematic,
            idiosyncratic,
        })
    }
}

/// Where the engine gets its draws from.
///
/// Generating and replaying are separate variants so a caller can never
/// switch between them by omission.
pub enum DrawSource<'a> {
    /// Draw a fresh set of the required shape from the provider.
    Generate(&'a mut RandomFactorProvider),
    /// Reuse a previously drawn or externally supplied set.
    Supplied(&'a RandomDraws),
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_draw_shape() {
        let mut provider = RandomFactorProvider::from_seed(42);
        let draws = provider.draw(5, 100).unwrap();
        assert_eq!(draws.num_loans(), 5);
        assert_eq!(draws.num_simulations(), 100);
        assert_eq!(draws.idiosyncratic().dim(), (5, 100));
    }

    #[test]
    fn test_same_seed_same_draws() {
        let a = RandomFactorProvider::from_seed(9).draw(3, 50).unwrap();
        let b = RandomFactorProvider::from_seed(9).draw(3, 50).unwrap();
        let c = RandomFactorProvider::from_seed(10).draw(3, 50).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_draws_are_standard_normal() {
        let draws = RandomFactorProvider::from_seed(1).draw(20, 10_000).unwrap();
        let eps = draws.idiosyncratic();
        let n = eps.len() as f64;
        let mean = eps.sum() / n;
        let var = eps.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / n;
        assert!(mean.abs() < 0.01);
        assert!((var - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        let mut provider = RandomFactorProvider::from_seed(0);
        assert!(provider.draw(0, 10).is_err());
        assert!(provider.draw(10, 0).is_err());
    }

    #[test]
    fn test_supplied_draws_validated() {
        let bad_shape = RandomDraws::from_parts(array![0.0, 1.0], array![[0.1, 0.2, 0.3]]);
        assert!(matches!(bad_shape, Err(SimulationError::DimensionMismatch { .. })));

        let nan = RandomDraws::from_parts(array![f64::NAN], array![[0.1]]);
        assert!(matches!(nan, Err(SimulationError::InvalidParameter { .. })));

        let ragged = RandomDraws::from_vecs(vec![0.0, 0.0], vec![vec![1.0, 2.0], vec![1.0]]);
        assert!(matches!(ragged, Err(SimulationError::DimensionMismatch { .. })));

        let ok = RandomDraws::from_vecs(vec![0.0], vec![vec![1.0], vec![-1.0]]).unwrap();
        assert!(ok.check_shape(2, 1).is_ok());
        assert!(matches!(
            ok.check_shape(3, 1),
            Err(SimulationError::DimensionMismatch { expected_loans: 3, .. })
        ));
    }
}
