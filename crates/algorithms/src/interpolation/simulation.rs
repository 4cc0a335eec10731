//! Conditional Gaussian simulation
//!
//! Each realization is an unconditional draw e ~ N(0, C) over the targets
//! and the observations, conditioned by kriging its residual at the
//! observations:
//! ```text
//! y_cond = K(y) + e_t − W·e_obs
//! ```
//! where K(y) is the kriging estimate and W the kriging weights. Targets
//! that coincide with an observation have a unit weight row, so their
//! realized value is the observation itself.
//!
//! Sub-seeds come from a [`SeedSequence`]; a realization depends only on
//! its own seed.

use crate::maybe_rayon::*;
use geokrig_core::{Error, Result, UnitVector};
use nalgebra::{Cholesky, DMatrix, DVector};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use rand_distr::StandardNormal;
use tracing::{debug, warn};

use super::external_drift::KrigingResult;

/// Deterministic stream of per-realization seeds derived from a master seed.
#[derive(Debug, Clone)]
pub struct SeedSequence {
    rng: StdRng,
}

impl SeedSequence {
    pub fn new(master: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(master) }
    }

    pub fn next_seed(&mut self) -> u64 {
        self.rng.next_u64()
    }

    /// The next `count` seeds.
    pub fn seeds(&mut self, count: usize) -> Vec<u64> {
        (0..count).map(|_| self.next_seed()).collect()
    }
}

impl Iterator for SeedSequence {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        Some(self.next_seed())
    }
}

/// Parameters for conditional simulation
#[derive(Debug, Clone)]
pub struct SimulationParams {
    /// Diagonal jitter attempts when the covariance is not numerically
    /// positive definite. Jitter starts at 1e-10·σ² and grows tenfold.
    pub jitter_attempts: usize,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self { jitter_attempts: 6 }
    }
}

/// One realization over the kriging targets, back-transformed.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalField {
    pub seed: u64,
    pub values: Vec<f64>,
}

/// Draws conditional realizations for a solved kriging problem.
pub struct ConditionalSimulator<'a> {
    kriging: &'a KrigingResult,
    /// Lower Cholesky factor over targets followed by unmatched observations
    factor: DMatrix<f64>,
    /// Position of each observation in the joint point list
    obs_index: Vec<usize>,
}

impl<'a> ConditionalSimulator<'a> {
    /// Factorize the joint covariance of targets and observations.
    ///
    /// # Errors
    /// `SingularSystem` if the covariance stays indefinite after every
    /// jitter attempt.
    pub fn new(kriging: &'a KrigingResult, params: &SimulationParams) -> Result<Self> {
        let m = kriging.targets.len();
        let mut points: Vec<UnitVector> = kriging.targets.clone();

        let mut obs_index = vec![usize::MAX; kriging.observations.len()];
        for (t, c) in kriging.coincident.iter().enumerate() {
            if let Some(i) = *c {
                obs_index[i] = t;
            }
        }
        for (i, slot) in obs_index.iter_mut().enumerate() {
            if *slot == usize::MAX {
                *slot = points.len();
                points.push(kriging.observations[i]);
            }
        }
        debug!(targets = m, extra = points.len() - m, "building simulation covariance");

        let model = &kriging.model;
        let size = points.len();
        let mut cov = DMatrix::<f64>::zeros(size, size);
        for i in 0..size {
            for j in i..size {
                let c = model.covariance_between(&points[i], &points[j]);
                cov[(i, j)] = c;
                cov[(j, i)] = c;
            }
        }

        let factor = cholesky_with_jitter(cov, model.variance, params.jitter_attempts)?;
        Ok(Self { kriging, factor, obs_index })
    }

    /// Number of values per realization
    pub fn len(&self) -> usize {
        self.kriging.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kriging.targets.is_empty()
    }

    /// Draw the realization for `seed`.
    pub fn realize(&self, seed: u64) -> ConditionalField {
        let mut rng = StdRng::seed_from_u64(seed);
        let size = self.factor.nrows();
        let z = DVector::from_fn(size, |_, _| rng.sample::<f64, _>(StandardNormal));
        let e = &self.factor * z;

        let e_obs = DVector::from_fn(self.obs_index.len(), |i, _| e[self.obs_index[i]]);
        let kriged_noise = &self.kriging.weights * e_obs;

        let k = self.kriging;
        let normalizer = k.model.normalizer;
        let values = (0..self.len())
            .map(|t| match k.coincident[t] {
                Some(i) => k.observed[i],
                None => normalizer.denormalize(k.estimate[t] + e[t] - kriged_noise[t]),
            })
            .collect();

        ConditionalField { seed, values }
    }

    /// One realization per seed, as a (seeds × targets) matrix.
    ///
    /// # Errors
    /// `Configuration` if `seeds` is empty.
    pub fn ensemble(&self, seeds: &[u64]) -> Result<Array2<f64>> {
        if seeds.is_empty() {
            return Err(Error::Configuration("at least one realization is required".into()));
        }
        let fields: Vec<ConditionalField> = seeds.to_vec().into_par_iter().map(|s| self.realize(s)).collect();

        let cols = self.len();
        let mut out = Array2::<f64>::zeros((fields.len(), cols));
        for (mut row, field) in out.rows_mut().into_iter().zip(&fields) {
            for (dst, &v) in row.iter_mut().zip(&field.values) {
                *dst = v;
            }
        }
        Ok(out)
    }
}

fn cholesky_with_jitter(cov: DMatrix<f64>, sill: f64, attempts: usize) -> Result<DMatrix<f64>> {
    if let Some(chol) = Cholesky::new(cov.clone()) {
        return Ok(chol.l());
    }
    let mut jitter = 1e-10 * sill.max(f64::MIN_POSITIVE);
    for attempt in 1..=attempts {
        let mut reg = cov.clone();
        for i in 0..reg.nrows() {
            reg[(i, i)] += jitter;
        }
        if let Some(chol) = Cholesky::new(reg) {
            warn!(attempt, jitter, "simulation covariance regularized with diagonal jitter");
            return Ok(chol.l());
        }
        jitter *= 10.0;
    }
    Err(Error::SingularSystem(format!(
        "simulation covariance not positive definite after {attempts} jitter attempts"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpolation::{
        external_drift_kriging, CovarianceFamily, CovarianceModel, DriftMatrix, ExternalDriftParams,
        Normalizer, SamplePoint,
    };
    use geokrig_core::GeoPoint;

    fn solved() -> (KrigingResult, Vec<SamplePoint>) {
        let obs: Vec<SamplePoint> = (0..8)
            .map(|i| {
                let lon = -100.0 + (i % 4) as f64 * 1.5;
                let lat = 35.0 + (i / 4) as f64 * 2.0;
                SamplePoint::new(lon, lat, 1.0 + 0.3 * i as f64)
            })
            .collect();
        let od = DriftMatrix::from_shape_fn((1, obs.len()), |(_, j)| obs[j].y - 35.0);

        let mut targets: Vec<GeoPoint> = (0..5).map(|i| GeoPoint::new(-99.5 + i as f64, 36.0)).collect();
        targets.push(obs[2].location());
        targets.push(obs[6].location());
        let td = DriftMatrix::from_shape_fn((1, targets.len()), |(_, j)| targets[j].y - 35.0);

        let model = CovarianceModel::new(CovarianceFamily::Gaussian, 0.4, 2.5, None, Normalizer::LogNormal);
        let res = external_drift_kriging(&model, &obs, &od, &targets, &td, &ExternalDriftParams::default()).unwrap();
        (res, obs)
    }

    #[test]
    fn test_seed_sequence_is_deterministic() {
        let a = SeedSequence::new(20170519).seeds(4);
        let b: Vec<u64> = SeedSequence::new(20170519).take(4).collect();
        assert_eq!(a, b);
        assert_ne!(a, SeedSequence::new(1).seeds(4));
        assert_ne!(a[0], a[1]);
    }

    #[test]
    fn test_realization_depends_only_on_seed() {
        let (res, _) = solved();
        let sim = ConditionalSimulator::new(&res, &SimulationParams::default()).unwrap();
        assert_eq!(sim.realize(7), sim.realize(7));
        assert_ne!(sim.realize(7).values, sim.realize(8).values);

        let m1 = sim.ensemble(&[7, 8, 9]).unwrap();
        let m2 = sim.ensemble(&[9, 8, 7]).unwrap();
        assert_eq!(m1.row(0), m2.row(2));
    }

    #[test]
    fn test_observed_targets_are_exact() {
        let (res, obs) = solved();
        let sim = ConditionalSimulator::new(&res, &SimulationParams::default()).unwrap();
        let ens = sim.ensemble(&SeedSequence::new(3).seeds(10)).unwrap();
        assert_eq!(ens.dim(), (10, 7));
        for row in ens.rows() {
            assert_eq!(row[5], obs[2].value);
            assert_eq!(row[6], obs[6].value);
            assert!(row.iter().all(|v| v.is_finite() && *v > 0.0));
        }
    }

    #[test]
    fn test_realizations_vary_at_unobserved_targets() {
        let (res, _) = solved();
        let sim = ConditionalSimulator::new(&res, &SimulationParams::default()).unwrap();
        let ens = sim.ensemble(&SeedSequence::new(11).seeds(20)).unwrap();
        let col = ens.column(2);
        let min = col.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = col.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        assert!(max > min);
    }

    #[test]
    fn test_empty_seed_list_is_rejected() {
        let (res, _) = solved();
        let sim = ConditionalSimulator::new(&res, &SimulationParams::default()).unwrap();
        assert!(sim.ensemble(&[]).unwrap_err().is_configuration());
    }

    #[test]
    fn test_jitter_rescues_semidefinite_covariance() {
        // Two identical rows: rank deficient
        let cov = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let l = cholesky_with_jitter(cov.clone(), 1.0, 6).unwrap();
        let rebuilt = &l * l.transpose();
        assert!((rebuilt - cov).abs().max() < 1e-6);
        let cov = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        assert!(cholesky_with_jitter(cov, 1.0, 3).unwrap_err().is_singular());
    }
}
