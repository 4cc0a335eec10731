//! External Drift Kriging (KED) on the sphere
//!
//! Universal kriging where the trend is a linear combination of covariates
//! known at every location instead of coordinate monomials. With p drift
//! functions f = {1, d₁, d₂} the system for n observations is:
//! ```text
//! [C(xᵢ,xⱼ) | fₖ(xᵢ)] [wᵢ]   [C(xᵢ,x₀)]
//! [----------+-------] [  ] = [--------]
//! [fₖ(xᵢ)ᵀ  |   0   ] [μₖ]   [fₖ(x₀)  ]
//! ```
//! and the kriging variance is σ²(x₀) = C(0) − wᵀc₀ − μᵀf₀.
//!
//! Every target uses all observations, so the left-hand side is the same
//! for every target: it is factorized once and the right-hand sides are
//! solved in chunks.
//!
//! Reference:
//! Wackernagel, H. (2003). Multivariate Geostatistics, ch. 38. Springer.
//! Cressie, N. (1993). Statistics for Spatial Data. Wiley.

use crate::maybe_rayon::*;
use geokrig_core::{Error, GeoPoint, Result, UnitVector};
use nalgebra::{DMatrix, DVector};
use tracing::debug;

use super::covariance::CovarianceModel;
use super::{DriftMatrix, SamplePoint};

/// Relative pivot magnitude below which the kriging matrix is singular
const PIVOT_TOLERANCE: f64 = 1e-12;

/// Parameters for External Drift Kriging
#[derive(Debug, Clone)]
pub struct ExternalDriftParams {
    /// Number of targets solved per right-hand-side block (default 100)
    pub chunk_size: usize,
    /// Targets closer than this to an observation (degrees) take its value
    pub snap_distance: f64,
}

impl Default for ExternalDriftParams {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            snap_distance: 1e-9,
        }
    }
}

/// Result of External Drift Kriging
#[derive(Debug, Clone)]
pub struct KrigingResult {
    /// Back-transformed kriging estimate per target
    pub mean: Vec<f64>,
    /// Kriging variance per target, in the normalized space
    pub variance: Vec<f64>,
    /// Back-transformed drift-only mean f₀ᵀβ per target
    pub drift_mean: Vec<f64>,
    /// GLS drift coefficients β: intercept first, then one per covariate
    pub coefficients: Vec<f64>,

    pub(crate) estimate: Vec<f64>,
    pub(crate) weights: DMatrix<f64>,
    pub(crate) coincident: Vec<Option<usize>>,
    pub(crate) model: CovarianceModel,
    pub(crate) observations: Vec<UnitVector>,
    pub(crate) observed: Vec<f64>,
    pub(crate) targets: Vec<UnitVector>,
}

impl KrigingResult {
    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    /// Kriging estimate per target before back-transformation
    pub fn normalized_estimate(&self) -> &[f64] {
        &self.estimate
    }

    /// Kriging weights, one row per target and one column per observation
    pub fn weights(&self) -> &DMatrix<f64> {
        &self.weights
    }

    /// Index of the observation each target coincides with, if any
    pub fn coincident(&self) -> &[Option<usize>] {
        &self.coincident
    }

    pub fn model(&self) -> &CovarianceModel {
        &self.model
    }
}

/// Krige `targets` from `observations` with external drift.
///
/// # Arguments
/// * `model` — Fitted covariance model; its normalizer maps observed values
///   to the Gaussian space
/// * `observations` — Observed locations with raw (positive) values
/// * `obs_drift` — Covariates at the observations (k × n)
/// * `targets` — Locations to estimate
/// * `target_drift` — Covariates at the targets (k × m)
/// * `params` — Chunking and snapping
///
/// # Errors
/// - `Configuration` if drift shapes disagree with the point counts, or
///   there are too few observations for the drift
/// - `SingularSystem` if two observations share a location or the system
///   is numerically singular (e.g. a covariate collinear with the intercept)
pub fn external_drift_kriging(
    model: &CovarianceModel,
    observations: &[SamplePoint],
    obs_drift: &DriftMatrix,
    targets: &[GeoPoint],
    target_drift: &DriftMatrix,
    params: &ExternalDriftParams,
) -> Result<KrigingResult> {
    let n = observations.len();
    let m = targets.len();
    let k = obs_drift.nrows();
    let p = k + 1;

    if obs_drift.ncols() != n || target_drift.ncols() != m || target_drift.nrows() != k {
        return Err(Error::Configuration(format!(
            "drift shape mismatch: observations {}x{} for {n} points, targets {}x{} for {m} points",
            obs_drift.nrows(),
            obs_drift.ncols(),
            target_drift.nrows(),
            target_drift.ncols()
        )));
    }
    if n < p + 1 {
        return Err(Error::Configuration(format!(
            "External drift kriging with {k} covariates requires at least {} observations, got {n}",
            p + 1
        )));
    }
    if params.chunk_size == 0 {
        return Err(Error::Configuration("chunk_size must be at least 1".into()));
    }

    let obs_uv: Vec<UnitVector> = observations.iter().map(|o| o.unit_vector()).collect();
    for i in 0..n {
        for j in (i + 1)..n {
            if obs_uv[i].arc_distance(&obs_uv[j]) < params.snap_distance {
                return Err(Error::SingularSystem(format!(
                    "observations {i} and {j} share a location"
                )));
            }
        }
    }

    let y: Vec<f64> = observations.iter().map(|o| model.normalizer.normalize(o.value)).collect();
    let y = DVector::from_vec(y);

    let drift_row = |drift: &DriftMatrix, col: usize, l: usize| -> f64 {
        if l == 0 { 1.0 } else { drift[(l - 1, col)] }
    };

    // Left-hand side
    let size = n + p;
    let mut lhs = DMatrix::<f64>::zeros(size, size);
    for i in 0..n {
        for j in i..n {
            let c = model.covariance_between(&obs_uv[i], &obs_uv[j]);
            lhs[(i, j)] = c;
            lhs[(j, i)] = c;
        }
        for l in 0..p {
            let f = drift_row(obs_drift, i, l);
            lhs[(i, n + l)] = f;
            lhs[(n + l, i)] = f;
        }
    }

    let cov = lhs.view((0, 0), (n, n)).into_owned();
    let f_obs = lhs.view((0, n), (n, p)).into_owned();

    let lu = lhs.lu();
    check_pivots(&lu.u(), "kriging matrix")?;

    let coefficients = gls_coefficients(&cov, &f_obs, &y)?;

    let target_uv: Vec<UnitVector> = targets.iter().map(|t| t.unit_vector()).collect();
    let sill = model.covariance(0.0);

    let chunks: Vec<(usize, &[UnitVector])> = target_uv
        .chunks(params.chunk_size)
        .enumerate()
        .map(|(c, slice)| (c * params.chunk_size, slice))
        .collect();
    debug!(targets = m, observations = n, chunks = chunks.len(), "solving kriging system");

    let solved: Vec<Vec<TargetSolution>> = chunks
        .into_par_iter()
        .map(|(start, slice)| {
            let mut rhs = DMatrix::<f64>::zeros(size, slice.len());
            for (j, t) in slice.iter().enumerate() {
                for i in 0..n {
                    rhs[(i, j)] = model.covariance_between(&obs_uv[i], t);
                }
                for l in 0..p {
                    rhs[(n + l, j)] = drift_row(target_drift, start + j, l);
                }
            }

            let sol = lu
                .solve(&rhs)
                .ok_or_else(|| Error::SingularSystem("LU solve failed".into()))?;

            let out: Vec<TargetSolution> = slice
                .iter()
                .enumerate()
                .map(|(j, t)| {
                    let nearest = nearest_observation(&obs_uv, t, params.snap_distance);
                    if let Some(idx) = nearest {
                        let mut weights = vec![0.0; n];
                        weights[idx] = 1.0;
                        return TargetSolution { estimate: y[idx], variance: 0.0, weights, coincident: Some(idx) };
                    }

                    let (s, r) = (sol.column(j), rhs.column(j));
                    let (w, mu) = (s.rows(0, n), s.rows(n, p));
                    let (c0, f0) = (r.rows(0, n), r.rows(n, p));

                    let estimate = w.dot(&y);
                    let variance = (sill - w.dot(&c0) - mu.dot(&f0)).max(0.0);
                    TargetSolution { estimate, variance, weights: w.iter().copied().collect(), coincident: None }
                })
                .collect();
            Ok(out)
        })
        .collect::<Result<Vec<_>>>()?;

    let solutions: Vec<TargetSolution> = solved.into_iter().flatten().collect();

    let normalizer = model.normalizer;
    let estimate: Vec<f64> = solutions.iter().map(|s| s.estimate).collect();
    let mean = estimate
        .iter()
        .zip(&solutions)
        .map(|(&e, s)| match s.coincident {
            Some(idx) => observations[idx].value,
            None => normalizer.denormalize(e),
        })
        .collect();
    let variance = solutions.iter().map(|s| s.variance).collect();
    let coincident = solutions.iter().map(|s| s.coincident).collect();
    let drift_mean = (0..m)
        .map(|t| {
            let trend: f64 = (0..p).map(|l| coefficients[l] * drift_row(target_drift, t, l)).sum();
            normalizer.denormalize(trend)
        })
        .collect();
    let weights = DMatrix::from_fn(m, n, |i, j| solutions[i].weights[j]);

    Ok(KrigingResult {
        mean,
        variance,
        drift_mean,
        coefficients: coefficients.iter().copied().collect(),
        estimate,
        weights,
        coincident,
        model: model.clone(),
        observations: obs_uv,
        observed: observations.iter().map(|o| o.value).collect(),
        targets: target_uv,
    })
}

struct TargetSolution {
    estimate: f64,
    variance: f64,
    weights: Vec<f64>,
    coincident: Option<usize>,
}

fn nearest_observation(obs: &[UnitVector], target: &UnitVector, snap: f64) -> Option<usize> {
    obs.iter()
        .enumerate()
        .map(|(i, o)| (i, o.arc_distance(target)))
        .filter(|&(_, d)| d < snap)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
}

fn check_pivots(u: &DMatrix<f64>, what: &str) -> Result<()> {
    let diag = u.diagonal();
    let max = diag.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let min = diag.iter().fold(f64::INFINITY, |acc, v| acc.min(v.abs()));
    if !(max.is_finite() && max > 0.0) || min < PIVOT_TOLERANCE * max {
        return Err(Error::SingularSystem(format!(
            "{what}: pivot ratio {:.3e} below {PIVOT_TOLERANCE:e}",
            if max > 0.0 { min / max } else { 0.0 }
        )));
    }
    Ok(())
}

/// Generalized least squares drift β = (FᵀC⁻¹F)⁻¹ FᵀC⁻¹y.
fn gls_coefficients(cov: &DMatrix<f64>, f: &DMatrix<f64>, y: &DVector<f64>) -> Result<DVector<f64>> {
    let singular = || Error::SingularSystem("covariance matrix of the observations".into());
    let cov_lu = cov.clone().lu();
    let ci_f = cov_lu.solve(f).ok_or_else(singular)?;
    let ci_y = cov_lu.solve(y).ok_or_else(singular)?;
    let normal = f.transpose() * &ci_f;
    let normal_lu = normal.lu();
    check_pivots(&normal_lu.u(), "drift normal equations")?;
    normal_lu.solve(&(f.transpose() * ci_y)).ok_or_else(singular)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpolation::{CovarianceFamily, Normalizer};
    use approx::assert_relative_eq;

    fn model() -> CovarianceModel {
        CovarianceModel::new(CovarianceFamily::Exponential, 0.5, 3.0, None, Normalizer::LogNormal)
    }

    /// Observations on a 4×3 grid of 1° steps with a value rising eastwards.
    fn observations() -> (Vec<SamplePoint>, DriftMatrix) {
        let mut pts = Vec::new();
        for r in 0..3 {
            for c in 0..4 {
                let lon = -100.0 + c as f64;
                let lat = 35.0 + r as f64;
                pts.push(SamplePoint::new(lon, lat, (0.2 * c as f64 + 0.1 * (r * c) as f64).exp()));
            }
        }
        let drift = DriftMatrix::from_shape_fn((1, pts.len()), |(_, j)| pts[j].x + 100.0);
        (pts, drift)
    }

    fn targets() -> (Vec<GeoPoint>, DriftMatrix) {
        let t: Vec<GeoPoint> = (0..7).map(|i| GeoPoint::new(-99.75 + 0.4 * i as f64, 35.5 + 0.2 * i as f64)).collect();
        let drift = DriftMatrix::from_shape_fn((1, t.len()), |(_, j)| t[j].x + 100.0);
        (t, drift)
    }

    #[test]
    fn test_estimates_are_finite_and_positive() {
        let (obs, od) = observations();
        let (t, td) = targets();
        let res = external_drift_kriging(&model(), &obs, &od, &t, &td, &ExternalDriftParams::default()).unwrap();
        assert_eq!(res.len(), 7);
        assert_eq!(res.coefficients.len(), 2);
        for i in 0..7 {
            assert!(res.mean[i].is_finite() && res.mean[i] > 0.0);
            assert!(res.drift_mean[i] > 0.0);
            assert!(res.variance[i] >= 0.0);
            assert!(res.variance[i] <= 0.5 + 1e-12);
        }
        assert_eq!(res.weights().shape(), (7, 12));
    }

    #[test]
    fn test_weights_honor_drift_constraints() {
        let (obs, od) = observations();
        let (t, td) = targets();
        let res = external_drift_kriging(&model(), &obs, &od, &t, &td, &ExternalDriftParams::default()).unwrap();
        for i in 0..t.len() {
            let row = res.weights().row(i);
            assert_relative_eq!(row.sum(), 1.0, epsilon = 1e-9);
            let drift: f64 = (0..obs.len()).map(|j| row[j] * od[(0, j)]).sum();
            assert_relative_eq!(drift, td[(0, i)], epsilon = 1e-8);
        }
    }

    #[test]
    fn test_chunk_size_does_not_change_results() {
        let (obs, od) = observations();
        let (t, td) = targets();
        let whole = external_drift_kriging(&model(), &obs, &od, &t, &td, &ExternalDriftParams::default()).unwrap();
        let params = ExternalDriftParams { chunk_size: 2, ..Default::default() };
        let chunked = external_drift_kriging(&model(), &obs, &od, &t, &td, &params).unwrap();
        for i in 0..t.len() {
            assert_relative_eq!(whole.mean[i], chunked.mean[i], max_relative = 1e-12);
            assert_relative_eq!(whole.variance[i], chunked.variance[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_target_on_observation_is_exact() {
        let (obs, od) = observations();
        let t = vec![obs[5].location(), GeoPoint::new(-98.5, 36.5)];
        let td = DriftMatrix::from_shape_fn((1, 2), |(_, j)| t[j].x + 100.0);
        let res = external_drift_kriging(&model(), &obs, &od, &t, &td, &ExternalDriftParams::default()).unwrap();
        assert_eq!(res.coincident(), &[Some(5), None]);
        assert_eq!(res.variance[0], 0.0);
        assert_eq!(res.mean[0], obs[5].value);
        assert_eq!(res.weights()[(0, 5)], 1.0);
        assert!(res.variance[1] > 0.0);
    }

    #[test]
    fn test_duplicate_observation_is_singular() {
        let (mut obs, _) = observations();
        obs[3] = SamplePoint::new(obs[0].x, obs[0].y, 2.0);
        let od = DriftMatrix::from_shape_fn((1, obs.len()), |(_, j)| j as f64);
        let (t, td) = targets();
        let err = external_drift_kriging(&model(), &obs, &od, &t, &td, &ExternalDriftParams::default()).unwrap_err();
        assert!(err.is_singular());
    }

    #[test]
    fn test_collinear_drift_is_singular() {
        let (obs, _) = observations();
        let od = DriftMatrix::from_elem((1, obs.len()), 4.0);
        let (t, _) = targets();
        let td = DriftMatrix::from_elem((1, t.len()), 4.0);
        let err = external_drift_kriging(&model(), &obs, &od, &t, &td, &ExternalDriftParams::default()).unwrap_err();
        assert!(err.is_singular());
    }

    #[test]
    fn test_drift_shape_mismatch() {
        let (obs, od) = observations();
        let (t, _) = targets();
        let td = DriftMatrix::zeros((2, t.len()));
        let err = external_drift_kriging(&model(), &obs, &od, &t, &td, &ExternalDriftParams::default()).unwrap_err();
        assert!(err.is_configuration());
    }
}
