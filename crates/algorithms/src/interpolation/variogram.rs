//! Empirical variogram estimation on the sphere
//!
//! Computes the empirical (experimental) semivariogram from scattered
//! lon/lat samples, using great-circle distances and no grid connectivity.
//! Values are normalized before any pair is formed.
//!
//! Two estimators are available. Cressie's robust estimator is the default:
//! ```text
//! γ(h) = ½ · [ (1/N(h)) Σ |z(xᵢ) - z(xⱼ)|^½ ]⁴ / (0.457 + 0.494/N(h) + 0.045/N(h)²)
//! ```
//! and Matheron's classical estimator:
//! ```text
//! γ(h) = (1/2N(h)) Σ [z(xᵢ) - z(xⱼ)]²
//! ```
//! Cressie's form damps the influence of single extreme pairs, which matter
//! for rates computed over very small populations.
//!
//! Reference:
//! Matheron, G. (1963). Principles of geostatistics. Economic Geology.
//! Cressie, N. & Hawkins, D.M. (1980). Robust estimation of the variogram.
//! Mathematical Geology.

use geokrig_core::geodesy::chord_to_arc;
use geokrig_core::{Error, Result, UnitVector};

use super::normalizer::Normalizer;
use super::SamplePoint;

/// Empirical variogram: semivariance values at discrete lag distances.
///
/// Only non-empty bins are kept, so `lags` is strictly increasing.
#[derive(Debug, Clone, PartialEq)]
pub struct EmpiricalVariogram {
    /// Lag distances (bin centers), degrees of arc
    pub lags: Vec<f64>,
    /// Semivariance values γ(h) at each lag, in the normalized space
    pub semivariance: Vec<f64>,
    /// Number of point pairs contributing to each lag bin
    pub pair_counts: Vec<usize>,
}

impl EmpiricalVariogram {
    pub fn bin_count(&self) -> usize {
        self.lags.len()
    }

    /// Largest bin center, degrees of arc
    pub fn max_bin_distance(&self) -> f64 {
        self.lags.last().copied().unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.lags.is_empty()
    }
}

/// Dispersion estimator for each distance bin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Estimator {
    /// Classical mean of squared differences
    Matheron,
    /// Fourth power of the mean square-root absolute difference
    #[default]
    Cressie,
}

/// Parameters for empirical variogram computation
#[derive(Debug, Clone, Default)]
pub struct VariogramParams {
    pub estimator: Estimator,
    /// Number of distance bins. If None, ceil(2·log2(n) + 1) for n points.
    pub bin_count: Option<usize>,
    /// Maximum binned distance in degrees. If None, one third of the
    /// great-circle diameter of the points' bounding box.
    pub max_distance: Option<f64>,
}

/// Compute the empirical variogram from sample points.
///
/// # Arguments
/// * `points` — Observations with raw (untransformed) values
/// * `normalizer` — Transform applied to the values before pairing
/// * `params` — Estimator and binning
///
/// # Errors
/// `Configuration` if fewer than 2 points are given, the maximum distance
/// is not positive, or no pair falls within it.
pub fn empirical_variogram(
    points: &[SamplePoint],
    normalizer: &Normalizer,
    params: &VariogramParams,
) -> Result<EmpiricalVariogram> {
    let n = points.len();
    if n < 2 {
        return Err(Error::Configuration("Need at least 2 observations for a variogram".into()));
    }

    let positions: Vec<UnitVector> = points.iter().map(|p| p.unit_vector()).collect();
    let values: Vec<f64> = points.iter().map(|p| normalizer.normalize(p.value)).collect();

    let bin_count = params.bin_count.unwrap_or_else(|| sturges_bins(n)).max(1);
    let max_dist = params.max_distance.unwrap_or_else(|| bounding_diameter(&positions) / 3.0);
    if !(max_dist > 0.0 && max_dist.is_finite()) {
        return Err(Error::Configuration(format!(
            "Maximum variogram distance must be positive, got {max_dist}"
        )));
    }

    let width = max_dist / bin_count as f64;
    let mut sums = vec![0.0_f64; bin_count];
    let mut counts = vec![0_usize; bin_count];

    for i in 0..n {
        for j in (i + 1)..n {
            let d = positions[i].arc_distance(&positions[j]);
            if d >= max_dist {
                continue;
            }
            let bin = ((d / width) as usize).min(bin_count - 1);
            let dz = (values[i] - values[j]).abs();
            sums[bin] += match params.estimator {
                Estimator::Matheron => dz * dz,
                Estimator::Cressie => dz.sqrt(),
            };
            counts[bin] += 1;
        }
    }

    let mut lags = Vec::with_capacity(bin_count);
    let mut semivariance = Vec::with_capacity(bin_count);
    let mut pair_counts = Vec::with_capacity(bin_count);

    for k in 0..bin_count {
        let cnt = counts[k];
        if cnt == 0 {
            continue;
        }
        let nk = cnt as f64;
        let gamma = match params.estimator {
            Estimator::Matheron => sums[k] / (2.0 * nk),
            Estimator::Cressie => {
                let m = sums[k] / nk;
                0.5 * m.powi(4) / (0.457 + 0.494 / nk + 0.045 / (nk * nk))
            }
        };
        lags.push((k as f64 + 0.5) * width);
        semivariance.push(gamma);
        pair_counts.push(cnt);
    }

    if lags.is_empty() {
        return Err(Error::Configuration(format!(
            "No observation pairs closer than {max_dist:.4}°"
        )));
    }

    Ok(EmpiricalVariogram {
        lags,
        semivariance,
        pair_counts,
    })
}

/// Default bin count for n points.
pub fn sturges_bins(n: usize) -> usize {
    (2.0 * (n.max(1) as f64).log2() + 1.0).ceil() as usize
}

/// Great-circle diameter (degrees) of the 3-D bounding box of unit vectors.
fn bounding_diameter(positions: &[UnitVector]) -> f64 {
    let mut lo = [f64::INFINITY; 3];
    let mut hi = [f64::NEG_INFINITY; 3];
    for p in positions {
        for (axis, v) in [p.x, p.y, p.z].into_iter().enumerate() {
            lo[axis] = lo[axis].min(v);
            hi[axis] = hi[axis].max(v);
        }
    }
    let diag = (0..3).map(|a| (hi[a] - lo[a]).powi(2)).sum::<f64>().sqrt();
    chord_to_arc(diag.min(2.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generate_spatially_correlated(n: usize, range: f64, seed: u64) -> Vec<SamplePoint> {
        // Points over a 10° × 10° patch with a smooth positive field
        let mut points = Vec::with_capacity(n);
        let mut rng = seed;

        for _ in 0..n {
            rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let x = -100.0 + (rng >> 33) as f64 / (1u64 << 31) as f64 * 10.0;
            rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let y = 30.0 + (rng >> 33) as f64 / (1u64 << 31) as f64 * 10.0;
            let log_value = 0.05 * (x + 100.0) + 0.5 * ((x / range).sin() + (y / range).sin());
            rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let noise = (rng >> 33) as f64 / (1u64 << 31) as f64 * 0.1 - 0.05;
            points.push(SamplePoint::new(x, y, (log_value + noise).exp()));
        }

        points
    }

    #[test]
    fn test_empirical_variogram_basic() {
        let points = generate_spatially_correlated(100, 2.0, 42);
        let result =
            empirical_variogram(&points, &Normalizer::LogNormal, &VariogramParams::default()).unwrap();

        // ceil(2·log2(100) + 1) = 15 bins, all populated at this density
        assert_eq!(result.bin_count(), 15);
        assert_eq!(result.semivariance.len(), 15);
        assert_eq!(result.pair_counts.len(), 15);
        assert!(result.pair_counts.iter().all(|&c| c > 0));

        let first = result.semivariance[0];
        let last = *result.semivariance.last().unwrap();
        assert!(first < last, "Semivariance should increase: first={first:.4}, last={last:.4}");
    }

    #[test]
    fn test_lags_strictly_increasing() {
        let points = generate_spatially_correlated(30, 2.0, 7);
        let result = empirical_variogram(
            &points,
            &Normalizer::LogNormal,
            &VariogramParams { bin_count: Some(40), ..Default::default() },
        )
        .unwrap();
        assert!(result.lags.windows(2).all(|w| w[0] < w[1]));
        assert!(result.max_bin_distance() > 0.0);
    }

    #[test]
    fn test_empirical_variogram_too_few() {
        let points = vec![SamplePoint::new(0.0, 0.0, 1.0)];
        let err = empirical_variogram(&points, &Normalizer::LogNormal, &VariogramParams::default())
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_constant_field_has_zero_semivariance() {
        let points: Vec<SamplePoint> =
            (0..12).map(|i| SamplePoint::new(i as f64 * 0.5, (i % 3) as f64, 4.0)).collect();
        for estimator in [Estimator::Cressie, Estimator::Matheron] {
            let params = VariogramParams { estimator, ..Default::default() };
            let result = empirical_variogram(&points, &Normalizer::LogNormal, &params).unwrap();
            assert!(result.semivariance.iter().all(|&g| g == 0.0));
        }
    }

    #[test]
    fn test_matheron_two_points() {
        // One pair: γ = ½ (ln e² − ln e)² = ½
        let e = std::f64::consts::E;
        let points = vec![SamplePoint::new(0.0, 0.0, e), SamplePoint::new(1.0, 0.0, e * e)];
        let params = VariogramParams {
            estimator: Estimator::Matheron,
            bin_count: Some(1),
            max_distance: Some(2.0),
        };
        let result = empirical_variogram(&points, &Normalizer::LogNormal, &params).unwrap();
        assert_eq!(result.pair_counts, vec![1]);
        assert!((result.semivariance[0] - 0.5).abs() < 1e-12);
        assert!((result.lags[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cressie_resists_outlier() {
        let mut points = generate_spatially_correlated(60, 2.0, 99);
        let clean_params = VariogramParams { estimator: Estimator::Matheron, ..Default::default() };
        let robust_params = VariogramParams::default();

        let clean_m = empirical_variogram(&points, &Normalizer::LogNormal, &clean_params).unwrap();
        let clean_c = empirical_variogram(&points, &Normalizer::LogNormal, &robust_params).unwrap();
        points[0].value *= 1e4;
        let dirty_m = empirical_variogram(&points, &Normalizer::LogNormal, &clean_params).unwrap();
        let dirty_c = empirical_variogram(&points, &Normalizer::LogNormal, &robust_params).unwrap();

        let shift = |a: &EmpiricalVariogram, b: &EmpiricalVariogram| -> f64 {
            a.semivariance.iter().zip(&b.semivariance).map(|(x, y)| (y / x).ln().abs()).sum()
        };
        assert!(shift(&clean_c, &dirty_c) < shift(&clean_m, &dirty_m));
    }

    #[test]
    fn test_sturges() {
        assert_eq!(sturges_bins(10), 8);
        assert_eq!(sturges_bins(100), 15);
    }
}
