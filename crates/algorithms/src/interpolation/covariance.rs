//! Geodesic covariance models
//!
//! Every family in the catalog is a valid isotropic covariance in three
//! dimensions. Restricting it to the unit sphere through the chordal
//! distance gives a valid covariance in the great-circle angle θ (Yadrenko
//! construction):
//! ```text
//! C(θ) = σ² · ρ(2·sin(θ/2) / ℓ)        (lengths in degrees)
//! γ(θ) = σ² − C(θ)                      (nugget is always 0)
//! ```
//! with correlation functions ρ(r), r = chord / ℓ:
//! - Gaussian:    exp(−r²)
//! - Exponential: exp(−r)
//! - Matérn(ν):   2^{1−ν}/Γ(ν) · (√(2ν)·r)^ν · K_ν(√(2ν)·r)
//! - Stable(α):   exp(−r^α), 0 < α ≤ 2
//! - Rational(α): (1 + r²/α)^{−α}
//! - Spherical:   1 − 1.5r + 0.5r³ for r < 1, else 0
//! - Cubic:       1 − 7r² + 35/4·r³ − 7/2·r⁵ + 3/4·r⁷ for r < 1, else 0
//!
//! Reference:
//! Yadrenko, M.I. (1983). Spectral Theory of Random Fields.
//! Gneiting, T. (2013). Strictly and non-strictly positive definite
//! functions on spheres. Bernoulli.

use std::fmt;
use std::str::FromStr;

use geokrig_core::geodesy::arc_to_chordal_degrees;
use geokrig_core::{Error, UnitVector};
use serde::Serialize;
use statrs::function::gamma::ln_gamma;

use super::normalizer::Normalizer;
use super::special::bessel_k;

/// Covariance model family selectable by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CovarianceFamily {
    Gaussian,
    Exponential,
    Matern,
    Stable,
    Rational,
    Spherical,
    Cubic,
}

impl CovarianceFamily {
    pub const ALL: [CovarianceFamily; 7] = [
        CovarianceFamily::Gaussian,
        CovarianceFamily::Exponential,
        CovarianceFamily::Matern,
        CovarianceFamily::Stable,
        CovarianceFamily::Rational,
        CovarianceFamily::Spherical,
        CovarianceFamily::Cubic,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CovarianceFamily::Gaussian => "gaussian",
            CovarianceFamily::Exponential => "exponential",
            CovarianceFamily::Matern => "matern",
            CovarianceFamily::Stable => "stable",
            CovarianceFamily::Rational => "rational",
            CovarianceFamily::Spherical => "spherical",
            CovarianceFamily::Cubic => "cubic",
        }
    }

    /// Bounds of the shape parameter, if the family has one
    pub fn shape_bounds(&self) -> Option<(f64, f64)> {
        match self {
            CovarianceFamily::Matern => Some((0.2, 30.0)),
            CovarianceFamily::Stable => Some((0.1, 2.0)),
            CovarianceFamily::Rational => Some((0.1, 50.0)),
            _ => None,
        }
    }

    /// Starting shape value for fitting
    pub fn default_shape(&self) -> Option<f64> {
        match self {
            CovarianceFamily::Matern => Some(1.0),
            CovarianceFamily::Stable => Some(1.5),
            CovarianceFamily::Rational => Some(1.0),
            _ => None,
        }
    }

    /// Correlation at scaled distance r = h/ℓ ≥ 0.
    pub fn correlation(&self, r: f64, shape: Option<f64>) -> f64 {
        if r <= 0.0 {
            return 1.0;
        }
        let s = shape.or_else(|| self.default_shape()).unwrap_or(1.0);
        match self {
            CovarianceFamily::Gaussian => (-r * r).exp(),
            CovarianceFamily::Exponential => (-r).exp(),
            CovarianceFamily::Matern => matern_correlation(r, s),
            CovarianceFamily::Stable => (-r.powf(s)).exp(),
            CovarianceFamily::Rational => (1.0 + r * r / s).powf(-s),
            CovarianceFamily::Spherical => {
                if r >= 1.0 {
                    0.0
                } else {
                    1.0 - 1.5 * r + 0.5 * r * r * r
                }
            }
            CovarianceFamily::Cubic => {
                if r >= 1.0 {
                    0.0
                } else {
                    let r2 = r * r;
                    let r3 = r2 * r;
                    let r5 = r3 * r2;
                    1.0 - 7.0 * r2 + 8.75 * r3 - 3.5 * r5 + 0.75 * r5 * r2
                }
            }
        }
    }
}

fn matern_correlation(r: f64, nu: f64) -> f64 {
    let x = (2.0 * nu).sqrt() * r;
    if x < 1e-10 {
        return 1.0;
    }
    let ln_k = bessel_k(nu, x).ln();
    if !ln_k.is_finite() {
        // K overflows only as x → 0 and underflows only as x → ∞
        return if ln_k > 0.0 { 1.0 } else { 0.0 };
    }
    let ln_rho = (1.0 - nu) * std::f64::consts::LN_2 - ln_gamma(nu) + nu * x.ln() + ln_k;
    ln_rho.exp().clamp(0.0, 1.0)
}

impl fmt::Display for CovarianceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CovarianceFamily {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        CovarianceFamily::ALL
            .into_iter()
            .find(|f| f.name() == lower)
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "unknown covariance family '{s}', expected one of: {}",
                    CovarianceFamily::ALL.map(|f| f.name()).join(", ")
                ))
            })
    }
}

/// Fitted geodesic covariance model with its normalizing transform.
///
/// The nugget is not a free parameter: [`CovarianceModel::nugget`] is
/// always 0.
#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceModel {
    pub family: CovarianceFamily,
    /// Sill σ² in the normalized space
    pub variance: f64,
    /// Length scale ℓ, degrees
    pub range: f64,
    /// Family-specific shape (ν, α), `None` for shapeless families
    pub shape: Option<f64>,
    /// Transform fitted to the observed target values
    pub normalizer: Normalizer,
    /// Robust loss at the optimum
    pub loss: f64,
}

impl CovarianceModel {
    pub fn new(
        family: CovarianceFamily,
        variance: f64,
        range: f64,
        shape: Option<f64>,
        normalizer: Normalizer,
    ) -> Self {
        Self {
            family,
            variance,
            range,
            shape: shape.or_else(|| family.default_shape()),
            normalizer,
            loss: 0.0,
        }
    }

    /// Nugget effect. Fixed at zero: areal aggregates carry no pure
    /// measurement-error discontinuity at the origin.
    pub fn nugget(&self) -> f64 {
        0.0
    }

    /// Covariance at great-circle angle `arc` (degrees).
    #[inline]
    pub fn covariance(&self, arc: f64) -> f64 {
        let chord = arc_to_chordal_degrees(arc);
        self.variance * self.family.correlation(chord / self.range, self.shape)
    }

    /// Covariance between two points on the unit sphere.
    #[inline]
    pub fn covariance_between(&self, a: &UnitVector, b: &UnitVector) -> f64 {
        // chord · (180/π) is the chordal distance in degree units
        let chord = a.chord(b).to_degrees();
        self.variance * self.family.correlation(chord / self.range, self.shape)
    }

    /// Yadrenko semivariance at great-circle angle `arc` (degrees).
    pub fn variogram(&self, arc: f64) -> f64 {
        if arc <= 0.0 {
            return 0.0;
        }
        self.nugget() + self.variance - self.covariance(arc)
    }

    /// Evenly spaced (distance, γ) samples up to `max_distance`.
    pub fn curve(&self, max_distance: f64, samples: usize) -> Vec<(f64, f64)> {
        let samples = samples.max(2);
        (0..samples)
            .map(|i| {
                let h = max_distance * i as f64 / (samples - 1) as f64;
                (h, self.variogram(h))
            })
            .collect()
    }
}

impl fmt::Display for CovarianceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}(latlon=true, var={:.6}, len_scale={:.6}°, nugget={:.1}",
            self.family,
            self.variance,
            self.range,
            self.nugget()
        )?;
        if let Some(s) = self.shape {
            write!(f, ", shape={s:.4}")?;
        }
        write!(f, ", normalizer={})", self.normalizer.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn model(family: CovarianceFamily) -> CovarianceModel {
        CovarianceModel::new(family, 2.0, 5.0, None, Normalizer::LogNormal)
    }

    #[test]
    fn test_correlation_at_origin_is_one() {
        for family in CovarianceFamily::ALL {
            assert_eq!(family.correlation(0.0, None), 1.0, "{family}");
            let m = model(family);
            assert_eq!(m.variogram(0.0), 0.0);
            assert_relative_eq!(m.covariance(0.0), 2.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_correlation_decreasing() {
        for family in CovarianceFamily::ALL {
            let mut prev = 1.0;
            for i in 1..60 {
                let rho = family.correlation(i as f64 * 0.05, None);
                assert!(rho <= prev + 1e-12, "{family} not monotone at step {i}");
                assert!((0.0..=1.0).contains(&rho));
                prev = rho;
            }
        }
    }

    #[test]
    fn test_matern_half_is_exponential() {
        // ν = ½: ρ(r) = exp(−r)
        for r in [0.01, 0.3, 1.0, 2.5, 6.0] {
            let m = CovarianceFamily::Matern.correlation(r, Some(0.5));
            assert_relative_eq!(m, (-r).exp(), max_relative = 1e-9);
        }
    }

    #[test]
    fn test_matern_large_nu_approaches_gaussian() {
        // ν → ∞: ρ(r) → exp(−r²/2)
        let r: f64 = 0.8;
        let m = CovarianceFamily::Matern.correlation(r, Some(30.0));
        assert!((m - (-0.5 * r * r).exp()).abs() < 0.01, "got {m}");
    }

    #[test]
    fn test_compact_support() {
        assert_eq!(CovarianceFamily::Spherical.correlation(1.0, None), 0.0);
        assert_eq!(CovarianceFamily::Cubic.correlation(1.5, None), 0.0);
        assert_relative_eq!(CovarianceFamily::Cubic.correlation(0.999_999, None), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_variogram_reaches_sill() {
        let m = model(CovarianceFamily::Exponential);
        assert_relative_eq!(m.variogram(170.0), 2.0 - m.covariance(170.0), epsilon = 1e-12);
        assert!(m.variogram(170.0) > 1.9);
        assert_eq!(m.nugget(), 0.0);
    }

    #[test]
    fn test_covariance_between_matches_arc_form() {
        let m = model(CovarianceFamily::Gaussian);
        let a = UnitVector::from_lonlat(-95.0, 38.0);
        let b = UnitVector::from_lonlat(-91.0, 36.5);
        let arc = a.arc_distance(&b);
        assert_relative_eq!(m.covariance_between(&a, &b), m.covariance(arc), max_relative = 1e-10);
    }

    #[test]
    fn test_family_from_str() {
        assert_eq!("Matern".parse::<CovarianceFamily>().unwrap(), CovarianceFamily::Matern);
        assert!("linear".parse::<CovarianceFamily>().unwrap_err().is_configuration());
    }
}
