//! Geostatistical interpolation on the sphere
//!
//! Interpolate a sparsely observed variable over scattered locations given
//! in longitude/latitude degrees:
//! - Normalizer: log-normal / Box-Cox transform to a near-Gaussian space
//! - Variogram: robust empirical semivariogram over great-circle distances
//! - Covariance: geodesic (Yadrenko) covariance catalog and robust fitting
//! - External Drift Kriging: BLUE with covariates known at every location
//! - Simulation: conditional Gaussian realizations honoring the data

pub mod covariance;
pub mod external_drift;
pub mod fit;
pub mod normalizer;
pub mod simulation;
mod special;
pub mod variogram;

pub use covariance::{CovarianceFamily, CovarianceModel};
pub use external_drift::{external_drift_kriging, ExternalDriftParams, KrigingResult};
pub use fit::{fit_covariance, FitParams, Loss};
pub use normalizer::{Normalizer, NormalizerKind};
pub use simulation::{ConditionalField, ConditionalSimulator, SeedSequence, SimulationParams};
pub use variogram::{empirical_variogram, EmpiricalVariogram, Estimator, VariogramParams};

use geokrig_core::{GeoPoint, UnitVector};

/// A sample point with lon/lat coordinates (degrees) and a value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplePoint {
    pub x: f64,
    pub y: f64,
    pub value: f64,
}

impl SamplePoint {
    pub fn new(x: f64, y: f64, value: f64) -> Self {
        Self { x, y, value }
    }

    #[inline]
    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.x, self.y)
    }

    #[inline]
    pub fn unit_vector(&self) -> UnitVector {
        UnitVector::from_lonlat(self.x, self.y)
    }

    /// Great-circle distance to another location, in degrees
    #[inline]
    pub fn arc_distance(&self, other_x: f64, other_y: f64) -> f64 {
        self.location().arc_distance(&GeoPoint::new(other_x, other_y))
    }
}

/// Drift covariates for a set of locations: one row per covariate
/// (`drift_1` first, then `drift_2`), one column per location.
pub type DriftMatrix = ndarray::Array2<f64>;
