//! Geostatistical numerics behind the pipeline
//!
//! [`GeostatBackend`] is the seam between orchestration and numerics.
//! [`NativeBackend`] implements it with this crate's estimators.

use geokrig_core::Result;
use ndarray::Array2;

use crate::interpolation::{
    empirical_variogram, external_drift_kriging, fit_covariance, ConditionalSimulator, CovarianceFamily,
    CovarianceModel, EmpiricalVariogram, ExternalDriftParams, FitParams, KrigingResult, Normalizer,
    SimulationParams, VariogramParams,
};

use super::extract::{ObservationSet, TargetSet};

/// Per-target kriging output consumed by the pipeline.
pub trait Prediction {
    /// Kriging mean in data units, one per target
    fn mean(&self) -> &[f64];
    /// Kriging variance in the normalized space
    fn variance(&self) -> &[f64];
    /// Drift-only mean in data units
    fn drift_mean(&self) -> &[f64];
}

impl Prediction for KrigingResult {
    fn mean(&self) -> &[f64] {
        &self.mean
    }

    fn variance(&self) -> &[f64] {
        &self.variance
    }

    fn drift_mean(&self) -> &[f64] {
        &self.drift_mean
    }
}

/// Variogram estimation, model fitting, kriging and conditional simulation.
pub trait GeostatBackend {
    type Prediction: Prediction;

    fn estimate_variogram(&self, observations: &ObservationSet, normalizer: &Normalizer)
        -> Result<EmpiricalVariogram>;

    fn fit(
        &self,
        family: CovarianceFamily,
        variogram: &EmpiricalVariogram,
        normalizer: Normalizer,
    ) -> Result<CovarianceModel>;

    fn predict(
        &self,
        model: &CovarianceModel,
        observations: &ObservationSet,
        targets: &TargetSet,
    ) -> Result<Self::Prediction>;

    /// One row per seed, one column per target, in seed order.
    fn simulate(&self, prediction: &Self::Prediction, seeds: &[u64]) -> Result<Array2<f64>>;
}

/// Backend built on this crate's variogram, fitting, kriging and
/// simulation routines.
#[derive(Debug, Clone, Default)]
pub struct NativeBackend {
    pub variogram: VariogramParams,
    pub fit: FitParams,
    pub kriging: ExternalDriftParams,
    pub simulation: SimulationParams,
}

impl GeostatBackend for NativeBackend {
    type Prediction = KrigingResult;

    fn estimate_variogram(&self, observations: &ObservationSet, normalizer: &Normalizer)
        -> Result<EmpiricalVariogram> {
        empirical_variogram(&observations.points, normalizer, &self.variogram)
    }

    fn fit(
        &self,
        family: CovarianceFamily,
        variogram: &EmpiricalVariogram,
        normalizer: Normalizer,
    ) -> Result<CovarianceModel> {
        fit_covariance(variogram, family, normalizer, &self.fit)
    }

    fn predict(
        &self,
        model: &CovarianceModel,
        observations: &ObservationSet,
        targets: &TargetSet,
    ) -> Result<KrigingResult> {
        external_drift_kriging(
            model,
            &observations.points,
            &observations.drift,
            &targets.locations,
            &targets.drift,
            &self.kriging,
        )
    }

    fn simulate(&self, prediction: &KrigingResult, seeds: &[u64]) -> Result<Array2<f64>> {
        ConditionalSimulator::new(prediction, &self.simulation)?.ensemble(seeds)
    }
}
