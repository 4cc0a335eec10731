//! # geokrig algorithms
//!
//! Geostatistical estimation for sparsely observed areal variables.
//!
//! ## Modules
//!
//! - **interpolation**: normalizers, robust empirical variogram, geodesic
//!   covariance catalog and fitting, external drift kriging, conditional
//!   simulation
//! - **pipeline**: table extraction, the backend seam and the end-to-end
//!   uncertainty run

pub mod interpolation;
mod maybe_rayon;
pub mod pipeline;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::interpolation::{
        empirical_variogram, external_drift_kriging, fit_covariance, ConditionalSimulator,
        CovarianceFamily, CovarianceModel, EmpiricalVariogram, ExternalDriftParams, FitParams,
        KrigingResult, Normalizer, NormalizerKind, SamplePoint, SeedSequence, SimulationParams,
        VariogramParams,
    };
    pub use crate::pipeline::{
        compute_uncertainty_fields, run_uncertainty_pipeline, validate_iterations, DriftColumns,
        GeostatBackend, NativeBackend, UncertaintyOutput, UncertaintyParams,
    };
    pub use geokrig_core::prelude::*;
}
