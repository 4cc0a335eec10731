//! Uncertainty pipeline
//!
//! Orchestrates one batch run over a spatial table:
//! 1. Extract observations and targets (centroids, drift covariates)
//! 2. Fit the normalizer on the observed values
//! 3. Estimate the empirical variogram
//! 4. Fit the covariance model and hand it to the plotter
//! 5. Krige every unit with external drift
//! 6. Draw `iterations` conditional realizations from a seed sequence
//! 7. Assemble the realization matrix
//!
//! Any failure aborts the run; nothing is returned or written on error.

pub mod backend;
pub mod extract;
pub mod output;
pub mod plot;

pub use backend::{GeostatBackend, NativeBackend, Prediction};
pub use extract::{extract, DriftColumns, ObservationSet, TargetSet};
pub use output::UncertaintyOutput;
pub use plot::{NoPlot, TracingPlot, VariogramPlotter};

use geokrig_core::{Error, Result, SpatialTable};
use ndarray::Array2;
use tracing::{debug, info};

use crate::interpolation::{
    CovarianceFamily, ExternalDriftParams, FitParams, Normalizer, NormalizerKind, SeedSequence,
    SimulationParams, VariogramParams,
};

/// Master seed used when none is given
pub const DEFAULT_MASTER_SEED: u64 = 20170519;

/// Column the kriging mean is written to by default
pub const DEFAULT_MEAN_COLUMN: &str = "cond_krig";

/// Parameters for one uncertainty run
#[derive(Debug, Clone)]
pub struct UncertaintyParams {
    /// Column to interpolate; must have both observed and missing cells
    pub target_column: String,
    pub drift_columns: DriftColumns,
    /// Number of conditional realizations (≥ 1)
    pub iterations: usize,
    pub family: CovarianceFamily,
    pub normalizer: NormalizerKind,
    pub master_seed: u64,
    /// Table column receiving the kriging mean
    pub mean_column: String,
    pub variogram: VariogramParams,
    pub fit: FitParams,
    pub kriging: ExternalDriftParams,
    pub simulation: SimulationParams,
}

impl UncertaintyParams {
    pub fn new(target_column: impl Into<String>, drift_columns: DriftColumns) -> Self {
        Self {
            target_column: target_column.into(),
            drift_columns,
            iterations: 1,
            family: CovarianceFamily::Exponential,
            normalizer: NormalizerKind::LogNormal,
            master_seed: DEFAULT_MASTER_SEED,
            mean_column: DEFAULT_MEAN_COLUMN.to_string(),
            variogram: VariogramParams::default(),
            fit: FitParams::default(),
            kriging: ExternalDriftParams::default(),
            simulation: SimulationParams::default(),
        }
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_family(mut self, family: CovarianceFamily) -> Self {
        self.family = family;
        self
    }

    pub fn with_seed(mut self, master_seed: u64) -> Self {
        self.master_seed = master_seed;
        self
    }

    /// Backend configured from these parameters
    pub fn backend(&self) -> NativeBackend {
        NativeBackend {
            variogram: self.variogram.clone(),
            fit: self.fit.clone(),
            kriging: self.kriging.clone(),
            simulation: self.simulation.clone(),
        }
    }
}

/// Check a realization count coming from a signed source.
///
/// # Errors
/// `Configuration` if `iterations < 1`.
pub fn validate_iterations(iterations: i64) -> Result<usize> {
    if iterations < 1 {
        return Err(Error::Configuration(format!(
            "iterations must be at least 1, got {iterations}"
        )));
    }
    usize::try_from(iterations)
        .map_err(|_| Error::Configuration(format!("iterations {iterations} out of range")))
}

/// Run the pipeline with the native backend, write the kriging mean onto
/// `table` as `params.mean_column` and return the realization matrix
/// (iterations × units).
///
/// On error the table is left untouched.
pub fn compute_uncertainty_fields(table: &mut SpatialTable, params: &UncertaintyParams) -> Result<Array2<f64>> {
    let output = run_uncertainty_pipeline(table, params, &params.backend(), &TracingPlot)?;
    output.attach_mean(table, &params.mean_column)?;
    Ok(output.fields)
}

/// Run the pipeline without modifying `table`.
pub fn run_uncertainty_pipeline<B, P>(
    table: &SpatialTable,
    params: &UncertaintyParams,
    backend: &B,
    plotter: &P,
) -> Result<UncertaintyOutput>
where
    B: GeostatBackend,
    P: VariogramPlotter + ?Sized,
{
    if params.iterations < 1 {
        return Err(Error::Configuration("iterations must be at least 1, got 0".into()));
    }

    let (observations, targets) = extract(table, &params.target_column, &params.drift_columns)?;
    debug!(
        observed = observations.len(),
        targets = targets.len(),
        drifts = observations.drift.nrows(),
        "extracted observations"
    );

    let normalizer = Normalizer::fit(params.normalizer, &observations.values())?;

    let variogram = backend.estimate_variogram(&observations, &normalizer)?;
    info!(bins = variogram.bin_count(), "estimated bin count");
    info!(max_bin_distance = variogram.max_bin_distance(), "maximal bin distance");

    let model = backend.fit(params.family, &variogram, normalizer)?;
    info!(%model, "fitted covariance model");
    plotter.plot(&variogram, &model);

    let prediction = backend.predict(&model, &observations, &targets)?;

    let seeds = SeedSequence::new(params.master_seed).seeds(params.iterations);
    let mut fields = backend.simulate(&prediction, &seeds)?;
    if fields.dim() != (params.iterations, targets.len()) {
        return Err(Error::Configuration(format!(
            "backend returned a {:?} realization matrix, expected {:?}",
            fields.dim(),
            (params.iterations, targets.len())
        )));
    }

    // Observed units carry their data in every realization and in the mean
    let mut mean = prediction.mean().to_vec();
    for (point, &row) in observations.points.iter().zip(&observations.rows) {
        fields.column_mut(row).fill(point.value);
        if let Some(m) = mean.get_mut(row) {
            *m = point.value;
        }
    }
    debug!(iterations = params.iterations, units = targets.len(), "assembled realizations");

    Ok(UncertaintyOutput {
        fields,
        mean,
        variance: prediction.variance().to_vec(),
        drift_mean: prediction.drift_mean().to_vec(),
        model,
        variogram,
        seeds,
        observed_rows: observations.rows,
    })
}
