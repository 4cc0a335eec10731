//! Variogram diagnostic plots

use tracing::debug;

use crate::interpolation::{CovarianceModel, EmpiricalVariogram};

/// Number of samples on the theoretical curve
pub const CURVE_SAMPLES: usize = 64;

/// Receives the empirical variogram and the fitted model once per run.
pub trait VariogramPlotter {
    fn plot(&self, empirical: &EmpiricalVariogram, model: &CovarianceModel);
}

/// Headless: draws nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPlot;

impl VariogramPlotter for NoPlot {
    fn plot(&self, _empirical: &EmpiricalVariogram, _model: &CovarianceModel) {}
}

/// Logs both curves as `debug` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingPlot;

impl VariogramPlotter for TracingPlot {
    fn plot(&self, empirical: &EmpiricalVariogram, model: &CovarianceModel) {
        for ((lag, gamma), pairs) in empirical.lags.iter().zip(&empirical.semivariance).zip(&empirical.pair_counts) {
            debug!(lag, gamma, pairs, "empirical variogram");
        }
        let max = empirical.lags.last().copied().unwrap_or(0.0) * 1.2;
        for (lag, gamma) in model.curve(max, CURVE_SAMPLES) {
            debug!(lag, gamma, "fitted variogram");
        }
    }
}
