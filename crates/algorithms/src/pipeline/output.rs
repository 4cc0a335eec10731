//! Pipeline output and table augmentation

use geokrig_core::{Result, SpatialTable};
use ndarray::Array2;

use crate::interpolation::{CovarianceModel, EmpiricalVariogram};

/// Everything one pipeline run produces. Building it never touches the
/// input table; [`UncertaintyOutput::attach_mean`] is the only mutation.
#[derive(Debug, Clone)]
pub struct UncertaintyOutput {
    /// Realizations × units, units in table row order
    pub fields: Array2<f64>,
    /// Kriging mean per unit
    pub mean: Vec<f64>,
    /// Kriging variance per unit (normalized space)
    pub variance: Vec<f64>,
    /// Drift-only mean per unit
    pub drift_mean: Vec<f64>,
    pub model: CovarianceModel,
    pub variogram: EmpiricalVariogram,
    /// Sub-seed of each realization, in row order
    pub seeds: Vec<u64>,
    /// Table rows that carried an observation
    pub observed_rows: Vec<usize>,
}

impl UncertaintyOutput {
    pub fn iterations(&self) -> usize {
        self.fields.nrows()
    }

    pub fn units(&self) -> usize {
        self.fields.ncols()
    }

    /// Write the kriging mean onto `table` as `column`.
    pub fn attach_mean(&self, table: &mut SpatialTable, column: &str) -> Result<()> {
        table.add_column(column, &self.mean)
    }
}
