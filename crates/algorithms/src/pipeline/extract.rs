//! Observation and target sets extracted from a spatial table

use geokrig_core::{Error, GeoPoint, Result, SpatialTable};

use crate::interpolation::{DriftMatrix, SamplePoint};

/// Names of the drift covariate columns. `first` becomes drift row 0 and
/// `second` drift row 1 for both observations and targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftColumns {
    pub first: String,
    pub second: Option<String>,
}

impl DriftColumns {
    pub fn one(first: impl Into<String>) -> Self {
        Self { first: first.into(), second: None }
    }

    pub fn two(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self { first: first.into(), second: Some(second.into()) }
    }

    /// Column names in drift row order
    pub fn names(&self) -> Vec<&str> {
        std::iter::once(self.first.as_str()).chain(self.second.as_deref()).collect()
    }
}

/// Units with an observed target value.
#[derive(Debug, Clone)]
pub struct ObservationSet {
    /// Centroid and raw target value per observed unit
    pub points: Vec<SamplePoint>,
    /// Covariates, one row per drift column
    pub drift: DriftMatrix,
    /// Table row of each observation
    pub rows: Vec<usize>,
}

impl ObservationSet {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }
}

/// Every unit of the table, in row order.
#[derive(Debug, Clone)]
pub struct TargetSet {
    pub locations: Vec<GeoPoint>,
    pub drift: DriftMatrix,
}

impl TargetSet {
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

/// Split `table` into observations and targets.
///
/// # Errors
/// `Configuration` if the target column has no missing or no observed
/// values, a drift cell is missing, or a unit has no usable geometry.
pub fn extract(
    table: &SpatialTable,
    target_column: &str,
    drift_columns: &DriftColumns,
) -> Result<(ObservationSet, TargetSet)> {
    let target = table.numeric_column(target_column)?;
    let observed = target.iter().filter(|v| v.is_some()).count();
    if observed == 0 {
        return Err(Error::Configuration(format!(
            "column '{target_column}' has no observed values to fit on"
        )));
    }
    if observed == target.len() {
        return Err(Error::Configuration(format!(
            "column '{target_column}' has no missing values to predict"
        )));
    }

    let names = drift_columns.names();
    let mut drift_rows = Vec::with_capacity(names.len());
    for name in &names {
        let column = table.numeric_column(name)?;
        let values: Option<Vec<f64>> = column.into_iter().collect();
        let values = values.ok_or_else(|| {
            Error::Configuration(format!("drift column '{name}' has missing values"))
        })?;
        drift_rows.push(values);
    }

    let centroids = table.centroids()?;
    let n_units = centroids.len();

    let target_drift = DriftMatrix::from_shape_fn((names.len(), n_units), |(k, j)| drift_rows[k][j]);

    let rows: Vec<usize> = target
        .iter()
        .enumerate()
        .filter_map(|(row, v)| v.map(|_| row))
        .collect();
    let points = rows
        .iter()
        .filter_map(|&row| target[row].map(|v| SamplePoint::new(centroids[row].x, centroids[row].y, v)))
        .collect();
    let obs_drift = DriftMatrix::from_shape_fn((names.len(), rows.len()), |(k, i)| drift_rows[k][rows[i]]);

    Ok((
        ObservationSet { points, drift: obs_drift, rows },
        TargetSet { locations: centroids, drift: target_drift },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{Geometry, LineString, Polygon};
    use geokrig_core::Feature;

    fn unit(lon: f64, lat: f64) -> Feature {
        Feature::new(Geometry::Polygon(Polygon::new(
            LineString::from(vec![(lon, lat), (lon + 1.0, lat), (lon + 1.0, lat + 1.0), (lon, lat + 1.0), (lon, lat)]),
            vec![],
        )))
    }

    fn table() -> SpatialTable {
        (0..4)
            .map(|i| {
                let v = if i % 2 == 0 { Some(1.0 + i as f64) } else { None };
                unit(-100.0 + i as f64, 40.0)
                    .with_property("rate", v)
                    .with_property("a", i as f64)
                    .with_property("b", 10.0 * i as f64)
            })
            .collect()
    }

    #[test]
    fn test_partition_and_drift_order() {
        let (obs, targets) = extract(&table(), "rate", &DriftColumns::two("b", "a")).unwrap();
        assert_eq!(obs.rows, vec![0, 2]);
        assert_eq!(obs.values(), vec![1.0, 3.0]);
        assert_eq!(targets.len(), 4);
        assert_eq!(obs.drift.dim(), (2, 2));
        assert_eq!(obs.drift[(0, 1)], 20.0);
        assert_eq!(obs.drift[(1, 1)], 2.0);
        assert_eq!(targets.drift[(0, 3)], 30.0);
        assert_eq!(targets.drift[(1, 3)], 3.0);
        assert!((targets.locations[1].x + 98.5).abs() < 1e-9);
        assert!((targets.locations[1].y - 40.5).abs() < 1e-9);
    }

    #[test]
    fn test_no_missing_values() {
        let t: SpatialTable = table().into_iter().map(|f| f.with_property("rate", 2.0)).collect();
        assert!(extract(&t, "rate", &DriftColumns::one("a")).unwrap_err().is_configuration());
    }

    #[test]
    fn test_no_observed_values() {
        let t: SpatialTable = table().into_iter().map(|f| f.with_property("rate", None::<f64>)).collect();
        assert!(extract(&t, "rate", &DriftColumns::one("a")).unwrap_err().is_configuration());
    }

    #[test]
    fn test_missing_drift() {
        let mut t = table();
        t.features[3].set_property("a", geokrig_core::AttributeValue::Null);
        assert!(extract(&t, "rate", &DriftColumns::one("a")).unwrap_err().is_configuration());
        assert!(extract(&t, "rate", &DriftColumns::two("b", "a")).unwrap_err().is_configuration());
        assert!(extract(&t, "rate", &DriftColumns::one("b")).is_ok());
    }

    #[test]
    fn test_unknown_column() {
        assert!(extract(&table(), "nope", &DriftColumns::one("a")).unwrap_err().is_configuration());
        assert!(extract(&table(), "rate", &DriftColumns::one("nope")).unwrap_err().is_configuration());
    }
}
