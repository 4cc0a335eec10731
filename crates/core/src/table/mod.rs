//! Spatial table: polygon features with named attributes
//!
//! One [`Feature`] per areal unit (e.g. a county). The pipeline reads numeric
//! columns through [`SpatialTable::numeric_column`], which reports missing
//! cells as `None`, and writes derived columns with
//! [`SpatialTable::add_column`].

use geo::Centroid;
use geo_types::Geometry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::geodesy::GeoPoint;

/// Attribute value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    /// `Null` and NaN floats count as missing.
    pub fn is_missing(&self) -> bool {
        match self {
            AttributeValue::Null => true,
            AttributeValue::Float(v) => v.is_nan(),
            _ => false,
        }
    }

    /// Null, integer and float cells belong to numeric columns.
    pub fn is_numeric(&self) -> bool {
        matches!(self, AttributeValue::Null | AttributeValue::Int(_) | AttributeValue::Float(_))
    }

    /// Numeric value, `None` when missing or not numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Float(v) if !v.is_nan() => Some(*v),
            AttributeValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<Option<f64>> for AttributeValue {
    fn from(v: Option<f64>) -> Self {
        v.map_or(AttributeValue::Null, AttributeValue::Float)
    }
}

/// A geographic feature with geometry and attributes
#[derive(Debug, Clone)]
pub struct Feature {
    /// Feature geometry
    pub geometry: Option<Geometry<f64>>,
    /// Feature attributes
    pub properties: HashMap<String, AttributeValue>,
    /// Optional feature ID
    pub id: Option<String>,
}

impl Feature {
    /// Create a new feature with geometry
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            geometry: Some(geometry),
            properties: HashMap::new(),
            id: None,
        }
    }

    /// Create a feature with no geometry
    pub fn empty() -> Self {
        Self {
            geometry: None,
            properties: HashMap::new(),
            id: None,
        }
    }

    /// Builder-style attribute setter
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.set_property(key, value.into());
        self
    }

    /// Set an attribute
    pub fn set_property(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.properties.insert(key.into(), value);
    }

    /// Get an attribute
    pub fn get_property(&self, key: &str) -> Option<&AttributeValue> {
        self.properties.get(key)
    }

    /// Geometric centroid of the feature, if it has a non-empty geometry.
    pub fn centroid(&self) -> Option<GeoPoint> {
        self.geometry
            .as_ref()
            .and_then(|g| g.centroid())
            .map(|p| GeoPoint::new(p.x(), p.y()))
    }
}

/// Collection of features, one row per spatial unit
#[derive(Debug, Clone, Default)]
pub struct SpatialTable {
    pub features: Vec<Feature>,
}

impl SpatialTable {
    pub fn new() -> Self {
        Self { features: Vec::new() }
    }

    pub fn from_features(features: Vec<Feature>) -> Self {
        Self { features }
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    /// Whether any feature carries the column.
    pub fn has_column(&self, name: &str) -> bool {
        self.features.iter().any(|f| f.properties.contains_key(name))
    }

    /// Read a numeric column in row order. Cells absent from a feature are
    /// reported as missing.
    ///
    /// # Errors
    /// `Configuration` if no feature has the column or a cell is not numeric.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<Option<f64>>> {
        if !self.has_column(name) {
            return Err(Error::Configuration(format!("column '{name}' not found")));
        }
        self.features
            .iter()
            .enumerate()
            .map(|(row, f)| match f.get_property(name) {
                None => Ok(None),
                Some(v) if v.is_numeric() => Ok(v.as_f64()),
                Some(v) => Err(Error::Configuration(format!(
                    "column '{name}' is not numeric at row {row}: {v:?}"
                ))),
            })
            .collect()
    }

    /// Centroid of every feature in row order.
    ///
    /// # Errors
    /// `Configuration` if a feature has no geometry or an empty one.
    pub fn centroids(&self) -> Result<Vec<GeoPoint>> {
        self.features
            .iter()
            .enumerate()
            .map(|(row, f)| {
                f.centroid().ok_or_else(|| {
                    Error::Configuration(format!("feature at row {row} has no usable geometry"))
                })
            })
            .collect()
    }

    /// Write a float column aligned by row order, replacing any previous
    /// column of the same name.
    ///
    /// # Errors
    /// `Configuration` if `values` does not have one entry per feature.
    pub fn add_column(&mut self, name: &str, values: &[f64]) -> Result<()> {
        if values.len() != self.features.len() {
            return Err(Error::Configuration(format!(
                "column '{name}' has {} values for {} features",
                values.len(),
                self.features.len()
            )));
        }
        for (f, &v) in self.features.iter_mut().zip(values) {
            f.set_property(name, AttributeValue::Float(v));
        }
        Ok(())
    }
}

impl IntoIterator for SpatialTable {
    type Item = Feature;
    type IntoIter = std::vec::IntoIter<Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}

impl FromIterator<Feature> for SpatialTable {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        Self { features: iter.into_iter().collect() }
    }
}
