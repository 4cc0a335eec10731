//! GeoJSON tables, CSV realizations and JSON diagnostics

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use geojson::{FeatureCollection, GeoJson};
use geokrig_algorithms::pipeline::plot::CURVE_SAMPLES;
use geokrig_algorithms::pipeline::UncertaintyOutput;
use geokrig_core::{AttributeValue, Feature, SpatialTable};
use ndarray::Array2;
use serde_json::{json, Map, Value};

pub fn read_table(path: &Path) -> Result<SpatialTable> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let geojson: GeoJson = text.parse().context("Invalid GeoJSON")?;
    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        GeoJson::Feature(f) => FeatureCollection { bbox: None, features: vec![f], foreign_members: None },
        GeoJson::Geometry(_) => bail!("Expected a FeatureCollection, found a bare geometry"),
    };

    collection
        .features
        .into_iter()
        .enumerate()
        .map(|(row, f)| {
            let mut feature = match f.geometry {
                Some(g) => Feature::new(
                    geo_types::Geometry::<f64>::try_from(g)
                        .with_context(|| format!("Unsupported geometry at feature {row}"))?,
                ),
                None => Feature::empty(),
            };
            feature.id = f.id.map(|id| match id {
                geojson::feature::Id::String(s) => s,
                geojson::feature::Id::Number(n) => n.to_string(),
            });
            for (key, value) in f.properties.unwrap_or_default() {
                feature.set_property(key, to_attribute(value));
            }
            Ok(feature)
        })
        .collect()
}

fn to_attribute(value: Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null,
        Value::Bool(b) => AttributeValue::Bool(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => AttributeValue::Int(i),
            None => n.as_f64().map_or(AttributeValue::Null, AttributeValue::Float),
        },
        Value::String(s) => AttributeValue::String(s),
        other => AttributeValue::String(other.to_string()),
    }
}

fn from_attribute(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::Null => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Int(i) => Value::from(*i),
        AttributeValue::Float(v) => serde_json::Number::from_f64(*v).map_or(Value::Null, Value::Number),
        AttributeValue::String(s) => Value::String(s.clone()),
    }
}

pub fn write_table(table: &SpatialTable, path: &Path) -> Result<()> {
    let features = table
        .iter()
        .map(|f| {
            let properties: Map<String, Value> =
                f.properties.iter().map(|(k, v)| (k.clone(), from_attribute(v))).collect();
            geojson::Feature {
                bbox: None,
                geometry: f.geometry.as_ref().map(|g| geojson::Geometry::new(geojson::Value::from(g))),
                id: f.id.clone().map(geojson::feature::Id::String),
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();
    let collection = FeatureCollection { bbox: None, features, foreign_members: None };
    fs::write(path, GeoJson::from(collection).to_string())
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// One line per realization: `realization,seed,u0,u1,...`
pub fn write_realizations(fields: &Array2<f64>, seeds: &[u64], path: &Path) -> Result<()> {
    let file = fs::File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);

    write!(out, "realization,seed")?;
    for j in 0..fields.ncols() {
        write!(out, ",u{j}")?;
    }
    writeln!(out)?;

    for (r, row) in fields.rows().into_iter().enumerate() {
        write!(out, "{r},{}", seeds.get(r).copied().unwrap_or_default())?;
        for v in row {
            write!(out, ",{v}")?;
        }
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

pub fn diagnostics(output: &UncertaintyOutput) -> Value {
    let v = &output.variogram;
    let model = &output.model;
    let empirical: Vec<Value> = v
        .lags
        .iter()
        .zip(&v.semivariance)
        .zip(&v.pair_counts)
        .map(|((h, g), n)| json!({ "distance": h, "semivariance": g, "pairs": n }))
        .collect();
    let theoretical: Vec<Value> = model
        .curve(v.max_bin_distance() * 1.2, CURVE_SAMPLES)
        .into_iter()
        .map(|(h, g)| json!({ "distance": h, "semivariance": g }))
        .collect();

    json!({
        "bin_count": v.bin_count(),
        "max_bin_distance": v.max_bin_distance(),
        "model": {
            "family": model.family,
            "variance": model.variance,
            "len_scale": model.range,
            "shape": model.shape,
            "nugget": model.nugget(),
            "normalizer": model.normalizer.name(),
            "loss": model.loss,
        },
        "empirical": empirical,
        "theoretical": theoretical,
        "seeds": output.seeds,
    })
}

pub fn write_diagnostics(output: &UncertaintyOutput, path: &Path) -> Result<()> {
    let text = serde_json::to_string_pretty(&diagnostics(output))?;
    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_conversion() {
        assert_eq!(to_attribute(json!(3)), AttributeValue::Int(3));
        assert_eq!(to_attribute(json!(2.5)), AttributeValue::Float(2.5));
        assert_eq!(to_attribute(Value::Null), AttributeValue::Null);
        assert_eq!(to_attribute(json!("x")), AttributeValue::String("x".into()));
        assert_eq!(from_attribute(&AttributeValue::Float(f64::NAN)), Value::Null);
        assert_eq!(from_attribute(&AttributeValue::Float(1.5)), json!(1.5));
    }

    #[test]
    fn test_read_feature_collection() {
        let dir = std::env::temp_dir().join(format!("geokrig-io-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("units.geojson");
        fs::write(
            &path,
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","id":"a","properties":{"rate":1.5,"pop":10},
                 "geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1],[0,0]]]}},
                {"type":"Feature","properties":{"rate":null,"pop":4},
                 "geometry":{"type":"Polygon","coordinates":[[[1,0],[2,0],[2,1],[1,1],[1,0]]]}}
            ]}"#,
        )
        .unwrap();

        let table = read_table(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.numeric_column("rate").unwrap(), vec![Some(1.5), None]);
        assert_eq!(table.features[0].id.as_deref(), Some("a"));
        let c = table.centroids().unwrap();
        assert!((c[1].x - 1.5).abs() < 1e-12);

        let out = dir.join("out.geojson");
        write_table(&table, &out).unwrap();
        let again = read_table(&out).unwrap();
        assert_eq!(again.numeric_column("pop").unwrap(), vec![Some(10.0), Some(4.0)]);
        fs::remove_dir_all(&dir).unwrap();
    }
}
