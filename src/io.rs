//! # GeoJSON I/O
//!
//! Reads datasets from GeoJSON FeatureCollections and writes the reconciled
//! model back out.
//!
//! ## Input
//!
//! - Ids come from a named property and may be strings or numbers
//! - Geometries: `Point`, `LineString`, `MultiLineString`
//! - Other scalar properties are kept as attributes, numbers with their
//!   original decimal text; `null` values, arrays and objects are dropped
//!
//! ## Output
//!
//! One feature per basemap line with `id`, `segment_id`, the original
//! attributes and one property per match column. A column value is the
//! matched foreign id, `null` when the line was examined without a match,
//! and absent when it was never examined. Attributes named `id`,
//! `segment_id` or after a match column are not written.

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use geo::{Coord, LineString, MultiLineString, Point};
use log::{info, warn};
use serde::Deserialize;
use serde_json::{json, Map, Number, Value};

use crate::model::{MatchTable, StreetModel};
use crate::segmentation::SegmentGrid;
use crate::{dedup_records, AttributeValue, Geometry, MatchError, Record, Result};

/// Property holding the basemap id in written models.
pub const ID_PROPERTY: &str = "id";
/// Property holding the segment index in written models.
pub const SEGMENT_PROPERTY: &str = "segment_id";

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    geometry: Option<RawGeometry>,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct RawGeometry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    coordinates: Value,
}

// =============================================================================
// Reading
// =============================================================================

fn invalid(feature: usize, reason: impl Into<String>) -> MatchError {
    MatchError::InvalidGeometry {
        feature,
        reason: reason.into(),
    }
}

fn position(feature: usize, value: &Value) -> Result<Coord<f64>> {
    let pair = value
        .as_array()
        .filter(|xy| xy.len() >= 2)
        .ok_or_else(|| invalid(feature, format!("expected a coordinate pair, got {value}")))?;
    match (pair[0].as_f64(), pair[1].as_f64()) {
        (Some(x), Some(y)) => Ok(Coord { x, y }),
        _ => Err(invalid(feature, format!("non-numeric coordinate {value}"))),
    }
}

fn line_part(feature: usize, value: &Value) -> Result<LineString<f64>> {
    let coords = value
        .as_array()
        .ok_or_else(|| invalid(feature, "expected an array of positions"))?
        .iter()
        .map(|p| position(feature, p))
        .collect::<Result<Vec<_>>>()?;
    if coords.len() < 2 {
        return Err(invalid(
            feature,
            format!("line part has {} coordinates, need at least 2", coords.len()),
        ));
    }
    Ok(LineString::new(coords))
}

fn geometry(feature: usize, raw: &RawGeometry) -> Result<Geometry> {
    match raw.kind.as_str() {
        "Point" => Ok(Geometry::Point(Point::from(position(feature, &raw.coordinates)?))),
        "LineString" => Ok(Geometry::Lines(MultiLineString::new(vec![line_part(
            feature,
            &raw.coordinates,
        )?]))),
        "MultiLineString" => {
            let parts = raw
                .coordinates
                .as_array()
                .ok_or_else(|| invalid(feature, "expected an array of line parts"))?
                .iter()
                .map(|part| line_part(feature, part))
                .collect::<Result<Vec<_>>>()?;
            if parts.is_empty() {
                return Err(invalid(feature, "multi-line without parts"));
            }
            Ok(Geometry::Lines(MultiLineString::new(parts)))
        }
        other => Err(MatchError::UnsupportedGeometry {
            feature,
            kind: other.to_string(),
        }),
    }
}

/// String form of a scalar property; `None` for null, arrays and objects.
fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn attribute(value: &Value) -> Option<AttributeValue> {
    match value {
        Value::String(s) => Some(AttributeValue::Text(s.clone())),
        Value::Number(n) => Some(AttributeValue::Number(n.to_string())),
        Value::Bool(b) => Some(AttributeValue::Bool(*b)),
        _ => None,
    }
}

fn feature_record(
    index: usize,
    feature: &Feature,
    id_column: &str,
    skip: &[&str],
) -> Result<Record> {
    let properties = feature.properties.as_ref();
    let id = properties
        .and_then(|p| p.get(id_column))
        .and_then(scalar)
        .ok_or_else(|| MatchError::MissingId {
            feature: index,
            column: id_column.to_string(),
        })?;

    let raw = feature
        .geometry
        .as_ref()
        .ok_or_else(|| invalid(index, "missing geometry"))?;

    let attributes: BTreeMap<String, AttributeValue> = properties
        .into_iter()
        .flatten()
        .filter(|(key, _)| key.as_str() != id_column && !skip.contains(&key.as_str()))
        .filter_map(|(key, value)| attribute(value).map(|v| (key.clone(), v)))
        .collect();

    Ok(Record {
        id,
        geometry: geometry(index, raw)?,
        attributes,
    })
}

fn parse_collection(text: &str) -> Result<FeatureCollection> {
    Ok(serde_json::from_str(text)?)
}

/// Parse a GeoJSON FeatureCollection into records.
///
/// # Example
/// ```
/// use street_matcher::io::parse_dataset;
///
/// let text = r#"{"type": "FeatureCollection", "features": [
///     {"type": "Feature", "properties": {"ID": 7, "name": "Kounicova"},
///      "geometry": {"type": "LineString", "coordinates": [[16.59, 49.20], [16.60, 49.21]]}}
/// ]}"#;
/// let records = parse_dataset(text, "ID").unwrap();
/// assert_eq!(records[0].id, "7");
/// assert_eq!(records[0].attributes["name"].as_text(), Some("Kounicova"));
/// ```
pub fn parse_dataset(text: &str, id_column: &str) -> Result<Vec<Record>> {
    parse_collection(text)?
        .features
        .iter()
        .enumerate()
        .map(|(index, feature)| feature_record(index, feature, id_column, &[]))
        .collect()
}

/// Read a GeoJSON dataset from disk.
pub fn read_dataset(path: impl AsRef<Path>, id_column: &str) -> Result<Vec<Record>> {
    let path = path.as_ref();
    let records = parse_dataset(&fs::read_to_string(path)?, id_column)?;
    info!("[StreetMatcher] Read {} records from {}", records.len(), path.display());
    Ok(records)
}

/// Read several basemap files, concatenated in order and deduplicated by id
/// (first wins).
pub fn read_basemap<P: AsRef<Path>>(paths: &[P], id_column: &str) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    for path in paths {
        records.extend(read_dataset(path, id_column)?);
    }
    let total = records.len();
    let unique = dedup_records(records);
    info!(
        "[StreetMatcher] Basemap: {} records from {} files, {} unique",
        total,
        paths.len(),
        unique.len()
    );
    Ok(unique)
}

// =============================================================================
// Writing
// =============================================================================

fn attribute_json(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::Text(text) => Value::from(text.clone()),
        AttributeValue::Number(text) => text
            .parse::<Number>()
            .map_or_else(|_| Value::from(text.clone()), Value::Number),
        AttributeValue::Bool(b) => Value::Bool(*b),
    }
}

fn geometry_json(geometry: &Geometry) -> Value {
    let part = |line: &LineString<f64>| -> Vec<[f64; 2]> {
        line.coords().map(|c| [c.x, c.y]).collect()
    };
    match geometry {
        Geometry::Point(p) => json!({"type": "Point", "coordinates": [p.x(), p.y()]}),
        Geometry::Lines(lines) if lines.0.len() == 1 => {
            json!({"type": "LineString", "coordinates": part(&lines.0[0])})
        }
        Geometry::Lines(lines) => json!({
            "type": "MultiLineString",
            "coordinates": lines.iter().map(part).collect::<Vec<_>>(),
        }),
    }
}

/// The model as a GeoJSON FeatureCollection.
pub fn model_to_geojson(model: &StreetModel) -> Value {
    let columns: Vec<(&str, &MatchTable)> = model
        .column_names()
        .filter_map(|name| model.column(name).map(|table| (name, table)))
        .collect();
    let mut reserved: HashSet<&str> = columns.iter().map(|(name, _)| *name).collect();
    reserved.insert(ID_PROPERTY);
    reserved.insert(SEGMENT_PROPERTY);

    let mut shadowed = 0usize;
    let features: Vec<Value> = model
        .basemap()
        .iter()
        .enumerate()
        .map(|(position, record)| {
            let mut properties = Map::new();
            for (key, value) in &record.attributes {
                if reserved.contains(key.as_str()) {
                    shadowed += 1;
                } else {
                    properties.insert(key.clone(), attribute_json(value));
                }
            }
            properties.insert(ID_PROPERTY.to_string(), Value::from(record.id.clone()));
            properties.insert(
                SEGMENT_PROPERTY.to_string(),
                model.segments().segment_of(position).map_or(Value::Null, Value::from),
            );
            for (name, table) in &columns {
                if table.contains(&record.id) {
                    properties.insert(
                        name.to_string(),
                        table.get(&record.id).map_or(Value::Null, Value::from),
                    );
                }
            }
            json!({
                "type": "Feature",
                "properties": properties,
                "geometry": geometry_json(&record.geometry),
            })
        })
        .collect();

    if shadowed > 0 {
        warn!(
            "[StreetMatcher] Dropped {} attributes named like id, segment_id or a match column",
            shadowed
        );
    }
    json!({"type": "FeatureCollection", "features": features})
}

/// Write the model as GeoJSON.
pub fn write_model(path: impl AsRef<Path>, model: &StreetModel) -> Result<()> {
    let path = path.as_ref();
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(writer, &model_to_geojson(model))?;
    info!(
        "[StreetMatcher] Wrote {} basemap lines to {}",
        model.basemap().len(),
        path.display()
    );
    Ok(())
}

/// Reload a model written by [`write_model`].
///
/// `columns` name the match columns to restore; the remaining properties
/// become attributes again. The basemap is re-segmented with `grid`.
pub fn read_model(
    path: impl AsRef<Path>,
    id_column: &str,
    columns: &[&str],
    grid: SegmentGrid,
) -> Result<StreetModel> {
    let collection = parse_collection(&fs::read_to_string(path.as_ref())?)?;

    let mut skip = columns.to_vec();
    skip.push(SEGMENT_PROPERTY);

    let mut tables: Vec<MatchTable> = vec![MatchTable::new(); columns.len()];
    let mut basemap = Vec::with_capacity(collection.features.len());
    for (index, feature) in collection.features.iter().enumerate() {
        let record = feature_record(index, feature, id_column, &skip)?;
        if let Some(properties) = &feature.properties {
            for (table, name) in tables.iter_mut().zip(columns) {
                if let Some(value) = properties.get(*name) {
                    table.insert(record.id.clone(), scalar(value));
                }
            }
        }
        basemap.push(record);
    }

    let mut model = StreetModel::new(basemap, grid);
    for (name, table) in columns.iter().zip(tables) {
        model.set_column(*name, table);
    }
    Ok(model)
}
