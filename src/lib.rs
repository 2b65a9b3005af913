//! # Street Matcher
//!
//! Geometric conflation of independently surveyed street networks onto an
//! OpenStreetMap-derived basemap.
//!
//! This library provides:
//! - A uniform segment grid that prunes the line search to near neighbours
//! - Line similarity by bounding-ellipse overlap and diagonal angle
//! - A tolerance-escalation search that matches one street against a candidate set
//! - Nearest-edge assignment for point datasets (counters, sensors)
//! - Incremental, additive updates of an already matched model
//!
//! ## Features
//!
//! - **`parallel`** - Match segments in parallel with rayon
//! - **`serde`** - Serialize/deserialize configuration types
//! - **`geojson`** - GeoJSON dataset I/O, JSON config files and the batch pipeline
//! - **`cli`** - The `street-matcher` command-line binary
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use street_matcher::{
//!     generate_segments, BoundingBox, Geometry, NetworkMatchOptions, Record, StreetModel,
//! };
//!
//! let grid = generate_segments(BoundingBox::new(0.0, 0.0, 10.0, 10.0), 2).unwrap();
//!
//! let basemap = vec![
//!     Record::new("osm-1", Geometry::line(&[(1.0, 1.0), (3.0, 2.5)])),
//!     Record::new("osm-2", Geometry::line(&[(6.0, 6.0), (6.5, 9.0)])),
//! ];
//! let census = vec![
//!     Record::new("c-7", Geometry::line(&[(1.0001, 1.0001), (3.0001, 2.5001)])),
//! ];
//!
//! let mut model = StreetModel::new(basemap, grid);
//! model.match_street_network("census_id", &census, &NetworkMatchOptions::default());
//!
//! let census_ids = model.column("census_id").unwrap();
//! assert_eq!(census_ids.get("osm-1"), Some("c-7"));
//! assert_eq!(census_ids.get("osm-2"), None);
//! ```

use geo::{Coord, LineString, MultiLineString, Point};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

pub mod error;
pub use error::{MatchError, Result};

pub mod geo_utils;

// Uniform grid used to restrict comparisons to near neighbours
pub mod segmentation;
pub use segmentation::{
    assign_segments_to_dataset, generate_segments, is_in_segment, BoundaryPolicy,
    SegmentAssignment, SegmentGrid,
};

// Line-to-line similarity scores
pub mod similarity;
pub use similarity::{
    angle_between, ellipse_iou, lines_overlap, BoxOverlap, EllipseOverlap, LineSimilarity,
    RoundedOverlap,
};

// Tolerance-escalation search and whole-network matching
pub mod street;
pub use street::{
    match_line_to_set, match_line_with, match_lines_by_bbox_overlap, match_street_network_to_osm,
    tolerance_schedule, LineMatch, NetworkMatchOptions, ToleranceRound,
};
#[cfg(feature = "parallel")]
pub use street::match_street_network_to_osm_parallel;

// Nearest-edge assignment for point datasets
pub mod points;
pub use points::{assign_points_to_lines, match_points_to_osm, EdgeIndex, PointAssignment};

pub mod model;
pub use model::{MatchTable, StreetModel};

// Incremental merge of newer dataset snapshots
pub mod update;
pub use update::{update_point_system, update_street_network, UpdateOutcome};

pub mod evaluate;
pub use evaluate::{evaluate_matches, Accuracy, Annotation};

#[cfg(feature = "geojson")]
pub mod io;

#[cfg(feature = "geojson")]
pub mod config;
#[cfg(feature = "geojson")]
pub use config::{DatasetConfig, DatasetKind, ReconcileConfig};

#[cfg(feature = "geojson")]
pub mod pipeline;

// ============================================================================
// Core Types
// ============================================================================

/// Axis-aligned bounding box in dataset coordinates (usually lon/lat degrees).
///
/// # Example
/// ```
/// use street_matcher::BoundingBox;
/// let bbox = BoundingBox::new(16.4855, 49.1538, 16.7550, 49.2507); // Brno
/// assert!(bbox.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a bounding box from its four limits.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    /// Create a bounding box from a `[min_x, min_y, max_x, max_y]` array.
    pub fn from_array(limits: [f64; 4]) -> Self {
        Self::new(limits[0], limits[1], limits[2], limits[3])
    }

    /// True when both axes are finite and strictly increasing.
    pub fn is_valid(&self) -> bool {
        self.min_x.is_finite()
            && self.min_y.is_finite()
            && self.max_x.is_finite()
            && self.max_y.is_finite()
            && self.min_x < self.max_x
            && self.min_y < self.max_y
    }

    /// Return `self` if valid, otherwise [`MatchError::InvalidBoundingBox`].
    pub fn validated(self) -> Result<Self> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(MatchError::InvalidBoundingBox {
                min_x: self.min_x,
                min_y: self.min_y,
                max_x: self.max_x,
                max_y: self.max_y,
            })
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Centre of the box as `(x, y)`.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// Copy of the box with every limit rounded to `digits` decimals.
    pub fn rounded(&self, digits: i32) -> Self {
        use crate::geo_utils::round_to_digits;
        Self::new(
            round_to_digits(self.min_x, digits),
            round_to_digits(self.min_y, digits),
            round_to_digits(self.max_x, digits),
            round_to_digits(self.max_y, digits),
        )
    }
}

/// Geometry of a record: a single point or a (possibly multi-part) line.
///
/// Single-part lines are stored as a one-piece `MultiLineString`, so every
/// line algorithm handles both shapes the same way.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Point<f64>),
    Lines(MultiLineString<f64>),
}

impl Geometry {
    /// Point geometry.
    pub fn point(x: f64, y: f64) -> Self {
        Geometry::Point(Point::new(x, y))
    }

    /// Single-part line geometry from `(x, y)` pairs.
    pub fn line(coords: &[(f64, f64)]) -> Self {
        Geometry::Lines(MultiLineString::new(vec![to_line_string(coords)]))
    }

    /// Multi-part line geometry, one `(x, y)` list per part.
    pub fn multi_line(parts: &[Vec<(f64, f64)>]) -> Self {
        Geometry::Lines(MultiLineString::new(
            parts.iter().map(|part| to_line_string(part)).collect(),
        ))
    }

    /// Bounding box of the geometry, `None` for an empty line.
    ///
    /// The box may be degenerate (a point, or an axis-aligned line).
    pub fn bounds(&self) -> Option<BoundingBox> {
        match self {
            Geometry::Point(p) => Some(BoundingBox::new(p.x(), p.y(), p.x(), p.y())),
            Geometry::Lines(lines) => geo_utils::line_bounds(lines),
        }
    }

    pub fn as_lines(&self) -> Option<&MultiLineString<f64>> {
        match self {
            Geometry::Lines(lines) => Some(lines),
            Geometry::Point(_) => None,
        }
    }

    pub fn as_point(&self) -> Option<&Point<f64>> {
        match self {
            Geometry::Point(p) => Some(p),
            Geometry::Lines(_) => None,
        }
    }
}

fn to_line_string(coords: &[(f64, f64)]) -> LineString<f64> {
    LineString::new(coords.iter().map(|&(x, y)| Coord { x, y }).collect())
}

/// A scalar attribute value carried from an input dataset to the output.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Text(String),
    /// Decimal text as read, so the value is written back unchanged.
    Number(String),
    Bool(bool),
}

impl AttributeValue {
    /// The string for `Text` values.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Text(text) | AttributeValue::Number(text) => f.write_str(text),
            AttributeValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(text: &str) -> Self {
        AttributeValue::Text(text.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(text: String) -> Self {
        AttributeValue::Text(text)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Bool(b)
    }
}

impl From<i64> for AttributeValue {
    fn from(n: i64) -> Self {
        AttributeValue::Number(n.to_string())
    }
}

impl From<f64> for AttributeValue {
    fn from(n: f64) -> Self {
        AttributeValue::Number(n.to_string())
    }
}

/// One row of a dataset: an id unique within its dataset, a geometry, and
/// any extra attributes carried through to the output.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub geometry: Geometry,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Record {
    /// Create a record without attributes.
    pub fn new(id: impl Into<String>, geometry: Geometry) -> Self {
        Self {
            id: id.into(),
            geometry,
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Keep the first record for every id, preserving input order.
pub fn dedup_by_id<'a, I>(records: I) -> Vec<&'a Record>
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(r.id.as_str()))
        .collect()
}

/// Owned variant of [`dedup_by_id`].
pub fn dedup_records(records: Vec<Record>) -> Vec<Record> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(r.id.clone()))
        .collect()
}

/// Upper bound on the rounds a valid [`MatchConfig`] may schedule before
/// the ceiling round.
pub const MAX_TOLERANCE_ROUNDS: usize = 1000;

/// Configuration for the line matching algorithms.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MatchConfig {
    /// Starting angle tolerance in degrees. The first round already adds one step.
    /// Default: 15.0
    pub angle_offset_limit: f64,

    /// Angle added to the tolerance every round.
    /// Default: 5.0
    pub angle_step: f64,

    /// Last round is the one reaching this angle; it also coarsens rounding by one digit.
    /// Default: 45.0
    pub angle_ceiling: f64,

    /// Decimal digits kept when rounding bounds. 5 digits ~ 2m, 4 digits ~ 23m.
    /// Default: 5
    pub round_digits: i32,

    /// Finest rounding tried by the overlap-set search.
    /// Default: 7
    pub overlap_digits_max: i32,

    /// Coarsest rounding tried by the overlap-set search.
    /// Default: 3
    pub overlap_digits_min: i32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            angle_offset_limit: 15.0,
            angle_step: 5.0,
            angle_ceiling: 45.0,
            round_digits: 5,
            overlap_digits_max: 7,
            overlap_digits_min: 3,
        }
    }
}

impl MatchConfig {
    /// Check the tolerance parameters describe a finite, loosening schedule.
    pub fn validate(&self) -> Result<()> {
        if !(self.angle_step > 0.0) {
            return Err(MatchError::InvalidConfig(format!(
                "angle_step must be positive, got {}",
                self.angle_step
            )));
        }
        if !(self.angle_offset_limit >= 0.0) || !(self.angle_ceiling > self.angle_offset_limit) {
            return Err(MatchError::InvalidConfig(format!(
                "angle_ceiling ({}) must exceed angle_offset_limit ({})",
                self.angle_ceiling, self.angle_offset_limit
            )));
        }
        let rounds = (self.angle_ceiling - self.angle_offset_limit) / self.angle_step;
        if !(rounds <= MAX_TOLERANCE_ROUNDS as f64) {
            return Err(MatchError::InvalidConfig(format!(
                "angle_step {} gives more than {} tolerance rounds",
                self.angle_step, MAX_TOLERANCE_ROUNDS
            )));
        }
        if self.overlap_digits_min > self.overlap_digits_max {
            return Err(MatchError::InvalidConfig(format!(
                "overlap_digits_min ({}) is above overlap_digits_max ({})",
                self.overlap_digits_min, self.overlap_digits_max
            )));
        }
        Ok(())
    }
}
