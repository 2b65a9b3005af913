//! Batch configuration loaded from a JSON file.
//!
//! ```json
//! {
//!   "bbox": [16.4855, 49.1538, 16.7550, 49.2507],
//!   "num_segments": 32,
//!   "basemap": { "paths": ["osm_cycling.geojson", "osm_driving.geojson"], "id_column": "id" },
//!   "datasets": [
//!     { "column": "city_census_id", "path": "census.geojson", "id_column": "OBJECTID" },
//!     { "column": "counter_id", "path": "counters.geojson", "id_column": "id", "kind": "points" }
//!   ],
//!   "output": "full_model.geojson"
//! }
//! ```
//!
//! Every field except `basemap`, `datasets` and `output` has a default.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::segmentation::{generate_segments, BoundaryPolicy, SegmentGrid};
use crate::{BoundingBox, MatchConfig, MatchError, Result};

/// Brno, the city the tolerances were calibrated on.
pub const DEFAULT_BBOX: [f64; 4] = [16.4855, 49.1538, 16.7550, 49.2507];

/// Cells per side of the default grid.
pub const DEFAULT_NUM_SEGMENTS: usize = 32;

fn default_bbox() -> [f64; 4] {
    DEFAULT_BBOX
}

fn default_num_segments() -> usize {
    DEFAULT_NUM_SEGMENTS
}

fn default_id_column() -> String {
    "id".to_string()
}

/// How a dataset is matched onto the basemap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    /// Line network, matched with the tolerance-escalation search
    #[default]
    Streets,
    /// Point features, matched to the nearest line
    Points,
}

/// Where the basemap comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasemapSource {
    /// Files concatenated in order; duplicate ids keep the first
    pub paths: Vec<PathBuf>,
    #[serde(default = "default_id_column")]
    pub id_column: String,
}

/// One foreign dataset and the model column it fills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub column: String,
    pub path: PathBuf,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    #[serde(default)]
    pub kind: DatasetKind,
    /// Restrict street matching to these segments
    #[serde(default)]
    pub segment_ids: Option<Vec<usize>>,
}

/// Complete configuration of a reconciliation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    #[serde(default = "default_bbox")]
    pub bbox: [f64; 4],
    #[serde(default = "default_num_segments")]
    pub num_segments: usize,
    #[serde(default)]
    pub boundary_policy: BoundaryPolicy,
    pub basemap: BasemapSource,
    pub datasets: Vec<DatasetConfig>,
    pub output: PathBuf,
    #[serde(default)]
    pub matching: MatchConfig,
}

impl ReconcileConfig {
    /// Load and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: ReconcileConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        BoundingBox::from_array(self.bbox).validated()?;
        if self.num_segments == 0 {
            return Err(MatchError::InvalidSegmentCount(0));
        }
        if self.basemap.paths.is_empty() {
            return Err(MatchError::InvalidConfig("basemap.paths is empty".to_string()));
        }
        self.matching.validate()?;

        let mut columns = HashSet::new();
        for dataset in &self.datasets {
            if !columns.insert(dataset.column.as_str()) {
                return Err(MatchError::InvalidConfig(format!(
                    "column '{}' is configured twice",
                    dataset.column
                )));
            }
        }
        Ok(())
    }

    /// The grid described by `bbox`, `num_segments` and `boundary_policy`.
    pub fn grid(&self) -> Result<SegmentGrid> {
        Ok(generate_segments(BoundingBox::from_array(self.bbox), self.num_segments)?
            .with_boundary_policy(self.boundary_policy))
    }

    /// The dataset configured for `column`.
    pub fn dataset(&self, column: &str) -> Option<&DatasetConfig> {
        self.datasets.iter().find(|d| d.column == column)
    }
}
