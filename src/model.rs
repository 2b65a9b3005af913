//! # Street Model
//!
//! The reconciled model: the deduplicated basemap, the grid it was segmented
//! with, and one [`MatchTable`] column per foreign dataset.
//!
//! Columns are additive. Matching or updating a column never edits basemap
//! geometry or attributes, and never removes an existing row.

use std::collections::{btree_map, BTreeMap, HashSet};

use log::info;

use crate::points::match_points_to_osm;
use crate::segmentation::{assign_segments_to_dataset, SegmentAssignment, SegmentGrid};
use crate::street::{match_street_network_to_osm, NetworkMatchOptions};
use crate::update::{update_point_system, update_street_network, UpdateOutcome};
use crate::{dedup_records, MatchConfig, Record, Result};

// =============================================================================
// Match Table
// =============================================================================

/// Basemap id → matched foreign id.
///
/// - `Some(id)`: matched
/// - `None` value: examined, no confident match
/// - missing key: never examined
///
/// Both of the latter read as "no match" through [`MatchTable::get`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchTable {
    entries: BTreeMap<String, Option<String>>,
}

impl MatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the row for `basemap_id`.
    pub fn insert(&mut self, basemap_id: impl Into<String>, foreign_id: Option<String>) {
        self.entries.insert(basemap_id.into(), foreign_id);
    }

    /// Matched foreign id, `None` if unmatched or never examined.
    pub fn get(&self, basemap_id: &str) -> Option<&str> {
        self.entries.get(basemap_id).and_then(|m| m.as_deref())
    }

    /// True if the basemap id was examined, matched or not.
    pub fn contains(&self, basemap_id: &str) -> bool {
        self.entries.contains_key(basemap_id)
    }

    /// Number of examined basemap ids.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of rows with a foreign id.
    pub fn matched_count(&self) -> usize {
        self.entries.values().filter(|m| m.is_some()).count()
    }

    /// Rows in basemap-id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> + '_ {
        self.entries
            .iter()
            .map(|(basemap_id, foreign_id)| (basemap_id.as_str(), foreign_id.as_deref()))
    }

    /// Every foreign id that appears as a match.
    pub fn foreign_ids(&self) -> HashSet<&str> {
        self.entries.values().filter_map(|m| m.as_deref()).collect()
    }

    /// Overlay `other` onto `self`: its matches overwrite, its `None` rows
    /// only fill ids that were never examined.
    pub fn merge(&mut self, other: MatchTable) {
        for (basemap_id, foreign_id) in other.entries {
            match self.entries.entry(basemap_id) {
                btree_map::Entry::Vacant(slot) => {
                    slot.insert(foreign_id);
                }
                btree_map::Entry::Occupied(mut slot) => {
                    if foreign_id.is_some() {
                        slot.insert(foreign_id);
                    }
                }
            }
        }
    }
}

impl FromIterator<(String, Option<String>)> for MatchTable {
    fn from_iter<T: IntoIterator<Item = (String, Option<String>)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Extend<(String, Option<String>)> for MatchTable {
    fn extend<T: IntoIterator<Item = (String, Option<String>)>>(&mut self, iter: T) {
        self.entries.extend(iter);
    }
}

// =============================================================================
// Street Model
// =============================================================================

/// Basemap plus named match columns.
///
/// The model keeps the grid it was segmented with, so later updates always
/// use identical cells.
#[derive(Debug, Clone)]
pub struct StreetModel {
    basemap: Vec<Record>,
    grid: SegmentGrid,
    segments: SegmentAssignment,
    columns: BTreeMap<String, MatchTable>,
}

impl StreetModel {
    /// Deduplicate the basemap by id (first wins) and segment it with `grid`.
    pub fn new(basemap: Vec<Record>, grid: SegmentGrid) -> Self {
        let total = basemap.len();
        let basemap = dedup_records(basemap);
        if basemap.len() < total {
            info!(
                "[StreetMatcher] Basemap: dropped {} duplicate ids, {} lines remain",
                total - basemap.len(),
                basemap.len()
            );
        }

        let segments = assign_segments_to_dataset(&basemap, &grid);
        Self {
            basemap,
            grid,
            segments,
            columns: BTreeMap::new(),
        }
    }

    pub fn basemap(&self) -> &[Record] {
        &self.basemap
    }

    pub fn grid(&self) -> &SegmentGrid {
        &self.grid
    }

    /// Segment assignment of [`StreetModel::basemap`], by position.
    pub fn segments(&self) -> &SegmentAssignment {
        &self.segments
    }

    pub fn column(&self, name: &str) -> Option<&MatchTable> {
        self.columns.get(name)
    }

    /// Column names in sorted order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.keys().map(String::as_str)
    }

    /// Replace (or add) a column.
    pub fn set_column(&mut self, name: impl Into<String>, table: MatchTable) {
        self.columns.insert(name.into(), table);
    }

    /// Match a foreign street network and store the result as `column`.
    pub fn match_street_network(
        &mut self,
        column: &str,
        foreign: &[Record],
        options: &NetworkMatchOptions,
    ) -> &MatchTable {
        let table = match_street_network_to_osm(
            &self.basemap,
            &self.segments,
            foreign,
            &self.grid,
            options,
        );
        let slot = self.columns.entry(column.to_string()).or_default();
        *slot = table;
        slot
    }

    /// Match a point dataset and store the result as `column`.
    pub fn match_points(&mut self, column: &str, points: &[Record]) -> &MatchTable {
        let table = match_points_to_osm(&self.basemap, points);
        let slot = self.columns.entry(column.to_string()).or_default();
        *slot = table;
        slot
    }

    /// Run [`update_street_network`] and swap the updated table into the model.
    pub fn apply_street_update(
        &mut self,
        column: &str,
        new_dataset: &[Record],
        config: &MatchConfig,
    ) -> Result<UpdateOutcome> {
        let outcome = update_street_network(self, column, new_dataset, config)?;
        self.columns.insert(column.to_string(), outcome.table.clone());
        Ok(outcome)
    }

    /// Run [`update_point_system`] and swap the updated table into the model.
    pub fn apply_point_update(
        &mut self,
        column: &str,
        new_points: &[Record],
    ) -> Result<UpdateOutcome> {
        let outcome = update_point_system(self, column, new_points)?;
        self.columns.insert(column.to_string(), outcome.table.clone());
        Ok(outcome)
    }
}
